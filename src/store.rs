//! Fixed-record persistent store with tombstones.
//!
//! The index file is a flat sequence of 472-byte records, little-endian and
//! packed:
//!
//! ```text
//! ┌────────┬──────────────────────┬───────────────────────────────┐
//! │ Offset │ Field                │ Notes                         │
//! ├────────┼──────────────────────┼───────────────────────────────┤
//! │ 0      │ key: i32             │ -1 marks a tombstone          │
//! │ 4      │ title:   [u8; 200]   │ NUL-terminated                │
//! │ 204    │ authors: [u8; 200]   │ NUL-terminated                │
//! │ 404    │ path:    [u8; 64]    │ relative path, NUL-terminated │
//! │ 468    │ year: u32            │                               │
//! └────────┴──────────────────────┴───────────────────────────────┘
//! ```
//!
//! A live record at index `k` always stores `key == k`; records are never
//! relocated and deleted slots are never reclaimed. Every access reads or
//! writes one whole record at its own offset, so concurrent readers can see
//! stale but never torn records.

use std::{
   fs::{File, OpenOptions},
   os::unix::fs::{FileExt, OpenOptionsExt},
   path::{Path, PathBuf},
};

use crate::error::StoreError;

/// On-disk size of one record.
pub const RECORD_SIZE: usize = 472;
/// Key value marking a dead slot.
pub const TOMBSTONE_KEY: i32 = -1;

const TITLE_CAP: usize = 200;
const AUTHORS_CAP: usize = 200;
const PATH_CAP: usize = 64;

/// One document record.
#[derive(Clone, Copy)]
pub struct Document {
   pub key:  i32,
   pub year: u32,
   title:    [u8; TITLE_CAP],
   authors:  [u8; AUTHORS_CAP],
   path:     [u8; PATH_CAP],
}

impl Document {
   /// Builds a record from raw field bytes, truncating each text field to
   /// its capacity minus the terminating NUL.
   pub fn new(title: &[u8], authors: &[u8], year: u32, path: &[u8]) -> Self {
      let mut doc = Self {
         key:     0,
         year,
         title:   [0u8; TITLE_CAP],
         authors: [0u8; AUTHORS_CAP],
         path:    [0u8; PATH_CAP],
      };
      copy_truncated(&mut doc.title, title);
      copy_truncated(&mut doc.authors, authors);
      copy_truncated(&mut doc.path, path);
      doc
   }

   pub fn title(&self) -> &[u8] {
      until_nul(&self.title)
   }

   pub fn authors(&self) -> &[u8] {
      until_nul(&self.authors)
   }

   /// Relative path under the document root.
   pub fn rel_path(&self) -> &[u8] {
      until_nul(&self.path)
   }

   fn encode(&self) -> [u8; RECORD_SIZE] {
      let mut buf = [0u8; RECORD_SIZE];
      buf[0..4].copy_from_slice(&self.key.to_le_bytes());
      buf[4..4 + TITLE_CAP].copy_from_slice(&self.title);
      buf[204..204 + AUTHORS_CAP].copy_from_slice(&self.authors);
      buf[404..404 + PATH_CAP].copy_from_slice(&self.path);
      buf[468..472].copy_from_slice(&self.year.to_le_bytes());
      buf
   }

   fn decode(buf: &[u8; RECORD_SIZE]) -> Self {
      let mut doc = Self {
         key:     i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
         year:    u32::from_le_bytes([buf[468], buf[469], buf[470], buf[471]]),
         title:   [0u8; TITLE_CAP],
         authors: [0u8; AUTHORS_CAP],
         path:    [0u8; PATH_CAP],
      };
      doc.title.copy_from_slice(&buf[4..4 + TITLE_CAP]);
      doc.authors.copy_from_slice(&buf[204..204 + AUTHORS_CAP]);
      doc.path.copy_from_slice(&buf[404..404 + PATH_CAP]);
      doc
   }
}

impl std::fmt::Debug for Document {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Document")
         .field("key", &self.key)
         .field("title", &String::from_utf8_lossy(self.title()))
         .field("authors", &String::from_utf8_lossy(self.authors()))
         .field("path", &String::from_utf8_lossy(self.rel_path()))
         .field("year", &self.year)
         .finish()
   }
}

fn copy_truncated(dst: &mut [u8], src: &[u8]) {
   // Reserve the final byte for the NUL terminator.
   let len = src.len().min(dst.len() - 1);
   dst[..len].copy_from_slice(&src[..len]);
}

fn until_nul(buf: &[u8]) -> &[u8] {
   match buf.iter().position(|b| *b == 0) {
      Some(n) => &buf[..n],
      None => buf,
   }
}

/// Handle on the record file.
///
/// Append-only allocation, random-access reads, in-place tombstoning. The
/// server loop is the only writer; workers read through their own handle.
#[derive(Debug)]
pub struct RecordStore {
   file: File,
   path: PathBuf,
}

impl RecordStore {
   /// Opens the store file read/write, creating it (mode 0600, parent
   /// directories included) when absent.
   pub fn open(path: &Path) -> Result<Self, StoreError> {
      if let Some(parent) = path.parent()
         && !parent.as_os_str().is_empty()
      {
         std::fs::create_dir_all(parent).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
         })?;
      }

      let file = OpenOptions::new()
         .read(true)
         .write(true)
         .create(true)
         .mode(0o600)
         .open(path)
         .map_err(|source| StoreError::Open { path: path.to_path_buf(), source })?;

      Ok(Self { file, path: path.to_path_buf() })
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   /// Appends a record, deriving its key from the current file length.
   pub fn append(&self, doc: &Document) -> Result<i32, StoreError> {
      let end = self.file.metadata().map_err(StoreError::Size)?.len();
      let key = (end / RECORD_SIZE as u64) as i32;

      let mut record = *doc;
      record.key = key;
      self
         .file
         .write_all_at(&record.encode(), end)
         .map_err(StoreError::Write)?;

      Ok(key)
   }

   /// Reads the live record stored under `key`.
   pub fn get(&self, key: i32) -> Result<Document, StoreError> {
      let doc = self.read_slot(key)?;
      if doc.key != key {
         return Err(StoreError::Missing(key));
      }
      Ok(doc)
   }

   /// Tombstones the record under `key`; fails if the slot is already dead.
   pub fn delete(&self, key: i32) -> Result<(), StoreError> {
      let doc = self.read_slot(key)?;
      if doc.key != key {
         return Err(StoreError::Missing(key));
      }

      let mut tomb = [0u8; RECORD_SIZE];
      tomb[0..4].copy_from_slice(&TOMBSTONE_KEY.to_le_bytes());
      self
         .file
         .write_all_at(&tomb, offset_of(key))
         .map_err(StoreError::Write)
   }

   /// Total number of slots, live and tombstoned.
   pub fn total(&self) -> Result<u64, StoreError> {
      let end = self.file.metadata().map_err(StoreError::Size)?.len();
      Ok(end / RECORD_SIZE as u64)
   }

   fn read_slot(&self, key: i32) -> Result<Document, StoreError> {
      if key < 0 {
         return Err(StoreError::OutOfRange(key));
      }

      let end = self.file.metadata().map_err(StoreError::Size)?.len();
      let offset = offset_of(key);
      if offset + RECORD_SIZE as u64 > end {
         return Err(StoreError::OutOfRange(key));
      }

      let mut buf = [0u8; RECORD_SIZE];
      self
         .file
         .read_exact_at(&mut buf, offset)
         .map_err(StoreError::Read)?;
      Ok(Document::decode(&buf))
   }
}

fn offset_of(key: i32) -> u64 {
   key as u64 * RECORD_SIZE as u64
}

//! LRU cache mapping search keywords to full response frames.
//!
//! The cache lives in the server loop and is never touched by workers:
//! lookups happen before a worker is spawned, inserts after its response has
//! been collected. At shutdown live entries are persisted to disk as
//!
//! ```text
//! count: u32
//! count × { key_len: u16, key[key_len], rsp_len: u16, rsp[rsp_len] }
//! ```
//!
//! in MRU → LRU order, little-endian. Loading is tolerant: the first
//! truncated or invalid record ends the load without failing startup.

use std::{
   fs::File,
   io::{BufReader, BufWriter, Read, Write},
   num::NonZeroUsize,
   path::PathBuf,
};

use lru::LruCache;

use crate::{
   error::CacheError,
   wire::{RSP_HDR_SZ, RSP_MAX},
};

/// Longest persistable cache key.
pub const MAX_KEY_LEN: usize = 255;

/// Bounded keyword → response-frame cache with disk persistence.
///
/// A capacity of zero disables caching entirely: `get` always misses and
/// `put` is a no-op.
#[derive(Debug)]
pub struct ResponseCache {
   entries: Option<LruCache<Vec<u8>, Vec<u8>>>,
   path:    PathBuf,
}

impl ResponseCache {
   /// Creates the cache and, when enabled, warm-loads the persisted image.
   pub fn open(path: PathBuf, capacity: usize) -> Self {
      let mut cache = Self {
         entries: NonZeroUsize::new(capacity).map(LruCache::new),
         path,
      };
      if cache.entries.is_some() {
         cache.load();
      }
      cache
   }

   pub fn capacity(&self) -> usize {
      self.entries.as_ref().map_or(0, |c| c.cap().get())
   }

   pub fn len(&self) -> usize {
      self.entries.as_ref().map_or(0, |entries| entries.len())
   }

   pub fn is_empty(&self) -> bool {
      self.len() == 0
   }

   /// Looks up a keyword; a hit promotes the entry and returns a copy of the
   /// cached frame.
   pub fn get(&mut self, kw: &[u8]) -> Option<Vec<u8>> {
      self.entries.as_mut()?.get(kw).cloned()
   }

   /// Inserts or overwrites, promoting the entry to the recency front and
   /// evicting from the tail beyond capacity.
   pub fn put(&mut self, kw: &[u8], frame: &[u8]) {
      if let Some(entries) = self.entries.as_mut() {
         entries.put(kw.to_vec(), frame.to_vec());
      }
   }

   /// Writes all live entries to the persistence file, MRU first.
   pub fn persist(&self) -> Result<(), CacheError> {
      let Some(entries) = self.entries.as_ref() else {
         return Ok(());
      };

      if let Some(parent) = self.path.parent()
         && !parent.as_os_str().is_empty()
      {
         std::fs::create_dir_all(parent).map_err(CacheError::Create)?;
      }

      let file = File::create(&self.path).map_err(CacheError::Create)?;
      let mut out = BufWriter::new(file);

      out
         .write_all(&(entries.len() as u32).to_le_bytes())
         .map_err(CacheError::Write)?;

      for (key, frame) in entries.iter() {
         out
            .write_all(&(key.len() as u16).to_le_bytes())
            .map_err(CacheError::Write)?;
         out.write_all(key).map_err(CacheError::Write)?;
         out
            .write_all(&(frame.len() as u16).to_le_bytes())
            .map_err(CacheError::Write)?;
         out.write_all(frame).map_err(CacheError::Write)?;
      }

      out.flush().map_err(CacheError::Write)
   }

   /// Best-effort load of the persisted image; stops quietly at the first
   /// invalid or truncated record.
   fn load(&mut self) {
      let Some(entries) = self.entries.as_mut() else {
         return;
      };

      let file = match File::open(&self.path) {
         Ok(f) => f,
         Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
         Err(e) => {
            tracing::warn!("failed to open cache file: {e}");
            return;
         },
      };
      let mut input = BufReader::new(file);

      let Some(declared) = read_u32(&mut input) else {
         tracing::warn!("cache file too short for an entry count");
         return;
      };

      let cap = entries.cap().get();
      let mut loaded: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();

      for _ in 0..declared {
         if loaded.len() >= cap {
            break; // entries beyond capacity are discarded
         }
         let Some(record) = read_record(&mut input) else {
            break;
         };
         loaded.push(record);
      }

      // The file is MRU-first; inserting back-to-front restores the order.
      for (key, frame) in loaded.into_iter().rev() {
         entries.put(key, frame);
      }
   }
}

fn read_u32(input: &mut impl Read) -> Option<u32> {
   let mut buf = [0u8; 4];
   input.read_exact(&mut buf).ok()?;
   Some(u32::from_le_bytes(buf))
}

fn read_u16(input: &mut impl Read) -> Option<u16> {
   let mut buf = [0u8; 2];
   input.read_exact(&mut buf).ok()?;
   Some(u16::from_le_bytes(buf))
}

fn read_record(input: &mut impl Read) -> Option<(Vec<u8>, Vec<u8>)> {
   let key_len = read_u16(input)? as usize;
   if key_len == 0 || key_len > MAX_KEY_LEN {
      tracing::warn!("invalid cache key length: {key_len}");
      return None;
   }
   let mut key = vec![0u8; key_len];
   input.read_exact(&mut key).ok()?;

   let rsp_len = read_u16(input)? as usize;
   if rsp_len < RSP_HDR_SZ || rsp_len > RSP_MAX {
      tracing::warn!("invalid cached response length: {rsp_len}");
      return None;
   }
   let mut frame = vec![0u8; rsp_len];
   input.read_exact(&mut frame).ok()?;

   Some((key, frame))
}

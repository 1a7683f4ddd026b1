//! Document body lookup: path resolution and byte-wise keyword scanning.

use std::{
   ffi::OsStr,
   fs::File,
   io::{self, Read},
   os::unix::ffi::OsStrExt,
   path::{Path, PathBuf},
};

use crate::store::Document;

/// Chunk size for streaming scans.
const SCAN_BUF_SZ: usize = 8192;

/// Resolves a record's body file as `<docroot>/<relative path>`.
///
/// Returns `None` when the record carries no path at all.
pub fn build_path(docroot: &Path, doc: &Document) -> Option<PathBuf> {
   let rel = doc.rel_path();
   if rel.is_empty() {
      return None;
   }
   Some(docroot.join(OsStr::from_bytes(rel)))
}

/// Counts the lines of `path` that contain `kw` at least once.
///
/// The scan is strictly byte-wise: no regex, no Unicode normalisation. An
/// empty keyword matches nothing. A final line without a trailing newline
/// still counts when it matched. With `stop_at_first` the scan short-circuits
/// on the first full match and reports a count of one.
pub fn count_keyword(path: &Path, kw: &[u8], stop_at_first: bool) -> io::Result<usize> {
   let mut file = File::open(path)?;

   if kw.is_empty() {
      return Ok(0);
   }

   let mut buf = [0u8; SCAN_BUF_SZ];
   let mut count = 0usize;
   // Bytes of kw matched so far; reset on mismatch, partially retained when
   // the mismatching byte restarts the keyword.
   let mut match_pos = 0usize;
   // Whether the current line already contained a full match.
   let mut line_hit = false;

   loop {
      let n = file.read(&mut buf)?;
      if n == 0 {
         break;
      }

      for &byte in &buf[..n] {
         if byte == kw[match_pos] {
            match_pos += 1;
            if match_pos == kw.len() {
               line_hit = true;
               match_pos = 0;
               if stop_at_first {
                  return Ok(1);
               }
            }
         } else {
            match_pos = usize::from(byte == kw[0]);
         }

         if byte == b'\n' {
            if line_hit {
               count += 1;
            }
            line_hit = false;
         }
      }
   }

   if line_hit {
      count += 1; // last line had no newline
   }

   Ok(count)
}

/// Whether the file contains the keyword at all.
pub fn contains_keyword(path: &Path, kw: &[u8]) -> io::Result<bool> {
   count_keyword(path, kw, true).map(|n| n > 0)
}

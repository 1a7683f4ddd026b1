//! The six operation handlers.
//!
//! Handlers receive decoded arguments and produce a complete response frame;
//! the caller decides where that frame travels (worker pipe or direct
//! reply). Lookup misses are reported as human-readable string replies, not
//! as errors, so the client always receives a frame.

use std::{
   path::Path,
   sync::atomic::{AtomicU8, AtomicU64, Ordering},
   thread,
};

use crate::{
   Result,
   args::{ArgType, Args},
   command::Opcode,
   config,
   docs,
   error::Error,
   store::{Document, RecordStore},
   wire::{MAX_KEYWORD_LEN, Response},
};

/// Resources a handler may touch: the record store and the document root.
///
/// Blocking commands run against the server loop's own store handle; workers
/// open their own, so their reads may be stale but never torn.
#[derive(Debug, Clone, Copy)]
pub struct HandlerCtx<'a> {
   pub store:   &'a RecordStore,
   pub docroot: &'a Path,
}

/// Handler outcome: a reply, optionally ending the serve loop.
#[derive(Debug)]
pub enum Dispatch {
   Reply(Response),
   Shutdown(Response),
}

impl Dispatch {
   pub fn into_response(self) -> Response {
      match self {
         Self::Reply(rsp) | Self::Shutdown(rsp) => rsp,
      }
   }
}

/// Routes decoded arguments to the handler for `op`.
pub fn handle(op: Opcode, ctx: &HandlerCtx<'_>, args: &Args<'_>) -> Result<Dispatch> {
   match op {
      Opcode::Add => add(ctx, args),
      Opcode::Consult => consult(ctx, args),
      Opcode::Delete => delete(ctx, args),
      Opcode::List => list(ctx, args),
      Opcode::Search => search(ctx, args),
      Opcode::Flush => flush(),
   }
}

fn add(ctx: &HandlerCtx<'_>, args: &Args<'_>) -> Result<Dispatch> {
   let doc = Document::new(
      args.bytes(0)?,
      args.bytes(1)?,
      args.u32(2)?,
      args.bytes(3)?,
   );
   let key = ctx.store.append(&doc)?;

   let rsp = Response::simple(Opcode::Add, &format!("Document {key} indexed"))?;
   Ok(Dispatch::Reply(rsp))
}

fn consult(ctx: &HandlerCtx<'_>, args: &Args<'_>) -> Result<Dispatch> {
   let key = args.u32(0)? as i32;

   let Ok(doc) = ctx.store.get(key) else {
      let rsp = Response::simple(Opcode::Consult, "Document not found")?;
      return Ok(Dispatch::Reply(rsp));
   };

   let mut b = Response::builder(Opcode::Consult);
   for line in [
      format!("Title: {}", String::from_utf8_lossy(doc.title())),
      format!("Authors: {}", String::from_utf8_lossy(doc.authors())),
      format!("Year: {}", doc.year),
      format!("Path: {}", String::from_utf8_lossy(doc.rel_path())),
   ] {
      b.payload_mut().push(ArgType::Str.wire(), line.as_bytes())?;
   }

   Ok(Dispatch::Reply(b.finish()))
}

fn delete(ctx: &HandlerCtx<'_>, args: &Args<'_>) -> Result<Dispatch> {
   let key = args.u32(0)? as i32;

   let msg = match ctx.store.delete(key) {
      Ok(()) => format!("Index entry {key} deleted"),
      Err(_) => format!("Index entry {key} not found"),
   };

   Ok(Dispatch::Reply(Response::simple(Opcode::Delete, &msg)?))
}

fn list(ctx: &HandlerCtx<'_>, args: &Args<'_>) -> Result<Dispatch> {
   let key = args.u32(0)? as i32;
   let kw = truncate_keyword(args.bytes(1)?);

   let Ok(doc) = ctx.store.get(key) else {
      let rsp = Response::simple(Opcode::List, "Document not found")?;
      return Ok(Dispatch::Reply(rsp));
   };

   let Some(path) = docs::build_path(ctx.docroot, &doc) else {
      let rsp = Response::simple(Opcode::List, "Path not found")?;
      return Ok(Dispatch::Reply(rsp));
   };

   let count = docs::count_keyword(&path, kw, false)? as u32;

   let mut b = Response::builder(Opcode::List);
   b.payload_mut().push(ArgType::U32.wire(), &count.to_le_bytes())?;
   Ok(Dispatch::Reply(b.finish()))
}

fn search(ctx: &HandlerCtx<'_>, args: &Args<'_>) -> Result<Dispatch> {
   let kw_raw = args.bytes(0)?;
   let kw = truncate_keyword(kw_raw);
   let requested = args.opt_u32(1).filter(|w| *w != 0).unwrap_or(1);

   let total = ctx.store.total()?;
   if total == 0 {
      return Err(Error::EmptyStore);
   }

   let hits = scan_keys(ctx, kw, total, requested);

   let mut list = String::from("[");
   for (index, key) in hits.iter().enumerate() {
      if index > 0 {
         list.push_str(", ");
      }
      list.push_str(&key.to_string());
   }
   list.push(']');

   Ok(Dispatch::Reply(Response::simple(Opcode::Search, &list)?))
}

fn flush() -> Result<Dispatch> {
   let rsp = Response::simple(Opcode::Flush, "Server is shutting down")?;
   Ok(Dispatch::Shutdown(rsp))
}

fn truncate_keyword(kw: &[u8]) -> &[u8] {
   &kw[..kw.len().min(MAX_KEYWORD_LEN)]
}

/// Fans the key range out over scan workers.
///
/// Workers claim keys from a shared atomic counter and set one bit per hit
/// in a shared bitmap; both are scratch state private to this request. The
/// worker count is clamped to `min(requested, 10 × cpus, total)`. Keys whose
/// record is tombstoned or whose body cannot be read are skipped.
fn scan_keys(ctx: &HandlerCtx<'_>, kw: &[u8], total: u64, requested: u32) -> Vec<u64> {
   let per_cpu = config::get().scan_workers_per_cpu as u64;
   let workers = (requested as u64)
      .min(num_cpus::get() as u64 * per_cpu)
      .min(total)
      .max(1);

   let next_key = AtomicU64::new(0);
   let bitmap: Vec<AtomicU8> = (0..total.div_ceil(8)).map(|_| AtomicU8::new(0)).collect();

   thread::scope(|scope| {
      for _ in 0..workers {
         scope.spawn(|| {
            loop {
               let key = next_key.fetch_add(1, Ordering::Relaxed);
               if key >= total {
                  break;
               }
               if key_contains_keyword(ctx, key as i32, kw) {
                  bitmap[(key >> 3) as usize].fetch_or(1 << (key & 7), Ordering::Relaxed);
               }
            }
         });
      }
   });

   (0..total)
      .filter(|&key| bitmap[(key >> 3) as usize].load(Ordering::Relaxed) & (1 << (key & 7)) != 0)
      .collect()
}

fn key_contains_keyword(ctx: &HandlerCtx<'_>, key: i32, kw: &[u8]) -> bool {
   let Ok(doc) = ctx.store.get(key) else {
      return false; // tombstoned or out of range
   };
   let Some(path) = docs::build_path(ctx.docroot, &doc) else {
      return false;
   };
   docs::contains_keyword(&path, kw).unwrap_or_else(|e| {
      tracing::debug!("scan of {} failed: {e}", path.display());
      false
   })
}

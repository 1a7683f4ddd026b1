//! The request-serving loop.
//!
//! The server process is single-threaded and event-serial: it reads one
//! request at a time and either answers it inline (blocking commands, cache
//! hits) or hands it to one worker, whose response it collects before
//! accepting the next request. The loop is therefore the single owner of the
//! store-writing handle and the cache; total ordering of their mutations
//! falls out of that ownership.

use std::path::PathBuf;

use console::style;
use tokio::task;

use crate::{
   Result,
   cache::ResponseCache,
   command::{self, CommandSpec, Opcode},
   config,
   dispatch,
   error::Error,
   fifo::{self, RequestEndpoint},
   handlers::{Dispatch, HandlerCtx},
   store::RecordStore,
   wire::{Request, Response},
};

/// Everything a worker needs to serve one request on its own.
#[derive(Debug, Clone)]
struct WorkerCtx {
   store_path: PathBuf,
   docroot:    PathBuf,
}

/// Owned resources of the running server.
pub struct Server {
   store:    RecordStore,
   cache:    ResponseCache,
   docroot:  PathBuf,
   endpoint: RequestEndpoint,
   reply_dir: PathBuf,
}

/// Validates the docroot, opens store / cache / transport, and serves until
/// a flush request shuts the loop down.
pub async fn execute(docroot: PathBuf, cache_capacity: usize) -> Result<()> {
   if !docroot.is_dir() {
      return Err(Error::InvalidDocroot(docroot));
   }

   let cfg = config::get();
   let store = RecordStore::open(&cfg.store_file)?;
   let cache = ResponseCache::open(cfg.cache_file.clone(), cache_capacity);
   let endpoint = RequestEndpoint::bind(&cfg.request_fifo)?;

   println!("{}", style("Starting docdex server...").green().bold());
   println!("Listening: {}", style(endpoint.local_addr()).cyan());
   println!("Documents: {}", style(docroot.display()).dim());
   println!(
      "Cache: {} entries",
      style(cache.capacity().to_string()).cyan()
   );

   let mut server = Server {
      store,
      cache,
      docroot,
      endpoint,
      reply_dir: cfg.reply_dir.clone(),
   };
   server.serve().await;

   println!("{}", style("Server stopped").green());
   Ok(())
}

impl Server {
   async fn serve(&mut self) {
      loop {
         let req = match Request::read_from(self.endpoint.receiver()).await {
            Ok(req) => req,
            Err(e) => {
               tracing::warn!("dropping malformed request: {e}");
               continue;
            },
         };

         let Some(op) = Opcode::from_wire(req.opcode) else {
            tracing::debug!("dropping request with unknown opcode {}", req.opcode);
            continue;
         };
         let row = command::by_opcode(op);

         // Quick cache check before spawning anything.
         if op == Opcode::Search
            && let Ok(kw) = req.first_str()
            && let Some(hit) = self.cache.get(kw)
         {
            self.reply(req.pid, &hit).await;
            continue;
         }

         if !row.blocking {
            self.serve_in_worker(req, row).await;
            continue;
         }

         if self.serve_blocking(&req, row).await {
            break;
         }
      }

      if let Err(e) = self.cache.persist() {
         tracing::error!("failed to persist cache: {e}");
      }
   }

   /// Runs a non-blocking command in a worker and forwards its response.
   ///
   /// The worker always produces a frame (`"ERR"` when dispatch fails); a
   /// worker that dies without one loses the request, and the client times
   /// out just as it would on a reply-channel failure.
   async fn serve_in_worker(&mut self, req: Request, row: &'static CommandSpec) {
      let ctx = WorkerCtx {
         store_path: self.store.path().to_path_buf(),
         docroot:    self.docroot.clone(),
      };
      let pid = req.pid;
      let cache_key = (row.opcode == Opcode::Search)
         .then(|| req.first_str().ok().map(|kw| kw.to_vec()))
         .flatten();

      let frame = match task::spawn_blocking(move || worker_run(&ctx, &req, row)).await {
         Ok(frame) => frame,
         Err(e) => {
            tracing::error!("worker for {} died: {e}", row.flag);
            return;
         },
      };

      // Single-writer insert: only this loop ever touches the cache.
      if let Some(kw) = cache_key {
         self.cache.put(&kw, &frame);
      }

      self.reply(pid, &frame).await;
   }

   /// Runs a blocking command inline; returns true when the loop must stop.
   async fn serve_blocking(&mut self, req: &Request, row: &'static CommandSpec) -> bool {
      let ctx = HandlerCtx {
         store:   &self.store,
         docroot: &self.docroot,
      };

      match dispatch::dispatch(&ctx, req, row) {
         Ok(Dispatch::Reply(rsp)) => {
            self.reply(req.pid, &rsp.encode()).await;
            false
         },
         Ok(Dispatch::Shutdown(rsp)) => {
            self.reply(req.pid, &rsp.encode()).await;
            true
         },
         Err(e) => {
            tracing::warn!("request {} failed: {e}", row.flag);
            false
         },
      }
   }

   async fn reply(&self, pid: i32, frame: &[u8]) {
      if let Err(e) = fifo::reply(&self.reply_dir, pid, frame).await {
         tracing::warn!("failed to reply to client {pid}: {e}");
      }
   }
}

/// Worker body: open a private store handle, dispatch, and always hand back
/// a frame so the parent can answer the client.
fn worker_run(ctx: &WorkerCtx, req: &Request, row: &'static CommandSpec) -> Vec<u8> {
   let dispatched = RecordStore::open(&ctx.store_path)
      .map_err(Error::from)
      .and_then(|store| {
         let hctx = HandlerCtx { store: &store, docroot: &ctx.docroot };
         dispatch::dispatch(&hctx, req, row)
      });

   match dispatched {
      Ok(outcome) => outcome.into_response().encode().to_vec(),
      Err(e) => {
         tracing::warn!("worker dispatch for {} failed: {e}", row.flag);
         err_frame(row)
      },
   }
}

fn err_frame(row: &CommandSpec) -> Vec<u8> {
   match Response::simple(row.opcode, "ERR") {
      Ok(rsp) => rsp.encode().to_vec(),
      Err(_) => Vec::new(),
   }
}

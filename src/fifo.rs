//! Named-pipe transport.
//!
//! All requests arrive on one well-known FIFO owned by the server; every
//! client owns a private reply FIFO named after its pid, which the server
//! opens write-only for exactly one response. Each side removes its own
//! endpoint at shutdown.

use std::{
   ffi::CString,
   fs, io,
   os::unix::ffi::OsStrExt,
   path::{Path, PathBuf},
};

use tokio::{
   io::AsyncWriteExt,
   net::unix::pipe,
};

use crate::error::TransportError;

/// FIFO permissions: owner only.
const FIFO_PERM: u32 = 0o600;

/// Reply FIFO path for a client pid.
pub fn reply_path(dir: &Path, pid: i32) -> PathBuf {
   dir.join(format!("client_{pid}.fifo"))
}

fn mkfifo(path: &Path) -> io::Result<()> {
   let cpath = CString::new(path.as_os_str().as_bytes()).map_err(io::Error::other)?;
   match unsafe { libc::mkfifo(cpath.as_ptr(), FIFO_PERM as libc::mode_t) } {
      0 => Ok(()),
      _ => {
         let err = io::Error::last_os_error();
         if err.raw_os_error() == Some(libc::EEXIST) {
            Ok(())
         } else {
            Err(err)
         }
      },
   }
}

fn remove_stale(path: &Path) -> Result<(), TransportError> {
   match fs::remove_file(path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(TransportError::RemoveStale(e)),
   }
}

/// Creates a FIFO at `path` and opens its read end.
///
/// The descriptor is opened read-write so the reader never observes EOF when
/// the last writer disconnects between requests.
fn bind_receiver(path: &Path) -> Result<pipe::Receiver, TransportError> {
   remove_stale(path)?;
   mkfifo(path).map_err(|source| TransportError::CreateFifo {
      path: path.to_path_buf(),
      source,
   })?;

   pipe::OpenOptions::new()
      .read_write(true)
      .open_receiver(path)
      .map_err(TransportError::OpenReceiver)
}

/// Server side: the well-known request FIFO.
///
/// Unlinks its path when dropped.
#[derive(Debug)]
pub struct RequestEndpoint {
   rx:   pipe::Receiver,
   path: PathBuf,
}

impl RequestEndpoint {
   pub fn bind(path: &Path) -> Result<Self, TransportError> {
      let rx = bind_receiver(path)?;
      Ok(Self { rx, path: path.to_path_buf() })
   }

   pub fn receiver(&mut self) -> &mut pipe::Receiver {
      &mut self.rx
   }

   pub fn local_addr(&self) -> String {
      self.path.display().to_string()
   }
}

impl Drop for RequestEndpoint {
   fn drop(&mut self) {
      let _ = fs::remove_file(&self.path);
   }
}

/// Sends one response frame to a client's reply FIFO and closes it.
pub async fn reply(dir: &Path, pid: i32, frame: &[u8]) -> Result<(), TransportError> {
   let path = reply_path(dir, pid);
   let mut tx = pipe::OpenOptions::new()
      .open_sender(&path)
      .map_err(TransportError::OpenReply)?;

   tx.write_all(frame)
      .await
      .map_err(TransportError::WriteReply)
}

/// Client side: a private reply FIFO plus a sender to the server.
///
/// Unlinks the private FIFO when dropped.
#[derive(Debug)]
pub struct ClientEndpoint {
   rx:   pipe::Receiver,
   tx:   pipe::Sender,
   path: PathBuf,
}

impl ClientEndpoint {
   /// Creates the private reply FIFO, then connects to the server's request
   /// FIFO. The connect fails immediately when no server holds the read end.
   pub fn connect(request_fifo: &Path, reply_dir: &Path) -> Result<Self, TransportError> {
      let path = reply_path(reply_dir, std::process::id() as i32);

      // Open our own read end first so the reply cannot race the send.
      let rx = bind_receiver(&path)?;

      let tx = match pipe::OpenOptions::new().open_sender(request_fifo) {
         Ok(tx) => tx,
         Err(e) => {
            let _ = fs::remove_file(&path);
            return Err(TransportError::ServerUnavailable(e));
         },
      };

      Ok(Self { rx, tx, path })
   }

   pub fn receiver(&mut self) -> &mut pipe::Receiver {
      &mut self.rx
   }

   pub fn sender(&mut self) -> &mut pipe::Sender {
      &mut self.tx
   }
}

impl Drop for ClientEndpoint {
   fn drop(&mut self) {
      let _ = fs::remove_file(&self.path);
   }
}

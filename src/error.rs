use std::{io, path::PathBuf};

use thiserror::Error;

/// Main error type for the docdex binaries.
///
/// Wraps the per-subsystem errors (wire protocol, record store, response
/// cache, FIFO transport) together with the few top-level failures that have
/// no subsystem of their own.
#[derive(Debug, Error)]
pub enum Error {
   /// I/O error occurred outside a more specific subsystem.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// Wire codec error: malformed frame, bad TLV, or failed frame I/O.
   #[error("protocol error: {0}")]
   Protocol(#[from] ProtocolError),

   /// Record store error: bad key, tombstoned record, or file I/O failure.
   #[error("store error: {0}")]
   Store(#[from] StoreError),

   /// Response cache persistence error.
   #[error("cache error: {0}")]
   Cache(#[from] CacheError),

   /// FIFO transport error.
   #[error("transport error: {0}")]
   Transport(#[from] TransportError),

   /// Command-line arguments did not match any command row.
   #[error("invalid command: {0}")]
   InvalidCommand(String),

   /// The configured document folder does not exist or is not a directory.
   #[error("document folder {0} is not a directory")]
   InvalidDocroot(PathBuf),

   /// A search was issued against a store with no records at all.
   #[error("no documents indexed")]
   EmptyStore,
}

/// Errors produced by the TLV frame codec and frame-level I/O.
#[derive(Debug, Error)]
pub enum ProtocolError {
   /// Declared frame length is below the header size or above the maximum.
   #[error("invalid frame length: {0}")]
   LengthOutOfRange(u16),

   /// TLV value length does not fit the u16 length field.
   #[error("tlv value length {0} exceeds maximum")]
   ValueTooLong(usize),

   /// Appending the TLV would overflow the payload capacity.
   #[error("tlv would exceed payload capacity")]
   PayloadOverflow,

   /// A TLV's declared length overshoots the end of the payload.
   #[error("corrupt tlv: declared length overruns the payload")]
   CorruptTlv,

   /// First payload argument is absent, not a string, empty, or oversized.
   #[error("invalid or missing string argument")]
   InvalidFirstArg,

   /// Wire type byte does not name a known argument type.
   #[error("unknown argument type {0}")]
   UnknownArgType(u8),

   /// A u32 argument arrived with a value length other than four bytes.
   #[error("invalid length {0} for u32 argument")]
   BadU32Len(u16),

   /// Textual token could not be encoded as a decimal u32.
   #[error("invalid number: {0}")]
   InvalidNumber(String),

   /// Fewer TLVs than the command row's minimum arity.
   #[error("missing required argument {index} for {flag}")]
   MissingArgument { index: usize, flag: &'static str },

   /// TLV type differs from the command row's type vector.
   #[error("argument {index} has type {actual} (expected {expected})")]
   TypeMismatch {
      index:    usize,
      expected: u8,
      actual:   u8,
   },

   /// Decoded argument was accessed as the wrong variant.
   #[error("argument {0} has an unexpected type")]
   WrongArgKind(usize),

   #[error("failed to read frame: {0}")]
   Read(#[source] io::Error),

   #[error("failed to write frame: {0}")]
   Write(#[source] io::Error),
}

/// Errors produced by the fixed-record store.
#[derive(Debug, Error)]
pub enum StoreError {
   #[error("failed to open store file {path}: {source}", path = path.display())]
   Open {
      path:   PathBuf,
      #[source]
      source: io::Error,
   },

   #[error("failed to read store size: {0}")]
   Size(#[source] io::Error),

   #[error("failed to read record: {0}")]
   Read(#[source] io::Error),

   #[error("failed to write record: {0}")]
   Write(#[source] io::Error),

   /// Negative key, or offset past the end of the file.
   #[error("document key out of range: {0}")]
   OutOfRange(i32),

   /// The slot holds a tombstone or a record with a different key.
   #[error("document deleted or corrupted: {0}")]
   Missing(i32),
}

/// Errors produced while persisting the response cache.
#[derive(Debug, Error)]
pub enum CacheError {
   #[error("failed to create cache file: {0}")]
   Create(#[source] io::Error),

   #[error("failed to write cache entry: {0}")]
   Write(#[source] io::Error),
}

/// Errors produced by the named-pipe transport.
#[derive(Debug, Error)]
pub enum TransportError {
   #[error("failed to create fifo {path}: {source}", path = path.display())]
   CreateFifo {
      path:   PathBuf,
      #[source]
      source: io::Error,
   },

   #[error("failed to remove stale fifo: {0}")]
   RemoveStale(#[source] io::Error),

   #[error("failed to open fifo for reading: {0}")]
   OpenReceiver(#[source] io::Error),

   /// No server process holds the read end of the request FIFO.
   #[error("server not available: {0}")]
   ServerUnavailable(#[source] io::Error),

   #[error("failed to open reply fifo: {0}")]
   OpenReply(#[source] io::Error),

   #[error("failed to write reply: {0}")]
   WriteReply(#[source] io::Error),
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;

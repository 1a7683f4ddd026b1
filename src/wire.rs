//! Binary TLV wire protocol shared by client and server.
//!
//! Frame layout, little-endian and packed:
//!
//! ```text
//! ┌──────────────────────────────────┬──────────────────────────────┐
//! │ request header (7 bytes)         │ payload: back-to-back TLVs   │
//! │ len: u16  opcode: u8  pid: i32   │ {type: u8, len: u16, value}  │
//! ├──────────────────────────────────┼──────────────────────────────┤
//! │ response header (4 bytes)        │ payload: back-to-back TLVs   │
//! │ len: u16  opcode: u8  status: u8 │                              │
//! └──────────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! `len` counts the header plus every TLV; the whole frame is capped at
//! 65535 bytes. Builders never partially mutate their payload on failure:
//! callers observe either a fully appended TLV or an untouched buffer.

use smallvec::SmallVec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{args::ArgType, error::ProtocolError};

/// Maximum total size of a request frame.
pub const REQ_MAX: usize = 65535;
/// Maximum total size of a response frame.
pub const RSP_MAX: usize = 65535;
/// Request header size: `{len: u16, opcode: u8, pid: i32}`.
pub const REQ_HDR_SZ: usize = 7;
/// Response header size: `{len: u16, opcode: u8, status: u8}`.
pub const RSP_HDR_SZ: usize = 4;
/// TLV header size: `{type: u8, len: u16}`.
pub const TLV_HDR_SZ: usize = 3;
/// Longest keyword accepted by the first-argument extractor.
pub const MAX_KEYWORD_LEN: usize = 255;

/// Stack-allocated buffer for frame assembly; typical frames are tiny.
pub type FrameBuf = SmallVec<[u8; 512]>;

/// Bounded TLV payload under construction.
#[derive(Debug)]
pub struct PayloadBuilder {
   buf: FrameBuf,
   cap: usize,
}

impl PayloadBuilder {
   fn new(cap: usize) -> Self {
      Self { buf: FrameBuf::new(), cap }
   }

   /// Appends one `{type, len, value}` TLV.
   ///
   /// Fails without touching the buffer when the value does not fit the u16
   /// length field or the payload capacity.
   pub fn push(&mut self, ty: u8, value: &[u8]) -> Result<(), ProtocolError> {
      if value.len() > u16::MAX as usize {
         return Err(ProtocolError::ValueTooLong(value.len()));
      }
      if self.buf.len() + TLV_HDR_SZ + value.len() > self.cap {
         return Err(ProtocolError::PayloadOverflow);
      }

      self.buf.push(ty);
      self
         .buf
         .extend_from_slice(&(value.len() as u16).to_le_bytes());
      self.buf.extend_from_slice(value);
      Ok(())
   }

   pub fn len(&self) -> usize {
      self.buf.len()
   }

   pub fn is_empty(&self) -> bool {
      self.buf.is_empty()
   }
}

/// One decoded TLV borrowing its value from the frame payload.
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
   pub ty:    u8,
   pub value: &'a [u8],
}

/// Forward-only decoder over a borrowed TLV payload.
///
/// `next` yields `Ok(Some(tlv))` per entry, `Ok(None)` once the payload is
/// cleanly exhausted, and an error when a declared value length overruns the
/// buffer.
#[derive(Debug)]
pub struct TlvCursor<'a> {
   buf: &'a [u8],
   pos: usize,
}

impl<'a> TlvCursor<'a> {
   pub fn new(payload: &'a [u8]) -> Self {
      Self { buf: payload, pos: 0 }
   }

   pub fn next(&mut self) -> Result<Option<Tlv<'a>>, ProtocolError> {
      if self.pos + TLV_HDR_SZ > self.buf.len() {
         return Ok(None);
      }

      let ty = self.buf[self.pos];
      let len = u16::from_le_bytes([self.buf[self.pos + 1], self.buf[self.pos + 2]]) as usize;
      let start = self.pos + TLV_HDR_SZ;

      if start + len > self.buf.len() {
         return Err(ProtocolError::CorruptTlv);
      }

      self.pos = start + len;
      Ok(Some(Tlv { ty, value: &self.buf[start..start + len] }))
   }
}

/// A request frame: opcode, sender pid, TLV payload.
#[derive(Debug, Clone)]
pub struct Request {
   pub opcode: u8,
   pub pid:    i32,
   payload:    FrameBuf,
}

impl Request {
   /// Starts a request for the calling process.
   pub fn builder(opcode: impl Into<u8>) -> RequestBuilder {
      RequestBuilder {
         opcode:  opcode.into(),
         pid:     std::process::id() as i32,
         payload: PayloadBuilder::new(REQ_MAX - REQ_HDR_SZ),
      }
   }

   pub fn payload(&self) -> &[u8] {
      &self.payload
   }

   /// Extracts the first argument as a keyword: the payload must start with
   /// a non-empty string TLV of at most [`MAX_KEYWORD_LEN`] bytes.
   pub fn first_str(&self) -> Result<&[u8], ProtocolError> {
      let mut cur = TlvCursor::new(self.payload());
      match cur.next() {
         Ok(Some(tlv))
            if tlv.ty == ArgType::Str.wire()
               && !tlv.value.is_empty()
               && tlv.value.len() <= MAX_KEYWORD_LEN =>
         {
            Ok(tlv.value)
         },
         _ => Err(ProtocolError::InvalidFirstArg),
      }
   }

   /// Serialises header + payload into one wire image.
   pub fn encode(&self) -> FrameBuf {
      let total = REQ_HDR_SZ + self.payload.len();
      let mut buf = FrameBuf::with_capacity(total);
      buf.extend_from_slice(&(total as u16).to_le_bytes());
      buf.push(self.opcode);
      buf.extend_from_slice(&self.pid.to_le_bytes());
      buf.extend_from_slice(&self.payload);
      buf
   }

   /// Reads one frame: exact header first, then the declared payload.
   pub async fn read_from<R>(reader: &mut R) -> Result<Self, ProtocolError>
   where
      R: AsyncRead + Unpin,
   {
      let mut hdr = [0u8; REQ_HDR_SZ];
      reader
         .read_exact(&mut hdr)
         .await
         .map_err(ProtocolError::Read)?;

      let len = u16::from_le_bytes([hdr[0], hdr[1]]);
      if (len as usize) < REQ_HDR_SZ || len as usize > REQ_MAX {
         return Err(ProtocolError::LengthOutOfRange(len));
      }

      let opcode = hdr[2];
      let pid = i32::from_le_bytes([hdr[3], hdr[4], hdr[5], hdr[6]]);

      let mut payload = FrameBuf::new();
      payload.resize(len as usize - REQ_HDR_SZ, 0u8);
      reader
         .read_exact(&mut payload)
         .await
         .map_err(ProtocolError::Read)?;

      Ok(Self { opcode, pid, payload })
   }

   pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), ProtocolError>
   where
      W: AsyncWrite + Unpin,
   {
      writer
         .write_all(&self.encode())
         .await
         .map_err(ProtocolError::Write)?;
      writer.flush().await.map_err(ProtocolError::Write)
   }
}

/// Request under construction; `finish` stamps the total length.
#[derive(Debug)]
pub struct RequestBuilder {
   opcode:  u8,
   pid:     i32,
   payload: PayloadBuilder,
}

impl RequestBuilder {
   pub fn payload_mut(&mut self) -> &mut PayloadBuilder {
      &mut self.payload
   }

   pub fn finish(self) -> Request {
      Request {
         opcode:  self.opcode,
         pid:     self.pid,
         payload: self.payload.buf,
      }
   }
}

/// A response frame: echoed opcode, status byte, TLV payload.
#[derive(Debug, Clone)]
pub struct Response {
   pub opcode: u8,
   pub status: u8,
   payload:    FrameBuf,
}

impl Response {
   pub fn builder(opcode: impl Into<u8>) -> ResponseBuilder {
      ResponseBuilder {
         opcode:  opcode.into(),
         status:  0,
         payload: PayloadBuilder::new(RSP_MAX - RSP_HDR_SZ),
      }
   }

   /// Builds a response carrying a single string TLV.
   pub fn simple(opcode: impl Into<u8>, msg: &str) -> Result<Self, ProtocolError> {
      let mut b = Self::builder(opcode);
      b.payload_mut().push(ArgType::Str.wire(), msg.as_bytes())?;
      Ok(b.finish())
   }

   pub fn payload(&self) -> &[u8] {
      &self.payload
   }

   pub fn encode(&self) -> FrameBuf {
      let total = RSP_HDR_SZ + self.payload.len();
      let mut buf = FrameBuf::with_capacity(total);
      buf.extend_from_slice(&(total as u16).to_le_bytes());
      buf.push(self.opcode);
      buf.push(self.status);
      buf.extend_from_slice(&self.payload);
      buf
   }

   /// Parses a complete frame image, e.g. one loaded from the cache file.
   pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
      if frame.len() < RSP_HDR_SZ || frame.len() > RSP_MAX {
         return Err(ProtocolError::LengthOutOfRange(frame.len().min(u16::MAX as usize) as u16));
      }

      let len = u16::from_le_bytes([frame[0], frame[1]]);
      if len as usize != frame.len() {
         return Err(ProtocolError::LengthOutOfRange(len));
      }

      let mut payload = FrameBuf::new();
      payload.extend_from_slice(&frame[RSP_HDR_SZ..]);
      Ok(Self { opcode: frame[2], status: frame[3], payload })
   }

   pub async fn read_from<R>(reader: &mut R) -> Result<Self, ProtocolError>
   where
      R: AsyncRead + Unpin,
   {
      let mut hdr = [0u8; RSP_HDR_SZ];
      reader
         .read_exact(&mut hdr)
         .await
         .map_err(ProtocolError::Read)?;

      let len = u16::from_le_bytes([hdr[0], hdr[1]]);
      if (len as usize) < RSP_HDR_SZ || len as usize > RSP_MAX {
         return Err(ProtocolError::LengthOutOfRange(len));
      }

      let mut payload = FrameBuf::new();
      payload.resize(len as usize - RSP_HDR_SZ, 0u8);
      reader
         .read_exact(&mut payload)
         .await
         .map_err(ProtocolError::Read)?;

      Ok(Self { opcode: hdr[2], status: hdr[3], payload })
   }

   pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), ProtocolError>
   where
      W: AsyncWrite + Unpin,
   {
      writer
         .write_all(&self.encode())
         .await
         .map_err(ProtocolError::Write)?;
      writer.flush().await.map_err(ProtocolError::Write)
   }
}

/// Response under construction.
#[derive(Debug)]
pub struct ResponseBuilder {
   opcode:  u8,
   status:  u8,
   payload: PayloadBuilder,
}

impl ResponseBuilder {
   pub fn payload_mut(&mut self) -> &mut PayloadBuilder {
      &mut self.payload
   }

   pub fn finish(self) -> Response {
      Response {
         opcode:  self.opcode,
         status:  self.status,
         payload: self.payload.buf,
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn cursor_walks_tlvs_then_reports_exhaustion() {
      let mut b = PayloadBuilder::new(128);
      b.push(1, b"banana").unwrap();
      b.push(0, &42u32.to_le_bytes()).unwrap();

      let mut cur = TlvCursor::new(&b.buf);
      let first = cur.next().unwrap().unwrap();
      assert_eq!(first.ty, 1);
      assert_eq!(first.value, b"banana");
      let second = cur.next().unwrap().unwrap();
      assert_eq!(second.ty, 0);
      assert_eq!(second.value, 42u32.to_le_bytes());
      assert!(cur.next().unwrap().is_none());
   }

   #[test]
   fn cursor_rejects_overlong_declared_length() {
      // Declares 200 value bytes but carries only three.
      let raw = [1u8, 200, 0, b'a', b'b', b'c'];
      let mut cur = TlvCursor::new(&raw);
      assert!(matches!(cur.next(), Err(ProtocolError::CorruptTlv)));
   }

   #[test]
   fn builder_overflow_leaves_payload_untouched() {
      let mut b = PayloadBuilder::new(16);
      b.push(1, b"0123456789").unwrap();
      let before = b.len();
      assert!(matches!(
         b.push(1, b"overflow"),
         Err(ProtocolError::PayloadOverflow)
      ));
      assert_eq!(b.len(), before);
   }

   #[test]
   fn request_header_length_is_self_consistent() {
      let mut b = Request::builder(4u8);
      b.payload_mut().push(1, b"kw").unwrap();
      let frame = b.finish().encode();

      let declared = u16::from_le_bytes([frame[0], frame[1]]) as usize;
      assert_eq!(declared, frame.len());
      assert_eq!(declared, REQ_HDR_SZ + TLV_HDR_SZ + 2);
   }

   #[test]
   fn first_str_requires_leading_nonempty_string() {
      let mut b = Request::builder(4u8);
      b.payload_mut().push(1, b"needle").unwrap();
      let req = b.finish();
      assert_eq!(req.first_str().unwrap(), b"needle");

      let mut b = Request::builder(4u8);
      b.payload_mut().push(0, &7u32.to_le_bytes()).unwrap();
      assert!(b.finish().first_str().is_err());

      let empty = Request::builder(4u8).finish();
      assert!(empty.first_str().is_err());
   }

   #[test]
   fn response_decode_round_trips_encode() {
      let rsp = Response::simple(5u8, "Server is shutting down").unwrap();
      let frame = rsp.encode();
      let back = Response::decode(&frame).unwrap();
      assert_eq!(back.opcode, 5);
      assert_eq!(back.status, 0);
      assert_eq!(back.payload(), rsp.payload());
   }

   #[tokio::test]
   async fn request_round_trips_through_a_byte_stream() {
      let mut b = Request::builder(0u8);
      b.payload_mut().push(1, b"T").unwrap();
      b.payload_mut().push(1, b"A").unwrap();
      b.payload_mut().push(0, &2020u32.to_le_bytes()).unwrap();
      b.payload_mut().push(1, b"p.txt").unwrap();
      let req = b.finish();

      let mut stream = Vec::new();
      req.write_to(&mut stream).await.unwrap();
      let back = Request::read_from(&mut stream.as_slice()).await.unwrap();

      assert_eq!(back.opcode, req.opcode);
      assert_eq!(back.pid, req.pid);
      assert_eq!(back.payload(), req.payload());
   }

   #[tokio::test]
   async fn read_rejects_length_below_header_size() {
      let bogus = [3u8, 0, 0, 0, 0, 0, 0];
      let result = Request::read_from(&mut bogus.as_slice()).await;
      assert!(matches!(result, Err(ProtocolError::LengthOutOfRange(3))));
   }
}

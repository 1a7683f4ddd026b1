//! Typed argument codec between textual tokens and wire TLVs.

use crate::{
   error::ProtocolError,
   wire::PayloadBuilder,
};

/// The two argument types the protocol carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArgType {
   /// 32-bit little-endian unsigned integer.
   U32 = 0,
   /// Raw bytes, not NUL-terminated on the wire.
   Str = 1,
}

impl ArgType {
   pub const fn wire(self) -> u8 {
      self as u8
   }

   pub const fn from_wire(byte: u8) -> Option<Self> {
      match byte {
         0 => Some(Self::U32),
         1 => Some(Self::Str),
         _ => None,
      }
   }

   /// Encodes one textual token as a TLV of this type.
   ///
   /// `U32` parses a decimal string, rejecting empty, non-numeric and
   /// out-of-range inputs; `Str` forwards the bytes unchanged.
   pub fn encode(self, builder: &mut PayloadBuilder, raw: &str) -> Result<(), ProtocolError> {
      match self {
         Self::U32 => {
            let value: u32 = raw
               .parse()
               .map_err(|_| ProtocolError::InvalidNumber(raw.to_string()))?;
            builder.push(self.wire(), &value.to_le_bytes())
         },
         Self::Str => builder.push(self.wire(), raw.as_bytes()),
      }
   }

   /// Decodes one TLV value of this type.
   pub fn decode(self, value: &[u8]) -> Result<ArgValue<'_>, ProtocolError> {
      match self {
         Self::U32 => {
            let Some((word, rest)) = value.split_first_chunk::<4>() else {
               return Err(ProtocolError::BadU32Len(value.len() as u16));
            };
            if !rest.is_empty() {
               return Err(ProtocolError::BadU32Len(value.len() as u16));
            }
            Ok(ArgValue::U32(u32::from_le_bytes(*word)))
         },
         Self::Str => Ok(ArgValue::Str(value)),
      }
   }
}

/// One decoded argument, borrowing string bytes from the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgValue<'a> {
   U32(u32),
   Str(&'a [u8]),
}

/// Positional view over a request's decoded arguments.
///
/// The dispatcher has already enforced the command row's type vector, so the
/// typed accessors only fail on a caller-side indexing mistake.
#[derive(Debug)]
pub struct Args<'a>(Vec<ArgValue<'a>>);

impl<'a> Args<'a> {
   pub fn new(values: Vec<ArgValue<'a>>) -> Self {
      Self(values)
   }

   pub fn len(&self) -> usize {
      self.0.len()
   }

   pub fn is_empty(&self) -> bool {
      self.0.is_empty()
   }

   pub fn u32(&self, index: usize) -> Result<u32, ProtocolError> {
      match self.0.get(index) {
         Some(ArgValue::U32(v)) => Ok(*v),
         _ => Err(ProtocolError::WrongArgKind(index)),
      }
   }

   pub fn bytes(&self, index: usize) -> Result<&'a [u8], ProtocolError> {
      match self.0.get(index) {
         Some(ArgValue::Str(v)) => Ok(v),
         _ => Err(ProtocolError::WrongArgKind(index)),
      }
   }

   /// Optional trailing u32, absent when the client omitted it.
   pub fn opt_u32(&self, index: usize) -> Option<u32> {
      match self.0.get(index) {
         Some(ArgValue::U32(v)) => Some(*v),
         _ => None,
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::wire::{Request, TlvCursor};

   fn collect(payload: &[u8]) -> Vec<(u8, Vec<u8>)> {
      let mut cur = TlvCursor::new(payload);
      let mut out = Vec::new();
      while let Some(tlv) = cur.next().unwrap() {
         out.push((tlv.ty, tlv.value.to_vec()));
      }
      out
   }

   #[test]
   fn u32_token_round_trips() {
      let mut b = Request::builder(4u8);
      ArgType::U32.encode(b.payload_mut(), "42").unwrap();
      let req = b.finish();

      let tlvs = collect(req.payload());
      assert_eq!(tlvs, vec![(0u8, 42u32.to_le_bytes().to_vec())]);

      let decoded = ArgType::U32.decode(&tlvs[0].1).unwrap();
      assert_eq!(decoded, ArgValue::U32(42));
   }

   #[test]
   fn u32_encoder_rejects_bad_tokens() {
      for raw in ["", "12x", "-3", "4294967296"] {
         let mut b = Request::builder(4u8);
         assert!(
            ArgType::U32.encode(b.payload_mut(), raw).is_err(),
            "token {raw:?} should be rejected"
         );
      }
   }

   #[test]
   fn u32_decoder_requires_four_bytes() {
      assert!(matches!(
         ArgType::U32.decode(b"abc"),
         Err(ProtocolError::BadU32Len(3))
      ));
      assert!(matches!(
         ArgType::U32.decode(b"abcde"),
         Err(ProtocolError::BadU32Len(5))
      ));
   }

   #[test]
   fn str_bytes_pass_through_unchanged() {
      let mut b = Request::builder(4u8);
      ArgType::Str.encode(b.payload_mut(), "banana").unwrap();
      let req = b.finish();

      let tlvs = collect(req.payload());
      assert_eq!(tlvs, vec![(1u8, b"banana".to_vec())]);
      assert_eq!(
         ArgType::Str.decode(&tlvs[0].1).unwrap(),
         ArgValue::Str(b"banana")
      );
   }

   #[test]
   fn unknown_wire_type_is_rejected() {
      assert!(ArgType::from_wire(2).is_none());
   }
}

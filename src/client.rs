//! One-shot client: build a request, send it, print the reply.

use crate::{
   Result,
   args::{ArgType, ArgValue},
   command,
   config,
   error::ProtocolError,
   fifo::ClientEndpoint,
   wire::{Request, Response, TlvCursor},
};

/// Parses `<flag> [args…]`, performs one request/response exchange, and
/// prints each reply TLV on its own line.
pub async fn execute(tokens: &[String]) -> Result<()> {
   let (row, operands) = command::parse(tokens)?;

   let mut builder = Request::builder(row.opcode);
   for (index, raw) in operands.iter().enumerate() {
      row.types[index].encode(builder.payload_mut(), raw)?;
   }
   let req = builder.finish();

   let cfg = config::get();
   let mut endpoint = ClientEndpoint::connect(&cfg.request_fifo, &cfg.reply_dir)?;

   req.write_to(endpoint.sender()).await?;
   let rsp = Response::read_from(endpoint.receiver()).await?;

   print_response(&rsp)
}

/// Walks the response TLVs: strings become text lines, u32 values decimal
/// lines. A corrupt or unknown TLV aborts with a protocol error.
fn print_response(rsp: &Response) -> Result<()> {
   let mut cursor = TlvCursor::new(rsp.payload());

   while let Some(tlv) = cursor.next()? {
      let Some(ty) = ArgType::from_wire(tlv.ty) else {
         return Err(ProtocolError::UnknownArgType(tlv.ty).into());
      };

      match ty.decode(tlv.value)? {
         ArgValue::Str(bytes) => println!("{}", String::from_utf8_lossy(bytes)),
         ArgValue::U32(value) => println!("{value}"),
      }
   }

   Ok(())
}

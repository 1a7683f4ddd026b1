//! Request dispatching: argument decoding and handler invocation.

use crate::{
   Result,
   args::{ArgValue, Args},
   command::CommandSpec,
   error::ProtocolError,
   handlers::{self, Dispatch, HandlerCtx},
   wire::{Request, TlvCursor},
};

/// Decodes the request's arguments against the command row and invokes the
/// matching handler.
pub fn dispatch(ctx: &HandlerCtx<'_>, req: &Request, row: &'static CommandSpec) -> Result<Dispatch> {
   let args = decode_args(req, row)?;
   handlers::handle(row.opcode, ctx, &args)
}

/// Walks the TLV cursor for up to `argc_max` entries, enforcing the row's
/// type vector and minimum arity. Optional trailing arguments may simply be
/// absent.
fn decode_args<'a>(req: &'a Request, row: &'static CommandSpec) -> Result<Args<'a>, ProtocolError> {
   let mut cursor = TlvCursor::new(req.payload());
   let mut values: Vec<ArgValue<'a>> = Vec::with_capacity(row.argc_max());

   for index in 0..row.argc_max() {
      let Some(tlv) = cursor.next()? else {
         if index < row.argc_min {
            return Err(ProtocolError::MissingArgument { index, flag: row.flag });
         }
         break;
      };

      let expected = row.types[index];
      if tlv.ty != expected.wire() {
         return Err(ProtocolError::TypeMismatch {
            index,
            expected: expected.wire(),
            actual: tlv.ty,
         });
      }

      values.push(expected.decode(tlv.value)?);
   }

   Ok(Args::new(values))
}

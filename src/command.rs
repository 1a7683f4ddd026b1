//! Static command table: one row per opcode.

use crate::{
   args::ArgType,
   error::Error,
};

/// Protocol operation codes, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
   Add = 0,
   Consult = 1,
   Delete = 2,
   List = 3,
   Search = 4,
   Flush = 5,
}

impl Opcode {
   pub const fn wire(self) -> u8 {
      self as u8
   }

   pub const fn from_wire(byte: u8) -> Option<Self> {
      match byte {
         0 => Some(Self::Add),
         1 => Some(Self::Consult),
         2 => Some(Self::Delete),
         3 => Some(Self::List),
         4 => Some(Self::Search),
         5 => Some(Self::Flush),
         _ => None,
      }
   }
}

impl From<Opcode> for u8 {
   fn from(op: Opcode) -> Self {
      op.wire()
   }
}

/// Per-opcode description: flag token, argument types, arity, blocking bit.
///
/// Blocking rows run in the server loop and therefore serialise with other
/// requests; non-blocking rows are handed to a worker.
#[derive(Debug)]
pub struct CommandSpec {
   pub flag:     &'static str,
   pub types:    &'static [ArgType],
   pub argc_min: usize,
   pub opcode:   Opcode,
   pub blocking: bool,
}

impl CommandSpec {
   pub fn argc_max(&self) -> usize {
      self.types.len()
   }
}

/// The command table, indexed by opcode.
pub static COMMANDS: [CommandSpec; 6] = [
   CommandSpec {
      flag:     "-a",
      types:    &[ArgType::Str, ArgType::Str, ArgType::U32, ArgType::Str],
      argc_min: 4,
      opcode:   Opcode::Add,
      blocking: true,
   },
   CommandSpec {
      flag:     "-c",
      types:    &[ArgType::U32],
      argc_min: 1,
      opcode:   Opcode::Consult,
      blocking: false,
   },
   CommandSpec {
      flag:     "-d",
      types:    &[ArgType::U32],
      argc_min: 1,
      opcode:   Opcode::Delete,
      blocking: true,
   },
   CommandSpec {
      flag:     "-l",
      types:    &[ArgType::U32, ArgType::Str],
      argc_min: 2,
      opcode:   Opcode::List,
      blocking: false,
   },
   CommandSpec {
      flag:     "-s",
      types:    &[ArgType::Str, ArgType::U32],
      argc_min: 1,
      opcode:   Opcode::Search,
      blocking: false,
   },
   CommandSpec {
      flag:     "-f",
      types:    &[],
      argc_min: 0,
      opcode:   Opcode::Flush,
      blocking: true,
   },
];

pub fn by_opcode(op: Opcode) -> &'static CommandSpec {
   &COMMANDS[op.wire() as usize]
}

pub fn by_flag(flag: &str) -> Option<&'static CommandSpec> {
   COMMANDS.iter().find(|row| row.flag == flag)
}

/// Parses client command-line tokens (`<flag> [args…]`) against the table,
/// validating the flag and the argument count.
pub fn parse(tokens: &[String]) -> Result<(&'static CommandSpec, &[String]), Error> {
   let Some((flag, operands)) = tokens.split_first() else {
      return Err(Error::InvalidCommand("no command specified".to_string()));
   };

   let Some(row) = by_flag(flag) else {
      return Err(Error::InvalidCommand(format!("unknown command flag: {flag}")));
   };

   if operands.len() < row.argc_min {
      return Err(Error::InvalidCommand(format!(
         "too few arguments for {} (minimum {})",
         row.flag, row.argc_min
      )));
   }

   if operands.len() > row.argc_max() {
      return Err(Error::InvalidCommand(format!(
         "too many arguments for {} (maximum {})",
         row.flag,
         row.argc_max()
      )));
   }

   Ok((row, operands))
}

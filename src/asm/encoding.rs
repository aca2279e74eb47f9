//! The instruction codec.
//!
//! An instruction occupies a run of consecutive words in [`Memory`].
//! The first word of the run (at the instruction's address) holds the opcode.
//! The following words hold the parameter bytes, packed big-endian
//! and zero-padded in the last word.
//!
//! Instructions are allocated from the top of memory downward,
//! so "following" means *lower* addresses:
//!
//! ```text
//! addr     [ opcode      ]
//! addr - 1 [ p0 p1 .. pk ]
//! addr - 2 [ .. 00 00 00 ]
//! ```
//!
//! The length of an instruction in words is `1 + ceil(arity / W::BYTES)`.
//!
//! ```
//! use svm_ensemble::asm::encoding::{self, len_in_words};
//! use svm_ensemble::isa::{Registry, MOV};
//! use svm_ensemble::mem::Memory;
//!
//! assert_eq!(len_in_words(&MOV, 2), 4);
//!
//! // MOV $2,R0 with 16-bit words
//! let mut mem = Memory::<u16>::new(16);
//! mem.write_run(15, &[0x0003, 0x0200, 0x0200, 0x0000]).unwrap();
//!
//! let def = encoding::decode(&mem, 15, &Registry::default()).unwrap();
//! assert_eq!(def.to_string(), "MOV $2,R0");
//! assert_eq!(def.len_in_words(), Ok(4));
//! ```
//!
//! [`Memory`]: crate::mem::Memory

use crate::isa::{Instruction, InstructionDefinition, InstrErr, Registry};
use crate::mem::{MemErr, Memory};
use crate::word::Word;

/// Errors that can occur when encoding or decoding an instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum EncodingErr {
    /// The word at the instruction's address is not the opcode of any registered instruction.
    InvalidOpcode(u64),
    /// The instruction at this address would run past the bottom of memory.
    TruncatedInstruction(usize),
    /// A memory access failed.
    Mem(MemErr),
    /// The instruction definition was invalid.
    Instr(InstrErr),
}
impl std::fmt::Display for EncodingErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodingErr::InvalidOpcode(word) => write!(f, "invalid opcode {word:#X}"),
            EncodingErr::TruncatedInstruction(addr) => write!(f, "instruction at address {addr} runs past the bottom of memory"),
            EncodingErr::Mem(e) => e.fmt(f),
            EncodingErr::Instr(e) => e.fmt(f),
        }
    }
}
impl std::error::Error for EncodingErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EncodingErr::Mem(e) => Some(e),
            EncodingErr::Instr(e) => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for EncodingErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            EncodingErr::InvalidOpcode(_) => Some("this address may not hold the start of an instruction".into()),
            EncodingErr::TruncatedInstruction(_) => None,
            EncodingErr::Mem(e) => e.help(),
            EncodingErr::Instr(e) => e.help(),
        }
    }
}
impl From<MemErr> for EncodingErr {
    fn from(value: MemErr) -> Self {
        EncodingErr::Mem(value)
    }
}
impl From<InstrErr> for EncodingErr {
    fn from(value: InstrErr) -> Self {
        EncodingErr::Instr(value)
    }
}

/// Computes how many words an instruction occupies in memory,
/// given the number of bytes per word.
pub fn len_in_words(instruction: &dyn Instruction, word_bytes: usize) -> usize {
    let arity = instruction.arity();
    1 + (arity + word_bytes - 1) / word_bytes
}

/// Decodes the instruction whose opcode word is at `addr`.
///
/// The resulting definition has its length resolved.
pub fn decode<W: Word>(mem: &Memory<W>, addr: usize, registry: &Registry) -> Result<InstructionDefinition<W>, EncodingErr> {
    let opword = mem.read(addr)?.to_u64();
    let instruction = u8::try_from(opword).ok()
        .and_then(|code| registry.get(code))
        .ok_or(EncodingErr::InvalidOpcode(opword))?;

    let len = len_in_words(instruction, W::BYTES);
    if addr < len - 1 {
        return Err(EncodingErr::TruncatedInstruction(addr));
    }

    let mut params: Vec<u8> = mem.read_run(addr.saturating_sub(1), len - 1)?
        .into_iter()
        .flat_map(W::to_be_vec)
        .collect();
    params.truncate(instruction.arity());

    Ok(InstructionDefinition::resolved(instruction, params, len)?)
}

/// Encodes an instruction into memory with its opcode word at `addr`.
///
/// This is the inverse of [`decode`].
/// The definition must have its length resolved.
pub fn encode<W: Word>(mem: &mut Memory<W>, addr: usize, def: &InstructionDefinition<W>) -> Result<(), EncodingErr> {
    let len = def.len_in_words()?;
    if addr < len - 1 {
        return Err(EncodingErr::TruncatedInstruction(addr));
    }

    let instruction = def.instruction();
    let opword = W::from_u64(u64::from(instruction.code()))
        .ok_or(EncodingErr::InvalidOpcode(u64::from(instruction.code())))?;

    let mut bytes = def.params().to_vec();
    bytes.resize((len - 1) * W::BYTES, 0);

    let mut words = Vec::with_capacity(len);
    words.push(opword);
    words.extend(bytes.chunks_exact(W::BYTES).map(|chunk| {
        W::from_u64_trunc(chunk.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b)))
    }));

    mem.write_run(addr, &words)?;
    Ok(())
}

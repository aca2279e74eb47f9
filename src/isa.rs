//! The instruction set.
//!
//! This module consists of:
//! - [`Instruction`]: the contract every instruction variant satisfies (code, arity, self-decoding of parameters).
//! - [`NOP`], [`INT`], [`MOV`]: the built-in instruction variants.
//! - [`Registry`]: a mapping from opcodes (and mnemonics) to instruction variants.
//! - [`InstructionDefinition`]: an instruction together with its raw parameter bytes.
//!
//! Instructions do not know the word width of the machine they run on.
//! Their parameters are a flat list of bytes, which the codec
//! ([`crate::asm::encoding`]) packs into memory words.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::ops::Range;

use crate::word::Word;

/// An operand of an instruction, as decoded from its parameter bytes.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Operand {
    /// A register (e.g., `R0`).
    Reg(u8),
    /// An immediate value (e.g., `$2`).
    Imm(u16)
}
impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "R{r}"),
            Operand::Imm(n) => write!(f, "${n}"),
        }
    }
}

/// An instruction variant.
///
/// Each variant has a fixed opcode, a fixed number of parameter bytes (its arity),
/// and knows how to interpret its own parameter bytes.
///
/// The set of variants is open: any `'static` implementor can be added to a [`Registry`]
/// without changes to the codec or loader.
pub trait Instruction: std::fmt::Debug + Send + Sync {
    /// The opcode, which is stored in the first word of an encoded instruction.
    fn code(&self) -> u8;

    /// The assembly mnemonic (e.g., `MOV`).
    fn mnemonic(&self) -> &'static str;

    /// The number of parameter bytes this instruction takes.
    fn arity(&self) -> usize;

    /// Decodes the parameter bytes into operands.
    ///
    /// `params` has exactly [`Instruction::arity`] bytes.
    fn decode_params(&self, params: &[u8]) -> Result<Vec<Operand>, InstrErr>;

    /// Encodes operands into parameter bytes (the inverse of [`Instruction::decode_params`]).
    fn encode_operands(&self, operands: &[Operand]) -> Result<Vec<u8>, InstrErr>;

    /// The range of parameter bytes holding the value of the given operand.
    ///
    /// Label references for that operand are back-patched into this field.
    fn value_field(&self, operand: usize) -> Option<Range<usize>>;
}
impl PartialEq for dyn Instruction {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}
impl Eq for dyn Instruction {}

/// Errors relating to instructions and their parameters.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum InstrErr {
    /// The number of parameter bytes (or label slots) did not match the instruction's arity.
    ParameterCountMismatch {
        /// The mnemonic of the instruction.
        mnemonic: &'static str,
        /// The instruction's declared arity.
        expected: usize,
        /// The number that was provided.
        found: usize
    },
    /// The length in words was queried before the definition was resolved by the codec.
    LengthNotResolved,
    /// The operands do not fit the instruction.
    InvalidOperands(&'static str),
    /// An instruction with this opcode is already registered.
    DuplicateOpcode(u8),
}
impl std::fmt::Display for InstrErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrErr::ParameterCountMismatch { mnemonic, expected, found } => write!(f, "{mnemonic} expects {expected} parameter bytes, but got {found}"),
            InstrErr::LengthNotResolved => f.write_str("instruction length in words has not been resolved"),
            InstrErr::InvalidOperands(mnemonic) => write!(f, "invalid operands for {mnemonic}"),
            InstrErr::DuplicateOpcode(code) => write!(f, "opcode {code:#04X} is already registered"),
        }
    }
}
impl std::error::Error for InstrErr {}
impl crate::err::Error for InstrErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            InstrErr::ParameterCountMismatch { .. } => None,
            InstrErr::LengthNotResolved => Some("the length is only known once the instruction has been encoded or decoded".into()),
            InstrErr::InvalidOperands("NOP") => Some("NOP takes no operands".into()),
            InstrErr::InvalidOperands("INT") => Some("INT takes an interrupt number in [0, 255]".into()),
            InstrErr::InvalidOperands("MOV") => Some("MOV takes a register or immediate source and a register destination (e.g., MOV $2,R0)".into()),
            InstrErr::InvalidOperands(_) => None,
            InstrErr::DuplicateOpcode(_) => Some("each instruction needs a unique opcode".into()),
        }
    }
}

fn check_arity(instr: &dyn Instruction, params: &[u8]) -> Result<(), InstrErr> {
    match params.len() == instr.arity() {
        true  => Ok(()),
        false => Err(InstrErr::ParameterCountMismatch { mnemonic: instr.mnemonic(), expected: instr.arity(), found: params.len() }),
    }
}

/// No operation.
#[derive(Debug, Clone, Copy)]
pub struct Nop;
impl Instruction for Nop {
    fn code(&self) -> u8 { 0x01 }
    fn mnemonic(&self) -> &'static str { "NOP" }
    fn arity(&self) -> usize { 0 }

    fn decode_params(&self, params: &[u8]) -> Result<Vec<Operand>, InstrErr> {
        check_arity(self, params)?;
        Ok(vec![])
    }
    fn encode_operands(&self, operands: &[Operand]) -> Result<Vec<u8>, InstrErr> {
        match operands {
            [] => Ok(vec![]),
            _  => Err(InstrErr::InvalidOperands(self.mnemonic())),
        }
    }
    fn value_field(&self, _operand: usize) -> Option<Range<usize>> {
        None
    }
}

/// Raises an interrupt.
///
/// Parameters: `[vector]`.
#[derive(Debug, Clone, Copy)]
pub struct Int;
impl Instruction for Int {
    fn code(&self) -> u8 { 0x02 }
    fn mnemonic(&self) -> &'static str { "INT" }
    fn arity(&self) -> usize { 1 }

    fn decode_params(&self, params: &[u8]) -> Result<Vec<Operand>, InstrErr> {
        check_arity(self, params)?;
        Ok(vec![Operand::Imm(u16::from(params[0]))])
    }
    fn encode_operands(&self, operands: &[Operand]) -> Result<Vec<u8>, InstrErr> {
        match operands {
            &[Operand::Imm(n)] => u8::try_from(n)
                .map(|vect| vec![vect])
                .map_err(|_| InstrErr::InvalidOperands(self.mnemonic())),
            _ => Err(InstrErr::InvalidOperands(self.mnemonic())),
        }
    }
    fn value_field(&self, operand: usize) -> Option<Range<usize>> {
        (operand == 0).then_some(0..1)
    }
}

/// Moves a value into a register.
///
/// Parameters: `[source tag, value (2 bytes), destination register (2 bytes)]`,
/// where the source tag is [`Mov::SRC_REG`] or [`Mov::SRC_IMM`].
/// Multi-byte fields are big-endian.
#[derive(Debug, Clone, Copy)]
pub struct Mov;
impl Mov {
    /// Source tag: the value is a register number.
    pub const SRC_REG: u8 = 1;
    /// Source tag: the value is an immediate.
    pub const SRC_IMM: u8 = 2;
}
impl Instruction for Mov {
    fn code(&self) -> u8 { 0x03 }
    fn mnemonic(&self) -> &'static str { "MOV" }
    fn arity(&self) -> usize { 5 }

    fn decode_params(&self, params: &[u8]) -> Result<Vec<Operand>, InstrErr> {
        check_arity(self, params)?;
        let value = u16::from_be_bytes([params[1], params[2]]);
        let dest  = u16::from_be_bytes([params[3], params[4]]);
        let invalid = || InstrErr::InvalidOperands(self.mnemonic());

        let src = match params[0] {
            Mov::SRC_REG => Operand::Reg(u8::try_from(value).map_err(|_| invalid())?),
            Mov::SRC_IMM => Operand::Imm(value),
            _ => return Err(invalid()),
        };
        let dest = Operand::Reg(u8::try_from(dest).map_err(|_| invalid())?);
        Ok(vec![src, dest])
    }
    fn encode_operands(&self, operands: &[Operand]) -> Result<Vec<u8>, InstrErr> {
        let &[src, Operand::Reg(dest)] = operands else {
            return Err(InstrErr::InvalidOperands(self.mnemonic()));
        };
        let (tag, value) = match src {
            Operand::Reg(r) => (Mov::SRC_REG, u16::from(r)),
            Operand::Imm(n) => (Mov::SRC_IMM, n),
        };

        let mut params = vec![tag];
        params.extend(value.to_be_bytes());
        params.extend(u16::from(dest).to_be_bytes());
        Ok(params)
    }
    fn value_field(&self, operand: usize) -> Option<Range<usize>> {
        match operand {
            0 => Some(1..3),
            1 => Some(3..5),
            _ => None
        }
    }
}

/// The built-in `NOP` instruction.
pub static NOP: Nop = Nop;
/// The built-in `INT` instruction.
pub static INT: Int = Int;
/// The built-in `MOV` instruction.
pub static MOV: Mov = Mov;

/// A mapping from opcodes to instruction variants.
///
/// [`Registry::default`] holds the built-in instructions ([`NOP`], [`INT`], [`MOV`]).
/// More can be added with [`Registry::register`].
///
/// ```
/// use svm_ensemble::isa::{Registry, MOV};
///
/// let registry = Registry::default();
/// assert_eq!(registry.get(0x03).map(|i| i.mnemonic()), Some("MOV"));
/// assert_eq!(registry.by_mnemonic("mov").map(|i| i.code()), Some(0x03));
/// assert!(registry.get(0x00).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct Registry {
    by_code: BTreeMap<u8, &'static dyn Instruction>
}
impl Registry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self { by_code: BTreeMap::new() }
    }

    /// Adds an instruction variant to the registry.
    ///
    /// This fails if another instruction already has the same opcode.
    pub fn register(&mut self, instr: &'static dyn Instruction) -> Result<(), InstrErr> {
        use std::collections::btree_map::Entry;

        match self.by_code.entry(instr.code()) {
            Entry::Occupied(_) => Err(InstrErr::DuplicateOpcode(instr.code())),
            Entry::Vacant(e) => {
                e.insert(instr);
                Ok(())
            }
        }
    }

    /// Gets the instruction with the given opcode.
    pub fn get(&self, code: u8) -> Option<&'static dyn Instruction> {
        self.by_code.get(&code).copied()
    }

    /// Gets the instruction with the given mnemonic (case-insensitive).
    pub fn by_mnemonic(&self, mnemonic: &str) -> Option<&'static dyn Instruction> {
        self.by_code.values()
            .copied()
            .find(|i| i.mnemonic().eq_ignore_ascii_case(mnemonic))
    }

    /// Iterates over all registered instructions, in opcode order.
    pub fn iter(&self) -> impl Iterator<Item=&'static dyn Instruction> + '_ {
        self.by_code.values().copied()
    }
}
impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for instr in [&NOP as &'static dyn Instruction, &INT, &MOV] {
            registry.by_code.insert(instr.code(), instr);
        }
        registry
    }
}

/// An instruction together with its parameter bytes.
///
/// The number of parameter bytes always equals the instruction's arity;
/// this is checked on construction.
///
/// The length of the instruction in memory words depends on the word width `W`,
/// and is only known once the definition has passed through the codec
/// (see [`crate::asm::encoding`]). Until then, [`InstructionDefinition::len_in_words`] fails.
///
/// ```
/// use svm_ensemble::isa::{InstructionDefinition, InstrErr, MOV};
///
/// let def = InstructionDefinition::<u16>::new(&MOV, vec![2, 0, 2, 0, 0]).unwrap();
/// assert_eq!(def.params(), &[2, 0, 2, 0, 0]);
/// assert_eq!(def.len_in_words(), Err(InstrErr::LengthNotResolved));
/// assert_eq!(def.to_string(), "MOV $2,R0");
///
/// // wrong number of parameters
/// assert!(InstructionDefinition::<u16>::new(&MOV, vec![2, 0, 2]).is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct InstructionDefinition<W> {
    instruction: &'static dyn Instruction,
    params: Vec<u8>,
    len_in_words: Option<usize>,
    _word: PhantomData<W>
}
impl<W: Word> InstructionDefinition<W> {
    /// Creates a new, unresolved instruction definition.
    pub fn new(instruction: &'static dyn Instruction, params: Vec<u8>) -> Result<Self, InstrErr> {
        check_arity(instruction, &params)?;
        Ok(Self { instruction, params, len_in_words: None, _word: PhantomData })
    }

    /// Creates an instruction definition whose length in words is known.
    pub(crate) fn resolved(instruction: &'static dyn Instruction, params: Vec<u8>, len_in_words: usize) -> Result<Self, InstrErr> {
        let mut def = Self::new(instruction, params)?;
        def.len_in_words.replace(len_in_words);
        Ok(def)
    }

    /// The instruction variant.
    pub fn instruction(&self) -> &'static dyn Instruction {
        self.instruction
    }

    /// The raw parameter bytes.
    pub fn params(&self) -> &[u8] {
        &self.params
    }

    /// The length of the instruction (with parameters) in memory words.
    ///
    /// This fails if the definition has not been resolved by the codec.
    pub fn len_in_words(&self) -> Result<usize, InstrErr> {
        self.len_in_words.ok_or(InstrErr::LengthNotResolved)
    }

    /// Decodes the parameter bytes into operands.
    pub fn operands(&self) -> Result<Vec<Operand>, InstrErr> {
        self.instruction.decode_params(&self.params)
    }

    /// Takes the instruction and parameters out of this definition.
    pub fn into_parts(self) -> (&'static dyn Instruction, Vec<u8>) {
        (self.instruction, self.params)
    }
}
impl<W: Word> std::fmt::Display for InstructionDefinition<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.instruction.mnemonic())?;
        match self.operands() {
            Ok(ops) => {
                for (i, op) in ops.iter().enumerate() {
                    let sep = if i == 0 { " " } else { "," };
                    write!(f, "{sep}{op}")?;
                }
            },
            // fall back to raw parameter bytes
            Err(_) => {
                for b in &self.params {
                    write!(f, " x{b:02X}")?;
                }
            }
        }
        Ok(())
    }
}

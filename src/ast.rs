//! The program model.
//!
//! A program is declared as an ordered list of [`Data`] blocks and an ordered list of
//! [`VirtualInstruction`]s. Nothing here has an address yet;
//! addresses are assigned and label references resolved by the loader ([`crate::asm::load`]).
//!
//! ```
//! use svm_ensemble::ast::{Data, Label, SvmProgram, VirtualInstruction};
//! use svm_ensemble::isa::{InstructionDefinition, MOV, NOP};
//!
//! let mut program = SvmProgram::<u16>::new();
//! program.add_data(Data::new("msg", vec![0x48, 0x49]));
//!
//! let nop = InstructionDefinition::new(&NOP, vec![]).unwrap();
//! program.add_instruction(VirtualInstruction::new(nop, vec![]).unwrap());
//!
//! // MOV &msg,R0: the address of `msg` is patched in at the value field (byte 1).
//! let mov = InstructionDefinition::new(&MOV, vec![2, 0, 0, 0, 0]).unwrap();
//! let refs = vec![None, Some(Label::data("msg")), None, None, None];
//! program.add_instruction(VirtualInstruction::new(mov, refs).unwrap());
//!
//! assert_eq!(program.data().len(), 1);
//! assert_eq!(program.instructions().len(), 2);
//! ```

use crate::isa::{InstructionDefinition, InstrErr};
use crate::word::Word;

/// The kind of address a label names.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum LabelKind {
    /// A label to a data block (in the low region).
    Data,
    /// A label to an instruction (in the high region).
    Code
}

/// A named symbolic reference to an address.
///
/// Two labels are equal only if both their kind and name match,
/// so a data label and a code label may share a name.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct Label {
    /// The kind of address this label names.
    pub kind: LabelKind,
    /// The label's name.
    pub name: String
}
impl Label {
    /// Creates a new label.
    pub fn new(kind: LabelKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into() }
    }

    /// Creates a data label.
    pub fn data(name: impl Into<String>) -> Self {
        Self::new(LabelKind::Data, name)
    }

    /// Creates a code label.
    pub fn code(name: impl Into<String>) -> Self {
        Self::new(LabelKind::Code, name)
    }
}
impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            LabelKind::Data => "data",
            LabelKind::Code => "code",
        };
        write!(f, "{kind} label {}", self.name)
    }
}

/// A labeled block of words, placed verbatim in the low region of memory.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Data<W> {
    /// The label of this block (always of [`LabelKind::Data`]).
    pub label: Label,
    /// The words of this block.
    pub words: Vec<W>
}
impl<W: Word> Data<W> {
    /// Creates a new data block with a data label of the given name.
    pub fn new(name: impl Into<String>, words: Vec<W>) -> Self {
        Self { label: Label::data(name), words }
    }

    /// The number of words in this block.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether this block has no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// An instruction as declared in source, before addresses are known.
///
/// Each parameter byte of the definition has a slot in `refs`.
/// A slot holding a label marks where the label's resolved address
/// is written at load time, overwriting `W::BYTES` parameter bytes starting there.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct VirtualInstruction<W> {
    label: Option<Label>,
    def: InstructionDefinition<W>,
    refs: Vec<Option<Label>>
}
impl<W: Word> VirtualInstruction<W> {
    /// Creates an unlabeled virtual instruction.
    ///
    /// `refs` must have one slot per parameter byte.
    pub fn new(def: InstructionDefinition<W>, refs: Vec<Option<Label>>) -> Result<Self, InstrErr> {
        let instr = def.instruction();
        if refs.len() != instr.arity() {
            return Err(InstrErr::ParameterCountMismatch {
                mnemonic: instr.mnemonic(),
                expected: instr.arity(),
                found: refs.len()
            });
        }

        Ok(Self { label: None, def, refs })
    }

    /// Creates a virtual instruction with no label references.
    pub fn unreferenced(def: InstructionDefinition<W>) -> Self {
        let refs = vec![None; def.instruction().arity()];
        Self { label: None, def, refs }
    }

    /// Labels this instruction with a code label of the given name.
    pub fn with_label(mut self, name: impl Into<String>) -> Self {
        self.label.replace(Label::code(name));
        self
    }

    /// The label of this instruction, if it has one.
    pub fn label(&self) -> Option<&Label> {
        self.label.as_ref()
    }

    /// The (unresolved) instruction definition.
    pub fn def(&self) -> &InstructionDefinition<W> {
        &self.def
    }

    /// The label reference slots, one per parameter byte.
    pub fn refs(&self) -> &[Option<Label>] {
        &self.refs
    }

    /// Takes apart this virtual instruction.
    pub fn into_parts(self) -> (Option<Label>, InstructionDefinition<W>, Vec<Option<Label>>) {
        (self.label, self.def, self.refs)
    }
}

/// A whole program: data blocks and instructions, in declaration order.
///
/// A program is consumed by the loader.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SvmProgram<W> {
    data: Vec<Data<W>>,
    instructions: Vec<VirtualInstruction<W>>
}
impl<W: Word> SvmProgram<W> {
    /// Creates an empty program.
    pub fn new() -> Self {
        Self { data: vec![], instructions: vec![] }
    }

    /// Appends a data block.
    pub fn add_data(&mut self, data: Data<W>) {
        self.data.push(data);
    }

    /// Appends an instruction.
    pub fn add_instruction(&mut self, instr: VirtualInstruction<W>) {
        self.instructions.push(instr);
    }

    /// The data blocks of this program.
    pub fn data(&self) -> &[Data<W>] {
        &self.data
    }

    /// The instructions of this program.
    pub fn instructions(&self) -> &[VirtualInstruction<W>] {
        &self.instructions
    }

    /// Whether the program has no data and no instructions.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.instructions.is_empty()
    }

    /// Takes apart this program.
    pub fn into_parts(self) -> (Vec<Data<W>>, Vec<VirtualInstruction<W>>) {
        (self.data, self.instructions)
    }
}
impl<W: Word> Default for SvmProgram<W> {
    fn default() -> Self {
        Self::new()
    }
}

//! Loading programs into memory.
//!
//! This module converts a [`SvmProgram`] into a populated [`Memory`] image.
//!
//! The loader notably consists of:
//! - [`load`]: the two-pass loader.
//! - [`LabelTable`]: the resolved address of every label, produced by the first pass.
//! - [`encoding`]: the instruction codec, which reads and writes single instructions from and to memory.
//!
//! Loading happens in two passes:
//! 1. Every data block and instruction is assigned an address, and every label is recorded in the [`LabelTable`].
//!    Data blocks are placed upward from the bottom of memory;
//!    instructions are placed downward from the top of memory.
//! 2. Data blocks are written verbatim. Label references in instruction parameters
//!    are replaced with the label's address, and each instruction is encoded into memory.

pub mod encoding;

use std::collections::BTreeMap;

use tracing::{debug, instrument, trace};

use crate::ast::{Label, LabelKind, SvmProgram};
use crate::isa::{InstructionDefinition, InstrErr};
use crate::mem::{MemErr, Memory};
use crate::word::Word;

use self::encoding::{len_in_words, EncodingErr};

/// Errors that can occur while loading a program.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum LoadErr {
    /// Two labels of the same kind had the same name (pass 1).
    DuplicateLabel(Label),
    /// A label reference did not match any declared label (pass 2).
    UnresolvedLabel(Label),
    /// Patching a label's address into a parameter would run past the end of the parameters (pass 2).
    ReferenceOutOfBounds {
        /// The parameter slot holding the reference.
        slot: usize,
        /// The number of bytes being patched.
        width: usize,
        /// The number of parameter bytes of the instruction.
        len: usize
    },
    /// A label's address cannot be represented in a single word (pass 2).
    AddressTooWide(usize),
    /// Memory could not hold the program, or a write failed.
    Mem(MemErr),
    /// An instruction could not be encoded.
    Encoding(EncodingErr),
    /// An instruction definition was invalid.
    Instr(InstrErr),
}
impl std::fmt::Display for LoadErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadErr::DuplicateLabel(label)  => write!(f, "{label} was defined multiple times"),
            LoadErr::UnresolvedLabel(label) => write!(f, "{label} was never defined"),
            LoadErr::ReferenceOutOfBounds { slot, width, len } => write!(f, "label reference at parameter {slot} needs {width} bytes, but instruction only has {len} parameter bytes"),
            LoadErr::AddressTooWide(addr) => write!(f, "address {addr:#X} does not fit in a word"),
            LoadErr::Mem(e) => e.fmt(f),
            LoadErr::Encoding(e) => e.fmt(f),
            LoadErr::Instr(e) => e.fmt(f),
        }
    }
}
impl std::error::Error for LoadErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadErr::Mem(e) => Some(e),
            LoadErr::Encoding(e) => Some(e),
            LoadErr::Instr(e) => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for LoadErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LoadErr::DuplicateLabel(_)  => Some("labels of the same kind must have unique names".into()),
            LoadErr::UnresolvedLabel(Label { kind: LabelKind::Data, .. }) => Some("declare a data block with this label".into()),
            LoadErr::UnresolvedLabel(Label { kind: LabelKind::Code, .. }) => Some("label an instruction with this label".into()),
            LoadErr::ReferenceOutOfBounds { .. } => Some("move the label reference to an earlier parameter slot".into()),
            LoadErr::AddressTooWide(_) => Some("use a wider word or a smaller memory".into()),
            LoadErr::Mem(e) => e.help(),
            LoadErr::Encoding(e) => e.help(),
            LoadErr::Instr(e) => e.help(),
        }
    }
}
impl From<MemErr> for LoadErr {
    fn from(value: MemErr) -> Self {
        LoadErr::Mem(value)
    }
}
impl From<EncodingErr> for LoadErr {
    fn from(value: EncodingErr) -> Self {
        LoadErr::Encoding(value)
    }
}
impl From<InstrErr> for LoadErr {
    fn from(value: InstrErr) -> Self {
        LoadErr::Instr(value)
    }
}

/// The resolved address of every label in a loaded program.
///
/// This is built during the first pass of [`load`] and is read-only afterwards.
///
/// ## Example
/// ```
/// use svm_ensemble::asm::load;
/// use svm_ensemble::ast::{Data, LabelKind, SvmProgram, VirtualInstruction};
/// use svm_ensemble::isa::{InstructionDefinition, NOP};
/// use svm_ensemble::mem::Memory;
///
/// let mut program = SvmProgram::<u16>::new();
/// program.add_data(Data::new("greeting", vec![0x48, 0x49]));
/// let nop = InstructionDefinition::new(&NOP, vec![]).unwrap();
/// program.add_instruction(VirtualInstruction::unreferenced(nop).with_label("start"));
///
/// let mut mem = Memory::new(32);
/// let labels = load(&mut mem, program).unwrap();
///
/// assert_eq!(labels.lookup(LabelKind::Data, "greeting"), Some(0));
/// assert_eq!(labels.lookup(LabelKind::Code, "start"), Some(31));
/// assert_eq!(labels.rev_lookup(31).map(|l| &*l.name), Some("start"));
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct LabelTable {
    label_map: BTreeMap<Label, usize>
}
impl LabelTable {
    fn new() -> Self {
        Self::default()
    }

    /// Records a label's address, failing if the label already exists.
    fn insert(&mut self, label: Label, addr: usize) -> Result<(), LoadErr> {
        use std::collections::btree_map::Entry;

        match self.label_map.entry(label) {
            Entry::Occupied(e) => Err(LoadErr::DuplicateLabel(e.key().clone())),
            Entry::Vacant(e) => {
                trace!(label = %e.key().name, kind = ?e.key().kind, addr, "label assigned");
                e.insert(addr);
                Ok(())
            }
        }
    }

    /// Gets the address of a given label (if it exists).
    pub fn get(&self, label: &Label) -> Option<usize> {
        self.label_map.get(label).copied()
    }

    /// Gets the address of the label with the given kind and name (if it exists).
    pub fn lookup(&self, kind: LabelKind, name: &str) -> Option<usize> {
        self.label_map.iter()
            .find(|(l, _)| l.kind == kind && l.name == name)
            .map(|(_, &addr)| addr)
    }

    /// Gets the label at a given address (if it exists).
    ///
    /// If several labels share the address, the data label is returned first.
    pub fn rev_lookup(&self, addr: usize) -> Option<&Label> {
        self.label_map.iter()
            .find(|&(_, &a)| a == addr)
            .map(|(l, _)| l)
    }

    /// The number of labels in this table.
    pub fn len(&self) -> usize {
        self.label_map.len()
    }

    /// Whether this table has no labels.
    pub fn is_empty(&self) -> bool {
        self.label_map.is_empty()
    }

    /// Iterates over every label and its address, in label order.
    pub fn iter(&self) -> impl Iterator<Item=(&Label, usize)> + '_ {
        self.label_map.iter().map(|(l, &a)| (l, a))
    }
}

/// Writes `addr` as a big-endian word into `params`, starting at `slot`.
fn patch_address<W: Word>(params: &mut [u8], slot: usize, addr: usize) -> Result<(), LoadErr> {
    let word = u64::try_from(addr).ok()
        .and_then(W::from_u64)
        .ok_or(LoadErr::AddressTooWide(addr))?;

    let len = params.len();
    let field = params.get_mut(slot..slot + W::BYTES)
        .ok_or(LoadErr::ReferenceOutOfBounds { slot, width: W::BYTES, len })?;
    field.copy_from_slice(&word.to_be_vec());
    Ok(())
}

/// Loads a program into memory, returning the address of every label.
///
/// Memory is cleared before loading. If loading fails,
/// memory is left in whatever partially-written state it was in.
///
/// # Example
/// ```
/// use svm_ensemble::asm::{encoding, load};
/// use svm_ensemble::isa::Registry;
/// use svm_ensemble::mem::Memory;
/// use svm_ensemble::parse::parse_program;
///
/// let registry = Registry::default();
/// let src = "
///     .data
///     msg: \"hi\"
///     .code
///     MOV &msg,R0
///     INT 1
/// ";
/// let program = parse_program::<u16>(src, &registry).unwrap();
///
/// let mut mem = Memory::new(64);
/// let labels = load(&mut mem, program).unwrap();
/// assert_eq!(labels.len(), 1);
///
/// let mov = encoding::decode(&mem, mem.high_addr(), &registry).unwrap();
/// assert_eq!(mov.to_string(), "MOV $0,R0");
/// ```
#[instrument(skip_all, fields(word_bytes = W::BYTES, capacity = mem.capacity()))]
pub fn load<W: Word>(mem: &mut Memory<W>, program: SvmProgram<W>) -> Result<LabelTable, LoadErr> {
    mem.clear();

    let (data, instructions) = program.into_parts();
    let mut labels = LabelTable::new();

    // PASS 1: assign addresses
    let mut data_addrs = Vec::with_capacity(data.len());
    for block in &data {
        let addr = mem.alloc_low(block.len())?;
        labels.insert(block.label.clone(), addr)?;
        data_addrs.push(addr);
    }

    let mut instr_addrs = Vec::with_capacity(instructions.len());
    for vi in &instructions {
        let len = len_in_words(vi.def().instruction(), W::BYTES);
        let addr = mem.alloc_high(len)?;
        if let Some(label) = vi.label() {
            labels.insert(label.clone(), addr)?;
        }
        instr_addrs.push(addr);
    }
    debug!(
        data = data.len(),
        instructions = instructions.len(),
        labels = labels.len(),
        low_cursor = mem.low_cursor(),
        high_cursor = mem.high_cursor(),
        "pass 1 complete"
    );

    // PASS 2: resolve and write
    for (block, addr) in data.iter().zip(data_addrs) {
        for (i, &word) in block.words.iter().enumerate() {
            mem.write(addr + i, word)?;
        }
    }

    let mut patches = 0usize;
    for (vi, addr) in instructions.into_iter().zip(instr_addrs) {
        let (_, def, refs) = vi.into_parts();
        let (instruction, mut params) = def.into_parts();

        for (slot, label) in refs.iter().enumerate() {
            let Some(label) = label else { continue };
            let target = labels.get(label)
                .ok_or_else(|| LoadErr::UnresolvedLabel(label.clone()))?;

            patch_address::<W>(&mut params, slot, target)?;
            trace!(instr_addr = addr, slot, label = %label.name, target, "label reference patched");
            patches += 1;
        }

        let len = len_in_words(instruction, W::BYTES);
        let def = InstructionDefinition::resolved(instruction, params, len)?;
        encoding::encode(mem, addr, &def)?;
    }
    debug!(patches, "pass 2 complete");

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use crate::ast::{Data, Label, LabelKind, SvmProgram, VirtualInstruction};
    use crate::isa::{Instruction, InstructionDefinition, Operand, Registry, INT, MOV, NOP};
    use crate::mem::{MemConfig, MemErr, Memory, WordCreateStrategy};
    use crate::word::Word;

    use super::encoding::decode;
    use super::{load, LoadErr};

    fn text<W: Word>(s: &str) -> Vec<W> {
        s.bytes().map(|b| W::from_u64_trunc(u64::from(b))).collect()
    }

    fn def<W: Word>(instr: &'static dyn Instruction, ops: &[Operand]) -> InstructionDefinition<W> {
        InstructionDefinition::new(instr, instr.encode_operands(ops).unwrap()).unwrap()
    }

    fn plain<W: Word>(instr: &'static dyn Instruction, ops: &[Operand]) -> VirtualInstruction<W> {
        VirtualInstruction::unreferenced(def(instr, ops))
    }

    /// MOV &label,R{reg}, patched at the value field.
    fn mov_addr<W: Word>(label: &str, reg: u8) -> VirtualInstruction<W> {
        let mut refs = vec![None; MOV.arity()];
        refs[1] = Some(Label::data(label));
        VirtualInstruction::new(def(&MOV, &[Operand::Imm(0), Operand::Reg(reg)]), refs).unwrap()
    }

    fn reference_program() -> SvmProgram<u16> {
        use Operand::{Imm, Reg};

        let mut program = SvmProgram::new();
        program.add_data(Data::new("text1", text("abc\n")));
        program.add_data(Data::new("text2", text("XY\n")));

        program.add_instruction(plain(&NOP, &[]));
        program.add_instruction(plain(&MOV, &[Imm(2), Reg(0)]));
        program.add_instruction(plain(&MOV, &[Imm(1), Reg(1)]));
        program.add_instruction(mov_addr("text2", 2));
        program.add_instruction(plain(&MOV, &[Imm(3), Reg(3)]));
        program.add_instruction(plain(&INT, &[Imm(1)]));
        program.add_instruction(plain(&MOV, &[Imm(1), Reg(0)]));
        program.add_instruction(plain(&MOV, &[Imm(1), Reg(1)]));
        program.add_instruction(plain(&INT, &[Imm(1)]));
        program
    }

    #[test]
    fn test_reference_program() {
        let registry = Registry::default();
        let program = reference_program();
        let expected: Vec<_> = program.instructions().iter()
            .map(|vi| vi.def().clone())
            .collect();

        let mut mem = Memory::<u16>::new(64);
        let labels = load(&mut mem, program).unwrap();

        // labels
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.lookup(LabelKind::Data, "text1"), Some(mem.low_addr()));
        assert_eq!(labels.lookup(LabelKind::Data, "text2"), Some(mem.low_addr() + 4));

        // data
        assert_eq!(&mem.as_slice()[..7], &[0x61u16, 0x62, 0x63, 0x0A, 0x58, 0x59, 0x0A]);

        // instructions
        let mut addr = mem.high_addr();
        for (i, expected) in expected.into_iter().enumerate() {
            let decoded = decode(&mem, addr, &registry).unwrap();
            assert_eq!(decoded.instruction(), expected.instruction(), "instruction {i} at {addr}");

            match i {
                // MOV &text2,R2
                3 => assert_eq!(decoded.operands().unwrap(), vec![Operand::Imm(4), Operand::Reg(2)]),
                _ => assert_eq!(decoded.params(), expected.params(), "instruction {i} at {addr}"),
            }
            addr -= decoded.len_in_words().unwrap();
        }
        assert_eq!(addr + 1, mem.high_cursor());
    }

    #[test]
    fn test_determinism() {
        let mut m1 = Memory::<u16>::with_config(MemConfig { capacity: 64, fill: WordCreateStrategy::Seeded { seed: 1 } });
        let mut m2 = Memory::<u16>::with_config(MemConfig { capacity: 64, fill: WordCreateStrategy::Seeded { seed: 2 } });
        let mut m3 = Memory::<u16>::with_config(MemConfig { capacity: 64, fill: WordCreateStrategy::Known { value: 0xFFFF } });

        let t1 = load(&mut m1, reference_program()).unwrap();
        let t2 = load(&mut m2, reference_program()).unwrap();
        let t3 = load(&mut m3, reference_program()).unwrap();

        assert_eq!(m1, m2);
        assert_eq!(m1, m3);
        assert_eq!(t1, t2);
        assert_eq!(t1, t3);
    }

    #[test]
    fn test_empty_program() {
        let mut mem = Memory::<u32>::with_config(MemConfig { capacity: 16, fill: WordCreateStrategy::Known { value: 0xAAAA } });
        let labels = load(&mut mem, SvmProgram::new()).unwrap();

        assert!(labels.is_empty());
        assert!(mem.as_slice().iter().all(|&w| w == 0));
        assert_eq!(mem.low_cursor(), 0);
        assert_eq!(mem.high_cursor(), 16);
    }

    #[test]
    fn test_duplicate_label() {
        let mut program = SvmProgram::<u16>::new();
        program.add_data(Data::new("dup", text("a")));
        program.add_data(Data::new("dup", text("b")));

        let mut mem = Memory::new(16);
        assert_eq!(load(&mut mem, program), Err(LoadErr::DuplicateLabel(Label::data("dup"))));

        // same name, different kind is fine
        let mut program = SvmProgram::<u16>::new();
        program.add_data(Data::new("dup", text("a")));
        program.add_instruction(plain(&NOP, &[]).with_label("dup"));
        assert!(load(&mut mem, program).is_ok());

        let mut program = SvmProgram::<u16>::new();
        program.add_instruction(plain(&NOP, &[]).with_label("L"));
        program.add_instruction(plain(&NOP, &[]).with_label("L"));
        assert_eq!(load(&mut mem, program), Err(LoadErr::DuplicateLabel(Label::code("L"))));
    }

    #[test]
    fn test_unresolved_label() {
        let mut program = SvmProgram::<u16>::new();
        program.add_data(Data::new("present", text("a")));
        program.add_instruction(mov_addr("absent", 0));

        let mut mem = Memory::new(16);
        assert_eq!(load(&mut mem, program), Err(LoadErr::UnresolvedLabel(Label::data("absent"))));
    }

    #[test]
    fn test_failed_load_keeps_partial_writes() {
        let config = MemConfig { capacity: 8, fill: WordCreateStrategy::Known { value: 0xFFFF } };

        // pass 1 failure: memory was cleared, nothing written yet
        let mut program = SvmProgram::<u16>::new();
        program.add_data(Data::new("d", text("a")));
        program.add_data(Data::new("d", text("b")));

        let mut mem = Memory::with_config(config);
        assert_eq!(load(&mut mem, program), Err(LoadErr::DuplicateLabel(Label::data("d"))));
        assert_eq!(mem.as_slice(), &[0u16; 8]);

        // pass 2 failure: data is already written when the reference fails to resolve
        let mut program = SvmProgram::<u16>::new();
        program.add_data(Data::new("present", text("a")));
        program.add_instruction(mov_addr("absent", 0));

        let mut mem = Memory::with_config(config);
        assert_eq!(load(&mut mem, program), Err(LoadErr::UnresolvedLabel(Label::data("absent"))));
        assert_eq!(mem.as_slice(), &[0x61u16, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_forward_reference() {
        let registry = Registry::default();

        // the data block is declared after the instruction referencing it
        let mut program = SvmProgram::<u16>::new();
        program.add_instruction(mov_addr("later", 5));
        program.add_data(Data::new("first", text("0123456789")));
        program.add_data(Data::new("later", text("z")));

        let mut mem = Memory::new(32);
        let labels = load(&mut mem, program).unwrap();
        assert_eq!(labels.lookup(LabelKind::Data, "later"), Some(10));

        let decoded = decode(&mem, mem.high_addr(), &registry).unwrap();
        assert_eq!(decoded.operands().unwrap(), vec![Operand::Imm(10), Operand::Reg(5)]);
    }

    #[test]
    fn test_code_label() {
        // a reference to a code label resolves to the instruction's top word
        let mut program = SvmProgram::<u16>::new();
        program.add_instruction(plain(&NOP, &[]));
        program.add_instruction(plain(&INT, &[Operand::Imm(0)]).with_label("handler"));

        let mut refs = vec![None; MOV.arity()];
        refs[1] = Some(Label::code("handler"));
        program.add_instruction(VirtualInstruction::new(def(&MOV, &[Operand::Imm(0), Operand::Reg(1)]), refs).unwrap());

        let mut mem = Memory::new(16);
        let labels = load(&mut mem, program).unwrap();
        assert_eq!(labels.lookup(LabelKind::Code, "handler"), Some(14));
        assert_eq!(labels.rev_lookup(14), Some(&Label::code("handler")));

        let decoded = decode(&mem, 12, &Registry::default()).unwrap();
        assert_eq!(decoded.to_string(), "MOV $14,R1");
    }

    #[test]
    fn test_region_collision() {
        let mut program = SvmProgram::<u16>::new();
        program.add_data(Data::new("big", text("abc")));
        program.add_instruction(plain(&MOV, &[Operand::Imm(0), Operand::Reg(0)]));

        let mut mem = Memory::new(6);
        assert_eq!(load(&mut mem, program), Err(LoadErr::Mem(MemErr::RegionCollision { requested: 4, free: 3 })));
    }

    #[test]
    fn test_patch_failures() {
        // address needs 2 bytes, but words are 1 byte
        let mut program = SvmProgram::<u8>::new();
        program.add_data(Data::new("pad", vec![0; 300]));
        program.add_data(Data::new("far", vec![1]));
        program.add_instruction(mov_addr("far", 0));

        let mut mem = Memory::new(320);
        assert_eq!(load(&mut mem, program), Err(LoadErr::AddressTooWide(300)));

        // INT only has 1 parameter byte
        let mut program = SvmProgram::<u16>::new();
        program.add_data(Data::new("vec", vec![1]));
        let int = def(&INT, &[Operand::Imm(0)]);
        program.add_instruction(VirtualInstruction::new(int, vec![Some(Label::data("vec"))]).unwrap());

        let mut mem = Memory::new(16);
        assert_eq!(load(&mut mem, program), Err(LoadErr::ReferenceOutOfBounds { slot: 0, width: 2, len: 1 }));
    }
}

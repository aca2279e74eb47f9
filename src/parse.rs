//! Parsing assembly source into a program.
//!
//! This module converts source text into a [`SvmProgram`] by
//! tokenizing it (see [`lex`]) and reading it line by line.
//!
//! Source is split into two sections, each started by a directive:
//! - `.data`: each line is a labeled data block (`name: "text"` or `name: 1,2,0x10`).
//!   Strings become one word per byte.
//! - `.code`: each line is an instruction, optionally labeled (`start: MOV $2,R0`).
//!   A label on a line of its own labels the next instruction.
//!
//! Source starts in the code section.
//!
//! Operands can be:
//! - registers (`R0`),
//! - immediates (`$2`, `$0x1F`, or a bare number such as `1`),
//! - the address of a label (`&text`), which is patched in when the program is loaded,
//! - the length of a data block in words (`len(text)`), which is computed while parsing.
//!
//! ```
//! use svm_ensemble::isa::Registry;
//! use svm_ensemble::parse::parse_program;
//!
//! let src = "
//!     .data
//!     msg: \"hello\"
//!     .code
//!     start: MOV &msg,R0
//!            MOV len(msg),R1
//!            INT 1
//! ";
//! let program = parse_program::<u16>(src, &Registry::default()).unwrap();
//! assert_eq!(program.data()[0].words.len(), 5);
//! assert_eq!(program.instructions().len(), 3);
//! assert_eq!(program.instructions()[1].def().to_string(), "MOV $5,R1");
//! ```

pub mod lex;

use std::collections::HashMap;
use std::ops::Range;

use tracing::debug;

use crate::ast::{Data, Label, SvmProgram, VirtualInstruction};
use crate::isa::{Instruction, InstructionDefinition, InstrErr, Operand, Registry};
use crate::word::Word;

use self::lex::{LexErr, LexErrKind, Param, Symbol, SymbolKind};

/// Kinds of errors that can occur while parsing.
///
/// See [`ParseErr`] for this error type with span information included.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ParseErrKind {
    /// The source could not be tokenized.
    Lex(LexErrKind),
    /// A section directive other than `.data` or `.code`.
    UnknownSection,
    /// An opcode that does not name any registered instruction.
    UnknownMnemonic,
    /// `len(...)` named a label which is not a data block.
    UnknownDataLabel,
    /// A value does not fit in its destination (a word or an operand).
    ValueTooWide,
    /// A label's address cannot fit in the operand field for this word width.
    ReferenceTooWide,
    /// The operands do not fit the instruction.
    Operand(InstrErr),
    /// An instruction was labeled twice.
    StackedLabels,
    /// A label was not followed by any instruction.
    DanglingLabel,
    /// A data block had no values.
    ExpectedData,
    /// A data block held something other than numbers and strings.
    InvalidDataValue,
    /// A token appeared where it was not expected.
    UnexpectedToken,
}
impl std::fmt::Display for ParseErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lex(e)           => e.fmt(f),
            Self::UnknownSection   => f.write_str("unknown section"),
            Self::UnknownMnemonic  => f.write_str("unknown instruction"),
            Self::UnknownDataLabel => f.write_str("label is not a data block"),
            Self::ValueTooWide     => f.write_str("value is too large"),
            Self::ReferenceTooWide => f.write_str("label address does not fit in operand"),
            Self::Operand(e)       => e.fmt(f),
            Self::StackedLabels    => f.write_str("instruction has multiple labels"),
            Self::DanglingLabel    => f.write_str("label does not precede an instruction"),
            Self::ExpectedData     => f.write_str("expected data after label"),
            Self::InvalidDataValue => f.write_str("invalid data value"),
            Self::UnexpectedToken  => f.write_str("unexpected token"),
        }
    }
}

/// Error from parsing assembly source.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ParseErr {
    /// The kind of error.
    pub kind: ParseErrKind,
    /// The offending range of source.
    pub span: Range<usize>
}
impl ParseErr {
    fn new(kind: ParseErrKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for ParseErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ParseErrKind::Operand(e) => Some(e),
            _ => None
        }
    }
}
impl crate::err::Error for ParseErr {
    fn span(&self) -> Option<crate::err::ErrSpan> {
        Some(self.span.clone().into())
    }

    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match &self.kind {
            ParseErrKind::Lex(e)           => e.help(),
            ParseErrKind::UnknownSection   => Some("sections are .data and .code".into()),
            ParseErrKind::UnknownMnemonic  => None,
            ParseErrKind::UnknownDataLabel => Some("len(...) only applies to labels declared in .data".into()),
            ParseErrKind::ValueTooWide     => None,
            ParseErrKind::ReferenceTooWide => Some("label addresses are written as a full word, which must fit within the operand".into()),
            ParseErrKind::Operand(e)       => crate::err::Error::help(e),
            ParseErrKind::StackedLabels    => Some("an instruction can only have one label".into()),
            ParseErrKind::DanglingLabel    => Some("add an instruction after this label".into()),
            ParseErrKind::ExpectedData     => Some("add a string or a comma-separated list of numbers after the label".into()),
            ParseErrKind::InvalidDataValue => Some("data blocks only hold numbers and strings".into()),
            ParseErrKind::UnexpectedToken  => None,
        }
    }
}
impl From<LexErr> for ParseErr {
    fn from(value: LexErr) -> Self {
        ParseErr::new(ParseErrKind::Lex(value.kind), value.span)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Section {
    Data,
    Code
}

/// Parses assembly source into a program.
///
/// Data blocks may be used (by `&name` or `len(name)`) before they are declared.
pub fn parse_program<W: Word>(src: &str, registry: &Registry) -> Result<SvmProgram<W>, ParseErr> {
    let symbols = lex::tokenize(src)?;

    // Sort lines into their sections.
    let mut section = Section::Code;
    let mut data_lines = vec![];
    let mut code_lines = vec![];
    for line in symbols.split(|s| s.kind == SymbolKind::NewLine) {
        match line {
            [] => {},
            [Symbol { kind: SymbolKind::Section(name), span }] => {
                section = match &*name.to_lowercase() {
                    "data" => Section::Data,
                    "code" => Section::Code,
                    _ => return Err(ParseErr::new(ParseErrKind::UnknownSection, span.clone())),
                };
                // kept so a label cannot carry over into the data section
                code_lines.push(line);
            },
            [Symbol { kind: SymbolKind::Section(_), .. }, rest @ ..] => {
                return Err(ParseErr::new(ParseErrKind::UnexpectedToken, rest[0].span.clone()));
            },
            _ => match section {
                Section::Data => data_lines.push(line),
                Section::Code => code_lines.push(line),
            }
        }
    }

    let mut program = SvmProgram::new();
    let mut data_lens = HashMap::new();
    for line in data_lines {
        let data = parse_data(line)?;
        data_lens.insert(data.label.name.clone(), data.len());
        program.add_data(data);
    }

    let mut label: Option<(String, Range<usize>)> = None;
    for line in code_lines {
        let rest = match line {
            [Symbol { kind: SymbolKind::Section(name), .. }] => {
                if name.eq_ignore_ascii_case("data") {
                    if let Some((_, span)) = label.take() {
                        return Err(ParseErr::new(ParseErrKind::DanglingLabel, span));
                    }
                }
                continue;
            },
            [Symbol { kind: SymbolKind::Label(name), span }, rest @ ..] => {
                if label.is_some() {
                    return Err(ParseErr::new(ParseErrKind::StackedLabels, span.clone()));
                }
                label.replace((name.clone(), span.clone()));
                rest
            },
            rest => rest
        };

        if rest.is_empty() { continue; }
        let vi = parse_instruction(rest, registry, &data_lens)?;
        program.add_instruction(match label.take() {
            Some((name, _)) => vi.with_label(name),
            None => vi,
        });
    }
    if let Some((_, span)) = label {
        return Err(ParseErr::new(ParseErrKind::DanglingLabel, span));
    }

    debug!(
        data = program.data().len(),
        instructions = program.instructions().len(),
        "parsed program"
    );
    Ok(program)
}

fn parse_data<W: Word>(line: &[Symbol]) -> Result<Data<W>, ParseErr> {
    let (name, params, span) = match line {
        [Symbol { kind: SymbolKind::Label(name), .. }, Symbol { kind: SymbolKind::Params(params), span }] => (name, params, span),
        [Symbol { kind: SymbolKind::Label(_), span }] => return Err(ParseErr::new(ParseErrKind::ExpectedData, span.clone())),
        [Symbol { kind: SymbolKind::Label(_), .. }, extra, ..] => return Err(ParseErr::new(ParseErrKind::UnexpectedToken, extra.span.clone())),
        [first, ..] => return Err(ParseErr::new(ParseErrKind::UnexpectedToken, first.span.clone())),
        [] => unreachable!("empty lines are skipped"),
    };

    let mut words = vec![];
    for param in params {
        match param {
            Param::Num(n) => words.push({
                W::from_u64(*n).ok_or_else(|| ParseErr::new(ParseErrKind::ValueTooWide, span.clone()))?
            }),
            Param::Imm(n) => words.push({
                W::from_u64(u64::from(*n)).ok_or_else(|| ParseErr::new(ParseErrKind::ValueTooWide, span.clone()))?
            }),
            Param::Str(s) => words.extend(s.bytes().map(|b| W::from_u64_trunc(u64::from(b)))),
            Param::Reg(_) | Param::AddrOf(_) | Param::LenOf(_) => {
                return Err(ParseErr::new(ParseErrKind::InvalidDataValue, span.clone()));
            }
        }
    }

    Ok(Data::new(name.clone(), words))
}

fn parse_instruction<W: Word>(line: &[Symbol], registry: &Registry, data_lens: &HashMap<String, usize>) -> Result<VirtualInstruction<W>, ParseErr> {
    let (instr, operands) = match line {
        [Symbol { kind: SymbolKind::Opcode(mnemonic), span }, rest @ ..] => {
            let instr = registry.by_mnemonic(mnemonic)
                .ok_or_else(|| ParseErr::new(ParseErrKind::UnknownMnemonic, span.clone()))?;
            (instr, rest)
        },
        [first, ..] => return Err(ParseErr::new(ParseErrKind::UnexpectedToken, first.span.clone())),
        [] => unreachable!("empty lines are skipped"),
    };

    let (params, span): (&[Param], Range<usize>) = match operands {
        [] => (&[], line[0].span.clone()),
        [Symbol { kind: SymbolKind::Params(params), span }] => (params.as_slice(), span.clone()),
        [_, extra, ..] | [extra] => return Err(ParseErr::new(ParseErrKind::UnexpectedToken, extra.span.clone())),
    };
    let err = |kind| ParseErr::new(kind, span.clone());

    let mut ops = Vec::with_capacity(params.len());
    let mut refs: Vec<(usize, Label)> = vec![];
    for (i, param) in params.iter().enumerate() {
        let op = match param {
            Param::Reg(r) => Operand::Reg(*r),
            Param::Imm(n) => Operand::Imm(*n),
            Param::Num(n) => Operand::Imm(u16::try_from(*n).map_err(|_| err(ParseErrKind::ValueTooWide))?),
            Param::LenOf(name) => {
                let &len = data_lens.get(name).ok_or_else(|| err(ParseErrKind::UnknownDataLabel))?;
                Operand::Imm(u16::try_from(len).map_err(|_| err(ParseErrKind::ValueTooWide))?)
            },
            Param::AddrOf(name) => {
                let label = match data_lens.contains_key(name) {
                    true  => Label::data(name.clone()),
                    false => Label::code(name.clone()),
                };
                refs.push((i, label));
                Operand::Imm(0)
            },
            Param::Str(_) => return Err(err(ParseErrKind::UnexpectedToken)),
        };
        ops.push(op);
    }

    let bytes = instr.encode_operands(&ops).map_err(|e| err(ParseErrKind::Operand(e)))?;
    let slots = reference_slots::<W>(instr, refs).map_err(err)?;
    let def = InstructionDefinition::new(instr, bytes).map_err(|e| err(ParseErrKind::Operand(e)))?;

    VirtualInstruction::new(def, slots).map_err(|e| err(ParseErrKind::Operand(e)))
}

/// Lays out label references over the parameter bytes of an instruction.
///
/// The address is written as one word, so it is aligned to the end of the operand's value field.
fn reference_slots<W: Word>(instr: &dyn Instruction, refs: Vec<(usize, Label)>) -> Result<Vec<Option<Label>>, ParseErrKind> {
    let mut slots = vec![None; instr.arity()];
    for (operand, label) in refs {
        let field = instr.value_field(operand)
            .ok_or(ParseErrKind::Operand(InstrErr::InvalidOperands(instr.mnemonic())))?;
        if field.len() < W::BYTES {
            return Err(ParseErrKind::ReferenceTooWide);
        }
        slots[field.end - W::BYTES] = Some(label);
    }
    Ok(slots)
}

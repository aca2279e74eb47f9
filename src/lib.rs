//! A lexer, loader, and instruction codec for a small virtual machine.
//!
//! The machine is generic over its word width ([`word::Word`]: `u8`, `u16`, `u32`, or `u64`).
//! Its memory has two regions: data grows upward from the bottom,
//! and instructions grow downward from the top.
//!
//! # Usage
//!
//! To load source code into memory, it must be parsed and loaded:
//! ```
//! use svm_ensemble::parse::parse_program;
//! use svm_ensemble::asm::load;
//! use svm_ensemble::ast::LabelKind;
//! use svm_ensemble::isa::Registry;
//! use svm_ensemble::mem::Memory;
//!
//! let code = "
//!     .data
//!     text: \"abc\\n\"
//!     .code
//!     MOV &text,R0
//!     MOV len(text),R1
//!     INT 1
//! ";
//! let registry = Registry::default();
//! let program = parse_program::<u16>(code, &registry).unwrap();
//!
//! let mut mem = Memory::new(256);
//! let labels = load(&mut mem, program).unwrap();
//! assert_eq!(labels.lookup(LabelKind::Data, "text"), Some(mem.low_addr()));
//! ```
//!
//! Once loaded, instructions can be read back out of memory with the codec:
//! ```
//! # use svm_ensemble::parse::parse_program;
//! # use svm_ensemble::asm::load;
//! # use svm_ensemble::isa::Registry;
//! # use svm_ensemble::mem::Memory;
//! #
//! # let registry = Registry::default();
//! # let program = parse_program::<u16>(".data\ntext: \"abc\\n\"\n.code\nMOV &text,R0\nMOV len(text),R1\nINT 1", &registry).unwrap();
//! # let mut mem = Memory::new(256);
//! # load(&mut mem, program).unwrap();
//! #
//! use svm_ensemble::asm::encoding;
//!
//! let mut addr = mem.high_addr();
//! let mut listing = vec![];
//! for _ in 0..3 {
//!     let def = encoding::decode(&mem, addr, &registry).unwrap();
//!     listing.push(def.to_string());
//!     addr -= def.len_in_words().unwrap();
//! }
//! assert_eq!(listing, ["MOV $0,R0", "MOV $4,R1", "INT $1"]);
//! ```
//!
//! Programs can also be built directly, without source code. See the [`ast`] module.
#![warn(missing_docs)]

pub mod parse;
pub mod ast;
pub mod isa;
pub mod asm;
pub mod mem;
pub mod word;
pub mod err;

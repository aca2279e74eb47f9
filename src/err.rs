//! Error interface for this crate.
//!
//! Every error type in this crate implements [`Error`],
//! which extends [`std::error::Error`] with diagnostic information
//! (a source span and a help message) that a front end can display.
//!
//! This module also re-exports each module's error type for convenience.

use std::borrow::Cow;
use std::ops::Range;

pub use crate::asm::LoadErr;
pub use crate::asm::encoding::EncodingErr;
pub use crate::isa::InstrErr;
pub use crate::mem::MemErr;
pub use crate::parse::ParseErr;
pub use crate::parse::lex::{LexErr, LexErrKind};

/// Unified error interface for all errors in this crate.
pub trait Error: std::error::Error {
    /// The range(s) of source code that this error refers to (if any).
    fn span(&self) -> Option<ErrSpan> {
        None
    }

    /// A help message describing how the error could be fixed (if any).
    fn help(&self) -> Option<Cow<str>> {
        None
    }
}

/// The source code span(s) associated with an error.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ErrSpan {
    /// A single contiguous range of source.
    One(Range<usize>),
    /// Several ranges of source (e.g., two conflicting definitions).
    Many(Vec<Range<usize>>)
}
impl ErrSpan {
    /// Gets the first range of this span.
    pub fn first(&self) -> Option<Range<usize>> {
        match self {
            ErrSpan::One(r)   => Some(r.clone()),
            ErrSpan::Many(rs) => rs.first().cloned(),
        }
    }

    /// Iterates over every range of this span.
    pub fn iter(&self) -> impl Iterator<Item=&Range<usize>> + '_ {
        let slice = match self {
            ErrSpan::One(r)   => std::slice::from_ref(r),
            ErrSpan::Many(rs) => rs.as_slice(),
        };
        slice.iter()
    }
}
impl From<Range<usize>> for ErrSpan {
    fn from(value: Range<usize>) -> Self {
        ErrSpan::One(value)
    }
}
impl<const N: usize> From<[Range<usize>; N]> for ErrSpan {
    fn from(value: [Range<usize>; N]) -> Self {
        ErrSpan::Many(value.to_vec())
    }
}
impl From<Vec<Range<usize>>> for ErrSpan {
    fn from(value: Vec<Range<usize>>) -> Self {
        ErrSpan::Many(value)
    }
}

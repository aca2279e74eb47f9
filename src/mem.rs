//! Memory handling for the virtual machine.
//!
//! This module consists of:
//! - [`Memory`]: The word-addressed memory that programs are loaded into.
//! - [`MemConfig`]: Configuration for creating a [`Memory`].
//! - [`WordFiller`] and [`WordCreateStrategy`]: How a fresh memory's words are generated.
//!
//! # Layout
//!
//! A [`Memory`] is a single fixed-capacity array of words with two growth regions:
//! - the **low region** starts at [`Memory::low_addr`] and grows upward (data blocks),
//! - the **high region** starts at [`Memory::high_addr`] and grows downward (instructions).
//!
//! Each region keeps a cursor. Every allocation checks that the regions
//! do not collide; a collision is an error. The memory is never resized.
//!
//! ```text
//! low_addr                                              high_addr
//! | data 0 | data 1 | ... ->     (free)     <- ... | instr 1 | instr 0 |
//!                           ^ low cursor    ^ high cursor
//! ```

use rand::rngs::StdRng;
use rand::Rng;

use crate::word::Word;

/// Trait that describes types that can be used to create the words of a fresh [`Memory`].
///
/// The generated words only exist until the memory is first cleared
/// (which the loader always does before loading a program).
pub trait WordFiller {
    /// Generate the data.
    fn generate<W: Word>(&mut self) -> W;
}
impl WordFiller for () {
    /// This creates unseeded, non-deterministic values.
    fn generate<W: Word>(&mut self) -> W {
        W::from_u64_trunc(rand::random())
    }
}
impl WordFiller for u64 {
    /// Sets each word to the given value (truncated to the word width).
    fn generate<W: Word>(&mut self) -> W {
        W::from_u64_trunc(*self)
    }
}
impl WordFiller for StdRng {
    /// This creates values from the standard random number generator.
    ///
    /// This can be used to create deterministic, seeded values.
    fn generate<W: Word>(&mut self) -> W {
        W::from_u64_trunc(self.gen())
    }
}

/// Strategy used to initialize the words of a fresh [`Memory`].
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum WordCreateStrategy {
    /// Initializes each word randomly and non-deterministically.
    #[default]
    Unseeded,

    /// Initializes each word randomly and deterministically.
    Seeded {
        /// The seed the RNG was initialized with.
        seed: u64
    },

    /// Initializes each word to a known value.
    Known {
        /// The value to initialize each value to.
        value: u64
    }
}

impl WordCreateStrategy {
    fn generator(&self) -> WCGenerator {
        use rand::SeedableRng;

        match self {
            WordCreateStrategy::Unseeded => WCGenerator::Unseeded,
            WordCreateStrategy::Seeded { seed } => WCGenerator::Seeded(Box::new(StdRng::seed_from_u64(*seed))),
            WordCreateStrategy::Known { value } => WCGenerator::Known(*value),
        }
    }
}

enum WCGenerator {
    Unseeded,
    Seeded(Box<StdRng>),
    Known(u64)
}
impl WordFiller for WCGenerator {
    fn generate<W: Word>(&mut self) -> W {
        match self {
            WCGenerator::Unseeded  => ().generate(),
            WCGenerator::Seeded(r) => r.generate(),
            WCGenerator::Known(k)  => k.generate(),
        }
    }
}

/// Configuration for creating a [`Memory`].
///
/// ```
/// use svm_ensemble::mem::{MemConfig, Memory, WordCreateStrategy};
///
/// let mem = Memory::<u16>::with_config(MemConfig {
///     capacity: 256,
///     fill: WordCreateStrategy::Known { value: 0 },
/// });
/// assert_eq!(mem.high_addr(), 255);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct MemConfig {
    /// The number of words in the memory. Must be non-zero.
    pub capacity: usize,

    /// How the words of the fresh memory are generated.
    pub fill: WordCreateStrategy
}
impl Default for MemConfig {
    fn default() -> Self {
        Self {
            capacity: 0x400,
            fill: WordCreateStrategy::default()
        }
    }
}

/// Errors that can occur when accessing or allocating [`Memory`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum MemErr {
    /// The address is outside of the bounds of memory.
    AddressOutOfRange {
        /// The accessed address.
        addr: usize,
        /// The capacity of the memory.
        capacity: usize
    },
    /// A run of words would continue below address 0.
    RunOutOfRange {
        /// The address the run starts at.
        addr: usize,
        /// The number of words in the run.
        len: usize
    },
    /// An allocation would have caused the low and high regions to overlap.
    RegionCollision {
        /// The number of words requested.
        requested: usize,
        /// The number of words still free between the two regions.
        free: usize
    }
}
impl std::fmt::Display for MemErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemErr::AddressOutOfRange { addr, capacity } => write!(f, "address {addr:#X} is out of range for memory of {capacity} words"),
            MemErr::RunOutOfRange { addr, len } => write!(f, "run of {len} words starting at {addr:#X} extends below address 0"),
            MemErr::RegionCollision { requested, free } => write!(f, "cannot allocate {requested} words, only {free} words are free between the data and instruction regions"),
        }
    }
}
impl std::error::Error for MemErr {}
impl crate::err::Error for MemErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            MemErr::AddressOutOfRange { capacity, .. } => Some(format!("valid addresses are in [0, {}]", capacity.saturating_sub(1)).into()),
            MemErr::RunOutOfRange { .. } => Some("runs are laid out toward lower addresses, so the start must be at least the run length minus one".into()),
            MemErr::RegionCollision { .. } => Some("the program does not fit, try a memory with a larger capacity".into()),
        }
    }
}

/// Word-addressed memory.
///
/// This provides plain word access ([`Memory::read`] and [`Memory::write`]),
/// region allocation ([`Memory::alloc_low`] and [`Memory::alloc_high`]),
/// and an instruction-oriented view ([`Memory::read_run`] and [`Memory::write_run`]),
/// which accesses a run of words that grows toward lower addresses
/// (the way instructions are laid out in the high region).
///
/// ```
/// use svm_ensemble::mem::Memory;
///
/// let mut mem = Memory::<u16>::new(16);
/// mem.clear();
/// mem.write(3, 0xABCD).unwrap();
/// assert_eq!(mem.read(3), Ok(0xABCD));
/// assert!(mem.read(16).is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Memory<W> {
    data: Box<[W]>,
    /// First free address of the low region.
    low_cursor: usize,
    /// Lowest address in use by the high region (== capacity when empty).
    high_cursor: usize
}
impl<W: Word> Memory<W> {
    /// Creates a new memory of a given capacity using the default fill strategy.
    ///
    /// # Panics
    ///
    /// This will panic if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_config(MemConfig { capacity, ..Default::default() })
    }

    /// Creates a new memory with the given configuration.
    ///
    /// # Panics
    ///
    /// This will panic if `config.capacity` is zero.
    pub fn with_config(config: MemConfig) -> Self {
        let MemConfig { capacity, fill } = config;
        assert!(capacity > 0, "memory capacity must be non-zero");

        let mut filler = fill.generator();
        Self {
            data: std::iter::repeat_with(|| filler.generate())
                .take(capacity)
                .collect(),
            low_cursor: 0,
            high_cursor: capacity
        }
    }

    /// The number of words in this memory.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The lowest address of memory, where the data region begins.
    pub fn low_addr(&self) -> usize {
        0
    }

    /// The highest address of memory, where the instruction region begins.
    pub fn high_addr(&self) -> usize {
        self.data.len() - 1
    }

    /// The next free address of the low region.
    pub fn low_cursor(&self) -> usize {
        self.low_cursor
    }

    /// The lowest address currently occupied by the high region.
    ///
    /// If the high region is empty, this is [`Memory::capacity`].
    pub fn high_cursor(&self) -> usize {
        self.high_cursor
    }

    /// The number of unallocated words between the two regions.
    pub fn free(&self) -> usize {
        self.high_cursor - self.low_cursor
    }

    /// Zeroes every word and resets both region cursors.
    pub fn clear(&mut self) {
        self.data.fill(W::ZERO);
        self.low_cursor = 0;
        self.high_cursor = self.data.len();
    }

    /// Reads the word at the provided address.
    pub fn read(&self, addr: usize) -> Result<W, MemErr> {
        self.data.get(addr)
            .copied()
            .ok_or(MemErr::AddressOutOfRange { addr, capacity: self.capacity() })
    }

    /// Writes a word to the provided address.
    pub fn write(&mut self, addr: usize, word: W) -> Result<(), MemErr> {
        let capacity = self.capacity();
        let slot = self.data.get_mut(addr)
            .ok_or(MemErr::AddressOutOfRange { addr, capacity })?;
        *slot = word;
        Ok(())
    }

    /// Allocates `n` words from the low region, returning the address of the first word.
    pub fn alloc_low(&mut self, n: usize) -> Result<usize, MemErr> {
        if n > self.free() {
            return Err(MemErr::RegionCollision { requested: n, free: self.free() });
        }

        let addr = self.low_cursor;
        self.low_cursor += n;
        Ok(addr)
    }

    /// Allocates `n` words from the high region, returning the *topmost* address of the run.
    ///
    /// The run occupies the addresses `(addr - n + 1)..=addr`,
    /// which is the layout read by [`Memory::read_run`].
    pub fn alloc_high(&mut self, n: usize) -> Result<usize, MemErr> {
        if n == 0 || n > self.free() {
            return Err(MemErr::RegionCollision { requested: n, free: self.free() });
        }

        let top = self.high_cursor - 1;
        self.high_cursor -= n;
        Ok(top)
    }

    /// Reads a run of `n` words starting at `addr` and continuing toward lower addresses.
    ///
    /// The first element of the result is the word at `addr`.
    pub fn read_run(&self, addr: usize, n: usize) -> Result<Vec<W>, MemErr> {
        (0..n)
            .map(|i| {
                let a = addr.checked_sub(i)
                    .ok_or(MemErr::RunOutOfRange { addr, len: n })?;
                self.read(a)
            })
            .collect()
    }

    /// Writes a run of words starting at `addr` and continuing toward lower addresses.
    ///
    /// The first word is written at `addr`.
    pub fn write_run(&mut self, addr: usize, words: &[W]) -> Result<(), MemErr> {
        for (i, &word) in words.iter().enumerate() {
            let a = addr.checked_sub(i)
                .ok_or(MemErr::RunOutOfRange { addr, len: words.len() })?;
            self.write(a, word)?;
        }
        Ok(())
    }

    /// The memory image as a flat slice of words.
    pub fn as_slice(&self) -> &[W] {
        &self.data
    }
}

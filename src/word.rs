//! Machine words.
//!
//! The virtual machine is generic over its word width.
//! The width is picked once per VM instance by choosing a [`Word`] type
//! (one of `u8`, `u16`, `u32`, or `u64`), and every component of the pipeline
//! ([`Memory`], [`InstructionDefinition`], the codec, and the loader)
//! is parameterized over it.
//!
//! Multi-byte values are always packed big-endian.
//!
//! [`Memory`]: crate::mem::Memory
//! [`InstructionDefinition`]: crate::isa::InstructionDefinition

/// A fixed-width unit of memory and of instruction parameters.
pub trait Word: Copy + Eq + Ord + Default + std::hash::Hash + std::fmt::Debug + std::fmt::UpperHex + Send + Sync + 'static {
    /// How many bytes are contained within this word.
    ///
    /// For example, `u16` has 2 bytes and thus BYTES == 2.
    const BYTES: usize;

    /// The zero word.
    const ZERO: Self;

    /// Converts the word into its big-endian byte representation.
    ///
    /// The returned vector always has length [`Word::BYTES`].
    fn to_be_vec(self) -> Vec<u8>;

    /// Reads a word from its big-endian byte representation.
    ///
    /// This returns `None` if the slice's length is not [`Word::BYTES`].
    fn from_be_slice(bytes: &[u8]) -> Option<Self>;

    /// Widens the word into a `u64`.
    fn to_u64(self) -> u64;

    /// Converts a `u64` into a word, returning `None` if it does not fit.
    fn from_u64(value: u64) -> Option<Self>;

    /// Converts a `u64` into a word, discarding any bits that do not fit.
    fn from_u64_trunc(value: u64) -> Self;
}

macro_rules! impl_word_for_ints {
    ($($Int:ty),*) => {
        $(
            impl Word for $Int {
                const BYTES: usize = std::mem::size_of::<$Int>();
                const ZERO: Self = 0;

                fn to_be_vec(self) -> Vec<u8> {
                    self.to_be_bytes().to_vec()
                }

                fn from_be_slice(bytes: &[u8]) -> Option<Self> {
                    <[u8; std::mem::size_of::<$Int>()]>::try_from(bytes)
                        .ok()
                        .map(<$Int>::from_be_bytes)
                }

                fn to_u64(self) -> u64 {
                    u64::from(self)
                }

                fn from_u64(value: u64) -> Option<Self> {
                    <$Int>::try_from(value).ok()
                }

                fn from_u64_trunc(value: u64) -> Self {
                    value as $Int
                }
            }
        )*
    }
}
impl_word_for_ints! { u8, u16, u32, u64 }

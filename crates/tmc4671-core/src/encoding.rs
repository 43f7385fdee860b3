//! Fixed 40-bit SPI word layout and stimulus-word construction.
//!
//! ```text
//!  39  38        32 31                               0
//! +---+------------+----------------------------------+
//! | W |  address   |             content              |
//! +---+------------+----------------------------------+
//! ```
//!
//! The same constants drive the slave decoder, so encoder and decoder can not
//! drift apart.

use std::fmt;
use std::str::FromStr;

use crate::fault::EncodeError;
use crate::registers::RegisterFile;

/// Width of the register address field.
pub const ADDRESS_BITS: u32 = 7;
/// Width of the register content field.
pub const CONTENT_BITS: u32 = 32;
/// Total protocol word width (direction + address + content).
pub const WORD_BITS: u32 = 1 + ADDRESS_BITS + CONTENT_BITS;
/// Bit position of the direction flag.
pub const DIRECTION_BIT: u32 = WORD_BITS - 1;
/// Mask for the address field once shifted down.
pub const ADDRESS_MASK: u8 = (1 << ADDRESS_BITS) - 1;
/// Mask for a full protocol word.
pub const WORD_MASK: u64 = (1 << WORD_BITS) - 1;

/// Transfer direction carried in the first bit of each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Direction {
    /// Direction bit 0: the slave returns the register content.
    Read,
    /// Direction bit 1: the slave stores the transmitted content.
    Write,
}

impl Direction {
    /// Decodes the sampled direction bit.
    #[must_use]
    pub const fn from_bit(bit: bool) -> Self {
        if bit {
            Self::Write
        } else {
            Self::Read
        }
    }

    /// Returns the bus level for this direction.
    #[must_use]
    pub const fn bit(self) -> bool {
        matches!(self, Self::Write)
    }

    /// Lowercase name as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            other => Err(EncodeError::InvalidDirection(other.to_string())),
        }
    }
}

/// A protocol word split into its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SpiWord {
    /// Transfer direction.
    pub direction: Direction,
    /// 7-bit register address.
    pub address: u8,
    /// 32-bit register content.
    pub content: u32,
}

impl SpiWord {
    /// Packs the fields into a 40-bit word.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        let direction = if self.direction.bit() { 1u64 } else { 0 };
        (direction << DIRECTION_BIT)
            | (((self.address & ADDRESS_MASK) as u64) << CONTENT_BITS)
            | self.content as u64
    }

    /// Splits a 40-bit word into its fields; bits above the word are ignored.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_bits(word: u64) -> Self {
        Self {
            direction: Direction::from_bit((word >> DIRECTION_BIT) & 1 == 1),
            address: ((word >> CONTENT_BITS) as u8) & ADDRESS_MASK,
            content: word as u32,
        }
    }
}

/// Builds a stimulus word for `address`, which must be seeded in `registers`.
///
/// # Errors
///
/// Returns [`EncodeError::UnknownAddress`] when `address` is not a seeded
/// register.
pub fn encode(
    direction: Direction,
    address: u8,
    content: u32,
    registers: &RegisterFile,
) -> Result<u64, EncodeError> {
    if !registers.contains(address) {
        return Err(EncodeError::UnknownAddress {
            address,
            known: registers.addresses(),
        });
    }

    Ok(SpiWord {
        direction,
        address,
        content,
    }
    .to_bits())
}

/// Splits a 40-bit word into its fields.
#[must_use]
pub const fn decode(word: u64) -> SpiWord {
    SpiWord::from_bits(word)
}

//! TMC4671 register interface bootstrap.
//!
//! Only the chip-info window is modelled: `CHIPINFO_ADDR` selects which
//! identification word appears in `CHIPINFO_DATA`.

use crate::api::SpiConfig;
use crate::device::SpiSlave;
use crate::fault::ConfigError;
use crate::hooks::HookRegistry;
use crate::registers::RegisterFile;

/// Chip-info data register.
pub const CHIPINFO_DATA: u8 = 0x00;
/// Chip-info selector register.
pub const CHIPINFO_ADDR: u8 = 0x01;

/// ASCII `"4671"`, the silicon type reported at reset.
pub const CHIP_TYPE: u32 = u32::from_be_bytes(*b"4671");

/// Identification words indexed by the value written to [`CHIPINFO_ADDR`].
pub const CHIPINFO_TABLE: [u32; 6] = [
    CHIP_TYPE,
    0x0000_0100,
    0x2022_0323,
    0x0010_1029,
    u32::from_be_bytes(*b"var2"),
    u32::from_be_bytes(*b"rev3"),
];

/// Recomputes `CHIPINFO_DATA` for a chip-info selector value.
#[must_use]
pub fn chipinfo_data(select: u32) -> Option<Vec<u32>> {
    let index = usize::try_from(select).ok()?;
    CHIPINFO_TABLE.get(index).map(|word| vec![*word])
}

/// Factory for the TMC4671 slave and its parts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tmc4671;

impl Tmc4671 {
    /// Bus parameters of the TMC4671 SPI port.
    #[must_use]
    pub fn config() -> SpiConfig {
        SpiConfig::default()
    }

    /// Reset-state register file.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in seed; the `Result` carries
    /// [`RegisterFile::seed`] validation through.
    pub fn registers() -> Result<RegisterFile, ConfigError> {
        Ok(RegisterFile::seed([(CHIPINFO_DATA, CHIP_TYPE), (CHIPINFO_ADDR, 0)])?)
    }

    /// Chip-info hook: writes to `CHIPINFO_ADDR` refresh `CHIPINFO_DATA`.
    #[must_use]
    pub fn hooks() -> HookRegistry {
        HookRegistry::new().with_hook(CHIPINFO_ADDR, [CHIPINFO_DATA], chipinfo_data)
    }

    /// Fully wired slave in its reset state.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigError`] from seeding or configuration checks.
    pub fn slave() -> Result<SpiSlave, ConfigError> {
        SpiSlave::new(Self::config(), Self::registers()?, Self::hooks())
    }
}

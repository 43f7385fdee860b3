use std::collections::BTreeMap;

use crate::encoding::ADDRESS_MASK;
use crate::fault::RegisterError;

/// Sparse register file addressed by the 7-bit protocol address.
///
/// Only seeded addresses exist; the file never grows after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterFile {
    values: BTreeMap<u8, u32>,
}

impl RegisterFile {
    /// Builds a register file from its initial contents.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::AddressOutOfRange`] when an address does not
    /// fit the 7-bit address field.
    pub fn seed(initial: impl IntoIterator<Item = (u8, u32)>) -> Result<Self, RegisterError> {
        let mut values = BTreeMap::new();
        for (address, value) in initial {
            if address > ADDRESS_MASK {
                return Err(RegisterError::AddressOutOfRange(address));
            }
            values.insert(address, value);
        }
        Ok(Self { values })
    }

    /// Reads a register.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::UnknownAddress`] when `address` was never seeded.
    pub fn get(&self, address: u8) -> Result<u32, RegisterError> {
        self.values
            .get(&address)
            .copied()
            .ok_or(RegisterError::UnknownAddress(address))
    }

    /// Overwrites a seeded register.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::UnknownAddress`] when `address` was never seeded.
    pub fn set(&mut self, address: u8, value: u32) -> Result<(), RegisterError> {
        let slot = self
            .values
            .get_mut(&address)
            .ok_or(RegisterError::UnknownAddress(address))?;
        *slot = value;
        Ok(())
    }

    /// Returns `true` when `address` was seeded.
    #[must_use]
    pub fn contains(&self, address: u8) -> bool {
        self.values.contains_key(&address)
    }

    /// Seeded addresses in ascending order.
    #[must_use]
    pub fn addresses(&self) -> Vec<u8> {
        self.values.keys().copied().collect()
    }

    /// Iterates `(address, value)` pairs in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u32)> + '_ {
        self.values.iter().map(|(address, value)| (*address, *value))
    }

    /// Number of seeded registers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when no register was seeded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::RegisterFile;
    use crate::fault::RegisterError;

    #[test]
    fn seeded_values_are_readable() {
        let registers = RegisterFile::seed([(0x00, 0xAABB_CCDD), (0x01, 7)]).expect("valid seed");
        assert_eq!(registers.get(0x00), Ok(0xAABB_CCDD));
        assert_eq!(registers.get(0x01), Ok(7));
        assert_eq!(registers.len(), 2);
        assert!(!registers.is_empty());
    }

    #[test]
    fn unseeded_reads_and_writes_fail() {
        let mut registers = RegisterFile::seed([(0x00, 0)]).expect("valid seed");
        assert_eq!(registers.get(0x02), Err(RegisterError::UnknownAddress(0x02)));
        assert_eq!(
            registers.set(0x02, 1),
            Err(RegisterError::UnknownAddress(0x02))
        );
        assert!(!registers.contains(0x02));
        assert_eq!(registers.len(), 1);
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut registers = RegisterFile::seed([(0x01, 0)]).expect("valid seed");
        registers.set(0x01, 0x1234).expect("seeded address");
        assert_eq!(registers.get(0x01), Ok(0x1234));
    }

    #[test]
    fn seed_rejects_addresses_wider_than_field() {
        assert_eq!(
            RegisterFile::seed([(0x80, 0)]),
            Err(RegisterError::AddressOutOfRange(0x80))
        );
    }

    #[test]
    fn addresses_are_sorted() {
        let registers = RegisterFile::seed([(0x05, 0), (0x00, 0), (0x03, 0)]).expect("valid seed");
        assert_eq!(registers.addresses(), vec![0x00, 0x03, 0x05]);
        assert_eq!(
            registers.iter().collect::<Vec<_>>(),
            vec![(0x00, 0), (0x03, 0), (0x05, 0)]
        );
    }
}

//! Dependent-register recomputation triggered by writes to watch addresses.

use std::collections::BTreeMap;

use crate::fault::HookError;

/// Pure recompute function: maps the value written to a watch address onto
/// one new value per dependent address, or `None` outside its domain.
pub type RecomputeFn = fn(u32) -> Option<Vec<u32>>;

/// Dependents and recompute function registered for one watch address.
#[derive(Debug, Clone)]
pub struct ChangeHook {
    /// Dependent addresses, in the order their values are written back.
    pub dependents: Vec<u8>,
    /// Recompute function evaluated with the just-written watch value.
    pub recompute: RecomputeFn,
}

impl ChangeHook {
    /// Evaluates the hook for a write of `value` to `watch`.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::OutOfDomain`] when the function is undefined for
    /// `value`, or [`HookError::ArityMismatch`] when it returns a different
    /// number of values than there are dependents.
    pub fn evaluate(&self, watch: u8, value: u32) -> Result<Vec<(u8, u32)>, HookError> {
        let values = (self.recompute)(value).ok_or(HookError::OutOfDomain { watch, value })?;
        if values.len() != self.dependents.len() {
            return Err(HookError::ArityMismatch {
                watch,
                expected: self.dependents.len(),
                actual: values.len(),
            });
        }
        Ok(self.dependents.iter().copied().zip(values).collect())
    }
}

/// Registry of change hooks keyed by watch address.
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    hooks: BTreeMap<u8, ChangeHook>,
}

impl HookRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hooks: BTreeMap::new(),
        }
    }

    /// Registers `recompute` for writes to `watch`, replacing any earlier hook.
    pub fn register(&mut self, watch: u8, dependents: impl Into<Vec<u8>>, recompute: RecomputeFn) {
        let hook = ChangeHook {
            dependents: dependents.into(),
            recompute,
        };
        if self.hooks.insert(watch, hook).is_some() {
            log::debug!("replaced change hook on register 0x{watch:02X}");
        }
    }

    /// Builder-style variant of [`HookRegistry::register`].
    #[must_use]
    pub fn with_hook(
        mut self,
        watch: u8,
        dependents: impl Into<Vec<u8>>,
        recompute: RecomputeFn,
    ) -> Self {
        self.register(watch, dependents, recompute);
        self
    }

    /// Returns the hook registered for `watch`, if any.
    #[must_use]
    pub fn get(&self, watch: u8) -> Option<&ChangeHook> {
        self.hooks.get(&watch)
    }

    /// Returns `true` when writes to `address` trigger a recompute.
    #[must_use]
    pub fn is_watched(&self, address: u8) -> bool {
        self.hooks.contains_key(&address)
    }

    /// Dependent updates caused by writing `value` to `address`.
    ///
    /// Returns `Ok(None)` when `address` is not watched.
    ///
    /// # Errors
    ///
    /// Propagates [`ChangeHook::evaluate`] failures.
    pub fn on_write(&self, address: u8, value: u32) -> Result<Option<Vec<(u8, u32)>>, HookError> {
        self.hooks
            .get(&address)
            .map(|hook| hook.evaluate(address, value))
            .transpose()
    }

    /// Iterates registered watch addresses and their hooks.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &ChangeHook)> + '_ {
        self.hooks.iter().map(|(watch, hook)| (*watch, hook))
    }
}

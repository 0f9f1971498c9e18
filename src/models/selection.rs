//! The per-session address selection.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::AddressLevel;
use crate::error::SelectionError;

/// Chosen value for each address level.
///
/// Values are always a contiguous prefix of the hierarchy: a level may hold a
/// value only if every level before it does, and clearing a level clears
/// everything after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSelection {
    values: [Option<String>; AddressLevel::COUNT],
}

impl AddressSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value selected at a level
    pub fn get(&self, level: AddressLevel) -> Option<&str> {
        self.values[level.index()].as_deref()
    }

    pub fn is_set(&self, level: AddressLevel) -> bool {
        self.values[level.index()].is_some()
    }

    /// Set a level, clearing every level after it.
    pub fn set(
        &mut self,
        level: AddressLevel,
        value: impl Into<String>,
    ) -> Result<(), SelectionError> {
        if let Some(missing) = level.ancestors().iter().find(|a| !self.is_set(**a)) {
            return Err(SelectionError::AncestorUnset {
                level,
                missing: *missing,
            });
        }
        self.values[level.index()] = Some(value.into());
        self.clear_after(level);
        Ok(())
    }

    /// Clear a level and every level after it
    pub fn clear_from(&mut self, level: AddressLevel) {
        for slot in &mut self.values[level.index()..] {
            *slot = None;
        }
    }

    /// Clear every level after `level`, keeping `level` itself
    pub fn clear_after(&mut self, level: AddressLevel) {
        for slot in &mut self.values[level.index() + 1..] {
            *slot = None;
        }
    }

    pub fn clear(&mut self) {
        self.clear_from(AddressLevel::Province);
    }

    /// Values of every level before `level`, or `None` if any of them is unset
    pub fn ancestors_of(&self, level: AddressLevel) -> Option<Vec<String>> {
        self.values[..level.index()].iter().cloned().collect()
    }

    /// First level without a value
    pub fn first_unresolved(&self) -> Option<AddressLevel> {
        AddressLevel::all()
            .iter()
            .find(|level| !self.is_set(**level))
            .copied()
    }

    /// Last level holding a value
    pub fn deepest(&self) -> Option<AddressLevel> {
        AddressLevel::all()
            .iter()
            .rev()
            .find(|level| self.is_set(**level))
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    /// Whether `ancestors` agrees with this selection on every position it names.
    ///
    /// Used to decide whether a cached ancestor tuple is still reachable from
    /// the current selection.
    pub fn has_prefix(&self, ancestors: &[String]) -> bool {
        ancestors.len() <= AddressLevel::COUNT
            && ancestors
                .iter()
                .zip(self.values.iter())
                .all(|(expected, actual)| actual.as_deref() == Some(expected.as_str()))
    }

    /// Set levels in order, stopping at the first `None`
    pub fn from_values<I, S>(values: I) -> Result<Self, SelectionError>
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let mut selection = Self::new();
        for (level, value) in AddressLevel::all().iter().zip(values) {
            match value {
                Some(v) => selection.set(*level, v)?,
                None => break,
            }
        }
        Ok(selection)
    }
}

impl Serialize for AddressSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for level in AddressLevel::all() {
            if let Some(value) = self.get(*level) {
                map.serialize_entry(level.param_key(), value)?;
            }
        }
        map.end()
    }
}

/// A fully resolved address, keyed like the upstream request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAddress {
    pub addr_do: String,
    pub addr_si: String,
    pub addr_gu: String,
    pub addr_lidong: String,
    pub addr_li: String,
    pub addr_jibun: String,
}

impl ResolvedAddress {
    /// Build from a complete selection
    pub fn from_selection(selection: &AddressSelection) -> Option<Self> {
        let value = |level: AddressLevel| selection.get(level).map(str::to_string);
        Some(Self {
            addr_do: value(AddressLevel::Province)?,
            addr_si: value(AddressLevel::City)?,
            addr_gu: value(AddressLevel::District)?,
            addr_lidong: value(AddressLevel::Town)?,
            addr_li: value(AddressLevel::Village)?,
            addr_jibun: value(AddressLevel::Lot)?,
        })
    }
}

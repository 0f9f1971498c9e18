//! Cascading address selection state machine.
//!
//! Holds the per-session [`AddressSelection`] together with the options loaded
//! for each level. Changing a level invalidates every level after it; option
//! fetches are tagged with the ancestor values they were issued for so a slow
//! answer can never land on a newer selection.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DefaultSelection;
use crate::error::{LookupResult, SelectionError};
use crate::kepco::Transport;
use crate::models::{AddressLevel, AddressSelection, OptionList, ResolvedAddress};
use crate::resolver::AddressResolver;

/// Where the cascade stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "level", rename_all = "snake_case")]
pub enum CascadeState {
    /// Nothing selected yet
    Start,
    /// Waiting for a value at this level
    Resolving(AddressLevel),
    /// Every level holds a value
    Complete,
}

/// Options loaded for one level
#[derive(Debug, Clone, Default)]
enum Slot {
    #[default]
    Empty,
    Loaded(OptionList),
    Failed(String),
}

/// A pending option fetch, bound to the ancestors it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub level: AddressLevel,
    pub ancestors: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Cascade {
    selection: AddressSelection,
    slots: [Slot; AddressLevel::COUNT],
}

impl Cascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> &AddressSelection {
        &self.selection
    }

    pub fn state(&self) -> CascadeState {
        match self.selection.first_unresolved() {
            None => CascadeState::Complete,
            Some(AddressLevel::Province) => CascadeState::Start,
            Some(level) => CascadeState::Resolving(level),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.selection.is_complete()
    }

    /// The lot list came back empty: nothing further can be chosen
    pub fn is_dead_end(&self) -> bool {
        !self.selection.is_set(AddressLevel::Lot)
            && matches!(&self.slots[AddressLevel::Lot.index()], Slot::Loaded(o) if o.is_empty())
    }

    pub fn resolved(&self) -> Option<ResolvedAddress> {
        ResolvedAddress::from_selection(&self.selection)
    }

    /// A level is enabled once every level before it holds a value
    pub fn is_enabled(&self, level: AddressLevel) -> bool {
        level.ancestors().iter().all(|a| self.selection.is_set(*a))
    }

    pub fn options(&self, level: AddressLevel) -> Option<&OptionList> {
        match &self.slots[level.index()] {
            Slot::Loaded(options) => Some(options),
            _ => None,
        }
    }

    /// Message from the last failed fetch at this level
    pub fn error(&self, level: AddressLevel) -> Option<&str> {
        match &self.slots[level.index()] {
            Slot::Failed(message) => Some(message),
            _ => None,
        }
    }

    /// Choose `value` at `level`.
    ///
    /// A blank value or the level's placeholder clears the level instead.
    /// Every later level loses its value and options, including when the same
    /// value is chosen again.
    pub fn select(&mut self, level: AddressLevel, value: &str) -> Result<(), SelectionError> {
        let value = value.trim();
        if value.is_empty() || value == level.placeholder() {
            self.clear(level);
            return Ok(());
        }

        if let Some(options) = self.options(level) {
            if !options.contains(value) {
                return Err(SelectionError::NotAnOption {
                    level,
                    value: value.to_string(),
                });
            }
        }

        self.selection.set(level, value)?;
        self.reset_slots_after(level);
        debug!("Selected {} = {}", level, value);
        Ok(())
    }

    /// Clear `level` and everything after it
    pub fn clear(&mut self, level: AddressLevel) {
        self.selection.clear_from(level);
        self.reset_slots_after(level);
    }

    pub fn reset(&mut self) {
        self.selection.clear();
        self.slots = Default::default();
        debug!("Cascade reset");
    }

    /// The next level whose options still need fetching
    pub fn next_fetch(&self) -> Option<FetchTicket> {
        for level in AddressLevel::all() {
            let ancestors = self.selection.ancestors_of(*level)?;
            if matches!(self.slots[level.index()], Slot::Empty) {
                return Some(FetchTicket {
                    level: *level,
                    ancestors,
                });
            }
            if !self.selection.is_set(*level) {
                return None;
            }
        }
        None
    }

    /// Install the outcome of a fetch.
    ///
    /// Returns false and leaves the cascade untouched when the selection has
    /// moved on since the ticket was issued.
    pub fn apply(&mut self, ticket: &FetchTicket, result: &LookupResult<OptionList>) -> bool {
        let current = self.selection.ancestors_of(ticket.level);
        if current.as_deref() != Some(ticket.ancestors.as_slice()) {
            debug!(
                "Discarding stale {} options for {:?}",
                ticket.level, ticket.ancestors
            );
            return false;
        }

        self.slots[ticket.level.index()] = match result {
            Ok(options) => Slot::Loaded(options.clone()),
            Err(e) => Slot::Failed(e.to_string()),
        };
        true
    }

    /// Fetch whatever the current selection still needs.
    ///
    /// On failure the level records the error and the error is returned; the
    /// levels before it are untouched.
    pub async fn refresh<T: Transport>(&mut self, resolver: &AddressResolver<T>) -> LookupResult<()> {
        while let Some(ticket) = self.next_fetch() {
            let result = resolver.options(ticket.level, &ticket.ancestors).await;
            self.apply(&ticket, &result);
            if let Err(e) = result {
                warn!("Fetching {} options failed: {}", ticket.level, e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Walk the configured defaults from the province down.
    ///
    /// Stops at the first level without a default or whose default is not
    /// offered. Returns how many levels were preselected.
    pub async fn apply_defaults<T: Transport>(
        &mut self,
        resolver: &AddressResolver<T>,
        defaults: &DefaultSelection,
    ) -> LookupResult<usize> {
        let mut applied = 0;
        for level in AddressLevel::all() {
            let Some(value) = defaults.get(*level) else {
                break;
            };
            self.refresh(resolver).await?;

            let offered = self.options(*level).is_some_and(|o| o.contains(value));
            if !offered || self.select(*level, value).is_err() {
                warn!("Default {} = {} is not offered, stopping", level, value);
                break;
            }
            applied += 1;
        }

        self.refresh(resolver).await?;
        if applied > 0 {
            info!("Preselected {} address levels", applied);
        }
        Ok(applied)
    }

    /// Snapshot for rendering
    pub fn view(&self) -> CascadeView {
        let levels = AddressLevel::all()
            .iter()
            .map(|level| LevelView {
                level: *level,
                label: level.label(),
                placeholder: level.placeholder(),
                enabled: self.is_enabled(*level),
                selected: self.selection.get(*level).map(str::to_string),
                options: self.options(*level).cloned(),
                error: self.error(*level).map(str::to_string),
            })
            .collect();

        CascadeView {
            state: self.state(),
            ready: self.is_complete(),
            dead_end: self.is_dead_end(),
            levels,
        }
    }

    fn reset_slots_after(&mut self, level: AddressLevel) {
        for slot in &mut self.slots[level.index() + 1..] {
            *slot = Slot::Empty;
        }
    }
}

/// What a front-end needs to draw one dropdown
#[derive(Debug, Clone, Serialize)]
pub struct LevelView {
    pub level: AddressLevel,
    pub label: &'static str,
    pub placeholder: &'static str,
    pub enabled: bool,
    pub selected: Option<String>,
    pub options: Option<OptionList>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CascadeView {
    #[serde(flatten)]
    pub state: CascadeState,
    /// Search may be submitted
    pub ready: bool,
    pub dead_end: bool,
    pub levels: Vec<LevelView>,
}

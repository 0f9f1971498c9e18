//! Core data models for the address cascade.

pub mod level;
pub mod options;
pub mod selection;

pub use level::AddressLevel;
pub use options::{natural_cmp, OptionList, OTHER_REGION};
pub use selection::{AddressSelection, ResolvedAddress};

//! kepco-addr - cascading Korean address lookup against KEPCO's address service
//!
//! This library provides the client, option normalization, memo cache and
//! selection state machine shared by the `lookup` and `serve` binaries.

pub mod cascade;
pub mod config;
pub mod error;
pub mod kepco;
pub mod models;
pub mod resolver;

pub use cascade::{Cascade, CascadeState, CascadeView, FetchTicket};
pub use config::Config;
pub use error::{LookupError, LookupResult, SelectionError};
pub use kepco::KepcoClient;
pub use models::{AddressLevel, AddressSelection, OptionList, ResolvedAddress};
pub use resolver::AddressResolver;

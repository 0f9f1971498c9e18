//! KEPCO address service client and wire format.

mod client;
mod transport;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{finish_options, KepcoClient};
pub use transport::{HttpTransport, RemoteRequest, Transport};
pub use wire::{RemoteQuery, RemoteResponse};

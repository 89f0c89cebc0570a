//! Ports for the correlation layer.

pub mod transport;

pub use transport::{Transport, TransportError, TransportEvent, TransportEvents};

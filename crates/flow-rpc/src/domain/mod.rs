//! Domain types for the correlation layer.
//!
//! Pure data and bookkeeping: no tasks are spawned and no I/O happens here.

pub mod config;
pub mod correlation;
pub mod envelope;
pub mod error;
pub mod invocation;
pub mod pending;

// Re-exports for convenience
pub use config::{ClientConfig, ConfigError, TraceLevel};
pub use correlation::{CorrelationId, IdGenerator, SequentialGenerator, UuidV7Generator};
pub use envelope::{EnvelopeError, InboundFrame, OutboundFrame, RequestBody, ResponseKind};
pub use error::{RpcError, RpcResult};
pub use invocation::{Invocation, Reply};
pub use pending::{PendingRegistry, PendingStats};

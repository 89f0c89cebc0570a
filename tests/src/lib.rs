//! # Flow RPC Test Suite
//!
//! Scenario tests driving the clients end to end over the in-memory
//! channel transport.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs        # Client/peer setup and reply recorders
//! └── integration/
//!     ├── scenarios.rs   # Timeout, response, disconnect, publish, request
//!     ├── lifecycle.rs   # Notification ordering, close, connect failures
//!     └── messaging.rs   # Acks, broadcasts, inbound requests
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p flow-tests
//! cargo test -p flow-tests integration::scenarios::
//! ```

#![allow(dead_code)]

pub mod fixtures;

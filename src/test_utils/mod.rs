//! Test helpers shared by unit tests and the integration suite.
//!
//! Compiled for unit tests and behind the `test-util` feature so the
//! `tests/` directory can drive the pipeline without a real network.

mod capturing_console;
mod scripted_transport;

pub use capturing_console::CapturingConsole;
pub use scripted_transport::{ScriptedTransport, TransportScript};

//! Structured logging for orchestrator operations
//!
//! Every public orchestrator operation is bracketed by one `start` event and
//! one `end` or `end_error` event, all carrying the operation's request id.
//! Statement text goes to the `stowage::sql` target at debug level.
//!
//! ```rust
//! use stowage_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};

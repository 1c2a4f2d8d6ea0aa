//! # Error Handling
//!
//! Error taxonomy shared by the snapshot assembler, change classifier,
//! watch loop and write path.
//!
//! | Kind | Where it ends up |
//! |------|------------------|
//! | `Transport`, `Compacted` | terminates a watch, caller re-bootstraps |
//! | `NotFound` | surfaced to the caller of the point read |
//! | `Serialization`, `InvalidFormat` | entity skipped and logged |
//! | `Conflict` | rejected on the write path |
//! | `Config`, `Secret` | fails resolution of a single host |

pub mod types;

pub use types::{Error, Result};

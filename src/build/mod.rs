//! The build pipeline.
//!
//! One resolution request gets one [`BuildSession`] with a fresh
//! [`BuildStack`]. Cycles are structural errors caught from the stack
//! before any constructor runs; runtime failures are wrapped with the
//! stack path exactly once at the layer where they happen.

pub mod errors;
pub mod session;
pub mod stack;

pub use errors::BuildError;
pub use session::{BuildSession, ExplicitArguments};
pub use stack::{BuildFrame, BuildStack};

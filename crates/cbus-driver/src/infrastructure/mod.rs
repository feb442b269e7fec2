//! Infrastructure layer: concrete transport adapters and test doubles.
//!
//! **Dependency rule**: this layer may depend on `application` and `domain`,
//! but MUST NOT be imported by them (tests excepted).

pub mod recording;
pub mod transport;

pub use recording::RecordingDriver;

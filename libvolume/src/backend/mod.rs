//! Volume driver backends shipped with the crate.
//!
//! Each backend module exposes a `NAME` and a pure factory function; the
//! composition root in [`crate::bootstrap`] decides which ones to register.

pub mod mem;

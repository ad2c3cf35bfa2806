//! Foundation utilities shared by every engine subsystem
//!
//! Math types, logging setup, and frame timing. Nothing in here knows about
//! the scene graph; higher layers build on these primitives.

pub mod logging;
pub mod math;
pub mod time;

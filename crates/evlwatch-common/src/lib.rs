//! Common types and traits for evlwatch
//!
//! This crate provides the event data model, the id/tag filter library and
//! the platform boundary traits used by the event log watch engine.

pub mod events;
pub mod filters;
pub mod platform;

pub use events::*;
pub use filters::*;
pub use platform::*;

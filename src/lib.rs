//! Formloop - the loop execution core of a form automation engine
//!
//! Forms execute ordered actions; a loop action repeats a nested action
//! sequence over a list, a numeric range, a boolean condition or a
//! paginated source. This crate owns iteration-sequence generation, the
//! shadowing loop-variable scope, static variable collection and conflict
//! classification, break/continue signaling and per-iteration failure
//! policy. Action dispatch itself is a seam the host implements.

pub mod config;
pub mod error;
pub mod executor;
pub mod form;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod template;

pub use error::{FormloopError, Result};

//! The schema surface consumed during execution.
//!
//! Schema construction and validation live outside this crate; what execution
//! needs is a read-only model: root-type lookup per operation kind, named-type
//! lookup, possible concrete types of an abstract type, the subtype test, and
//! per-object field tables carrying resolver hooks.

pub mod meta;
mod model;

pub use self::model::Schema;

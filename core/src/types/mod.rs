//! Shared value types.

pub mod param;

pub use param::{json_kind_name, ParamKind, ParamValue};

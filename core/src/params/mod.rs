//! Parameter store: block/parameter hierarchy for simulation runs.
//!
//! Sources (JSON or YAML) are parsed and validated into a detached tree and
//! merged into a lock-guarded `ParameterStore`. Output blocks carry a
//! `dt`/`next_time` schedule that can be rewound or advanced after a restart.

pub mod errors;
pub mod schedule;
pub mod source;
pub mod store;

pub use errors::{ScheduleViolation, StoreError, StoreResult};
pub use schedule::{ScheduleMode, ScheduleUpdate, OUTPUT_BLOCK_PREFIX, REWIND_SENTINEL};
pub use source::{parse_source, SourceFormat};
pub use store::{Block, Blocks, ParameterStore};

//! Simparam core: parameter store and output scheduling for simulation runs.

pub mod params;
pub mod startup;
pub mod types;

pub use params::{
    ParameterStore, ScheduleMode, ScheduleUpdate, ScheduleViolation, SourceFormat, StoreError,
    StoreResult,
};
pub use startup::Startup;
pub use types::{ParamKind, ParamValue};

//! Run startup: build the parameter store from a restart file and/or an
//! input file and line up the output schedule with them.
//!
//! Ordering matters. The restart file is loaded first; if an input file
//! follows, every output schedule is rewound by one period while the restart
//! file's `dt` is still in place. The input file then overrides parameters,
//! and a known simulation time moves each `next_time` past it.

use std::path::PathBuf;

use tracing::info;

use crate::params::{ParameterStore, StoreError, StoreResult, REWIND_SENTINEL};


#[derive(Debug, Clone, Default)]
pub struct Startup {
    /// Parameter dump from a previous run.
    pub restart: Option<PathBuf>,
    /// Input file; overrides restart parameters.
    pub input: Option<PathBuf>,
    /// Current simulation time, if known.
    pub time: Option<f64>,
}

impl Startup {
    pub fn run(&self) -> StoreResult<ParameterStore> {
        if self.restart.is_none() && self.input.is_none() {
            return Err(StoreError::NoSource);
        }

        let store = ParameterStore::new();

        if let Some(restart) = &self.restart {
            store.load_file(restart)?;
            info!(path = %restart.display(), blocks = store.len(), "loaded restart parameters");

            // Rewind against the old dt, before the input file can change it.
            if self.input.is_some() {
                let rewound = store.try_advance_output_schedule(REWIND_SENTINEL)?;
                info!(outputs = rewound.len(), "rewound output schedule");
            }
        }

        if let Some(input) = &self.input {
            store.load_file(input)?;
            info!(path = %input.display(), blocks = store.len(), "loaded input parameters");
        }

        if let Some(time) = self.time {
            let moved = store.try_advance_output_schedule(time)?;
            info!(time, outputs = moved.len(), "advanced output schedule");
        }

        Ok(store)
    }
}

//! Output schedule alignment.
//!
//! Every block whose name starts with `output` carries a period `dt` and the
//! next firing time `next_time`. After a restart the schedule is either
//! rewound by one period (so a fresh `dt` from a later input file can be
//! re-applied) or advanced past the current simulation time, keeping the
//! original phase of the schedule.

use super::errors::ScheduleViolation;
use super::store::{Block, Blocks};
use crate::types::ParamValue;

/// Block-name prefix that marks an output block.
pub const OUTPUT_BLOCK_PREFIX: &str = "output";

/// Reference time that selects rewind mode.
pub const REWIND_SENTINEL: f64 = -1.0;

pub const DT_KEY: &str = "dt";
pub const NEXT_TIME_KEY: &str = "next_time";


#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleMode {
    /// Step `next_time` back by one `dt`.
    Rewind,
    /// Move `next_time` past the given simulation time.
    Forward(f64),
}

impl ScheduleMode {
    /// Map a raw reference time onto a mode; `-1` means rewind.
    pub fn from_reference_time(reference_time: f64) -> ScheduleMode {
        if reference_time == REWIND_SENTINEL {
            ScheduleMode::Rewind
        } else {
            ScheduleMode::Forward(reference_time)
        }
    }
}


/// One mutated `next_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleUpdate {
    pub block: String,
    /// `None` when `next_time` was initialized rather than moved.
    pub previous: Option<f64>,
    pub next_time: f64,
}


pub fn is_output_block(name: &str) -> bool {
    name.starts_with(OUTPUT_BLOCK_PREFIX)
}


/// Compute the updates for every output block, in block-name order, without
/// touching the blocks. Fails on the first block that breaks the contract.
pub fn plan(
    blocks: &Blocks,
    mode: ScheduleMode,
) -> Result<Vec<ScheduleUpdate>, ScheduleViolation> {
    let mut updates = Vec::new();

    for (name, block) in blocks.iter().filter(|(name, _)| is_output_block(name)) {
        let dt = number(name, block, DT_KEY)?.ok_or_else(|| ScheduleViolation::MissingKey {
            block: name.clone(),
            key: DT_KEY,
        })?;
        let current = number(name, block, NEXT_TIME_KEY)?;

        let next_time = match (mode, current) {
            (ScheduleMode::Rewind, None) => {
                return Err(ScheduleViolation::MissingKey {
                    block: name.clone(),
                    key: NEXT_TIME_KEY,
                })
            }
            (ScheduleMode::Rewind, Some(t)) => Some(t - dt),
            // Fresh schedule: last multiple of dt not after the current time,
            // so the first output fires immediately.
            (ScheduleMode::Forward(now), None) => Some((now / dt).floor() * dt),
            (ScheduleMode::Forward(now), Some(t)) => {
                let increment = dt * (((now - t) / dt).floor() + 1.0);
                if increment > 0.0 {
                    Some(t + increment)
                } else {
                    None
                }
            }
        };

        if let Some(next_time) = next_time {
            updates.push(ScheduleUpdate {
                block: name.clone(),
                previous: current,
                next_time,
            });
        }
    }

    Ok(updates)
}


/// Write planned updates back into the blocks.
pub fn apply(blocks: &mut Blocks, updates: &[ScheduleUpdate]) {
    for update in updates {
        if let Some(block) = blocks.get_mut(&update.block) {
            block.insert(NEXT_TIME_KEY.to_string(), ParamValue::Number(update.next_time));
        }
    }
}


fn number(
    block_name: &str,
    block: &Block,
    key: &'static str,
) -> Result<Option<f64>, ScheduleViolation> {
    match block.get(key) {
        None => Ok(None),
        Some(ParamValue::Number(n)) => Ok(Some(*n)),
        Some(other) => Err(ScheduleViolation::NotANumber {
            block: block_name.to_string(),
            key,
            found: other.kind(),
        }),
    }
}

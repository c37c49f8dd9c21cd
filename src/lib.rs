// Allow uppercase acronyms for industry-standard terms like SSD, SAS, SATA, RAID
#![allow(clippy::upper_case_acronyms)]

pub mod attributes;
pub mod backends;
pub mod config;
pub mod device;
pub mod evaluation;
pub mod inventory;
pub mod profiles;
pub mod station;
pub mod wipe_orchestrator;

// Re-export the main entry points for convenience
pub use config::StationConfig;
pub use device::{Device, HealthData, Location, Profile, TestResult};
pub use evaluation::Evaluator;
pub use inventory::{Reconciler, ScanOptions};
pub use profiles::PolicySet;
pub use station::Station;
pub use wipe_orchestrator::{ConfirmationMode, WipeError, WipeOrchestrator};

use thiserror::Error;

/// Errors raised while talking to the station's external tools.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {code:?}: {detail}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        detail: String,
    },

    #[error("unexpected output from {program}: {detail}")]
    UnexpectedOutput { program: String, detail: String },

    #[error("SMART read failed: {0}")]
    SMARTReadFailed(String),

    #[error("invalid byte count {0}: must not be negative")]
    InvalidByteCount(i64),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type DriveResult<T> = Result<T, DriveError>;

const UNIT_STEP: f64 = 1024.0;
const UNITS: [&str; 5] = ["bytes", "KB", "MB", "GB", "TB"];

/// Render a byte count with binary units and one decimal place
/// (`1536` becomes `"1.5 KB"`). Picks the largest unit whose scaled value is
/// at least one, stopping at TB.
pub fn bytes_to_human(number_of_bytes: i64) -> DriveResult<String> {
    if number_of_bytes < 0 {
        return Err(DriveError::InvalidByteCount(number_of_bytes));
    }

    let mut value = number_of_bytes as f64;
    let mut unit = 0;
    while unit + 1 < UNITS.len() && value / UNIT_STEP >= 1.0 {
        value /= UNIT_STEP;
        unit += 1;
    }

    Ok(format!("{:.1} {}", value, UNITS[unit]))
}

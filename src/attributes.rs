// Health attribute adapter
//
// Turns backend output into the `HealthData` a device carries. Reads here
// never fail: a missing or malformed source degrades to a sentinel value and
// sets the device's warning flag.

use crate::backends::{PhysicalDrive, ScanEntry, SmartBackend, SmartRecord};
use crate::device::{ControllerMetric, ControllerMetrics, MetricValue};

/// Stored in place of an error-log counter that could not be read.
pub const ERROR_LOG_SENTINEL: i64 = -1;

/// The error counter log must have at least this many lines before the
/// read, write and verify rows (lines 8, 9 and 10) are trusted.
const MIN_ERROR_LOG_LINES: usize = 11;
const READ_ROW: (usize, &str) = (8, "read:");
const WRITE_ROW: (usize, &str) = (9, "write:");
const VERIFY_ROW: (usize, &str) = (10, "verify:");
/// Whitespace-separated column holding "Total uncorrected errors"
const UNCORRECTED_COLUMN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorLogSummary {
    pub read: i64,
    pub write: i64,
    pub verify: i64,
    pub warning: bool,
}

impl ErrorLogSummary {
    pub fn unreadable() -> Self {
        Self {
            read: ERROR_LOG_SENTINEL,
            write: ERROR_LOG_SENTINEL,
            verify: ERROR_LOG_SENTINEL,
            warning: true,
        }
    }
}

/// Extract the uncorrected-error totals from `smartctl -l error` output.
/// Each row is parsed independently; a row that is missing its marker or a
/// numeric column gets the sentinel and raises the warning.
pub fn parse_error_log(output: &str) -> ErrorLogSummary {
    let lines: Vec<&str> = output.split('\n').collect();
    if lines.len() < MIN_ERROR_LOG_LINES {
        return ErrorLogSummary::unreadable();
    }

    let mut warning = false;
    let mut field = |(index, marker): (usize, &str)| {
        parse_row(lines[index], marker).unwrap_or_else(|| {
            warning = true;
            ERROR_LOG_SENTINEL
        })
    };

    let read = field(READ_ROW);
    let write = field(WRITE_ROW);
    let verify = field(VERIFY_ROW);

    ErrorLogSummary {
        read,
        write,
        verify,
        warning,
    }
}

fn parse_row(line: &str, marker: &str) -> Option<i64> {
    if !line.contains(marker) {
        return None;
    }
    line.split_whitespace()
        .nth(UNCORRECTED_COLUMN)
        .and_then(|column| column.parse().ok())
}

/// Controller-reported health plus the error-log totals.
pub fn controller_metrics(drive: &PhysicalDrive, log: &ErrorLogSummary) -> ControllerMetrics {
    ControllerMetrics::from([
        (
            ControllerMetric::MediaErrorCount,
            MetricValue::Count(drive.media_error_count),
        ),
        (
            ControllerMetric::PredictiveFailureCount,
            MetricValue::Count(drive.predictive_failure_count),
        ),
        (
            ControllerMetric::SmartAlertFlagged,
            MetricValue::Flag(drive.smart_alert),
        ),
        (
            ControllerMetric::UncorrectableReadErrors,
            MetricValue::Count(log.read),
        ),
        (
            ControllerMetric::UncorrectableWriteErrors,
            MetricValue::Count(log.write),
        ),
        (
            ControllerMetric::UncorrectableVerifyErrors,
            MetricValue::Count(log.verify),
        ),
    ])
}

pub struct AttributeSource<'a> {
    smart: &'a dyn SmartBackend,
}

impl<'a> AttributeSource<'a> {
    pub fn new(smart: &'a dyn SmartBackend) -> Self {
        Self { smart }
    }

    /// `None` when the SMART backend could not describe the device.
    pub fn smart_record(&self, entry: &ScanEntry) -> Option<SmartRecord> {
        match self.smart.inspect(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(device = %entry.name, error = %e, "SMART inspection failed");
                None
            }
        }
    }

    /// Metrics for a controller drive and whether any of them are degraded.
    pub fn controller_health(&self, drive: &PhysicalDrive) -> (ControllerMetrics, bool) {
        let log = match self.smart.error_log(drive.device_id) {
            Ok(output) => parse_error_log(&output),
            Err(e) => {
                tracing::warn!(
                    device_id = drive.device_id,
                    slot = drive.slot_number,
                    error = %e,
                    "Could not read SCSI error log"
                );
                ErrorLogSummary::unreadable()
            }
        };

        if log.warning {
            tracing::warn!(
                device_id = drive.device_id,
                slot = drive.slot_number,
                "SCSI error log incomplete; uncorrected error counts unknown"
            );
        }

        (controller_metrics(drive, &log), log.warning)
    }
}

// Unified device model
//
// One `Device` per physical drive or RAID virtual drive, rebuilt from scratch
// on every scan. Nothing here talks to hardware.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Serial reported when neither backend could supply one.
pub const UNKNOWN_SERIAL: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Profile {
    SSD,
    SATA,
    SATAEnterprise,
    SAS,
    RAID,
    Unclassified,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::SSD => "SSD",
            Profile::SATA => "SATA",
            Profile::SATAEnterprise => "SATAEnterprise",
            Profile::SAS => "SAS",
            Profile::RAID => "RAID",
            Profile::Unclassified => "",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an operator finds the drive in the enclosure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Location {
    /// Controller slot number on the frontplane
    Frontplane(u32),
    /// Direct-attach bay number (1-based)
    Toaster(u32),
    /// Raw block device path, used for RAID volumes and unknown bays
    DevicePath(String),
    /// Controller-attached drive the controller could not account for
    NeedsManualTesting,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Frontplane(slot) => write!(f, "Frontplane Slot {}", slot),
            Location::Toaster(bay) => write!(f, "Toaster Slot {}", bay),
            Location::DevicePath(path) => f.write_str(path),
            Location::NeedsManualTesting => f.write_str("Needs manual testing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestResult {
    Pass,
    Warn,
    Fail,
    NotApplicable,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TestResult::Pass => "PASS",
            TestResult::Warn => "WARN",
            TestResult::Fail => "FAIL",
            TestResult::NotApplicable => "N/A",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmartAttribute {
    pub id: u8,
    pub name: String,
    /// Normalized value (usually 1..=253, higher is healthier)
    pub value: i64,
    pub raw: i64,
    pub raw_string: String,
}

pub type SmartTable = BTreeMap<u8, SmartAttribute>;

/// Health counters read from the RAID controller and the SCSI error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ControllerMetric {
    MediaErrorCount,
    PredictiveFailureCount,
    SmartAlertFlagged,
    UncorrectableReadErrors,
    UncorrectableWriteErrors,
    UncorrectableVerifyErrors,
}

impl ControllerMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerMetric::MediaErrorCount => "media_error_count",
            ControllerMetric::PredictiveFailureCount => "predictive_failure_count",
            ControllerMetric::SmartAlertFlagged => "drive_has_flagged_a_smart_alert",
            ControllerMetric::UncorrectableReadErrors => "uncorrectable_read_errors",
            ControllerMetric::UncorrectableWriteErrors => "uncorrectable_write_errors",
            ControllerMetric::UncorrectableVerifyErrors => "uncorrectable_verify_errors",
        }
    }
}

impl fmt::Display for ControllerMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricValue {
    Count(i64),
    Flag(bool),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Count(n) => write!(f, "{}", n),
            MetricValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

pub type ControllerMetrics = BTreeMap<ControllerMetric, MetricValue>;

/// Exactly one health source per device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum HealthData {
    Smart(SmartTable),
    Controller(ControllerMetrics),
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub serial: String,
    /// Raw identifier from whichever backend produced the record
    /// (`/dev/sdb`, `/dev/bus/0`, ...)
    pub backend_name: String,
    pub controller_device_id: Option<u32>,
    pub location: Location,
    pub profile: Profile,
    pub capacity: String,
    pub health: HealthData,
    /// Health data was only partially retrieved
    pub warning: bool,
    pub result: Option<TestResult>,
}

impl Device {
    pub fn is_controller_attached(&self) -> bool {
        is_bus_path(&self.backend_name)
    }

    pub fn location_label(&self) -> String {
        self.location.to_string()
    }

    pub fn smart_table(&self) -> Option<&SmartTable> {
        match &self.health {
            HealthData::Smart(table) => Some(table),
            _ => None,
        }
    }

    pub fn controller_metrics(&self) -> Option<&ControllerMetrics> {
        match &self.health {
            HealthData::Controller(metrics) => Some(metrics),
            _ => None,
        }
    }
}

/// Backend identifiers of controller-addressed drives contain a bus path.
pub fn is_bus_path(backend_name: &str) -> bool {
    backend_name.to_lowercase().contains("bus")
}

/// Identity predicate shared by every join between the two inventories:
/// case-insensitive containment of `serial` in `haystack`.
///
/// The backends disagree on formatting (vendor prefixes, padding, case), so
/// exact equality would split one drive into two records. An empty serial or
/// the unknown sentinel never matches anything.
pub fn serial_matches(serial: &str, haystack: &str) -> bool {
    let needle = serial.trim();
    if needle.is_empty() || needle.eq_ignore_ascii_case(UNKNOWN_SERIAL) {
        return false;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

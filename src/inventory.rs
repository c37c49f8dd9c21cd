// Device inventory reconciler
//
// Joins the SMART enumeration and the controller's physical drive list into
// one device list. SAS drives are rebuilt from the controller side only; the
// SMART backend's view of them is dropped. Nothing in a scan is fatal: a
// backend or per-device failure degrades the affected fields and the scan
// carries on.

use crate::attributes::AttributeSource;
use crate::backends::{BlockDevices, PhysicalDrive, RaidController, ScanEntry, SmartBackend};
use crate::config::StationConfig;
use crate::device::{
    is_bus_path, serial_matches, Device, HealthData, Location, Profile, UNKNOWN_SERIAL,
};
use crate::bytes_to_human;
use std::path::Path;

const UNKNOWN_CAPACITY: &str = "N/A";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// List devices from the protected allowlist as well
    pub include_protected: bool,
}

/// Outcome of interface classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Profile(Profile),
    /// Controller-attached SAS drive; rebuilt from the controller inventory
    ControllerManaged,
}

/// Classify a SMART-enumerated device. Order matters: solid-state media wins
/// over any interface, and "scsi" is tested before "sat".
pub fn classify(is_ssd: bool, interface: &str) -> Classification {
    let interface = interface.to_lowercase();

    if is_ssd {
        Classification::Profile(Profile::SSD)
    } else if interface.contains("scsi") {
        Classification::Profile(Profile::RAID)
    } else if interface.contains("sat") {
        Classification::Profile(Profile::SATA)
    } else if interface.contains("megaraid") {
        Classification::ControllerManaged
    } else {
        Classification::Profile(Profile::Unclassified)
    }
}

/// Remove the first matching vendor prefix, case-insensitively.
pub fn strip_vendor_prefix(inquiry: &str, prefixes: &[String]) -> String {
    let inquiry = inquiry.trim();

    for prefix in prefixes {
        let prefix_len = prefix.len();
        if inquiry.len() >= prefix_len
            && inquiry.is_char_boundary(prefix_len)
            && inquiry[..prefix_len].eq_ignore_ascii_case(prefix)
        {
            return inquiry[prefix_len..].trim().to_string();
        }
    }

    inquiry.to_string()
}

pub struct Reconciler<'a> {
    config: &'a StationConfig,
    smart: &'a dyn SmartBackend,
    controller: &'a dyn RaidController,
    block: &'a dyn BlockDevices,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        config: &'a StationConfig,
        smart: &'a dyn SmartBackend,
        controller: &'a dyn RaidController,
        block: &'a dyn BlockDevices,
    ) -> Self {
        Self {
            config,
            smart,
            controller,
            block,
        }
    }

    /// Build the unified device list, sorted lexically by location label.
    pub fn reconcile(&self, options: ScanOptions) -> Vec<Device> {
        let physical_drives = match self.controller.physical_drives() {
            Ok(drives) => drives,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list controller physical drives");
                Vec::new()
            }
        };

        let mut devices = self.smart_devices(&physical_drives, options);
        devices.extend(self.controller_devices(&physical_drives, options));
        devices.sort_by_key(|device| device.location_label());

        tracing::info!(devices = devices.len(), "Inventory reconciled");
        devices
    }

    fn is_protected(&self, identity: &str) -> bool {
        self.config
            .protected_serials
            .iter()
            .any(|protected| serial_matches(protected, identity))
    }

    fn smart_devices(&self, physical_drives: &[PhysicalDrive], options: ScanOptions) -> Vec<Device> {
        let entries = match self.smart.enumerate() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "SMART enumeration failed");
                return Vec::new();
            }
        };

        let source = AttributeSource::new(self.smart);
        let mut devices = Vec::new();

        for entry in entries {
            let record = source.smart_record(&entry);
            let serial = record
                .as_ref()
                .and_then(|r| r.serial.clone())
                .unwrap_or_else(|| UNKNOWN_SERIAL.to_string());

            if !options.include_protected && self.is_protected(&serial) {
                tracing::debug!(device = %entry.name, "Skipping protected device");
                continue;
            }

            let is_ssd = record.as_ref().map(|r| r.is_ssd).unwrap_or(false);
            let profile = match classify(is_ssd, &entry.interface) {
                Classification::Profile(profile) => profile,
                Classification::ControllerManaged => {
                    tracing::debug!(
                        device = %entry.name,
                        interface = %entry.interface,
                        "Leaving controller drive to the controller inventory"
                    );
                    continue;
                }
            };

            let (location, controller_device_id) =
                self.resolve_location(&entry, &serial, physical_drives);

            let capacity = record
                .as_ref()
                .and_then(|r| r.capacity_bytes)
                .map(human_capacity)
                .unwrap_or_else(|| UNKNOWN_CAPACITY.to_string());

            let warning = record.is_none() && profile != Profile::RAID;
            let health = match (profile, record) {
                (Profile::RAID, _) | (_, None) => HealthData::Unavailable,
                (_, Some(record)) => HealthData::Smart(record.attributes),
            };

            devices.push(Device {
                serial,
                backend_name: entry.name,
                controller_device_id,
                location,
                profile,
                capacity,
                health,
                warning,
                result: None,
            });
        }

        devices
    }

    fn resolve_location(
        &self,
        entry: &ScanEntry,
        serial: &str,
        physical_drives: &[PhysicalDrive],
    ) -> (Location, Option<u32>) {
        if is_bus_path(&entry.name) {
            return match physical_drives
                .iter()
                .find(|drive| serial_matches(serial, &drive.inquiry_data))
            {
                Some(drive) => (Location::Frontplane(drive.slot_number), Some(drive.device_id)),
                None => {
                    tracing::warn!(
                        device = %entry.name,
                        serial,
                        "Controller drive not found in physical drive list"
                    );
                    (Location::NeedsManualTesting, None)
                }
            };
        }

        (self.toaster_bay(&entry.name), None)
    }

    fn toaster_bay(&self, name: &str) -> Location {
        let fallback = Location::DevicePath(name.to_string());

        let Ok(device) = self.block.canonicalize(Path::new(name)) else {
            return fallback;
        };

        self.config
            .toaster_bays
            .iter()
            .position(|bay| {
                self.block
                    .canonicalize(bay)
                    .map(|target| target == device)
                    .unwrap_or(false)
            })
            .map(|index| Location::Toaster(index as u32 + 1))
            .unwrap_or(fallback)
    }

    fn controller_devices(&self, physical_drives: &[PhysicalDrive], options: ScanOptions) -> Vec<Device> {
        let source = AttributeSource::new(self.smart);

        physical_drives
            .iter()
            .filter(|drive| {
                if !options.include_protected && self.is_protected(&drive.inquiry_data) {
                    tracing::debug!(slot = drive.slot_number, "Skipping protected controller drive");
                    return false;
                }
                drive.is_sas()
            })
            .map(|drive| {
                let (metrics, warning) = source.controller_health(drive);
                let serial = strip_vendor_prefix(&drive.inquiry_data, &self.config.vendor_prefixes);

                Device {
                    serial: if serial.is_empty() {
                        UNKNOWN_SERIAL.to_string()
                    } else {
                        serial
                    },
                    backend_name: format!("/dev/bus/{}", drive.adapter_id),
                    controller_device_id: Some(drive.device_id),
                    location: Location::Frontplane(drive.slot_number),
                    profile: Profile::SAS,
                    capacity: human_capacity(drive.raw_size_bytes),
                    health: HealthData::Controller(metrics),
                    warning,
                    result: None,
                }
            })
            .collect()
    }
}

fn human_capacity(bytes: i64) -> String {
    bytes_to_human(bytes).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Unusable capacity reported");
        UNKNOWN_CAPACITY.to_string()
    })
}

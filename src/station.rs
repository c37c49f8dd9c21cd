// Station facade
//
// Owns the configuration, the backends and the latest scan snapshot. The
// presentation layer reads snapshots and calls the entry points here; it
// never mutates devices directly.

use crate::backends::{
    BlockDevices, BlockTools, MegaCli, RaidController, SmartBackend, Smartctl,
};
use crate::config::StationConfig;
use crate::device::{serial_matches, Device, HealthData, Profile};
use crate::evaluation::Evaluator;
use crate::inventory::{Reconciler, ScanOptions};
use crate::profiles::{AttributeKey, PolicySet, Source};
use crate::wipe_orchestrator::{
    BatchReport, Clock, ConfirmationMode, RaidDestroyReport, SystemClock, WipeError,
    WipeOrchestrator, WipeReport,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const OVERVIEW_HEADER: [&str; 5] = ["Drive", "Profile", "Serial", "Size", "Pass?"];
pub const DETAIL_HEADER: [&str; 3] = ["Attribute ID", "Attribute Name", "Tested Value"];

pub const RAID_DETAIL_NOTE: &str = "RAID drive - no SMART info";
pub const UNCLASSIFIED_DETAIL_NOTE: &str = "No profile selected - uncertain of test parameters";
pub const UNAVAILABLE_DETAIL_NOTE: &str = "Health data could not be read";

pub struct Backends {
    pub smart: Box<dyn SmartBackend>,
    pub controller: Box<dyn RaidController>,
    pub block: Box<dyn BlockDevices>,
    pub clock: Box<dyn Clock>,
}

impl Backends {
    /// Real tools at the configured paths.
    pub fn system(config: &StationConfig) -> Self {
        Self {
            smart: Box::new(Smartctl::system(
                &config.smartctl_path,
                &config.controller_block_device,
            )),
            controller: Box::new(MegaCli::system(&config.megacli_path)),
            block: Box::new(BlockTools::system(&config.wipefs_path)),
            clock: Box::new(SystemClock),
        }
    }
}

/// Devices from one scan, evaluated and sorted. Never edited after creation.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    devices: Vec<Device>,
    scanned_at: DateTime<Utc>,
    include_protected: bool,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            devices: Vec::new(),
            scanned_at: Utc::now(),
            include_protected: false,
        }
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn scanned_at(&self) -> DateTime<Utc> {
        self.scanned_at
    }

    pub fn includes_protected(&self) -> bool {
        self.include_protected
    }

    /// Look a device up by location label or serial, case-insensitively.
    pub fn find(&self, target: &str) -> Option<&Device> {
        let target = target.trim();
        self.devices
            .iter()
            .find(|d| d.location_label().eq_ignore_ascii_case(target))
            .or_else(|| {
                self.devices
                    .iter()
                    .find(|d| d.serial.eq_ignore_ascii_case(target))
            })
    }
}

/// One overview row: location, profile, serial, capacity, result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverviewRow {
    pub drive: String,
    pub profile: String,
    pub serial: String,
    pub size: String,
    pub result: String,
}

impl OverviewRow {
    pub fn cells(&self) -> [&str; 5] {
        [
            self.drive.as_str(),
            self.profile.as_str(),
            self.serial.as_str(),
            self.size.as_str(),
            self.result.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailRow {
    /// Blank for controller metrics and notes
    pub attribute_id: String,
    pub name: String,
    pub observed: String,
}

impl DetailRow {
    fn note(message: &str) -> Self {
        Self {
            attribute_id: String::new(),
            name: message.to_string(),
            observed: String::new(),
        }
    }
}

pub struct Station {
    config: StationConfig,
    evaluator: Evaluator,
    backends: Backends,
    snapshot: Snapshot,
}

impl Station {
    pub fn new(config: StationConfig, backends: Backends) -> Self {
        Self {
            config,
            evaluator: Evaluator::new(PolicySet::default()),
            backends,
            snapshot: Snapshot::empty(),
        }
    }

    /// Build a station and run the first scan.
    pub fn open(config: StationConfig, backends: Backends, options: ScanOptions) -> Self {
        let mut station = Self::new(config, backends);
        station.rescan(options);
        station
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Rediscover every device from the hardware and evaluate it.
    pub fn rescan(&mut self, options: ScanOptions) -> &Snapshot {
        let reconciler = Reconciler::new(
            &self.config,
            self.backends.smart.as_ref(),
            self.backends.controller.as_ref(),
            self.backends.block.as_ref(),
        );

        let mut devices = reconciler.reconcile(options);
        for device in &mut devices {
            self.evaluator.annotate(device);
        }

        self.snapshot = Snapshot {
            devices,
            scanned_at: Utc::now(),
            include_protected: options.include_protected,
        };
        &self.snapshot
    }

    pub fn overview(&self) -> Vec<OverviewRow> {
        self.snapshot
            .devices
            .iter()
            .map(|device| OverviewRow {
                drive: device.location_label(),
                profile: device.profile.to_string(),
                serial: device.serial.clone(),
                size: device.capacity.clone(),
                result: device
                    .result
                    .map(|r| r.to_string())
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Attribute rows for one device, limited to what its profile tests.
    pub fn detail(&self, device: &Device) -> Vec<DetailRow> {
        match device.profile {
            Profile::RAID => return vec![DetailRow::note(RAID_DETAIL_NOTE)],
            Profile::Unclassified => return vec![DetailRow::note(UNCLASSIFIED_DETAIL_NOTE)],
            _ => {}
        }

        let Some(table) = self.evaluator.table_for(device) else {
            return vec![DetailRow::note(UNCLASSIFIED_DETAIL_NOTE)];
        };

        match &device.health {
            HealthData::Smart(smart) => table
                .rules
                .iter()
                .filter_map(|rule| match rule.key {
                    AttributeKey::Smart(id) => smart.get(&id).map(|attr| DetailRow {
                        attribute_id: id.to_string(),
                        name: attr.name.clone(),
                        observed: match rule.source {
                            Source::Value => attr.value.to_string(),
                            _ => attr.raw.to_string(),
                        },
                    }),
                    AttributeKey::Metric(_) => None,
                })
                .collect(),
            HealthData::Controller(metrics) => table
                .rules
                .iter()
                .filter_map(|rule| match rule.key {
                    AttributeKey::Metric(metric) => Some(DetailRow {
                        attribute_id: String::new(),
                        name: metric.to_string(),
                        observed: metrics
                            .get(&metric)
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "missing".to_string()),
                    }),
                    AttributeKey::Smart(_) => None,
                })
                .collect(),
            HealthData::Unavailable => vec![DetailRow::note(UNAVAILABLE_DETAIL_NOTE)],
        }
    }

    fn is_protected(&self, device: &Device) -> bool {
        self.config
            .protected_serials
            .iter()
            .any(|protected| serial_matches(protected, &device.serial))
    }

    fn ensure_wipeable(&self, device: &Device) -> Result<(), WipeError> {
        if self.is_protected(device) {
            return Err(WipeError::ProtectedDevice {
                serial: device.serial.clone(),
            });
        }
        Ok(())
    }

    fn orchestrator(&self) -> WipeOrchestrator<'_> {
        WipeOrchestrator::new(
            self.backends.controller.as_ref(),
            self.backends.block.as_ref(),
            self.backends.clock.as_ref(),
            &self.config,
        )
    }

    pub fn quick_wipe(
        &mut self,
        device: &Device,
        mode: &ConfirmationMode<'_>,
    ) -> Result<WipeReport, WipeError> {
        self.ensure_wipeable(device)?;
        self.orchestrator().quick_wipe(device, mode)
    }

    pub fn full_zero(
        &mut self,
        device: &Device,
        mode: &ConfirmationMode<'_>,
    ) -> Result<WipeReport, WipeError> {
        self.ensure_wipeable(device)?;
        self.orchestrator().full_zero(device, mode)
    }

    /// Quick-wipe every device in the current snapshot. Protected devices
    /// are left out even when the snapshot lists them.
    pub fn quick_wipe_all(&mut self) -> BatchReport {
        let devices: Vec<Device> = self
            .snapshot
            .devices
            .iter()
            .filter(|device| !self.is_protected(device))
            .cloned()
            .collect();
        self.orchestrator().quick_wipe_all(&devices)
    }

    pub fn destroy_raids(&mut self, operator_verified: bool) -> Result<RaidDestroyReport, WipeError> {
        self.orchestrator().destroy_raids(operator_verified)
    }
}

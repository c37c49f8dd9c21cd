// Wipe Orchestrator - Routes each wipe to the controller or direct-attach path
//
// Controller-attached drives are wiped with the transient volume technique:
// build a single-drive RAID-0 volume, let the controller initialize it, then
// delete the volume again. Direct-attach drives get a signature erase and a
// zero fill. Every step that can fail reports which step it was.

use crate::backends::{
    BlockDevices, DriveAddress, InitMode, LogicalDrive, PhysicalDrive, RaidController, ZeroExtent,
};
use crate::config::StationConfig;
use crate::device::{serial_matches, Device, Profile};
use crate::DriveError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const FOREIGN_CONFIG_PROMPT: &str = "This drive carries a foreign configuration. \
MegaCli cannot clear a single foreign configuration, only every foreign configuration \
on the adapter. Clear all of them?";

/// Blocking wait between initialization progress checks.
pub trait Clock {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Interactive yes/no question, answered by whoever drives the orchestrator.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

pub enum ConfirmationMode<'a> {
    Interactive(&'a dyn Confirm),
    /// Batch mode: every question is answered yes
    Suppressed,
}

impl ConfirmationMode<'_> {
    fn confirm(&self, prompt: &str) -> bool {
        match self {
            ConfirmationMode::Interactive(confirm) => confirm.confirm(prompt),
            ConfirmationMode::Suppressed => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WipeKind {
    /// Fast re-init on the controller, first 50 sectors on direct-attach
    Quick,
    /// Full initialization on the controller, whole device on direct-attach
    Full,
}

impl WipeKind {
    fn init_mode(self) -> InitMode {
        match self {
            WipeKind::Quick => InitMode::Fast,
            WipeKind::Full => InitMode::Full,
        }
    }

    fn zero_extent(self) -> ZeroExtent {
        match self {
            WipeKind::Quick => ZeroExtent::quick(),
            WipeKind::Full => ZeroExtent::WholeDevice,
        }
    }
}

/// Outcome of a best-effort remediation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepOutcome {
    NotNeeded,
    Succeeded,
    /// The step failed and the wipe went ahead anyway
    FailedNonFatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CleanupOutcome {
    NotRequired,
    Removed,
    /// The wipe finished but the transient volume is still on the controller
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WipeMethod {
    TransientVolume {
        adapter: u32,
        drive: DriveAddress,
        volume: u32,
        polls: u32,
    },
    DirectOverwrite {
        path: String,
        bytes_zeroed: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct WipeReport {
    pub location: String,
    pub serial: String,
    pub kind: WipeKind,
    pub method: WipeMethod,
    pub make_good: StepOutcome,
    pub clear_foreign: StepOutcome,
    pub cleanup: CleanupOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WipeReport {
    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn elapsed_display(&self) -> String {
        humantime::format_duration(Duration::from_secs(self.elapsed().as_secs())).to_string()
    }

    /// Soft problems the operator should know about even though the wipe ran.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let StepOutcome::FailedNonFatal(reason) = &self.make_good {
            warnings.push(format!("could not set drive to good: {}", reason));
        }
        if let StepOutcome::FailedNonFatal(reason) = &self.clear_foreign {
            warnings.push(format!("could not clear foreign configuration: {}", reason));
        }
        if let CleanupOutcome::Failed(reason) = &self.cleanup {
            warnings.push(format!(
                "transient volume was not deleted, remove it manually: {}",
                reason
            ));
        }
        warnings
    }
}

#[derive(Error, Debug)]
pub enum WipeError {
    #[error("{location} is a RAID volume; use the RAID destroy operation instead")]
    RaidVolumeTarget { location: String },

    #[error("could not find serial {serial} among the controller's physical drives; rescan and retry")]
    NotInController { serial: String },

    #[error("drive in slot {slot} is still a member of a RAID volume ({position}); destroy that volume first")]
    AlreadyRaidMember { slot: u32, position: String },

    #[error("could not create a transient volume over {drive} on adapter {adapter}: {source}")]
    CreateVolume {
        adapter: u32,
        drive: DriveAddress,
        #[source]
        source: DriveError,
    },

    #[error("initialization of transient volume {volume} on adapter {adapter} failed during {step}: {source}; the volume was left in place for manual cleanup")]
    Initialization {
        adapter: u32,
        volume: u32,
        step: &'static str,
        #[source]
        source: DriveError,
    },

    #[error("{step} on {path} failed: {source}")]
    BlockDevice {
        path: String,
        step: &'static str,
        #[source]
        source: DriveError,
    },

    #[error("serial {serial} is on the protected list and is never wiped")]
    ProtectedDevice { serial: String },

    #[error("operation cancelled by operator")]
    Cancelled,

    #[error("logical drive {index} has not been confirmed as the OS volume; refusing to destroy RAID volumes")]
    UnverifiedProtectedVolume { index: u32 },

    #[error("controller query failed: {0}")]
    Controller(#[source] DriveError),
}

/// Per-device outcome of a batch wipe.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<WipeReport>,
    /// Location labels of devices the batch does not touch
    pub skipped: Vec<String>,
    pub failed: Vec<(String, WipeError)>,
}

impl BatchReport {
    /// Location labels to re-run.
    pub fn failed_locations(&self) -> Vec<&str> {
        self.failed.iter().map(|(label, _)| label.as_str()).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// One-line tally for the operator, naming skipped RAID volumes.
    pub fn summary(&self) -> String {
        let mut summary = format!("{} drive(s) wiped", self.completed.len());
        if !self.skipped.is_empty() {
            summary.push_str(&format!(
                ", {} RAID volume(s) skipped ({})",
                self.skipped.len(),
                self.skipped.join(", ")
            ));
        }
        if !self.failed.is_empty() {
            summary.push_str(&format!(", {} failed", self.failed.len()));
        }
        summary
    }
}

#[derive(Debug, Default)]
pub struct RaidDestroyReport {
    pub removed: Vec<LogicalDrive>,
    pub preserved: Vec<LogicalDrive>,
    pub failed: Vec<(LogicalDrive, DriveError)>,
}

/// Runs wipe state machines one at a time against the shared controller.
/// Every operation takes `&mut self`, so a single orchestrator can never
/// have two wipes in flight.
pub struct WipeOrchestrator<'a> {
    controller: &'a dyn RaidController,
    block: &'a dyn BlockDevices,
    clock: &'a dyn Clock,
    poll_interval: Duration,
    protected_logical_drive: u32,
}

impl<'a> WipeOrchestrator<'a> {
    pub fn new(
        controller: &'a dyn RaidController,
        block: &'a dyn BlockDevices,
        clock: &'a dyn Clock,
        config: &StationConfig,
    ) -> Self {
        Self {
            controller,
            block,
            clock,
            poll_interval: config.poll_interval(),
            protected_logical_drive: config.protected_logical_drive,
        }
    }

    pub fn quick_wipe(
        &mut self,
        device: &Device,
        mode: &ConfirmationMode<'_>,
    ) -> Result<WipeReport, WipeError> {
        self.wipe(device, WipeKind::Quick, mode)
    }

    /// Same state machine as `quick_wipe` with a full initialization. Blocks
    /// until the controller reports completion, with no way to abort.
    pub fn full_zero(
        &mut self,
        device: &Device,
        mode: &ConfirmationMode<'_>,
    ) -> Result<WipeReport, WipeError> {
        self.wipe(device, WipeKind::Full, mode)
    }

    /// Quick-wipe every device in order, without prompting. RAID volumes are
    /// skipped rather than failed.
    pub fn quick_wipe_all(&mut self, devices: &[Device]) -> BatchReport {
        let mut report = BatchReport::default();

        for device in devices {
            let label = device.location_label();

            if device.profile == Profile::RAID {
                tracing::info!(device = %label, "Skipping RAID volume in batch wipe");
                report.skipped.push(label);
                continue;
            }

            match self.quick_wipe(device, &ConfirmationMode::Suppressed) {
                Ok(wipe) => report.completed.push(wipe),
                Err(e) => {
                    tracing::error!(device = %label, error = %e, "Batch wipe failed for device");
                    report.failed.push((label, e));
                }
            }
        }

        tracing::info!(
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Batch quick wipe finished"
        );
        report
    }

    /// Delete every logical drive except the configured protected index.
    ///
    /// The protected volume is chosen by position, not identity. The caller
    /// must pass `operator_verified` once someone has checked out-of-band that
    /// this index really is the OS volume.
    pub fn destroy_raids(&mut self, operator_verified: bool) -> Result<RaidDestroyReport, WipeError> {
        if !operator_verified {
            return Err(WipeError::UnverifiedProtectedVolume {
                index: self.protected_logical_drive,
            });
        }

        let logical_drives = self
            .controller
            .logical_drives()
            .map_err(WipeError::Controller)?;

        tracing::warn!(
            protected = self.protected_logical_drive,
            "Preserving logical drive by index only"
        );

        let mut report = RaidDestroyReport::default();
        for drive in logical_drives {
            if drive.id == self.protected_logical_drive {
                report.preserved.push(drive);
                continue;
            }

            match self.controller.remove_logical_drive(drive.adapter_id, drive.id) {
                Ok(()) => {
                    tracing::info!(adapter = drive.adapter_id, vd = drive.id, "Deleted logical drive");
                    report.removed.push(drive);
                }
                Err(e) => {
                    tracing::error!(adapter = drive.adapter_id, vd = drive.id, error = %e, "Could not delete logical drive");
                    report.failed.push((drive, e));
                }
            }
        }

        Ok(report)
    }

    fn wipe(
        &mut self,
        device: &Device,
        kind: WipeKind,
        mode: &ConfirmationMode<'_>,
    ) -> Result<WipeReport, WipeError> {
        let location = device.location_label();

        if device.profile == Profile::RAID {
            return Err(WipeError::RaidVolumeTarget { location });
        }

        tracing::info!(device = %location, serial = %device.serial, kind = ?kind, "Starting wipe");
        let started_at = Utc::now();

        let (method, make_good, clear_foreign, cleanup) = if device.is_controller_attached() {
            self.wipe_through_controller(device, kind, mode)?
        } else {
            let method = self.wipe_direct(&device.backend_name, kind)?;
            (
                method,
                StepOutcome::NotNeeded,
                StepOutcome::NotNeeded,
                CleanupOutcome::NotRequired,
            )
        };

        let report = WipeReport {
            location,
            serial: device.serial.clone(),
            kind,
            method,
            make_good,
            clear_foreign,
            cleanup,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            device = %report.location,
            elapsed = %report.elapsed_display(),
            warnings = report.warnings().len(),
            "Wipe finished"
        );
        Ok(report)
    }

    fn wipe_through_controller(
        &mut self,
        device: &Device,
        kind: WipeKind,
        mode: &ConfirmationMode<'_>,
    ) -> Result<(WipeMethod, StepOutcome, StepOutcome, CleanupOutcome), WipeError> {
        let drive = self.locate(device)?;

        if let Some(position) = drive.drive_position.clone() {
            return Err(WipeError::AlreadyRaidMember {
                slot: drive.slot_number,
                position,
            });
        }

        let adapter = drive.adapter_id;
        let address = drive.address();

        let make_good = if drive.needs_make_good() {
            match self.controller.make_good(adapter, address) {
                Ok(()) => StepOutcome::Succeeded,
                Err(e) => {
                    tracing::info!(drive = %address, error = %e, "Could not set drive to good; continuing");
                    StepOutcome::FailedNonFatal(e.to_string())
                }
            }
        } else {
            StepOutcome::NotNeeded
        };

        let clear_foreign = if drive.foreign_state {
            if !mode.confirm(FOREIGN_CONFIG_PROMPT) {
                return Err(WipeError::Cancelled);
            }
            match self.controller.clear_foreign(adapter) {
                Ok(()) => StepOutcome::Succeeded,
                Err(e) => {
                    tracing::info!(adapter, error = %e, "Could not clear foreign configuration; continuing");
                    StepOutcome::FailedNonFatal(e.to_string())
                }
            }
        } else {
            StepOutcome::NotNeeded
        };

        let volume = self
            .controller
            .create_raid0(adapter, address)
            .map_err(|source| WipeError::CreateVolume {
                adapter,
                drive: address,
                source,
            })?;
        tracing::info!(adapter, vd = volume, drive = %address, "Created transient volume");

        self.controller
            .start_init(adapter, volume, kind.init_mode())
            .map_err(|source| WipeError::Initialization {
                adapter,
                volume,
                step: "start",
                source,
            })?;

        let polls = self
            .wait_for_init(adapter, volume)
            .map_err(|source| WipeError::Initialization {
                adapter,
                volume,
                step: "progress check",
                source,
            })?;

        let cleanup = match self.controller.remove_logical_drive(adapter, volume) {
            Ok(()) => CleanupOutcome::Removed,
            Err(e) => {
                tracing::warn!(adapter, vd = volume, error = %e, "Wipe finished but the transient volume could not be deleted");
                CleanupOutcome::Failed(e.to_string())
            }
        };

        let method = WipeMethod::TransientVolume {
            adapter,
            drive: address,
            volume,
            polls,
        };
        Ok((method, make_good, clear_foreign, cleanup))
    }

    fn locate(&self, device: &Device) -> Result<PhysicalDrive, WipeError> {
        let drives = self
            .controller
            .physical_drives()
            .map_err(WipeError::Controller)?;

        drives
            .into_iter()
            .find(|drive| serial_matches(&device.serial, &drive.inquiry_data))
            .ok_or_else(|| WipeError::NotInController {
                serial: device.serial.clone(),
            })
    }

    /// Sleep one interval, then ask; repeat until the controller says the
    /// initialization is no longer running. Returns the number of checks.
    fn wait_for_init(&self, adapter: u32, volume: u32) -> Result<u32, DriveError> {
        let mut polls = 0;
        loop {
            self.clock.sleep(self.poll_interval);
            polls += 1;

            if !self.controller.init_in_progress(adapter, volume)? {
                return Ok(polls);
            }
            tracing::debug!(adapter, vd = volume, polls, "Initialization still running");
        }
    }

    fn wipe_direct(&self, backend_name: &str, kind: WipeKind) -> Result<WipeMethod, WipeError> {
        let path = Path::new(backend_name);

        self.block
            .erase_signatures(path)
            .map_err(|source| WipeError::BlockDevice {
                path: backend_name.to_string(),
                step: "signature erase",
                source,
            })?;

        let bytes_zeroed = self
            .block
            .zero_fill(path, kind.zero_extent())
            .map_err(|source| WipeError::BlockDevice {
                path: backend_name.to_string(),
                step: "zero fill",
                source,
            })?;

        Ok(WipeMethod::DirectOverwrite {
            path: backend_name.to_string(),
            bytes_zeroed,
        })
    }
}

// SMART backend built on smartctl's JSON output
//
// Enumeration uses `--scan-open`, per-device inspection uses `-a`, and the
// SCSI error counter log is fetched as plain text through the controller
// passthrough (`-d megaraid,N`).

use super::command::{CommandRunner, SystemRunner};
use crate::device::{SmartAttribute, SmartTable};
use crate::{DriveError, DriveResult};
use serde::Deserialize;

/// smartctl exit status bits 0 and 1: command line did not parse, or the
/// device could not be opened. Higher bits only describe drive health.
const FATAL_EXIT_BITS: i32 = 0b11;

/// One device as reported by the SMART backend's enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScanEntry {
    pub name: String,
    /// smartctl device type (`sat`, `scsi`, `megaraid,8`, `nvme`, ...)
    #[serde(rename = "type", default)]
    pub interface: String,
    #[serde(default)]
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SmartRecord {
    pub serial: Option<String>,
    pub is_ssd: bool,
    pub capacity_bytes: Option<i64>,
    pub attributes: SmartTable,
}

pub trait SmartBackend: Send + Sync {
    fn enumerate(&self) -> DriveResult<Vec<ScanEntry>>;

    fn inspect(&self, entry: &ScanEntry) -> DriveResult<SmartRecord>;

    /// Raw text of the SCSI error counter log for a controller-attached drive.
    fn error_log(&self, controller_device_id: u32) -> DriveResult<String>;
}

pub struct Smartctl<R = SystemRunner> {
    runner: R,
    program: String,
    controller_block_device: String,
}

impl Smartctl<SystemRunner> {
    pub fn system(program: &str, controller_block_device: &str) -> Self {
        Self::new(SystemRunner, program, controller_block_device)
    }
}

impl<R: CommandRunner> Smartctl<R> {
    pub fn new(runner: R, program: &str, controller_block_device: &str) -> Self {
        Self {
            runner,
            program: program.to_string(),
            controller_block_device: controller_block_device.to_string(),
        }
    }

    fn run_json(&self, args: &[&str]) -> DriveResult<String> {
        let output = self.runner.run(&self.program, args)?;

        if let Some(code) = output.code {
            if code & FATAL_EXIT_BITS != 0 {
                return Err(DriveError::SMARTReadFailed(format!(
                    "{} {} exited with status {}",
                    self.program,
                    args.join(" "),
                    code
                )));
            }
        }

        Ok(output.stdout)
    }
}

impl<R: CommandRunner> SmartBackend for Smartctl<R> {
    fn enumerate(&self) -> DriveResult<Vec<ScanEntry>> {
        let json = self.run_json(&["--scan-open", "--json"])?;
        parse_scan(&json)
    }

    fn inspect(&self, entry: &ScanEntry) -> DriveResult<SmartRecord> {
        let mut args = vec!["--json", "-a"];
        if !entry.interface.is_empty() {
            args.push("-d");
            args.push(&entry.interface);
        }
        args.push(&entry.name);

        let json = self.run_json(&args)?;
        parse_device(&json, &entry.interface)
    }

    fn error_log(&self, controller_device_id: u32) -> DriveResult<String> {
        let passthrough = format!("megaraid,{}", controller_device_id);
        let output = self.runner.run(
            &self.program,
            &["-l", "error", "-d", &passthrough, &self.controller_block_device],
        )?;

        if output.stdout.trim().is_empty() {
            return Err(DriveError::SMARTReadFailed(format!(
                "empty error log for controller device {}",
                controller_device_id
            )));
        }

        Ok(output.stdout)
    }
}

#[derive(Deserialize)]
struct ScanJson {
    #[serde(default)]
    devices: Vec<ScanEntry>,
}

#[derive(Deserialize)]
struct DeviceJson {
    serial_number: Option<String>,
    rotation_rate: Option<i64>,
    user_capacity: Option<CapacityJson>,
    ata_smart_attributes: Option<AttributesJson>,
}

#[derive(Deserialize)]
struct CapacityJson {
    bytes: i64,
}

#[derive(Deserialize)]
struct AttributesJson {
    #[serde(default)]
    table: Vec<AttributeJson>,
}

#[derive(Deserialize)]
struct AttributeJson {
    id: u8,
    #[serde(default)]
    name: String,
    value: i64,
    raw: RawJson,
}

#[derive(Deserialize)]
struct RawJson {
    value: i64,
    #[serde(default)]
    string: String,
}

pub fn parse_scan(json: &str) -> DriveResult<Vec<ScanEntry>> {
    let scan: ScanJson = serde_json::from_str(json)
        .map_err(|e| DriveError::SMARTReadFailed(format!("unparseable scan output: {}", e)))?;
    Ok(scan.devices)
}

pub fn parse_device(json: &str, interface: &str) -> DriveResult<SmartRecord> {
    let device: DeviceJson = serde_json::from_str(json)
        .map_err(|e| DriveError::SMARTReadFailed(format!("unparseable device output: {}", e)))?;

    let attributes = device
        .ata_smart_attributes
        .map(|attrs| {
            attrs
                .table
                .into_iter()
                .map(|attr| {
                    (
                        attr.id,
                        SmartAttribute {
                            id: attr.id,
                            name: attr.name,
                            value: attr.value,
                            raw: attr.raw.value,
                            raw_string: attr.raw.string,
                        },
                    )
                })
                .collect::<SmartTable>()
        })
        .unwrap_or_default();

    let is_ssd =
        device.rotation_rate == Some(0) || interface.to_lowercase().starts_with("nvme");

    Ok(SmartRecord {
        serial: device
            .serial_number
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        is_ssd,
        capacity_bytes: device.user_capacity.map(|c| c.bytes),
        attributes,
    })
}

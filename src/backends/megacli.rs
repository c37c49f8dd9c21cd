// RAID controller backend built on MegaCli
//
// MegaCli prints loosely structured "Key: Value" text. Physical drive blocks
// start at "Enclosure Device ID:" and belong to the most recent
// "Adapter #N" header.

use super::command::{CommandRunner, SystemRunner};
use crate::{DriveError, DriveResult};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

const SECTOR_SIZE: i64 = 512;

lazy_static! {
    static ref ADAPTER_HEADER: Regex = Regex::new(r"^Adapter\s*#\s*(\d+)").unwrap();
    static ref LD_ADAPTER_HEADER: Regex =
        Regex::new(r"^Adapter\s+(\d+)\s+--\s+Virtual Drive Information").unwrap();
    static ref VIRTUAL_DRIVE: Regex = Regex::new(r"^Virtual (?:Drive|Disk)\s*:\s*(\d+)").unwrap();
    static ref RAW_SECTORS: Regex = Regex::new(r"\[0x([0-9a-fA-F]+)\s+Sectors\]").unwrap();
    static ref CREATED_VD: Regex = Regex::new(r"Created VD\s+(\d+)").unwrap();
}

/// Enclosure and slot pair used to address a physical drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriveAddress {
    /// Absent when the backplane has no enclosure services
    pub enclosure: Option<u32>,
    pub slot: u32,
}

impl fmt::Display for DriveAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.enclosure {
            Some(enclosure) => write!(f, "[{}:{}]", enclosure, self.slot),
            None => write!(f, "[:{}]", self.slot),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhysicalDrive {
    pub adapter_id: u32,
    pub enclosure_id: Option<u32>,
    pub slot_number: u32,
    pub device_id: u32,
    pub pd_type: String,
    pub raw_size_bytes: i64,
    /// Vendor, model and serial as one whitespace-collapsed string
    pub inquiry_data: String,
    pub media_error_count: i64,
    pub predictive_failure_count: i64,
    pub smart_alert: bool,
    pub firmware_state: String,
    pub foreign_state: bool,
    /// Present when the drive is a member of a logical drive
    pub drive_position: Option<String>,
}

impl PhysicalDrive {
    pub fn address(&self) -> DriveAddress {
        DriveAddress {
            enclosure: self.enclosure_id,
            slot: self.slot_number,
        }
    }

    pub fn is_sas(&self) -> bool {
        self.pd_type.eq_ignore_ascii_case("sas")
    }

    /// Drives in any state other than online or unconfigured-good must be
    /// forced back to unconfigured-good before a volume can be built on them.
    pub fn needs_make_good(&self) -> bool {
        let state = self.firmware_state.to_lowercase();
        state != "online, spun up" && state != "unconfigured(good), spun up"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogicalDrive {
    pub adapter_id: u32,
    pub id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InitMode {
    Fast,
    Full,
}

pub trait RaidController: Send + Sync {
    fn physical_drives(&self) -> DriveResult<Vec<PhysicalDrive>>;

    fn logical_drives(&self) -> DriveResult<Vec<LogicalDrive>>;

    /// Build a single-drive RAID-0 volume and return its logical drive id.
    fn create_raid0(&self, adapter: u32, drive: DriveAddress) -> DriveResult<u32>;

    fn start_init(&self, adapter: u32, volume: u32, mode: InitMode) -> DriveResult<()>;

    fn init_in_progress(&self, adapter: u32, volume: u32) -> DriveResult<bool>;

    fn remove_logical_drive(&self, adapter: u32, volume: u32) -> DriveResult<()>;

    fn make_good(&self, adapter: u32, drive: DriveAddress) -> DriveResult<()>;

    /// Clears foreign configuration for the whole adapter, not just one drive.
    fn clear_foreign(&self, adapter: u32) -> DriveResult<()>;
}

pub struct MegaCli<R = SystemRunner> {
    runner: R,
    program: String,
}

impl MegaCli<SystemRunner> {
    pub fn system(program: &str) -> Self {
        Self::new(SystemRunner, program)
    }
}

impl<R: CommandRunner> MegaCli<R> {
    pub fn new(runner: R, program: &str) -> Self {
        Self {
            runner,
            program: program.to_string(),
        }
    }

    fn run(&self, args: &[&str]) -> DriveResult<String> {
        let mut full_args = args.to_vec();
        full_args.push("-NoLog");

        let output = self
            .runner
            .run(&self.program, &full_args)?
            .checked(&self.program)?;
        Ok(output.stdout)
    }
}

impl<R: CommandRunner> RaidController for MegaCli<R> {
    fn physical_drives(&self) -> DriveResult<Vec<PhysicalDrive>> {
        let output = self.run(&["-PDList", "-aALL"])?;
        Ok(parse_physical_drives(&output))
    }

    fn logical_drives(&self) -> DriveResult<Vec<LogicalDrive>> {
        let output = self.run(&["-LDInfo", "-Lall", "-aALL"])?;
        Ok(parse_logical_drives(&output))
    }

    fn create_raid0(&self, adapter: u32, drive: DriveAddress) -> DriveResult<u32> {
        let members = format!("-r0{}", drive);
        let adapter = format!("-a{}", adapter);
        let output = self.run(&["-CfgLdAdd", &members, &adapter, "-Force"])?;

        parse_created_volume(&output).ok_or_else(|| DriveError::UnexpectedOutput {
            program: self.program.clone(),
            detail: format!("no volume id in create output for {}", drive),
        })
    }

    fn start_init(&self, adapter: u32, volume: u32, mode: InitMode) -> DriveResult<()> {
        let volume = format!("-L{}", volume);
        let adapter = format!("-a{}", adapter);
        let mut args = vec!["-LDInit", "-Start"];
        if mode == InitMode::Full {
            args.push("-full");
        }
        args.push(&volume);
        args.push(&adapter);

        self.run(&args)?;
        Ok(())
    }

    fn init_in_progress(&self, adapter: u32, volume: u32) -> DriveResult<bool> {
        let volume = format!("-L{}", volume);
        let adapter = format!("-a{}", adapter);
        let output = self.run(&["-LDInit", "-ShowProg", &volume, &adapter])?;
        Ok(init_still_running(&output))
    }

    fn remove_logical_drive(&self, adapter: u32, volume: u32) -> DriveResult<()> {
        let volume = format!("-L{}", volume);
        let adapter = format!("-a{}", adapter);
        self.run(&["-CfgLdDel", &volume, "-Force", &adapter])?;
        Ok(())
    }

    fn make_good(&self, adapter: u32, drive: DriveAddress) -> DriveResult<()> {
        let target = format!("-PhysDrv{}", drive);
        let adapter = format!("-a{}", adapter);
        self.run(&["-PDMakeGood", &target, "-Force", &adapter])?;
        Ok(())
    }

    fn clear_foreign(&self, adapter: u32) -> DriveResult<()> {
        let adapter = format!("-a{}", adapter);
        self.run(&["-CfgForeign", "-Clear", &adapter])?;
        Ok(())
    }
}

/// Parse `-PDList` output. Blocks missing a slot number or device id are
/// dropped with a warning.
pub fn parse_physical_drives(output: &str) -> Vec<PhysicalDrive> {
    let mut drives = Vec::new();
    let mut adapter_id = 0;
    let mut block: Option<(u32, HashMap<String, String>)> = None;

    for line in output.lines() {
        let line = line.trim();

        if let Some(caps) = ADAPTER_HEADER.captures(line) {
            if let Some((adapter, fields)) = block.take() {
                drives.extend(build_physical_drive(adapter, &fields));
            }
            adapter_id = caps[1].parse().unwrap_or(adapter_id);
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();

        if key == "enclosure device id" {
            if let Some((adapter, fields)) = block.take() {
                drives.extend(build_physical_drive(adapter, &fields));
            }
            block = Some((adapter_id, HashMap::new()));
        }

        if let Some((_, fields)) = block.as_mut() {
            fields
                .entry(key)
                .or_insert_with(|| value.trim().to_string());
        }
    }

    if let Some((adapter, fields)) = block.take() {
        drives.extend(build_physical_drive(adapter, &fields));
    }

    drives
}

fn build_physical_drive(adapter_id: u32, fields: &HashMap<String, String>) -> Option<PhysicalDrive> {
    let number = |key: &str| fields.get(key).and_then(|v| v.parse::<i64>().ok());

    let (Some(slot), Some(device_id)) = (number("slot number"), number("device id")) else {
        tracing::warn!(
            adapter = adapter_id,
            "Skipping physical drive block without slot number or device id"
        );
        return None;
    };

    let raw_size_bytes = fields
        .get("raw size")
        .and_then(|v| RAW_SECTORS.captures(v))
        .and_then(|caps| i64::from_str_radix(&caps[1], 16).ok())
        .map(|sectors| sectors * SECTOR_SIZE)
        .unwrap_or(0);

    let inquiry_data = fields
        .get("inquiry data")
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    let smart_alert = fields
        .get("drive has flagged a s.m.a.r.t alert")
        .map(|v| v.eq_ignore_ascii_case("yes"))
        .unwrap_or(false);

    let foreign_state = fields
        .get("foreign state")
        .map(|v| !v.eq_ignore_ascii_case("none"))
        .unwrap_or(false);

    Some(PhysicalDrive {
        adapter_id,
        enclosure_id: number("enclosure device id").map(|v| v as u32),
        slot_number: slot as u32,
        device_id: device_id as u32,
        pd_type: fields.get("pd type").cloned().unwrap_or_default(),
        raw_size_bytes,
        inquiry_data,
        media_error_count: number("media error count").unwrap_or(0),
        predictive_failure_count: number("predictive failure count").unwrap_or(0),
        smart_alert,
        firmware_state: fields.get("firmware state").cloned().unwrap_or_default(),
        foreign_state,
        drive_position: fields.get("drive's position").cloned(),
    })
}

pub fn parse_logical_drives(output: &str) -> Vec<LogicalDrive> {
    let mut adapter_id = 0;
    let mut drives = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if let Some(caps) = LD_ADAPTER_HEADER.captures(line) {
            adapter_id = caps[1].parse().unwrap_or(adapter_id);
        } else if let Some(caps) = VIRTUAL_DRIVE.captures(line) {
            if let Ok(id) = caps[1].parse() {
                drives.push(LogicalDrive { adapter_id, id });
            }
        }
    }

    drives
}

pub fn parse_created_volume(output: &str) -> Option<u32> {
    CREATED_VD
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
}

pub fn init_still_running(output: &str) -> bool {
    !output.to_lowercase().contains("not in progress")
}

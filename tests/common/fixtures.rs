//! Canned smartctl and MegaCli output

use super::mock_commands::MockCommandRegistry;
use super::{MEGACLI, SMARTCTL};

pub struct ScanDevice<'a> {
    pub name: &'a str,
    pub interface: &'a str,
}

pub fn scan_json(devices: &[ScanDevice<'_>]) -> String {
    let entries: Vec<String> = devices
        .iter()
        .map(|d| {
            format!(
                r#"{{ "name": "{}", "info_name": "{}", "type": "{}", "protocol": "ATA" }}"#,
                d.name, d.name, d.interface
            )
        })
        .collect();
    format!(
        r#"{{ "json_format_version": [1, 0], "devices": [{}] }}"#,
        entries.join(", ")
    )
}

/// `(id, name, value, raw)` rows
pub fn device_json(
    serial: Option<&str>,
    rotation_rate: i64,
    capacity_bytes: i64,
    attributes: &[(u8, &str, i64, i64)],
) -> String {
    let table: Vec<String> = attributes
        .iter()
        .map(|(id, name, value, raw)| {
            format!(
                r#"{{ "id": {}, "name": "{}", "value": {}, "worst": {}, "thresh": 0, "raw": {{ "value": {}, "string": "{}" }} }}"#,
                id, name, value, value, raw, raw
            )
        })
        .collect();
    let serial = serial
        .map(|s| format!(r#""serial_number": "{}","#, s))
        .unwrap_or_default();
    format!(
        r#"{{ {} "rotation_rate": {}, "user_capacity": {{ "bytes": {} }}, "ata_smart_attributes": {{ "revision": 16, "table": [{}] }} }}"#,
        serial,
        rotation_rate,
        capacity_bytes,
        table.join(", ")
    )
}

pub fn register_scan(registry: &MockCommandRegistry, devices: &[ScanDevice<'_>]) {
    registry.register_ok(
        &format!("{} --scan-open --json", SMARTCTL),
        &scan_json(devices),
    );
}

pub fn register_inspect(registry: &MockCommandRegistry, name: &str, interface: &str, json: &str) {
    registry.register_ok(
        &format!("{} --json -a -d {} {}", SMARTCTL, interface, name),
        json,
    );
}

pub fn error_log(read: i64, write: i64, verify: i64) -> String {
    format!(
        "smartctl 7.2 2020-12-30 r5155 [x86_64-linux-5.15.0] (local build)
Copyright (C) 2002-20, Bruce Allen, Christian Franke, www.smartmontools.org

=== START OF READ SMART DATA SECTION ===
Error counter log:
           Errors Corrected by           Total   Correction     Gigabytes    Total
               ECC          rereads/    errors   algorithm      processed    uncorrected
           fast | delayed   rewrites  corrected  invocations   [10^9 bytes]  errors
read:          0        0         0         0          0       1024.000           {}
write:         0        0         0         0          0        512.000           {}
verify:        0        0         0         0          0         12.000           {}

Non-medium error count:        0
",
        read, write, verify
    )
}

pub fn register_error_log(registry: &MockCommandRegistry, device_id: u32, output: &str) {
    registry.register_ok(
        &format!("{} -l error -d megaraid,{} /dev/sda", SMARTCTL, device_id),
        output,
    );
}

pub struct Pd<'a> {
    pub slot: u32,
    pub device_id: u32,
    pub pd_type: &'a str,
    pub inquiry: &'a str,
    pub media_errors: i64,
    pub firmware_state: &'a str,
    pub foreign: bool,
    pub position: Option<&'a str>,
}

impl<'a> Pd<'a> {
    pub fn sas(slot: u32, device_id: u32, inquiry: &'a str) -> Self {
        Self {
            slot,
            device_id,
            pd_type: "SAS",
            inquiry,
            media_errors: 0,
            firmware_state: "Unconfigured(good), Spun Up",
            foreign: false,
            position: None,
        }
    }
}

pub fn pd_list(drives: &[Pd<'_>]) -> String {
    let mut out = String::from("\nAdapter #0\n\n");
    for pd in drives {
        out.push_str("Enclosure Device ID: 32\n");
        out.push_str(&format!("Slot Number: {}\n", pd.slot));
        if let Some(position) = pd.position {
            out.push_str(&format!("Drive's position: {}\n", position));
        }
        out.push_str("Enclosure position: 1\n");
        out.push_str(&format!("Device Id: {}\n", pd.device_id));
        out.push_str(&format!("Media Error Count: {}\n", pd.media_errors));
        out.push_str("Other Error Count: 0\n");
        out.push_str("Predictive Failure Count: 0\n");
        out.push_str(&format!("PD Type: {}\n\n", pd.pd_type));
        out.push_str("Raw Size: 279.396 GB [0x22ecb25c Sectors]\n");
        out.push_str(&format!("Firmware state: {}\n", pd.firmware_state));
        out.push_str(&format!("Inquiry Data: {}\n", pd.inquiry));
        out.push_str(&format!(
            "Foreign State: {}\n",
            if pd.foreign { "Foreign" } else { "None" }
        ));
        out.push_str("Drive has flagged a S.M.A.R.T alert : No\n\n\n");
    }
    out.push_str("\nExit Code: 0x00\n");
    out
}

pub fn register_pd_list(registry: &MockCommandRegistry, drives: &[Pd<'_>]) {
    registry.register_ok(
        &format!("{} -PDList -aALL -NoLog", MEGACLI),
        &pd_list(drives),
    );
}

pub fn ld_info(ids: &[u32]) -> String {
    let mut out = String::from("\n\nAdapter 0 -- Virtual Drive Information:\n");
    for id in ids {
        out.push_str(&format!("Virtual Drive: {} (Target Id: {})\n", id, id));
        out.push_str("Name                :\n");
        out.push_str("RAID Level          : Primary-0, Secondary-0, RAID Level Qualifier-0\n");
        out.push_str("Size                : 278.875 GB\n\n");
    }
    out.push_str("Exit Code: 0x00\n");
    out
}

pub fn megacli(args: &str) -> String {
    format!("{} {} -NoLog", MEGACLI, args)
}

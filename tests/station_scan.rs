// Integration tests for scanning, reconciliation and the presentation rows
//
// smartctl and MegaCli are replaced by a scripted command registry, so the
// real parsers run against canned tool output.

#[path = "common/mod.rs"]
mod common;

use common::fixtures::*;
use common::mock_commands::MockCommandRegistry;
use common::{open_station, test_config};
use hddstation::device::{ControllerMetric, MetricValue};
use hddstation::station::{OVERVIEW_HEADER, RAID_DETAIL_NOTE, UNCLASSIFIED_DETAIL_NOTE};
use hddstation::{HealthData, Location, Profile, ScanOptions, TestResult};
use proptest::prelude::*;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A station with a RAID volume, three SAS frontplane drives, one protected
/// SAS drive, one protected SSD and one SATA drive in toaster bay 1.
struct Bench {
    registry: MockCommandRegistry,
    _dir: TempDir,
    toaster_disk: PathBuf,
    bays: Vec<PathBuf>,
}

fn bench() -> Bench {
    let dir = TempDir::new().unwrap();
    let toaster_disk = dir.path().join("sdb");
    std::fs::write(&toaster_disk, vec![0xAAu8; 64 * 1024]).unwrap();
    let bay1 = dir.path().join("toaster1");
    std::os::unix::fs::symlink(&toaster_disk, &bay1).unwrap();
    let bays = vec![bay1, dir.path().join("toaster2")];

    let registry = MockCommandRegistry::new();
    let toaster_name = toaster_disk.to_str().unwrap();

    register_scan(
        &registry,
        &[
            ScanDevice { name: "/dev/sda", interface: "scsi" },
            ScanDevice { name: toaster_name, interface: "sat" },
            ScanDevice { name: "/dev/sdc", interface: "sat" },
            ScanDevice { name: "/dev/bus/0", interface: "megaraid,9" },
        ],
    );
    register_inspect(&registry, "/dev/sda", "scsi", &device_json(None, 10000, 299_439_751_168, &[]));
    register_inspect(
        &registry,
        toaster_name,
        "sat",
        &device_json(
            Some("WD-TOASTER1"),
            7200,
            2_000_398_934_016,
            &[(1, "Raw_Read_Error_Rate", 200, 0), (9, "Power_On_Hours", 50, 25_000)],
        ),
    );
    register_inspect(
        &registry,
        "/dev/sdc",
        "sat",
        &device_json(Some("S21TNXAGA08036M"), 0, 250_059_350_016, &[(177, "Wear_Leveling_Count", 99, 3)]),
    );
    register_inspect(
        &registry,
        "/dev/bus/0",
        "megaraid,9",
        &device_json(Some("ABC123"), 10000, 300_000_000_000, &[]),
    );

    let mut failing = Pd::sas(10, 18, "SEAGATE ST600MM0006 Z0M1WXYZ");
    failing.media_errors = 3;
    register_pd_list(
        &registry,
        &[
            Pd::sas(1, 9, "abc123 extra"),
            Pd::sas(2, 10, "SEAGATE ST300MM0008 S0K2QRST"),
            Pd::sas(3, 11, "SEAGATE ST300MM0008 PROTECTED1"),
            failing,
        ],
    );
    register_error_log(&registry, 9, &error_log(0, 0, 0));
    register_error_log(&registry, 10, "smartctl: short output\n");
    register_error_log(&registry, 11, &error_log(0, 0, 0));
    register_error_log(&registry, 18, &error_log(0, 0, 0));

    Bench {
        registry,
        _dir: dir,
        toaster_disk,
        bays,
    }
}

#[test]
fn test_overview_rows_are_sorted_lexically() {
    let bench = bench();
    let config = test_config(&["PROTECTED1", "S21TNXAGA08036M"], bench.bays.clone());
    let (station, _clock) = open_station(config, &bench.registry, ScanOptions::default());

    let drives: Vec<String> = station.overview().into_iter().map(|r| r.drive).collect();
    assert_eq!(
        drives,
        vec![
            "/dev/sda",
            "Frontplane Slot 1",
            "Frontplane Slot 10",
            "Frontplane Slot 2",
            "Toaster Slot 1",
        ]
    );
    assert_eq!(OVERVIEW_HEADER, ["Drive", "Profile", "Serial", "Size", "Pass?"]);
}

#[test]
fn test_same_drive_from_both_backends_yields_one_sas_row() {
    let bench = bench();
    let config = test_config(&["PROTECTED1"], bench.bays.clone());
    let (station, _clock) = open_station(config, &bench.registry, ScanOptions::default());

    let matches: Vec<_> = station
        .snapshot()
        .devices()
        .iter()
        .filter(|d| d.serial.to_lowercase().contains("abc123"))
        .collect();

    assert_eq!(matches.len(), 1);
    let device = matches[0];
    assert_eq!(device.profile, Profile::SAS);
    assert_eq!(device.serial, "abc123 extra");
    assert_eq!(device.location, Location::Frontplane(1));
    assert_eq!(device.controller_device_id, Some(9));
    assert!(device.smart_table().is_none());
    let metrics = device.controller_metrics().unwrap();
    assert_eq!(
        metrics[&ControllerMetric::UncorrectableReadErrors],
        MetricValue::Count(0)
    );
    assert_eq!(device.result, Some(TestResult::Pass));
}

#[test]
fn test_results_per_device() {
    let bench = bench();
    let config = test_config(&["PROTECTED1", "S21TNXAGA08036M"], bench.bays.clone());
    let (station, _clock) = open_station(config, &bench.registry, ScanOptions::default());
    let snapshot = station.snapshot();

    let raid = snapshot.find("/dev/sda").unwrap();
    assert_eq!(raid.profile, Profile::RAID);
    assert_eq!(raid.serial, "N/A");
    assert_eq!(raid.health, HealthData::Unavailable);
    assert_eq!(raid.result, Some(TestResult::NotApplicable));

    let degraded = snapshot.find("Frontplane Slot 2").unwrap();
    assert!(degraded.warning);
    assert_eq!(degraded.result, Some(TestResult::Warn));

    let failing = snapshot.find("frontplane slot 10").unwrap();
    assert_eq!(failing.serial, "ST600MM0006 Z0M1WXYZ");
    assert_eq!(failing.capacity, "279.4 GB");
    assert_eq!(failing.result, Some(TestResult::Fail));

    let toaster = snapshot.find("WD-TOASTER1").unwrap();
    assert_eq!(toaster.location, Location::Toaster(1));
    assert_eq!(toaster.backend_name, bench.toaster_disk.to_str().unwrap());
    assert_eq!(toaster.profile, Profile::SATA);
    assert_eq!(toaster.capacity, "1.8 TB");
    assert_eq!(toaster.result, Some(TestResult::Pass));
    assert_eq!(
        station.evaluator().table_for(toaster).map(|t| t.profile),
        Some(Profile::SATAEnterprise)
    );
}

#[test]
fn test_protected_drives_hidden_from_both_backends() {
    let bench = bench();
    let config = test_config(&["protected1", "s21tnxaga08036m"], bench.bays.clone());
    let (station, _clock) = open_station(config, &bench.registry, ScanOptions::default());

    let serials: Vec<String> = station.overview().into_iter().map(|r| r.serial).collect();
    assert!(!serials.iter().any(|s| s.to_lowercase().contains("protected1")));
    assert!(!serials.iter().any(|s| s.eq_ignore_ascii_case("S21TNXAGA08036M")));
    assert!(station.snapshot().find("Frontplane Slot 3").is_none());
}

#[test]
fn test_include_protected_lists_them() {
    let bench = bench();
    let config = test_config(&["PROTECTED1", "S21TNXAGA08036M"], bench.bays.clone());
    let (station, _clock) = open_station(
        config,
        &bench.registry,
        ScanOptions {
            include_protected: true,
        },
    );

    let snapshot = station.snapshot();
    assert!(snapshot.includes_protected());
    assert!(snapshot.find("Frontplane Slot 3").is_some());
    let ssd = snapshot.find("S21TNXAGA08036M").unwrap();
    assert_eq!(ssd.profile, Profile::SSD);
    assert_eq!(ssd.location, Location::DevicePath("/dev/sdc".to_string()));
}

#[test]
fn test_controller_failure_degrades_instead_of_aborting() {
    let bench = bench();
    bench.registry.register(
        &megacli("-PDList -aALL"),
        hddstation::backends::CommandOutput::failed(1, "", "adapter not found"),
    );
    let config = test_config(&["PROTECTED1", "S21TNXAGA08036M"], bench.bays.clone());
    let (station, _clock) = open_station(config, &bench.registry, ScanOptions::default());

    let snapshot = station.snapshot();
    // No controller inventory: no SAS rows, and the controller SMART entry is
    // still dropped as controller-managed.
    assert!(snapshot.devices().iter().all(|d| d.profile != Profile::SAS));
    assert!(snapshot.find("/dev/sda").is_some());
    assert!(snapshot.find("Toaster Slot 1").is_some());
}

#[test]
fn test_unreachable_controller_drive_needs_manual_testing() {
    let registry = MockCommandRegistry::new();
    register_scan(&registry, &[ScanDevice { name: "/dev/bus/0", interface: "sat+megaraid,12" }]);
    register_inspect(
        &registry,
        "/dev/bus/0",
        "sat+megaraid,12",
        &device_json(Some("WD-LOST"), 7200, 1_000_204_886_016, &[(9, "Power_On_Hours", 90, 100)]),
    );
    register_pd_list(&registry, &[]);

    let (station, _clock) = open_station(test_config(&[], vec![]), &registry, ScanOptions::default());

    let device = station.snapshot().find("WD-LOST").unwrap();
    assert_eq!(device.location, Location::NeedsManualTesting);
    assert_eq!(device.profile, Profile::SATA);
    assert_eq!(device.controller_device_id, None);
}

#[test]
fn test_unreadable_smart_device_is_kept_with_warning() {
    let registry = MockCommandRegistry::new();
    register_scan(&registry, &[ScanDevice { name: "/dev/sdd", interface: "sat" }]);
    register_pd_list(&registry, &[]);

    let (station, _clock) = open_station(test_config(&[], vec![]), &registry, ScanOptions::default());

    let device = station.snapshot().find("/dev/sdd").unwrap();
    assert_eq!(device.serial, "N/A");
    assert_eq!(device.capacity, "N/A");
    assert!(device.warning);
    assert_eq!(device.result, Some(TestResult::Warn));
}

#[test]
fn test_unclassified_device_has_no_verdict() {
    let registry = MockCommandRegistry::new();
    register_scan(&registry, &[ScanDevice { name: "/dev/sde", interface: "usbjmicron" }]);
    register_inspect(
        &registry,
        "/dev/sde",
        "usbjmicron",
        &device_json(Some("USB1"), 5400, 500_107_862_016, &[]),
    );
    register_pd_list(&registry, &[]);

    let (station, _clock) = open_station(test_config(&[], vec![]), &registry, ScanOptions::default());

    let device = station.snapshot().find("USB1").unwrap();
    assert_eq!(device.profile, Profile::Unclassified);
    assert_eq!(device.result, None);
    assert_eq!(station.overview()[0].result, "");
    assert_eq!(station.overview()[0].profile, "");

    let rows = station.detail(device);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, UNCLASSIFIED_DETAIL_NOTE);
}

#[test]
fn test_detail_rows() {
    let bench = bench();
    let config = test_config(&["PROTECTED1", "S21TNXAGA08036M"], bench.bays.clone());
    let (station, _clock) = open_station(config, &bench.registry, ScanOptions::default());
    let snapshot = station.snapshot();

    let raid_rows = station.detail(snapshot.find("/dev/sda").unwrap());
    assert_eq!(raid_rows.len(), 1);
    assert_eq!(raid_rows[0].name, RAID_DETAIL_NOTE);

    // Only attributes the drive actually reports, in table order
    let toaster_rows = station.detail(snapshot.find("Toaster Slot 1").unwrap());
    let ids: Vec<&str> = toaster_rows.iter().map(|r| r.attribute_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "9"]);
    assert_eq!(toaster_rows[1].name, "Power_On_Hours");
    assert_eq!(toaster_rows[1].observed, "25000");

    let sas_rows = station.detail(snapshot.find("Frontplane Slot 10").unwrap());
    assert_eq!(sas_rows.len(), 6);
    assert_eq!(sas_rows[0].attribute_id, "");
    assert_eq!(sas_rows[0].name, "media_error_count");
    assert_eq!(sas_rows[0].observed, "3");
    assert_eq!(sas_rows[2].name, "drive_has_flagged_a_smart_alert");
    assert_eq!(sas_rows[2].observed, "false");
}

#[test]
fn test_rescan_rebuilds_snapshot() {
    let bench = bench();
    let config = test_config(&["PROTECTED1", "S21TNXAGA08036M"], bench.bays.clone());
    let (mut station, _clock) = open_station(config, &bench.registry, ScanOptions::default());
    assert_eq!(station.snapshot().devices().len(), 5);

    register_pd_list(&bench.registry, &[Pd::sas(1, 9, "abc123 extra")]);
    station.rescan(ScanOptions::default());

    assert_eq!(station.snapshot().devices().len(), 3);
    assert!(station.snapshot().find("Frontplane Slot 10").is_none());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_protected_serials_never_listed(serial in "[A-Z0-9]{6,14}", lowercase_entry in any::<bool>()) {
        let registry = MockCommandRegistry::new();
        register_scan(&registry, &[ScanDevice { name: "/dev/sdf", interface: "sat" }]);
        register_inspect(&registry, "/dev/sdf", "sat", &device_json(Some(serial.as_str()), 7200, 1_000_000, &[]));
        let inquiry = format!("SEAGATE ST300MM0008 {}", serial.to_lowercase());
        register_pd_list(&registry, &[Pd::sas(4, 12, &inquiry)]);
        register_error_log(&registry, 12, &error_log(0, 0, 0));

        let entry = if lowercase_entry { serial.to_lowercase() } else { serial.clone() };
        let (station, _clock) = open_station(test_config(&[entry.as_str()], vec![]), &registry, ScanOptions::default());

        prop_assert!(station.snapshot().devices().is_empty());
    }
}

/// Collects formatted log lines so a test can assert on them.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_controller_managed_entry_skips_slot_lookup() {
    let registry = MockCommandRegistry::new();
    register_scan(
        &registry,
        &[ScanDevice { name: "/dev/bus/0", interface: "megaraid,12" }],
    );
    register_inspect(
        &registry,
        "/dev/bus/0",
        "megaraid,12",
        &device_json(Some("SMARTSIDE9"), 10000, 300_000_000_000, &[]),
    );
    register_pd_list(&registry, &[Pd::sas(4, 12, "SEAGATE ST300MM0008 S0K2QRST")]);
    register_error_log(&registry, 12, &error_log(0, 0, 0));

    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let (station, _clock) = tracing::subscriber::with_default(subscriber, || {
        open_station(test_config(&[], vec![]), &registry, ScanOptions::default())
    });

    let drives: Vec<String> = station.overview().into_iter().map(|r| r.drive).collect();
    assert_eq!(drives, vec!["Frontplane Slot 4"]);

    let logs = logs.text();
    assert!(logs.contains("Leaving controller drive to the controller inventory"));
    assert!(!logs.contains("not found in physical drive list"));
}

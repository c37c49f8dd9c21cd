// Station configuration
//
// The enclosure topology and the protected-device allowlist are explicit
// configuration handed to the reconciler and the orchestrator. Defaults
// describe the reference station; a TOML file and HDDSTATION_* environment
// variables can override any field.

use crate::{DriveError, DriveResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/hddstation/station.toml";

/// Environment values for these keys are comma-separated lists
/// (`HDDSTATION_PROTECTED_SERIALS=SERIAL1,SERIAL2`).
const LIST_KEYS: [&str; 3] = ["protected_serials", "toaster_bays", "vendor_prefixes"];
const LIST_SEPARATOR: &str = ",";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Serials of the OS disk and permanent drives; never listed or wiped
    pub protected_serials: Vec<String>,
    /// Direct-attach bay symlinks, bay N at index N-1
    pub toaster_bays: Vec<PathBuf>,
    /// Vendor prefixes stripped from controller inquiry strings
    pub vendor_prefixes: Vec<String>,
    pub smartctl_path: String,
    pub megacli_path: String,
    pub wipefs_path: String,
    /// Block device handed to smartctl when addressing drives through the controller
    pub controller_block_device: String,
    pub poll_interval_secs: u64,
    /// Logical drive index assumed to hold the OS. Positional guess, see `destroy_raids`.
    pub protected_logical_drive: u32,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            protected_serials: vec![
                "000dfa4406d996272000d8481ec0110b".to_string(),
                "S21TNXAGA08036M".to_string(),
                "S21TNXAH201539J".to_string(),
            ],
            toaster_bays: (1..=4)
                .map(|bay| PathBuf::from(format!("/dev/toaster{}", bay)))
                .collect(),
            vendor_prefixes: vec!["seagate ".to_string()],
            smartctl_path: "smartctl".to_string(),
            megacli_path: "/opt/MegaRAID/MegaCli/MegaCli64".to_string(),
            wipefs_path: "wipefs".to_string(),
            controller_block_device: "/dev/sda".to_string(),
            poll_interval_secs: 5,
            protected_logical_drive: 0,
        }
    }
}

impl StationConfig {
    /// Load configuration from an optional file layered under the environment.
    /// A missing file is not an error; every field falls back to its default.
    pub fn load(path: Option<&Path>) -> DriveResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let mut environment = config::Environment::with_prefix("HDDSTATION")
            .try_parsing(true)
            .list_separator(LIST_SEPARATOR);
        for key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }

        let settings = builder
            .add_source(environment)
            .build()
            .map_err(|e| DriveError::Config(e.to_string()))?;

        let loaded: StationConfig = settings
            .try_deserialize()
            .map_err(|e| DriveError::Config(e.to_string()))?;

        if loaded.poll_interval_secs == 0 {
            return Err(DriveError::Config(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }

        tracing::debug!(
            protected = loaded.protected_serials.len(),
            bays = loaded.toaster_bays.len(),
            "Loaded station configuration"
        );

        Ok(loaded)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_topology() {
        let config = StationConfig::default();
        assert_eq!(config.toaster_bays.len(), 4);
        assert_eq!(config.toaster_bays[0], PathBuf::from("/dev/toaster1"));
        assert_eq!(config.toaster_bays[3], PathBuf::from("/dev/toaster4"));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.protected_logical_drive, 0);
        assert_eq!(config.protected_serials.len(), 3);
    }

    #[test]
    #[serial]
    fn test_load_without_file_uses_defaults() {
        let config = StationConfig::load(None).unwrap();
        assert_eq!(config.megacli_path, "/opt/MegaRAID/MegaCli/MegaCli64");
        assert_eq!(config.vendor_prefixes, vec!["seagate ".to_string()]);
    }

    #[test]
    #[serial]
    fn test_load_missing_file_is_not_an_error() {
        let config =
            StationConfig::load(Some(Path::new("/nonexistent/hddstation/station.toml"))).unwrap();
        assert_eq!(config.smartctl_path, "smartctl");
    }

    #[test]
    #[serial]
    fn test_load_overrides_from_toml() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
protected_serials = ["OSDISK1"]
toaster_bays = ["/dev/bay-a", "/dev/bay-b"]
poll_interval_secs = 2
"#
        )
        .unwrap();

        let config = StationConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.protected_serials, vec!["OSDISK1".to_string()]);
        assert_eq!(
            config.toaster_bays,
            vec![PathBuf::from("/dev/bay-a"), PathBuf::from("/dev/bay-b")]
        );
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        // Untouched fields keep their defaults
        assert_eq!(config.wipefs_path, "wipefs");
    }

    #[test]
    #[serial]
    fn test_load_rejects_zero_poll_interval() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "poll_interval_secs = 0").unwrap();

        let err = StationConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, DriveError::Config(_)));
    }

    #[test]
    #[serial]
    fn test_load_overrides_from_environment() {
        std::env::set_var("HDDSTATION_PROTECTED_SERIALS", "OSDISK1,OSDISK2");
        std::env::set_var("HDDSTATION_TOASTER_BAYS", "/dev/bay-a");
        std::env::set_var("HDDSTATION_SMARTCTL_PATH", "/usr/local/sbin/smartctl");
        std::env::set_var("HDDSTATION_POLL_INTERVAL_SECS", "3");

        let loaded = StationConfig::load(None);

        for key in [
            "HDDSTATION_PROTECTED_SERIALS",
            "HDDSTATION_TOASTER_BAYS",
            "HDDSTATION_SMARTCTL_PATH",
            "HDDSTATION_POLL_INTERVAL_SECS",
        ] {
            std::env::remove_var(key);
        }

        let config = loaded.unwrap();
        assert_eq!(
            config.protected_serials,
            vec!["OSDISK1".to_string(), "OSDISK2".to_string()]
        );
        assert_eq!(config.toaster_bays, vec![PathBuf::from("/dev/bay-a")]);
        assert_eq!(config.smartctl_path, "/usr/local/sbin/smartctl");
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.vendor_prefixes, vec!["seagate ".to_string()]);
    }
}

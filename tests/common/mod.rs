//! Common test utilities and mock infrastructure
//!
//! This module provides shared functionality for integration tests including:
//! - A scripted command registry standing in for smartctl, MegaCli and wipefs
//! - Canned tool output
//! - Station builders wired to the registry

#![allow(dead_code)]

pub mod fixtures;
pub mod mock_commands;

use hddstation::backends::{BlockTools, MegaCli, Smartctl};
use hddstation::station::Backends;
use hddstation::wipe_orchestrator::Clock;
use hddstation::{ScanOptions, Station, StationConfig};
use mock_commands::MockCommandRegistry;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SMARTCTL: &str = "smartctl";
pub const MEGACLI: &str = "MegaCli64";
pub const WIPEFS: &str = "wipefs";

/// Clock that returns immediately and counts how often it was asked to wait.
#[derive(Clone, Default)]
pub struct CountingClock {
    pub sleeps: Arc<AtomicU32>,
}

impl CountingClock {
    pub fn sleeps(&self) -> u32 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Clock for CountingClock {
    fn sleep(&self, _duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn test_config(protected: &[&str], bays: Vec<PathBuf>) -> StationConfig {
    StationConfig {
        protected_serials: protected.iter().map(|s| s.to_string()).collect(),
        toaster_bays: bays,
        smartctl_path: SMARTCTL.to_string(),
        megacli_path: MEGACLI.to_string(),
        wipefs_path: WIPEFS.to_string(),
        ..StationConfig::default()
    }
}

pub fn backends(
    config: &StationConfig,
    registry: &MockCommandRegistry,
    clock: &CountingClock,
) -> Backends {
    Backends {
        smart: Box::new(Smartctl::new(
            registry.clone(),
            &config.smartctl_path,
            &config.controller_block_device,
        )),
        controller: Box::new(MegaCli::new(registry.clone(), &config.megacli_path)),
        block: Box::new(BlockTools::new(registry.clone(), &config.wipefs_path)),
        clock: Box::new(clock.clone()),
    }
}

pub fn open_station(
    config: StationConfig,
    registry: &MockCommandRegistry,
    options: ScanOptions,
) -> (Station, CountingClock) {
    let clock = CountingClock::default();
    let backends = backends(&config, registry, &clock);
    (Station::open(config, backends, options), clock)
}

// External tool backends
//
// Organized structure:
// - command.rs: process invocation seam shared by every backend
// - smartctl.rs: SMART enumeration, attribute tables and the SCSI error log
// - megacli.rs: RAID controller inventory and volume management
// - block.rs: signature erase and zero fill for direct-attach devices

pub mod block;
pub mod command;
pub mod megacli;
pub mod smartctl;


pub use block::{BlockDevices, BlockTools, ZeroExtent};
pub use command::{CommandOutput, CommandRunner, SystemRunner};
pub use megacli::{
    DriveAddress, InitMode, LogicalDrive, MegaCli, PhysicalDrive, RaidController,
};
pub use smartctl::{ScanEntry, SmartBackend, SmartRecord, Smartctl};

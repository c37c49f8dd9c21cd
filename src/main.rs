use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use hddstation::config::DEFAULT_CONFIG_PATH;
use hddstation::station::{
    Backends, DetailRow, OverviewRow, DETAIL_HEADER, OVERVIEW_HEADER,
};
use hddstation::wipe_orchestrator::{
    Confirm, ConfirmationMode, RaidDestroyReport, WipeReport,
};
use hddstation::{Device, ScanOptions, Station, StationConfig};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const COLUMN_WIDTH: usize = 26;

#[derive(Parser)]
#[command(name = "hddstation")]
#[command(about = "Drive decommissioning station: grade drives and wipe them")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Station configuration file
    #[arg(long, global = true, env = "HDDSTATION_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Skip the root privilege check (DANGEROUS!)
    #[arg(long, global = true)]
    unsafe_mode: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List every drive with its profile and test result
    List {
        /// Also show drives on the protected list
        #[arg(long)]
        include_protected: bool,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the tested attributes of one drive
    Show {
        /// Location label (e.g. "Frontplane Slot 3") or serial
        target: String,

        #[arg(long)]
        json: bool,
    },

    /// Quick-wipe one drive
    Quickwipe {
        target: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Quick-wipe every listed drive
    QuickwipeAll {
        #[arg(short, long)]
        yes: bool,
    },

    /// Zero an entire drive
    Zero {
        target: String,

        #[arg(short, long)]
        yes: bool,
    },

    /// Delete every RAID volume except the protected OS volume
    DestroyRaids {
        /// Confirm that the protected logical drive index holds the OS
        #[arg(long)]
        os_volume_verified: bool,
    },
}

struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        ask_yes_no(prompt).unwrap_or(false)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.debug);

    if !cli.unsafe_mode && !is_root() {
        eprintln!("Error: This program requires root privileges.");
        eprintln!("Please run with sudo or as root user.");
        std::process::exit(1);
    }

    let config = StationConfig::load(Some(cli.config.as_path()))
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let backends = Backends::system(&config);

    let options = match &cli.command {
        Commands::List {
            include_protected, ..
        } => ScanOptions {
            include_protected: *include_protected,
        },
        _ => ScanOptions::default(),
    };

    let mut station = Station::open(config, backends, options);

    match &cli.command {
        Commands::List { json, .. } => print_overview(&station.overview(), *json)?,
        Commands::Show { target, json } => {
            let device = find_device(&station, target)?;
            print_detail(&device, &station.detail(&device), *json)?;
        }
        Commands::Quickwipe { target, yes } => {
            let device = find_device(&station, target)?;
            if !yes
                && !ask_yes_no(&format!(
                    "You are about to quickwipe {}.\n\nThis dumps its partition table or, on the frontplane, \
fast re-initializes the drive. It is much faster than zeroing and is NOT data-destructive.\n\nContinue?",
                    device.location_label()
                ))?
            {
                println!("Operation cancelled");
                return Ok(());
            }

            let result = station.quick_wipe(&device, &ConfirmationMode::Interactive(&StdinConfirm));
            report_wipe(&device, result)?;
            rescan_and_show(&mut station)?;
        }
        Commands::QuickwipeAll { yes } => {
            if !yes
                && !ask_yes_no(
                    "I will now attempt to quickwipe EVERY drive on this list. There is no going back. Continue?",
                )?
            {
                println!("Operation cancelled");
                return Ok(());
            }

            let report = station.quick_wipe_all();
            for wipe in &report.completed {
                print_wipe_summary(wipe);
            }
            for skipped in &report.skipped {
                println!("{} {} (RAID volume)", "Skipped".yellow(), skipped);
            }

            rescan_and_show(&mut station)?;

            if !report.is_clean() {
                eprintln!("\nQuickwipe finished, but these drives ran into problems. Investigate and re-wipe:");
                for (label, error) in &report.failed {
                    eprintln!("  {}: {}", label.red(), error);
                }
                bail!("{} drive(s) failed", report.failed.len());
            }
            let finished = format!("Quickwipe completed: {}", report.summary());
            if report.skipped.is_empty() {
                println!("{}", finished.green());
            } else {
                println!("{}", finished.yellow());
            }
        }
        Commands::Zero { target, yes } => {
            let device = find_device(&station, target)?;
            if !yes {
                println!("This will PERMANENTLY DESTROY all data on:");
                println!("  Drive: {}", device.location_label());
                println!("  Serial: {}", device.serial);
                println!("  Size: {}", device.capacity);
                println!("This can take hours and cannot be aborted once initialization starts.");
                if !type_to_confirm("DESTROY")? {
                    println!("Operation cancelled");
                    return Ok(());
                }
            }

            let result = station.full_zero(&device, &ConfirmationMode::Interactive(&StdinConfirm));
            report_wipe(&device, result)?;
            rescan_and_show(&mut station)?;
        }
        Commands::DestroyRaids { os_volume_verified } => {
            let protected = station.config().protected_logical_drive;
            println!(
                "{}",
                format!(
                    "This deletes every RAID volume except logical drive {}, which is assumed to hold the OS.",
                    protected
                )
                .red()
            );
            println!("Logical drive {} is chosen by position only. Check it first with:", protected);
            println!(
                "  {} -LDInfo -L{} -a0",
                station.config().megacli_path,
                protected
            );

            let verified = *os_volume_verified
                || (type_to_confirm("DESTROY")?
                    && ask_yes_no(&format!(
                        "Have you confirmed that logical drive {} is the OS volume?",
                        protected
                    ))?);

            let report = station.destroy_raids(verified)?;
            print_destroy_report(&report);
            rescan_and_show(&mut station)?;

            if !report.failed.is_empty() {
                bail!("{} logical drive(s) could not be deleted", report.failed.len());
            }
        }
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn find_device(station: &Station, target: &str) -> Result<Device> {
    match station.snapshot().find(target) {
        Some(device) => Ok(device.clone()),
        None => bail!("no drive matches '{}'; run 'hddstation list' to see labels", target),
    }
}

fn ask_yes_no(prompt: &str) -> Result<bool> {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn type_to_confirm(word: &str) -> Result<bool> {
    print!("\nType '{}' to confirm: ", word);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim() == word)
}

fn pad(cell: &str) -> String {
    format!("{:<width$}", cell, width = COLUMN_WIDTH)
}

fn colour_result(result: &str) -> String {
    let padded = pad(result);
    match result {
        "PASS" => padded.green().to_string(),
        "FAIL" => padded.red().bold().to_string(),
        "WARN" | "N/A" => padded.yellow().to_string(),
        _ => padded,
    }
}

fn print_overview(rows: &[OverviewRow], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }

    let header: String = OVERVIEW_HEADER.iter().map(|h| pad(h)).collect();
    println!("{}", header.bold());

    for row in rows {
        let cells = row.cells();
        let mut line: String = cells[..4].iter().map(|c| pad(c)).collect();
        line.push_str(&colour_result(cells[4]));
        println!("{}", line);
    }
    Ok(())
}

fn print_detail(device: &Device, rows: &[DetailRow], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }

    println!(
        "{} ({}, serial {})",
        device.location_label().bold(),
        device.profile,
        device.serial
    );
    let header: String = DETAIL_HEADER.iter().map(|h| pad(h)).collect();
    println!("{}", header.bold());
    for row in rows {
        println!("{}{}{}", pad(&row.attribute_id), pad(&row.name), row.observed);
    }
    Ok(())
}

fn print_wipe_summary(report: &WipeReport) {
    println!(
        "{} {} ({}) in {}",
        "Wiped".green(),
        report.location,
        report.serial,
        report.elapsed_display()
    );
    for warning in report.warnings() {
        println!("  {} {}", "Warning:".yellow(), warning);
    }
}

fn report_wipe(
    device: &Device,
    result: std::result::Result<WipeReport, hddstation::WipeError>,
) -> Result<()> {
    match result {
        Ok(report) => {
            print_wipe_summary(&report);
            println!("{}", "Drive successfully wiped!".green());
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}: {}", "Failure!".red().bold(), device.location_label(), e);
            Err(e.into())
        }
    }
}

fn print_destroy_report(report: &RaidDestroyReport) {
    for drive in &report.preserved {
        println!("Kept logical drive {} on adapter {}", drive.id, drive.adapter_id);
    }
    for drive in &report.removed {
        println!("{} logical drive {} on adapter {}", "Deleted".green(), drive.id, drive.adapter_id);
    }
    for (drive, error) in &report.failed {
        eprintln!(
            "{} logical drive {} on adapter {}: {}",
            "Could not delete".red(),
            drive.id,
            drive.adapter_id,
            error
        );
    }
}

fn rescan_and_show(station: &mut Station) -> Result<()> {
    station.rescan(ScanOptions::default());
    println!();
    print_overview(&station.overview(), false)
}

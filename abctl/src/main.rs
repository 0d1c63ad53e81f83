// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Command line front end for A/B partition set updates

use std::path::{Path, PathBuf};

use abupdate::{workspace::System, Configuration, Plan, Updater};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::Context, Section};
use pretty_env_logger::formatted_builder;

/// Default location of the optional configuration file
const CONFIG_PATH: &str = "/etc/abupdate.json";

/// Install OS images onto the inactive A/B partition set
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Configuration file (defaults to /etc/abupdate.json when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the sysfs location
    #[arg(long, global = true)]
    sysfs: Option<PathBuf>,

    /// Override the devfs location
    #[arg(long, global = true)]
    devfs: Option<PathBuf>,

    /// Override the procfs location
    #[arg(long, global = true)]
    procfs: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write an image to the inactive set and arm a trial boot of it
    Install { image: PathBuf },

    /// Show what an install would do without writing to any device
    Plan { image: PathBuf },

    /// Show the active and inactive sets
    Status,
}

fn load_config(cli: &Cli) -> color_eyre::Result<Configuration> {
    let path = cli.config.clone().or_else(|| {
        let default = Path::new(CONFIG_PATH);
        default.exists().then(|| default.to_path_buf())
    });

    let mut config = match path {
        Some(path) => Configuration::load(&path)
            .wrap_err(format!("Unable to load configuration from `{}`", path.display()))
            .with_note(|| "The file must be JSON; every field is optional")?,
        None => Configuration::default(),
    };

    if let Some(sysfs) = &cli.sysfs {
        config.vfs.sysfs = sysfs.clone();
    }
    if let Some(devfs) = &cli.devfs {
        config.vfs.devfs = devfs.clone();
    }
    if let Some(procfs) = &cli.procfs {
        config.vfs.procfs = procfs.clone();
    }

    Ok(config)
}

fn print_plan(plan: &Plan) {
    let state = &plan.state;
    let ids = &plan.identifiers;
    println!("Active set:    {} ({})", state.active.label, ids.active_root.tagged());
    println!("Target set:    {} ({})", state.inactive.label, ids.inactive_root.tagged());
    println!(
        "Boot:          {} -> {} ({} of {} sectors from sector {})",
        state.inactive.boot_index,
        state.inactive.boot.display(),
        plan.layout.boot_copy_sectors,
        plan.layout.boot_sectors,
        plan.layout.boot_start
    );
    println!(
        "Root:          {} (from sector {})",
        state.inactive.root.display(),
        plan.layout.root_start
    );
    println!("Layout source: {}", plan.layout.origin);
    println!("Seekable:      {}", if plan.seekable { "yes" } else { "no" });
}

fn main() -> color_eyre::Result<()> {
    color_eyre::config::HookBuilder::default()
        .display_env_section(false)
        .install()?;

    formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    log::trace!("Using configuration: {config:?}");

    let fs = System;
    let updater = Updater::new(&config, &fs)
        .wrap_err("Unable to probe the running system")
        .with_note(|| "sysfs, devfs and procfs must be readable")?;

    match &cli.command {
        Commands::Install { image } => {
            let report = updater
                .update(image)
                .wrap_err(format!("Failed to install `{}`", image.display()))
                .with_warning(|| "The inactive set may be partially written, do not trial boot it")?;
            print_plan(&report.plan);
            println!(
                "Wrote {} boot bytes and {} root bytes",
                report.written.boot, report.written.root
            );
            println!(
                "Armed: boot_partition={} tryboot boot_partition={}",
                report.armed.boot_partition, report.armed.tryboot_partition
            );
        }
        Commands::Plan { image } => {
            let plan = updater
                .plan(image)
                .wrap_err(format!("Unable to plan an install of `{}`", image.display()))?;
            print_plan(&plan);
        }
        Commands::Status => {
            let status = updater
                .status()
                .wrap_err("Unable to determine the partition sets")
                .with_note(|| "The running root must be one of the configured root devices")?;
            let ids = &status.identifiers;
            println!(
                "Active set:   {} boot {} ({}) root {}",
                status.state.active.label,
                status.state.active.boot_index,
                ids.active_boot.tagged(),
                ids.active_root.tagged()
            );
            println!(
                "Inactive set: {} boot {} ({}) root {}",
                status.state.inactive.label,
                status.state.inactive.boot_index,
                ids.inactive_boot.tagged(),
                ids.inactive_root.tagged()
            );
            println!("Home:         {}", ids.home.tagged());
            if let Some(device) = &status.active_boot {
                println!(
                    "Active boot:  {} ({} MiB) mounted at {}{}",
                    device.path.display(),
                    device.size / 1024 / 1024,
                    device
                        .mountpoint
                        .as_ref()
                        .map_or_else(|| "nowhere".to_string(), |m| m.display().to_string()),
                    if status.boot_read_only == Some(true) { " (read-only)" } else { "" }
                );
            }
            match status.autoboot {
                Some(autoboot) => println!(
                    "Autoboot:     boot_partition={} tryboot boot_partition={}{}",
                    autoboot.boot_partition,
                    autoboot.tryboot_partition,
                    if status.is_armed() { " (trial boot armed)" } else { "" }
                ),
                None => println!("Autoboot:     unreadable"),
            }
        }
    }

    Ok(())
}

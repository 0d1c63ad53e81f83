// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Boot configuration for trial booting the inactive set
//!
//! The inactive boot partition gets a command line pointing at its own
//! root, a fallback command line pointing at the active root, a try-boot
//! descriptor and its own autoboot descriptor. The active set only ever
//! has its autoboot descriptor rewritten, as the very last step.

use std::{fs, path::Path};

use crate::{
    file_utils::{write_atomic_vfat, PathExt},
    workspace::{with_writable, Filesystems},
    ActiveState, Configuration, Error, Identifiers,
};

mod cmdline;
pub use cmdline::{Cmdline, Parameter};

mod descriptor;
pub use descriptor::{Autoboot, Tryboot};

/// Primary command line
pub const CMDLINE: &str = "cmdline.txt";

/// Command line used by the try-boot configuration
pub const CMDLINE_FALLBACK: &str = "cmdline_fallback.txt";

/// Try-boot configuration
pub const TRYBOOT: &str = "tryboot.txt";

/// Partition selection
pub const AUTOBOOT: &str = "autoboot.txt";

/// Everything written to the inactive boot partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootArtifacts {
    pub cmdline: Cmdline,
    pub fallback: Cmdline,
    pub tryboot: Tryboot,
    pub autoboot: Autoboot,
}

/// Produces boot configuration for an [`ActiveState`]
#[derive(Debug)]
pub struct Generator<'a> {
    config: &'a Configuration,
    state: &'a ActiveState,
    ids: &'a Identifiers,
}

impl<'a> Generator<'a> {
    pub fn new(config: &'a Configuration, state: &'a ActiveState, ids: &'a Identifiers) -> Self {
        Self { config, state, ids }
    }

    /// Render the inactive set's artifacts
    ///
    /// `image_cmdline` is the command line shipped with the image, when it has one.
    pub fn render(&self, image_cmdline: Option<&str>) -> BootArtifacts {
        let base = match image_cmdline.map(|s| s.parse::<Cmdline>()) {
            Some(Ok(cmdline)) if cmdline.parameters().next().is_some() => cmdline,
            _ => Cmdline::default_for(&self.ids.inactive_root, &self.config.root_fstype),
        };

        BootArtifacts {
            cmdline: base.with_root(&self.ids.inactive_root),
            fallback: base.with_root(&self.ids.active_root),
            tryboot: Tryboot {
                kernel: self.config.kernel.clone(),
                os_prefix_partition: self.state.active.boot_index,
                cmdline: CMDLINE_FALLBACK.to_string(),
            },
            autoboot: Autoboot {
                boot_partition: self.state.inactive.boot_index,
                tryboot_partition: self.state.active.boot_index,
            },
        }
    }

    /// The active set's autoboot descriptor, offering the inactive set for a trial boot
    pub fn active_autoboot(&self) -> Autoboot {
        Autoboot {
            boot_partition: self.state.active.boot_index,
            tryboot_partition: self.state.inactive.boot_index,
        }
    }

    /// Write the artifacts into the inactive boot partition mounted at `boot_mount`
    pub fn write_inactive(&self, boot_mount: &Path) -> Result<BootArtifacts, Error> {
        let existing = boot_mount.join_insensitive(CMDLINE);
        let image_cmdline = if existing.exists() {
            match String::from_utf8(fs::read(&existing)?) {
                Ok(text) => {
                    log::debug!("Using image command line from {}", existing.display());
                    Some(text)
                }
                Err(_) => {
                    log::warn!("{} is not valid UTF-8, using the default command line", existing.display());
                    None
                }
            }
        } else {
            log::info!("Image has no {CMDLINE}, using the default command line");
            None
        };

        let artifacts = self.render(image_cmdline.as_deref());

        write_atomic_vfat(&existing, format!("{}\n", artifacts.cmdline).as_bytes())?;
        write_atomic_vfat(
            boot_mount.join_insensitive(CMDLINE_FALLBACK),
            format!("{}\n", artifacts.fallback).as_bytes(),
        )?;
        write_atomic_vfat(boot_mount.join_insensitive(TRYBOOT), artifacts.tryboot.to_string().as_bytes())?;
        write_atomic_vfat(boot_mount.join_insensitive(AUTOBOOT), artifacts.autoboot.to_string().as_bytes())?;

        log::info!(
            "Set {} boots {} and falls back to {}",
            self.state.inactive.label,
            self.ids.inactive_root.tagged(),
            self.ids.active_root.tagged()
        );

        Ok(artifacts)
    }

    /// Rewrite the active set's autoboot descriptor in place
    ///
    /// A read-only boot mount is made writable for the duration of the write.
    pub fn arm_active(&self, fs: &dyn Filesystems) -> Result<Autoboot, Error> {
        let mount = &self.config.active_boot_mount;
        let autoboot = self.active_autoboot();
        let path = mount.join_insensitive(AUTOBOOT);

        with_writable(fs, mount, || {
            write_atomic_vfat(&path, autoboot.to_string().as_bytes()).map_err(|e| match e {
                Error::IO(source) => Error::NotWritable {
                    path: path.clone(),
                    source,
                },
                e => e,
            })
        })?;

        log::info!(
            "Armed trial boot of set {} (partition {}) from set {}",
            self.state.inactive.label,
            autoboot.tryboot_partition,
            self.state.active.label
        );

        Ok(autoboot)
    }
}

/// Read the autoboot descriptor from a boot partition mounted at `boot_mount`
pub fn read_autoboot(boot_mount: &Path) -> Result<Autoboot, Error> {
    fs::read_to_string(boot_mount.join_insensitive(AUTOBOOT))?.parse()
}

// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Core configuration for A/B updates
//!
//! Every field has a default matching a Raspberry Pi booting from its SD
//! card, so a configuration file only needs to carry the differences.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{Error, Label, PartitionSet};

/// Built-in device table: label, boot device, root device, firmware boot partition index
const DEVICE_TABLE: [(Label, &str, &str, u32); 2] = [
    (Label::A, "/dev/mmcblk0p1", "/dev/mmcblk0p2", 1),
    (Label::B, "/dev/mmcblk0p3", "/dev/mmcblk0p4", 3),
];

/// Shared between both sets, never written by an update
const HOME_DEVICE: &str = "/dev/mmcblk0p5";

/// Where `sysfs`, `devfs` and `procfs` can be found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vfs {
    pub sysfs: PathBuf,
    pub devfs: PathBuf,
    pub procfs: PathBuf,
}

impl Default for Vfs {
    fn default() -> Self {
        Self {
            sysfs: "/sys".into(),
            devfs: "/dev".into(),
            procfs: "/proc".into(),
        }
    }
}

/// Core configuration for update operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// The two partition sets
    pub sets: Vec<PartitionSet>,

    /// Shared home partition
    pub home: PathBuf,

    /// Where the active set's boot partition is mounted on the running system
    pub active_boot_mount: PathBuf,

    /// Boot partition mountpoint recorded in the new fstab
    pub boot_mountpoint: PathBuf,

    /// Home partition mountpoint recorded in the new fstab
    pub home_mountpoint: PathBuf,

    /// Kernel image named by the try-boot descriptor
    pub kernel: String,

    pub boot_fstype: String,
    pub root_fstype: String,
    pub home_fstype: String,

    /// Parent directory for the per-run workspace
    pub workspace: PathBuf,

    pub vfs: Vfs,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            sets: DEVICE_TABLE
                .into_iter()
                .map(|(label, boot, root, boot_index)| PartitionSet {
                    label,
                    boot: boot.into(),
                    root: root.into(),
                    boot_index,
                })
                .collect(),
            home: HOME_DEVICE.into(),
            active_boot_mount: "/boot/firmware".into(),
            boot_mountpoint: "/boot/firmware".into(),
            home_mountpoint: "/home".into(),
            kernel: "kernel8.img".into(),
            boot_fstype: "vfat".into(),
            root_fstype: "ext4".into(),
            home_fstype: "ext4".into(),
            workspace: "/tmp".into(),
            vfs: Vfs::default(),
        }
    }
}

impl Configuration {
    /// Load a JSON configuration, filling missing fields with defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        log::trace!("Reading configuration from: {}", path.display());
        let config: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a set by label
    pub fn set(&self, label: Label) -> Option<&PartitionSet> {
        self.sets.iter().find(|s| s.label == label)
    }

    /// Ensure the device table describes exactly one A and one B set
    /// with no device or boot index used twice
    pub fn validate(&self) -> Result<(), Error> {
        if self.sets.len() != 2 {
            return Err(Error::InvalidTable(format!("expected 2 partition sets, found {}", self.sets.len())));
        }
        for label in [Label::A, Label::B] {
            if self.set(label).is_none() {
                return Err(Error::InvalidTable(format!("missing partition set {label}")));
            }
        }

        let mut seen = HashSet::new();
        for device in self
            .sets
            .iter()
            .flat_map(|s| [&s.boot, &s.root])
            .chain(std::iter::once(&self.home))
        {
            if !seen.insert(device) {
                return Err(Error::InvalidTable(format!("{} is used more than once", device.display())));
            }
        }

        if self.sets[0].boot_index == self.sets[1].boot_index {
            return Err(Error::InvalidTable(format!(
                "both sets boot from partition {}",
                self.sets[0].boot_index
            )));
        }

        Ok(())
    }
}

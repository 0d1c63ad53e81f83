// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Partition sets and the active/inactive mapping of the running system

use std::{fmt, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use topology::disk::probe::Probe;

use crate::{Configuration, Error};

/// Name of a partition set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    A,
    B,
}

impl Label {
    /// The opposing set
    pub fn other(&self) -> Label {
        match self {
            Label::A => Label::B,
            Label::B => Label::A,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::A => f.write_str("A"),
            Label::B => f.write_str("B"),
        }
    }
}

/// One bootable pairing of a boot and root partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSet {
    pub label: Label,

    /// Boot (firmware) partition device
    pub boot: PathBuf,

    /// Root filesystem device
    pub root: PathBuf,

    /// Partition number the firmware uses for `boot_partition=`
    pub boot_index: u32,
}

/// Which set is running and which one is the update target
///
/// Always derived from live mount state, never persisted.
#[derive(Debug, Clone)]
pub struct ActiveState {
    /// Currently mounted as `/`
    pub active: PartitionSet,

    /// Update target
    pub inactive: PartitionSet,

    /// Shared home partition
    pub home: PathBuf,
}

impl ActiveState {
    /// Resolve the mapping from the device currently mounted at `/`
    pub fn resolve(config: &Configuration, probe: &Probe) -> Result<Self, Error> {
        let root = probe.get_device_from_mountpoint("/")?;
        log::debug!("Running root device: {}", root.display());
        Self::for_root_device(config, &root)
    }

    /// Resolve the mapping for a known root device
    pub fn for_root_device(config: &Configuration, root: &Path) -> Result<Self, Error> {
        let active = config
            .sets
            .iter()
            .find(|s| Probe::is_same_device(&s.root, root))
            .ok_or_else(|| Error::UnmanagedRoot(root.into()))?;
        let inactive = config
            .set(active.label.other())
            .ok_or_else(|| Error::InvalidTable(format!("missing partition set {}", active.label.other())))?;

        log::info!(
            "Active set {} ({}), updating set {} ({})",
            active.label,
            active.root.display(),
            inactive.label,
            inactive.root.display()
        );

        Ok(Self {
            active: active.clone(),
            inactive: inactive.clone(),
            home: config.home.clone(),
        })
    }
}

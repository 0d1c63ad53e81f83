// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Loose encapsulation of a path'd block device and what the probe
//! could learn about it.

use std::path::{Path, PathBuf};

use super::probe;

#[derive(Debug)]
pub struct BlockDevice {
    /// Device node
    pub path: PathBuf,

    /// Actively mounted somewhere?
    pub mountpoint: Option<PathBuf>,

    /// Capacity in bytes
    pub size: u64,

    // GPT partition GUID or MBR `disk-NN` identifier
    pub(super) part_uuid: Option<String>,
}

impl BlockDevice {
    pub(super) fn new(probe: &probe::Probe, path: impl AsRef<Path>) -> Result<Self, super::Error> {
        let path = path.as_ref();

        let mountpoint = probe
            .mounts
            .iter()
            .find(|m| probe::Probe::is_same_device(m.device, path))
            .map(|m| PathBuf::from(m.mountpoint));

        Ok(BlockDevice {
            path: path.into(),
            mountpoint,
            size: probe.get_device_size(path)?,
            part_uuid: probe.get_part_uuid(path).ok(),
        })
    }

    /// PARTUUID, if the device carries one
    pub fn part_uuid(&self) -> Option<&str> {
        self.part_uuid.as_deref()
    }
}

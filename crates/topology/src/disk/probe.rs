// SPDX-FileCopyrightText: Copyright © 2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Disk probe/query APIs

use std::{
    fs::{self, File},
    io::{Seek, SeekFrom},
    path::{Path, PathBuf},
};

use nix::sys::stat;

use super::{device::BlockDevice, mounts::Table};

/// A Disk probe to query disks
#[derive(Debug)]
pub struct Probe {
    /// location of /sys
    pub(super) sysfs: PathBuf,

    /// location of /dev
    pub(super) devfs: PathBuf,

    /// location of /proc
    pub(super) procfs: PathBuf,

    /// Mountpoints
    pub(super) mounts: Table,
}

impl Probe {
    /// Initial startup loads
    pub(super) fn init_scan(&mut self) -> Result<(), super::Error> {
        let mounts = Table::new_from_path(self.procfs.join("self").join("mounts"))?;
        self.mounts = mounts;

        Ok(())
    }

    /// The mount table captured when the probe was built
    pub fn mounts(&self) -> &Table {
        &self.mounts
    }

    /// Determine the block device backing `mountpoint`
    ///
    /// The mount table is consulted first. Kernels booted with `root=` often
    /// report the root device as `/dev/root`, which has no device node, so in
    /// that case the device number of the mountpoint is resolved through
    /// `/dev/block` instead.
    pub fn get_device_from_mountpoint(&self, mountpoint: impl AsRef<Path>) -> Result<PathBuf, super::Error> {
        let mountpoint = mountpoint.as_ref();
        let mount = self
            .mounts
            .find(mountpoint)
            .ok_or_else(|| super::Error::UnknownMount(mountpoint.into()))?;

        let device = PathBuf::from(mount.device);
        if device.exists() {
            log::trace!("{} is mounted from {}", mountpoint.display(), device.display());
            Ok(device)
        } else {
            log::debug!(
                "{} has no device node, resolving {} by stat",
                device.display(),
                mountpoint.display()
            );
            self.get_device_by_stat(mountpoint)
        }
    }

    /// Legacy approach to determination of block device by stat
    fn get_device_by_stat(&self, mountpoint: &Path) -> Result<PathBuf, super::Error> {
        let st = stat::stat(mountpoint)?;
        let major = stat::major(st.st_dev);
        let minor = stat::minor(st.st_dev);
        let path = self.devfs.join("block").join(format!("{major}:{minor}"));
        Ok(fs::canonicalize(path)?)
    }

    /// Returns true if both paths name the same device node
    pub fn is_same_device(a: impl AsRef<Path>, b: impl AsRef<Path>) -> bool {
        let (a, b) = (a.as_ref(), b.as_ref());
        if a == b {
            return true;
        }
        match (fs::canonicalize(a), fs::canonicalize(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Resolve the PARTUUID of `device` via `/dev/disk/by-partuuid`
    pub fn get_part_uuid(&self, device: impl AsRef<Path>) -> Result<String, super::Error> {
        let device = device.as_ref();
        let canonical = fs::canonicalize(device).ok();
        let name = device.file_name();

        let links = self.devfs.join("disk").join("by-partuuid");
        for entry in fs::read_dir(&links)?.filter_map(|e| e.ok()) {
            let link = entry.path();
            let matched = match (&canonical, fs::canonicalize(&link)) {
                (Some(ours), Ok(theirs)) => *ours == theirs,
                _ => fs::read_link(&link).is_ok_and(|t| t.file_name() == name),
            };
            if matched {
                let uuid = entry.file_name().to_string_lossy().to_lowercase();
                log::trace!("{}: PARTUUID={uuid}", device.display());
                return Ok(uuid);
            }
        }

        Err(super::Error::NoPartUUID(device.into()))
    }

    /// Capacity of `device` in bytes
    ///
    /// sysfs reports the size in 512 byte sectors regardless of the logical
    /// block size. Devices absent from sysfs (image files, loop backing files)
    /// are measured by seeking to their end.
    pub fn get_device_size(&self, device: impl AsRef<Path>) -> Result<u64, super::Error> {
        let device = device.as_ref();
        if let Some(name) = device.file_name() {
            let size_file = self.sysfs.join("class").join("block").join(name).join("size");
            if size_file.exists() {
                let sectors = fs::read_to_string(&size_file)?
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| super::Error::InvalidSize(size_file))?;
                return Ok(sectors * 512);
            }
        }

        let mut file = File::open(device)?;
        Ok(file.seek(SeekFrom::End(0))?)
    }

    /// Gather everything we know about `device`
    pub fn get_device(&self, device: impl AsRef<Path>) -> Result<BlockDevice, super::Error> {
        BlockDevice::new(self, device)
    }
}

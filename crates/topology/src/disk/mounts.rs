// SPDX-FileCopyrightText: Copyright © 2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Processing of `/proc/self/mounts` & `/etc/mtab`

use std::{fs, io, path::Path};

/// Encapsulates a `/proc/self/mounts` or mtab file, ignoring fstab specific 5&6 columns
#[derive(Debug)]
pub struct Mount<'a> {
    /// Path of device used for mounting
    pub device: &'a str,

    /// Where the device was mounted
    pub mountpoint: &'a str,

    /// The filesystem name
    pub filesystem: &'a str,

    /// Raw mount options
    pub opts: &'a str,
}

/// Filesystem specific mount option, i.e `subvol=root`
#[derive(Debug, PartialEq, Eq)]
pub enum MountOption<'a> {
    /// Simple mount flag
    Flag(&'a str),

    /// Key-value option for a mount
    Option(&'a str, &'a str),
}

impl Mount<'_> {
    /// Convert [`Mount::opts`] into an iterator of typed options
    pub fn options(&self) -> impl Iterator<Item = MountOption> {
        self.opts.split(',').map(|o| {
            if let Some((k, v)) = o.split_once('=') {
                MountOption::Option(k, v)
            } else {
                MountOption::Flag(o)
            }
        })
    }

    /// Mounted without write access
    pub fn is_read_only(&self) -> bool {
        self.options().any(|o| o == MountOption::Flag("ro"))
    }
}

/// Mount table for iterating mount points
#[derive(Debug, Default)]
pub struct Table {
    data: String,
}

impl Table {
    /// New mount table parser for string
    ///
    /// Arguments:
    ///
    /// `data` - Some owned string
    pub fn new(data: String) -> Self {
        Self { data }
    }

    /// Iterate all mount points (no copy)
    pub fn iter(&self) -> impl Iterator<Item = Mount> {
        self.data.lines().filter_map(|i| {
            let mut splits = i.split_ascii_whitespace();
            Some(Mount {
                device: splits.next()?,
                mountpoint: splits.next()?,
                filesystem: splits.next()?,
                opts: splits.next()?,
            })
        })
    }

    /// Find the most recent mount stacked on `mountpoint`
    pub fn find(&self, mountpoint: impl AsRef<Path>) -> Option<Mount> {
        let mountpoint = mountpoint.as_ref();
        self.iter().filter(|m| Path::new(m.mountpoint) == mountpoint).last()
    }

    /// New mount table parser for file
    ///
    /// Arguments:
    ///
    /// `path` - Path to load the mtab from (i.e. `/proc/self/mounts`)
    pub fn new_from_path(path: impl AsRef<Path>) -> Result<Self, io::Error> {
        Ok(Self::new(fs::read_to_string(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::{MountOption, Table};

    const MOUNTS: &str = "/dev/root / ext4 rw,noatime 0 0
devtmpfs /dev devtmpfs rw,relatime,size=1867796k,nr_inodes=466949,mode=755 0 0
/dev/mmcblk0p1 /boot/firmware vfat ro,relatime,fmask=0022,dmask=0022 0 0
/dev/mmcblk0p5 /home ext4 rw,noatime 0 0
";

    #[test]
    fn test_find() {
        let table = Table::new(MOUNTS.into());
        assert_eq!(table.iter().count(), 4);

        let firmware = table.find("/boot/firmware").expect("missing firmware mount");
        assert_eq!(firmware.device, "/dev/mmcblk0p1");
        assert_eq!(firmware.filesystem, "vfat");
        assert!(firmware.is_read_only());
        assert!(firmware.options().any(|o| o == MountOption::Option("fmask", "0022")));

        let root = table.find("/").expect("missing root mount");
        assert_eq!(root.device, "/dev/root");
        assert!(!root.is_read_only());

        assert!(table.find("/srv").is_none());
    }
}

// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Filesystem table for the freshly written root filesystem

use std::{
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::{Configuration, Error, Identifier, Identifiers};

/// One `/etc/fstab` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub identifier: Identifier,
    pub mountpoint: PathBuf,
    pub fstype: String,
    pub options: String,

    /// fsck pass number, `1` for the root filesystem
    pub pass: u8,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {}  {}  {}  0  {}",
            self.identifier.tagged(),
            self.mountpoint.display(),
            self.fstype,
            self.options,
            self.pass
        )
    }
}

/// Root, boot and home entries of a partition set
#[derive(Debug, Clone)]
pub struct Fstab {
    pub entries: Vec<Entry>,
}

impl Fstab {
    /// Entries for the inactive set, which will be running when this table is read
    pub fn for_set(config: &Configuration, ids: &Identifiers) -> Self {
        let boot_options = if config.boot_fstype == "vfat" {
            "defaults,ro"
        } else {
            "ro,noatime"
        };

        Self {
            entries: vec![
                Entry {
                    identifier: ids.inactive_root.clone(),
                    mountpoint: "/".into(),
                    fstype: config.root_fstype.clone(),
                    options: "defaults,noatime".into(),
                    pass: 1,
                },
                Entry {
                    identifier: ids.inactive_boot.clone(),
                    mountpoint: config.boot_mountpoint.clone(),
                    fstype: config.boot_fstype.clone(),
                    options: boot_options.into(),
                    pass: 2,
                },
                Entry {
                    identifier: ids.home.clone(),
                    mountpoint: config.home_mountpoint.clone(),
                    fstype: config.home_fstype.clone(),
                    options: "defaults,noatime".into(),
                    pass: 2,
                },
            ],
        }
    }

    /// Overwrite `etc/fstab` below the root filesystem mounted at `root_mount`
    pub fn write(&self, root_mount: &Path) -> Result<PathBuf, Error> {
        let path = root_mount.join("etc").join("fstab");
        let not_writable = |source| Error::NotWritable {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(root_mount.join("etc")).map_err(not_writable)?;
        let mut file = fs::File::create(&path).map_err(not_writable)?;
        file.write_all(self.to_string().as_bytes()).map_err(not_writable)?;
        file.sync_all().map_err(not_writable)?;

        log::info!("Wrote {}", path.display());
        Ok(path)
    }
}

impl fmt::Display for Fstab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Per-run workspace and mount lifecycle

use std::{
    fs,
    path::{Path, PathBuf},
};

use nix::{
    mount::{mount, umount, MsFlags},
    sys::statvfs::{statvfs, FsFlags},
};

use crate::Error;

/// Mount operations needed by an update
pub trait Filesystems {
    /// Mount `device` (of type `fstype`) read-write at `target`
    fn mount(&self, device: &Path, target: &Path, fstype: &str) -> Result<(), Error>;

    fn unmount(&self, target: &Path) -> Result<(), Error>;

    /// Whether the filesystem at `mountpoint` is mounted read-only
    fn is_read_only(&self, mountpoint: &Path) -> Result<bool, Error>;

    /// Change an existing mount between read-only and read-write
    fn remount(&self, mountpoint: &Path, read_only: bool) -> Result<(), Error>;
}

/// The running kernel's mount API
#[derive(Debug, Default, Clone, Copy)]
pub struct System;

impl Filesystems for System {
    fn mount(&self, device: &Path, target: &Path, fstype: &str) -> Result<(), Error> {
        let options: Option<&str> = None;
        mount(Some(device), target, Some(fstype), MsFlags::MS_MGC_VAL, options).map_err(|source| Error::Mount {
            device: device.into(),
            target: target.into(),
            source,
        })?;
        log::info!("Mounted {fstype} partition {} at {}", device.display(), target.display());
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<(), Error> {
        umount(target).map_err(|source| Error::Unmount {
            target: target.into(),
            source,
        })?;
        log::info!("Unmounted {}", target.display());
        Ok(())
    }

    fn is_read_only(&self, mountpoint: &Path) -> Result<bool, Error> {
        Ok(statvfs(mountpoint)?.flags().contains(FsFlags::ST_RDONLY))
    }

    fn remount(&self, mountpoint: &Path, read_only: bool) -> Result<(), Error> {
        let mut flags = MsFlags::MS_REMOUNT;
        if read_only {
            flags |= MsFlags::MS_RDONLY;
        }
        let none: Option<&str> = None;
        mount(none, mountpoint, none, flags, none).map_err(|source| Error::Mount {
            device: mountpoint.into(),
            target: mountpoint.into(),
            source,
        })?;
        log::info!(
            "Remounted {} {}",
            mountpoint.display(),
            if read_only { "read-only" } else { "read-write" }
        );
        Ok(())
    }
}

/// Encapsulated mountpoint to ensure auto-unmount (Scoped)
pub struct ScopedMount<'a> {
    fs: &'a dyn Filesystems,
    point: PathBuf,
    mounted: bool,
}

impl<'a> ScopedMount<'a> {
    pub fn mount(fs: &'a dyn Filesystems, device: &Path, target: &Path, fstype: &str) -> Result<Self, Error> {
        fs.mount(device, target, fstype)?;
        Ok(Self {
            fs,
            point: target.into(),
            mounted: true,
        })
    }

    pub fn point(&self) -> &Path {
        &self.point
    }

    /// Unmount now, reporting failure
    pub fn unmount(mut self) -> Result<(), Error> {
        self.mounted = false;
        self.fs.unmount(&self.point)
    }
}

impl Drop for ScopedMount<'_> {
    fn drop(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        if let Err(err) = self.fs.unmount(&self.point) {
            log::error!("Failed to umount {}: {err}", self.point.display());
        }
    }
}

/// Run `f` with `mountpoint` writable, restoring a read-only mount afterwards
pub fn with_writable<T>(
    fs: &dyn Filesystems,
    mountpoint: &Path,
    f: impl FnOnce() -> Result<T, Error>,
) -> Result<T, Error> {
    if !fs.is_read_only(mountpoint)? {
        return f();
    }

    fs.remount(mountpoint, false)?;
    let result = f();
    match fs.remount(mountpoint, true) {
        Ok(()) => result,
        Err(err) if result.is_err() => {
            log::error!("Failed to restore {} to read-only: {err}", mountpoint.display());
            result
        }
        Err(err) => Err(err),
    }
}

/// Transient directory owned by a single run
///
/// Holds the `boot` and `root` mountpoints plus scratch files. Dropping the
/// workspace removes its contents without recursing, so a filesystem left
/// mounted inside it is never touched.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn create(base: impl AsRef<Path>) -> Result<Self, Error> {
        let path = nix::unistd::mkdtemp(&base.as_ref().join("abupdate.XXXXXX"))?;
        let workspace = Self { path };
        fs::create_dir(workspace.boot())?;
        fs::create_dir(workspace.rootfs())?;
        log::debug!("Created workspace {}", workspace.path.display());
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mountpoint for the inactive boot partition
    pub fn boot(&self) -> PathBuf {
        self.path.join("boot")
    }

    /// Mountpoint for the inactive root filesystem
    pub fn rootfs(&self) -> PathBuf {
        self.path.join("root")
    }

    /// Location of a scratch file
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(err) => {
                log::error!("Cannot clean up {}: {err}", self.path.display());
                return;
            }
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let res = match entry.file_type() {
                Ok(t) if t.is_dir() => fs::remove_dir(&path),
                _ => fs::remove_file(&path),
            };
            if let Err(err) = res {
                log::error!("Cannot remove {}: {err}", path.display());
            }
        }

        match fs::remove_dir(&self.path) {
            Ok(()) => log::debug!("Removed workspace {}", self.path.display()),
            Err(err) => log::error!("Cannot remove workspace {}: {err}", self.path.display()),
        }
    }
}

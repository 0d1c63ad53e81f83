// SPDX-FileCopyrightText: Copyright © 2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Builder API for constructing the Probe
use std::{fs, path::Path};

use crate::disk::probe::Probe;

use super::mounts::Table;

/// Builder pattern for a Probe
pub struct Builder<'a> {
    sysfs: &'a Path,
    devfs: &'a Path,
    procfs: &'a Path,
}

/// Generate default builder
pub fn new<'a>() -> Builder<'a> {
    Builder {
        sysfs: Path::new("/sys"),
        devfs: Path::new("/dev"),
        procfs: Path::new("/proc"),
    }
}

impl Default for Builder<'_> {
    fn default() -> Self {
        self::new()
    }
}

impl<'a> Builder<'a> {
    // sysfs directory
    pub fn with_sysfs(self, sysfs: &'a Path) -> Self {
        Self { sysfs, ..self }
    }

    /// devfs directory
    pub fn with_devfs(self, devfs: &'a Path) -> Self {
        Self { devfs, ..self }
    }

    // procfs directory
    pub fn with_procfs(self, procfs: &'a Path) -> Self {
        Self { procfs, ..self }
    }

    /// Return a newly built Probe
    /// Note: All input paths will be verified
    pub fn build(self) -> Result<Probe, super::Error> {
        let mut result = Probe {
            sysfs: fs::canonicalize(self.sysfs)?,
            devfs: fs::canonicalize(self.devfs)?,
            procfs: fs::canonicalize(self.procfs)?,
            mounts: Table::default(),
        };
        result.init_scan()?;
        Ok(result)
    }
}

// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Firmware boot selection descriptors (`autoboot.txt`, `tryboot.txt`)

use std::{fmt, str::FromStr};

use crate::Error;

/// Contents of `autoboot.txt`
///
/// The firmware boots `boot_partition` normally and `tryboot_partition`
/// for a single boot when the tryboot flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Autoboot {
    pub boot_partition: u32,
    pub tryboot_partition: u32,
}

impl fmt::Display for Autoboot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[all]\ntryboot_a_b=1\nboot_partition={}\n\n[tryboot]\nboot_partition={}\n",
            self.boot_partition, self.tryboot_partition
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Section {
    All,
    Tryboot,
    Unknown,
}

impl FromStr for Autoboot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut section = Section::Unknown;
        let mut boot = None;
        let mut tryboot = None;

        for line in s.lines().map(|l| l.trim()) {
            if line.starts_with('[') {
                section = match line {
                    "[all]" => Section::All,
                    "[tryboot]" => Section::Tryboot,
                    _ => Section::Unknown,
                };
                continue;
            }

            let Some(value) = line.strip_prefix("boot_partition=") else {
                continue;
            };
            let index = value
                .trim()
                .parse::<u32>()
                .map_err(|_| Error::Autoboot("boot_partition is not a number"))?;
            match section {
                Section::All => boot = Some(index),
                Section::Tryboot => tryboot = Some(index),
                Section::Unknown => {}
            }
        }

        Ok(Self {
            boot_partition: boot.ok_or(Error::Autoboot("no boot_partition in [all]"))?,
            tryboot_partition: tryboot.ok_or(Error::Autoboot("no boot_partition in [tryboot]"))?,
        })
    }
}

/// Contents of `tryboot.txt`, the configuration used for a trial boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tryboot {
    /// Kernel image name
    pub kernel: String,

    /// Partition whose files are loaded through `os_prefix`
    pub os_prefix_partition: u32,

    /// Command line file relative to the prefix
    pub cmdline: String,
}

impl fmt::Display for Tryboot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kernel={}\nos_prefix={}:/\ncmdline={}\n",
            self.kernel, self.os_prefix_partition, self.cmdline
        )
    }
}

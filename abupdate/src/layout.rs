// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Partition layout of a disk image
//!
//! Only the leading sectors of the image are decompressed to find where
//! the boot and root filesystems start. An image whose table cannot be
//! read falls back to the conventional Raspberry Pi OS layout.

use std::{fmt, fs, path::Path};

use ptable::{PROBE_BYTES, SECTOR_SIZE};

use crate::{file_utils::fill_buffer, image::ImageSource, Error};

/// Default first sector of the boot partition
pub const DEFAULT_BOOT_START: u64 = 8192;

/// Default boot partition size in sectors (256 MiB)
pub const DEFAULT_BOOT_SECTORS: u64 = 524288;

/// Default first sector of the root partition
pub const DEFAULT_ROOT_START: u64 = 532480;

const SECTORS_PER_MIB: u64 = 1024 * 1024 / SECTOR_SIZE;

/// Where the layout values came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Decoded from the image's own partition table
    Table(ptable::Kind),

    /// Built-in defaults
    Defaults,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Table(kind) => write!(f, "{kind} partition table"),
            Origin::Defaults => f.write_str("defaults"),
        }
    }
}

/// Boot and root extents within an image, in 512 byte sectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    pub boot_start: u64,

    /// Size of the boot partition as recorded in the image
    pub boot_sectors: u64,

    /// How much of the boot partition will be copied, never more than `boot_sectors`
    pub boot_copy_sectors: u64,

    pub root_start: u64,

    pub origin: Origin,
}

impl ImageLayout {
    /// The layout assumed when the image cannot tell us
    pub fn defaults() -> Self {
        Self {
            boot_start: DEFAULT_BOOT_START,
            boot_sectors: DEFAULT_BOOT_SECTORS,
            boot_copy_sectors: DEFAULT_BOOT_SECTORS,
            root_start: DEFAULT_ROOT_START,
            origin: Origin::Defaults,
        }
    }

    /// Build a layout from a decoded table, first entry boot and second root
    pub fn from_table(table: &ptable::Table) -> Option<Self> {
        let boot = table.nth(0)?;
        let root = table.nth(1)?;
        Some(Self {
            boot_start: boot.first_lba,
            boot_sectors: boot.sectors(),
            boot_copy_sectors: boot.sectors(),
            root_start: root.first_lba,
            origin: Origin::Table(table.kind),
        })
    }

    /// Limit the boot copy to a target of `capacity` bytes
    pub fn clamp_to(mut self, capacity: u64) -> Self {
        let capacity_sectors = capacity / SECTOR_SIZE;
        if self.boot_sectors > capacity_sectors {
            log::warn!(
                "Image boot partition is {} MiB but the target holds {} MiB, truncating the copy",
                self.boot_sectors / SECTORS_PER_MIB,
                capacity_sectors / SECTORS_PER_MIB
            );
            self.boot_copy_sectors = capacity_sectors;
        } else {
            self.boot_copy_sectors = self.boot_sectors;
        }
        self
    }

    /// Whether the boot copy was truncated to fit the target
    pub fn is_clamped(&self) -> bool {
        self.boot_copy_sectors < self.boot_sectors
    }

    pub fn boot_offset(&self) -> u64 {
        self.boot_start * SECTOR_SIZE
    }

    pub fn boot_copy_bytes(&self) -> u64 {
        self.boot_copy_sectors * SECTOR_SIZE
    }

    pub fn root_offset(&self) -> u64 {
        self.root_start * SECTOR_SIZE
    }
}

/// Determine the layout of `source`, clamped to a boot target of `capacity` bytes
///
/// The probed sectors are kept at `scratch` for inspection while the run lasts.
pub fn inspect(source: &dyn ImageSource, capacity: u64, scratch: impl AsRef<Path>) -> Result<ImageLayout, Error> {
    let scratch = scratch.as_ref();

    let mut head = vec![0u8; PROBE_BYTES];
    let len = fill_buffer(&mut head, &mut source.open_at(0)?)?;
    head.truncate(len);
    fs::write(scratch, &head)?;
    log::trace!("Saved {len} leading bytes of the image to {}", scratch.display());

    let layout = match ptable::for_bytes(&head) {
        Ok(table) => ImageLayout::from_table(&table).unwrap_or_else(|| {
            log::warn!(
                "Image has {} partition(s), expected boot and root. Using default layout",
                table.partitions.len()
            );
            ImageLayout::defaults()
        }),
        Err(e) => {
            log::warn!("Unable to read image partition table ({e}). Using default layout");
            ImageLayout::defaults()
        }
    }
    .clamp_to(capacity);

    log::info!(
        "Image layout ({}): boot at sector {} ({} sectors, copying {}), root at sector {}",
        layout.origin,
        layout.boot_start,
        layout.boot_sectors,
        layout.boot_copy_sectors,
        layout.root_start
    );

    Ok(layout)
}

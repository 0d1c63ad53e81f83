// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Stream image partitions onto raw block devices

use std::{
    fs::OpenOptions,
    io::{Read, Write},
    path::Path,
    time::Instant,
};

use crate::{file_utils::fill_buffer, image::ImageSource, layout::ImageLayout, Error, PartitionSet};

/// Size of each read/write cycle
const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Bytes written to each device of a set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Written {
    pub boot: u64,
    pub root: u64,
}

/// Copies the boot and root partitions of an image onto a partition set
#[derive(Debug)]
pub struct Installer<'a> {
    source: &'a dyn ImageSource,
    layout: ImageLayout,
}

impl<'a> Installer<'a> {
    pub fn new(source: &'a dyn ImageSource, layout: ImageLayout) -> Self {
        Self { source, layout }
    }

    /// Write boot, then root, of the image onto `set`
    ///
    /// The devices are overwritten in place: never created or truncated,
    /// so anything past the copied length is left untouched.
    pub fn install(&self, set: &PartitionSet) -> Result<Written, Error> {
        log::info!(
            "Writing boot partition to {} ({} bytes from image offset {})",
            set.boot.display(),
            self.layout.boot_copy_bytes(),
            self.layout.boot_offset()
        );
        let mut reader = self.source.open_at(self.layout.boot_offset())?;
        let boot = copy_to_device(&mut reader, &set.boot, Some(self.layout.boot_copy_bytes()))?;
        if boot < self.layout.boot_copy_bytes() {
            return Err(Error::ShortImage {
                offset: self.layout.boot_offset() + self.layout.boot_copy_bytes(),
                missing: self.layout.boot_copy_bytes() - boot,
            });
        }
        drop(reader);

        log::info!(
            "Writing root partition to {} (from image offset {})",
            set.root.display(),
            self.layout.root_offset()
        );
        let mut reader = self.source.open_at(self.layout.root_offset())?;
        let root = copy_to_device(&mut reader, &set.root, None)?;

        Ok(Written { boot, root })
    }
}

/// Copy up to `limit` bytes (or everything) from `reader` onto `device`
fn copy_to_device(reader: &mut dyn Read, device: &Path, limit: Option<u64>) -> Result<u64, Error> {
    let write_err = |source| Error::Write {
        device: device.into(),
        source,
    };

    let mut output = OpenOptions::new().write(true).open(device).map_err(write_err)?;

    let mut buffer = vec![0u8; BLOCK_SIZE];
    let mut total: u64 = 0;
    let start = Instant::now();

    loop {
        let want = match limit {
            Some(limit) => (limit - total).min(BLOCK_SIZE as u64) as usize,
            None => BLOCK_SIZE,
        };
        if want == 0 {
            break;
        }

        let filled = fill_buffer(&mut buffer[..want], reader)?;
        if filled == 0 {
            break;
        }
        output.write_all(&buffer[..filled]).map_err(write_err)?;
        total += filled as u64;

        if filled < want {
            break;
        }
    }

    output.flush().map_err(write_err)?;
    output.sync_all().map_err(write_err)?;

    let elapsed = start.elapsed().as_secs_f64();
    let rate = if elapsed > 0.0 {
        total as f64 / elapsed / 1024.0 / 1024.0
    } else {
        0.0
    };
    log::info!(
        "Wrote {total} bytes ({} MiB) to {} in {elapsed:.1}s @ {rate:.1} MiB/s",
        total / 1024 / 1024,
        device.display()
    );

    Ok(total)
}

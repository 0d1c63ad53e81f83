// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Partition table decoding for the leading sectors of a disk image
//!
//! Only the first [`PROBE_SECTORS`] sectors of an image are ever consulted:
//! LBA 0 holds the MBR (or the protective MBR), LBA 1 the primary GPT header
//! and LBA 2..34 a standard 128 entry GPT array. This makes it possible to
//! recover the layout of a compressed image by decompressing a tiny prefix.

use std::io::{self, Cursor};

use thiserror::Error;

pub mod gpt;
pub mod mbr;

/// All offsets are expressed in 512 byte sectors
pub const SECTOR_SIZE: u64 = 512;

/// Sectors required to cover the MBR, GPT header and GPT entry array
pub const PROBE_SECTORS: u64 = 34;

/// [`PROBE_SECTORS`] in bytes
pub const PROBE_BYTES: usize = (PROBE_SECTORS * SECTOR_SIZE) as usize;

/// Supported partition table kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    MBR,
    GPT,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            Kind::MBR => f.write_str("dos"),
            Kind::GPT => f.write_str("gpt"),
        }
    }
}

/// A single used partition entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// 1-based index within the table
    pub index: u32,

    /// First sector of the partition
    pub first_lba: u64,

    /// Last sector of the partition (inclusive)
    pub last_lba: u64,

    /// Partition UUID as it would appear in `/dev/disk/by-partuuid`
    pub part_uuid: Option<String>,
}

impl Partition {
    /// Ordered extent whose byte offsets fit in a u64
    fn is_addressable(&self) -> bool {
        self.first_lba <= self.last_lba && self.last_lba.checked_mul(SECTOR_SIZE).is_some()
    }

    /// Size of the partition in sectors
    pub fn sectors(&self) -> u64 {
        self.last_lba - self.first_lba + 1
    }
}

/// Decoded partition table, used entries only, ordered by index
#[derive(Debug)]
pub struct Table {
    pub kind: Kind,

    /// Disk identifier (MBR signature or GPT disk GUID)
    pub identifier: Option<String>,

    pub partitions: Vec<Partition>,
}

impl Table {
    /// Return the nth used partition (0-based, in index order)
    pub fn nth(&self, n: usize) -> Option<&Partition> {
        self.partitions.get(n)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing boot signature")]
    InvalidMagic,

    #[error("need {needed} bytes to decode the table, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("primary GPT header describes an impossible entry array")]
    InvalidHeader,

    #[error("partition {0} has an impossible extent")]
    InvalidEntry(u32),

    #[error("no used partitions")]
    Empty,

    #[error("io: {0}")]
    IO(#[from] io::Error),
}

/// Attempt to decode a partition table from the leading bytes of a disk
pub fn for_bytes(data: &[u8]) -> Result<Table, Error> {
    let mbr = mbr::from_reader(&mut Cursor::new(data))?;

    let table = if mbr.is_protective() {
        log::trace!("protective MBR found, decoding GPT");
        gpt::from_bytes(data)?
    } else {
        mbr.table()?
    };

    if table.partitions.is_empty() {
        return Err(Error::Empty);
    }
    if let Some(bad) = table.partitions.iter().find(|p| !p.is_addressable()) {
        return Err(Error::InvalidEntry(bad.index));
    }

    log::trace!(
        "{}: {} partition(s), identifier={:?}",
        table.kind,
        table.partitions.len(),
        table.identifier
    );

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::{for_bytes, Error, Kind, PROBE_BYTES};

    #[test]
    fn test_garbage() {
        let data = vec![0x5a; PROBE_BYTES];
        assert!(matches!(for_bytes(&data), Err(Error::InvalidMagic)));
    }

    #[test]
    fn test_short_read() {
        let data = vec![0u8; 100];
        assert!(for_bytes(&data).is_err());
    }

    #[test]
    fn test_dispatch_mbr() {
        let mut data = vec![0u8; PROBE_BYTES];
        data[510] = 0x55;
        data[511] = 0xaa;
        // single FAT32 LBA record, start 8192, 8192 sectors
        data[446 + 4] = 0x0c;
        data[446 + 8..446 + 12].copy_from_slice(&8192u32.to_le_bytes());
        data[446 + 12..446 + 16].copy_from_slice(&8192u32.to_le_bytes());

        let table = for_bytes(&data).expect("Failed to decode table");
        assert_eq!(table.kind, Kind::MBR);
        assert_eq!(table.partitions.len(), 1);
        assert_eq!(table.partitions[0].sectors(), 8192);
    }
}

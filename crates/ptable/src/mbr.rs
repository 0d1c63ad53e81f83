// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! DOS/MBR partition table handling

use std::{io::Read, slice};

use crate::{Error, Kind, Partition, Table};

const MAGIC: [u8; 2] = [0x55, 0xaa];

/// Protective MBR record type, indicates a GPT disk
const TYPE_PROTECTIVE: u8 = 0xee;

/// Extended partition containers. Logical partitions live outside of LBA 0
const TYPE_EXTENDED: [u8; 3] = [0x05, 0x0f, 0x85];

/// One of the four primary partition records
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Record {
    status: u8,
    chs_first: [u8; 3],
    kind: u8,
    chs_last: [u8; 3],
    lba_first: [u8; 4],
    sectors: [u8; 4],
}

impl Record {
    /// Partition type byte
    pub fn kind(&self) -> u8 {
        self.kind
    }

    /// First sector (LBA) of the partition
    pub fn first_lba(&self) -> u64 {
        u32::from_le_bytes(self.lba_first) as u64
    }

    /// Size of the partition in sectors
    pub fn sectors(&self) -> u64 {
        u32::from_le_bytes(self.sectors) as u64
    }

    fn is_used(&self) -> bool {
        self.kind != 0 && self.sectors() != 0
    }
}

/// Master boot record as found at LBA 0
#[repr(C, packed)]
pub struct Mbr {
    bootstrap: [u8; 440],
    disk_signature: [u8; 4],
    reserved: [u8; 2],
    records: [Record; 4],
    magic: [u8; 2],
}

/// Attempt to decode the MBR from the given read stream
pub fn from_reader<R: Read>(reader: &mut R) -> Result<Mbr, Error> {
    const SIZE: usize = std::mem::size_of::<Mbr>();
    let mut data: Mbr = unsafe { std::mem::zeroed() };
    let data_sliced = unsafe { slice::from_raw_parts_mut(&mut data as *mut _ as *mut u8, SIZE) };
    reader.read_exact(data_sliced)?;

    if data.magic != MAGIC {
        Err(Error::InvalidMagic)
    } else {
        log::trace!("mbr: valid magic, disk identifier {}", data.identifier());
        Ok(data)
    }
}

impl Mbr {
    /// Disk identifier, the prefix of every MBR PARTUUID
    pub fn identifier(&self) -> String {
        format!("{:08x}", u32::from_le_bytes(self.disk_signature))
    }

    /// Whether this is a protective MBR fronting a GPT
    pub fn is_protective(&self) -> bool {
        let records = self.records;
        records.iter().any(|r| r.kind() == TYPE_PROTECTIVE)
    }

    /// Primary records in slot order
    pub fn records(&self) -> [Record; 4] {
        self.records
    }

    /// Convert the used primary records into a [`Table`]
    pub fn table(&self) -> Result<Table, Error> {
        let identifier = self.identifier();
        let partitions = self
            .records()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_used())
            .filter(|(i, r)| {
                if TYPE_EXTENDED.contains(&r.kind()) {
                    log::debug!("mbr: skipping extended container in slot {}", i + 1);
                    false
                } else {
                    true
                }
            })
            .map(|(i, r)| {
                let index = i as u32 + 1;
                Partition {
                    index,
                    first_lba: r.first_lba(),
                    last_lba: r.first_lba() + r.sectors() - 1,
                    part_uuid: Some(format!("{identifier}-{index:02}")),
                }
            })
            .collect::<Vec<_>>();

        Ok(Table {
            kind: Kind::MBR,
            identifier: Some(identifier),
            partitions,
        })
    }
}

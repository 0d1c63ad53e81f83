// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! GPT decoding from an in-memory image prefix
//!
//! The backup header lives at the end of the disk and is unavailable when
//! only a prefix of the image exists, so only the primary header and the
//! entry array are consulted.

use std::io::Cursor;

use ::gpt::{disk::LogicalBlockSize, header, partition};

use crate::{Error, Kind, Partition, Table, SECTOR_SIZE};

/// Decode the primary GPT found in `data`
pub fn from_bytes(data: &[u8]) -> Result<Table, Error> {
    let mut cursor = Cursor::new(data);
    let header = header::read_header_from_arbitrary_device(&mut cursor, LogicalBlockSize::Lb512)?;

    let needed = header
        .part_start
        .checked_mul(SECTOR_SIZE)
        .and_then(|start| start.checked_add(header.num_parts as u64 * header.part_size as u64))
        .and_then(|end| usize::try_from(end).ok())
        .ok_or(Error::InvalidHeader)?;
    if data.len() < needed {
        return Err(Error::Truncated {
            needed,
            got: data.len(),
        });
    }

    let entries = partition::file_read_partitions(&mut cursor, &header, LogicalBlockSize::Lb512)?;
    let partitions = entries
        .iter()
        .filter(|(_, p)| p.is_used())
        .map(|(index, p)| Partition {
            index: *index,
            first_lba: p.first_lba,
            last_lba: p.last_lba,
            part_uuid: Some(p.part_guid.hyphenated().to_string()),
        })
        .collect::<Vec<_>>();

    Ok(Table {
        kind: Kind::GPT,
        identifier: Some(header.disk_guid.hyphenated().to_string()),
        partitions,
    })
}

// SPDX-FileCopyrightText: Copyright © 2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Disk probe/query APIs

use std::path::PathBuf;

use thiserror::Error;

pub mod builder;
pub mod device;
pub mod mounts;
pub mod probe;

#[derive(Debug, Error)]
pub enum Error {
    #[error("from io: {0}")]
    IO(#[from] std::io::Error),

    #[error("no `mounts` entry for {0}")]
    UnknownMount(PathBuf),

    #[error("no PARTUUID for {0}")]
    NoPartUUID(PathBuf),

    #[error("invalid sysfs size for {0}")]
    InvalidSize(PathBuf),

    #[error("lowlevel C stdlib error: {0}")]
    Errno(#[from] nix::errno::Errno),
}

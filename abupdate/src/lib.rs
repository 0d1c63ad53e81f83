// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! A/B partition set updates with firmware trial boot
//!
//! An image is streamed onto the inactive boot/root pair while the active
//! pair keeps running. The inactive pair is then configured to boot, and the
//! active autoboot descriptor is armed so a `tryboot` reboot attempts the new
//! pair once, falling back to the current one on failure.

use std::{io, path::PathBuf};

use thiserror::Error;

mod config;
pub use config::{Configuration, Vfs};

mod partition_set;
pub use partition_set::{ActiveState, Label, PartitionSet};

mod identifier;
pub use identifier::{Identifier, IdentifierLookup, Identifiers};

pub mod bootconfig;
pub mod file_utils;
pub mod fstab;
pub mod image;
pub mod installer;
pub mod layout;
pub mod workspace;

mod manager;
pub use manager::{Plan, Report, Status, Updater};

/// Re-export the topology APIs
pub use topology::disk;

/// Core error type for abupdate
#[derive(Debug, Error)]
pub enum Error {
    #[error("c stdlib: {0}")]
    C(#[from] nix::errno::Errno),

    #[error("generic i/o error: {0}")]
    IO(#[from] io::Error),

    #[error("topology scan: {0}")]
    Topology(#[from] topology::disk::Error),

    #[error("configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid device table: {0}")]
    InvalidTable(String),

    #[error("image not found: {0}")]
    MissingImage(PathBuf),

    #[error("unsupported image format: {0}")]
    UnsupportedImage(PathBuf),

    #[error("root device {0} does not belong to a known partition set")]
    UnmanagedRoot(PathBuf),

    #[error("no identifier for {0}")]
    NoIdentifier(PathBuf),

    #[error("{first} and {second} share the identifier {id}")]
    DuplicateIdentifier { first: PathBuf, second: PathBuf, id: String },

    #[error("image ended {missing} bytes short of byte {offset}")]
    ShortImage { offset: u64, missing: u64 },

    #[error("failed to write {device}: {source}")]
    Write {
        device: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to mount {device} at {target}: {source}")]
    Mount {
        device: PathBuf,
        target: PathBuf,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("failed to unmount {target}: {source}")]
    Unmount {
        target: PathBuf,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("{path} is not writable: {source}")]
    NotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed autoboot descriptor: {0}")]
    Autoboot(&'static str),
}

// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Stable partition identifiers (PARTUUID)
//!
//! Generated boot configuration never names device paths, only the
//! identifiers resolved here.

use std::{fmt, path::Path, path::PathBuf};

use topology::disk::probe::Probe;

use crate::{ActiveState, Error};

/// A PARTUUID bound to a block device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Key used when referring to the identifier from `root=` or fstab
    pub const PREFIX: &'static str = "PARTUUID";

    /// Wrap a raw identifier, rejecting blank values
    pub fn new(value: impl AsRef<str>) -> Option<Self> {
        let value = value.as_ref().trim();
        if value.is_empty() || value.contains(char::is_whitespace) {
            None
        } else {
            Some(Self(value.to_lowercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `PARTUUID=<id>`
    pub fn tagged(&self) -> String {
        format!("{}={}", Self::PREFIX, self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves the identifier of a device
pub trait IdentifierLookup {
    fn identifier(&self, device: &Path) -> Result<Identifier, Error>;
}

impl IdentifierLookup for Probe {
    fn identifier(&self, device: &Path) -> Result<Identifier, Error> {
        let uuid = self.get_part_uuid(device).map_err(|e| {
            log::debug!("PARTUUID lookup for {} failed: {e}", device.display());
            Error::NoIdentifier(device.into())
        })?;
        Identifier::new(uuid).ok_or_else(|| Error::NoIdentifier(device.into()))
    }
}

/// Identifiers of every device an update touches or references
#[derive(Debug, Clone)]
pub struct Identifiers {
    pub inactive_boot: Identifier,
    pub inactive_root: Identifier,
    pub active_boot: Identifier,
    pub active_root: Identifier,
    pub home: Identifier,
}

impl Identifiers {
    /// Resolve and cross-check all five identifiers
    ///
    /// Must succeed before anything is written: a missing or shared
    /// identifier would produce an unbootable command line or fstab.
    pub fn lookup(state: &ActiveState, lookup: &dyn IdentifierLookup) -> Result<Self, Error> {
        let ids = Self {
            inactive_boot: lookup.identifier(&state.inactive.boot)?,
            inactive_root: lookup.identifier(&state.inactive.root)?,
            active_boot: lookup.identifier(&state.active.boot)?,
            active_root: lookup.identifier(&state.active.root)?,
            home: lookup.identifier(&state.home)?,
        };

        let pairs = [
            (&state.inactive.boot, &ids.inactive_boot),
            (&state.inactive.root, &ids.inactive_root),
            (&state.active.boot, &ids.active_boot),
            (&state.active.root, &ids.active_root),
            (&state.home, &ids.home),
        ];
        for (i, (device, id)) in pairs.iter().enumerate() {
            log::debug!("{}: {}", device.display(), id.tagged());
            if let Some((other, _)) = pairs[..i].iter().find(|(_, seen)| seen == id) {
                return Err(Error::DuplicateIdentifier {
                    first: PathBuf::from(other),
                    second: PathBuf::from(device),
                    id: id.to_string(),
                });
            }
        }

        Ok(ids)
    }
}

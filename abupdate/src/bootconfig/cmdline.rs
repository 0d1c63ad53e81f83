// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Kernel command line handling
//!
//! A command line is kept as an ordered list of parameters so single
//! entries can be replaced without disturbing the rest of the line.

use std::{convert::Infallible, fmt, str::FromStr};

use crate::Identifier;

/// A single `key` or `key=value` parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub key: String,
    pub value: Option<String>,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={value}", self.key),
            None => f.write_str(&self.key),
        }
    }
}

/// Ordered kernel command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmdline {
    parameters: Vec<Parameter>,
}

impl FromStr for Cmdline {
    type Err = Infallible;

    /// Comment lines are dropped and the remaining lines joined
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parameters = s
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.starts_with('#'))
            .flat_map(|l| l.split_ascii_whitespace())
            .map(|p| match p.split_once('=') {
                Some((key, value)) => Parameter {
                    key: key.to_string(),
                    value: Some(value.to_string()),
                },
                None => Parameter {
                    key: p.to_string(),
                    value: None,
                },
            })
            .collect();
        Ok(Self { parameters })
    }
}

impl fmt::Display for Cmdline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self.parameters.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(" ");
        f.write_str(&line)
    }
}

impl Cmdline {
    /// The command line used when an image ships none
    pub fn default_for(root: &Identifier, rootfstype: &str) -> Self {
        let mut cmdline = Self::default();
        cmdline.set("console", Some("serial0,115200"));
        cmdline.push("console", Some("tty1"));
        cmdline.set("root", Some(&root.tagged()));
        cmdline.set("rootfstype", Some(rootfstype));
        cmdline.set("fsck.repair", Some("yes"));
        cmdline.set("rootwait", None);
        cmdline
    }

    /// Value of the first `key` parameter, `Some(None)` for a bare flag
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.parameters
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_deref())
    }

    /// Replace the first `key` parameter in place, appending when absent
    ///
    /// Later duplicates of `key` are removed so the result is unambiguous.
    pub fn set(&mut self, key: &str, value: Option<&str>) {
        let value = value.map(str::to_string);
        match self.parameters.iter().position(|p| p.key == key) {
            Some(first) => {
                self.parameters[first].value = value;
                let mut index = 0;
                self.parameters.retain(|p| {
                    let keep = index <= first || p.key != key;
                    index += 1;
                    keep
                });
            }
            None => self.push(key, value.as_deref()),
        }
    }

    /// Append a parameter, even if `key` is already present
    pub fn push(&mut self, key: &str, value: Option<&str>) {
        self.parameters.push(Parameter {
            key: key.to_string(),
            value: value.map(str::to_string),
        });
    }

    /// Copy of this command line booting from `root`
    pub fn with_root(&self, root: &Identifier) -> Self {
        let mut cmdline = self.clone();
        cmdline.set("root", Some(&root.tagged()));
        cmdline
    }

    /// The `root=` value, if any
    pub fn root(&self) -> Option<&str> {
        self.get("root").flatten()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }
}

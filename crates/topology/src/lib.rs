// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Live system topology: mount table, partition identifiers and device geometry

pub mod disk;

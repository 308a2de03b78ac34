// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules over the shared database handle.

pub mod generations;
pub mod providers;
pub mod tasks;

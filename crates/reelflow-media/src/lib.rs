// SPDX-FileCopyrightText: 2026 Reelflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media localization for the Reelflow pipeline.
//!
//! Two symmetric concerns: making remote/ephemeral AI outputs durable under
//! the local storage root, and rewriting local references into forms an
//! external provider can actually dereference.

pub mod localizer;
pub mod outbound;

pub use localizer::MediaStore;
pub use outbound::OutboundResolver;

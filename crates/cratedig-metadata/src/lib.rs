// SPDX-License-Identifier: GPL-3.0-or-later

//! Client for the external recording-metadata service (C4): fills gaps
//! the catalog client leaves empty, by recording id or ISRC.

pub mod client;
pub mod error;
pub mod models;

#[cfg(test)]
mod client_tests;

pub use client::MetadataClient;
pub use error::{MetadataError, Result};
pub use models::RecordingMetadata;

//! Wire types of the libpod REST API
//!
//! These mirror the JSON payloads exchanged with the remote engine. Field
//! names follow the remote API exactly, so most structs carry serde renames.

pub mod container;
pub mod image;
pub mod network;
pub mod secret;

pub use container::*;
pub use image::*;
pub use network::*;
pub use secret::*;

/// Versioned prefix of every libpod endpoint, relative to the base URL
pub const API_PREFIX: &str = "v5.0.0/libpod";

//! URL handling module for Market-Refresh
//!
//! This module builds per-market download endpoints, normalizes redirect
//! targets, and reads package name and version code out of resolved binary
//! file names.

mod filename;
mod normalize;

pub use filename::{has_binary_extension, parse_package_file};
pub use normalize::{build_download_url, normalize_location};

//! Minimal reader and builder for the Singularity Image Format (SIF).
//!
//! Corral plugins are shipped as SIF images. This crate understands just
//! enough of the format to open an image, enumerate its data objects and
//! assemble new images:
//!
//! - [`SifImage`]: a parsed, bounds-checked image held in memory
//! - [`Header`] / [`Descriptor`]: the global header and descriptor table entries
//! - [`SifBuilder`] / [`ObjectInput`]: assemble a new image from data objects
//!
//! # Layout
//!
//! ```text
//! +----------------+  0
//! | global header  |  128 bytes
//! +----------------+
//! | descriptors    |  dtotal * 585 bytes
//! +----------------+
//! | object data    |
//! +----------------+
//! ```
//!
//! All integers are little-endian.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod builder;
pub mod descriptor;
pub mod error;
pub mod image;

pub use builder::{ObjectInput, SifBuilder};
pub use descriptor::{Arch, DataType, Descriptor, FsType, PartType, PartitionInfo};
pub use error::{SifError, SifResult};
pub use image::{Header, SifImage};

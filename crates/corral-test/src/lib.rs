//! Corral Test - Shared test utilities for the Corral plugin system.
//!
//! Provides plugin image fixtures and scratch install roots for use as a
//! dev-dependency.
//!
//! ```rust,ignore
//! use corral_test::{ScratchLibexec, plugin_image};
//!
//! let libexec = ScratchLibexec::new();
//! let image = plugin_image("hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;

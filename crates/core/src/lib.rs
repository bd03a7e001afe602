//! Mercato Core - Shared types library.
//!
//! This crate provides common types used across the Mercato components:
//! - `storefront` - JSON storefront service over the record backend
//! - `integration-tests` - In-process end-to-end tests
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. Record IDs,
//! emails, prices and statuses are validated here so both the storefront and
//! its tests agree on what a well-formed value looks like.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for record IDs, prices, emails, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

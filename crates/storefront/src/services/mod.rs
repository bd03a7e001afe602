//! Business logic services for storefront.
//!
//! # Services
//!
//! - `auth` - Password sign-in through the record backend
//! - `catalog` - Cached product listing and detail reads
//! - `checkout` - Order placement and order history

pub mod auth;
pub mod catalog;
pub mod checkout;

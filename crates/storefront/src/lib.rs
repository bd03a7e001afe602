//! Mercato storefront library.
//!
//! A JSON storefront API over a record backend: catalog reads, an
//! optimistic wishlist, a session cart and checkout. Exposed as a library
//! so the router can be driven from integration tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

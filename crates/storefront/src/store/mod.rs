//! Client-side state stores.
//!
//! # Architecture
//!
//! - [`Store`] holds immutable snapshots and notifies subscribers on change
//! - [`MembershipSync`] applies wishlist changes optimistically and rolls
//!   them back when the backend refuses
//! - [`CartStore`] keeps the cart locally, mirrored into the session
//! - [`StoreRegistry`] scopes one bundle of stores to each browser session

pub mod cart;
mod inflight;
pub mod membership;
pub mod reactive;
mod registry;
pub mod sync;

pub use cart::{CartLine, CartMirror, CartState, CartStore, MAX_LINE_QUANTITY, MirrorError};
pub use inflight::{InflightGuard, InflightTracker};
pub use membership::{Lifecycle, MembershipSnapshot, MembershipState};
pub use reactive::{SliceWatcher, Store};
pub use registry::{SessionStores, StoreRegistry};
pub use sync::{MembershipSync, StateOf, SyncError, SyncOutcome};

//! Reconciliation core for the conversation view.
//!
//! Folds remote change batches into immutable snapshots ([`mod@merge`]),
//! repartitions them into fixed-size page windows ([`pages`]), tracks
//! per-user read positions ([`read_position`]), and orchestrates the
//! feed, merge, pages and store pipeline per room ([`session`]).

pub mod cache;
pub mod config;
pub mod merge;
pub mod pages;
pub mod read_position;
pub mod session;

pub use cache::{ViewCache, WriteToken};
pub use config::{SyncConfig, init_logging};
pub use merge::{canonical_cmp, merge};
pub use pages::{Page, PagedWindow, rebuild_pages};
pub use read_position::{ReadPositionTracker, ReadPositionUpdater};
pub use session::{MutationCommand, RoomSession};

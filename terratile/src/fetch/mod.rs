//! Fetch pipeline: layers, retry policy, and the fetcher itself.
//!
//! The pieces compose bottom-up:
//!
//! - [`RetryPolicy`] / [`RetryState`]: how many attempts are allowed and
//!   the per-layer escalating download timeout.
//! - [`Layer`]: a raster source bound to its cache identity and fetch
//!   state.
//! - [`Fetcher`]: the cache-then-network pipeline for a single
//!   (layer, tile) pair.
//!
//! The scheduler drives [`Fetcher::fetch`] from its worker pool; callers
//! who want a single tile without queueing can call it directly.

mod fetcher;
mod layer;
mod retry;

pub use fetcher::Fetcher;
pub use layer::Layer;
pub use retry::{RetryPolicy, RetryState};

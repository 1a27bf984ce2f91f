//! Tile disk cache: path derivation, entry status, failure markers.

mod disk;
pub(crate) mod path;

pub use disk::{CacheError, DiskCache, EntryStatus};
pub use path::encode_coord;

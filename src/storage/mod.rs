//! Bookmark persistence over a key-value storage medium

pub mod backend;
pub mod store;

pub use backend::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::BookmarkStore;

/// Storage key for the bookmark list
pub const URLS_KEY: &str = "linkvault.urls";

/// Storage key for the category list
pub const CATEGORIES_KEY: &str = "linkvault.categories";

/// Storage key for session details
pub const SESSION_KEY: &str = "linkvault.session";

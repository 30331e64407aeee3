//! Command-line interface for bookmark management and health checks

pub mod bookmarks;
pub mod check;

pub use bookmarks::*;
pub use check::*;

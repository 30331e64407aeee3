//! Utility functions shared across modules

pub mod url;
pub mod time;

pub use url::*;
pub use time::*;

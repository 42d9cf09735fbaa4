//! SQLite schema bootstrap and row mapping

pub mod init;
pub mod rows;

pub use init::*;

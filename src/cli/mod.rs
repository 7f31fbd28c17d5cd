//! CLI command handling

pub mod check;
pub mod replay;
pub mod show_config;

pub use check::*;
pub use replay::*;
pub use show_config::*;

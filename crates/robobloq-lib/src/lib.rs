//! Robobloq: color, fade, effect and screen-sync control for Robobloq USB LED bars.

pub mod capture;
pub mod color;
pub mod config;
pub mod context;
pub mod control;
pub mod device;
pub mod effects;
pub mod error;
pub mod protocol;
pub mod scheduler;
pub mod sync;

pub use error::RobobloqError;

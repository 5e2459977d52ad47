//! Core types for parley.

pub mod capability;
pub mod message;
pub mod mode;

pub use capability::*;
pub use message::*;
pub use mode::*;

//! Shared types for the Sigma component server.

mod frame;
mod health;
mod value;

pub use frame::*;
pub use health::*;
pub use value::*;

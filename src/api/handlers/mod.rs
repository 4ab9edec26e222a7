//! REST API handlers organized by resource.

pub mod health;
pub mod messages;
pub mod rockets;

pub use health::*;
pub use messages::*;
pub use rockets::*;

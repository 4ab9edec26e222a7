//! Domain models for the rocket resequencer
//!
//! Messages as logged, the rocket projection, and the pure state transition
//! function that folds one into the other.

mod message;
mod rocket;
mod transition;
mod types;
mod validation;

pub use message::*;
pub use rocket::*;
pub use transition::*;
pub use types::*;
pub use validation::*;

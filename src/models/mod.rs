//! Data models for the flashcards backend.
//!
//! Item and streak rows keep the remote table's column names so they can be
//! mirrored without translation.

mod activity;
mod item;
mod streak;
mod topic;

pub use activity::*;
pub use item::*;
pub use streak::*;
pub use topic::*;

//! Database models split into domain-specific modules.

pub mod common;
pub mod course;
pub mod lesson;
pub mod user;

pub use common::*;
pub use course::*;
pub use lesson::*;
pub use user::*;

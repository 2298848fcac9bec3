//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod documents;
pub mod health;
pub mod index;
pub mod personas;
pub mod query;
pub mod sessions;

//! A read-only catalog of drinks, their ingredients and the glasses they are
//! served in, stored as documents and served as JSON.

pub mod catalog;
pub mod config;
pub mod error;
pub mod memory;
pub mod services;
#[cfg(test)]
mod test;

pub use crate::config::{Backend, Config};
pub use crate::error::Error;

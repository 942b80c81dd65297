//! Utility functions and helpers.
//!
//! Environment variable handling and random token generation.

pub mod env;
pub mod random;

pub use env::{get_env_flag, get_env_with_prefix};
pub use random::{random_bytes, random_token};

//! Storage for user records

pub mod user;

pub use user::{MemoryUserStore, UserRepository, UserStore};

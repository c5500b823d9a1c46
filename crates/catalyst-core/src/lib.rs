pub mod action;
pub mod bus;
pub mod config;
pub mod db;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod hook;
pub mod io;
pub mod pool;
pub mod reaction;
pub mod schedule;
pub mod service;
pub mod store;

pub use engine::Engine;
pub use error::{CatalystError, Result};

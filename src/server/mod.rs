//! Server module for PS3
//!
//! Contains the server initialization and runtime logic.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures for all server components
//! - `loader`: Configuration loading from files and environment
//! - `background_tasks`: Periodic history sweep and limiter cleanup
//! - `init`: Router assembly and the main run loop

mod background_tasks;
pub mod config;
mod init;
mod loader;

pub use config::AppConfig;
pub use init::{build_router, run, AppState};
pub use loader::load_config;

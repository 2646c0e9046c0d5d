pub use crate::config::EngineConfig;
pub use crate::engine::{Compilation, Engine, Verification};
pub use crate::errors::{ErrorKind, Message, SelError, Severity};
pub use crate::memory::InMemoryEngine;
pub use crate::names::CanonicalName;
pub use crate::types::{DataType, Value};

pub mod catalog;
pub mod cli;
pub mod config;
pub mod context;
pub mod declarator;
pub mod engine;
pub mod errors;
pub mod generator;
pub mod memory;
pub mod names;
pub mod repository;
pub mod scope;
pub mod signature;
pub mod syntax;
pub mod types;
pub mod xpt;

#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

//! Core data model and building blocks for structure-aware retrieval over
//! hierarchical regulatory text (chapter > article > clause).

pub mod chunker;
pub mod citation;
pub mod config;
pub mod error;
pub mod loader;
pub mod metadata;
pub mod traits;
pub mod types;

pub use error::{Error, Result};

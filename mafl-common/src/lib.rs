//! # MAFL Common Library
//!
//! Shared code for the multi-atlas label fusion tools including:
//! - Image entity discovery (atlases, templates, targets)
//! - Pairwise similarity score tables
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod library;
pub mod scores;

pub use error::{Error, Result};
pub use library::{ImageEntity, ImageRole, TemplateLibrary, TemplateRepository};
pub use scores::{ScoreTable, SimilarityMetric};

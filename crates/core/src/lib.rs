//! # Tempest Core
//!
//! The "Brain" of the Tempest service - hosts the blocking
//! article-generation pipeline inside a concurrent runtime.
//!
//! ## Architecture
//!
//! - `store/` - In-memory artifact storage with per-run namespacing
//! - `pipeline` - The engine contract: run entry point, lifecycle hooks, file access
//! - `service/` - Streaming bridge between the blocking worker and async callers
//! - `engine` - Thin built-in engine over DeepSeek chat + Serper search
//! - `context` - Per-request correlation ids that follow work onto worker threads
//! - `config` - Environment-derived settings, read-only after construction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tempest_core::{DeepSeekPipeline, GenerationService, ServiceConfig};
//!
//! let config = ServiceConfig::from_env()?;
//! let engine = Arc::new(DeepSeekPipeline::new(&config));
//! let service = GenerationService::new(config, engine);
//! let article = service.generate("Rust programming language").await?;
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod store;

pub use config::{RunnerLimits, ServiceConfig, StageToggles};
pub use engine::DeepSeekPipeline;
pub use error::{Error, Result};
pub use service::GenerationService;

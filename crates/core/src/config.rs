//! # Service Configuration
//!
//! Environment-derived settings for the generation service: API
//! credentials, pipeline limits, and stage toggles. Everything here is
//! read-only after construction and shared across concurrent runs via
//! `Arc` without locking.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_MAX_CONV_TURN: u32 = 2;
const DEFAULT_MAX_PERSPECTIVE: u32 = 2;
const DEFAULT_MAX_SEARCH_QUERIES: u32 = 2;
const DEFAULT_SEARCH_TOP_K: u32 = 2;
const DEFAULT_RETRIEVE_TOP_K: u32 = 2;
const DEFAULT_MAX_THREAD_NUM: u32 = 2;

/// Which pipeline stages a run executes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageToggles {
    /// Multi-perspective research phase
    pub do_research: bool,
    /// Outline generation phase
    pub do_generate_outline: bool,
    /// Article drafting phase
    pub do_generate_article: bool,
    /// Final polish phase
    pub do_polish_article: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            do_research: true,
            do_generate_outline: true,
            do_generate_article: true,
            do_polish_article: true,
        }
    }
}

/// Runner limits passed to the pipeline (search breadth, conversation
/// depth, worker threads).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerLimits {
    pub max_conv_turn: u32,
    pub max_perspective: u32,
    pub max_search_queries_per_turn: u32,
    pub search_top_k: u32,
    pub retrieve_top_k: u32,
    pub max_thread_num: u32,
}

impl Default for RunnerLimits {
    fn default() -> Self {
        Self {
            max_conv_turn: DEFAULT_MAX_CONV_TURN,
            max_perspective: DEFAULT_MAX_PERSPECTIVE,
            max_search_queries_per_turn: DEFAULT_MAX_SEARCH_QUERIES,
            search_top_k: DEFAULT_SEARCH_TOP_K,
            retrieve_top_k: DEFAULT_RETRIEVE_TOP_K,
            max_thread_num: DEFAULT_MAX_THREAD_NUM,
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// DeepSeek chat API key
    pub deepseek_api_key: String,
    /// Serper search API key
    pub serper_api_key: String,
    /// Pipeline limits
    pub limits: RunnerLimits,
    /// Default stage toggles for runs that do not override them
    pub toggles: StageToggles,
}

impl ServiceConfig {
    /// Load configuration from the environment.
    ///
    /// Missing credentials are fatal ([`Error::Configuration`]); malformed
    /// numeric values fall back to their defaults.
    pub fn from_env() -> Result<Self> {
        let deepseek_api_key = require_env("DEEPSEEK_API_KEY")?;
        let serper_api_key = require_env("SERPER_API_KEY")?;

        let limits = RunnerLimits {
            max_conv_turn: env_u32("MAX_CONV_TURN", DEFAULT_MAX_CONV_TURN),
            max_perspective: env_u32("MAX_PERSPECTIVE", DEFAULT_MAX_PERSPECTIVE),
            max_search_queries_per_turn: env_u32(
                "MAX_SEARCH_QUERIES_PER_TURN",
                DEFAULT_MAX_SEARCH_QUERIES,
            ),
            search_top_k: env_u32("SEARCH_TOP_K", DEFAULT_SEARCH_TOP_K),
            retrieve_top_k: env_u32("RETRIEVE_TOP_K", DEFAULT_RETRIEVE_TOP_K),
            max_thread_num: env_u32("MAX_THREAD_NUM", DEFAULT_MAX_THREAD_NUM),
        };

        let toggles = StageToggles {
            do_research: env_bool("DO_RESEARCH", true),
            do_generate_outline: env_bool("DO_GENERATE_OUTLINE", true),
            do_generate_article: env_bool("DO_GENERATE_ARTICLE", true),
            do_polish_article: env_bool("DO_POLISH_ARTICLE", true),
        };

        Ok(Self {
            deepseek_api_key,
            serper_api_key,
            limits,
            toggles,
        })
    }

    /// Whether the environment holds every required credential.
    ///
    /// Used by the health endpoint without constructing a full config.
    pub fn environment_ok() -> bool {
        ["DEEPSEEK_API_KEY", "SERPER_API_KEY"]
            .iter()
            .all(|var| std::env::var(var).map(|v| !v.is_empty()).unwrap_or(false))
    }
}

fn require_env(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::configuration(format!("{key} required"))),
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => value.eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}

//! # Pipeline Contract
//!
//! The seam between the hosting service and the article-generation engine.
//! The engine is an opaque, synchronous, CPU/IO-bound unit of work: it
//! takes a topic and stage toggles, runs to completion on a worker thread,
//! reports progress through a fixed set of lifecycle hooks, and performs
//! all file access through [`ArtifactAccess`] so nothing touches durable
//! storage.

use crate::config::StageToggles;
use crate::error::Result;

/// File access the pipeline uses for every intermediate and final
/// artifact. Implementations are infallible by contract: writes always
/// succeed, reads of absent paths return an empty string.
pub trait ArtifactAccess: Send + Sync {
    /// Store content under a path, replacing any prior value.
    fn write(&self, path: &str, content: &str);
    /// Read content for a path, or an empty string if absent.
    fn read(&self, path: &str) -> String;
    /// Whether a path has been written.
    fn exists(&self, path: &str) -> bool;
}

/// Lifecycle hooks the pipeline invokes synchronously during a run.
///
/// Every hook has a default no-op body so engines only call what they
/// reach and observers only handle what they care about. Handlers must
/// not block and must not fail the pipeline.
pub trait LifecycleObserver: Send + Sync {
    /// Perspective discovery is starting for a topic.
    fn on_identify_perspective_start(&self, _topic: &str) {}
    /// Perspective discovery finished with the named perspectives.
    fn on_identify_perspective_end(&self, _perspectives: &[String]) {}
    /// Information gathering is starting for one perspective.
    fn on_information_gathering_start(&self, _perspective: &str) {}
    /// Information gathering finished; `num_sources` sources consulted.
    fn on_information_gathering_end(&self, _num_sources: usize) {}
    /// One simulated dialogue turn completed.
    fn on_dialogue_turn_end(&self, _question: &str, _perspective: &str) {}
    /// Gathered information is being organized.
    fn on_information_organization_start(&self) {}
    /// The direct outline was generated.
    fn on_direct_outline_generation_end(&self) {}
    /// The outline was refined.
    fn on_outline_refinement_end(&self) {}
}

/// No-op observer for headless runs.
pub struct SilentObserver;

impl LifecycleObserver for SilentObserver {}

/// The opaque generation engine.
///
/// `run` executes synchronously for tens of seconds to minutes and is
/// always hosted on a dedicated worker thread; it must never be called
/// from a request-handling path. A throttling signal from the retrieval
/// dependency must surface as [`crate::error::Error::RateLimited`] so the
/// host can rephrase it for callers.
pub trait ArticlePipeline: Send + Sync {
    /// Run the pipeline for a topic, honoring the stage toggles.
    fn run(
        &self,
        topic: &str,
        toggles: &StageToggles,
        observer: &dyn LifecycleObserver,
        files: &dyn ArtifactAccess,
    ) -> Result<()>;
}

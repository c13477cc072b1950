//! # Generation Service
//!
//! Hosts the blocking pipeline inside the async runtime. Each call
//! allocates a private run scope over the shared artifact store, starts
//! the pipeline on a dedicated worker thread, and either waits for the
//! outcome (blocking mode) or bridges the worker's progress channel into
//! an ordered stream of chunks while the worker runs (streaming mode).
//!
//! The request-handling path never executes pipeline work inline: its
//! longest wait is one bounded poll on the progress channel.

pub mod progress;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info, warn};

use crate::config::{ServiceConfig, StageToggles};
use crate::context;
use crate::error::{Error, Result};
use crate::pipeline::{ArticlePipeline, LifecycleObserver, SilentObserver};
use crate::store::{ArtifactStore, RunScope};

use progress::ProgressRelay;

/// How long one progress poll waits before re-checking worker liveness.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Grace period for the worker to signal completion after its channel
/// closes.
const JOIN_GRACE: Duration = Duration::from_secs(5);

/// Service wrapper hosting the article-generation pipeline with in-memory
/// file storage.
///
/// All intermediate files (conversation logs, outlines, articles) are held
/// in RAM and dropped when the run's result has been consumed; nothing is
/// written to disk.
pub struct GenerationService {
    config: Arc<ServiceConfig>,
    pipeline: Arc<dyn ArticlePipeline>,
    store: Arc<ArtifactStore>,
}

impl GenerationService {
    /// Create a service over a pipeline implementation.
    pub fn new(config: ServiceConfig, pipeline: Arc<dyn ArticlePipeline>) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
            store: Arc::new(ArtifactStore::new()),
        }
    }

    /// The service configuration (read-only).
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Files currently held in storage, across all in-flight runs.
    pub fn storage_size(&self) -> usize {
        self.store.len()
    }

    /// Start the pipeline on a dedicated worker thread bound to a fresh
    /// run scope, the given observer, and the caller's request id.
    fn spawn_worker<O>(
        &self,
        topic: &str,
        toggles: StageToggles,
        observer: O,
    ) -> (RunScope, JoinHandle<Result<()>>)
    where
        O: LifecycleObserver + 'static,
    {
        let scope = RunScope::new(Arc::clone(&self.store));
        let worker_scope = scope.clone();
        let pipeline = Arc::clone(&self.pipeline);
        let request_id = context::current();
        let topic = topic.to_string();

        info!(run_id = scope.run_id(), topic = %topic, "starting pipeline run");

        let handle = tokio::task::spawn_blocking(move || {
            let _guard = request_id.map(context::bind);
            pipeline.run(&topic, &toggles, &observer, &worker_scope)
        });

        (scope, handle)
    }

    /// Run the pipeline to completion and return the final article.
    ///
    /// Blocking mode: no intermediate progress is exposed, only the
    /// terminal outcome. The run's artifacts are dropped before returning,
    /// on every exit path.
    pub async fn generate(&self, topic: &str) -> Result<String> {
        let toggles = self.config.toggles;
        // No progress consumer in blocking mode.
        let (scope, handle) = self.spawn_worker(topic, toggles, SilentObserver);

        let outcome = match handle.await {
            Ok(run_result) => run_result,
            Err(join_err) => Err(worker_crash(&join_err)),
        };

        let result = outcome.and_then(|()| scope.resolve_article(&toggles));
        match &result {
            Ok(article) => info!(
                run_id = scope.run_id(),
                article_len = article.len(),
                "pipeline run complete"
            ),
            Err(e) => error!(run_id = scope.run_id(), error = %e, "pipeline run failed"),
        }
        scope.clear();
        result
    }

    /// Run the pipeline and stream its progress.
    ///
    /// The stream yields the run's progress lines in production order,
    /// then the resolved article as the final `Ok` item; on failure it
    /// ends with a single classified `Err` item instead, without
    /// retracting chunks already delivered.
    ///
    /// Dropping the stream does not cancel the worker: the pipeline is
    /// not interruptible once started. The run finishes in the background
    /// and its artifacts are still dropped.
    pub fn generate_streaming(&self, topic: &str) -> UnboundedReceiverStream<Result<String>> {
        let toggles = self.config.toggles;
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (relay, mut progress_rx) = ProgressRelay::channel(topic);
        let (scope, mut handle) = self.spawn_worker(topic, toggles, relay);
        let topic = topic.to_string();
        let request_id = context::current();

        tokio::spawn(async move {
            let bridge = async {
                let _ = out_tx.send(Ok(format!("🔍 Starting research on: {topic}\n\n")));

                // Forward progress while the worker runs. An empty poll is
                // not an error, it just triggers a liveness check.
                loop {
                    match tokio::time::timeout(POLL_INTERVAL, progress_rx.recv()).await {
                        Ok(Some(line)) => {
                            let _ = out_tx.send(Ok(format!("{line}\n")));
                        }
                        Ok(None) => break,
                        Err(_) if handle.is_finished() => break,
                        Err(_) => continue,
                    }
                }

                let outcome = match tokio::time::timeout(JOIN_GRACE, &mut handle).await {
                    Ok(Ok(run_result)) => run_result,
                    Ok(Err(join_err)) => Err(worker_crash(&join_err)),
                    Err(_) => {
                        warn!(run_id = scope.run_id(), "worker join timed out");
                        Err(Error::pipeline(
                            "worker",
                            "worker did not signal completion in time",
                        ))
                    }
                };

                // Final sweep: flush lines enqueued between the last poll
                // and worker termination, before any terminal event.
                while let Ok(line) = progress_rx.try_recv() {
                    let _ = out_tx.send(Ok(format!("{line}\n")));
                }

                match outcome.and_then(|()| scope.resolve_article(&toggles)) {
                    Ok(article) => {
                        let _ = out_tx.send(Ok("\n".to_string()));
                        if toggles.do_research {
                            let _ = out_tx.send(Ok("✅ Research phase complete\n\n".to_string()));
                        }
                        if toggles.do_generate_outline {
                            let _ = out_tx.send(Ok("📝 Outline generated\n\n".to_string()));
                        }
                        if toggles.do_generate_article {
                            let _ = out_tx.send(Ok("✍️  Article generated\n\n".to_string()));
                        }
                        if toggles.do_polish_article {
                            let _ = out_tx.send(Ok("✨ Article polished\n\n".to_string()));
                        }
                        let _ = out_tx.send(Ok("📄 Final Article:\n".to_string()));
                        let _ = out_tx
                            .send(Ok("────────────────────────────────────────\n\n".to_string()));
                        info!(
                            run_id = scope.run_id(),
                            article_len = article.len(),
                            "streaming run complete"
                        );
                        let _ = out_tx.send(Ok(article));
                    }
                    Err(e) => {
                        error!(run_id = scope.run_id(), error = %e, "streaming run failed");
                        let _ = out_tx.send(Err(e));
                    }
                }

                scope.clear();
            };

            match request_id {
                Some(id) => context::scope(id, bridge).await,
                None => bridge.await,
            }
        });

        UnboundedReceiverStream::new(out_rx)
    }
}

fn worker_crash(join_err: &tokio::task::JoinError) -> Error {
    Error::pipeline("worker", format!("worker crashed: {join_err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerLimits;
    use crate::context::RequestId;
    use crate::pipeline::{ArtifactAccess, LifecycleObserver};
    use std::sync::Mutex;
    use tokio_stream::StreamExt;

    fn test_config(toggles: StageToggles) -> ServiceConfig {
        ServiceConfig {
            deepseek_api_key: "test-key".to_string(),
            serper_api_key: "test-key".to_string(),
            limits: RunnerLimits::default(),
            toggles,
        }
    }

    /// Scripted stand-in for the real engine.
    enum FakePipeline {
        /// Fires hooks, writes a draft and (optionally) a polished article.
        Success { polish: bool },
        /// Reports success without writing anything.
        NoArtifacts,
        /// Fails with the retrieval throttling signal.
        RateLimited,
        /// Fails with a generic error.
        Broken,
        /// Dies without reporting.
        Panics,
    }

    impl ArticlePipeline for FakePipeline {
        fn run(
            &self,
            topic: &str,
            _toggles: &StageToggles,
            observer: &dyn LifecycleObserver,
            files: &dyn ArtifactAccess,
        ) -> Result<()> {
            match self {
                Self::Success { polish } => {
                    observer.on_identify_perspective_start(topic);
                    observer
                        .on_identify_perspective_end(&["History".into(), "Applications".into()]);
                    observer.on_information_gathering_start("History");
                    observer.on_dialogue_turn_end("what came first?", "History");
                    observer.on_information_gathering_end(3);
                    observer.on_direct_outline_generation_end();
                    files.write(
                        &format!("{topic}/storm_gen_article.txt"),
                        &format!("draft about {topic}"),
                    );
                    if *polish {
                        files.write(
                            &format!("{topic}/polished_article.txt"),
                            &format!("polished about {topic}"),
                        );
                    }
                    Ok(())
                }
                Self::NoArtifacts => Ok(()),
                Self::RateLimited => Err(Error::RateLimited),
                Self::Broken => Err(Error::pipeline("research", "upstream closed")),
                Self::Panics => panic!("engine exploded"),
            }
        }
    }

    fn service(pipeline: FakePipeline, toggles: StageToggles) -> GenerationService {
        GenerationService::new(test_config(toggles), Arc::new(pipeline))
    }

    #[tokio::test]
    async fn test_generate_prefers_polished_article() {
        let svc = service(FakePipeline::Success { polish: true }, StageToggles::default());
        let article = svc.generate("Rust").await.unwrap();
        assert_eq!(article, "polished about Rust");
    }

    #[tokio::test]
    async fn test_generate_falls_back_to_draft_without_polish() {
        let toggles = StageToggles {
            do_polish_article: false,
            ..StageToggles::default()
        };
        let svc = service(FakePipeline::Success { polish: false }, toggles);
        let article = svc.generate("Rust").await.unwrap();
        assert_eq!(article, "draft about Rust");
    }

    #[tokio::test]
    async fn test_generate_surfaces_resolution_failure() {
        let svc = service(FakePipeline::NoArtifacts, StageToggles::default());
        let err = svc.generate("Rust").await.unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[tokio::test]
    async fn test_generate_classifies_rate_limit() {
        let svc = service(FakePipeline::RateLimited, StageToggles::default());
        let err = svc.generate("Rust").await.unwrap_err();
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn test_generate_contains_worker_panic() {
        let svc = service(FakePipeline::Panics, StageToggles::default());
        let err = svc.generate("Rust").await.unwrap_err();
        assert!(matches!(err, Error::Pipeline { .. }));
    }

    #[tokio::test]
    async fn test_generate_clears_run_storage() {
        let svc = service(FakePipeline::Success { polish: true }, StageToggles::default());
        svc.generate("Rust").await.unwrap();
        assert_eq!(svc.storage_size(), 0);

        let svc = service(FakePipeline::Broken, StageToggles::default());
        let _ = svc.generate("Rust").await;
        assert_eq!(svc.storage_size(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let svc = Arc::new(service(
            FakePipeline::Success { polish: true },
            StageToggles::default(),
        ));
        let (a, b) = tokio::join!(svc.generate("alpha"), svc.generate("beta"));
        assert_eq!(a.unwrap(), "polished about alpha");
        assert_eq!(b.unwrap(), "polished about beta");
        assert_eq!(svc.storage_size(), 0);
    }

    #[tokio::test]
    async fn test_streaming_order_and_final_article() {
        let svc = service(FakePipeline::Success { polish: true }, StageToggles::default());
        let chunks: Vec<Result<String>> = svc.generate_streaming("Rust").collect().await;
        let lines: Vec<String> = chunks.into_iter().map(|c| c.unwrap()).collect();

        assert!(lines[0].starts_with("🔍 Starting research on: Rust"));
        // Progress lines arrive in production order.
        let analyzing = lines
            .iter()
            .position(|l| l.contains("Analyzing perspectives"))
            .unwrap();
        let identified = lines
            .iter()
            .position(|l| l.contains("Identified 2 perspectives"))
            .unwrap();
        let gathering = lines
            .iter()
            .position(|l| l.contains("Gathering information for: History"))
            .unwrap();
        assert!(analyzing < identified && identified < gathering);
        // The resolved article is strictly last.
        assert_eq!(lines.last().unwrap(), "polished about Rust");
    }

    #[tokio::test]
    async fn test_streaming_stage_lines_follow_toggles() {
        let toggles = StageToggles {
            do_polish_article: false,
            ..StageToggles::default()
        };
        let svc = service(FakePipeline::Success { polish: false }, toggles);
        let chunks: Vec<Result<String>> = svc.generate_streaming("Rust").collect().await;
        let lines: Vec<String> = chunks.into_iter().map(|c| c.unwrap()).collect();

        assert!(lines.iter().any(|l| l.contains("Research phase complete")));
        assert!(!lines.iter().any(|l| l.contains("Article polished")));
        assert_eq!(lines.last().unwrap(), "draft about Rust");
    }

    #[tokio::test]
    async fn test_streaming_error_is_terminal_and_preserves_progress() {
        let svc = service(FakePipeline::RateLimited, StageToggles::default());
        let chunks: Vec<Result<String>> = svc.generate_streaming("Rust").collect().await;

        assert!(chunks[0].as_ref().unwrap().contains("Starting research"));
        let last = chunks.last().unwrap();
        assert!(last.as_ref().is_err_and(Error::is_rate_limit));
        // Nothing after the terminal error.
        assert_eq!(chunks.iter().filter(|c| c.is_err()).count(), 1);
    }

    #[tokio::test]
    async fn test_streaming_clears_run_storage() {
        let svc = service(FakePipeline::Success { polish: true }, StageToggles::default());
        let _chunks: Vec<Result<String>> = svc.generate_streaming("Rust").collect().await;
        assert_eq!(svc.storage_size(), 0);
    }

    /// Records the correlation id observed inside the worker thread.
    struct IdProbe(Arc<Mutex<Option<RequestId>>>);

    impl ArticlePipeline for IdProbe {
        fn run(
            &self,
            _topic: &str,
            _toggles: &StageToggles,
            _observer: &dyn LifecycleObserver,
            files: &dyn ArtifactAccess,
        ) -> Result<()> {
            *self.0.lock().unwrap() = context::current();
            files.write("t/storm_gen_article.txt", "done");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_request_id_reaches_worker_thread() {
        let seen = Arc::new(Mutex::new(None));
        let svc = GenerationService::new(
            test_config(StageToggles::default()),
            Arc::new(IdProbe(Arc::clone(&seen))),
        );

        let id = RequestId::new();
        context::scope(id.clone(), svc.generate("Rust"))
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap().clone(), Some(id));
    }
}

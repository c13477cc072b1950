//! # Progress Relay
//!
//! Translates pipeline lifecycle callbacks into human-readable progress
//! lines and feeds them to the per-run progress channel. One relay is
//! created per execution and never shared across runs; its counters and
//! last-seen perspective are that run's alone.
//!
//! Handlers never fail the pipeline: formatting is defensive (overlong
//! questions are truncated) and a closed channel silently drops the line.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::pipeline::LifecycleObserver;

const MAX_QUESTION_LEN: usize = 80;

/// Lifecycle adapter feeding one run's progress channel.
pub struct ProgressRelay {
    tx: mpsc::UnboundedSender<String>,
    topic: String,
    perspectives: AtomicUsize,
    dialogue_turns: AtomicUsize,
    current_perspective: Mutex<Option<String>>,
    current_query: Mutex<Option<String>>,
}

impl ProgressRelay {
    /// Create a relay and the receiving half of its progress channel.
    pub fn channel(topic: &str) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                topic: topic.to_string(),
                perspectives: AtomicUsize::new(0),
                dialogue_turns: AtomicUsize::new(0),
                current_perspective: Mutex::new(None),
                current_query: Mutex::new(None),
            },
            rx,
        )
    }

    /// Push a progress line onto the channel.
    ///
    /// A dropped receiver is not an error: the run continues, the line is
    /// discarded.
    pub fn push(&self, line: impl Into<String>) {
        let _ = self.tx.send(line.into());
    }

    /// Perspectives discovered so far this run.
    pub fn perspective_count(&self) -> usize {
        self.perspectives.load(Ordering::Relaxed)
    }

    /// Dialogue turns completed so far this run.
    pub fn dialogue_turn_count(&self) -> usize {
        self.dialogue_turns.load(Ordering::Relaxed)
    }

    /// Perspective the run is currently gathering information for.
    pub fn current_perspective(&self) -> Option<String> {
        self.current_perspective.lock().ok().and_then(|p| p.clone())
    }

    /// Most recent interview question.
    pub fn current_query(&self) -> Option<String> {
        self.current_query.lock().ok().and_then(|q| q.clone())
    }
}

fn truncate_question(question: &str) -> String {
    if question.chars().count() > MAX_QUESTION_LEN {
        let short: String = question.chars().take(MAX_QUESTION_LEN).collect();
        format!("{short}...")
    } else {
        question.to_string()
    }
}

impl LifecycleObserver for ProgressRelay {
    fn on_identify_perspective_start(&self, topic: &str) {
        let topic = if topic.is_empty() {
            self.topic.as_str()
        } else {
            topic
        };
        self.push(format!("🔍 Analyzing perspectives for: {topic}"));
    }

    fn on_identify_perspective_end(&self, perspectives: &[String]) {
        self.perspectives
            .store(perspectives.len(), Ordering::Relaxed);
        if perspectives.is_empty() {
            self.push("📋 Using general perspective");
            return;
        }
        self.push(format!("📋 Identified {} perspectives:", perspectives.len()));
        for (i, perspective) in perspectives.iter().enumerate() {
            self.push(format!("   {}. {perspective}", i + 1));
        }
    }

    fn on_information_gathering_start(&self, perspective: &str) {
        if let Ok(mut current) = self.current_perspective.lock() {
            *current = Some(perspective.to_string());
        }
        self.push(format!("🔎 Gathering information for: {perspective}"));
    }

    fn on_information_gathering_end(&self, num_sources: usize) {
        self.push(format!("✓ Gathered information from {num_sources} sources"));
    }

    fn on_dialogue_turn_end(&self, question: &str, perspective: &str) {
        let turn = self.dialogue_turns.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut current) = self.current_perspective.lock() {
            *current = Some(perspective.to_string());
        }
        if let Ok(mut current) = self.current_query.lock() {
            *current = Some(question.to_string());
        }
        self.push(format!("  💬 Q{turn}: {}", truncate_question(question)));
    }

    fn on_information_organization_start(&self) {
        self.push("🗂️  Organizing research information");
    }

    fn on_direct_outline_generation_end(&self) {
        self.push("📝 Generating article structure (direct outline)");
    }

    fn on_outline_refinement_end(&self) {
        self.push("✍️  Refining article structure");
    }
}

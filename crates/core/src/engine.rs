//! # DeepSeek Engine
//!
//! A thin first-party implementation of [`ArticlePipeline`]: one chat
//! completion per stage step against DeepSeek, retrieval via Serper. The
//! hosting layer never depends on this type concretely; any engine
//! implementing the contract can be swapped in.
//!
//! The engine is synchronous by contract and always runs on a worker
//! thread, so it uses the blocking HTTP client. The client is built inside
//! `run` rather than at construction: blocking clients must not be created
//! on an async runtime thread.

use serde::Deserialize;
use tracing::debug;

use crate::config::{RunnerLimits, ServiceConfig, StageToggles};
use crate::error::{Error, Result};
use crate::pipeline::{ArticlePipeline, ArtifactAccess, LifecycleObserver};

const CHAT_URL: &str = "https://api.deepseek.com/chat/completions";
const SEARCH_URL: &str = "https://google.serper.dev/search";
const CHAT_MODEL: &str = "deepseek-chat";
const TEMPERATURE: f64 = 0.7;
const TOP_P: f64 = 0.9;
const HTTP_TIMEOUT_SECS: u64 = 120;

/// Article-generation engine over the DeepSeek chat API with Serper
/// retrieval.
pub struct DeepSeekPipeline {
    deepseek_api_key: String,
    serper_api_key: String,
    limits: RunnerLimits,
    chat_url: String,
    search_url: String,
}

impl DeepSeekPipeline {
    /// Create an engine from service configuration.
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            deepseek_api_key: config.deepseek_api_key.clone(),
            serper_api_key: config.serper_api_key.clone(),
            limits: config.limits.clone(),
            chat_url: CHAT_URL.to_string(),
            search_url: SEARCH_URL.to_string(),
        }
    }

    /// Override the chat endpoint (OpenAI-compatible gateways).
    pub fn with_chat_url(mut self, url: impl Into<String>) -> Self {
        self.chat_url = url.into();
        self
    }

    /// Override the search endpoint.
    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    fn build_client(&self) -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::pipeline("startup", format!("http client: {e}")))
    }

    fn chat(
        &self,
        client: &reqwest::blocking::Client,
        stage: &str,
        system: &str,
        user: &str,
    ) -> Result<String> {
        let body = serde_json::json!({
            "model": CHAT_MODEL,
            "temperature": TEMPERATURE,
            "top_p": TOP_P,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = client
            .post(&self.chat_url)
            .bearer_auth(&self.deepseek_api_key)
            .json(&body)
            .send()
            .map_err(|e| Error::pipeline(stage, format!("chat request: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited);
        }
        if !response.status().is_success() {
            return Err(Error::pipeline(
                stage,
                format!("chat returned HTTP {}", response.status()),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| Error::pipeline(stage, format!("chat response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::pipeline(stage, "chat response had no choices"))
    }

    fn search(&self, client: &reqwest::blocking::Client, query: &str) -> Result<Vec<SearchHit>> {
        let response = client
            .post(&self.search_url)
            .header("X-API-KEY", &self.serper_api_key)
            .json(&serde_json::json!({
                "q": query,
                "num": self.limits.search_top_k,
            }))
            .send()
            .map_err(|e| Error::pipeline("research", format!("search request: {e}")))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited);
        }
        if !response.status().is_success() {
            return Err(Error::pipeline(
                "research",
                format!("search returned HTTP {}", response.status()),
            ));
        }

        let parsed: SearchResponse = response
            .json()
            .map_err(|e| Error::pipeline("research", format!("search response: {e}")))?;
        Ok(parsed.organic)
    }

    fn discover_perspectives(
        &self,
        client: &reqwest::blocking::Client,
        topic: &str,
    ) -> Result<Vec<String>> {
        let raw = self.chat(
            client,
            "research",
            "You identify distinct editorial perspectives for researching an \
             encyclopedic article. Answer with one short perspective name per line.",
            &format!("Topic: {topic}"),
        )?;
        Ok(parse_list(&raw, self.limits.max_perspective as usize))
    }

    fn research(
        &self,
        client: &reqwest::blocking::Client,
        topic: &str,
        observer: &dyn LifecycleObserver,
        files: &dyn ArtifactAccess,
        dir: &str,
    ) -> Result<String> {
        observer.on_identify_perspective_start(topic);
        let perspectives = self.discover_perspectives(client, topic)?;
        observer.on_identify_perspective_end(&perspectives);

        let mut notes = String::new();
        let mut conversation = Vec::new();
        let mut raw_results = Vec::new();

        for perspective in &perspectives {
            observer.on_information_gathering_start(perspective);
            let mut sources = 0;

            for _ in 0..self.limits.max_conv_turn {
                let question = self.chat(
                    client,
                    "research",
                    "You are a researcher interviewing an expert. Ask one concise, \
                     specific question. Answer with the question only.",
                    &format!(
                        "Topic: {topic}\nPerspective: {perspective}\nNotes so far:\n{notes}"
                    ),
                )?;
                let question = first_line(&question);
                observer.on_dialogue_turn_end(&question, perspective);

                let hits = self.search(client, &question)?;
                sources += hits.len();
                for hit in hits.iter().take(self.limits.retrieve_top_k as usize) {
                    if let Some(snippet) = &hit.snippet {
                        notes.push_str(&format!("- {} ({}): {snippet}\n", hit.title, hit.link));
                    }
                }
                raw_results.push(serde_json::json!({
                    "perspective": perspective,
                    "query": question,
                    "results": hits,
                }));
                conversation.push(serde_json::json!({
                    "perspective": perspective,
                    "question": question,
                }));
            }
            observer.on_information_gathering_end(sources);
        }

        files.write(
            &format!("{dir}/conversation_log.json"),
            &to_json(&conversation, "research")?,
        );
        files.write(
            &format!("{dir}/raw_search_results.json"),
            &to_json(&raw_results, "research")?,
        );
        Ok(notes)
    }
}

impl ArticlePipeline for DeepSeekPipeline {
    fn run(
        &self,
        topic: &str,
        toggles: &StageToggles,
        observer: &dyn LifecycleObserver,
        files: &dyn ArtifactAccess,
    ) -> Result<()> {
        let client = self.build_client()?;
        let dir = topic_dir(topic);
        debug!(topic, %dir, "engine run starting");

        let notes = if toggles.do_research {
            self.research(&client, topic, observer, files, &dir)?
        } else {
            String::new()
        };

        if toggles.do_generate_outline {
            observer.on_information_organization_start();
            let outline = self.chat(
                &client,
                "outline",
                "You write hierarchical outlines for encyclopedic articles, using \
                 markdown headings.",
                &format!("Topic: {topic}\nResearch notes:\n{notes}"),
            )?;
            files.write(&format!("{dir}/direct_gen_outline.txt"), &outline);
            observer.on_direct_outline_generation_end();

            let refined = self.chat(
                &client,
                "outline",
                "You refine article outlines: merge duplicate sections, order them \
                 logically, keep markdown headings.",
                &outline,
            )?;
            files.write(&format!("{dir}/storm_gen_outline.txt"), &refined);
            observer.on_outline_refinement_end();
        }

        if toggles.do_generate_article {
            let outline = files.read(&format!("{dir}/storm_gen_outline.txt"));
            let draft = self.chat(
                &client,
                "article",
                "You write complete encyclopedic articles in markdown, following the \
                 given outline and grounding claims in the research notes.",
                &format!("Topic: {topic}\nOutline:\n{outline}\nResearch notes:\n{notes}"),
            )?;
            files.write(&format!("{dir}/storm_gen_article.txt"), &draft);
        }

        if toggles.do_polish_article {
            let draft = files.read(&format!("{dir}/storm_gen_article.txt"));
            let polished = self.chat(
                &client,
                "polish",
                "You polish article drafts: add a lead summary, remove repetition, \
                 keep the markdown structure.",
                &draft,
            )?;
            files.write(&format!("{dir}/polished_article.txt"), &polished);
        }

        Ok(())
    }
}

/// Directory name a topic's artifacts live under.
fn topic_dir(topic: &str) -> String {
    topic.trim().replace(' ', "_")
}

/// Parse a model-written list: one item per line, bullets and numbering
/// stripped, capped at `max` items.
fn parse_list(text: &str, max: usize) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-' || c == '*')
                .trim()
        })
        .filter(|line| !line.is_empty())
        .take(max)
        .map(str::to_string)
        .collect()
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn to_json<T: serde::Serialize>(value: &T, stage: &str) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::pipeline(stage, e.to_string()))
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize, serde::Serialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<SearchHit>,
}

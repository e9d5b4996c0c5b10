use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

const PLACEHOLDER_PREFIX: &str = "Unable to generate ";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend rejected the request: {0}")]
    Rejected(String),
}

/// Text-generation capability: model + prompt in, text out.
#[async_trait]
pub trait TextBackend: Send + Sync {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, BackendError>;
}

#[async_trait]
impl<T: TextBackend + ?Sized> TextBackend for Arc<T> {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, BackendError> {
        (**self).complete(model, prompt).await
    }
}

/// Local Ollama-style server speaking `/api/generate`.
pub struct OllamaBackend {
    http: reqwest::Client,
    host: String,
}

impl OllamaBackend {
    pub fn new(host: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            host: host.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TextBackend for OllamaBackend {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, BackendError> {
        #[derive(Serialize)]
        struct ReqBody<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
        }
        #[derive(Deserialize)]
        struct RespBody {
            #[serde(default)]
            response: String,
            error: Option<String>,
        }

        let url = format!("{}/api/generate", self.host);
        let body: RespBody = self
            .http
            .post(&url)
            .json(&ReqBody {
                model,
                prompt,
                stream: false,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match body.error {
            Some(e) => Err(BackendError::Rejected(e)),
            None => Ok(body.response),
        }
    }
}

/// Outcome of a generation request. Exhaustion is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Generated(String),
    Exhausted { placeholder: String, attempts: u32 },
}

impl Generation {
    pub fn into_text(self) -> String {
        match self {
            Generation::Generated(text) => text,
            Generation::Exhausted { placeholder, .. } => placeholder,
        }
    }
}

pub fn placeholder(task: &str) -> String {
    format!("{}{}", PLACEHOLDER_PREFIX, task)
}

/// True only for the exact placeholder stored after `task` ran out of attempts.
pub fn is_placeholder(text: &str, task: &str) -> bool {
    text.trim() == placeholder(task)
}

pub fn poem_task(name: &str) -> String {
    format!("haiku for {}", name)
}

pub fn summary_task(name: &str) -> String {
    format!("summary for {}", name)
}

/// Retry decorator around a [`TextBackend`].
pub struct ContentGenerator<B> {
    backend: B,
    model: String,
    max_attempts: u32,
    backoff: Duration,
}

impl<B: TextBackend> ContentGenerator<B> {
    pub fn new(backend: B, model: impl Into<String>, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            backend,
            model: model.into(),
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Ask the backend for `prompt`, retrying errors and blank answers.
    ///
    /// `task` names the content for logs and for the placeholder returned
    /// once every attempt has failed.
    pub async fn generate(&self, task: &str, prompt: &str) -> Generation {
        for attempt in 1..=self.max_attempts {
            match self.backend.complete(&self.model, prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    let text = text.trim().to_string();
                    info!(attempt, task, "Generated:\n{}", text);
                    return Generation::Generated(text);
                }
                Ok(_) => warn!(
                    attempt,
                    task,
                    "Empty response (attempt {}/{})",
                    attempt,
                    self.max_attempts
                ),
                Err(e) => warn!(
                    attempt,
                    task,
                    "Backend error (attempt {}/{}): {}",
                    attempt,
                    self.max_attempts,
                    e
                ),
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff).await;
            }
        }

        warn!(task, "Giving up after {} attempts", self.max_attempts);
        Generation::Exhausted {
            placeholder: placeholder(task),
            attempts: self.max_attempts,
        }
    }
}

pub fn poem_prompt(name: &str, description: &str) -> String {
    format!(
        "Write a haiku about {name}. Use this description of them as inspiration:\n\n{description}\n\n\
         Reply with the haiku only."
    )
}

pub fn summary_prompt(name: &str, description: &str) -> String {
    format!(
        "The following Norwegian text describes {name}. Translate it to English and \
         summarize it in two or three sentences:\n\n{description}\n\n\
         Reply with the English summary only."
    )
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Replays scripted answers; `None` means a backend error.
    struct Scripted {
        answers: Mutex<VecDeque<Option<String>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(answers: &[Option<&str>]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().map(|a| a.map(String::from)).collect()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextBackend for Scripted {
        async fn complete(&self, _model: &str, _prompt: &str) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answers.lock().unwrap().pop_front().flatten() {
                Some(text) => Ok(text),
                None => Err(BackendError::Rejected("model not loaded".into())),
            }
        }
    }

    #[tokio::test]
    async fn always_failing_returns_placeholder() {
        let gen = ContentGenerator::new(Scripted::new(&[]), "m", 3, Duration::ZERO);
        let out = gen.generate("haiku for Ola", "p").await;
        assert_eq!(gen.backend.calls(), 3);
        assert_eq!(
            out,
            Generation::Exhausted {
                placeholder: "Unable to generate haiku for Ola".into(),
                attempts: 3
            }
        );
        assert!(is_placeholder(&out.into_text(), "haiku for Ola"));
    }

    #[test]
    fn placeholder_must_match_its_task() {
        assert!(is_placeholder(&placeholder(&poem_task("Ola")), &poem_task("Ola")));
        assert!(!is_placeholder(&placeholder(&poem_task("Ola")), &summary_task("Ola")));
        assert!(!is_placeholder(
            "Unable to generate a haiku without more context, but here is one anyway",
            &poem_task("Ola")
        ));
    }

    #[tokio::test]
    async fn fails_twice_then_succeeds() {
        let backend = Scripted::new(&[None, None, Some("Snow on the fjord")]);
        let gen = ContentGenerator::new(backend, "m", 3, Duration::ZERO);
        let out = gen.generate("haiku", "p").await;
        assert_eq!(gen.backend.calls(), 3);
        assert_eq!(out, Generation::Generated("Snow on the fjord".into()));
    }

    #[tokio::test]
    async fn blank_response_counts_as_failure() {
        let backend = Scripted::new(&[Some("   \n"), Some("Real text\n")]);
        let gen = ContentGenerator::new(backend, "m", 3, Duration::ZERO);
        let out = gen.generate("summary", "p").await;
        assert_eq!(gen.backend.calls(), 2);
        assert_eq!(out.into_text(), "Real text");
    }

    #[tokio::test]
    async fn first_success_makes_one_call() {
        let gen = ContentGenerator::new(Scripted::new(&[Some("ok")]), "m", 5, Duration::ZERO);
        let out = gen.generate("summary", "p").await;
        assert!(matches!(out, Generation::Generated(_)));
        assert_eq!(gen.backend.calls(), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let gen = ContentGenerator::new(Scripted::new(&[]), "m", 0, Duration::ZERO);
        gen.generate("summary", "p").await;
        assert_eq!(gen.backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_only_between_attempts() {
        let gen = ContentGenerator::new(Scripted::new(&[]), "m", 3, Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        gen.generate("haiku", "p").await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(11));
    }

    #[test]
    fn prompts_mention_person() {
        assert!(poem_prompt("Ola", "Liker ski").contains("haiku about Ola"));
        let p = summary_prompt("Ola", "Liker ski");
        assert!(p.contains("English") && p.contains("Liker ski"));
    }
}

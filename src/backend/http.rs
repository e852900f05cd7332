//! HTTP implementation of the job protocol
//!
//! Talks to an agents-style REST API: create a thread, post the prompt as a
//! user message, start a run against the configured model deployment, poll
//! the run until it reaches a terminal status, then fetch the last assistant
//! message. Terminal failure states and poll timeouts resolve to `Ok(None)`
//! so the retry layer can treat them uniformly.

use super::{JobBackend, JobHandle};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// System framing prepended to every analysis request.
const SYSTEM_INSTRUCTIONS: &str =
    "You are an expert in IT audit, compliance, and segregation of duties analysis.";

pub struct AgentsBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    poll_interval: Duration,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct CreateRun<'a> {
    model: &'a str,
}

#[derive(Deserialize)]
struct RunStatus {
    status: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    role: String,
    content: MessageContent,
}

/// The message body shows up either as a plain string or as a list of
/// content blocks with nested text values, depending on the backend.
#[derive(Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<TextValue>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextValue {
    Plain(String),
    Nested { value: String },
}

impl MessageContent {
    fn into_text(self) -> Option<String> {
        match self {
            MessageContent::Text(s) => Some(s),
            MessageContent::Blocks(blocks) => blocks.into_iter().find_map(|b| match b.text {
                Some(TextValue::Plain(s)) => Some(s),
                Some(TextValue::Nested { value }) => Some(value),
                None => None,
            }),
        }
    }
}

impl AgentsBackend {
    pub fn new(
        endpoint: String,
        model: String,
        api_key: Option<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            api_key,
            poll_interval,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .request(self.client.post(&url))
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!("backend returned {} for {}: {}", status, url, text));
        }
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse backend response from {}", url))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!("backend returned {} for {}: {}", status, url, text));
        }
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse backend response from {}", url))
    }

    async fn last_assistant_message(&self, thread_id: &str) -> Result<Option<String>> {
        let messages: MessageList = self
            .get_json(&format!("/threads/{}/messages", thread_id))
            .await?;
        let text = messages
            .data
            .into_iter()
            .filter(|m| m.role == "assistant")
            .next_back()
            .and_then(|m| m.content.into_text());
        if text.is_none() {
            tracing::warn!(thread_id, "no assistant message found in thread");
        }
        Ok(text)
    }
}

#[async_trait]
impl JobBackend for AgentsBackend {
    async fn submit(&self, prompt: &str) -> Result<JobHandle> {
        let thread: Created = self.post_json("/threads", &serde_json::json!({})).await?;
        tracing::debug!(thread_id = %thread.id, "created thread");

        self.post_json::<_, serde_json::Value>(
            &format!("/threads/{}/messages", thread.id),
            &CreateMessage {
                role: "user",
                content: format!("{}\n\n{}", SYSTEM_INSTRUCTIONS, prompt),
            },
        )
        .await?;

        let run: Created = self
            .post_json(
                &format!("/threads/{}/runs", thread.id),
                &CreateRun { model: &self.model },
            )
            .await?;
        tracing::debug!(run_id = %run.id, "created run");

        Ok(JobHandle {
            thread_id: thread.id,
            run_id: run.id,
        })
    }

    async fn await_result(&self, handle: &JobHandle, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;

        loop {
            let run: RunStatus = self
                .get_json(&format!(
                    "/threads/{}/runs/{}",
                    handle.thread_id, handle.run_id
                ))
                .await?;
            tracing::debug!(status = %run.status, run_id = %handle.run_id, "run status");

            match run.status.as_str() {
                "completed" => return self.last_assistant_message(&handle.thread_id).await,
                "failed" | "cancelled" | "expired" => {
                    tracing::warn!(status = %run.status, run_id = %handle.run_id, "run ended without result");
                    return Ok(None);
                }
                _ => {}
            }

            if Instant::now() + self.poll_interval > deadline {
                tracing::warn!(run_id = %handle.run_id, "run polling timed out");
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

use anyhow::{Result, bail};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Developer,
    System,
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> ChatMessage {
        ChatMessage {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> ChatMessage {
        ChatMessage {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One web-search result, trimmed down to what the summarizer needs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub text: String,
    pub url: String,
}

/// Structured answer returned by `POST /api/chat/v2`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Answer {
    pub title: String,
    pub summary: String,
    pub links: Vec<Link>,
    pub related_questions: Vec<String>,
}

impl Answer {
    pub const SCHEMA_NAME: &'static str = "search_summary";

    /// Strict JSON schema handed to the model as `response_format`.
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "summary": { "type": "string" },
                "links": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "text": { "type": "string" },
                            "url": { "type": "string" }
                        },
                        "required": ["text", "url"],
                        "additionalProperties": false
                    }
                },
                "related_questions": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["title", "summary", "links", "related_questions"],
            "additionalProperties": false
        })
    }

    /// Parses raw model output and checks it before it ever reaches the UI.
    /// Blank related questions are dropped rather than failing the answer.
    pub fn parse(raw: &str) -> Result<Answer> {
        let mut answer: Answer = serde_json::from_str(raw)?;
        answer.related_questions.retain(|q| !q.trim().is_empty());
        answer.validate()?;
        Ok(answer)
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            bail!("answer has an empty title");
        }
        if self.summary.trim().is_empty() {
            bail!("answer has an empty summary");
        }
        for link in &self.links {
            if link.text.trim().is_empty() {
                bail!("link to {} has no text", link.url);
            }
            let url = Url::parse(&link.url)
                .map_err(|e| anyhow::anyhow!("invalid link url {:?}: {e}", link.url))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                bail!("link url {} is not http(s)", link.url);
            }
        }
        Ok(())
    }
}

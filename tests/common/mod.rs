#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use intellisearch::data_models::{Answer, ChatMessage, Link, SearchHit};
use intellisearch::gateway::AnswerGateway;
use intellisearch::providers::{GeoLocator, LanguageModel, SearchProvider, TextStream};

pub const DEFAULT_LOCATION: &str = "South Africa";

pub fn sample_answer() -> Answer {
    Answer {
        title: "Tokio runtime".to_string(),
        summary: "Tokio is an asynchronous runtime for Rust.".to_string(),
        links: vec![Link {
            text: "tokio.rs".to_string(),
            url: "https://tokio.rs".to_string(),
        }],
        related_questions: vec!["How does the tokio scheduler work?".to_string()],
    }
}

pub fn sample_hits() -> Vec<SearchHit> {
    vec![SearchHit {
        title: "Tokio".to_string(),
        url: "https://tokio.rs".to_string(),
        snippet: "An asynchronous Rust runtime".to_string(),
    }]
}

pub enum Summary {
    Answer(Answer),
    Fail(&'static str),
}

pub enum Stream {
    Chunks(Vec<&'static str>),
    FailAfter(Vec<&'static str>),
    FailSetup(&'static str),
}

pub struct MockLlm {
    pub summarize_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    pub seen_hits: Mutex<Vec<SearchHit>>,
    summary: Summary,
    stream: Stream,
}

impl MockLlm {
    pub fn new(summary: Summary, stream: Stream) -> Arc<Self> {
        Arc::new(Self {
            summarize_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            seen_hits: Mutex::new(Vec::new()),
            summary,
            stream,
        })
    }

    pub fn answering() -> Arc<Self> {
        Self::new(Summary::Answer(sample_answer()), Stream::Chunks(vec![]))
    }

    pub fn streaming(chunks: Vec<&'static str>) -> Arc<Self> {
        Self::new(Summary::Answer(sample_answer()), Stream::Chunks(chunks))
    }

    pub fn summarize_count(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn stream_chat(&self, _messages: &[ChatMessage]) -> Result<TextStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let items: Vec<Result<String>> = match &self.stream {
            Stream::Chunks(chunks) => chunks.iter().map(|c| Ok(c.to_string())).collect(),
            Stream::FailAfter(chunks) => chunks
                .iter()
                .map(|c| Ok(c.to_string()))
                .chain(std::iter::once(Err(anyhow::anyhow!("connection reset"))))
                .collect(),
            Stream::FailSetup(msg) => bail!("{msg}"),
        };
        Ok(futures::stream::iter(items).boxed())
    }

    async fn summarize(&self, _query: &str, hits: &[SearchHit]) -> Result<Answer> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_hits.lock().unwrap().extend_from_slice(hits);
        match &self.summary {
            Summary::Answer(answer) => Ok(answer.clone()),
            Summary::Fail(msg) => bail!("{msg}"),
        }
    }
}

pub struct MockSearch {
    pub calls: AtomicUsize,
    pub locations: Mutex<Vec<String>>,
    fail: bool,
    delay: Option<Duration>,
}

impl MockSearch {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            locations: Mutex::new(Vec::new()),
            fail: false,
            delay: None,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            locations: Mutex::new(Vec::new()),
            fail: true,
            delay: None,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            locations: Mutex::new(Vec::new()),
            fail: false,
            delay: Some(delay),
        })
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_location(&self) -> Option<String> {
        self.locations.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, _query: &str, location: &str) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.locations.lock().unwrap().push(location.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            bail!("search provider returned HTTP 502 Bad Gateway");
        }
        Ok(sample_hits())
    }
}

pub enum Geo {
    Found(&'static str),
    Incomplete,
    Fail,
}

pub struct MockGeo {
    pub calls: AtomicUsize,
    pub ips: Mutex<Vec<String>>,
    behaviour: Geo,
}

impl MockGeo {
    pub fn new(behaviour: Geo) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            ips: Mutex::new(Vec::new()),
            behaviour,
        })
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoLocator for MockGeo {
    async fn locate(&self, ip: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ips.lock().unwrap().push(ip.to_string());
        match self.behaviour {
            Geo::Found(location) => Ok(Some(location.to_string())),
            Geo::Incomplete => Ok(None),
            Geo::Fail => bail!("geolocation quota exceeded"),
        }
    }
}

pub fn gateway(
    llm: Arc<MockLlm>,
    search: Arc<MockSearch>,
    geo: Option<Arc<MockGeo>>,
) -> AnswerGateway {
    gateway_with_timeout(llm, search, geo, Duration::from_secs(5))
}

pub fn gateway_with_timeout(
    llm: Arc<MockLlm>,
    search: Arc<MockSearch>,
    geo: Option<Arc<MockGeo>>,
    timeout: Duration,
) -> AnswerGateway {
    AnswerGateway::new(
        llm,
        search,
        geo.map(|g| g as Arc<dyn GeoLocator>),
        DEFAULT_LOCATION,
        timeout,
    )
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

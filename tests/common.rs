#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pdfharvest::config::{DocumentFormat, HarvestConfig, TokenizerConfig};
use pdfharvest::error::{Error, Result};
use pdfharvest::extract::DocumentProcessor;
use pdfharvest::fetch::Fetcher;
use pdfharvest::harvest::Harvester;
use pdfharvest::pipeline::cancel::CancelToken;
use pdfharvest::pipeline::pipe::Pipe;
use pdfharvest::pipeline::retry::RetryPolicy;
use pdfharvest::types::ProcessedDocument;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{Receiver, Sender};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

// ── generic stages ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct VecSource<T> {
    items: Vec<T>,
    strict_downstream: bool,
}

impl<T> VecSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            strict_downstream: false,
        }
    }

    pub fn strict_downstream(mut self, strict: bool) -> Self {
        self.strict_downstream = strict;
        self
    }
}

#[async_trait]
impl<T> Pipe<(), T> for VecSource<T>
where
    T: Send + Sync + Clone + 'static,
{
    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<T>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = input.recv() => {}
        }

        let items = self.items.clone();
        for item in items {
            if cancel.is_draining() {
                break;
            }
            if output.send(item).await.is_err() {
                if self.strict_downstream && !cancel.is_cancelled() {
                    return Err(Error::pipeline("downstream receiver closed unexpectedly"));
                }
                break;
            }
        }
        Ok(())
    }
}

pub struct CollectSink<T> {
    out: Arc<Mutex<Vec<T>>>,
}

impl<T> CollectSink<T> {
    pub fn new(out: Arc<Mutex<Vec<T>>>) -> Self {
        Self { out }
    }
}

#[async_trait]
impl<T> Pipe<T, ()> for CollectSink<T>
where
    T: Send + Sync + 'static,
{
    async fn process(
        &self,
        mut input: Receiver<T>,
        _output: Sender<()>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = input.recv() => {
                    let Some(v) = msg else { break; };
                    self.out.lock().expect("mutex poisoned").push(v);
                }
            }
        }
        Ok(())
    }
}

// ── fixtures ──────────────────────────────────────────────────────────────────

/// `n` whitespace-separated words.
pub fn words(n: usize) -> String {
    (0..n).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ")
}

/// An in-memory ZIP archive with the given `(entry name, body)` pairs.
pub fn zip_bytes(entries: &[(&str, String)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(body.as_bytes()).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

pub fn doc(name: &str, text: &str) -> ProcessedDocument {
    ProcessedDocument {
        filename: name.to_string(),
        text: text.to_string(),
        token_count: text.split_whitespace().count(),
        language: "unknown".to_string(),
    }
}

/// Remote path of archive `index` below the store root.
pub fn archive_path(index: u32) -> String {
    let start = (index / 1000) * 1000;
    format!("/zipfiles/{start:04}-{:04}/{index:04}.zip", start + 999)
}

pub async fn mount_archive(server: &MockServer, index: u32, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(archive_path(index)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

/// A store that answers every GET with `body`, but cuts the first
/// `truncated` responses off halfway while still announcing the full
/// `Content-Length`. Returns the store's base URL.
pub async fn truncating_store(body: Vec<u8>, truncated: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind store");
    let addr = listener.local_addr().expect("store address");

    tokio::spawn(async move {
        let mut served = 0usize;
        while let Ok((mut socket, _)) = listener.accept().await {
            read_request_head(&mut socket).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let sent = if served < truncated {
                &body[..body.len() / 2]
            } else {
                &body[..]
            };
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(sent).await;
            let _ = socket.shutdown().await;
            served += 1;
        }
    });

    format!("http://{addr}")
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

/// A configuration for plain-text archives with whitespace token counting,
/// staging and output under `dir`.
pub fn text_config(base_url: &str, dir: &Path) -> HarvestConfig {
    let mut config = HarvestConfig::default();
    config.source.base_url = base_url.to_string();
    config.source.total_archives = 1;
    config.source.entry_suffix = ".txt".to_string();
    config.limits.target_count = 10;
    config.limits.min_tokens = 10;
    config.limits.max_tokens = 50;
    config.concurrency.downloads = 2;
    config.concurrency.processors = 2;
    config.concurrency.queue = 4;
    config.paths.staging_dir = dir.join("staging");
    config.paths.output = dir.join("out").join("ledger.json");
    config.ledger.checkpoint_every = 0;
    config.text.format = DocumentFormat::Text;
    config.text.tokenizer = TokenizerConfig::Whitespace;
    config
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts)
        .base_delay(Duration::from_millis(5))
        .max_delay(Duration::from_millis(20))
}

pub fn fast_fetcher(max_attempts: u32) -> Fetcher {
    Fetcher::with_client(reqwest::Client::new(), fast_retry(max_attempts))
}

pub fn harvester(config: HarvestConfig) -> Harvester {
    let processor = DocumentProcessor::from_config(&config).expect("processor");
    Harvester::with_parts(config, fast_fetcher(3), processor)
}

pub fn read_ledger(path: &Path) -> Vec<ProcessedDocument> {
    let content = std::fs::read_to_string(path).expect("ledger file");
    serde_json::from_str(&content).expect("ledger json")
}

//! yt-dlp backed search and resolve.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use encore_proto::protocol::{Candidate, Item, ItemKind};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::ports::SearchResolveProvider;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);
const SEARCH_RESULTS: usize = 5;

pub struct YtDlpResolver {
    binary: PathBuf,
}

impl YtDlpResolver {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Locate yt-dlp beside the executable, via `YT_DLP_PATH`, or on `PATH`.
    pub fn discover() -> Option<Self> {
        encore_proto::platform::find_yt_dlp_binary().map(Self::new)
    }

    async fn dump_json(&self, target: &str) -> Result<Value, ProviderError> {
        debug!("yt-dlp: -J {}", target);
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-J")
            .arg("--flat-playlist")
            .arg("--no-warnings")
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(RESOLVE_TIMEOUT, cmd.output())
            .await
            .map_err(|_| ProviderError::Unavailable(format!("yt-dlp timed out on {target}")))?
            .map_err(|e| ProviderError::Unavailable(format!("failed to run yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first = stderr.lines().next().unwrap_or_default();
            warn!("yt-dlp exited with {:?}: {}", output.status.code(), first);
            return Err(ProviderError::Rejected(first.to_string()));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ProviderError::Malformed(format!("yt-dlp output: {e}")))
    }
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// One yt-dlp info dict (full or flat) as a playable item.
pub fn entry_to_item(entry: &Value) -> Option<Item> {
    let identifier = entry["id"].as_str().map(str::to_owned);
    let locator = entry["webpage_url"]
        .as_str()
        .or_else(|| entry["url"].as_str())
        .map(str::to_owned)
        .or_else(|| {
            identifier
                .as_ref()
                .map(|id| format!("https://www.youtube.com/watch?v={id}"))
        })?;
    let title = entry["title"].as_str().unwrap_or("Unknown").to_string();
    let duration_ms = entry["duration"].as_f64().map(|s| (s * 1000.0) as u64);

    Some(Item {
        identifier,
        title,
        locator,
        duration_ms,
        kind: ItemKind::Track,
    })
}

/// Items in a `-J` dump: the playlist entries, or the single video.
pub fn items_from_dump(dump: &Value) -> Vec<Item> {
    match dump["entries"].as_array() {
        Some(entries) => entries.iter().filter_map(entry_to_item).collect(),
        None => entry_to_item(dump).into_iter().collect(),
    }
}

#[async_trait]
impl SearchResolveProvider for YtDlpResolver {
    async fn resolve(&self, locator_or_query: &str) -> Result<Vec<Item>, ProviderError> {
        let query = locator_or_query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let target = if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{query}")
        };
        let dump = self.dump_json(&target).await?;
        Ok(items_from_dump(&dump))
    }

    async fn search_text(&self, query: &str) -> Result<Vec<Candidate>, ProviderError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let dump = self
            .dump_json(&format!("ytsearch{SEARCH_RESULTS}:{query}"))
            .await?;
        let candidates = items_from_dump(&dump)
            .into_iter()
            .filter_map(|item| {
                Some(Candidate {
                    identifier: item.identifier?,
                    title: item.title,
                    locator: item.locator,
                })
            })
            .collect();
        Ok(candidates)
    }
}

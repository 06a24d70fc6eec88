/// Follow-up recommendations from YouTube's auto-generated mix playlist.
///
/// The watch page for `v=<seed>&list=RD<seed>` embeds the mix as JSON in a
/// `ytInitialData = {...};` script assignment.  We pull that object out with
/// a regex and read `playlistPanelVideoRenderer` entries from it.  Any
/// network or parse failure degrades to "no recommendations".
use std::time::Duration;

use async_trait::async_trait;
use encore_proto::config::RecommendConfig;
use encore_proto::protocol::Candidate;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::ports::RecommendationProvider;

const WATCH_URL: &str = "https://www.youtube.com/watch";

pub struct MixRecommender {
    client: Client,
    initial_data: Regex,
}

impl MixRecommender {
    pub fn new(config: &RecommendConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            initial_data: initial_data_regex()?,
        })
    }

    async fn fetch_page(&self, seed: &str) -> Result<String, ProviderError> {
        let list = format!("RD{seed}");
        let resp = self
            .client
            .get(WATCH_URL)
            .query(&[("v", seed), ("list", list.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", resp.status())));
        }
        resp.text()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))
    }
}

fn initial_data_regex() -> Result<Regex, regex::Error> {
    Regex::new(r"(?s)ytInitialData\s*=\s*(\{.*?\});")
}

/// Mix entries on a watch page, first `cap` panel entries minus the seed.
pub fn parse_mix_page(
    re: &Regex,
    html: &str,
    seed: &str,
    cap: usize,
) -> Result<Vec<Candidate>, ProviderError> {
    let Some(json) = re.captures(html).and_then(|c| c.get(1)) else {
        return Ok(Vec::new());
    };
    let data: Value = serde_json::from_str(json.as_str())
        .map_err(|e| ProviderError::Malformed(format!("ytInitialData: {e}")))?;

    let contents = data
        .pointer("/contents/twoColumnWatchNextResults/playlist/playlist/contents")
        .and_then(Value::as_array);
    let Some(contents) = contents else {
        return Ok(Vec::new());
    };

    let candidates = contents
        .iter()
        .take(cap)
        .filter_map(|entry| {
            let video = entry.get("playlistPanelVideoRenderer")?;
            let id = video.get("videoId")?.as_str()?;
            if id == seed {
                return None;
            }
            let title = video
                .pointer("/title/runs/0/text")
                .or_else(|| video.pointer("/title/simpleText"))
                .and_then(Value::as_str)
                .unwrap_or("Unknown");
            Some(Candidate {
                title: title.to_string(),
                identifier: id.to_string(),
                locator: format!("{WATCH_URL}?v={id}"),
            })
        })
        .collect();
    Ok(candidates)
}

#[async_trait]
impl RecommendationProvider for MixRecommender {
    async fn recommend(&self, seed_identifier: &str, cap: usize) -> Result<Vec<Candidate>, ProviderError> {
        let parsed = match self.fetch_page(seed_identifier).await {
            Ok(html) => parse_mix_page(&self.initial_data, &html, seed_identifier, cap),
            Err(e) => Err(e),
        };
        match parsed {
            Ok(candidates) => {
                debug!("recommend: {} candidates for {}", candidates.len(), seed_identifier);
                Ok(candidates)
            }
            Err(e) => {
                warn!("recommend: mix for {} unavailable: {}", seed_identifier, e);
                Ok(Vec::new())
            }
        }
    }
}

//! Google Translate text-to-speech: the "synthesis" is a URL mpv can stream.

use async_trait::async_trait;
use reqwest::Url;

use crate::error::ProviderError;
use crate::ports::{SpeechOptions, SynthesisProvider};

const TTS_ENDPOINT: &str = "https://translate.google.com/translate_tts";

/// Longest text the endpoint accepts in one request.
pub const MAX_TEXT_CHARS: usize = 200;

#[derive(Debug, Default, Clone)]
pub struct GoogleTts;

pub fn audio_url(text: &str, options: &SpeechOptions) -> Result<Url, ProviderError> {
    let len = text.chars().count();
    if len > MAX_TEXT_CHARS {
        return Err(ProviderError::Rejected(format!(
            "text is {len} characters, at most {MAX_TEXT_CHARS} can be spoken"
        )));
    }
    let textlen = len.to_string();
    let speed = if options.slow { "0.24" } else { "1" };
    Url::parse_with_params(
        TTS_ENDPOINT,
        &[
            ("ie", "UTF-8"),
            ("q", text),
            ("tl", options.lang.as_str()),
            ("total", "1"),
            ("idx", "0"),
            ("textlen", textlen.as_str()),
            ("client", "tw-ob"),
            ("prev", "input"),
            ("ttsspeed", speed),
        ],
    )
    .map_err(|e| ProviderError::Malformed(e.to_string()))
}

#[async_trait]
impl SynthesisProvider for GoogleTts {
    async fn synthesize(&self, text: &str, options: &SpeechOptions) -> Result<String, ProviderError> {
        audio_url(text, options).map(String::from)
    }
}

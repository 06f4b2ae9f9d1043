//! Chunk translation on top of a text generation backend.
//! A chunk is sent as one prompt with its texts joined by [`SEGMENT_DELIMITER`]
//! and the answer is split back on the same token.

use crate::error::{Result, TranslationError};
use crate::srt::SubtitleEntry;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub mod gemini;
pub mod openai;

/// Token placed between subtitle texts inside one request.
pub const SEGMENT_DELIMITER: &str = "|||---|||";

/// Number of entries sampled for language detection.
const DETECTION_SAMPLE: usize = 15;

/// A text generation service: prompt in, completion out.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Run `prompt` against `model` and return the raw response text.
    async fn generate(&self, prompt: &str, model: &str) -> Result<String>;
}

/// Translates bounded batches of entries with a fixed backend and model.
pub struct ChunkTranslator<B: ?Sized> {
    backend: Arc<B>,
    model: String,
}

impl<B: ?Sized> Clone for ChunkTranslator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            model: self.model.clone(),
        }
    }
}

impl<B: Backend + ?Sized> ChunkTranslator<B> {
    /// Create a translator that sends every request to `model` on `backend`.
    pub fn new(backend: Arc<B>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Translate `entries` into `target_language`.
    ///
    /// The result has exactly one text per entry, in entry order. A response
    /// with any other segment count is rejected as a whole.
    pub async fn translate_chunk(
        &self,
        entries: &[SubtitleEntry],
        target_language: &str,
    ) -> Result<Vec<String>> {
        trace!(
            "translate_chunk entries={} target={}",
            entries.len(),
            target_language
        );
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = build_translation_prompt(entries, target_language);
        let response = self.backend.generate(&prompt, &self.model).await?;
        let segments = split_segments(&response);
        if segments.len() != entries.len() {
            warn!(
                "segment mismatch for {}: expected {}, got {}",
                target_language,
                entries.len(),
                segments.len()
            );
            return Err(TranslationError::MalformedTranslationOutput {
                expected: entries.len(),
                received: segments.len(),
            });
        }
        debug!("translated {} segments to {}", segments.len(), target_language);
        Ok(segments)
    }

    /// Ask the backend which language the subtitles are written in.
    /// Only the first few entries are sent; the answer is the trimmed response.
    pub async fn detect_language(&self, entries: &[SubtitleEntry]) -> Result<String> {
        trace!("detect_language entries={}", entries.len());
        let sample: Vec<&str> = entries
            .iter()
            .map(|e| e.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .take(DETECTION_SAMPLE)
            .collect();
        if sample.is_empty() {
            return Err(TranslationError::InvalidDocument);
        }
        let prompt = format!(
            "Identify the language of the following subtitle lines.\n\
Answer with the English name of the language only, for example \"Spanish\".\n\n{}",
            sample.join("\n")
        );
        let answer = self.backend.generate(&prompt, &self.model).await?;
        let language = answer.trim().trim_end_matches('.').to_string();
        if language.is_empty() {
            return Err(TranslationError::BackendUnavailable(
                "empty language detection response".to_string(),
            ));
        }
        Ok(language)
    }
}

/// Build the instruction sent for one chunk.
pub fn build_translation_prompt(entries: &[SubtitleEntry], target_language: &str) -> String {
    let joined = entries
        .iter()
        .map(|e| e.text.as_str())
        .collect::<Vec<_>>()
        .join(SEGMENT_DELIMITER);
    format!(
        "You are an expert subtitle translator.
Your task is to translate the following text blocks into {target_language}.
The text blocks are separated by a special delimiter: \"{SEGMENT_DELIMITER}\".
You MUST preserve this delimiter in your translated output.
Do not add any introductory phrases, explanations, or any text other than the translated blocks and their delimiters.
The number of translated blocks separated by the delimiter must be exactly the same as the number of original blocks.
Keep the original line breaks within each text block.

Here are the text blocks to translate:
---
{joined}
---
"
    )
}

/// Split a raw response on the delimiter, trimming each segment.
fn split_segments(response: &str) -> Vec<String> {
    response
        .split(SEGMENT_DELIMITER)
        .map(|s| s.trim().to_string())
        .collect()
}

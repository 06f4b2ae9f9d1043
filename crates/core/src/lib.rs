//! Translate SRT subtitles into several languages with a text generation backend.
//!
//! The pipeline runs bottom-up: [`srt`] parses and formats cues,
//! [`translate`] sends one bounded chunk per request, [`batch`] fans a whole
//! document out over concurrent chunks and [`queue`] runs one job per target
//! language, one language at a time.

pub mod batch;
pub mod error;
pub mod lang;
pub mod output;
pub mod queue;
pub mod srt;
pub mod translate;

pub use error::{Result, TranslationError};

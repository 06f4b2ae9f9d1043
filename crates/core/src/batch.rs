//! Whole-document translation for one target language.
//! The document is cut into fixed-size chunks, every chunk is translated in
//! its own task and the results are put back together in document order.

use crate::error::{Result, TranslationError};
use crate::srt::SubtitleEntry;
use crate::translate::{Backend, ChunkTranslator};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Default number of subtitle entries translated per request.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Split `entries` into consecutive chunks of at most `batch_size` entries.
/// The chunks cover the input exactly once, in order; only the last one may be shorter.
pub fn partition(entries: &[SubtitleEntry], batch_size: usize) -> Result<Vec<&[SubtitleEntry]>> {
    if batch_size == 0 {
        return Err(TranslationError::InvalidRequest(
            "batch size must be at least 1".to_string(),
        ));
    }
    Ok(entries.chunks(batch_size).collect())
}

/// Gathers chunk results that arrive in any order and rebuilds document order.
#[derive(Debug)]
pub struct ChunkCollector {
    slots: Vec<Option<Vec<String>>>,
    settled: usize,
    first_error: Option<TranslationError>,
}

impl ChunkCollector {
    pub fn new(chunks: usize) -> Self {
        Self {
            slots: vec![None; chunks],
            settled: 0,
            first_error: None,
        }
    }

    /// Record the outcome of chunk `chunk`. Returns `false` when the index is
    /// out of range or the chunk already settled; such events change nothing.
    pub fn record(&mut self, chunk: usize, result: Result<Vec<String>>) -> bool {
        let Some(slot) = self.slots.get_mut(chunk) else {
            return false;
        };
        if slot.is_some() {
            return false;
        }
        match result {
            Ok(texts) => *slot = Some(texts),
            Err(err) => {
                // Failed chunks hold an empty marker so they count as settled.
                *slot = Some(Vec::new());
                if self.first_error.is_none() {
                    self.first_error = Some(err);
                }
            }
        }
        self.settled += 1;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.settled == self.slots.len()
    }

    /// Flatten the chunk results in chunk order, or return the first error recorded.
    pub fn finish(self) -> Result<Vec<String>> {
        if let Some(err) = self.first_error {
            return Err(err);
        }
        if !self.is_complete() {
            return Err(TranslationError::BackendUnavailable(format!(
                "{} of {} chunks never settled",
                self.slots.len() - self.settled,
                self.slots.len()
            )));
        }
        Ok(self.slots.into_iter().flatten().flatten().collect())
    }
}

/// Translate every entry of `entries` into `target_language`.
///
/// All chunks are in flight at the same time. `on_progress` receives the
/// entry count of each chunk that succeeds, in completion order; a failed
/// chunk reports nothing, so the running total counts delivered entries
/// only. The returned texts follow document order; if any chunk fails the
/// whole call fails once every chunk has settled.
pub async fn translate_document<B, F>(
    translator: &ChunkTranslator<B>,
    entries: &[SubtitleEntry],
    target_language: &str,
    batch_size: usize,
    mut on_progress: F,
) -> Result<Vec<String>>
where
    B: Backend + ?Sized + 'static,
    F: FnMut(usize),
{
    trace!(
        "translate_document entries={} target={} batch_size={}",
        entries.len(),
        target_language,
        batch_size
    );
    let chunks = partition(entries, batch_size)?;
    let mut collector = ChunkCollector::new(chunks.len());
    let (tx, mut rx) = mpsc::channel(chunks.len().max(1));
    for (chunk_index, chunk) in chunks.iter().enumerate() {
        spawn_chunk(
            chunk_index,
            chunk.to_vec(),
            target_language.to_string(),
            translator.clone(),
            tx.clone(),
        );
    }
    drop(tx);
    debug!("dispatched {} chunk(s) for {}", chunks.len(), target_language);

    while !collector.is_complete() {
        let Some((chunk_index, res, elapsed)) = rx.recv().await else {
            break;
        };
        let first = chunk_index * batch_size;
        let len = chunks[chunk_index].len();
        match &res {
            Ok(_) => {
                info!(
                    "{}: translated lines {}-{} in {} ms",
                    target_language,
                    first + 1,
                    first + len,
                    elapsed
                );
                on_progress(len);
            }
            Err(err) => warn!(
                "{}: lines {}-{} failed after {} ms: {}",
                target_language,
                first + 1,
                first + len,
                elapsed,
                err
            ),
        }
        collector.record(chunk_index, res);
    }
    collector.finish()
}

/// Spawn the translation of one chunk; the outcome is sent back tagged with its index.
fn spawn_chunk<B>(
    chunk_index: usize,
    entries: Vec<SubtitleEntry>,
    target_language: String,
    translator: ChunkTranslator<B>,
    tx: mpsc::Sender<(usize, Result<Vec<String>>, u128)>,
) where
    B: Backend + ?Sized + 'static,
{
    tokio::spawn(async move {
        let begin = Instant::now();
        let res = translator
            .translate_chunk(&entries, &target_language)
            .await;
        let elapsed = begin.elapsed().as_millis();
        let _ = tx.send((chunk_index, res, elapsed)).await;
    });
}

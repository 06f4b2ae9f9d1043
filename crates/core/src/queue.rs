//! Multi-language job queue.
//!
//! [`JobQueue`] is a plain state machine: one job per target language, at
//! most one of them translating, advanced only by settlement events.
//! [`Controller`] drives it asynchronously and exposes pause, resume and
//! cancel to other tasks.
//!
//! Every run carries a generation number. Tickets and progress events from
//! an older generation are dropped, so requests still in flight after a
//! cancel can never touch the jobs of a newer run.

use crate::batch;
use crate::error::{Result, TranslationError};
use crate::lang;
use crate::output::TranslatedFile;
use crate::srt::{self, SubtitleEntry};
use crate::translate::{Backend, ChunkTranslator};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};

/// State of the run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Paused,
}

/// State of one language job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Translating,
    Completed,
    Failed,
}

/// Translation of the document into one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationJob {
    pub language: String,
    pub status: JobStatus,
    pub translated_count: usize,
    pub total_count: usize,
    /// Serialized SRT, set once the job completes.
    pub result_content: Option<String>,
    /// Set once the job fails.
    pub error_message: Option<String>,
}

/// Handle to the job currently allowed to translate.
#[derive(Debug, Clone)]
pub struct JobTicket {
    generation: u64,
    position: usize,
    pub language: String,
    pub entries: Arc<[SubtitleEntry]>,
    pub batch_size: usize,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub completed: usize,
    pub failed: usize,
    /// Translated files in the order the languages were selected.
    pub files: Vec<TranslatedFile>,
    /// `(language, message)` for every failed job.
    pub failures: Vec<(String, String)>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.completed + self.failed
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failed == 0 {
            write!(f, "Finished! Translated {} file(s).", self.completed)
        } else {
            write!(f, "{} of {} failed", self.failed, self.total())
        }
    }
}

/// Read-only view of the queue for display.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub jobs: Vec<TranslationJob>,
    pub elapsed: Option<Duration>,
    pub percent: u32,
    pub eta: Option<Duration>,
    pub error: Option<String>,
}

/// The run state machine. It is the only writer of job records.
#[derive(Debug)]
pub struct JobQueue {
    status: RunStatus,
    jobs: Vec<TranslationJob>,
    started_at: Option<Instant>,
    generation: u64,
    source_name: String,
    entries: Arc<[SubtitleEntry]>,
    batch_size: usize,
    report: Option<RunReport>,
    error: Option<String>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self {
            status: RunStatus::Idle,
            jobs: Vec::new(),
            started_at: None,
            generation: 0,
            source_name: String::new(),
            entries: Arc::from(Vec::new()),
            batch_size: batch::DEFAULT_BATCH_SIZE,
            report: None,
            error: None,
        }
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn jobs(&self) -> &[TranslationJob] {
        &self.jobs
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report of the last run that ran to completion.
    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    /// Summary of failed jobs once a run has finished with failures.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Begin a run over `entries` with one pending job per language, each
    /// job split into chunks of `batch_size` entries.
    ///
    /// Repeated languages are kept once, in first-seen order. Returns the
    /// generation of the new run.
    pub fn start(
        &mut self,
        source_name: &str,
        entries: Vec<SubtitleEntry>,
        languages: &[String],
        batch_size: usize,
        now: Instant,
    ) -> Result<u64> {
        trace!(
            "start source={} entries={} languages={:?} batch_size={}",
            source_name,
            entries.len(),
            languages,
            batch_size
        );
        if self.status != RunStatus::Idle {
            return Err(TranslationError::InvalidRequest(
                "a translation run is already active".to_string(),
            ));
        }
        if entries.is_empty() {
            return Err(TranslationError::InvalidDocument);
        }
        if batch_size == 0 {
            return Err(TranslationError::InvalidRequest(
                "batch size must be at least 1".to_string(),
            ));
        }
        let mut unique: Vec<&String> = Vec::new();
        for lang in languages {
            if !lang.trim().is_empty() && !unique.contains(&lang) {
                unique.push(lang);
            }
        }
        if unique.is_empty() {
            return Err(TranslationError::InvalidRequest(
                "select at least one target language".to_string(),
            ));
        }
        let total = entries.len();
        self.generation += 1;
        self.status = RunStatus::Running;
        self.started_at = Some(now);
        self.source_name = source_name.to_string();
        self.entries = Arc::from(entries);
        self.batch_size = batch_size;
        self.report = None;
        self.error = None;
        self.jobs = unique
            .into_iter()
            .map(|language| TranslationJob {
                language: language.clone(),
                status: JobStatus::Pending,
                translated_count: 0,
                total_count: total,
                result_content: None,
                error_message: None,
            })
            .collect();
        info!(
            "starting run {} for {} language(s)",
            self.generation,
            self.jobs.len()
        );
        Ok(self.generation)
    }

    /// Hand out the next pending job, in selection order.
    ///
    /// Nothing is handed out unless the run is `Running` and no other job
    /// is translating.
    pub fn next_job(&mut self) -> Option<JobTicket> {
        if self.status != RunStatus::Running {
            return None;
        }
        if self.jobs.iter().any(|j| j.status == JobStatus::Translating) {
            return None;
        }
        let position = self
            .jobs
            .iter()
            .position(|j| j.status == JobStatus::Pending)?;
        let total = self.jobs.len();
        let job = &mut self.jobs[position];
        job.status = JobStatus::Translating;
        let language = job.language.clone();
        info!("translating to {} ({}/{})", language, position + 1, total);
        Some(JobTicket {
            generation: self.generation,
            position,
            language,
            entries: Arc::clone(&self.entries),
            batch_size: self.batch_size,
        })
    }

    /// The translating job a ticket refers to, if the ticket is still current.
    fn current_job(&mut self, ticket: &JobTicket) -> Option<&mut TranslationJob> {
        if ticket.generation != self.generation {
            return None;
        }
        self.jobs
            .get_mut(ticket.position)
            .filter(|j| j.status == JobStatus::Translating)
    }

    /// Add `count` translated subtitles to the ticket's job.
    /// Returns `false` if the ticket is stale.
    pub fn record_progress(&mut self, ticket: &JobTicket, count: usize) -> bool {
        match self.current_job(ticket) {
            Some(job) => {
                job.translated_count = (job.translated_count + count).min(job.total_count);
                true
            }
            None => {
                debug!("ignoring progress for stale job {}", ticket.language);
                false
            }
        }
    }

    /// Settle the ticket's job with the translated texts or the error that stopped it.
    /// Returns `false` if the ticket is stale; nothing changes in that case.
    pub fn settle(&mut self, ticket: &JobTicket, outcome: Result<Vec<String>>) -> bool {
        let entries = Arc::clone(&self.entries);
        let Some(job) = self.current_job(ticket) else {
            debug!("discarding result for stale job {}", ticket.language);
            return false;
        };
        match outcome.and_then(|texts| render_translation(&entries, texts)) {
            Ok(content) => {
                job.status = JobStatus::Completed;
                job.translated_count = job.total_count;
                job.result_content = Some(content);
                info!("{} completed", job.language);
            }
            Err(err) => {
                job.status = JobStatus::Failed;
                job.error_message = Some(err.to_string());
                warn!("{} failed: {}", job.language, err);
            }
        }
        if !self
            .jobs
            .iter()
            .any(|j| matches!(j.status, JobStatus::Pending | JobStatus::Translating))
        {
            self.finish();
        }
        true
    }

    fn finish(&mut self) {
        let mut report = RunReport {
            completed: 0,
            failed: 0,
            files: Vec::new(),
            failures: Vec::new(),
        };
        for job in &self.jobs {
            match (&job.status, &job.result_content, &job.error_message) {
                (JobStatus::Completed, Some(content), _) => {
                    report.completed += 1;
                    report.files.push(TranslatedFile {
                        language: job.language.clone(),
                        file_name: lang::output_file_name(&self.source_name, &job.language),
                        content: content.clone(),
                    });
                }
                (_, _, message) => {
                    report.failed += 1;
                    report.failures.push((
                        job.language.clone(),
                        message.clone().unwrap_or_default(),
                    ));
                }
            }
        }
        if !report.failures.is_empty() {
            let lines: Vec<String> = report
                .failures
                .iter()
                .map(|(lang, msg)| format!("- {lang}: {msg}"))
                .collect();
            self.error = Some(format!(
                "Some translations failed:\n{}",
                lines.join("\n")
            ));
        }
        info!("run {} finished: {}", self.generation, report);
        self.status = RunStatus::Idle;
        self.report = Some(report);
    }

    /// Stop handing out jobs. The translating job keeps going.
    pub fn pause(&mut self) -> bool {
        if self.status != RunStatus::Running {
            return false;
        }
        self.status = RunStatus::Paused;
        info!("paused");
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.status != RunStatus::Paused {
            return false;
        }
        self.status = RunStatus::Running;
        info!("resumed");
        true
    }

    /// Drop the run: all jobs, progress, the report and any surfaced error.
    /// Requests still in flight are not aborted; their results become stale.
    pub fn cancel(&mut self) {
        info!("cancelling run {}", self.generation);
        self.generation += 1;
        self.status = RunStatus::Idle;
        self.jobs.clear();
        self.started_at = None;
        self.entries = Arc::from(Vec::new());
        self.report = None;
        self.error = None;
    }

    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.started_at.map(|s| now.saturating_duration_since(s))
    }

    fn translated_total(&self) -> usize {
        self.jobs.iter().map(|j| j.translated_count).sum()
    }

    /// Every job covers the same document, so the denominator is `total_count * jobs`.
    fn planned_total(&self) -> usize {
        self.jobs.first().map(|j| j.total_count).unwrap_or(0) * self.jobs.len()
    }

    /// Overall progress across all jobs, rounded to a whole percent.
    pub fn percent(&self) -> u32 {
        let planned = self.planned_total();
        if planned == 0 {
            return 0;
        }
        (self.translated_total() as f64 * 100.0 / planned as f64).round() as u32
    }

    /// Projected time left, from the average throughput since the run started.
    /// `None` while not running or before any subtitle was translated.
    pub fn estimated_remaining(&self, now: Instant) -> Option<Duration> {
        if self.status != RunStatus::Running {
            return None;
        }
        let done = self.translated_total();
        if done == 0 {
            return None;
        }
        let elapsed = self.elapsed(now)?;
        let remaining = self.planned_total().saturating_sub(done);
        Some(elapsed.mul_f64(remaining as f64 / done as f64))
    }

    pub fn snapshot(&self, now: Instant) -> RunSnapshot {
        RunSnapshot {
            status: self.status,
            jobs: self.jobs.clone(),
            elapsed: self.elapsed(now),
            percent: self.percent(),
            eta: self.estimated_remaining(now),
            error: self.error.clone(),
        }
    }
}

/// Put translated texts back onto the source entries and serialize them.
/// A blank translation keeps the source text so every cue stays non-empty.
fn render_translation(entries: &[SubtitleEntry], texts: Vec<String>) -> Result<String> {
    if texts.len() != entries.len() {
        return Err(TranslationError::MalformedTranslationOutput {
            expected: entries.len(),
            received: texts.len(),
        });
    }
    let translated: Vec<SubtitleEntry> = entries
        .iter()
        .zip(texts)
        .map(|(entry, text)| {
            let text = if text.trim().is_empty() {
                entry.text.clone()
            } else {
                text
            };
            SubtitleEntry {
                text,
                ..entry.clone()
            }
        })
        .collect();
    Ok(srt::format(&translated))
}

/// Format a duration as "X minutes Y seconds" for progress output.
pub fn format_eta(d: Duration) -> String {
    let secs = d.as_secs();
    let seconds = count_unit(secs % 60, "second");
    match secs / 60 {
        0 => seconds,
        minutes => format!("{} {}", count_unit(minutes, "minute"), seconds),
    }
}

fn count_unit(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// Shared handle that runs a [`JobQueue`] and accepts control commands.
#[derive(Clone, Default)]
pub struct Controller {
    queue: Arc<Mutex<JobQueue>>,
    wake: Arc<Notify>,
}

enum Step {
    Translate(JobTicket),
    Wait,
    Done(Option<RunReport>),
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &self,
        source_name: &str,
        entries: Vec<SubtitleEntry>,
        languages: &[String],
        batch_size: usize,
    ) -> Result<u64> {
        let generation = self.queue.lock().start(
            source_name,
            entries,
            languages,
            batch_size,
            Instant::now(),
        )?;
        self.wake.notify_one();
        Ok(generation)
    }

    pub fn pause(&self) -> bool {
        self.queue.lock().pause()
    }

    pub fn resume(&self) -> bool {
        let resumed = self.queue.lock().resume();
        if resumed {
            self.wake.notify_one();
        }
        resumed
    }

    pub fn cancel(&self) {
        self.queue.lock().cancel();
        self.wake.notify_one();
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.queue.lock().snapshot(Instant::now())
    }

    /// Drive the current run until it finishes or is cancelled.
    ///
    /// Jobs run one after another; the chunks of each job run concurrently.
    /// Returns the report when the run finishes, `None` when it was cancelled
    /// or replaced by a newer run.
    pub async fn run<B>(&self, translator: &ChunkTranslator<B>) -> Option<RunReport>
    where
        B: Backend + ?Sized + 'static,
    {
        let generation = self.queue.lock().generation();
        trace!("run generation={}", generation);
        loop {
            match self.step(generation) {
                Step::Done(report) => return report,
                Step::Wait => self.wake.notified().await,
                Step::Translate(ticket) => {
                    let queue = Arc::clone(&self.queue);
                    let progress_ticket = ticket.clone();
                    let outcome = batch::translate_document(
                        translator,
                        &ticket.entries,
                        &ticket.language,
                        ticket.batch_size,
                        |count| {
                            queue.lock().record_progress(&progress_ticket, count);
                        },
                    )
                    .await;
                    self.queue.lock().settle(&ticket, outcome);
                }
            }
        }
    }

    fn step(&self, generation: u64) -> Step {
        let mut queue = self.queue.lock();
        if queue.generation() != generation {
            debug!("run {} superseded", generation);
            return Step::Done(None);
        }
        match queue.status() {
            RunStatus::Idle => Step::Done(queue.report().cloned()),
            RunStatus::Paused => Step::Wait,
            RunStatus::Running => queue.next_job().map_or(Step::Wait, Step::Translate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::SEGMENT_DELIMITER;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn document(n: usize) -> Vec<SubtitleEntry> {
        (1..=n)
            .map(|i| SubtitleEntry {
                index: i as u32,
                time_range: format!("00:00:{:02},000 --> 00:00:{:02},900", i % 60, i % 60),
                text: format!("line {i}"),
            })
            .collect()
    }

    fn langs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn texts(n: usize, prefix: &str) -> Vec<String> {
        (1..=n).map(|i| format!("{prefix}{i}")).collect()
    }

    /// Segments and target language of a translation prompt.
    fn parse_prompt(prompt: &str) -> (String, Vec<String>) {
        let target = prompt
            .split("into ")
            .nth(1)
            .and_then(|rest| rest.split(".\n").next())
            .unwrap_or_default()
            .to_string();
        let body = prompt.split("---\n").nth(1).unwrap_or_default();
        let segs = body
            .trim_end_matches('\n')
            .split(SEGMENT_DELIMITER)
            .map(|s| s.to_string())
            .collect();
        (target, segs)
    }

    fn echo(target: &str, segs: &[String]) -> String {
        segs.iter()
            .map(|s| format!("[{target}] {s}"))
            .collect::<Vec<_>>()
            .join(SEGMENT_DELIMITER)
    }

    /// Translates by tagging each segment with the target language.
    struct Echo;

    #[async_trait]
    impl Backend for Echo {
        async fn generate(&self, prompt: &str, _model: &str) -> Result<String> {
            let (target, segs) = parse_prompt(prompt);
            Ok(echo(&target, &segs))
        }
    }

    #[test]
    fn start_requires_document_and_languages() {
        let mut q = JobQueue::new();
        let now = Instant::now();
        assert_eq!(
            q.start("a.srt", Vec::new(), &langs(&["French"]), 50, now),
            Err(TranslationError::InvalidDocument)
        );
        assert!(matches!(
            q.start("a.srt", document(3), &[], 50, now),
            Err(TranslationError::InvalidRequest(_))
        ));
        assert_eq!(q.status(), RunStatus::Idle);

        q.start("a.srt", document(3), &langs(&["French", "German", "French"]), 50, now)
            .unwrap();
        assert_eq!(q.status(), RunStatus::Running);
        let names: Vec<&str> = q.jobs().iter().map(|j| j.language.as_str()).collect();
        assert_eq!(names, vec!["French", "German"]);
        assert!(q.jobs().iter().all(|j| j.status == JobStatus::Pending && j.total_count == 3));
        assert!(matches!(
            q.start("a.srt", document(3), &langs(&["Hindi"]), 50, now),
            Err(TranslationError::InvalidRequest(_))
        ));
    }

    #[test]
    fn hands_out_one_job_at_a_time_in_order() {
        let mut q = JobQueue::new();
        q.start("a.srt", document(2), &langs(&["Korean", "Arabic"]), 50, Instant::now())
            .unwrap();
        let first = q.next_job().unwrap();
        assert_eq!(first.language, "Korean");
        assert!(q.next_job().is_none());
        assert_eq!(
            q.jobs()
                .iter()
                .filter(|j| j.status == JobStatus::Translating)
                .count(),
            1
        );
        assert!(q.settle(&first, Err(TranslationError::BackendUnavailable("down".into()))));
        let second = q.next_job().unwrap();
        assert_eq!(second.language, "Arabic");
        assert!(q.settle(&second, Ok(texts(2, "ar"))));
        assert_eq!(q.status(), RunStatus::Idle);

        let report = q.report().unwrap();
        assert_eq!((report.completed, report.failed), (1, 1));
        assert_eq!(report.to_string(), "1 of 2 failed");
        assert_eq!(report.files[0].file_name, "a.ar.srt");
        assert!(report.files[0].content.starts_with("1\n00:00:01,000 --> 00:00:01,900\nar1"));
        assert!(q.error().unwrap().contains("- Korean: translation backend unavailable: down"));
        assert_eq!(q.jobs()[0].status, JobStatus::Failed);
        assert!(q.jobs()[0].result_content.is_none());
        assert!(q.jobs()[1].error_message.is_none());
    }

    #[test]
    fn pause_holds_the_next_job_only() {
        let mut q = JobQueue::new();
        q.start("a.srt", document(4), &langs(&["Italian", "Hindi"]), 50, Instant::now())
            .unwrap();
        let ticket = q.next_job().unwrap();
        assert!(q.pause());
        assert!(!q.pause());
        assert!(q.record_progress(&ticket, 2));
        assert!(q.settle(&ticket, Ok(texts(4, "it"))));
        assert_eq!(q.jobs()[0].status, JobStatus::Completed);
        assert_eq!(q.status(), RunStatus::Paused);
        assert!(q.next_job().is_none());
        assert!(q.resume());
        assert!(!q.resume());
        assert_eq!(q.next_job().unwrap().language, "Hindi");
    }

    #[test]
    fn cancel_makes_tickets_stale() {
        let mut q = JobQueue::new();
        let now = Instant::now();
        q.start("a.srt", document(4), &langs(&["German"]), 50, now).unwrap();
        let old = q.next_job().unwrap();
        q.cancel();
        assert_eq!(q.status(), RunStatus::Idle);
        assert!(q.jobs().is_empty());
        assert!(!q.record_progress(&old, 4));
        assert!(!q.settle(&old, Ok(texts(4, "de"))));
        assert!(q.report().is_none());

        q.start("a.srt", document(4), &langs(&["German"]), 50, now).unwrap();
        assert!(!q.settle(&old, Ok(texts(4, "de"))));
        assert_eq!(q.jobs()[0].status, JobStatus::Pending);
        assert_eq!(q.jobs()[0].translated_count, 0);
    }

    #[test]
    fn percent_and_eta_follow_throughput() {
        let mut q = JobQueue::new();
        let start = Instant::now();
        q.start("a.srt", document(100), &langs(&["French", "German"]), 50, start)
            .unwrap();
        let later = start + Duration::from_secs(10);
        assert_eq!(q.percent(), 0);
        assert_eq!(q.estimated_remaining(later), None);

        let ticket = q.next_job().unwrap();
        q.record_progress(&ticket, 50);
        assert_eq!(q.percent(), 25);
        // 50 subtitles in 10s, 150 to go.
        assert_eq!(q.estimated_remaining(later), Some(Duration::from_secs(30)));

        q.pause();
        assert_eq!(q.estimated_remaining(later), None);
        let snap = q.snapshot(later);
        assert_eq!(snap.status, RunStatus::Paused);
        assert_eq!(snap.elapsed, Some(Duration::from_secs(10)));
        assert_eq!(snap.percent, 25);
    }

    #[test]
    fn formats_eta() {
        assert_eq!(format_eta(Duration::from_secs(110)), "1 minute 50 seconds");
        assert_eq!(format_eta(Duration::from_secs(45)), "45 seconds");
        assert_eq!(format_eta(Duration::from_millis(1500)), "1 second");
        assert_eq!(format_eta(Duration::from_secs(60)), "1 minute 0 seconds");
        assert_eq!(format_eta(Duration::from_secs(121)), "2 minutes 1 second");
    }

    #[test]
    fn rejects_wrong_text_count_on_settle() {
        let mut q = JobQueue::new();
        q.start("a.srt", document(3), &langs(&["Spanish"]), 50, Instant::now())
            .unwrap();
        let ticket = q.next_job().unwrap();
        q.settle(&ticket, Ok(texts(2, "es")));
        assert_eq!(q.jobs()[0].status, JobStatus::Failed);
        assert!(q.jobs()[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("expected 3"));
    }

    #[test]
    fn blank_translations_keep_source_text() {
        let mut q = JobQueue::new();
        q.start("a.srt", document(3), &langs(&["French"]), 50, Instant::now())
            .unwrap();
        let ticket = q.next_job().unwrap();
        assert!(q.settle(&ticket, Ok(vec!["un".into(), "".into(), " \n ".into()])));
        let job = &q.jobs()[0];
        assert_eq!(job.status, JobStatus::Completed);
        let parsed = srt::parse(job.result_content.as_deref().unwrap());
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].text, "un");
        assert_eq!(parsed[1].text, "line 2");
        assert_eq!(parsed[2].text, "line 3");
    }

    #[test]
    fn zero_batch_size_never_starts() {
        let mut q = JobQueue::new();
        assert!(matches!(
            q.start("a.srt", document(3), &langs(&["French"]), 0, Instant::now()),
            Err(TranslationError::InvalidRequest(_))
        ));
        assert_eq!(q.status(), RunStatus::Idle);
        assert!(q.jobs().is_empty());

        let controller = Controller::new();
        assert!(matches!(
            controller.start("a.srt", document(3), &langs(&["French"]), 0),
            Err(TranslationError::InvalidRequest(_))
        ));
        let snap = controller.snapshot();
        assert_eq!(snap.status, RunStatus::Idle);
        assert!(snap.jobs.is_empty());
    }

    #[test]
    fn ticket_carries_batch_size() {
        let mut q = JobQueue::new();
        q.start("a.srt", document(3), &langs(&["French"]), 7, Instant::now())
            .unwrap();
        assert_eq!(q.next_job().unwrap().batch_size, 7);
    }

    #[tokio::test]
    async fn completes_single_language_over_three_chunks() {
        let controller = Controller::new();
        controller
            .start("show.srt", document(120), &langs(&["Japanese"]), 50)
            .unwrap();
        let tr = ChunkTranslator::new(Arc::new(Echo), "m");
        let report = controller.run(&tr).await.unwrap();
        assert_eq!((report.completed, report.failed), (1, 0));

        let snap = controller.snapshot();
        assert_eq!(snap.status, RunStatus::Idle);
        assert_eq!(snap.jobs[0].status, JobStatus::Completed);
        assert_eq!(snap.jobs[0].translated_count, 120);
        assert_eq!(snap.jobs[0].total_count, 120);
        assert_eq!(snap.percent, 100);

        let file = &report.files[0];
        assert_eq!(file.file_name, "show.ja.srt");
        let parsed = srt::parse(&file.content);
        assert_eq!(parsed.len(), 120);
        for (i, entry) in parsed.iter().enumerate() {
            assert_eq!(entry.index as usize, i + 1);
            assert_eq!(entry.text, format!("[Japanese] line {}", i + 1));
        }
    }

    #[tokio::test]
    async fn failed_language_does_not_stop_the_next() {
        /// Drops a segment from the second chunk of the French job.
        struct FrenchMismatch;
        #[async_trait]
        impl Backend for FrenchMismatch {
            async fn generate(&self, prompt: &str, _model: &str) -> Result<String> {
                let (target, mut segs) = parse_prompt(prompt);
                if target == "French" && segs[0] == "line 6" {
                    segs.pop();
                }
                Ok(echo(&target, &segs))
            }
        }

        let controller = Controller::new();
        controller
            .start("ep1.srt", document(10), &langs(&["French", "German"]), 5)
            .unwrap();
        let tr = ChunkTranslator::new(Arc::new(FrenchMismatch), "m");
        let report = controller.run(&tr).await.unwrap();
        assert_eq!(report.to_string(), "1 of 2 failed");
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].file_name, "ep1.de.srt");

        let snap = controller.snapshot();
        assert_eq!(snap.jobs[0].status, JobStatus::Failed);
        assert_eq!(
            snap.jobs[0].error_message.as_deref(),
            Some("translation output was malformed: expected 5 subtitle blocks, but received 4")
        );
        assert_eq!(snap.jobs[1].status, JobStatus::Completed);
        assert!(snap.error.unwrap().contains("French"));
    }

    /// Blocks its first request until released and checks exclusivity on every call.
    struct Gated {
        calls: AtomicUsize,
        entered: Notify,
        release: Notify,
        controller: Controller,
    }

    #[async_trait]
    impl Backend for Gated {
        async fn generate(&self, prompt: &str, _model: &str) -> Result<String> {
            let translating = self
                .controller
                .snapshot()
                .jobs
                .iter()
                .filter(|j| j.status == JobStatus::Translating)
                .count();
            assert!(translating <= 1);
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.entered.notify_one();
                self.release.notified().await;
            }
            let (target, segs) = parse_prompt(prompt);
            Ok(echo(&target, &segs))
        }
    }

    fn gated(controller: &Controller) -> Arc<Gated> {
        Arc::new(Gated {
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
            controller: controller.clone(),
        })
    }

    async fn wait_for(controller: &Controller, pred: impl Fn(&RunSnapshot) -> bool) {
        for _ in 0..200 {
            if pred(&controller.snapshot()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn pause_lets_current_job_finish_then_waits() {
        let controller = Controller::new();
        controller
            .start("a.srt", document(6), &langs(&["French", "German"]), 3)
            .unwrap();
        let backend = gated(&controller);
        let tr = ChunkTranslator::new(backend.clone(), "m");
        let driver = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run(&tr).await })
        };

        backend.entered.notified().await;
        assert!(controller.pause());
        backend.release.notify_one();

        wait_for(&controller, |s| s.jobs[0].status == JobStatus::Completed).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let snap = controller.snapshot();
        assert_eq!(snap.status, RunStatus::Paused);
        assert_eq!(snap.jobs[1].status, JobStatus::Pending);
        assert_eq!(snap.eta, None);

        assert!(controller.resume());
        let report = driver.await.unwrap().unwrap();
        assert_eq!((report.completed, report.failed), (2, 0));
        assert_eq!(controller.snapshot().status, RunStatus::Idle);
    }

    #[tokio::test]
    async fn cancel_discards_jobs_and_late_results() {
        let controller = Controller::new();
        controller
            .start("a.srt", document(4), &langs(&["Vietnamese", "Hindi"]), 2)
            .unwrap();
        let backend = gated(&controller);
        let tr = ChunkTranslator::new(backend.clone(), "m");
        let driver = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run(&tr).await })
        };

        backend.entered.notified().await;
        controller.cancel();
        let snap = controller.snapshot();
        assert_eq!(snap.status, RunStatus::Idle);
        assert!(snap.jobs.is_empty());
        assert!(snap.error.is_none());

        backend.release.notify_one();
        assert_eq!(driver.await.unwrap(), None);
        let snap = controller.snapshot();
        assert_eq!(snap.status, RunStatus::Idle);
        assert!(snap.jobs.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }
}

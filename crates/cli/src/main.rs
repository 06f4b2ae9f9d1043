//! Binary entry point for the multi-language subtitle translator.

use anyhow::{bail, Context, Result};
use clap::builder::TypedValueParser as _;
use clap::{Parser, ValueEnum};
use multisub_core::batch::DEFAULT_BATCH_SIZE;
use multisub_core::queue::{format_eta, Controller, RunReport, RunStatus};
use multisub_core::translate::gemini::{self, GeminiBackend};
use multisub_core::translate::openai::{self, OpenAiBackend};
use multisub_core::translate::{Backend, ChunkTranslator};
use multisub_core::{lang, output, srt, TranslationError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// How often progress and the time estimate are logged while running.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    Gemini,
    Openai,
}

/// Command line options for the binary.
#[derive(Parser)]
#[command(about = "Translate an SRT file into several languages")]
struct Cli {
    /// Target language, e.g. "French". Repeat for more languages.
    #[arg(long = "lang", required = true)]
    languages: Vec<String>,

    /// Number of subtitles translated per request.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE,
          value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize))]
    batch_size: usize,

    /// Language of the input. Detected by the backend when omitted.
    #[arg(long)]
    source_lang: Option<String>,

    /// Text generation service to use.
    #[arg(long, value_enum, default_value_t = BackendKind::Gemini, env = "MULTISUB_BACKEND")]
    backend: BackendKind,

    /// Model identifier; defaults depend on the backend.
    #[arg(long, env = "MULTISUB_MODEL")]
    model: Option<String>,

    /// Directory for the translated files. Defaults to the input's directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Enable verbose debug and trace logs.
    #[arg(long)]
    debug: bool,

    /// Path to the SRT file to translate.
    input: PathBuf,
}

/// Application entry point which parses CLI args and runs the translation queue.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;

    let (name, entries) = load_document(&cli.input)?;
    let (backend, default_model) = match cli.backend {
        BackendKind::Gemini => (
            Arc::new(GeminiBackend::from_env()?) as Arc<dyn Backend>,
            gemini::DEFAULT_MODEL,
        ),
        BackendKind::Openai => (
            Arc::new(OpenAiBackend::from_env()?) as Arc<dyn Backend>,
            openai::DEFAULT_MODEL,
        ),
    };
    let model = cli.model.clone().unwrap_or_else(|| default_model.to_string());
    let translator = ChunkTranslator::new(backend, model);

    let original = match &cli.source_lang {
        Some(lang) => lang.clone(),
        None => match translator.detect_language(&entries).await {
            Ok(lang) => lang,
            Err(err) => {
                warn!("could not detect the original language: {err}");
                "Unknown".to_string()
            }
        },
    };
    info!(
        "{}: {} subtitles, total duration {}, original language {}",
        name,
        entries.len(),
        srt::total_duration(&entries),
        original
    );
    debug!(
        "available targets: {}",
        lang::selectable_targets(Some(&original)).join(", ")
    );

    let targets: Vec<String> = cli
        .languages
        .iter()
        .filter(|target| {
            let same = lang::same_language(target, &original);
            if same {
                warn!("skipping {target}: it is the original language");
            }
            !same
        })
        .cloned()
        .collect();

    let controller = Controller::new();
    controller.start(&name, entries, &targets, cli.batch_size)?;
    spawn_command_reader(controller.clone());
    spawn_progress_logger(controller.clone());

    let report = tokio::select! {
        report = controller.run(&translator) => report,
        _ = tokio::signal::ctrl_c() => {
            controller.cancel();
            None
        }
    };
    let Some(report) = report else {
        info!("translation cancelled");
        return Ok(());
    };

    let out_dir = match &cli.out_dir {
        Some(dir) => dir.clone(),
        None => cli
            .input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    output::write_all(&out_dir, &report.files)?;
    print_summary(&report);
    Ok(())
}

/// Build the log filter and install the subscriber.
fn init_logging(debug: bool) -> Result<()> {
    let filter = if debug {
        EnvFilter::default()
            .add_directive("multisub=trace".parse()?)
            .add_directive("multisub_core=trace".parse()?)
            .add_directive("info".parse()?)
    } else {
        EnvFilter::default()
            .add_directive("multisub=info".parse()?)
            .add_directive("multisub_core=info".parse()?)
            .add_directive("warn".parse()?)
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Read and parse the input, returning its file name and entries.
fn load_document(path: &Path) -> Result<(String, Vec<srt::SubtitleEntry>)> {
    let is_srt = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("srt"))
        .unwrap_or(false);
    if !is_srt {
        bail!("{} is not an .srt file", path.display());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let entries = srt::parse(&content);
    if entries.is_empty() {
        return Err(TranslationError::InvalidDocument.into());
    }
    let name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    Ok((name, entries))
}

/// Accept `pause`, `resume`, `cancel` and `status` (or their first letter) on stdin.
fn spawn_command_reader(controller: Controller) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim() {
                "p" | "pause" => {
                    if !controller.pause() {
                        warn!("nothing to pause");
                    }
                }
                "r" | "resume" => {
                    if !controller.resume() {
                        warn!("nothing to resume");
                    }
                }
                "c" | "cancel" => controller.cancel(),
                "s" | "status" => log_progress(&controller),
                "" => {}
                other => warn!("unknown command {other:?}; use pause, resume, cancel or status"),
            }
        }
    });
}

/// Log overall progress periodically while the run is active.
fn spawn_progress_logger(controller: Controller) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if controller.snapshot().status == RunStatus::Running {
                log_progress(&controller);
            }
        }
    });
}

fn log_progress(controller: &Controller) {
    let snap = controller.snapshot();
    let done = snap.jobs.iter().filter(|j| j.result_content.is_some()).count();
    let eta = snap
        .eta
        .map(format_eta)
        .unwrap_or_else(|| "unknown".to_string());
    info!(
        "{:?}: {}% overall, {}/{} languages done, ETA {}",
        snap.status,
        snap.percent,
        done,
        snap.jobs.len(),
        eta
    );
}

fn print_summary(report: &RunReport) {
    info!("{report}");
    for (language, message) in &report.failures {
        warn!("{language}: {message}");
    }
}

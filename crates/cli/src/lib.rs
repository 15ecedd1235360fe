use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_model::{PageRef, RowModel, SessionState};
use pdf_engine::PdfEngine;
use picker_core::{
    discover_pdfs, enumerate_all, expand_inputs, merge_rows, ocr_page, CommandOcrService,
    ListViewport, LoadMode, PipelineConfig, PipelineEvent, ThumbnailPipeline, EMPTY_LIST_MESSAGE,
};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use storage::Storage;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DRIVE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Parser)]
#[command(name = "page-merger")]
#[command(about = "Pick pages from PDFs, reorder them and merge them into one document")]
pub struct Cli {
    /// Directory for the session, last-directory and settings files.
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the pages of PDF files and folders as JSON.
    Pages {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },
    /// Render thumbnails for the rows around a viewport and write them as PNGs.
    Thumbs {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 800.0, value_name = "PX")]
        viewport_height: f32,
        #[arg(long, default_value_t = 0.0, value_name = "PX")]
        scroll: f32,
        /// Render every row, not just the viewport window.
        #[arg(long)]
        all: bool,
    },
    /// Merge pages into a new PDF.
    Merge {
        #[arg(value_name = "PATH", required_unless_present = "session", conflicts_with = "session")]
        paths: Vec<PathBuf>,
        /// Merge the rows of the saved session.
        #[arg(long)]
        session: bool,
        #[arg(long, short, value_name = "FILE")]
        output: PathBuf,
    },
    /// Inspect or change the saved session.
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },
    /// Run an external OCR program on one page and print its JSON.
    Ocr {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, value_name = "PROG")]
        command: PathBuf,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
        args: Vec<OsString>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum SessionCommand {
    Show,
    /// Enumerate the given files and folders and save them as the session.
    Save {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },
    Clear,
}

#[derive(Debug, Default, Serialize)]
struct RunSummary {
    rows: usize,
    excluded: usize,
    thumbnails: usize,
    failed_thumbnails: usize,
    skipped_documents: usize,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing(cli.verbose);

    let storage = match &cli.data_dir {
        Some(dir) => Storage::with_root(dir),
        None => Storage::from_default_project().context("failed to resolve data directory")?,
    };

    match cli.command {
        None => run_resume(&storage),
        Some(Commands::Pages { paths }) => run_pages(&paths),
        Some(Commands::Thumbs { paths, out_dir, viewport_height, scroll, all }) => {
            run_thumbs(&storage, &paths, &out_dir, ListViewport::new(scroll, viewport_height), all)
        }
        Some(Commands::Merge { paths, session, output }) => run_merge(&storage, &paths, session, &output),
        Some(Commands::Session { action }) => run_session(&storage, action),
        Some(Commands::Ocr { file, page, command, args }) => run_ocr(&file, page, &command, args),
        Some(Commands::Version) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn engine() -> Arc<dyn PdfEngine> {
    #[cfg(feature = "pdfium")]
    {
        match pdf_engine::pdfium_backend::PdfiumEngine::from_system_library() {
            Ok(engine) => return Arc::new(engine),
            Err(err) => tracing::warn!("pdfium unavailable, using placeholder renderer: {err}"),
        }
    }

    Arc::new(pdf_engine::default_engine())
}

fn start_pipeline(storage: &Storage) -> Result<ThumbnailPipeline> {
    let settings = storage.load_settings().context("failed to load settings")?;
    let config = PipelineConfig::from_settings(&settings).context("invalid settings")?;
    ThumbnailPipeline::new(engine(), config).context("failed to start thumbnail pipeline")
}

/// Runs the pipeline until every outstanding job has finished.
fn drive(pipeline: &mut ThumbnailPipeline, summary: &mut RunSummary) -> Result<()> {
    let idle = pipeline.wait_idle(DRIVE_TIMEOUT);
    for event in pipeline.drain_events() {
        match event {
            PipelineEvent::ThumbnailFailed { .. } => summary.failed_thumbnails += 1,
            PipelineEvent::EnumerationFailed(_) => summary.skipped_documents += 1,
            PipelineEvent::Notice(message) => tracing::warn!("{message}"),
            _ => {}
        }
    }
    if !idle {
        anyhow::bail!("timed out waiting for thumbnails");
    }
    Ok(())
}

fn finish_summary(pipeline: &ThumbnailPipeline, summary: &mut RunSummary) {
    summary.rows = pipeline.rows().len();
    summary.excluded = pipeline.rows().excluded().len();
    summary.thumbnails = pipeline.cache_stats().entry_count;
}

fn save_session_or_warn(storage: &Storage, session: &SessionState) {
    if let Err(err) = storage.save_session(session) {
        tracing::warn!("failed to save session: {err}");
    }
}

fn run_resume(storage: &Storage) -> Result<()> {
    let mut pipeline = start_pipeline(storage)?;

    let session = storage.load_session().unwrap_or_else(|err| {
        tracing::warn!("ignoring unreadable session file: {err}");
        None
    });

    // A saved session wins over the last directory, even when it was cleared.
    if let Some(session) = session {
        if session.pages.is_empty() {
            println!("{EMPTY_LIST_MESSAGE}");
            return Ok(());
        }
        pipeline.restore_session(session);
    } else if let Some(dir) = storage.load_last_dir() {
        let documents = discover_pdfs(&dir)
            .with_context(|| format!("failed to list {}", dir.display()))?;
        pipeline.load_documents(documents.into_iter().map(Into::into).collect(), LoadMode::Replace);
    } else {
        println!("{EMPTY_LIST_MESSAGE}");
        return Ok(());
    }

    let mut summary = RunSummary::default();
    drive(&mut pipeline, &mut summary)?;
    save_session_or_warn(storage, &pipeline.session());
    finish_summary(&pipeline, &mut summary);

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_pages(paths: &[PathBuf]) -> Result<()> {
    let sources = expand_inputs(paths).context("failed to read input paths")?;
    let enumeration = enumerate_all(engine().as_ref(), sources);

    println!("{}", serde_json::to_string_pretty(&enumeration.pages)?);
    Ok(())
}

fn run_thumbs(
    storage: &Storage,
    paths: &[PathBuf],
    out_dir: &Path,
    viewport: ListViewport,
    all: bool,
) -> Result<()> {
    let sources = expand_inputs(paths).context("failed to read input paths")?;
    let mut pipeline = start_pipeline(storage)?;
    let mut summary = RunSummary::default();

    pipeline.set_viewport(viewport);
    pipeline.load_documents(sources, LoadMode::Replace);
    drive(&mut pipeline, &mut summary)?;

    if all {
        for row in 0..pipeline.rows().len() {
            pipeline.request_thumbnail(row);
        }
        drive(&mut pipeline, &mut summary)?;
    }

    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    for (row, thumbnail) in pipeline.cached_rows() {
        let output = out_dir.join(thumbnail_file_name(row, &thumbnail.page));
        let image = image::RgbImage::from_raw(thumbnail.width, thumbnail.height, thumbnail.pixels.clone())
            .context("thumbnail buffer does not match its dimensions")?;
        image
            .save(&output)
            .with_context(|| format!("failed to write image to {}", output.display()))?;
        println!("{}", output.display());
    }

    finish_summary(&pipeline, &mut summary);
    tracing::info!(
        rows = summary.rows,
        thumbnails = summary.thumbnails,
        failed = summary.failed_thumbnails,
        "thumbnails written"
    );
    Ok(())
}

fn thumbnail_file_name(row: usize, page: &PageRef) -> String {
    let stem = page
        .document_path()
        .file_stem()
        .and_then(|name| name.to_str())
        .unwrap_or("page");
    format!("{row:04}-{stem}-p{}.png", page.page_index + 1)
}

fn run_merge(storage: &Storage, paths: &[PathBuf], from_session: bool, output: &Path) -> Result<()> {
    let rows = if from_session {
        let session = storage.load_session().context("failed to load session")?.unwrap_or_default();
        RowModel::from_session(session)
    } else {
        let sources = expand_inputs(paths).context("failed to read input paths")?;
        let mut rows = RowModel::new();
        rows.extend(enumerate_all(engine().as_ref(), sources).pages);
        rows
    };

    let summary = merge_rows(&rows, output)
        .with_context(|| format!("failed to merge into {}", output.display()))?;

    println!("merged {} pages into {}", summary.page_count, output.display());
    Ok(())
}

fn run_session(storage: &Storage, action: SessionCommand) -> Result<()> {
    match action {
        SessionCommand::Show => {
            let session = storage.load_session().context("failed to load session")?.unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        SessionCommand::Save { paths } => {
            let sources = expand_inputs(&paths).context("failed to read input paths")?;
            let pages = enumerate_all(engine().as_ref(), sources).pages;
            let session = SessionState { pages, ..SessionState::default() };

            storage.save_session(&session).context("failed to save session")?;
            if let [dir] = paths.as_slice() {
                if dir.is_dir() {
                    if let Err(err) = storage.save_last_dir(dir) {
                        tracing::warn!("failed to remember directory: {err}");
                    }
                }
            }
            println!("saved {} pages", session.pages.len());
        }
        SessionCommand::Clear => {
            storage.save_session(&SessionState::default()).context("failed to save session")?;
            println!("session cleared");
        }
    }
    Ok(())
}

fn run_ocr(file: &Path, page: u32, command: &Path, args: Vec<OsString>) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let service = CommandOcrService::new(command).with_args(args);
    let document = ocr_page(&service, &PageRef::new(file, page - 1)).context("OCR failed")?;

    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

//! CLI binary for legal-ingest.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and prints the extracted text or metadata.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use legal_ingest::{
    DocumentMetadata, ExtractionConfig, ExtractionProgressCallback, Extractor, OcrSettings,
    ProgressCallback,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per page. Pages
/// may finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_job_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER_TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER_TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }

    fn page_elapsed(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_job_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text_len: usize) {
        let elapsed = self.page_elapsed(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let elapsed = self.page_elapsed(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_job_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} pages extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages extracted  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract to stdout
  ingest validation_notice.pdf

  # Extract to a file
  ingest scanned_complaint.pdf -o complaint.txt

  # Photograph of a letter, Spanish + English
  ingest letter.jpg --lang spa+eng

  # Full structured output
  ingest exhibit.pdf --json > exhibit.json

  # Metadata only
  ingest --metadata-only exhibit.pdf

STRATEGY:
  PDFs with a real text layer (more than --native-threshold non-whitespace
  characters) are read directly; OCR never runs. Everything else is
  rasterised at --dpi and recognised page by page with tesseract, after
  orientation detection, denoising and adaptive binarisation. A page that
  fails is marked "[ERROR: Could not process page N]" and the rest continue.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH    Path to libpdfium (file or directory)
  RUST_LOG           Tracing filter, overrides -v / -q
  INGEST_*           Every flag, e.g. INGEST_DPI=400
"#;

/// Extract text from legal documents (PDF or scanned image).
#[derive(Parser, Debug)]
#[command(
    name = "ingest",
    version,
    about = "Extract text from legal documents: native PDF text first, OCR fallback",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF or image file (.pdf, .png, .jpg, .jpeg, .tiff, .tif, .bmp).
    input: PathBuf,

    /// Write the text to this file instead of stdout.
    #[arg(short, long, env = "INGEST_OUTPUT")]
    output: Option<PathBuf>,

    /// Output the full result (text, metadata, pages, stats) as JSON.
    #[arg(long, env = "INGEST_JSON")]
    json: bool,

    /// Print only the document metadata.
    #[arg(long, env = "INGEST_METADATA_ONLY")]
    metadata_only: bool,

    /// Rasterisation DPI for the OCR fallback (72–600).
    #[arg(long, env = "INGEST_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Largest accepted input, in MiB.
    #[arg(long, env = "INGEST_MAX_SIZE_MB", default_value_t = 50)]
    max_size_mb: u64,

    /// Non-whitespace characters the text layer must exceed to skip OCR.
    #[arg(long, env = "INGEST_NATIVE_THRESHOLD", default_value_t = 100)]
    native_threshold: usize,

    /// Pages recognised in parallel. Default: CPU cores.
    #[arg(short, long, env = "INGEST_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Tesseract language(s), e.g. eng or spa+eng.
    #[arg(long, env = "INGEST_LANG", default_value = "eng")]
    lang: String,

    /// Tesseract page segmentation mode.
    #[arg(long, env = "INGEST_PSM", default_value_t = 6)]
    psm: u8,

    /// Tesseract OCR engine mode.
    #[arg(long, env = "INGEST_OEM", default_value_t = 3)]
    oem: u8,

    /// Path to the tesseract binary.
    #[arg(long, env = "INGEST_TESSERACT")]
    tesseract: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "INGEST_PASSWORD")]
    password: Option<String>,

    /// Per-page OCR timeout in seconds.
    #[arg(long, env = "INGEST_PAGE_TIMEOUT", default_value_t = 300)]
    page_timeout: u64,

    /// Disable the progress bar.
    #[arg(long, env = "INGEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INGEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INGEST_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.metadata_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let extractor = Extractor::new(config);

    // ── Run extraction ───────────────────────────────────────────────────
    let started = Instant::now();
    let doc = extractor
        .process_document(&cli.input)
        .await
        .with_context(|| format!("Extraction failed for {}", cli.input.display()))?;

    if cli.metadata_only {
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&doc.metadata).context("Failed to serialise metadata")?
            );
        } else {
            print_metadata(&doc.metadata);
        }
        return Ok(());
    }

    let rendered = if cli.json {
        serde_json::to_string_pretty(&doc).context("Failed to serialise output")?
    } else {
        doc.text.clone()
    };

    if let Some(ref output_path) = cli.output {
        write_output(output_path, &rendered)?;
        if !cli.quiet {
            eprintln!(
                "{}  {} words  {}ms  →  {}",
                if doc.metadata.failed_pages.is_empty() { green("✔") } else { cyan("⚠") },
                doc.metadata.word_count,
                started.elapsed().as_millis(),
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?;
        if !rendered.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !show_progress && !cli.json {
        eprintln!(
            "{}",
            dim(&format!(
                "{} via {:?}: {} pages, {} chars, {} words, DPI {}",
                doc.metadata.filename,
                doc.metadata.method,
                doc.metadata.page_count,
                doc.metadata.char_count,
                doc.metadata.word_count,
                doc.metadata.dpi_display(),
            ))
        );
        if !doc.metadata.failed_pages.is_empty() {
            eprintln!("  {} pages failed: {:?}", doc.metadata.failed_pages.len(), doc.metadata.failed_pages);
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .max_document_size_mb(cli.max_size_mb)
        .native_text_threshold(cli.native_threshold)
        .page_timeout_secs(cli.page_timeout)
        .ocr(OcrSettings {
            language: cli.lang.clone(),
            page_seg_mode: cli.psm,
            engine_mode: cli.oem,
        });

    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref path) = cli.tesseract {
        builder = builder.tesseract_path(path.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_metadata(meta: &DocumentMetadata) {
    println!("File:        {}", meta.filename);
    println!("Type:        {}", meta.file_type);
    println!("Size:        {} MB ({} bytes)", meta.size_mb, meta.size_bytes);
    println!("Method:      {:?}", meta.method);
    println!("Pages:       {}", meta.page_count);
    println!("Characters:  {}", meta.char_count);
    println!("Words:       {}", meta.word_count);
    println!("DPI:         {}", meta.dpi_display());
    if !meta.failed_pages.is_empty() {
        println!("Failed:      {:?}", meta.failed_pages);
    }
}

/// Write via a sibling temp file so the output is never half-written.
fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

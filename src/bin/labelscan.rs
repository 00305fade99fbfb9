//! CLI binary for labelscan.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig`, loads and rasterises inputs, and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use labelscan::pipeline::encode::write_png;
use labelscan::pipeline::overlay::OverlayEvent;
use labelscan::pipeline::render::rasterize_async;
use labelscan::{
    compare_document_text, default_requirements, describe_probe, diff_with_config,
    load_document, run_compliance_scan, run_difference_report, run_unified_comparison,
    transcribe, AnalysisConfig, Document, LlmVisionModel, ProgressCallback, RasterPage,
    Rasterizer, RequirementStatus, RxingBarcodeProbe, ScanProgressCallback, Session, SessionEvent,
    Slot, StatusCounts, VisionModel,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batches of a compliance scan
/// plus a log line per finished batch.
struct CliProgressCallback {
    bar: ProgressBar,
    batch_started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Encoding label…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            batch_started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>2}/{len} batches  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Scanning");
    }

    fn batch_elapsed(&self) -> f64 {
        self.batch_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ScanProgressCallback for CliProgressCallback {
    fn on_scan_start(&self, total_batches: usize, total_requirements: usize) {
        self.activate_bar(total_batches);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Checking {total_requirements} requirements in {total_batches} batches…"
            ))
        ));
    }

    fn on_batch_start(&self, batch_num: usize, _total_batches: usize) {
        if let Ok(mut t) = self.batch_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("batch {batch_num}"));
    }

    fn on_batch_complete(&self, batch_num: usize, total_batches: usize, item_count: usize) {
        self.bar.println(format!(
            "  {} Batch {:>2}/{:<2}  {:<9}  {}",
            green("✓"),
            batch_num,
            total_batches,
            dim(&format!("{item_count:>2} items")),
            dim(&format!("{:.1}s", self.batch_elapsed())),
        ));
        self.bar.inc(1);
    }

    fn on_batch_error(&self, batch_num: usize, total_batches: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Batch {:>2}/{:<2}  {}  {}",
            red("✗"),
            batch_num,
            total_batches,
            red(&msg),
            dim(&format!("{:.1}s", self.batch_elapsed())),
        ));
        self.bar.finish_and_clear();
    }

    fn on_scan_complete(&self, total_items: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} checklist items",
            green("✔"),
            bold(&total_items.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Verbatim transcription of a label
  labelscan ocr rotulo.png

  # Compliance checklist with the default 13 requirements
  labelscan scan rotulo.pdf

  # Custom requirements, JSON output
  labelscan scan rotulo.png --requirement "Glúten" --requirement "Lactose" --json

  # Pixel difference mask between two versions
  labelscan diff v1.pdf v2.pdf -o mask.png

  # Flattened overlay at 40% opacity, zoomed in 5 steps
  labelscan overlay v1.png v2.png -o overlay.png --opacity 0.4 --zoom-steps 5

  # Structured difference report (3 model calls)
  labelscan report v1.pdf v2.pdf --mask-out mask.png

  # Same/different verdict
  labelscan compare v1.png v2.png

  # Words added/removed between two PDFs (no API key needed)
  labelscan words v1.pdf v2.pdf

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider when set)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory containing libpdfium
"#;

/// Compare product labels and check them against a labelling checklist.
#[derive(Parser, Debug)]
#[command(
    name = "labelscan",
    version,
    about = "Compare product labels and check them for labelling compliance",
    long_about = "Compare product labels (PNG/JPEG images or the first page of a PDF) pixel by \
pixel, overlay them, and ask a vision language model for transcriptions, compliance \
checklists and difference reports.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// LLM model ID (e.g. gemini-2.5-flash-lite, gpt-4.1-nano).
    #[arg(long, global = true, env = "LABELSCAN_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, global = true, env = "LABELSCAN_PROVIDER")]
    provider: Option<String>,

    /// Magnification for PDF page 1 (1.0–10.0).
    #[arg(long, global = true, env = "LABELSCAN_PDF_SCALE", default_value_t = 6.0)]
    pdf_scale: f32,

    /// PDF user password for encrypted documents.
    #[arg(long, global = true, env = "LABELSCAN_PASSWORD")]
    password: Option<String>,

    /// Retries per model call on transient failure.
    #[arg(long, global = true, env = "LABELSCAN_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "LABELSCAN_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Per-call model timeout in seconds.
    #[arg(long, global = true, env = "LABELSCAN_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "LABELSCAN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "LABELSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except results and errors.
    #[arg(short, long, global = true, env = "LABELSCAN_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "LABELSCAN_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transcribe all text on a label.
    Ocr {
        /// Local file path or HTTP/HTTPS URL.
        input: String,
    },

    /// Check a label against a requirement checklist.
    Scan {
        input: String,

        /// Requirement to check (repeatable). Defaults to the built-in list.
        #[arg(long = "requirement", short = 'r')]
        requirements: Vec<String>,

        /// File with one requirement per line.
        #[arg(long, conflicts_with = "requirements")]
        requirements_file: Option<PathBuf>,

        /// Requirements per model call.
        #[arg(long, env = "LABELSCAN_BATCH_SIZE", default_value_t = 5)]
        batch_size: usize,

        /// Print the checklist as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the built-in requirement list.
    Requirements,

    /// Write the pixel difference mask of two labels.
    Diff {
        first: String,
        second: String,

        /// PNG output path.
        #[arg(short, long)]
        output: PathBuf,

        /// Luminance threshold out of 255.
        #[arg(long, default_value_t = 50)]
        threshold: u8,
    },

    /// Write a flattened overlay of two labels.
    Overlay {
        first: String,
        second: String,

        /// PNG output path.
        #[arg(short, long)]
        output: PathBuf,

        /// Opacity of the second label (0.0–1.0).
        #[arg(long, default_value_t = 0.5)]
        opacity: f32,

        /// Viewport width in pixels.
        #[arg(long, default_value_t = 800.0)]
        width: f32,

        /// Viewport height in pixels.
        #[arg(long, default_value_t = 600.0)]
        height: f32,

        /// Wheel ticks to apply: positive zooms in, negative zooms out.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        zoom_steps: i32,
    },

    /// Structured difference report (transcribes both labels first).
    Report {
        first: String,
        second: String,

        /// Also write the difference mask here.
        #[arg(long)]
        mask_out: Option<PathBuf>,

        /// Luminance threshold out of 255.
        #[arg(long, default_value_t = 50)]
        threshold: u8,
    },

    /// Same/different verdict with a free-text summary.
    Compare {
        first: String,
        second: String,

        /// Print the verdict as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Words added or removed between two PDFs' text layers.
    Words { first: String, second: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are suppressed while the progress bar is active.
    let show_progress = !g.quiet
        && !g.no_progress
        && matches!(cli.command, Command::Scan { json: false, .. });
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ScanProgressCallback>)
    } else {
        None
    };

    match &cli.command {
        Command::Requirements => {
            for (i, r) in default_requirements().iter().enumerate() {
                println!("{:>2}. {}", i + 1, r);
            }
            Ok(())
        }

        Command::Ocr { input } => {
            let config = build_config(g, None, None, None)?;
            let (_, page) = load_page(input, &config).await?;
            let model = build_model(&config)?;
            let text = transcribe(model.as_ref(), &page, &config)
                .await
                .context("Transcription failed")?;
            println!("{}", text.trim_end());
            if !g.quiet {
                eprintln!(
                    "{} {}",
                    dim("barcode:"),
                    describe_probe(&RxingBarcodeProbe, &page)
                );
            }
            Ok(())
        }

        Command::Scan {
            input,
            requirements,
            requirements_file,
            batch_size,
            json,
        } => {
            let config = build_config(g, Some(*batch_size), None, progress_cb)?;
            let requirements = collect_requirements(requirements, requirements_file.as_ref()).await?;
            let (_, page) = load_page(input, &config).await?;
            let model = build_model(&config)?;

            let items = run_compliance_scan(model, &page, &requirements, &config)
                .await
                .context("Compliance scan failed")?;

            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&items).context("Failed to serialise checklist")?
                );
            } else {
                for item in &items {
                    let mark = match item.status {
                        RequirementStatus::Met => green("✓"),
                        RequirementStatus::NotMet => red("✗"),
                        RequirementStatus::NotApplicable => yellow("–"),
                    };
                    println!("{} {}  {}", mark, bold(&item.requisito), dim(item.status.label()));
                    if !item.justificativa.is_empty() {
                        println!("    {}", item.justificativa);
                    }
                }
                if !g.quiet {
                    let c = StatusCounts::tally(&items);
                    eprintln!(
                        "{} met  /  {} not met  /  {} not applicable",
                        green(&c.met.to_string()),
                        red(&c.not_met.to_string()),
                        yellow(&c.not_applicable.to_string()),
                    );
                }
            }
            Ok(())
        }

        Command::Diff {
            first,
            second,
            output,
            threshold,
        } => {
            let config = build_config(g, None, Some(*threshold), None)?;
            let (_, a) = load_page(first, &config).await?;
            let (_, b) = load_page(second, &config).await?;
            let mask = diff_with_config(&a, &b, &config);
            write_png(mask.image(), output).context("Failed to write diff mask")?;
            if !g.quiet {
                eprintln!(
                    "{}  {}x{}  {} flagged ({:.2}%)  →  {}",
                    if mask.is_empty() { green("✔") } else { cyan("◆") },
                    mask.width(),
                    mask.height(),
                    mask.flagged_count(),
                    mask.flagged_ratio() * 100.0,
                    bold(&output.display().to_string()),
                );
            }
            Ok(())
        }

        Command::Overlay {
            first,
            second,
            output,
            opacity,
            width,
            height,
            zoom_steps,
        } => {
            let config = build_config(g, None, None, None)?;
            let (_, a) = load_page(first, &config).await?;
            let (_, b) = load_page(second, &config).await?;

            let mut session = Session::new(*width, *height);
            session.handle(SessionEvent::Load {
                slot: Slot::First,
                page: Arc::new(a),
            });
            session.handle(SessionEvent::Load {
                slot: Slot::Second,
                page: Arc::new(b),
            });
            session.handle(SessionEvent::Overlay(OverlayEvent::SetOpacity(*opacity)));
            let delta = if *zoom_steps > 0 { -1.0 } else { 1.0 };
            for _ in 0..zoom_steps.unsigned_abs() {
                session.handle(SessionEvent::Overlay(OverlayEvent::Wheel { delta_y: delta }));
            }

            let frame = session.overlay_frame().context("Overlay failed")?;
            write_png(&frame.flatten(), output).context("Failed to write overlay")?;
            if !g.quiet {
                eprintln!(
                    "{}  {}  →  {}",
                    green("✔"),
                    dim(&frame.transform.to_css()),
                    bold(&output.display().to_string()),
                );
            }
            Ok(())
        }

        Command::Report {
            first,
            second,
            mask_out,
            threshold,
        } => {
            let config = build_config(g, None, Some(*threshold), None)?;
            let (_, a) = load_page(first, &config).await?;
            let (_, b) = load_page(second, &config).await?;
            let mask = diff_with_config(&a, &b, &config);
            if let Some(path) = mask_out {
                write_png(mask.image(), path).context("Failed to write diff mask")?;
            }
            let model = build_model(&config)?;
            let report = run_difference_report(model.as_ref(), &a, &b, &mask, &config)
                .await
                .context("Difference report failed")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
            Ok(())
        }

        Command::Compare {
            first,
            second,
            json,
        } => {
            let config = build_config(g, None, None, None)?;
            let (_, a) = load_page(first, &config).await?;
            let (_, b) = load_page(second, &config).await?;
            let model = build_model(&config)?;
            let verdict = run_unified_comparison(model.as_ref(), &a, &b, &config)
                .await
                .context("Comparison failed")?;
            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&verdict).context("Failed to serialise verdict")?
                );
            } else {
                println!(
                    "{}",
                    if verdict.has_differences {
                        red("different")
                    } else {
                        green("equal")
                    }
                );
                println!("{}", verdict.summary.trim_end());
            }
            Ok(())
        }

        Command::Words { first, second } => {
            let config = build_config(g, None, None, None)?;
            let a = load(first, &config).await?;
            let b = load(second, &config).await?;
            let renderer = Rasterizer::from_config(&config).renderer().clone();
            let diff = tokio::task::spawn_blocking(move || {
                compare_document_text(renderer.as_ref(), &a, &b)
            })
            .await
            .context("Text extraction task panicked")?
            .context("Text comparison failed")?;

            match diff {
                None => {
                    eprintln!("Word comparison needs two PDFs.");
                }
                Some(d) => {
                    println!("{}", bold("Words in file 2 missing from file 1:"));
                    println!("  {}", join_or_none(&d.missing_from_first));
                    println!("{}", bold("Words in file 1 missing from file 2:"));
                    println!("  {}", join_or_none(&d.missing_from_second));
                }
            }
            Ok(())
        }
    }
}

fn join_or_none(words: &[String]) -> String {
    if words.is_empty() {
        dim("(none)")
    } else {
        words.join(", ")
    }
}

/// Map global flags to `AnalysisConfig`.
fn build_config(
    g: &GlobalArgs,
    batch_size: Option<usize>,
    diff_threshold: Option<u8>,
    progress: Option<ProgressCallback>,
) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .pdf_scale(g.pdf_scale)
        .max_retries(g.max_retries)
        .temperature(g.temperature)
        .api_timeout_secs(g.api_timeout)
        .download_timeout_secs(g.download_timeout);

    if let Some(n) = batch_size {
        builder = builder.batch_size(n);
    }
    if let Some(t) = diff_threshold {
        builder = builder.diff_threshold(t);
    }
    if let Some(ref m) = g.model {
        builder = builder.model(m);
    }
    if let Some(ref p) = g.provider {
        builder = builder.provider_name(p);
    }
    if let Some(ref pwd) = g.password {
        builder = builder.password(pwd);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn build_model(config: &AnalysisConfig) -> Result<Arc<dyn VisionModel>> {
    let model = LlmVisionModel::from_config(config).context("No vision model available")?;
    Ok(Arc::new(model))
}

async fn load(input: &str, config: &AnalysisConfig) -> Result<Document> {
    load_document(input, config.download_timeout_secs)
        .await
        .with_context(|| format!("Failed to load '{input}'"))
}

async fn load_page(input: &str, config: &AnalysisConfig) -> Result<(Document, RasterPage)> {
    let doc = load(input, config).await?;
    let page = rasterize_async(&Rasterizer::from_config(config), &doc)
        .await
        .with_context(|| format!("Failed to rasterise '{input}'"))?;
    Ok((doc, page))
}

/// Requirements from flags, a file, or the built-in list, in that order.
async fn collect_requirements(flags: &[String], file: Option<&PathBuf>) -> Result<Vec<String>> {
    if !flags.is_empty() {
        return Ok(flags.to_vec());
    }
    if let Some(path) = file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read requirements from {:?}", path))?;
        let reqs: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if reqs.is_empty() {
            anyhow::bail!("Requirements file {:?} is empty", path);
        }
        return Ok(reqs);
    }
    Ok(default_requirements())
}

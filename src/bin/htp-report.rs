//! CLI binary for htp-report.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ReportConfig`, runs the analyse → narrate → export steps and writes the
//! PDFs into an output directory.

use anyhow::{bail, Context, Result};
use clap::Parser;
use htp_report::config::validate_threshold;
use htp_report::{
    analyze, engine, export_selection, export_to_dir, generate_narratives, load_image,
    sample_analysis, AnalysisResult, Audience, AudienceSelection, NarrativePair, ProgressCallback,
    ReportConfig, ReportProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner plus one log line per finished step. The two narrative calls
/// finish in either order.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Instant,
    narrative_errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Instant::now(),
            narrative_errors: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn elapsed(&self) -> String {
        dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64()))
    }
}

impl ReportProgressCallback for CliProgressCallback {
    fn on_analysis_start(&self, file_name: &str) {
        self.bar.set_prefix("Analysing");
        self.bar.set_message(file_name.to_string());
    }

    fn on_analysis_complete(&self, analysis_id: &str, processing_secs: f64) {
        self.bar.println(format!(
            "  {} Analysis {}  {}  {}",
            green("✓"),
            analysis_id,
            dim(&format!("server {processing_secs:.2}s")),
            self.elapsed()
        ));
    }

    fn on_narrative_start(&self) {
        self.bar.set_prefix("Narrating");
        self.bar.set_message("professional + parent reports".to_string());
    }

    fn on_narrative_complete(&self, audience: Audience, chars: usize) {
        self.bar.println(format!(
            "  {} {:<12}  {}  {}",
            green("✓"),
            audience.label(),
            dim(&format!("{chars:>5} chars")),
            self.elapsed()
        ));
    }

    fn on_narrative_error(&self, audience: Audience, error: String) {
        self.narrative_errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error
        };
        self.bar.println(format!(
            "  {} {:<12}  {}",
            red("✗"),
            audience.label(),
            red(&msg)
        ));
    }

    fn on_export_start(&self, audience: Audience) {
        self.bar.set_prefix("Rendering");
        self.bar.set_message(format!("{audience} report"));
    }

    fn on_export_complete(&self, _audience: Audience, filename: &str, pages: usize, bytes: usize) {
        self.bar.println(format!(
            "  {} {}  {}  {}",
            green("✓"),
            filename,
            dim(&format!("{pages} page(s), {} KB", bytes / 1024)),
            self.elapsed()
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a drawing and write both reports to the current directory
  htp-report house.png

  # Parent report only, stricter detection threshold
  htp-report --audience parent --threshold 0.4 house.jpg -o reports/

  # Check a file against the upload rules without any network call
  htp-report --validate-only scan.tiff

  # Reuse a saved analysis and print the narratives as JSON
  htp-report --analysis-json analysis.json --json

  # Try the pipeline on the built-in sample analysis
  htp-report --sample -o /tmp/htp

ACCEPTED IMAGES:
  JPEG, PNG, BMP, TIFF up to 10 MB. The type is taken from the extension.

ENVIRONMENT VARIABLES:
  HTP_API_URL               Analysis service base URL (default http://localhost:8000)
  HTP_CONFIDENCE_THRESHOLD  Detection threshold, 0.10 to 0.90 (default 0.25)
  HTP_OUTPUT_DIR            Where PDFs are written (default .)
  EDGEQUAKE_LLM_PROVIDER    Text-generation provider (gemini, openai, anthropic, ollama, ...)
  EDGEQUAKE_MODEL           Model ID (default gemini-2.5-flash-lite)
  GEMINI_API_KEY            Key for the gemini provider (OPENAI_API_KEY, ANTHROPIC_API_KEY, ...)
  PDFIUM_LIB_PATH           Path to libpdfium, file or directory
  RUST_LOG                  Overrides the log filter

NOTE:
  Reports are screening aids written from an automated analysis. They are
  not a diagnosis.
"#;

/// Analyse HTP house drawings and export narrative PDF reports.
#[derive(Parser, Debug)]
#[command(
    name = "htp-report",
    version,
    about = "Analyse House-Tree-Person drawings and export narrative PDF reports",
    long_about = "Send a child's house drawing to an HTP analysis service, have a \
text-generation model write a professional and a parent-friendly report from the result, \
and export each report as a paginated A4 PDF.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Drawing to analyse (JPEG, PNG, BMP or TIFF).
    image: Option<PathBuf>,

    /// Directory the PDF reports are written to.
    #[arg(short, long, env = "HTP_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Detection-confidence threshold sent with the drawing (0.10–0.90).
    #[arg(long, env = "HTP_CONFIDENCE_THRESHOLD", default_value_t = 0.25)]
    threshold: f32,

    /// Which reports to export.
    #[arg(long, value_enum, default_value = "both")]
    audience: AudienceArg,

    /// Base URL of the analysis service.
    #[arg(long, env = "HTP_API_URL")]
    api_url: Option<String>,

    /// Text-generation provider: gemini, openai, anthropic, mistral, ollama, ...
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Model ID passed to the provider.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Per-call timeout for the text-generation API in seconds.
    #[arg(long, env = "HTP_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Skip upload and analysis; read an analysis result from this JSON file.
    #[arg(long, conflicts_with_all = ["image", "sample"])]
    analysis_json: Option<PathBuf>,

    /// Use the built-in sample analysis instead of a drawing.
    #[arg(long, conflicts_with = "image")]
    sample: bool,

    /// Only check the image against the upload rules.
    #[arg(long)]
    validate_only: bool,

    /// Print the analysis and narrative pair as JSON instead of exporting.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "HTP_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "HTP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "HTP_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum AudienceArg {
    Professional,
    Parent,
    Both,
}

impl From<AudienceArg> for AudienceSelection {
    fn from(v: AudienceArg) -> Self {
        match v {
            AudienceArg::Professional => AudienceSelection::Professional,
            AudienceArg::Parent => AudienceSelection::Parent,
            AudienceArg::Both => AudienceSelection::Both,
        }
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    analysis: &'a AnalysisResult,
    narratives: &'a NarrativePair,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs out
    // of its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.validate_only;
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

    // ── Validate-only mode ───────────────────────────────────────────────
    if cli.validate_only {
        let path = cli
            .image
            .as_deref()
            .context("--validate-only needs an IMAGE")?;
        return validate_only(path, cli.json).await;
    }

    if cli.image.is_none() && cli.analysis_json.is_none() && !cli.sample {
        bail!("Nothing to analyse: pass an IMAGE, --analysis-json FILE, or --sample");
    }

    // ── Ensure pdfium is bindable before spending model tokens ──────────
    if !cli.json {
        tokio::task::block_in_place(|| engine::pdfium().map(drop)).context("PDF export is unavailable")?;
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress.clone().map(|p| p as Arc<dyn ReportProgressCallback>),
    )?;

    let outcome = run_pipeline(&cli, &config).await;
    if let Some(ref p) = progress {
        p.finish();
    }
    outcome
}

async fn run_pipeline(cli: &Cli, config: &ReportConfig) -> Result<()> {
    let start = Instant::now();

    // ── Step 1: Obtain an analysis result ────────────────────────────────
    let analysis = if cli.sample {
        sample_analysis()
    } else if let Some(ref path) = cli.analysis_json {
        read_analysis(path).await?
    } else {
        let path = cli.image.as_deref().context("No IMAGE given")?;
        let image = load_image(path)
            .await
            .with_context(|| format!("Rejected {}", path.display()))?;
        analyze(&image, config).await.context("Analysis failed")?
    };

    // ── Step 2: Narratives (both audiences) ──────────────────────────────
    let narratives = match generate_narratives(&analysis, config).await {
        Ok(pair) => pair,
        Err(e) => {
            if !cli.quiet {
                print_fallback(&analysis);
            }
            return Err(e).context("Unable to generate AI insights right now. Please try again");
        }
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&JsonOutput {
            analysis: &analysis,
            narratives: &narratives,
        })
        .context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    // ── Step 3: Export ───────────────────────────────────────────────────
    let reports = export_selection(&analysis, &narratives, cli.audience.into(), config)
        .await
        .context("Report export failed")?;

    let mut written = Vec::with_capacity(reports.len());
    for report in &reports {
        let path = export_to_dir(report, &cli.output_dir)
            .await
            .with_context(|| format!("Failed to save {}", report.filename))?;
        written.push((path, report.page_count));
    }

    if !cli.quiet {
        for (path, pages) in &written {
            eprintln!(
                "{}  {}  {}",
                green("✔"),
                bold(&path.display().to_string()),
                dim(&format!("{pages} page(s)"))
            );
        }
        eprintln!(
            "   analysis {}  ·  house {}  ·  {:.1}s total",
            cyan(analysis.short_id()),
            analysis.house_size_category,
            start.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

/// Map CLI args to `ReportConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ReportConfig> {
    let threshold = validate_threshold(cli.threshold).context("Invalid --threshold")?;

    let mut builder = ReportConfig::builder()
        .confidence_threshold(threshold)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref url) = cli.api_url {
        builder = builder.analysis_base_url(url.trim_end_matches('/'));
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn validate_only(path: &Path, json: bool) -> Result<()> {
    let image = load_image(path)
        .await
        .with_context(|| format!("Rejected {}", path.display()))?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "file": image.file_name(),
                "mime": image.mime().as_mime_str(),
                "bytes": image.len(),
            })
        );
    } else {
        println!(
            "{} {}  {}  {}",
            green("✔"),
            bold(image.file_name()),
            image.mime(),
            dim(&image.size_label())
        );
    }
    Ok(())
}

async fn read_analysis(path: &Path) -> Result<AnalysisResult> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let analysis: AnalysisResult = serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not an analysis result", path.display()))?;
    for violation in analysis.contract_violations() {
        tracing::warn!("{}: {}", path.display(), violation);
    }
    Ok(analysis)
}

/// Print whatever interpretation the analysis service supplied itself.
fn print_fallback(analysis: &AnalysisResult) {
    let sections = [
        ("Professional interpretation", analysis.psychologist_interpretation.as_deref()),
        ("Parent interpretation", analysis.parent_interpretation.as_deref()),
        ("Interpretation", Some(analysis.psychological_interpretation.as_str())),
    ];

    let mut printed = false;
    for (heading, text) in sections {
        let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
            continue;
        };
        if !printed {
            eprintln!("{}", cyan("◆ Showing the analysis service's own interpretation instead:"));
            printed = true;
        }
        eprintln!("\n{}\n{}", bold(heading), text);
    }
    if printed {
        eprintln!();
    }
}

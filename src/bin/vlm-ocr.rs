//! CLI binary for vlm-ocr.
//!
//! `vlm-ocr ocr` maps flags onto `OcrConfig` and prints or writes the text;
//! `vlm-ocr serve` starts the upload web UI.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use vlm_ocr::config::{DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_PROMPT};
use vlm_ocr::extract::write_atomic;
use vlm_ocr::{
    combined_text, inspect, ocr, ChatCompletionsClient, DocumentInfo, FailurePolicy, OcrConfig,
    OcrProgressCallback, OcrStats, PageError, PageSelection, PageSeparator, SessionAggregator,
};

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar reused for every document of the run.
struct CliProgressCallback {
    bar: ProgressBar,
    page_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
        })
    }

    fn page_elapsed_secs(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or_default()
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl OcrProgressCallback for CliProgressCallback {
    fn on_document_start(&self, info: &DocumentInfo, selected_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_style(style);
        self.bar.set_length(selected_pages as u64);
        self.bar.set_position(0);
        self.bar.set_prefix("OCR");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{}: {} of {} pages, {} bytes",
                info.name, selected_pages, info.page_count, info.size_bytes
            ))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut started) = self.page_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text_len: usize) {
        let secs = self.page_elapsed_secs();
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.2}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.page_elapsed_secs();
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.2}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        let line = if failed == 0 {
            format!("{} {} pages done", green("✔"), bold(&success_count.to_string()))
        } else {
            format!(
                "{} {}/{} pages done  ({} failed)",
                if failed == total_pages { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            )
        };
        self.bar.println(line);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR to stdout using the default endpoint (http://qwen-vlm:8000/v1)
  vlm-ocr ocr scan.pdf

  # Local vLLM, write text to a file
  vlm-ocr --endpoint http://localhost:8000/v1 ocr scan.pdf -o scan.txt

  # Markdown report with per-page timings
  vlm-ocr ocr --markdown scan.pdf -o ocr_scan.pdf.md

  # Several files into one combined text (File: <name> - Page <n> blocks)
  vlm-ocr ocr a.pdf b.pdf -o combined_ocr_output.txt

  # Page count only, no model call
  vlm-ocr ocr --inspect-only scan.pdf

  # Web UI on port 8501
  vlm-ocr serve --port 8501

ENVIRONMENT VARIABLES:
  VLM_OCR_ENDPOINT     Base URL of the OpenAI-compatible API
  VLM_OCR_MODEL        Model identifier
  VLM_OCR_API_KEY      Bearer token, if the server requires one
  PDFIUM_LIB_PATH      Path to libpdfium
  RUST_LOG             Log filter, e.g. vlm_ocr=debug
"#;

/// OCR PDFs through a vision-language model endpoint.
#[derive(Parser, Debug)]
#[command(
    name = "vlm-ocr",
    version,
    about = "OCR PDF files through an OpenAI-compatible vision-language model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

/// Settings shared by every subcommand.
#[derive(Args, Debug)]
struct CommonArgs {
    /// Base URL of the chat-completions API (without /chat/completions).
    #[arg(long, global = true, env = "VLM_OCR_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Model identifier sent with every request.
    #[arg(long, global = true, env = "VLM_OCR_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Bearer token for the endpoint.
    #[arg(long, global = true, env = "VLM_OCR_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Instruction text sent alongside each page image.
    #[arg(long, global = true, env = "VLM_OCR_PROMPT", default_value = DEFAULT_PROMPT)]
    prompt: String,

    /// Rendering DPI (72–400).
    #[arg(long, global = true, env = "VLM_OCR_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Max tokens the model may generate per page.
    #[arg(long, global = true, env = "VLM_OCR_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: u32,

    /// Sampling temperature.
    #[arg(long, global = true, env = "VLM_OCR_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Per-page request timeout in seconds.
    #[arg(long, global = true, env = "VLM_OCR_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, global = true, env = "VLM_OCR_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// OCR one or more PDFs (paths or URLs).
    Ocr(OcrArgs),
    /// Serve the upload web UI.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct OcrArgs {
    /// Local PDF paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Write output to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit the Markdown report instead of plain text.
    #[arg(long, conflicts_with = "json")]
    markdown: bool,

    /// Emit structured JSON.
    #[arg(long)]
    json: bool,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, default_value = "all")]
    pages: String,

    /// Page separator: newline, blank, rule, or a custom line.
    #[arg(long, default_value = "newline")]
    separator: String,

    /// Abort a document on its first failed page.
    #[arg(long)]
    fail_fast: bool,

    /// Save each page image that was sent to the model into this directory.
    #[arg(long)]
    save_images: Option<PathBuf>,

    /// Print page count and size only; no model call.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "VLM_OCR_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "VLM_OCR_PORT", default_value_t = 8501)]
    port: u16,

    /// Seconds an upload's results stay available.
    #[arg(long, env = "VLM_OCR_SESSION_TTL", default_value_t = 3600)]
    session_ttl: u64,
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    info: Option<&'a DocumentInfo>,
    stats: OcrStats,
    pages: Vec<JsonPage<'a>>,
}

#[derive(Serialize)]
struct JsonPage<'a> {
    page_num: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a PageError>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs are noise while the progress bar is drawing.
    let show_progress = match &cli.command {
        Command::Ocr(args) => {
            !cli.common.quiet && !args.no_progress && !args.json && !args.inspect_only
        }
        Command::Serve(_) => false,
    };
    let filter = if cli.common.verbose {
        "debug"
    } else if cli.common.quiet || show_progress {
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

    match &cli.command {
        Command::Ocr(args) => run_ocr(&cli.common, args, show_progress).await,
        Command::Serve(args) => {
            let config = build_config(&cli.common, None)?;
            let client = ChatCompletionsClient::new(&config).context("Failed to create client")?;
            vlm_ocr::server::serve(
                &config,
                Arc::new(client),
                &args.host,
                args.port,
                Duration::from_secs(args.session_ttl),
            )
            .await
        }
    }
}

async fn run_ocr(common: &CommonArgs, args: &OcrArgs, show_progress: bool) -> Result<()> {
    let progress = show_progress.then(CliProgressCallback::new);
    let mut config = build_config(common, Some(args))?;
    if let Some(ref cb) = progress {
        config.progress_callback = Some(cb.clone());
    }

    // ── Inspect-only mode ────────────────────────────────────────────────
    if args.inspect_only {
        let mut infos = Vec::with_capacity(args.inputs.len());
        for input in &args.inputs {
            let info = inspect(input, &config)
                .await
                .with_context(|| format!("Failed to inspect {input}"))?;
            infos.push(info);
        }
        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&infos).context("Failed to serialize metadata")?
            );
        } else {
            for info in &infos {
                println!("PDF:   {}", info.name);
                println!("Size:  {} bytes", info.size_bytes);
                println!("Pages: {}", info.page_count);
            }
        }
        return Ok(());
    }

    // ── Run OCR ──────────────────────────────────────────────────────────
    let client = ChatCompletionsClient::new(&config).context("Failed to create client")?;
    let mut sessions: Vec<SessionAggregator> = Vec::new();
    let mut failures = 0usize;

    for input in &args.inputs {
        match ocr(input, &config, &client).await {
            Ok(session) => {
                if let Some(ref dir) = args.save_images {
                    save_page_images(dir, &session).await?;
                }
                sessions.push(session);
            }
            Err(e) if args.inputs.len() > 1 => {
                failures += 1;
                eprintln!("{} {}: {}", red("✘"), input, e);
            }
            Err(e) => {
                if let Some(ref cb) = progress {
                    cb.finish();
                }
                return Err(e).with_context(|| format!("OCR failed for {input}"));
            }
        }
    }
    if let Some(ref cb) = progress {
        cb.finish();
    }

    let rendered = render_output(&sessions, args, &config.page_separator)?;
    match args.output {
        Some(ref path) => {
            write_atomic(path, &rendered)
                .await
                .context("Failed to write output")?;
            if !common.quiet {
                eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            if !rendered.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !common.quiet && !show_progress {
        for session in &sessions {
            let stats = session.stats();
            eprintln!(
                "{}: {}/{} pages in {}ms{}",
                session.name(),
                stats.processed_pages,
                stats.selected_pages,
                stats.total_duration_ms,
                if stats.failed_pages > 0 {
                    format!("  ({} failed)", stats.failed_pages)
                } else {
                    String::new()
                }
            );
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} documents failed", failures, args.inputs.len());
    }
    Ok(())
}

/// Map CLI args to `OcrConfig`.
fn build_config(common: &CommonArgs, ocr_args: Option<&OcrArgs>) -> Result<OcrConfig> {
    let mut builder = OcrConfig::builder()
        .endpoint(&common.endpoint)
        .model(&common.model)
        .prompt(&common.prompt)
        .dpi(common.dpi)
        .max_tokens(common.max_tokens)
        .temperature(common.temperature)
        .request_timeout_secs(common.timeout);

    if let Some(ref key) = common.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref password) = common.password {
        builder = builder.password(password);
    }

    if let Some(args) = ocr_args {
        builder = builder
            .pages(parse_pages(&args.pages)?)
            .page_separator(parse_separator(&args.separator))
            .retain_page_images(args.save_images.is_some())
            .download_timeout_secs(args.download_timeout);
        if args.fail_fast {
            builder = builder.failure_policy(FailurePolicy::FailFast);
        }
    }

    builder.build().context("Invalid configuration")
}

fn render_output(
    sessions: &[SessionAggregator],
    args: &OcrArgs,
    separator: &PageSeparator,
) -> Result<String> {
    if args.json {
        let docs: Vec<JsonDocument<'_>> = sessions.iter().map(json_document).collect();
        return serde_json::to_string_pretty(&docs).context("Failed to serialise output");
    }
    if args.markdown {
        return Ok(sessions.iter().map(SessionAggregator::markdown_report).collect());
    }
    Ok(match sessions {
        [single] => single.text(separator),
        many => combined_text(many),
    })
}

fn json_document(session: &SessionAggregator) -> JsonDocument<'_> {
    JsonDocument {
        info: session.info(),
        stats: session.stats(),
        pages: session
            .entries()
            .map(|entry| {
                let ok = entry.outcome.as_ref().ok();
                JsonPage {
                    page_num: entry.page_num,
                    text: ok.map(|r| r.text.as_str()),
                    duration_ms: ok.map(|r| r.duration_ms),
                    error: entry.error(),
                }
            })
            .collect(),
    }
}

/// Write `<stem>_page_NNN.png` for every retained preview.
async fn save_page_images(dir: &Path, session: &SessionAggregator) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let stem = Path::new(session.name())
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());

    for entry in session.entries() {
        let Some(ref preview) = entry.preview else {
            continue;
        };
        let png = preview
            .png_bytes()
            .with_context(|| format!("Corrupt preview for page {}", entry.page_num))?;
        let path = dir.join(format!("{}_page_{:03}.png", stem, entry.page_num));
        tokio::fs::write(&path, png)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    let page_number = |p: &str| -> Result<usize> {
        let n: usize = p
            .trim()
            .parse()
            .with_context(|| format!("Invalid page number: '{}'", p.trim()))?;
        if n < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", n);
        }
        Ok(n)
    };

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let (start, end) = (page_number(start)?, page_number(end)?);
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages = s.split(',').map(page_number).collect::<Result<Vec<_>>>()?;
        return Ok(PageSelection::Set(pages));
    }

    Ok(PageSelection::Single(page_number(&s)?))
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "newline" | "nl" => PageSeparator::Newline,
        "blank" => PageSeparator::BlankLine,
        "rule" | "hr" | "---" => PageSeparator::HorizontalRule,
        _ => PageSeparator::Custom(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn shared_flags_apply_after_subcommand() {
        let cli = Cli::try_parse_from([
            "vlm-ocr",
            "ocr",
            "a.pdf",
            "b.pdf",
            "--endpoint",
            "http://localhost:8000/v1",
            "--dpi",
            "200",
            "--fail-fast",
        ])
        .unwrap();
        assert_eq!(cli.common.endpoint, "http://localhost:8000/v1");
        assert_eq!(cli.common.dpi, 200);
        let Command::Ocr(args) = cli.command else {
            panic!("expected ocr subcommand");
        };
        assert_eq!(args.inputs, vec!["a.pdf", "b.pdf"]);

        let config = build_config(&cli.common, Some(&args)).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.completions_url(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn dpi_out_of_range_is_rejected_by_clap() {
        assert!(Cli::try_parse_from(["vlm-ocr", "--dpi", "20", "ocr", "a.pdf"]).is_err());
    }

    #[test]
    fn ocr_requires_an_input() {
        assert!(Cli::try_parse_from(["vlm-ocr", "ocr"]).is_err());
    }

    #[test]
    fn markdown_and_json_conflict() {
        assert!(Cli::try_parse_from(["vlm-ocr", "ocr", "--markdown", "--json", "a.pdf"]).is_err());
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["vlm-ocr", "serve", "--port", "9000"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve subcommand");
        };
        assert_eq!(args.port, 9000);
        assert_eq!(args.host, "0.0.0.0");
        assert_eq!(args.session_ttl, 3600);
    }

    #[test]
    fn parse_pages_forms() {
        assert_eq!(parse_pages("all").unwrap(), PageSelection::All);
        assert_eq!(parse_pages(" 5 ").unwrap(), PageSelection::Single(5));
        assert_eq!(parse_pages("3-15").unwrap(), PageSelection::Range(3, 15));
        assert_eq!(parse_pages("1,3,5").unwrap(), PageSelection::Set(vec![1, 3, 5]));
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("9-2").is_err());
        assert!(parse_pages("x").is_err());
    }

    #[test]
    fn parse_separator_forms() {
        assert_eq!(parse_separator("newline"), PageSeparator::Newline);
        assert_eq!(parse_separator("blank"), PageSeparator::BlankLine);
        assert_eq!(parse_separator("HR"), PageSeparator::HorizontalRule);
        assert_eq!(
            parse_separator("=== Next ==="),
            PageSeparator::Custom("=== Next ===".into())
        );
    }
}

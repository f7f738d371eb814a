//! Command-line interface for staging ZIP archives.
//!
//! Extracts an archive into its own directory under the user cache, prompting
//! for a password when an encrypted entry is met, then lists what was staged.

use clap::{Parser, Subcommand};
use indicatif::{HumanBytes, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use zipstage::probe::probe_first_entry;
use zipstage::{
    mime, sweep_stale, BrowserEntry, ExtractError, ExtractOptions, ExtractRequest, ExtractStats,
    Extraction, ExtractionSession, Password, SessionUi, StagingBrowser, ZIP_CONTENT_TYPE,
};

#[derive(Parser)]
#[command(name = "zipstage")]
#[command(version, about = "Stage ZIP archive contents from the command line", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract an archive into a fresh staging directory
    Extract {
        /// Archive file to extract, or `-` for standard input
        archive: PathBuf,

        /// Directory that receives staging directories
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Content type of the input (inferred from the file name when omitted)
        #[arg(long)]
        content_type: Option<String>,

        /// Keep the progress indicator up for at least this long
        #[arg(long, default_value = "250")]
        min_progress_ms: u64,

        /// Size limit in bytes
        #[arg(long)]
        size_limit: Option<u64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Select a staged file (path relative to the staging root)
        #[arg(long)]
        open: Option<PathBuf>,
    },

    /// Show the first entry header of an archive
    Inspect {
        /// Archive file to inspect, or `-` for standard input
        archive: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the content type used for a file extension
    Mime {
        /// Extension, with or without the leading dot
        extension: String,
    },

    /// Remove staging directories older than the given age
    Sweep {
        /// Directory that holds staging directories
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Maximum age in seconds
        #[arg(long, default_value = "86400")]
        ttl_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract {
            archive,
            cache_dir,
            content_type,
            min_progress_ms,
            size_limit,
            json,
            open,
        } => {
            handle_extract(
                archive,
                cache_dir,
                content_type,
                min_progress_ms,
                size_limit,
                json,
                open,
            )
            .await
        }
        Commands::Inspect { archive, json } => handle_inspect(archive, json),
        Commands::Mime { extension } => {
            println!("{}", mime::resolve(extension.trim_start_matches('.')));
            Ok(())
        }
        Commands::Sweep {
            cache_dir,
            ttl_secs,
        } => handle_sweep(cache_dir, ttl_secs),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Terminal front end for a session: a spinner and a hidden-input prompt.
struct TerminalUi {
    spinner: Option<ProgressBar>,
}

impl TerminalUi {
    fn new() -> Self {
        Self { spinner: None }
    }
}

impl SessionUi for TerminalUi {
    fn show_progress(&mut self, archive_name: &str) {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(format!("Extracting {}", archive_name));
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    fn dismiss_progress(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    async fn prompt_password(&mut self, archive_name: &str) -> Option<Password> {
        if let Some(spinner) = &self.spinner {
            spinner.set_draw_target(ProgressDrawTarget::hidden());
        }

        let prompt = format!("Password for {} (empty to cancel)", archive_name);
        let answer = tokio::task::spawn_blocking(move || {
            dialoguer::Password::new()
                .with_prompt(prompt)
                .allow_empty_password(true)
                .interact()
        })
        .await;

        if let Some(spinner) = &self.spinner {
            spinner.set_draw_target(ProgressDrawTarget::stderr());
        }

        match answer {
            Ok(Ok(password)) if !password.is_empty() => Some(Password::from(password)),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::warn!("password prompt failed: {}", e);
                None
            }
            Err(e) => {
                tracing::warn!("password prompt task failed: {}", e);
                None
            }
        }
    }

    fn on_progress(&mut self, file: &str, bytes_written: u64) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(format!("{} ({})", file, HumanBytes(bytes_written)));
        }
    }

    fn report_failure(&mut self, _archive_name: &str, message: &str, _error: &ExtractError) {
        eprintln!("{}", message);
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractReport<'a> {
    root: &'a Path,
    stats: &'a ExtractStats,
    entries: Vec<BrowserEntry>,
}

async fn handle_extract(
    archive: PathBuf,
    cache_dir: Option<PathBuf>,
    content_type: Option<String>,
    min_progress_ms: u64,
    size_limit: Option<u64>,
    json: bool,
    open: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let from_stdin = archive == Path::new("-");
    let archive_name = if from_stdin {
        "stdin".to_string()
    } else {
        archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| archive.display().to_string())
    };

    let request = ExtractRequest {
        content_type: content_type.unwrap_or_else(|| infer_content_type(&archive, from_stdin)),
        archive_name,
        staging_parent: resolve_cache_dir(cache_dir),
    };

    let defaults = ExtractOptions::default();
    let options = ExtractOptions {
        size_limit_bytes: size_limit.or(defaults.size_limit_bytes),
        progress_delay: Duration::from_millis(min_progress_ms),
        ..defaults
    };

    let session = ExtractionSession::new(request, options);
    let cancel_flag = session.cancel_handle();
    ctrlc::set_handler(move || {
        cancel_flag.store(true, Ordering::SeqCst);
    })?;

    let mut ui = TerminalUi::new();
    let extraction = if from_stdin {
        session.run(read_stdin()?, &mut ui).await?
    } else {
        session.run(archive, &mut ui).await?
    };

    print_extraction(&extraction, json, open.as_deref())
}

fn print_extraction(
    extraction: &Extraction,
    json: bool,
    open: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let browser = StagingBrowser::new(&extraction.root);

    if let Some(relative) = open {
        let selection = browser.select_relative(relative)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&selection)?);
        } else {
            println!("{}\t{}", selection.path.display(), selection.mime_type);
        }
        return Ok(());
    }

    let entries = browser.walk()?;
    if json {
        let report = ExtractReport {
            root: extraction.root.path(),
            stats: &extraction.stats,
            entries,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", extraction.root.path().display());
    for entry in &entries {
        let depth = entry.relative_path.components().count().saturating_sub(1);
        let indent = "  ".repeat(depth);
        if entry.is_directory {
            println!("{}{}/", indent, entry.name);
        } else {
            println!(
                "{}{}  {}  {}",
                indent,
                entry.name,
                HumanBytes(entry.size.unwrap_or(0)),
                entry.mime_type.as_deref().unwrap_or(mime::UNKNOWN_MIME_TYPE)
            );
        }
    }
    println!(
        "Extracted {} files ({}) in {:.2?}",
        extraction.stats.files_extracted,
        HumanBytes(extraction.stats.bytes_written),
        extraction.stats.duration
    );
    Ok(())
}

fn handle_inspect(archive: PathBuf, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let entry = if archive == Path::new("-") {
        probe_first_entry(&mut io::stdin().lock())?
    } else {
        zipstage::probe(&archive)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    match entry {
        Some(entry) => {
            println!("First entry: {}", entry.path);
            println!("Directory:   {}", entry.is_directory);
            println!("Encrypted:   {}", entry.is_encrypted);
            println!("Method:      {:?}", entry.method);
            match (entry.compressed_size, entry.uncompressed_size) {
                (Some(compressed), Some(uncompressed)) => println!(
                    "Size:        {} ({} compressed)",
                    HumanBytes(uncompressed),
                    HumanBytes(compressed)
                ),
                _ => println!("Size:        recorded after the data"),
            }
        }
        None => println!("Archive has no entries"),
    }
    Ok(())
}

fn handle_sweep(cache_dir: Option<PathBuf>, ttl_secs: u64) -> Result<(), Box<dyn std::error::Error>> {
    let cache_dir = resolve_cache_dir(cache_dir);
    let removed = sweep_stale(&cache_dir, Duration::from_secs(ttl_secs))?;
    println!(
        "Removed {} staging director{} from {}",
        removed,
        if removed == 1 { "y" } else { "ies" },
        cache_dir.display()
    );
    Ok(())
}

fn resolve_cache_dir(cache_dir: Option<PathBuf>) -> PathBuf {
    cache_dir.unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("zipstage")
    })
}

fn infer_content_type(archive: &Path, from_stdin: bool) -> String {
    let is_zip = archive
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("zip"));

    if from_stdin || is_zip {
        ZIP_CONTENT_TYPE.to_string()
    } else {
        "application/octet-stream".to_string()
    }
}

/// Standard input cannot be reopened, so it is buffered for the pre-check and the extraction.
fn read_stdin() -> io::Result<Arc<[u8]>> {
    let mut data = Vec::new();
    io::stdin().lock().read_to_end(&mut data)?;
    Ok(Arc::from(data))
}

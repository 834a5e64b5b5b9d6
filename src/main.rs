//! gamearc CLI - identify, list and extract proprietary game archives.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::{MatchOptions, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use gamearc::prelude::*;

/// gamearc - game archive identification and extraction tool
#[derive(Parser)]
#[command(name = "gamearc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Largest file count accepted from an archive header
    #[arg(long, global = true, env = "GAMEARC_MAX_FILES", default_value_t = Limits::DEFAULT_MAX_FILES)]
    max_files: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported archive formats
    Formats,

    /// Score files against every format
    Identify {
        /// Files to identify
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List contents of an archive
    List {
        /// Path to the archive
        #[arg(short, long)]
        input: PathBuf,

        /// Skip detection and use this format
        #[arg(long, env = "GAMEARC_FORMAT")]
        format: Option<String>,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show offsets, sizes and decoders
        #[arg(short, long)]
        detailed: bool,

        /// Print the listing as JSON
        #[arg(long, conflicts_with = "detailed")]
        json: bool,
    },

    /// Extract files from an archive
    Extract {
        /// Path to the archive
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Skip detection and use this format
        #[arg(long, env = "GAMEARC_FORMAT")]
        format: Option<String>,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Recursively find recognizable archives under a directory
    Scan {
        /// Directory to scan
        dir: PathBuf,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only initialize logging if verbose or RUST_LOG is set
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        let level = if cli.verbose { "debug" } else { "warn" };
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(format!("gamearc_core={level}").parse()?)
                    .add_directive(format!("gamearc_codec={level}").parse()?),
            )
            .init();
    }

    let registry = gamearc::formats::registry(Limits::default().with_max_files(cli.max_files))
        .context("Failed to build format registry")?;

    match cli.command {
        Commands::Formats => cmd_formats(&registry),
        Commands::Identify { files } => cmd_identify(&registry, &files)?,
        Commands::List {
            input,
            format,
            filter,
            detailed,
            json,
        } => cmd_list(&registry, &input, format.as_deref(), filter.as_deref(), detailed, json)?,
        Commands::Extract {
            input,
            output,
            format,
            filter,
        } => cmd_extract(&registry, &input, &output, format.as_deref(), filter.as_deref())?,
        Commands::Scan { dir, json } => cmd_scan(&registry, &dir, json)?,
    }

    Ok(())
}

fn open_listing(registry: &Registry, input: &Path, format: Option<&str>) -> Result<Listing> {
    let listing = match format {
        Some(name) => registry.open_as(input, name),
        None => registry.open(input),
    };
    listing.with_context(|| format!("Failed to read {}", input.display()))
}

fn cmd_formats(registry: &Registry) {
    for descriptor in registry.descriptors() {
        println!(
            "{:<16} {:<12} {}",
            descriptor.name,
            descriptor.extensions.join(","),
            descriptor.description
        );
    }
    println!("\nTotal: {} formats", registry.len());
}

fn cmd_identify(registry: &Registry, files: &[PathBuf]) -> Result<()> {
    for path in files {
        let source = ByteSource::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let ranked = registry.rank(&source, Some(path));

        match ranked.first() {
            None => println!("{}: unrecognized", path.display()),
            Some(best) => {
                println!("{}: {} (score {})", path.display(), best.name, best.score);
                for other in ranked.iter().skip(1).take(3) {
                    println!("    also {} (score {})", other.name, other.score);
                }
            }
        }
    }
    Ok(())
}

fn cmd_list(
    registry: &Registry,
    input: &Path,
    format: Option<&str>,
    filter: Option<&str>,
    detailed: bool,
    json: bool,
) -> Result<()> {
    let mut listing = open_listing(registry, input, format)?;
    if let Some(pattern) = filter {
        let matcher = EntryFilter::new(pattern)?;
        listing.entries.retain(|e| matcher.matches(&e.name));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for entry in &listing.entries {
        if detailed {
            println!(
                "{:>#12x} {:>12} {:>12} {:<8} {}",
                entry.offset,
                entry.length,
                entry.output_length(),
                decoder_label(entry),
                entry.name
            );
        } else {
            println!("{}", entry.name);
        }
    }

    println!(
        "\nTotal: {} entries, {} bytes ({})",
        listing.entries.len(),
        listing.total_length(),
        listing.format
    );

    Ok(())
}

fn decoder_label(entry: &Entry) -> String {
    match &entry.decoder {
        None => "-".to_string(),
        Some(DecoderRef::Xor(key)) => format!("xor:{key:02x}"),
        Some(DecoderRef::XorKey(_)) => "xor-key".to_string(),
        Some(DecoderRef::Deflate) => "deflate".to_string(),
        Some(DecoderRef::Zlib) => "zlib".to_string(),
        Some(DecoderRef::Zstd) => "zstd".to_string(),
        Some(DecoderRef::External(name)) => name.to_string(),
    }
}

fn cmd_extract(
    registry: &Registry,
    input: &Path,
    output: &Path,
    format: Option<&str>,
    filter: Option<&str>,
) -> Result<()> {
    println!("Opening archive: {}", input.display());

    let start = Instant::now();
    let listing = open_listing(registry, input, format)?;
    println!(
        "Loaded {} entries as {} in {:?}",
        listing.entries.len(),
        listing.format,
        start.elapsed()
    );

    let selected: Vec<&Entry> = match filter {
        Some(pattern) => {
            let matcher = EntryFilter::new(pattern)?;
            listing
                .entries
                .iter()
                .filter(|e| matcher.matches(&e.name))
                .collect()
        }
        None => listing.entries.iter().collect(),
    };

    println!("Extracting {} entries...", selected.len());

    let extractor = Extractor::open(&listing.path, &listing.entries)
        .context("Failed to open archive data")?;
    fs::create_dir_all(output)?;

    let pb = ProgressBar::new(selected.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let errors = AtomicUsize::new(0);
    selected.par_iter().for_each(|entry| {
        if let Err(e) = extractor.extract_to(entry, output) {
            pb.suspend(|| eprintln!("Error extracting {}: {}", entry.name, e));
            errors.fetch_add(1, Ordering::Relaxed);
        }
        pb.inc(1);
    });

    pb.finish_with_message("Done");
    println!(
        "Extraction completed in {:?} ({} errors)",
        start.elapsed(),
        errors.load(Ordering::Relaxed)
    );

    Ok(())
}

fn cmd_scan(registry: &Registry, dir: &Path, json: bool) -> Result<()> {
    let files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable path");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let mut found: Vec<Listing> = files
        .par_iter()
        .filter_map(|path| {
            let result = registry.open(path);
            pb.inc(1);
            match result {
                Ok(listing) => Some(listing),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "not an archive");
                    None
                }
            }
        })
        .collect();
    pb.finish_and_clear();
    found.sort_by(|a, b| a.path.cmp(&b.path));

    if json {
        #[derive(serde::Serialize)]
        struct Found<'a> {
            path: &'a Path,
            format: &'a str,
            score: u32,
            entries: usize,
        }
        let summary: Vec<Found<'_>> = found
            .iter()
            .map(|l| Found {
                path: &l.path,
                format: l.format,
                score: l.score,
                entries: l.entries.len(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    for listing in &found {
        println!(
            "{:<16} {:>8} entries  {}",
            listing.format,
            listing.entries.len(),
            listing.path.display()
        );
    }
    println!("\nFound {} archives in {} files", found.len(), files.len());

    Ok(())
}

/// Case-insensitive entry name filter.
///
/// Patterns with glob metacharacters match the whole name; plain text
/// matches anywhere in the name.
struct EntryFilter {
    pattern: Option<Pattern>,
    needle: String,
}

impl EntryFilter {
    fn new(pattern: &str) -> Result<Self> {
        let normalized = pattern.replace('\\', "/");
        let is_glob = normalized.contains(['*', '?', '[']);
        Ok(Self {
            pattern: if is_glob {
                Some(Pattern::new(&normalized).context("Invalid filter pattern")?)
            } else {
                None
            },
            needle: normalized.to_lowercase(),
        })
    }

    fn matches(&self, name: &str) -> bool {
        let name = name.replace('\\', "/");
        match &self.pattern {
            Some(pattern) => pattern.matches_with(
                &name,
                MatchOptions {
                    case_sensitive: false,
                    require_literal_separator: false,
                    require_literal_leading_dot: false,
                },
            ),
            None => name.to_lowercase().contains(&self.needle),
        }
    }
}

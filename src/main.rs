use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use riscan_core::{OutputFormat, RiConfig};
use riscan_dedup::ProvenanceStats;
use riscan_pipeline::artifacts::{pair_by_document, read_json, write_json};
use riscan_pipeline::{
    load_documents, CombinedResults, CorpusDocument, DocumentReport, KeywordResults, Pipeline,
    SemanticResults,
};
use riscan_semantic::cache::EmbeddingCache;
use riscan_semantic::EmbeddingClient;

const KEYWORD_FILE: &str = "keyword_results.json";
const SEMANTIC_FILE: &str = "semantic_results.json";
const COMBINED_FILE: &str = "combined_results.json";

#[derive(Parser)]
#[command(
    name = "riscan",
    version,
    about = "Find resilient-infrastructure passages in project documents",
    long_about = "riscan extracts resilient-infrastructure passages from project documents.\n\n\
                   A lemmatized keyword scan and an embedding-based semantic ranking run\n\
                   independently; their matches are merged by span overlap with provenance.\n\n\
                   Examples:\n  \
                     riscan run docs/                    All stages, summary per document\n  \
                     riscan keywords docs/ --out kw.json Keyword stage only\n  \
                     riscan semantic docs/ --out sem.json  Semantic stage only\n  \
                     riscan dedup --keywords kw.json --semantic sem.json\n  \
                     riscan init                         Write a .riscan.toml with the built-in taxonomy"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .riscan.toml, else built-in taxonomy)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Scan documents for taxonomy keywords
    #[command(long_about = "Scan documents for taxonomy keywords.\n\n\
        Keywords and text are lemmatized, so \"flooding\" matches \"flood\" and\n\
        multi-word phrases match across hyphens. Each match carries its sentence context.\n\n\
        Examples:\n  riscan keywords docs/\n  riscan keywords pad-001.txt --out keyword_results.json")]
    Keywords {
        /// Document file or directory of .txt / .md documents
        input: PathBuf,

        /// Write the full results to this JSON file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Rank document chunks against the semantic queries
    #[command(long_about = "Rank document chunks against the semantic queries.\n\n\
        Documents are split into overlapping character windows and scored against every\n\
        query. The offline \"hashing\" provider needs no API key; \"openai\" and \"voyage\"\n\
        call the provider and cache vectors when [embedding] cache_path is set.\n\n\
        Examples:\n  riscan semantic docs/\n  riscan semantic docs/ --out semantic_results.json")]
    Semantic {
        /// Document file or directory of .txt / .md documents
        input: PathBuf,

        /// Write the full results to this JSON file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Merge keyword and semantic result files
    #[command(long_about = "Merge keyword and semantic result files.\n\n\
        Matches whose spans overlap by at least the configured threshold are merged\n\
        into one passage that remembers which methods found it. With --combined, an\n\
        existing combined file is deduplicated again.\n\n\
        Examples:\n  riscan dedup --keywords kw.json --semantic sem.json --out combined.json\n  \
        riscan dedup --combined combined.json")]
    Dedup {
        /// Keyword results produced by `riscan keywords --out`
        #[arg(long, requires = "semantic", conflicts_with = "combined")]
        keywords: Option<PathBuf>,

        /// Semantic results produced by `riscan semantic --out`
        #[arg(long, requires = "keywords")]
        semantic: Option<PathBuf>,

        /// Combined results to deduplicate again
        #[arg(long)]
        combined: Option<PathBuf>,

        /// Write the combined results to this JSON file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run keyword, semantic and dedup stages
    #[command(long_about = "Run keyword, semantic and dedup stages.\n\n\
        With --out-dir, the three stage files (keyword_results.json,\n\
        semantic_results.json, combined_results.json) are written there.\n\n\
        Examples:\n  riscan run docs/\n  riscan run docs/ --out-dir results/ --format markdown")]
    Run {
        /// Document file or directory of .txt / .md documents
        input: PathBuf,

        /// Directory for the per-stage JSON files
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Create a default .riscan.toml configuration file
    #[command(long_about = "Create a default .riscan.toml configuration file.\n\n\
        Writes the built-in resilient-infrastructure taxonomy and query set so they\n\
        can be edited. Fails if .riscan.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1mriscan\x1b[0m v{version}: resilient-infrastructure passage extraction\n");

        println!("Quick start:");
        println!("  \x1b[36mriscan init\x1b[0m              Create a .riscan.toml config file");
        println!("  \x1b[36mriscan run docs/\x1b[0m         Run every stage over a directory\n");

        println!("All commands:");
        println!("  \x1b[32mkeywords\x1b[0m  Lemmatized taxonomy keyword scan");
        println!("  \x1b[32msemantic\x1b[0m  Chunk ranking against semantic queries");
        println!("  \x1b[32mdedup\x1b[0m     Merge keyword and semantic results by span overlap");
        println!("  \x1b[32mrun\x1b[0m       All three stages");
        println!("  \x1b[32minit\x1b[0m      Create default configuration\n");
    } else {
        println!("riscan v{version}: resilient-infrastructure passage extraction\n");

        println!("Quick start:");
        println!("  riscan init              Create a .riscan.toml config file");
        println!("  riscan run docs/         Run every stage over a directory\n");

        println!("All commands:");
        println!("  keywords  Lemmatized taxonomy keyword scan");
        println!("  semantic  Chunk ranking against semantic queries");
        println!("  dedup     Merge keyword and semantic results by span overlap");
        println!("  run       All three stages");
        println!("  init      Create default configuration\n");
    }

    println!("Run 'riscan <command> --help' for details.");
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new(
            "warn,riscan=debug,riscan_core=debug,riscan_lexical=debug,\
             riscan_semantic=debug,riscan_dedup=debug,riscan_pipeline=debug",
        )
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RiConfig> {
    let config = match path {
        Some(path) => RiConfig::from_file(path)?,
        None => {
            let default_path = Path::new(".riscan.toml");
            if default_path.exists() {
                RiConfig::from_file(default_path)?
            } else {
                RiConfig::builtin()?
            }
        }
    };
    Ok(config)
}

/// Remote embedding client and optional cache, or `None` for the offline provider.
fn remote_embedding(config: &RiConfig) -> Result<Option<(EmbeddingClient, Option<EmbeddingCache>)>> {
    if config.embedding.provider == "hashing" {
        return Ok(None);
    }
    let client = EmbeddingClient::with_config(&config.embedding)?;
    let cache = match &config.embedding.cache_path {
        Some(path) => Some(EmbeddingCache::open(path)?),
        None => None,
    };
    Ok(Some((client, cache)))
}

fn progress(len: usize, message: &str) -> Result<Option<indicatif::ProgressBar>> {
    if !std::io::stderr().is_terminal() {
        return Ok(None);
    }
    let pb = indicatif::ProgressBar::new(len as u64);
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} {pos}/{len} ({elapsed})")
            .into_diagnostic()?,
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Ok(Some(pb))
}

fn load_corpus(input: &Path) -> Result<Vec<CorpusDocument>> {
    let docs = load_documents(input)?;
    if docs.is_empty() {
        miette::bail!(miette::miette!(
            help = "documents must be .txt or .md files",
            "no documents found under {}",
            input.display()
        ));
    }
    Ok(docs)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn bold(text: &str, use_color: bool) -> String {
    if use_color {
        format!("\x1b[1m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

fn top_counts(counts: &std::collections::BTreeMap<String, usize>, limit: usize) -> String {
    let mut entries: Vec<(&String, &usize)> = counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    entries
        .iter()
        .take(limit)
        .map(|(k, v)| format!("{k} ({v})"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_keywords(results: &[KeywordResults], format: OutputFormat, use_color: bool) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(results)?,
        OutputFormat::Markdown => {
            println!("# Keyword matches\n");
            println!("| Document | Matches | Top keywords |");
            println!("|----------|---------|--------------|");
            for r in results {
                println!(
                    "| {} | {} | {} |",
                    r.document_id,
                    r.total_matches,
                    top_counts(&r.keyword_counts, 5)
                );
            }
        }
        OutputFormat::Text => {
            for r in results {
                println!(
                    "{}: {} keyword matches",
                    bold(&r.document_id, use_color),
                    r.total_matches
                );
                if !r.keyword_counts.is_empty() {
                    println!("  keywords: {}", top_counts(&r.keyword_counts, 8));
                    println!("  sectors:  {}", top_counts(&r.sector_counts, 8));
                }
            }
        }
    }
    Ok(())
}

fn print_semantic(results: &[SemanticResults], format: OutputFormat, use_color: bool) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(results)?,
        OutputFormat::Markdown => {
            println!("# Semantic matches\n");
            println!("| Document | Chunks | Matches | Sectors |");
            println!("|----------|--------|---------|---------|");
            for r in results {
                println!(
                    "| {} | {} | {} | {} |",
                    r.document_id,
                    r.total_chunks,
                    r.matches.len(),
                    top_counts(&r.sector_counts, 5)
                );
            }
        }
        OutputFormat::Text => {
            for r in results {
                println!(
                    "{}: {} chunks, {} semantic matches",
                    bold(&r.document_id, use_color),
                    r.total_chunks,
                    r.matches.len()
                );
                if let Some(best) = r
                    .matches
                    .iter()
                    .max_by(|a, b| a.score.total_cmp(&b.score))
                {
                    println!("  best:    {} ({:.3})", best.sector, best.score);
                }
                if !r.sector_counts.is_empty() {
                    println!("  sectors: {}", top_counts(&r.sector_counts, 8));
                }
            }
        }
    }
    Ok(())
}

fn stats_line(stats: &ProvenanceStats) -> String {
    format!(
        "{} passages from {} matches (keyword-only {}, semantic-only {}, both {}; {} duplicates removed, overlap rate {:.1}%)",
        stats.total,
        stats.inputs,
        stats.keyword_only,
        stats.semantic_only,
        stats.both,
        stats.duplicates_removed,
        stats.overlap_rate * 100.0
    )
}

fn print_combined(results: &[CombinedResults], format: OutputFormat, use_color: bool) -> Result<()> {
    let mut totals = ProvenanceStats::default();
    for r in results {
        totals.accumulate(&r.stats);
    }
    match format {
        OutputFormat::Json => print_json(results)?,
        OutputFormat::Markdown => {
            println!("# Combined passages\n");
            println!("| Document | Passages | Keyword-only | Semantic-only | Both | Duplicates removed |");
            println!("|----------|----------|--------------|---------------|------|--------------------|");
            for r in results {
                let s = &r.stats;
                println!(
                    "| {} | {} | {} | {} | {} | {} |",
                    r.document_id, s.total, s.keyword_only, s.semantic_only, s.both, s.duplicates_removed
                );
            }
            println!(
                "| **total** | {} | {} | {} | {} | {} |",
                totals.total, totals.keyword_only, totals.semantic_only, totals.both, totals.duplicates_removed
            );
        }
        OutputFormat::Text => {
            for r in results {
                println!("{}: {}", bold(&r.document_id, use_color), stats_line(&r.stats));
            }
            if results.len() > 1 {
                println!("{}: {}", bold("total", use_color), stats_line(&totals));
            }
            println!(
                "keyword search found {:.1}% of passages, semantic search {:.1}%",
                totals.keyword_recall() * 100.0,
                totals.semantic_recall() * 100.0
            );
        }
    }
    Ok(())
}

fn print_reports(reports: &[DocumentReport], format: OutputFormat, use_color: bool) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(reports);
    }
    let keywords: Vec<KeywordResults> = reports.iter().map(|r| r.keywords.clone()).collect();
    let semantic: Vec<SemanticResults> = reports.iter().map(|r| r.semantic.clone()).collect();
    let combined: Vec<CombinedResults> = reports.iter().map(|r| r.combined.clone()).collect();
    print_keywords(&keywords, format, use_color)?;
    println!();
    print_semantic(&semantic, format, use_color)?;
    println!();
    print_combined(&combined, format, use_color)
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    let command = match cli.command {
        None => {
            print_welcome(use_color);
            return Ok(());
        }
        Some(Command::Init) => {
            let path = Path::new(".riscan.toml");
            if path.exists() {
                miette::bail!(".riscan.toml already exists");
            }
            std::fs::write(path, riscan_core::BUILTIN_CONFIG).into_diagnostic()?;
            println!("Created .riscan.toml with the built-in taxonomy");
            return Ok(());
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "riscan", &mut std::io::stdout());
            return Ok(());
        }
        Some(command) => command,
    };

    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(
        sectors = config.taxonomy.len(),
        queries = config.queries.len(),
        provider = %config.embedding.provider,
        "configuration loaded"
    );
    let pipeline = Pipeline::new(config)?;

    match command {
        Command::Keywords { ref input, ref out } => {
            let docs = load_corpus(input)?;
            let pb = progress(docs.len(), "Scanning keywords")?;
            let mut results = Vec::with_capacity(docs.len());
            for doc in &docs {
                results.push(pipeline.keywords(&doc.document)?);
                if let Some(pb) = &pb {
                    pb.inc(1);
                }
            }
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            if let Some(out) = out {
                write_json(out, &results)?;
            }
            print_keywords(&results, cli.format, use_color)?;
        }
        Command::Semantic { ref input, ref out } => {
            let docs = load_corpus(input)?;
            let remote = remote_embedding(pipeline.config())?;
            let pb = progress(docs.len(), "Ranking chunks")?;
            let mut results = Vec::with_capacity(docs.len());
            for doc in &docs {
                let result = match &remote {
                    Some((client, cache)) => {
                        pipeline
                            .semantic_remote(&doc.document, client, cache.as_ref())
                            .await
                    }
                    None => pipeline.semantic(&doc.document),
                };
                let result = result.inspect_err(|_e| {
                    if let Some(pb) = &pb {
                        pb.finish_with_message("Failed");
                    }
                })?;
                results.push(result);
                if let Some(pb) = &pb {
                    pb.inc(1);
                }
            }
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            if let Some(out) = out {
                write_json(out, &results)?;
            }
            print_semantic(&results, cli.format, use_color)?;
        }
        Command::Dedup {
            ref keywords,
            ref semantic,
            ref combined,
            ref out,
        } => {
            let results: Vec<CombinedResults> = match (keywords, semantic, combined) {
                (Some(kw), Some(sem), _) => {
                    let keyword: Vec<KeywordResults> = read_json(kw)?;
                    let semantic: Vec<SemanticResults> = read_json(sem)?;
                    pair_by_document(keyword, semantic)
                        .iter()
                        .map(|(k, s)| pipeline.combine(k, s))
                        .collect::<Result<_, _>>()?
                }
                (_, _, Some(path)) => {
                    let existing: Vec<CombinedResults> = read_json(path)?;
                    existing
                        .iter()
                        .map(|c| pipeline.recombine(c))
                        .collect::<Result<_, _>>()?
                }
                _ => miette::bail!(miette::miette!(
                    help = "run `riscan keywords --out` and `riscan semantic --out` first",
                    "provide --keywords and --semantic, or --combined"
                )),
            };
            if let Some(out) = out {
                write_json(out, &results)?;
            }
            print_combined(&results, cli.format, use_color)?;
        }
        Command::Run {
            ref input,
            ref out_dir,
        } => {
            let docs = load_corpus(input)?;
            let remote = remote_embedding(pipeline.config())?;
            let pb = progress(docs.len(), "Processing documents")?;
            let mut reports = Vec::with_capacity(docs.len());
            for doc in &docs {
                let report = match &remote {
                    Some((client, cache)) => {
                        pipeline
                            .run_remote(&doc.document, client, cache.as_ref())
                            .await
                    }
                    None => pipeline.run(&doc.document),
                };
                let report = report.inspect_err(|_e| {
                    if let Some(pb) = &pb {
                        pb.finish_with_message("Failed");
                    }
                })?;
                reports.push(report);
                if let Some(pb) = &pb {
                    pb.inc(1);
                }
            }
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            if let Some(dir) = out_dir {
                let keywords: Vec<&KeywordResults> = reports.iter().map(|r| &r.keywords).collect();
                let semantic: Vec<&SemanticResults> = reports.iter().map(|r| &r.semantic).collect();
                let combined: Vec<&CombinedResults> = reports.iter().map(|r| &r.combined).collect();
                write_json(&dir.join(KEYWORD_FILE), &keywords)?;
                write_json(&dir.join(SEMANTIC_FILE), &semantic)?;
                write_json(&dir.join(COMBINED_FILE), &combined)?;
                tracing::info!(dir = %dir.display(), "wrote stage results");
            }
            print_reports(&reports, cli.format, use_color)?;
        }
        Command::Init | Command::Completions { .. } => unreachable!(),
    }

    Ok(())
}

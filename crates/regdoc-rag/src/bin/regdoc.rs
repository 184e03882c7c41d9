//! regdoc command line: build the index, inspect retrieval, chat in the terminal
//!
//! Run with: cargo run -p regdoc-rag --bin regdoc -- <command>

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use regdoc_rag::generation::{AnswerGenerator, GenerationSettings};
use regdoc_rag::providers::{embedder_from_config, llm_from_config};
use regdoc_rag::{AskResponse, ConversationMemory, IngestPipeline, RagConfig, Retriever, VectorIndex};

#[derive(Parser, Debug)]
#[command(
    name = "regdoc",
    version,
    about = "Grounded question answering over UK regulatory documents"
)]
struct Cli {
    /// Path to a TOML config file (defaults to ./regdoc-rag.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, chunk and embed the documents into the vector index
    Ingest {
        /// Re-embed even if an index already exists
        #[arg(long, default_value_t = false)]
        force_rebuild: bool,

        /// Directory of source documents (overrides paths.data_dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Show the closest chunks for a query, with distances
    Search {
        /// Query text
        query: String,

        /// Number of results
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Interactive question answering in the terminal
    Chat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "regdoc_rag=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RagConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Ingest { force_rebuild, data_dir } => ingest(config, force_rebuild, data_dir).await,
        Command::Search { query, k } => search(config, &query, k).await,
        Command::Chat => chat(config).await,
    }
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
        bar.set_style(template);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

async fn ingest(mut config: RagConfig, force_rebuild: bool, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(dir) = data_dir {
        config.paths.data_dir = dir;
    }

    println!("{}", style("Building vector index").bold());
    println!("  documents: {}", config.data_dir().display());
    println!("  index:     {}", config.index_dir().display());

    let pipeline = IngestPipeline::from_config(config)?;
    let bar = spinner("Extracting, chunking and embedding...");
    let result = pipeline.build_index(force_rebuild).await;
    bar.finish_and_clear();

    let (_, report) = result?;

    for doc in &report.documents {
        println!(
            "  {} {} ({} pages, {} chars, {} chunks)",
            style("•").dim(),
            doc.source,
            doc.pages,
            doc.chars,
            doc.chunks
        );
    }

    if report.reused_existing {
        println!(
            "{} Existing index reused ({} records). Pass --force-rebuild to re-embed.",
            style("✓").green(),
            report.records
        );
    } else {
        println!(
            "{} Indexed {} chunks from {} documents in {:.1}s",
            style("✓").green(),
            report.records,
            report.documents.len(),
            report.processing_time_ms as f64 / 1000.0
        );
    }
    Ok(())
}

fn open_retriever(config: &RagConfig) -> anyhow::Result<Retriever> {
    let index = VectorIndex::open(&config.index_dir())?;
    let embedder = embedder_from_config(&config.embeddings)?;
    index.check_compatible(embedder.model(), embedder.dimensions())?;
    Ok(Retriever::from_config(config, Arc::new(index), embedder))
}

async fn search(mut config: RagConfig, query: &str, k: Option<usize>) -> anyhow::Result<()> {
    if let Some(k) = k {
        config.retrieval.top_k = k;
    }
    let retriever = open_retriever(&config)?;

    println!("{} {}", style("Query:").bold(), query);
    let results = retriever.retrieve_scored(query).await?;
    if results.is_empty() {
        println!("No results; the index is empty.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "\n{} {} page {} (distance {:.4}, lower = more relevant)",
            style(format!("[{}]", i + 1)).cyan(),
            result.chunk.metadata.source_label(),
            result.chunk.metadata.page_label(),
            result.distance
        );
        let preview: String = result.chunk.text.chars().take(300).collect();
        println!("{}", style(preview.trim()).dim());
    }
    Ok(())
}

fn print_sources(response: &AskResponse) {
    if response.sources.is_empty() {
        println!("No sources for the last answer.\n");
        return;
    }
    for (i, source) in response.sources.iter().enumerate() {
        println!(
            "  {} {} (page {})\n     {}",
            style(format!("[{}]", i + 1)).cyan(),
            source.source,
            source.page,
            style(&source.preview).dim()
        );
    }
    println!();
}

async fn chat(config: RagConfig) -> anyhow::Result<()> {
    let retriever = Arc::new(open_retriever(&config)?);
    println!("Loaded index with {} chunks", retriever.index().len());

    let llm = llm_from_config(&config.llm)?;
    if !llm.health_check().await {
        println!(
            "{} LLM provider at {} is not reachable; answers will fail until it is.",
            style("!").yellow(),
            config.llm.base_url
        );
    }

    let generator = AnswerGenerator::new(retriever, llm, GenerationSettings::from_config(&config));
    let mut memory = ConversationMemory::new(config.memory.max_stored_turns);
    let mut last: Option<AskResponse> = None;

    println!("\n{}", style("UK Legal Document Assistant").bold());
    println!("Type your question. 'sources' shows the last answer's sources,");
    println!("'clear' resets the conversation, 'quit' exits.\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{} ", style("you>").green().bold());
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!("\nGoodbye!");
            break;
        };
        let input = line?;
        let input = input.trim();

        match input.to_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" => {
                println!("Goodbye!");
                break;
            }
            "clear" => {
                memory.clear();
                println!("Conversation memory cleared.\n");
                continue;
            }
            "sources" => {
                match &last {
                    Some(response) => print_sources(response),
                    None => println!("Ask a question first.\n"),
                }
                continue;
            }
            _ => {}
        }

        let bar = spinner("Searching documents...");
        let result = generator.ask(input, &mut memory).await;
        bar.finish_and_clear();

        match result {
            Ok(response) => {
                println!("\n{}\n", response.answer);
                if response.num_chunks > 0 {
                    println!(
                        "{}",
                        style(format!("Based on {} document chunks. Type 'sources' to see them.", response.num_chunks)).dim()
                    );
                }
                println!();
                last = Some(response);
            }
            Err(e) => println!("{} {}\n", style("error:").red().bold(), e),
        }
    }

    Ok(())
}

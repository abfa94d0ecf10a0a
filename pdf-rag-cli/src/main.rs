mod chat;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pdf_rag::{QueryRequest, QueryResponse, RagConfig, RagPipeline};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pdf-rag", about = "Ask questions about your PDF documents", version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Collection to read and write (overrides COLLECTION_NAME)
    #[arg(long, global = true)]
    collection: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one PDF or every PDF in a directory
    Ingest(IngestArgs),

    /// Ask a single question
    Query {
        /// The question
        question: String,
        /// List the pages the answer was drawn from
        #[arg(short, long)]
        sources: bool,
        /// Search with the question only, without generated rephrasings
        #[arg(long)]
        no_multi_query: bool,
        /// Print the response as JSON
        #[arg(long)]
        output_json: bool,
    },

    /// Ask questions interactively
    Chat {
        /// Ingest the configured PDF directory first
        #[arg(long)]
        ingest: bool,
        /// Start with source listing enabled
        #[arg(short, long)]
        sources: bool,
        /// Start with multi-query retrieval disabled
        #[arg(long)]
        no_multi_query: bool,
    },
}

#[derive(Args)]
struct IngestArgs {
    /// A single PDF file
    #[arg(long, conflicts_with = "directory")]
    file: Option<PathBuf>,
    /// A directory of PDFs (defaults to PDF_DIRECTORY)
    #[arg(long)]
    directory: Option<PathBuf>,
    /// Concurrent ingestion workers
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    threads: Option<u16>,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn format_response(response: &QueryResponse) -> String {
    let mut out = format!("\nAnswer: {}\n", response.answer);
    if let Some(sources) = &response.sources {
        out.push_str("\nSources:\n");
        for (i, source) in sources.iter().enumerate() {
            out.push_str(&format!("  {}. {}, page {}\n", i + 1, source.source_path, source.page));
            out.push_str(&format!("     Preview: {}\n", source.content_snippet.replace('\n', " ")));
        }
    }
    out
}

pub(crate) fn print_response(response: &QueryResponse) {
    print!("{}", format_response(response));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json);

    let mut config = RagConfig::from_env().context("invalid configuration")?;
    if let Some(collection) = cli.collection {
        config.collection_name = collection;
    }
    if let Command::Ingest(IngestArgs { threads: Some(threads), .. }) = &cli.command {
        config.max_workers = Some(usize::from(*threads));
    }

    let pdf_directory = config.pdf_directory.clone();
    let pipeline = RagPipeline::from_config(config).await.context("failed to start pipeline")?;

    match cli.command {
        Command::Ingest(args) => {
            let response = match (args.file, args.directory) {
                (Some(file), _) => pipeline.ingest_file(&file).await?,
                (None, directory) => {
                    let directory = directory.unwrap_or(pdf_directory);
                    pipeline.ingest_directory(&directory).await?
                }
            };
            info!(chunks = response.document_chunks, success = response.success, "ingestion complete");
            println!("{}", response.message);
            if !response.success {
                anyhow::bail!("ingestion did not complete");
            }
        }
        Command::Query { question, sources, no_multi_query, output_json } => {
            let request =
                QueryRequest::new(question).with_sources(sources).with_multi_query(!no_multi_query);
            let response = pipeline.answer(request).await;
            if output_json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
        }
        Command::Chat { ingest, sources, no_multi_query } => {
            if ingest {
                let response = pipeline.ingest_directory(&pdf_directory).await?;
                println!("{}", response.message);
            }
            chat::run(&pipeline, chat::Settings { sources, multi_query: !no_multi_query }).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_rag::SourceRef;

    #[test]
    fn sources_are_listed_with_a_preview() {
        let response = QueryResponse {
            answer: "Exemplar City.".to_string(),
            sources: Some(vec![SourceRef {
                content_snippet: "The capital of Example Country\nis Exemplar City.".to_string(),
                source_path: "country.pdf".to_string(),
                page: 1,
            }]),
        };
        let text = format_response(&response);
        assert!(text.contains("1. country.pdf, page 1"));
        assert!(text.contains("Preview: The capital of Example Country is Exemplar City."));
    }

    #[test]
    fn answer_only_has_no_sources_section() {
        let response = QueryResponse { answer: "No.".to_string(), sources: None };
        assert!(!format_response(&response).contains("Sources:"));
    }
}

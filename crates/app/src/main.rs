use anyhow::Context;
use brochure_rag_core::{
    Answer, AnswerStatus, ChatSession, ChatbotService, EmbeddingBackend, IngestionReport, Settings,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::Write as _;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "brochure-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML settings file
    #[arg(long, env = "BROCHURE_RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the vector index
    #[arg(long, env = "BROCHURE_RAG_PERSIST_DIR")]
    persist_dir: Option<PathBuf>,

    /// Ollama base URL used for embeddings and generation
    #[arg(long, env = "OLLAMA_URL")]
    ollama_url: Option<String>,

    /// Embedding model name
    #[arg(long, env = "BROCHURE_RAG_EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Chat model name
    #[arg(long, env = "BROCHURE_RAG_CHAT_MODEL")]
    chat_model: Option<String>,

    /// Embedding backend: ollama or hashed
    #[arg(long, env = "BROCHURE_RAG_EMBEDDING_BACKEND")]
    embedding_backend: Option<EmbeddingBackend>,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the index from every PDF in a folder.
    Build {
        /// Folder that contains PDFs recursively.
        #[arg(long)]
        folder: PathBuf,
    },
    /// Add PDF files to the existing index.
    Upload {
        /// PDF files to add.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Answer a single question.
    Ask {
        #[arg(long)]
        question: String,
    },
    /// Interactive question loop on stdin.
    Chat,
    /// Print the collection name, state, and chunk count.
    Status,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        if let Some(dir) = &self.persist_dir {
            settings.store.persist_dir = dir.clone();
        }
        if let Some(url) = &self.ollama_url {
            settings.embedding.endpoint = url.clone();
            settings.model.endpoint = url.clone();
        }
        if let Some(model) = &self.embedding_model {
            settings.embedding.model = model.clone();
        }
        if let Some(model) = &self.chat_model {
            settings.model.model = model.clone();
        }
        if let Some(backend) = self.embedding_backend {
            settings.embedding.backend = backend;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(fmt::time::UtcTime::rfc_3339()),
        )
        .init();

    let cli = Cli::parse();
    let settings = cli.settings()?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "brochure-rag boot"
    );

    let service = ChatbotService::open(&settings)
        .await
        .context("failed to open the brochure index")?;

    let outcome = run(&cli.command, &service).await;
    service.close().await;
    outcome
}

async fn run(command: &Command, service: &ChatbotService) -> anyhow::Result<()> {
    match command {
        Command::Build { folder } => {
            let report = service.build_from_folder(folder).await?;
            print_report(&report);
            if report.files_processed == 0 {
                println!("no documents found in {}", folder.display());
            }
        }
        Command::Upload { files } => {
            let report = service.upload_paths(files).await?;
            print_report(&report);
        }
        Command::Ask { question } => {
            let answer = service.ask(question, &[]).await?;
            print_answer(&answer);
        }
        Command::Chat => chat(service).await?,
        Command::Status => {
            let status = service.status().await?;
            println!("collection={}", status.collection);
            println!("state={:?}", status.state);
            println!("chunks={}", status.chunks);
        }
    }

    Ok(())
}

async fn chat(service: &ChatbotService) -> anyhow::Result<()> {
    let mut session = ChatSession::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!(session = %session.id(), "chat session started");
    println!("Ask a question about the uploaded brochures (\"exit\" to quit).");

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        let answer = session.ask(service, question).await;
        print_answer(&answer);
    }

    info!(
        session = %session.id(),
        turns = session.history().len(),
        "chat session ended"
    );
    Ok(())
}

fn print_report(report: &IngestionReport) {
    for skipped in &report.skipped_files {
        warn!(file = %skipped.name, reason = %skipped.reason, "skipped pdf");
    }
    println!(
        "{} file(s), {} chunk(s) added, {} duplicate(s) skipped, {} file(s) failed at {}",
        report.files_processed,
        report.chunks_added,
        report.duplicates_skipped,
        report.skipped_files.len(),
        Utc::now().to_rfc3339()
    );
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    if answer.status == AnswerStatus::Answered && !answer.sources.is_empty() {
        println!("\nSources: {}", answer.sources.join(", "));
    }
}

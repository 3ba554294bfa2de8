use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use ragstream::{logging, ConversationTurn, PipelineArgs, ReframedEvent};

#[derive(Parser, Debug)]
#[command(
    name = "ragstream-cli",
    about = "Ask one question against the vector store and stream the grounded answer"
)]
struct ChatCli {
    /// Question to answer
    #[arg(long)]
    question: String,

    /// JSON file holding earlier turns (`[{"role":"user","content":"..."}]`)
    #[arg(long)]
    history: Option<PathBuf>,

    /// Only print the retrieved context and prompt (skip generation)
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = ChatCli::parse();
    if cli.question.trim().is_empty() {
        bail!("--question must not be empty");
    }
    let mut turns = match &cli.history {
        Some(path) => load_history(path).await?,
        None => Vec::new(),
    };
    turns.push(ConversationTurn::user(cli.question.clone()));

    let pipeline = cli.pipeline.build_pipeline().await?;
    if cli.dry_run {
        let prepared = pipeline.prepare(&turns).await?;
        println!("--- Retrieved Context ({}) ---", prepared.fragments.len());
        for (rank, fragment) in prepared.fragments.iter().enumerate() {
            println!("[{}] {}\n{}\n---", rank + 1, fragment.id, fragment.text.trim());
        }
        println!("\n--- Prompt ---\n{}", prepared.prompt);
        println!("dry-run enabled; skipping generation.");
        return Ok(());
    }

    let mut events = pipeline.run(&turns).await?;
    let mut stdout = std::io::stdout().lock();
    while let Some(event) = events.next().await {
        match event {
            ReframedEvent::Delta(event) => {
                stdout.write_all(event.content.as_bytes())?;
                stdout.flush()?;
            }
            ReframedEvent::Done => writeln!(stdout)?,
        }
    }
    Ok(())
}

async fn load_history(path: &Path) -> Result<Vec<ConversationTurn>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read history {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid history file {}", path.display()))
}

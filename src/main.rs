use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use wordrefine::{dictionary, Clock, Document, ManualClock, Session, SessionConfig, TokioClock, Trie};

#[derive(Parser, Debug)]
#[command(name = "wordrefine")]
#[command(about = "Flags foreign words in a text and suggests native replacements")]
#[command(version)]
struct Args {
    /// Dictionary file: JSON array of {word, replacement} or word<TAB>replacement lines
    dictionary: PathBuf,

    /// Text to check, one paragraph per line
    input: PathBuf,

    /// Session options as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fixed jitter seed for reproducible delivery order
    #[arg(long)]
    seed: Option<u64>,

    /// Wait out real delays instead of simulating them
    #[arg(long)]
    realtime: bool,

    /// Accept every suggestion and print the rewritten text
    #[arg(long)]
    apply: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // WHY: structured JSON logging keeps stdout free for marker output
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();
    info!(?args, "Parsed CLI arguments");

    if !args.input.is_file() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }

    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path).await?,
        None => SessionConfig::default(),
    };
    if args.seed.is_some() {
        config.jitter_seed = args.seed;
    }

    let trie: Trie = dictionary::load(&args.dictionary).await?.into_iter().collect();
    let text = tokio::fs::read_to_string(&args.input).await?;
    let mut doc = Document::from_paragraphs(text.lines())?;
    let mut session = Session::attach(&doc, config, trie)?;

    if args.realtime {
        run(&mut session, &mut doc, &TokioClock::new()).await;
    } else {
        run(&mut session, &mut doc, &ManualClock::new()).await;
    }

    for marker in session.markers(&doc) {
        println!("{}", serde_json::to_string(&marker)?);
    }

    if args.apply {
        for marker in session.markers(&doc) {
            session.confirm_replacement(&mut doc, marker.key)?;
        }
        for block in doc.blocks() {
            println!("{}", doc.text_content(block));
        }
    }

    session.shutdown();
    Ok(())
}

async fn run<C: Clock>(session: &mut Session, doc: &mut Document, clock: &C) {
    // WHY: loaded text counts as typed; finished sentences go now, the rest after the idle timeout
    session.scan(doc, clock.now());
    session.on_document_change(doc, clock.now());
    let report = session.run_until_quiescent(doc, clock).await;
    info!(
        marked = report.marked(),
        dropped = report.outcomes.len() - report.marked(),
        elapsed_ms = clock.now().as_millis() as u64,
        "Processing complete"
    );
}

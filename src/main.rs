use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use subjectlog::config::{self, Config};
use subjectlog::logging;
use subjectlog::LoggerBuilder;

/// Subject used when none is given on the command line
const DEFAULT_SUBJECT: &str = "stdin";

#[tokio::main]
async fn main() -> Result<()> {
    // Engine failures are reported here
    logging::init_console_logging("subjectlog=info")?;

    let config = Config::load(&config::config_file_path())?;
    let subject = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

    // Same validation as library users get; `level` gates the Logger methods
    // only, so raw subject writes below are never filtered by it
    let logger = LoggerBuilder::from_config(&config)
        .context("Invalid configuration")?
        .initialize()
        .context("Failed to start log sink")?;
    let sink = logger.sink().clone();
    let root = sink.root().to_path_buf();

    tracing::info!("Logging subject {} under {}", subject, root.display());

    // Each stdin line is one JSON-encoded record
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut count = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        sink.log_subject(&subject, line, None);
        count += 1;
    }

    sink.shutdown();
    tracing::info!("Submitted {} records to {}", count, sink.file_path(&subject).display());

    Ok(())
}

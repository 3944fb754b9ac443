//! Front-end client example
//!
//! Tokenizes a prompt, sends it to a running `serve` example and prints the
//! reply as it streams in.
//!
//! # Usage
//!
//! ```text
//! cargo run --example prompt -- -t /path/to/tokenizer "Once upon a time"
//! cargo run --example prompt -- -t /path/to/tokenizer -s 10.0.0.5:12345 --pad "Hi"
//! ```

use std::io::{self, Write};
use std::net::SocketAddr;

use clap::Parser;

use splitlm::Result;
use splitlm_examples::{init_logging, load_tokenizer};
use splitlm_serve::{Client, ClientConfig, GenerationOverrides};

/// Send a prompt to a split inference server
#[derive(Parser)]
#[command(name = "prompt")]
struct Cli {
    /// Directory with vocab.json and merges.txt
    #[arg(short, long, env = "SPLITLM_TOKENIZER")]
    tokenizer: String,

    /// Prompt text
    #[arg(default_value = "Hello")]
    prompt: String,

    /// Server address
    #[arg(short, long, env = "SPLITLM_SERVER")]
    server: Option<SocketAddr>,

    /// JSON client config; flags override it
    #[arg(short, long)]
    config: Option<String>,

    /// Pad or truncate to the tokenizer's model_max_length
    #[arg(long)]
    pad: bool,

    /// Pad or truncate to this many tokens
    #[arg(long, conflicts_with = "pad")]
    sequence_length: Option<usize>,

    /// Ask for at most this many new tokens
    #[arg(short = 'n', long)]
    max_new_tokens: Option<usize>,

    /// Connection timeout in milliseconds
    #[arg(long)]
    connect_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    if let Some(server) = cli.server {
        config.server = server;
    }
    if cli.connect_timeout_ms.is_some() {
        config.connect_timeout_ms = cli.connect_timeout_ms;
    }

    let tokenizer = load_tokenizer(&cli.tokenizer)?;
    if cli.pad {
        config.sequence_length = Some(tokenizer.model_max_length());
    } else if cli.sequence_length.is_some() {
        config.sequence_length = cli.sequence_length;
    }

    let client = Client::new(tokenizer, config);
    let overrides = cli.max_new_tokens.map(|n| GenerationOverrides {
        max_new_tokens: Some(n),
        ..GenerationOverrides::default()
    });
    let request = client.prepare(&cli.prompt, overrides)?;
    log::info!(
        "Sending {} tokens to {}",
        request.input_ids.len(),
        client.config().server
    );

    let mut reader = client.send(&request).await?;
    let mut stdout = io::stdout();
    let mut fragments = 0usize;
    while let Some(fragment) = reader.next_fragment().await? {
        print!("{fragment}");
        stdout.flush()?;
        fragments += 1;
    }
    println!();
    log::info!("Received {fragments} fragments");
    Ok(())
}

//! Back-end server example
//!
//! Accepts one request per connection and streams the generated text back.
//! The bundled back end is the loopback echo model, so the reply is the
//! client's own prompt decoded token by token.
//!
//! # Usage
//!
//! ```text
//! cargo run --example serve -- -t /path/to/tokenizer
//! cargo run --example serve -- -t /path/to/tokenizer --config server.json --port 9000
//! ```

use std::sync::Arc;

use clap::Parser;

use splitlm::Result;
use splitlm_examples::{init_logging, load_tokenizer};
use splitlm_runtime::{DecodingGenerator, EchoModel};
use splitlm_serve::{LogObserver, Server, ServerConfig, StatusEvent};

/// Serve split inference over TCP
#[derive(Parser)]
#[command(name = "serve")]
struct Cli {
    /// Directory with vocab.json and merges.txt
    #[arg(short, long, env = "SPLITLM_TOKENIZER")]
    tokenizer: String,

    /// JSON server config; flags below override it
    #[arg(short, long, env = "SPLITLM_SERVER_CONFIG")]
    config: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum new tokens per request
    #[arg(short = 'n', long)]
    max_new_tokens: Option<usize>,

    /// Keep special tokens in the output
    #[arg(long)]
    keep_special_tokens: bool,
}

/// Local display: the status line and each generated fragment.
fn print_display(event: &StatusEvent) {
    match event {
        StatusEvent::Fragment { .. } => println!("{event}"),
        StatusEvent::Connected { peer } => println!("Server Status: Connected to {peer}"),
        StatusEvent::Failed { message, .. } => println!("Server Status: Error - {message}"),
        StatusEvent::Idle => println!("Server Status: Idle"),
        StatusEvent::Listening { .. } | StatusEvent::Finished { .. } => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = cli.port {
        config.bind.set_port(port);
    }
    if let Some(n) = cli.max_new_tokens {
        config.generation.max_new_tokens = n;
    }

    let tokenizer = Arc::new(load_tokenizer(&cli.tokenizer)?);
    let generator =
        DecodingGenerator::new(EchoModel, tokenizer).skip_special_tokens(!cli.keep_special_tokens);

    Server::builder(generator)
        .config(config)
        .observer(LogObserver)
        .observer(print_display)
        .build()
        .run()
        .await
}

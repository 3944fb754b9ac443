//! Tokenizer inspection
//!
//! Shows how a text is split, merged and padded by the byte-level tokenizer.
//!
//! # Usage
//!
//! ```text
//! cargo run --example tokenize -- -t /path/to/tokenizer "Hello world"
//! cargo run --example tokenize -- -t /path/to/tokenizer --max-length 16 "Hi"
//! ```

use clap::Parser;

use splitlm::{Padding, Result, Tokenizer};
use splitlm_examples::{init_logging, load_tokenizer};

/// Encode text and print ids, tokens and the attention mask
#[derive(Parser)]
#[command(name = "tokenize")]
struct Cli {
    /// Directory with vocab.json and merges.txt
    #[arg(short, long, env = "SPLITLM_TOKENIZER")]
    tokenizer: String,

    /// Text to encode
    text: String,

    /// Pad or truncate to this many tokens
    #[arg(short, long)]
    max_length: Option<usize>,

    /// Drop special tokens when decoding
    #[arg(long)]
    skip_special_tokens: bool,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let tokenizer = load_tokenizer(&cli.tokenizer)?;

    let padding = cli.max_length.map_or(Padding::None, Padding::MaxLength);
    let encoded = tokenizer.tokenize(&cli.text, padding)?;

    println!("{:>6}  {:>4}  token", "id", "mask");
    for (&id, &mask) in encoded.input_ids.iter().zip(&encoded.attention_mask) {
        let token = tokenizer.vocab().token(id).unwrap_or("?");
        println!("{id:>6}  {mask:>4}  {token:?}");
    }

    let attended: Vec<u32> = encoded.attended_ids().collect();
    let decoded = tokenizer.decode_with(&attended, cli.skip_special_tokens)?;
    println!();
    println!("{} tokens, {} attended", encoded.len(), attended.len());
    println!("decoded: {decoded:?}");
    if decoded != cli.text {
        println!("(differs from input)");
    }

    let pieces: Vec<String> = attended
        .iter()
        .map(|&id| Tokenizer::decode_token(&tokenizer, id))
        .collect::<Result<_>>()?;
    println!("pieces: {pieces:?}");
    Ok(())
}

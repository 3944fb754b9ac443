//! Shared setup for the splitlm example programs.

use std::path::Path;

use splitlm::{BpeTokenizer, Result};

/// Log to stderr at `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Load tokenizer assets from `dir`, logging what was found.
///
/// # Errors
/// Returns [`splitlm::Error::Load`] if the assets are missing or malformed.
pub fn load_tokenizer(dir: impl AsRef<Path>) -> Result<BpeTokenizer> {
    let dir = dir.as_ref();
    let tokenizer = BpeTokenizer::from_pretrained(dir)?;
    log::info!(
        "Tokenizer from {}: {} tokens, eos {}, model_max_length {}",
        dir.display(),
        tokenizer.vocab_size(),
        tokenizer.eos_token_id(),
        tokenizer.model_max_length()
    );
    Ok(tokenizer)
}

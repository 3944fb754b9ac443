//! Deterministic loopback model

use splitlm::{GenerationConfig, GenerationInput, Result, TokenModel, TokenStream};

/// A [`TokenModel`] that replays the attended prompt ids.
///
/// Padding positions (mask = 0) are skipped and at most
/// `config.max_new_tokens` ids are produced. Useful for smoke-testing the
/// whole pipeline without a network.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoModel;

impl TokenModel for EchoModel {
    fn generate_tokens(
        &self,
        input: GenerationInput,
        config: &GenerationConfig,
    ) -> Result<TokenStream> {
        let ids: Vec<u32> = input
            .attended_ids()
            .take(config.max_new_tokens)
            .collect();
        log::debug!("Echoing {} of {} prompt tokens", ids.len(), input.input_ids.len());
        Ok(Box::new(ids.into_iter().map(Ok)))
    }
}

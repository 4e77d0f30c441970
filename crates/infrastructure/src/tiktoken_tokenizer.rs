use searchlight_application::Tokenizer;
use searchlight_core::{AppError, AppResult};
use tiktoken_rs::CoreBPE;

/// Token counting with the cl100k_base encoding used by the OpenAI
/// embedding models.
pub struct TiktokenTokenizer {
    encoder: CoreBPE,
}

impl TiktokenTokenizer {
    /// Loads the cl100k_base encoder.
    pub fn cl100k() -> AppResult<Self> {
        let encoder = tiktoken_rs::cl100k_base().map_err(|error| {
            AppError::Internal(format!("failed to load cl100k_base encoding: {error}"))
        })?;
        Ok(Self { encoder })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count_tokens(&self, text: &str) -> AppResult<usize> {
        Ok(self.encoder.encode_with_special_tokens(text).len())
    }
}

#[cfg(test)]
mod tests {
    use searchlight_application::Tokenizer;

    use super::TiktokenTokenizer;

    #[test]
    fn counts_are_positive_for_nonempty_text() {
        let Ok(tokenizer) = TiktokenTokenizer::cl100k() else {
            panic!("encoder failed to load");
        };

        let count = tokenizer.count_tokens("subscription.note: fast pancakes");
        assert!(count.is_ok_and(|count| count > 0));
    }
}

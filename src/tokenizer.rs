use std::path::Path;

use tokenizers::Tokenizer;
use tracing::info;

use crate::error::{InferenceError, Result};

/// Token strings that end an assistant turn across the Llama 3 family and older vocabularies.
const STOP_TOKENS: [&str; 4] = ["<|eot_id|>", "<|end_of_text|>", "</s>", "<eos>"];

/// Result of encoding a prompt under an input budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPrompt {
    pub ids: Vec<u32>,
    /// Token count before truncation.
    pub original_len: usize,
}

impl EncodedPrompt {
    pub fn truncated(&self) -> bool {
        self.original_len > self.ids.len()
    }
}

pub struct TokenizerWrapper {
    tokenizer: Tokenizer,
}

impl TokenizerWrapper {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading tokenizer from {:?}", path);
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        info!("Tokenizer loaded with {} tokens", tokenizer.get_vocab_size(true));
        Ok(Self { tokenizer })
    }

    #[cfg(test)]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let tokenizer = Tokenizer::from_bytes(bytes)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;
        Ok(Self { tokenizer })
    }

    /// Encodes an already templated prompt, keeping at most `max_len` tokens from the start.
    ///
    /// Special tokens are not added: the chat template already begins with the BOS marker.
    pub fn encode_truncated(&self, text: &str, max_len: usize) -> Result<EncodedPrompt> {
        let mut ids = self.encode(text)?;
        let original_len = ids.len();
        ids.truncate(max_len);
        Ok(EncodedPrompt { ids, original_len })
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        Ok(encoding.get_ids().to_vec())
    }

    /// Decodes ids with special tokens skipped.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    pub fn stop_token_ids(&self) -> Vec<u32> {
        STOP_TOKENS
            .iter()
            .filter_map(|token| self.tokenizer.token_to_id(token))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{test_tokenizer, EOT, HELLO, WORLD};

    #[test]
    fn encodes_without_adding_special_tokens() {
        let tokenizer = test_tokenizer();
        assert_eq!(tokenizer.encode("hello world").unwrap(), vec![HELLO, WORLD]);
    }

    #[test]
    fn long_input_keeps_the_head() {
        let tokenizer = test_tokenizer();
        let text = "hello world ".repeat(10);

        let encoded = tokenizer.encode_truncated(&text, 5).unwrap();
        assert_eq!(encoded.ids, vec![HELLO, WORLD, HELLO, WORLD, HELLO]);
        assert_eq!(encoded.original_len, 20);
        assert!(encoded.truncated());

        let encoded = tokenizer.encode_truncated("hello", 5).unwrap();
        assert!(!encoded.truncated());
    }

    #[test]
    fn decode_skips_special_tokens() {
        let tokenizer = test_tokenizer();
        assert_eq!(tokenizer.decode(&[HELLO, EOT, WORLD]).unwrap(), "hello world");
    }

    #[test]
    fn stop_tokens_are_looked_up_by_name() {
        let tokenizer = test_tokenizer();
        let stops = tokenizer.stop_token_ids();
        assert!(stops.contains(&EOT));
        assert_eq!(stops.len(), 2);
    }
}

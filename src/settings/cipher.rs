//! Secret cipher used in standalone mode
//!
//! The real encryption service belongs to the host platform and is reached
//! through [`SecretCipher`]. This implementation only tags values so that
//! code paths which forget to decrypt are caught early.

use crate::domain::ports::SecretCipher;
use crate::error::{Error, Result};

/// Tag prepended to "encrypted" values
const PLAINTEXT_TAG: &str = "plain:";

/// Development cipher that stores secrets unencrypted behind a tag
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCipher;

impl SecretCipher for PlaintextCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        Ok(format!("{}{}", PLAINTEXT_TAG, plaintext))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        ciphertext
            .strip_prefix(PLAINTEXT_TAG)
            .map(str::to_string)
            .ok_or_else(|| Error::Cipher("value was not produced by this cipher".into()))
    }
}

use std::fmt::Display;

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::OtpError;

/// Recommended shared-secret length in bytes. 160 bits matches the
/// HMAC-SHA1 digest width and is the length most enrollment flows emit.
pub const RECOMMENDED_SECRET_BYTES: usize = 20;

/// Shared key material, held as raw bytes.
///
/// The canonical interchange form is unpadded uppercase RFC4648 base32
/// (`A-Z`, `2-7`); [`Secret::encoded`] and [`Secret::from_encoded`]
/// round-trip between the two representations. Storage of the secret is
/// the caller's concern, this type only carries it between the generator,
/// the code computation and the provisioning URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    bytes: Vec<u8>,
}

impl Secret {
    /// Draws a fresh [`RECOMMENDED_SECRET_BYTES`]-byte secret from the
    /// operating system's entropy source.
    ///
    /// Fails with [`OtpError::EntropySource`] when the source is
    /// unavailable; there is no fallback to a weaker generator.
    pub fn generate() -> Result<Self, OtpError> {
        Self::generate_with(&mut OsRng)
    }

    /// Draws a fresh secret from a caller-supplied generator.
    ///
    /// The `CryptoRng` bound restricts callers to cryptographically secure
    /// sources; seedable ones (e.g. `rand::rngs::StdRng`) make secret
    /// generation deterministic for tests.
    pub fn generate_with<R>(rng: &mut R) -> Result<Self, OtpError>
    where
        R: RngCore + CryptoRng,
    {
        let mut bytes = vec![0u8; RECOMMENDED_SECRET_BYTES];
        rng.try_fill_bytes(&mut bytes)
            .map_err(OtpError::EntropySource)?;

        Ok(Self { bytes })
    }

    /// Wraps existing key material as-is.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Decodes a secret from its base32 text form, accepting the sloppy
    /// variants [`decode_secret`] normalizes.
    pub fn from_encoded(text: &str) -> Result<Self, OtpError> {
        Ok(Self {
            bytes: decode_secret(text)?,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Canonical text form: uppercase, unpadded base32.
    pub fn encoded(&self) -> String {
        encode_secret(&self.bytes)
    }
}

impl Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encoded())
    }
}

/// Encodes raw key bytes into unpadded uppercase RFC4648 base32.
pub fn encode_secret(bytes: &[u8]) -> String {
    data_encoding::BASE32_NOPAD.encode(bytes)
}

/// Decodes a secret (given as an RFC4648 base32-encoded ASCII string)
/// into a byte string.
///
/// Input is normalized before decoding: whitespace is stripped, letters
/// are uppercased and `=` padding is dropped, so a secret copy-pasted
/// with stray spaces or retained padding decodes to the same bytes as its
/// canonical form. Any character left outside `A-Z2-7` fails with
/// [`OtpError::InvalidSecretFormat`].
pub fn decode_secret(secret: &str) -> Result<Vec<u8>, OtpError> {
    let normalized = normalize_secret(secret);

    data_encoding::BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(OtpError::InvalidSecretFormat)
}

fn normalize_secret(secret: &str) -> String {
    secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

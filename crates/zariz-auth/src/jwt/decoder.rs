//! Signature-less credential decoding.
//!
//! Signature trust is the issuer's job; the client only needs the claims to
//! schedule renewal and apply its role policy.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::error::DecodeError;

use super::claims::{Claims, Credential};

/// base64url that accepts the payload with or without `=` padding.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes compact `header.payload.signature` credentials into [`Claims`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimsCodec;

impl ClaimsCodec {
    /// Decode the claims of `token` without verifying its signature.
    pub fn decode(token: &str) -> Result<Claims, DecodeError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(DecodeError::Malformed);
        }

        let payload = PAYLOAD_ENGINE
            .decode(segments[1])
            .map_err(|e| DecodeError::InvalidPayload(format!("base64: {e}")))?;

        serde_json::from_slice::<Claims>(&payload)
            .map_err(|e| DecodeError::InvalidPayload(e.to_string()))
    }

    /// Decode `token` into a [`Credential`].
    pub fn credential(token: &str) -> Result<Credential, DecodeError> {
        let claims = Self::decode(token)?;
        Ok(Credential::new(token.to_string(), claims))
    }
}

/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use constant_time_eq::constant_time_eq;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;

use super::CodecError;

/// HMAC-SHA256 tag over exact payload bytes, carried hex-encoded in the
/// `HashSHA256` header. Tags are only comparable for identical bytes, so
/// each wire format is tagged over the bytes actually sent.
pub struct TagSigner {
    key: PKey<Private>,
}

impl TagSigner {
    pub fn new(key: &[u8]) -> Result<Self, CodecError> {
        Ok(TagSigner {
            key: PKey::hmac(key)?,
        })
    }

    pub fn tag(&self, data: &[u8]) -> Result<String, CodecError> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)?;
        signer.update(data)?;
        Ok(hex::encode(signer.sign_to_vec()?))
    }

    pub fn verify(&self, data: &[u8], tag_hex: &str) -> Result<bool, CodecError> {
        let computed = self.tag(data)?;
        Ok(constant_time_eq(
            computed.as_bytes(),
            tag_hex.as_bytes(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_bytes_same_tag() {
        let signer = TagSigner::new(b"secret").unwrap();
        let a = signer.tag(b"payload").unwrap();
        let b = signer.tag(b"payload").unwrap();
        assert_eq!(a, b);
        assert!(signer.verify(b"payload", &a).unwrap());
    }

    #[test]
    fn different_key_different_tag() {
        let a = TagSigner::new(b"secret-a").unwrap().tag(b"payload").unwrap();
        let b = TagSigner::new(b"secret-b").unwrap().tag(b"payload").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let signer = TagSigner::new(b"secret").unwrap();
        let tag = signer.tag(b"payload").unwrap();
        assert!(!signer.verify(b"payload2", &tag).unwrap());
    }
}

/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! Hybrid sealed envelope: the payload is encrypted under a fresh
//! AES-256-GCM session key, the session key is wrapped with the
//! recipient's RSA public key, and the three components travel as
//! `b64(wrapped key) | b64(nonce) | b64(ciphertext || tag)`.

use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use openssl::pkey::PKey;
use openssl::rand::rand_bytes;
use openssl::rsa::{Padding, Rsa};
use openssl::symm::{Cipher, decrypt_aead, encrypt_aead};

use super::CodecError;

const SESSION_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const PART_DELIMITER: u8 = b'|';

pub struct Sealer {
    rsa: Rsa<openssl::pkey::Public>,
}

impl Sealer {
    pub fn from_public_pem(pem: &[u8]) -> Result<Self, CodecError> {
        let pkey = PKey::public_key_from_pem(pem)?;
        Ok(Sealer { rsa: pkey.rsa()? })
    }

    pub fn from_pem_file<P: AsRef<Path>>(path: P) -> Result<Self, CodecError> {
        Sealer::from_public_pem(&fs::read(path)?)
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut session_key = [0u8; SESSION_KEY_LEN];
        rand_bytes(&mut session_key)?;
        let mut nonce = [0u8; NONCE_LEN];
        rand_bytes(&mut nonce)?;

        let mut tag = [0u8; TAG_LEN];
        let mut sealed = encrypt_aead(
            Cipher::aes_256_gcm(),
            &session_key,
            Some(&nonce),
            &[],
            plaintext,
            &mut tag,
        )?;
        sealed.extend_from_slice(&tag);

        let mut wrapped = vec![0u8; self.rsa.size() as usize];
        let n = self.rsa.public_encrypt(&session_key, &mut wrapped, Padding::PKCS1)?;
        wrapped.truncate(n);

        let mut payload = Vec::with_capacity(wrapped.len() * 2 + sealed.len() * 2);
        payload.extend_from_slice(B64.encode(&wrapped).as_bytes());
        payload.push(PART_DELIMITER);
        payload.extend_from_slice(B64.encode(nonce).as_bytes());
        payload.push(PART_DELIMITER);
        payload.extend_from_slice(B64.encode(&sealed).as_bytes());
        Ok(payload)
    }
}

pub struct Opener {
    rsa: Rsa<openssl::pkey::Private>,
}

impl Opener {
    pub fn from_private_pem(pem: &[u8]) -> Result<Self, CodecError> {
        let pkey = PKey::private_key_from_pem(pem)?;
        Ok(Opener { rsa: pkey.rsa()? })
    }

    pub fn from_pem_file<P: AsRef<Path>>(path: P) -> Result<Self, CodecError> {
        Opener::from_private_pem(&fs::read(path)?)
    }

    pub fn open_hybrid(&self, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut parts = payload.splitn(3, |b| *b == PART_DELIMITER);
        let wrapped_part = parts.next().ok_or(CodecError::Envelope("missing key part"))?;
        let nonce_part = parts
            .next()
            .ok_or(CodecError::Envelope("missing nonce part"))?;
        let sealed_part = parts
            .next()
            .ok_or(CodecError::Envelope("missing ciphertext part"))?;

        let wrapped = B64.decode(wrapped_part)?;
        let nonce = B64.decode(nonce_part)?;
        let sealed = B64.decode(sealed_part)?;
        if nonce.len() != NONCE_LEN {
            return Err(CodecError::Envelope("unexpected nonce length"));
        }
        if sealed.len() < TAG_LEN {
            return Err(CodecError::Envelope("ciphertext shorter than its tag"));
        }

        let mut key_buf = vec![0u8; self.rsa.size() as usize];
        let n = self
            .rsa
            .private_decrypt(&wrapped, &mut key_buf, Padding::PKCS1)?;
        if n != SESSION_KEY_LEN {
            return Err(CodecError::Envelope("unexpected session key length"));
        }

        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        Ok(decrypt_aead(
            Cipher::aes_256_gcm(),
            &key_buf[..n],
            Some(&nonce),
            &[],
            ciphertext,
            tag,
        )?)
    }

    /// Plain single-block RSA body, the `X-Encrypted: rsa` form.
    pub fn open_rsa(&self, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        if payload.is_empty() {
            return Err(CodecError::Envelope("empty payload"));
        }
        let mut buf = vec![0u8; self.rsa.size() as usize];
        let n = self.rsa.private_decrypt(payload, &mut buf, Padding::PKCS1)?;
        buf.truncate(n);
        Ok(buf)
    }
}

use crate::error::{Error, Result};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// Encrypts `plaintext` with `key`, binding `aad`.
/// Returns `nonce (12 bytes) || ciphertext`.
///
/// # Errors
/// Returns `EncryptionFailed` if the AEAD rejects the input.
#[allow(deprecated)]
pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| Error::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);

    Ok(sealed)
}

/// Decrypts `nonce || ciphertext` produced by [`seal`].
///
/// # Errors
/// Returns `DecryptionFailed` if the input is too short, was tampered with, or
/// was sealed under a different key or AAD.
#[allow(deprecated)]
pub fn open(key: &[u8; KEY_LEN], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(Error::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| Error::DecryptionFailed)
}

/// AAD for enveloped payloads: "carekey-payload:v1|key_id".
pub(crate) fn envelope_aad(key_id: &str) -> Vec<u8> {
    format!("carekey-payload:v1|{key_id}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn seal_open_roundtrip() {
        let key = [42u8; KEY_LEN];
        let sealed = seal(&key, b"advance directive", b"aad").unwrap();
        assert!(sealed.len() > NONCE_LEN + b"advance directive".len());

        let opened = open(&key, &sealed, b"aad").unwrap();
        assert_eq!(opened, b"advance directive");
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn open_fails_wrong_aad() {
        let key = [42u8; KEY_LEN];
        let sealed = seal(&key, b"secret", &envelope_aad("v1")).unwrap();
        assert!(matches!(
            open(&key, &sealed, &envelope_aad("v2")),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn open_fails_tampered_ciphertext() {
        let key = [7u8; KEY_LEN];
        let mut sealed = seal(&key, b"secret", b"").unwrap();

        let len = sealed.len();
        if let Some(byte) = sealed.get_mut(len - 1) {
            *byte ^= 0xFF;
        }

        assert!(open(&key, &sealed, b"").is_err());
    }

    #[test]
    fn open_rejects_short_input() {
        assert!(matches!(
            open(&[0u8; KEY_LEN], &[1, 2, 3], b""),
            Err(Error::DecryptionFailed)
        ));
    }
}

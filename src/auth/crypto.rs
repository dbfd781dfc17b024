//! Decryption of the delegated-login token payload
//!
//! The intermediary returns `hex(iv):hex(ciphertext)` sealed with
//! AES-256-CBC under the per-login key it handed out at initiation.
//! Padding is stripped by hand so that payloads which were never padded
//! still come through.

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};

use crate::error::AuthError;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

const KEY_SIZE: usize = 32;
const BLOCK_SIZE: usize = 16;

/// Outcome of PKCS#7 unpadding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unpadded<'a> {
    /// Padding was well formed and has been removed
    Valid(&'a [u8]),
    /// Padding was not well formed; the input is returned untouched
    Invalid(&'a [u8]),
}

impl<'a> Unpadded<'a> {
    pub fn bytes(self) -> &'a [u8] {
        match self {
            Unpadded::Valid(bytes) | Unpadded::Invalid(bytes) => bytes,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Unpadded::Valid(_))
    }
}

/// Strip PKCS#7 padding: last byte in `1..=16` and every pad byte equal to it
pub fn strip_pkcs7(data: &[u8]) -> Unpadded<'_> {
    let Some(&pad) = data.last() else {
        return Unpadded::Invalid(data);
    };
    let pad_len = pad as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE || pad_len > data.len() {
        return Unpadded::Invalid(data);
    }

    let (body, padding) = data.split_at(data.len() - pad_len);
    if padding.iter().all(|&b| b == pad) {
        Unpadded::Valid(body)
    } else {
        Unpadded::Invalid(data)
    }
}

/// Interpret the login encryption key: 64 hex digits, or 32 raw bytes
fn login_key(encryption_key: &str) -> Result<[u8; KEY_SIZE], AuthError> {
    if let Ok(bytes) = hex::decode(encryption_key) {
        if let Ok(key) = <[u8; KEY_SIZE]>::try_from(bytes.as_slice()) {
            return Ok(key);
        }
    }
    <[u8; KEY_SIZE]>::try_from(encryption_key.as_bytes()).map_err(|_| {
        AuthError::Payload(format!(
            "encryption key must be {KEY_SIZE} bytes, got {} characters",
            encryption_key.len()
        ))
    })
}

/// Decrypt `hex(iv):hex(ciphertext)` into the UTF-8 plaintext
pub fn decrypt_token_info(sealed: &str, encryption_key: &str) -> Result<String, AuthError> {
    let (iv_hex, ciphertext_hex) = sealed
        .trim()
        .split_once(':')
        .ok_or_else(|| AuthError::Payload("expected 'iv:ciphertext'".to_string()))?;

    let iv = hex::decode(iv_hex)
        .map_err(|e| AuthError::Payload(format!("IV is not valid hex: {e}")))?;
    let mut buffer = hex::decode(ciphertext_hex)
        .map_err(|e| AuthError::Payload(format!("ciphertext is not valid hex: {e}")))?;
    let key = login_key(encryption_key)?;

    let decryptor = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|_| AuthError::Payload(format!("IV must be {BLOCK_SIZE} bytes")))?;
    let decrypted = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| {
            AuthError::Payload("ciphertext is not a whole number of blocks".to_string())
        })?;

    let unpadded = strip_pkcs7(decrypted);
    if !unpadded.is_valid() {
        log::debug!("Login payload had no valid PKCS#7 padding, using it as-is");
    }

    String::from_utf8(unpadded.bytes().to_vec())
        .map_err(|e| AuthError::Payload(format!("plaintext is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc::cipher::{BlockEncryptMut, block_padding::Pkcs7};

    type Aes256CbcEnc = cbc::Encryptor<Aes256>;

    const KEY: [u8; 32] = [0x42; 32];
    const IV: [u8; 16] = [0x24; 16];

    fn seal(plaintext: &[u8]) -> String {
        let mut buffer = vec![0u8; plaintext.len() + BLOCK_SIZE];
        buffer[..plaintext.len()].copy_from_slice(plaintext);
        let ciphertext = Aes256CbcEnc::new_from_slices(&KEY, &IV)
            .unwrap()
            .encrypt_padded_mut::<Pkcs7>(&mut buffer, plaintext.len())
            .unwrap();
        format!("{}:{}", hex::encode(IV), hex::encode(ciphertext))
    }

    #[test]
    fn test_strip_valid_padding() {
        assert_eq!(strip_pkcs7(b"abc\x03\x03\x03"), Unpadded::Valid(b"abc"));
        let full_block = [16u8; 16];
        assert_eq!(strip_pkcs7(&full_block), Unpadded::Valid(&[]));
    }

    #[test]
    fn test_strip_invalid_padding_is_untouched() {
        // pad byte out of range
        assert_eq!(strip_pkcs7(b"abc\x00"), Unpadded::Invalid(b"abc\x00"));
        assert_eq!(strip_pkcs7(b"abc\x11"), Unpadded::Invalid(b"abc\x11"));
        // mismatched pad bytes
        assert_eq!(strip_pkcs7(b"ab\x01\x03\x03"), Unpadded::Invalid(b"ab\x01\x03\x03"));
        // already unpadded JSON
        assert_eq!(strip_pkcs7(b"{\"a\":1}"), Unpadded::Invalid(b"{\"a\":1}"));
        assert_eq!(strip_pkcs7(b""), Unpadded::Invalid(b""));
    }

    #[test]
    fn test_decrypt_padded_payload() {
        let plaintext = r#"{"access_token":"a","refresh_token":"r"}"#;
        let key_hex = hex::encode(KEY);
        assert_eq!(decrypt_token_info(&seal(plaintext.as_bytes()), &key_hex).unwrap(), plaintext);
    }

    #[test]
    fn test_decrypt_unpadded_payload() {
        // exactly two blocks, encrypted without padding
        let plaintext = b"{\"k\":\"0123456789abcdefghijklmn\"}";
        assert_eq!(plaintext.len(), 32);
        let mut buffer = plaintext.to_vec();
        let ciphertext = Aes256CbcEnc::new_from_slices(&KEY, &IV)
            .unwrap()
            .encrypt_padded_mut::<NoPadding>(&mut buffer, plaintext.len())
            .unwrap();
        let sealed = format!("{}:{}", hex::encode(IV), hex::encode(ciphertext));

        let decrypted = decrypt_token_info(&sealed, &hex::encode(KEY)).unwrap();
        assert_eq!(decrypted.as_bytes(), plaintext);
    }

    #[test]
    fn test_raw_key_accepted() {
        let raw_key = "0123456789abcdef0123456789abcdef";
        assert_eq!(login_key(raw_key).unwrap(), <[u8; 32]>::try_from(raw_key.as_bytes()).unwrap());
        assert!(login_key("short").is_err());
    }

    #[test]
    fn test_malformed_payloads() {
        let key = hex::encode(KEY);
        assert!(decrypt_token_info("no-separator", &key).is_err());
        assert!(decrypt_token_info("zz:00", &key).is_err());
        assert!(decrypt_token_info(&format!("{}:00ff", hex::encode(IV)), &key).is_err());
        assert!(decrypt_token_info(&format!("0011:{}", "00".repeat(16)), &key).is_err());
    }
}

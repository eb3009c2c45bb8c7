use anyhow::Result;
use base64::Engine;
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};
use uuid::Uuid;

/// Encrypts OTP codes at rest with a process-wide key. The AAD binds each
/// ciphertext to its owning user and device, so a row copied between devices
/// fails to decrypt.
#[derive(Clone)]
pub struct OtpCipher {
    key: [u8; 32],
}

impl OtpCipher {
    #[must_use]
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Build a cipher from a base64-encoded 32-byte key.
    ///
    /// # Errors
    /// Returns an error if the input is not valid base64 or not 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| anyhow::anyhow!("Secret key is not valid base64"))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("Secret key must decode to exactly 32 bytes"))?;
        Ok(Self { key })
    }

    /// Encrypt a plaintext code. Returns `nonce (12 bytes) || ciphertext`.
    ///
    /// # Errors
    /// Returns an error if encryption fails.
    pub fn encrypt_code(&self, user_id: Uuid, device_id: Uuid, code: &str) -> Result<Vec<u8>> {
        let key = Key::from_slice(&self.key);
        let cipher = ChaCha20Poly1305::new(key);

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let aad = construct_aad(user_id, device_id);
        let payload = Payload {
            msg: code.as_bytes(),
            aad: &aad,
        };

        let ciphertext = cipher
            .encrypt(nonce, payload)
            .map_err(|e| anyhow::anyhow!("Encryption failure: {e}"))?;

        let mut result = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// Decrypt a stored code. Expects `nonce (12 bytes) || ciphertext`.
    ///
    /// # Errors
    /// Returns an error if the ciphertext is malformed, tampered with, or
    /// bound to a different user/device.
    pub fn decrypt_code(&self, user_id: Uuid, device_id: Uuid, data: &[u8]) -> Result<String> {
        if data.len() < 12 {
            return Err(anyhow::anyhow!("Invalid ciphertext length"));
        }

        let (nonce_bytes, ciphertext) = data.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let key = Key::from_slice(&self.key);
        let cipher = ChaCha20Poly1305::new(key);

        let aad = construct_aad(user_id, device_id);
        let payload = Payload {
            msg: ciphertext,
            aad: &aad,
        };

        let plaintext = cipher
            .decrypt(nonce, payload)
            .map_err(|e| anyhow::anyhow!("Decryption failure: {e}"))?;

        String::from_utf8(plaintext).map_err(|_| anyhow::anyhow!("Decrypted code is not UTF-8"))
    }
}

fn construct_aad(user_id: Uuid, device_id: Uuid) -> Vec<u8> {
    format!("otp-code:v1|{user_id}|{device_id}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn encrypt_decrypt_round_trip() {
        let cipher = OtpCipher::new([42u8; 32]);
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();

        let encrypted = cipher.encrypt_code(user_id, device_id, "483920").unwrap();
        assert!(encrypted.len() > 12);

        let decrypted = cipher.decrypt_code(user_id, device_id, &encrypted).unwrap();
        assert_eq!(decrypted, "483920");
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn decrypt_fails_for_other_device() {
        let cipher = OtpCipher::new([42u8; 32]);
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();

        let encrypted = cipher.encrypt_code(user_id, device_id, "111111").unwrap();

        let result = cipher.decrypt_code(user_id, Uuid::new_v4(), &encrypted);
        assert!(result.is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn decrypt_fails_on_tampered_ciphertext() {
        let cipher = OtpCipher::new([42u8; 32]);
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();

        let mut encrypted = cipher.encrypt_code(user_id, device_id, "222222").unwrap();
        let len = encrypted.len();
        if let Some(byte) = encrypted.get_mut(len - 1) {
            *byte ^= 0xFF;
        }

        assert!(cipher.decrypt_code(user_id, device_id, &encrypted).is_err());
    }

    #[test]
    fn decrypt_rejects_short_input() {
        let cipher = OtpCipher::new([42u8; 32]);
        let result = cipher.decrypt_code(Uuid::new_v4(), Uuid::new_v4(), &[0u8; 4]);
        assert!(result.is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn from_base64_validates_length() {
        let good = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        assert!(OtpCipher::from_base64(&good).is_ok());

        let short = base64::engine::general_purpose::STANDARD.encode([7u8; 16]);
        assert!(OtpCipher::from_base64(&short).is_err());
        assert!(OtpCipher::from_base64("not base64!").is_err());
    }
}

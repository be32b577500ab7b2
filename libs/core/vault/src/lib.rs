// INICIO DEL ARCHIVO [libs/core/vault/src/lib.rs]
/*!
 * =================================================================
 * APARATO: CRYPTOGRAPHIC VAULT ENGINE (RUST EDITION V4.1)
 * CLASIFICACIÓN: CORE SECURITY (ESTRATO L1)
 * RESPONSABILIDAD: CIFRADO AUTENTICADO AES-256-GCM DE CREDENCIALES
 *
 * VISION HIPER-HOLÍSTICA:
 * Custodia las credenciales SSH del inventario en reposo. El material
 * cifrado viaja como sobre de tres campos {nonce, authTag, body} para
 * mantener paridad con el formato del almacén relacional. El arranque
 * del proceso exige un autodiagnóstico de ida y vuelta: si la llave
 * maestra no abre lo que acaba de sellar, el proceso se detiene.
 * =================================================================
 */

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, AeadCore},
    Aes256Gcm, Nonce, Key
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longitud del tag de autenticación GCM en bytes.
const AUTH_TAG_LENGTH_BYTES: usize = 16;
/// Longitud exigida de la llave maestra en bytes (256 bits).
const MASTER_KEY_LENGTH_BYTES: usize = 32;

#[derive(Error, Debug)]
pub enum VaultError {
    /// La llave maestra no mide 64 caracteres hexadecimales (32 bytes).
    #[error("[L1_VAULT_FAULT]: MASTER_KEY_MISSIZED -> expected 64 hex chars, got {0}")]
    KeySize(usize),

    #[error("[L1_VAULT_FAULT]: MASTER_KEY_NOT_HEX -> {0}")]
    KeyEncoding(#[from] hex::FromHexError),

    #[error("[L1_VAULT_FAULT]: BASE64_DECODE_FAULT -> {0}")]
    EnvelopeEncoding(#[from] base64::DecodeError),

    /// Integridad comprometida o llave maestra incorrecta.
    #[error("[L1_VAULT_FAULT]: DECRYPTION_MALFUNCTION -> integrity compromised or incorrect master key")]
    DecryptionFailure,

    #[error("[L1_VAULT_FAULT]: ENCRYPTION_MALFUNCTION")]
    EncryptionFailure,

    /// El autodiagnóstico de arranque no pudo cerrar el círculo.
    #[error("[L1_VAULT_FAULT]: SELF_TEST_COLLAPSE -> round-trip mismatch, halting process")]
    SelfTestFailure,
}

/// Sobre cifrado de tres campos tal como se persiste en el Ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CipherEnvelope {
    /// Nonce GCM de 96 bits, base64.
    pub nonce: String,
    /// Tag de autenticación de 128 bits, base64.
    pub auth_tag: String,
    /// Cuerpo cifrado, base64.
    pub body: String,
}

/// Motor simétrico de la bóveda. Una instancia por proceso.
pub struct VaultEngine {
    cipher_engine: Aes256Gcm,
}

impl VaultEngine {
    /**
     * Construye el motor desde la llave maestra del entorno (64 hex chars).
     *
     * # Errors:
     * - `VaultError::KeySize` si el material no mide 32 bytes.
     * - `VaultError::KeyEncoding` si el material no es hexadecimal.
     */
    pub fn from_hex_key(master_key_hexadecimal: &str) -> Result<Self, VaultError> {
        let key_material = hex::decode(master_key_hexadecimal.trim())?;

        if key_material.len() != MASTER_KEY_LENGTH_BYTES {
            return Err(VaultError::KeySize(master_key_hexadecimal.trim().len()));
        }

        let key = Key::<Aes256Gcm>::from_slice(&key_material);
        Ok(Self { cipher_engine: Aes256Gcm::new(key) })
    }

    /**
     * Sella un texto plano en un sobre de tres campos.
     *
     * Cada invocación genera un nonce fresco de 96 bits: dos cifrados del
     * mismo texto plano producen sobres distintos.
     */
    pub fn encrypt(&self, plaintext: &str) -> Result<CipherEnvelope, VaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let sealed_material = self.cipher_engine
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::EncryptionFailure)?;

        // El crate AEAD adjunta el tag al final del cuerpo; lo separamos
        // para respetar el sobre de tres campos del almacén.
        let split_point = sealed_material.len() - AUTH_TAG_LENGTH_BYTES;
        let (cipher_body, authentication_tag) = sealed_material.split_at(split_point);

        Ok(CipherEnvelope {
            nonce: BASE64.encode(nonce),
            auth_tag: BASE64.encode(authentication_tag),
            body: BASE64.encode(cipher_body),
        })
    }

    /**
     * Abre un sobre de tres campos verificando su integridad.
     *
     * # Errors:
     * - `VaultError::DecryptionFailure` ante tag inválido, nonce ajeno o
     *   llave maestra incorrecta.
     */
    pub fn decrypt(&self, envelope: &CipherEnvelope) -> Result<String, VaultError> {
        let nonce_material = BASE64.decode(&envelope.nonce)?;
        let authentication_tag = BASE64.decode(&envelope.auth_tag)?;
        let mut cipher_body = BASE64.decode(&envelope.body)?;

        // Reconstrucción del formato nativo del crate: body || tag.
        cipher_body.extend_from_slice(&authentication_tag);

        let nonce = Nonce::from_slice(&nonce_material);

        let decrypted_bytes = self.cipher_engine
            .decrypt(nonce, cipher_body.as_ref())
            .map_err(|_| VaultError::DecryptionFailure)?;

        String::from_utf8(decrypted_bytes)
            .map_err(|_| VaultError::DecryptionFailure)
    }

    /**
     * Autodiagnóstico de arranque: sella y abre una cadena aleatoria fresca.
     *
     * # Errors:
     * `VaultError::SelfTestFailure` si el círculo no cierra. El llamador
     * debe detener el proceso ante este fallo.
     */
    pub fn self_test(&self) -> Result<(), VaultError> {
        let probe_material: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect();

        let sealed_probe = self.encrypt(&probe_material)?;
        let recovered_probe = self.decrypt(&sealed_probe)?;

        if recovered_probe != probe_material {
            return Err(VaultError::SelfTestFailure);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MASTER_KEY_HEX: &str =
        "9f2c7d41a85e03b6f1d8c92a4b7e650d3a1f8e2c5b90d7a6431e8f0c2d5b7a94";

    fn test_engine() -> VaultEngine {
        VaultEngine::from_hex_key(TEST_MASTER_KEY_HEX).expect("test key must be valid")
    }

    /**
     * Certifica el círculo completo: encrypt(p) -> decrypt == p.
     */
    #[test]
    fn certify_roundtrip_parity() {
        let engine = test_engine();
        let secret_material = "root:hunter2@10.0.0.5";

        let envelope = engine.encrypt(secret_material).expect("encryption must succeed");
        let recovered = engine.decrypt(&envelope).expect("decryption must succeed");

        assert_eq!(recovered, secret_material);
    }

    /**
     * Dos sellados del mismo texto plano deben producir sobres distintos
     * (nonce fresco por invocación).
     */
    #[test]
    fn certify_nonce_freshness() {
        let engine = test_engine();

        let first_envelope = engine.encrypt("same_plaintext").unwrap();
        let second_envelope = engine.encrypt("same_plaintext").unwrap();

        assert_ne!(first_envelope.nonce, second_envelope.nonce);
        assert_ne!(first_envelope.body, second_envelope.body);
    }

    /**
     * Una llave mal dimensionada debe rechazarse en la ignición.
     */
    #[test]
    fn certify_key_size_gate() {
        let verdict = VaultEngine::from_hex_key("deadbeef");
        assert!(matches!(verdict, Err(VaultError::KeySize(_))));
    }

    /**
     * La manipulación del cuerpo cifrado debe romper el tag GCM.
     */
    #[test]
    fn certify_tamper_detection() {
        let engine = test_engine();
        let mut envelope = engine.encrypt("credential_material").unwrap();

        let mut corrupted_body = BASE64.decode(&envelope.body).unwrap();
        corrupted_body[0] ^= 0xFF;
        envelope.body = BASE64.encode(&corrupted_body);

        assert!(matches!(engine.decrypt(&envelope), Err(VaultError::DecryptionFailure)));
    }

    /**
     * El autodiagnóstico debe cerrar el círculo con material aleatorio.
     */
    #[test]
    fn certify_self_test() {
        assert!(test_engine().self_test().is_ok());
    }

    /**
     * El sobre debe serializar a los tres campos exactos del almacén.
     */
    #[test]
    fn certify_envelope_shape() {
        let engine = test_engine();
        let envelope = engine.encrypt("x").unwrap();

        let serialized = serde_json::to_value(&envelope).unwrap();
        let object = serialized.as_object().unwrap();

        assert_eq!(object.len(), 3);
        assert!(object.contains_key("nonce"));
        assert!(object.contains_key("auth_tag"));
        assert!(object.contains_key("body"));
    }
}
// FIN DEL ARCHIVO [libs/core/vault/src/lib.rs]

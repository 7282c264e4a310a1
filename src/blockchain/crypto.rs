use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;

use super::transaction::Transaction;

/// Sender used for issuance (faucet credits, mining rewards, genesis)
pub const SYSTEM: &str = "SYSTEM";

/// Length of an uncompressed P-256 public key without the SEC1 tag (x || y)
pub const PUBLIC_KEY_LEN: usize = 64;

/// Length of one signature component or coordinate
const COMPONENT_LEN: usize = 32;

/// Number of SHA-256 bytes kept when deriving an address
const ADDRESS_LEN: usize = 20;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Represents an account address (hex of the first 20 bytes of SHA-256(public key))
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    /// Derives the address of a raw `x || y` public key
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = Sha256::digest(public_key);
        Address(hex::encode(&digest[..ADDRESS_LEN]))
    }

    /// The issuance sentinel
    pub fn system() -> Self {
        Address(SYSTEM.to_string())
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

/// Represents a wallet with a P-256 keypair
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    public_key: [u8; PUBLIC_KEY_LEN],
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Creates a wallet from a hex encoded private scalar
    ///
    /// Scalars shorter than 32 bytes are left-padded, so keys exported
    /// without leading zero bytes still load.
    pub fn from_secret_key_hex(secret_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(secret_key.trim())
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        if bytes.is_empty() || bytes.len() > COMPONENT_LEN {
            return Err(CryptoError::InvalidPrivateKey(format!(
                "expected at most {} bytes, got {}",
                COMPONENT_LEN,
                bytes.len()
            )));
        }

        let signing_key = SigningKey::from_slice(&left_pad(&bytes))
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let point = signing_key.verifying_key().to_encoded_point(false);

        // Uncompressed SEC1 encoding is 0x04 || x || y
        let mut public_key = [0u8; PUBLIC_KEY_LEN];
        public_key.copy_from_slice(&point.as_bytes()[1..]);
        let address = Address::from_public_key(&public_key);

        Wallet {
            signing_key,
            public_key,
            address,
        }
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Gets the hex encoded `x || y` public key
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    /// Exports the wallet's private scalar as hex
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Signs a message, hashing it with SHA-256 first. Returns `r || s` as hex.
    fn sign_message(&self, message: &[u8]) -> String {
        let signature: Signature = self.signing_key.sign(message);
        hex::encode(signature.to_bytes())
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives the address for a hex encoded public key
pub fn derive_address(public_key_hex: &str) -> Result<Address, CryptoError> {
    let bytes = hex::decode(public_key_hex).map_err(|e| CryptoError::DecodingError(e.to_string()))?;
    if bytes.len() != PUBLIC_KEY_LEN {
        return Err(CryptoError::InvalidPublicKey(format!(
            "expected {} bytes, got {}",
            PUBLIC_KEY_LEN,
            bytes.len()
        )));
    }
    Ok(Address::from_public_key(&bytes))
}

/// Signs the canonical message of a transaction
pub fn sign(tx: &Transaction, wallet: &Wallet) -> String {
    wallet.sign_message(tx.canonical_message().as_bytes())
}

/// Verifies the transaction's signature against its embedded public key
///
/// Any decoding problem counts as a failed verification.
pub fn verify(tx: &Transaction) -> bool {
    let verifying_key = match decode_public_key(&tx.pub_key) {
        Ok(key) => key,
        Err(_) => return false,
    };

    let signature = match decode_signature(&tx.signature) {
        Ok(signature) => signature,
        Err(_) => return false,
    };

    verifying_key
        .verify(tx.canonical_message().as_bytes(), &signature)
        .is_ok()
}

/// Computes the content derived identifier of a transaction
pub fn generate_txid(tx: &Transaction) -> String {
    let input = format!(
        "{}{}{:.4}{}{}",
        tx.from, tx.to, tx.amount, tx.timestamp, tx.signature
    );
    hex::encode(Sha256::digest(input.as_bytes()))
}

fn decode_public_key(public_key_hex: &str) -> Result<VerifyingKey, CryptoError> {
    let bytes = hex::decode(public_key_hex).map_err(|e| CryptoError::DecodingError(e.to_string()))?;
    if bytes.len() != PUBLIC_KEY_LEN {
        return Err(CryptoError::InvalidPublicKey(format!(
            "expected {} bytes, got {}",
            PUBLIC_KEY_LEN,
            bytes.len()
        )));
    }

    let mut sec1 = Vec::with_capacity(PUBLIC_KEY_LEN + 1);
    sec1.push(0x04);
    sec1.extend_from_slice(&bytes);

    VerifyingKey::from_sec1_bytes(&sec1).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Decodes `r || s`. `r` is the first 32 bytes and `s` everything after it,
/// read as a big-endian integer that must fit in 32 bytes.
fn decode_signature(signature_hex: &str) -> Result<Signature, CryptoError> {
    let bytes = hex::decode(signature_hex).map_err(|e| CryptoError::DecodingError(e.to_string()))?;
    if bytes.len() < 2 * COMPONENT_LEN {
        return Err(CryptoError::InvalidSignature(format!(
            "expected at least {} bytes, got {}",
            2 * COMPONENT_LEN,
            bytes.len()
        )));
    }

    let (r, s) = bytes.split_at(COMPONENT_LEN);
    let leading_zeros = s.iter().take_while(|b| **b == 0).count();
    let s = &s[leading_zeros..];
    if s.len() > COMPONENT_LEN {
        return Err(CryptoError::InvalidSignature("s component out of range".to_string()));
    }

    let mut raw = [0u8; 2 * COMPONENT_LEN];
    raw[..COMPONENT_LEN].copy_from_slice(r);
    raw[COMPONENT_LEN..].copy_from_slice(&left_pad(s));

    Signature::from_slice(&raw).map_err(|e| CryptoError::InvalidSignature(e.to_string()))
}

fn left_pad(bytes: &[u8]) -> [u8; COMPONENT_LEN] {
    let mut out = [0u8; COMPONENT_LEN];
    out[COMPONENT_LEN - bytes.len()..].copy_from_slice(bytes);
    out
}

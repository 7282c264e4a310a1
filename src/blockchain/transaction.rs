use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{self, Address, CryptoError, Wallet};

/// Reasons a transaction is refused
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Sender and recipient are the same address")]
    SelfTransfer,

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("From address does not match the private key")]
    AddressMismatch,

    #[error("Public key does not belong to the sender address")]
    ForeignKey,

    #[error("Transaction id does not match its contents")]
    TxIdMismatch,

    #[error("Transaction {0} is already confirmed")]
    AlreadyConfirmed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// Represents a transfer between two accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address, or `SYSTEM` for issuance
    pub from: Address,

    /// Recipient's address
    pub to: Address,

    /// Amount being transferred
    pub amount: f64,

    /// Hex encoded `x || y` P-256 public key of the sender
    #[serde(rename = "pubKey")]
    pub pub_key: String,

    /// Hex encoded `r || s` signature
    pub signature: String,

    /// Unix timestamp (seconds)
    pub timestamp: i64,

    /// Content derived identifier
    pub txid: String,
}

impl Transaction {
    /// Creates an issuance transaction. Issuance carries no key or signature.
    pub fn new_system(to: Address, amount: f64, timestamp: i64) -> Self {
        let mut tx = Transaction {
            from: Address::system(),
            to,
            amount,
            pub_key: String::new(),
            signature: String::new(),
            timestamp,
            txid: String::new(),
        };
        tx.txid = crypto::generate_txid(&tx);
        tx
    }

    /// Creates a transfer from the wallet's address, signed by the wallet
    pub fn signed(wallet: &Wallet, to: Address, amount: f64, timestamp: i64) -> Self {
        let mut tx = Transaction {
            from: wallet.address().clone(),
            to,
            amount,
            pub_key: wallet.public_key_hex(),
            signature: String::new(),
            timestamp,
            txid: String::new(),
        };
        tx.signature = crypto::sign(&tx, wallet);
        tx.txid = crypto::generate_txid(&tx);
        tx
    }

    /// The signed message: from, to, amount with four decimals, timestamp
    pub fn canonical_message(&self) -> String {
        format!("{}{}{:.4}{}", self.from, self.to, self.amount, self.timestamp)
    }

    /// Checks if the transaction is an issuance
    pub fn is_system(&self) -> bool {
        self.from.is_system()
    }

    pub fn verify_signature(&self) -> bool {
        crypto::verify(self)
    }

    /// Whether the stored txid is the one its contents hash to
    pub fn has_valid_txid(&self) -> bool {
        self.txid == crypto::generate_txid(self)
    }

    /// Whether the address takes part in this transfer
    pub fn involves(&self, address: &Address) -> bool {
        &self.from == address || &self.to == address
    }
}

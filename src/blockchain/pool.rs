use std::collections::HashMap;

use indexmap::IndexMap;
use log::debug;

use super::block::Block;
use super::crypto::Address;
use super::ledger::{check_transaction, Ledger};
use super::transaction::{Transaction, TransactionError};

/// Pending, unconfirmed transactions keyed by txid in arrival order
#[derive(Debug, Clone, Default)]
pub struct TransactionPool {
    entries: IndexMap<String, Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, txid: &str) -> Option<&Transaction> {
        self.entries.get(txid)
    }

    pub fn contains(&self, txid: &str) -> bool {
        self.entries.contains_key(txid)
    }

    /// Pending transactions in arrival order
    pub fn entries(&self) -> impl Iterator<Item = &Transaction> {
        self.entries.values()
    }

    /// Admits a transaction that is valid against the ledger's balances
    ///
    /// Returns `Ok(false)` when an entry with the same txid is already pending.
    pub fn submit(&mut self, tx: Transaction, ledger: &Ledger) -> Result<bool, TransactionError> {
        Self::check_admissible(&tx, ledger)?;

        if self.entries.contains_key(&tx.txid) {
            return Ok(false);
        }

        self.entries.insert(tx.txid.clone(), tx);
        Ok(true)
    }

    /// Pending transactions that can go into the next block
    ///
    /// Each entry is re-checked against the ledger, skipping anything already
    /// confirmed. Debits of earlier selected entries are counted against the
    /// sender, so the batch as a whole never overdraws an account; entries that
    /// do not fit stay pending for a later block. The pool is not modified.
    pub fn select_for_mining(&self, ledger: &Ledger) -> Vec<Transaction> {
        let mut spent: HashMap<&Address, f64> = HashMap::new();
        let mut selected = Vec::new();

        for tx in self.entries.values() {
            if ledger.contains_txid(&tx.txid) {
                continue;
            }

            let already_spent = spent.get(&tx.from).copied().unwrap_or(0.0);
            let available = ledger.available(&tx.from) - already_spent;
            if let Err(err) = check_transaction(tx, available) {
                debug!("Leaving {} out of the next block: {}", tx.txid, err);
                continue;
            }

            if !tx.is_system() {
                *spent.entry(&tx.from).or_insert(0.0) += tx.amount;
            }
            selected.push(tx.clone());
        }

        selected
    }

    /// Removes every entry confirmed by `block`
    pub fn reconcile_after_block(&mut self, block: &Block) {
        for tx in &block.txs {
            self.entries.shift_remove(&tx.txid);
        }
    }

    /// Drops entries the ledger already contains, after the chain was replaced
    pub fn retain_unconfirmed(&mut self, ledger: &Ledger) {
        self.entries.retain(|txid, _| !ledger.contains_txid(txid));
    }

    /// Adds valid remote entries that are not pending yet
    ///
    /// Returns how many entries were added.
    pub fn merge_from_peer(&mut self, remote: Vec<Transaction>, ledger: &Ledger) -> usize {
        let mut added = 0;

        for tx in remote {
            let txid = tx.txid.clone();
            match self.submit(tx, ledger) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(err) => debug!("Ignoring remote pool entry {}: {}", txid, err),
            }
        }

        added
    }

    fn check_admissible(tx: &Transaction, ledger: &Ledger) -> Result<(), TransactionError> {
        if !tx.has_valid_txid() {
            return Err(TransactionError::TxIdMismatch);
        }

        if tx.to.as_str().is_empty() {
            return Err(TransactionError::InvalidAddress("empty recipient".to_string()));
        }

        if ledger.contains_txid(&tx.txid) {
            return Err(TransactionError::AlreadyConfirmed(tx.txid.clone()));
        }

        ledger.is_transaction_valid(tx)
    }
}

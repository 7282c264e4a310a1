use std::collections::{HashMap, HashSet};

use log::debug;
use thiserror::Error;

use super::block::Block;
use super::crypto::{self, Address};
use super::transaction::{Transaction, TransactionError};

/// Reasons a block is refused for appending
#[derive(Debug, Error, PartialEq)]
pub enum BlockError {
    #[error("Block does not extend the current tip {tip}")]
    NotLinked { tip: String },

    #[error("Block index {got} does not follow tip index {tip}")]
    BadIndex { tip: u64, got: u64 },

    #[error("Block hash does not match its contents")]
    BadHash,

    #[error("Block hash does not meet difficulty {0}")]
    InsufficientWork(usize),

    #[error("Transaction {0} appears more than once in the chain")]
    DuplicateTxid(String),
}

/// Checks hash integrity, proof of work and linkage of a whole chain
///
/// The genesis block only needs a correct hash. No txid may appear twice.
pub fn validate_chain(chain: &[Block], difficulty: usize) -> bool {
    let genesis = match chain.first() {
        Some(genesis) => genesis,
        None => return false,
    };

    if !genesis.has_valid_hash() {
        debug!("Genesis block hash is incorrect");
        return false;
    }

    for (i, pair) in chain.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);

        if !current.has_valid_hash() {
            debug!("Block {} hash is incorrect", i + 1);
            return false;
        }

        if !current.meets_difficulty(difficulty) {
            debug!("Block {} does not meet difficulty {}", i + 1, difficulty);
            return false;
        }

        if current.prev_hash != previous.hash {
            debug!("Block {} prevHash does not link to block {}", i + 1, i);
            return false;
        }
    }

    let mut seen = HashSet::new();
    for tx in chain.iter().flat_map(|block| &block.txs) {
        if !seen.insert(tx.txid.as_str()) {
            debug!("Transaction {} appears more than once", tx.txid);
            return false;
        }
    }

    true
}

/// Checks a transfer against a given available balance
///
/// Issuance is always valid.
pub fn check_transaction(tx: &Transaction, available: f64) -> Result<(), TransactionError> {
    if tx.is_system() {
        return Ok(());
    }

    if tx.from == tx.to {
        return Err(TransactionError::SelfTransfer);
    }

    if !tx.amount.is_finite() || tx.amount <= 0.0 {
        return Err(TransactionError::InvalidAmount(tx.amount));
    }

    if available < tx.amount {
        return Err(TransactionError::InsufficientFunds {
            required: tx.amount,
            available,
        });
    }

    if crypto::derive_address(&tx.pub_key).ok().as_ref() != Some(&tx.from) {
        return Err(TransactionError::ForeignKey);
    }

    if !tx.verify_signature() {
        return Err(TransactionError::InvalidSignature);
    }

    Ok(())
}

/// The chain of blocks and the balances derived from replaying it
#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    balances: HashMap<Address, f64>,
    difficulty: usize,
}

impl Ledger {
    /// Creates a ledger holding only a fresh genesis block
    pub fn new(difficulty: usize) -> Self {
        let mut ledger = Ledger {
            chain: vec![Block::genesis()],
            balances: HashMap::new(),
            difficulty,
        };
        ledger.rebuild_balances();
        ledger
    }

    /// Creates a ledger from a loaded chain, or `None` if the chain is invalid
    pub fn from_chain(chain: Vec<Block>, difficulty: usize) -> Option<Self> {
        if !validate_chain(&chain, difficulty) {
            return None;
        }

        let mut ledger = Ledger {
            chain,
            balances: HashMap::new(),
            difficulty,
        };
        ledger.rebuild_balances();
        Some(ledger)
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// The last block. A ledger always holds at least the genesis block.
    pub fn tip(&self) -> &Block {
        &self.chain[self.chain.len() - 1]
    }

    pub fn balances(&self) -> &HashMap<Address, f64> {
        &self.balances
    }

    /// Balance of an address, `None` if it never appeared in the chain
    pub fn balance(&self, address: &Address) -> Option<f64> {
        self.balances.get(address).copied()
    }

    /// Balance of an address, zero if it never appeared in the chain
    pub fn available(&self, address: &Address) -> f64 {
        self.balance(address).unwrap_or(0.0)
    }

    /// Applies every transfer in a block to the balances
    ///
    /// No overdraft check happens here; transactions were checked before
    /// they were packaged. Zero-value transfers such as the genesis marker
    /// move nothing and create no account.
    pub fn apply_block(&mut self, block: &Block) {
        for tx in &block.txs {
            if tx.amount == 0.0 {
                continue;
            }
            if !tx.is_system() {
                *self.balances.entry(tx.from.clone()).or_insert(0.0) -= tx.amount;
            }
            *self.balances.entry(tx.to.clone()).or_insert(0.0) += tx.amount;
        }
    }

    /// Recomputes balances by replaying the whole chain from genesis
    pub fn rebuild_balances(&mut self) {
        self.balances.clear();

        let chain = std::mem::take(&mut self.chain);
        for block in &chain {
            self.apply_block(block);
        }
        self.chain = chain;
    }

    /// Checks a transaction against the current balances
    pub fn is_transaction_valid(&self, tx: &Transaction) -> Result<(), TransactionError> {
        check_transaction(tx, self.available(&tx.from))
    }

    /// Appends a sealed block that extends the tip, then applies it
    pub fn append(&mut self, block: Block) -> Result<(), BlockError> {
        let tip = self.tip();

        if block.prev_hash != tip.hash {
            return Err(BlockError::NotLinked {
                tip: tip.hash.clone(),
            });
        }

        if block.index != tip.index + 1 {
            return Err(BlockError::BadIndex {
                tip: tip.index,
                got: block.index,
            });
        }

        if !block.has_valid_hash() {
            return Err(BlockError::BadHash);
        }

        if !block.meets_difficulty(self.difficulty) {
            return Err(BlockError::InsufficientWork(self.difficulty));
        }

        let mut seen = HashSet::new();
        for tx in &block.txs {
            if !seen.insert(tx.txid.as_str()) || self.contains_txid(&tx.txid) {
                return Err(BlockError::DuplicateTxid(tx.txid.clone()));
            }
        }

        self.apply_block(&block);
        self.chain.push(block);
        Ok(())
    }

    /// Replaces the chain if `candidate` is strictly longer and valid
    ///
    /// Returns whether the chain was replaced.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.chain.len() {
            return false;
        }

        if !validate_chain(&candidate, self.difficulty) {
            return false;
        }

        self.adopt_validated(candidate)
    }

    /// Same as [`Ledger::replace_chain`] for a chain the caller already
    /// passed through [`validate_chain`]; only the length rule is rechecked.
    pub(crate) fn adopt_validated(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.chain.len() {
            return false;
        }

        self.chain = candidate;
        self.rebuild_balances();
        true
    }

    pub fn contains_txid(&self, txid: &str) -> bool {
        self.chain.iter().any(|block| block.contains_txid(txid))
    }

    /// Finds a confirmed transaction and the index of its block
    pub fn find_transaction(&self, txid: &str) -> Option<(u64, &Transaction)> {
        self.chain.iter().find_map(|block| {
            block
                .txs
                .iter()
                .find(|tx| tx.txid == txid)
                .map(|tx| (block.index, tx))
        })
    }

    /// Confirmed transactions involving an address, with their block index
    pub fn history(&self, address: &Address) -> Vec<(u64, &Transaction)> {
        self.chain
            .iter()
            .flat_map(|block| block.txs.iter().map(move |tx| (block.index, tx)))
            .filter(|(_, tx)| tx.involves(address))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Wallet;
    use crate::blockchain::miner;

    const DIFFICULTY: usize = 2;

    fn seal(ledger: &Ledger, txs: Vec<Transaction>) -> Block {
        miner::mine_block(ledger.tip(), txs, ledger.difficulty(), || false)
            .expect("search without a stop condition always finishes")
    }

    fn funded_ledger(wallet: &Wallet, amount: f64) -> Ledger {
        let mut ledger = Ledger::new(DIFFICULTY);
        let block = seal(
            &ledger,
            vec![Transaction::new_system(wallet.address().clone(), amount, 1)],
        );
        ledger.append(block).unwrap();
        ledger
    }

    #[test]
    fn test_new_ledger() {
        let ledger = Ledger::new(DIFFICULTY);

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.tip().index, 0);
        assert!(validate_chain(ledger.chain(), DIFFICULTY));
        assert!(ledger.balances().is_empty());
        assert!(ledger.balance(&Address::from("GENESIS")).is_none());
    }

    #[test]
    fn test_empty_chain_is_invalid() {
        assert!(!validate_chain(&[], DIFFICULTY));
    }

    #[test]
    fn test_validate_chain_detects_tampering() {
        let wallet = Wallet::new();
        let ledger = funded_ledger(&wallet, 50.0);
        let mut chain = ledger.chain().to_vec();
        assert!(validate_chain(&chain, DIFFICULTY));

        chain[1].txs[0].amount = 5000.0;
        assert!(!validate_chain(&chain, DIFFICULTY));
    }

    #[test]
    fn test_validate_chain_detects_broken_link() {
        let ledger = funded_ledger(&Wallet::new(), 50.0);
        let mut chain = ledger.chain().to_vec();

        chain[1].prev_hash = "0".repeat(64);
        chain[1].hash = chain[1].calculate_hash();
        assert!(!validate_chain(&chain, DIFFICULTY));
    }

    #[test]
    fn test_validate_chain_requires_work() {
        let ledger = Ledger::new(DIFFICULTY);
        let mut block = Block::candidate(ledger.tip(), Vec::new());
        block.hash = block.calculate_hash();
        while block.meets_difficulty(DIFFICULTY) {
            block.nonce += 1;
            block.hash = block.calculate_hash();
        }

        let chain = vec![ledger.tip().clone(), block];
        assert!(!validate_chain(&chain, DIFFICULTY));
    }

    #[test]
    fn test_genesis_hash_is_checked() {
        let mut chain = Ledger::new(DIFFICULTY).chain().to_vec();
        chain[0].nonce = 7;
        assert!(!validate_chain(&chain, DIFFICULTY));
    }

    #[test]
    fn test_apply_block() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let mut ledger = funded_ledger(&alice, 100.0);

        let transfer = Transaction::signed(&alice, bob.address().clone(), 30.0, 2);
        let block = seal(&ledger, vec![transfer]);
        ledger.append(block).unwrap();

        assert_eq!(ledger.balance(alice.address()), Some(70.0));
        assert_eq!(ledger.balance(bob.address()), Some(30.0));
    }

    #[test]
    fn test_rebuild_is_deterministic_and_matches_incremental() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let mut ledger = funded_ledger(&alice, 100.0);
        let block = seal(
            &ledger,
            vec![Transaction::signed(&alice, bob.address().clone(), 25.0, 3)],
        );
        ledger.append(block).unwrap();

        let incremental = ledger.balances().clone();
        ledger.rebuild_balances();
        let first = ledger.balances().clone();
        ledger.rebuild_balances();

        assert_eq!(incremental, first);
        assert_eq!(first, *ledger.balances());
    }

    #[test]
    fn test_transaction_validation() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let ledger = funded_ledger(&alice, 100.0);

        let ok = Transaction::signed(&alice, bob.address().clone(), 40.0, 5);
        assert!(ledger.is_transaction_valid(&ok).is_ok());

        let to_self = Transaction::signed(&alice, alice.address().clone(), 1.0, 5);
        assert!(matches!(
            ledger.is_transaction_valid(&to_self),
            Err(TransactionError::SelfTransfer)
        ));

        let zero = Transaction::signed(&alice, bob.address().clone(), 0.0, 5);
        assert!(matches!(
            ledger.is_transaction_valid(&zero),
            Err(TransactionError::InvalidAmount(_))
        ));

        let nan = Transaction::signed(&alice, bob.address().clone(), f64::NAN, 5);
        assert!(matches!(
            ledger.is_transaction_valid(&nan),
            Err(TransactionError::InvalidAmount(_))
        ));

        let too_much = Transaction::signed(&alice, bob.address().clone(), 100.5, 5);
        assert!(matches!(
            ledger.is_transaction_valid(&too_much),
            Err(TransactionError::InsufficientFunds { .. })
        ));

        let mut forged = ok.clone();
        forged.amount = 41.0;
        assert!(matches!(
            ledger.is_transaction_valid(&forged),
            Err(TransactionError::InvalidSignature)
        ));

        let mut stolen = Transaction::signed(&bob, bob.address().clone(), 1.0, 5);
        stolen.from = alice.address().clone();
        stolen.to = Address::from("thief");
        assert!(matches!(
            ledger.is_transaction_valid(&stolen),
            Err(TransactionError::ForeignKey)
        ));

        let issuance = Transaction::new_system(bob.address().clone(), 1_000_000.0, 5);
        assert!(ledger.is_transaction_valid(&issuance).is_ok());
    }

    #[test]
    fn test_append_rejects_stale_block() {
        let wallet = Wallet::new();
        let mut ledger = Ledger::new(DIFFICULTY);
        let first = seal(&ledger, vec![Transaction::new_system(wallet.address().clone(), 1.0, 1)]);
        let competing = seal(&ledger, vec![Transaction::new_system(wallet.address().clone(), 2.0, 1)]);

        ledger.append(first).unwrap();
        assert!(matches!(
            ledger.append(competing),
            Err(BlockError::NotLinked { .. })
        ));
        assert_eq!(ledger.len(), 2);
        assert!(validate_chain(ledger.chain(), DIFFICULTY));
    }

    #[test]
    fn test_append_rejects_repeated_txid() {
        let wallet = Wallet::new();
        let mut ledger = funded_ledger(&wallet, 10.0);

        // the funding credit is already confirmed
        let replayed = ledger.chain()[1].txs[0].clone();
        let block = seal(&ledger, vec![replayed]);
        assert!(matches!(ledger.append(block), Err(BlockError::DuplicateTxid(_))));

        let credit = Transaction::new_system(wallet.address().clone(), 1.0, 77);
        let block = seal(&ledger, vec![credit.clone(), credit]);
        assert!(matches!(ledger.append(block), Err(BlockError::DuplicateTxid(_))));

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.balance(wallet.address()), Some(10.0));
    }

    #[test]
    fn test_validate_chain_rejects_repeated_txid() {
        let wallet = Wallet::new();
        let ledger = funded_ledger(&wallet, 10.0);
        let mut chain = ledger.chain().to_vec();
        assert!(validate_chain(&chain, DIFFICULTY));

        let replayed = chain[1].txs[0].clone();
        let block = miner::mine_block(&chain[1], vec![replayed], DIFFICULTY, || false).unwrap();
        chain.push(block);

        assert!(!validate_chain(&chain, DIFFICULTY));
        assert!(Ledger::from_chain(chain, DIFFICULTY).is_none());
    }

    #[test]
    fn test_append_rejects_bad_hash() {
        let mut ledger = Ledger::new(DIFFICULTY);
        let mut block = seal(&ledger, Vec::new());
        block.nonce += 1;

        assert_eq!(ledger.append(block), Err(BlockError::BadHash));
    }

    #[test]
    fn test_replace_chain_rules() {
        let wallet = Wallet::new();
        let longer = funded_ledger(&wallet, 10.0);
        let mut local = Ledger::new(DIFFICULTY);

        // equal length never replaces
        let same_length = Ledger::new(DIFFICULTY);
        assert!(!local.replace_chain(same_length.chain().to_vec()));

        // longer but invalid never replaces
        let mut broken = longer.chain().to_vec();
        broken[1].txs[0].amount = 1e9;
        assert!(!local.replace_chain(broken));

        // longer and valid replaces and rebuilds balances
        assert!(local.replace_chain(longer.chain().to_vec()));
        assert_eq!(local.len(), 2);
        assert_eq!(local.balance(wallet.address()), Some(10.0));

        // shorter never replaces
        assert!(!local.replace_chain(Ledger::new(DIFFICULTY).chain().to_vec()));
        assert_eq!(local.len(), 2);
    }

    #[test]
    fn test_find_transaction_and_history() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let mut ledger = funded_ledger(&alice, 100.0);
        let transfer = Transaction::signed(&alice, bob.address().clone(), 5.0, 9);
        let txid = transfer.txid.clone();
        let block = seal(&ledger, vec![transfer]);
        ledger.append(block).unwrap();

        let (index, tx) = ledger.find_transaction(&txid).unwrap();
        assert_eq!(index, 2);
        assert_eq!(tx.amount, 5.0);
        assert!(ledger.contains_txid(&txid));
        assert!(ledger.find_transaction("missing").is_none());

        assert_eq!(ledger.history(alice.address()).len(), 2);
        assert_eq!(ledger.history(bob.address()).len(), 1);
        assert!(ledger.balance(&Address::from("nobody")).is_none());
    }
}

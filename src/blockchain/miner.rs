use super::block::Block;
use super::transaction::Transaction;

/// How many nonces are tried between two checks of the stop condition
const STOP_CHECK_INTERVAL: u64 = 1024;

/// Performs proof of work on a successor of `prev`
///
/// Increments the nonce from zero until the hash has `difficulty` leading
/// zero hex digits. `should_stop` is polled every 1024 nonces; when it
/// returns true the search is abandoned and `None` is returned.
///
/// The search only reads its arguments, so it is safe to run on a worker
/// thread without holding any lock.
pub fn mine_block<F>(
    prev: &Block,
    transactions: Vec<Transaction>,
    difficulty: usize,
    should_stop: F,
) -> Option<Block>
where
    F: Fn() -> bool,
{
    let mut block = Block::candidate(prev, transactions);

    loop {
        if block.nonce % STOP_CHECK_INTERVAL == 0 && should_stop() {
            return None;
        }

        let hash = block.calculate_hash();
        if super::block::meets_difficulty(&hash, difficulty) {
            block.hash = hash;
            return Some(block);
        }

        block.nonce += 1;
    }
}

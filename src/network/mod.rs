// Network module
//
// Peer bookkeeping, the HTTP transport to sibling nodes and the sync engine
// that reconciles the local chain and pool against them.

pub mod client;
pub mod peers;
pub mod sync;

pub use client::{HttpPeerClient, PeerClient, PeerError};
pub use peers::PeerSet;
pub use sync::{SyncEngine, SyncReport};

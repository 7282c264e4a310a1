// API module
//
// This module contains the HTTP API of the node, used by clients and by
// sibling nodes alike

pub mod handlers;
pub mod routes;
pub mod schema;

// Re-export main components for easier access
pub use routes::configure_routes;

//! magpie client - HTTP clients for the two upstream services.
//!
//! - [`ArchiveClient`]: time-ordered candidate search (stale fields,
//!   identifiers only)
//! - [`GatewayClient`]: authoritative per-item resolution with OAuth
//!   client-credentials authentication
//!
//! Both implement the corresponding `magpie_core` traits, so the pipeline
//! never depends on these types directly.

pub mod archive;
pub mod gateway;

pub use archive::ArchiveClient;
pub use gateway::GatewayClient;

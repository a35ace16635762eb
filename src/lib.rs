//! dnstun - a DNS tunnel server.
//!
//! Each tunnel server answers queries for one zone. Query names carry a
//! session key and an optional base32 uplink payload; every session owns a
//! TCP connection to the configured backend and returns backend data in
//! TXT, NULL or CNAME answers when the client polls.

pub mod address;
pub mod config;
pub mod server;
pub mod tunnel;

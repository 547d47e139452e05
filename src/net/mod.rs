//! Networking: wire types, the HTTP transport, and the request gateway.
//!
//! SYSTEM CONTEXT
//! ==============
//! `transport` moves bytes, `cookies` keeps the server's session cookie,
//! `gateway` adds bearer auth and the refresh-once retry, and `types` defines
//! the shared request/response/error schema.

pub mod cookies;
pub mod gateway;
pub mod transport;
pub mod types;

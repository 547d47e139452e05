//! Client-side state: the persisted session, its storage, and the error notice.
//!
//! SYSTEM CONTEXT
//! ==============
//! `storage` is the local key/value area shared between tabs, `session` owns
//! the signed-in identity on top of it, and `notice` carries the last
//! user-facing error published by the request gateway.

pub mod notice;
pub mod session;
pub mod storage;

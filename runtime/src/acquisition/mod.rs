//! Page acquisition: sessions, transport, and the bounded fetcher.

pub mod cancel;
pub mod challenge;
pub mod fetcher;
pub mod http_client;
pub mod http_session;
pub mod outcome;
pub mod session_store;

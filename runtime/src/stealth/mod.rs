//! Stealth measures for HTTP collection.
//!
//! Randomized client identities and human-like timing to avoid uniform,
//! easily blocked request signatures.

pub mod behavior;
pub mod fingerprint;

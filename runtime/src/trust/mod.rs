//! Trust and safety: content sanitization, spot validation, confidence scoring.

pub mod confidence;
pub mod sandbox;
pub mod validator;

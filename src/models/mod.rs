//! # Models
//!
//! Row types for the archive tables, with the SQL each job needs kept next to
//! the struct it returns.

pub mod archived;

// Re-export archived models for easy access
pub use archived::{NewPetition, NewSignature, Petition, Signature, SignatureState};

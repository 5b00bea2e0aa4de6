//! # Repositories
//!
//! Collaborator traits through which the anonymization jobs reach the
//! datastore, and their PostgreSQL implementations. The jobs only depend on
//! the traits, so tests can swap in the in-memory versions from
//! [`crate::test_helpers`].

pub mod petition_repository;
pub mod signature_repository;

pub use petition_repository::{PetitionRepository, PgPetitionRepository};
pub use signature_repository::{PgSignatureRepository, SignatureRepository};

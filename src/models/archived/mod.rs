//! Petitions and signatures that have been moved to the archive.

pub mod petition;
pub mod signature;

pub use petition::{NewPetition, Petition};
pub use signature::{outward_code, NewSignature, Signature, SignatureState};

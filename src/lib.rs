//! A halo2 circuit over BN254 that verifies plonky2 proofs.
//!
//! Goldilocks arithmetic is emulated in native BN254 cells. A proof is loaded with
//! [`witness::AssignWitness`], its Fiat-Shamir transcript is replayed with
//! [`challenger::ChallengerChip`], then the PLONK identity and the FRI low degree test are
//! enforced by [`verifier::VerifierChip`]. [`circuit::Plonky2VerifierCircuit`] wraps the
//! whole thing as a `Circuit<Fr>`.

pub mod challenger;
pub mod circuit;
pub mod error;
pub mod fields;
pub mod fri;
pub mod gates;
pub mod hash;
pub mod merkle;
pub mod plonk;
pub mod types;
pub mod verifier;
pub mod witness;

#[cfg(test)]
mod tests;

/// Degree of the Goldilocks extension used by plonky2's challenges and openings.
pub const D: usize = 2;

pub use circuit::{public_instances, Plonky2VerifierCircuit};
pub use error::{Result, VerifierError};
pub use fields::{ExtensionFieldChip, GoldilocksChip, RangeCheckBackend};
pub use hash::{HashOut, MerkleHasherChip, PoseidonBn254Chip, PoseidonGoldilocksChip};
pub use types::{CircuitDescription, ProofWithPublicInputs, VerifierOnlyCircuitData};
pub use verifier::{VerifiedStatement, VerifierChip};

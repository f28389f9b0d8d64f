use std::fmt::Debug;
use std::str::FromStr;

use halo2_base::{
    utils::{biguint_to_fe, BigPrimeField},
    AssignedValue, Context,
};
use num_bigint::BigUint;
use plonky2::field::types::Field;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;
use crate::fields::{fe_from_goldilocks, Goldilocks};

pub mod poseidon_bn254;
pub mod poseidon_goldilocks;

pub use poseidon_bn254::chip::PoseidonBn254Chip;
pub use poseidon_goldilocks::chip::PoseidonGoldilocksChip;

// NATIVE DIGESTS
// =========================================================================

/// A BN254 scalar, serialized as a decimal string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bn254Digest(pub BigUint);

impl Serialize for Bn254Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_str_radix(10))
    }
}

impl<'de> Deserialize<'de> for Bn254Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BigUint::from_str(&s).map(Self).map_err(de::Error::custom)
    }
}

/// Digest of a Merkle cap entry or circuit digest, as produced by the prover's hasher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HashOut {
    /// Poseidon over Goldilocks, four field elements.
    Goldilocks { elements: [u64; 4] },
    /// Poseidon over BN254, one outer field element.
    Bn254(Bn254Digest),
}

impl HashOut {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Goldilocks { .. } => "Goldilocks",
            Self::Bn254(_) => "BN254",
        }
    }

    /// The values the digest's cells take once loaded, see [`MerkleHasherChip::to_cells`].
    pub fn to_field_elements<F: BigPrimeField>(&self) -> Vec<F> {
        match self {
            Self::Goldilocks { elements } => elements
                .iter()
                .map(|&e| fe_from_goldilocks(Goldilocks::from_noncanonical_u64(e)))
                .collect(),
            Self::Bn254(Bn254Digest(value)) => vec![biguint_to_fe(value)],
        }
    }
}

// MERKLE HASHER CHIP
// =========================================================================

/// The hash used for Merkle trees and the circuit digest. Implemented by
/// [`PoseidonBn254Chip`] (one cell digests) and [`PoseidonGoldilocksChip`] (four cell digests).
pub trait MerkleHasherChip<F: BigPrimeField> {
    type Digest: Copy + Debug;

    /// Assigns a native digest, checking that it is of this hasher's kind.
    fn load_digest(&self, ctx: &mut Context<F>, digest: &HashOut) -> Result<Self::Digest>;

    /// Leaf hash of canonical inner field elements. Short inputs are packed without
    /// running the permutation.
    fn hash_or_noop(&self, ctx: &mut Context<F>, inputs: &[AssignedValue<F>]) -> Self::Digest;

    fn two_to_one(
        &self,
        ctx: &mut Context<F>,
        left: &Self::Digest,
        right: &Self::Digest,
    ) -> Self::Digest;

    /// `a` when `bit = 1`, `b` otherwise.
    fn select(
        &self,
        ctx: &mut Context<F>,
        bit: AssignedValue<F>,
        a: &Self::Digest,
        b: &Self::Digest,
    ) -> Self::Digest;

    fn constrain_equal(&self, ctx: &mut Context<F>, a: &Self::Digest, b: &Self::Digest);

    /// Canonical inner field encoding of a digest, as observed by the challenger.
    fn to_goldilocks(&self, ctx: &mut Context<F>, digest: &Self::Digest) -> Vec<AssignedValue<F>>;

    /// Raw cells of a digest, for exposing it as public instances.
    fn to_cells(digest: &Self::Digest) -> Vec<AssignedValue<F>>;
}

use std::marker::PhantomData;

use halo2_base::{utils::BigPrimeField, AssignedValue, Context};

use crate::error::{Result, VerifierError};
use crate::hash::MerkleHasherChip;

// MERKLE TREE CHIP
// =========================================================================

pub struct MerkleTreeChip<F: BigPrimeField, H: MerkleHasherChip<F>> {
    _marker: PhantomData<(F, H)>,
}

impl<F: BigPrimeField, H: MerkleHasherChip<F>> MerkleTreeChip<F, H> {
    /// Selects `values[index]` with a binary tree of 2-way selects, least significant bit
    /// first. `values.len()` must be `2^bits.len()`.
    pub fn random_access(
        ctx: &mut Context<F>,
        hasher_chip: &H,
        bits: &[AssignedValue<F>],
        values: &[H::Digest],
    ) -> Result<H::Digest> {
        VerifierError::ensure_len("merkle cap", 1 << bits.len(), values.len())?;
        let mut nodes = values.to_vec();
        for bit in bits {
            nodes = nodes
                .chunks(2)
                .map(|pair| hasher_chip.select(ctx, *bit, &pair[1], &pair[0]))
                .collect();
        }
        Ok(nodes[0])
    }

    /// Hashes `leaf_data` and walks the sibling path, then checks the result against the cap
    /// entry picked by `cap_index_bits`. `leaf_index_bits` holds at least one bit per sibling,
    /// the lowest bit deciding the first level.
    pub fn verify_merkle_proof_to_cap(
        ctx: &mut Context<F>,
        hasher_chip: &H,
        leaf_data: &[AssignedValue<F>],
        leaf_index_bits: &[AssignedValue<F>],
        cap_index_bits: &[AssignedValue<F>],
        merkle_cap: &[H::Digest],
        siblings: &[H::Digest],
    ) -> Result<()> {
        if leaf_index_bits.len() < siblings.len() {
            return Err(VerifierError::shape(
                "merkle proof siblings",
                leaf_index_bits.len(),
                siblings.len(),
            ));
        }

        let mut digest = hasher_chip.hash_or_noop(ctx, leaf_data);
        for (bit, sibling) in leaf_index_bits.iter().zip(siblings) {
            let left = hasher_chip.select(ctx, *bit, sibling, &digest);
            let right = hasher_chip.select(ctx, *bit, &digest, sibling);
            digest = hasher_chip.two_to_one(ctx, &left, &right);
        }

        let cap_entry = Self::random_access(ctx, hasher_chip, cap_index_bits, merkle_cap)?;
        hasher_chip.constrain_equal(ctx, &digest, &cap_entry);
        Ok(())
    }
}

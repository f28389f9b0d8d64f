use halo2_base::{utils::BigPrimeField, AssignedValue, Context};

use crate::error::Result;
use crate::fields::{AssignedExtensionValue, ExtensionFieldChip, GoldilocksExt};
use crate::fri::FriOpenings;
use crate::hash::{HashOut, MerkleHasherChip};
use crate::types::{
    FriInitialTreeProof, FriProof, FriQueryRound, FriQueryStep, OpeningSet, Proof,
    ProofWithPublicInputs, VerifierOnlyCircuitData,
};

// ASSIGNED PROOF
// =========================================================================

pub struct AssignedOpeningSet<F: BigPrimeField> {
    pub constants: Vec<AssignedExtensionValue<F>>,
    pub plonk_sigmas: Vec<AssignedExtensionValue<F>>,
    pub wires: Vec<AssignedExtensionValue<F>>,
    pub plonk_zs: Vec<AssignedExtensionValue<F>>,
    pub plonk_zs_next: Vec<AssignedExtensionValue<F>>,
    pub partial_products: Vec<AssignedExtensionValue<F>>,
    pub quotient_polys: Vec<AssignedExtensionValue<F>>,
}

impl<F: BigPrimeField> AssignedOpeningSet<F> {
    /// The batch at `zeta` in oracle order, then the `Z`s at `g * zeta`.
    pub fn to_fri_openings(&self) -> FriOpenings<F> {
        let zeta_batch = [
            &self.constants,
            &self.plonk_sigmas,
            &self.wires,
            &self.plonk_zs,
            &self.partial_products,
            &self.quotient_polys,
        ]
        .into_iter()
        .flatten()
        .copied()
        .collect();
        vec![zeta_batch, self.plonk_zs_next.clone()]
    }
}

pub struct AssignedFriInitialTreeProof<F: BigPrimeField, H: MerkleHasherChip<F>> {
    /// Leaf values and sibling path, one entry per committed oracle.
    pub evals_proofs: Vec<(Vec<AssignedValue<F>>, Vec<H::Digest>)>,
}

pub struct AssignedFriQueryStep<F: BigPrimeField, H: MerkleHasherChip<F>> {
    pub evals: Vec<AssignedExtensionValue<F>>,
    pub siblings: Vec<H::Digest>,
}

pub struct AssignedFriQueryRound<F: BigPrimeField, H: MerkleHasherChip<F>> {
    pub initial_trees_proof: AssignedFriInitialTreeProof<F, H>,
    pub steps: Vec<AssignedFriQueryStep<F, H>>,
}

pub struct AssignedFriProof<F: BigPrimeField, H: MerkleHasherChip<F>> {
    pub commit_phase_merkle_caps: Vec<Vec<H::Digest>>,
    pub query_round_proofs: Vec<AssignedFriQueryRound<F, H>>,
    pub final_poly: Vec<AssignedExtensionValue<F>>,
    pub pow_witness: AssignedValue<F>,
}

pub struct AssignedProof<F: BigPrimeField, H: MerkleHasherChip<F>> {
    pub wires_cap: Vec<H::Digest>,
    pub plonk_zs_partial_products_cap: Vec<H::Digest>,
    pub quotient_polys_cap: Vec<H::Digest>,
    pub openings: AssignedOpeningSet<F>,
    pub opening_proof: AssignedFriProof<F, H>,
}

pub struct AssignedProofWithPublicInputs<F: BigPrimeField, H: MerkleHasherChip<F>> {
    pub proof: AssignedProof<F, H>,
    pub public_inputs: Vec<AssignedValue<F>>,
}

pub struct AssignedVerifierOnlyData<F: BigPrimeField, H: MerkleHasherChip<F>> {
    pub constants_sigmas_cap: Vec<H::Digest>,
    pub circuit_digest: H::Digest,
}

// ASSIGNMENT INSTRUCTIONS
// =========================================================================

/// Loads a native container into the circuit. Every inner field value is range checked to
/// be canonical; digests are loaded by the Merkle hasher.
pub trait AssignWitness<F: BigPrimeField, H: MerkleHasherChip<F>> {
    type Assigned;

    fn assign(
        &self,
        ctx: &mut Context<F>,
        extension: &ExtensionFieldChip<F>,
        hasher: &H,
    ) -> Result<Self::Assigned>;
}

fn assign_digests<F: BigPrimeField, H: MerkleHasherChip<F>>(
    ctx: &mut Context<F>,
    hasher: &H,
    digests: &[HashOut],
) -> Result<Vec<H::Digest>> {
    digests
        .iter()
        .map(|digest| hasher.load_digest(ctx, digest))
        .collect()
}

fn assign_extensions<F: BigPrimeField>(
    ctx: &mut Context<F>,
    extension: &ExtensionFieldChip<F>,
    values: &[GoldilocksExt],
) -> Vec<AssignedExtensionValue<F>> {
    values
        .iter()
        .map(|value| extension.load_canonical(ctx, *value))
        .collect()
}

impl<F: BigPrimeField, H: MerkleHasherChip<F>> AssignWitness<F, H> for OpeningSet {
    type Assigned = AssignedOpeningSet<F>;

    fn assign(
        &self,
        ctx: &mut Context<F>,
        extension: &ExtensionFieldChip<F>,
        _hasher: &H,
    ) -> Result<Self::Assigned> {
        Ok(AssignedOpeningSet {
            constants: assign_extensions(ctx, extension, &self.constants),
            plonk_sigmas: assign_extensions(ctx, extension, &self.plonk_sigmas),
            wires: assign_extensions(ctx, extension, &self.wires),
            plonk_zs: assign_extensions(ctx, extension, &self.plonk_zs),
            plonk_zs_next: assign_extensions(ctx, extension, &self.plonk_zs_next),
            partial_products: assign_extensions(ctx, extension, &self.partial_products),
            quotient_polys: assign_extensions(ctx, extension, &self.quotient_polys),
        })
    }
}

impl<F: BigPrimeField, H: MerkleHasherChip<F>> AssignWitness<F, H> for FriInitialTreeProof {
    type Assigned = AssignedFriInitialTreeProof<F, H>;

    fn assign(
        &self,
        ctx: &mut Context<F>,
        extension: &ExtensionFieldChip<F>,
        hasher: &H,
    ) -> Result<Self::Assigned> {
        let gl = extension.goldilocks();
        let evals_proofs = self
            .evals_proofs
            .iter()
            .map(|(leaf, merkle_proof)| {
                let leaf = leaf.iter().map(|x| gl.load_canonical(ctx, *x)).collect();
                let siblings = assign_digests(ctx, hasher, &merkle_proof.siblings)?;
                Ok((leaf, siblings))
            })
            .collect::<Result<_>>()?;
        Ok(AssignedFriInitialTreeProof { evals_proofs })
    }
}

impl<F: BigPrimeField, H: MerkleHasherChip<F>> AssignWitness<F, H> for FriQueryStep {
    type Assigned = AssignedFriQueryStep<F, H>;

    fn assign(
        &self,
        ctx: &mut Context<F>,
        extension: &ExtensionFieldChip<F>,
        hasher: &H,
    ) -> Result<Self::Assigned> {
        Ok(AssignedFriQueryStep {
            evals: assign_extensions(ctx, extension, &self.evals),
            siblings: assign_digests(ctx, hasher, &self.merkle_proof.siblings)?,
        })
    }
}

impl<F: BigPrimeField, H: MerkleHasherChip<F>> AssignWitness<F, H> for FriQueryRound {
    type Assigned = AssignedFriQueryRound<F, H>;

    fn assign(
        &self,
        ctx: &mut Context<F>,
        extension: &ExtensionFieldChip<F>,
        hasher: &H,
    ) -> Result<Self::Assigned> {
        let initial_trees_proof = self.initial_trees_proof.assign(ctx, extension, hasher)?;
        let steps = self
            .steps
            .iter()
            .map(|step| step.assign(ctx, extension, hasher))
            .collect::<Result<_>>()?;
        Ok(AssignedFriQueryRound {
            initial_trees_proof,
            steps,
        })
    }
}

impl<F: BigPrimeField, H: MerkleHasherChip<F>> AssignWitness<F, H> for FriProof {
    type Assigned = AssignedFriProof<F, H>;

    fn assign(
        &self,
        ctx: &mut Context<F>,
        extension: &ExtensionFieldChip<F>,
        hasher: &H,
    ) -> Result<Self::Assigned> {
        let commit_phase_merkle_caps = self
            .commit_phase_merkle_caps
            .iter()
            .map(|cap| assign_digests(ctx, hasher, cap))
            .collect::<Result<_>>()?;
        let query_round_proofs = self
            .query_round_proofs
            .iter()
            .map(|round| round.assign(ctx, extension, hasher))
            .collect::<Result<_>>()?;
        Ok(AssignedFriProof {
            commit_phase_merkle_caps,
            query_round_proofs,
            final_poly: assign_extensions(ctx, extension, &self.final_poly),
            pow_witness: extension.goldilocks().load_canonical(ctx, self.pow_witness),
        })
    }
}

impl<F: BigPrimeField, H: MerkleHasherChip<F>> AssignWitness<F, H> for Proof {
    type Assigned = AssignedProof<F, H>;

    fn assign(
        &self,
        ctx: &mut Context<F>,
        extension: &ExtensionFieldChip<F>,
        hasher: &H,
    ) -> Result<Self::Assigned> {
        Ok(AssignedProof {
            wires_cap: assign_digests(ctx, hasher, &self.wires_cap)?,
            plonk_zs_partial_products_cap: assign_digests(ctx, hasher, &self.plonk_zs_partial_products_cap)?,
            quotient_polys_cap: assign_digests(ctx, hasher, &self.quotient_polys_cap)?,
            openings: AssignWitness::<F, H>::assign(&self.openings, ctx, extension, hasher)?,
            opening_proof: self.opening_proof.assign(ctx, extension, hasher)?,
        })
    }
}

impl<F: BigPrimeField, H: MerkleHasherChip<F>> AssignWitness<F, H> for ProofWithPublicInputs {
    type Assigned = AssignedProofWithPublicInputs<F, H>;

    fn assign(
        &self,
        ctx: &mut Context<F>,
        extension: &ExtensionFieldChip<F>,
        hasher: &H,
    ) -> Result<Self::Assigned> {
        let gl = extension.goldilocks();
        let public_inputs = self
            .public_inputs
            .iter()
            .map(|x| gl.load_canonical(ctx, *x))
            .collect();
        Ok(AssignedProofWithPublicInputs {
            proof: self.proof.assign(ctx, extension, hasher)?,
            public_inputs,
        })
    }
}

impl<F: BigPrimeField, H: MerkleHasherChip<F>> AssignWitness<F, H> for VerifierOnlyCircuitData {
    type Assigned = AssignedVerifierOnlyData<F, H>;

    fn assign(
        &self,
        ctx: &mut Context<F>,
        _extension: &ExtensionFieldChip<F>,
        hasher: &H,
    ) -> Result<Self::Assigned> {
        Ok(AssignedVerifierOnlyData {
            constants_sigmas_cap: assign_digests(ctx, hasher, &self.constants_sigmas_cap)?,
            circuit_digest: hasher.load_digest(ctx, &self.circuit_digest)?,
        })
    }
}

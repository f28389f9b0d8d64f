use halo2_base::{utils::BigPrimeField, AssignedValue, Context};
use log::{debug, info};

use crate::challenger::ChallengerChip;
use crate::error::Result;
use crate::fields::ExtensionFieldChip;
use crate::fri::{fri_instance, FriVerifierChip};
use crate::hash::{MerkleHasherChip, PoseidonGoldilocksChip};
use crate::plonk::{PlonkVerifierChip, ProofChallenges};
use crate::types::{CircuitDescription, ProofWithPublicInputs, VerifierOnlyCircuitData};
use crate::witness::{AssignWitness, AssignedProofWithPublicInputs, AssignedVerifierOnlyData};

/// The cells a verified proof is bound to.
pub struct VerifiedStatement<F: BigPrimeField, H: MerkleHasherChip<F>> {
    pub public_inputs: Vec<AssignedValue<F>>,
    pub circuit_digest: H::Digest,
    pub constants_sigmas_cap: Vec<H::Digest>,
}

impl<F: BigPrimeField, H: MerkleHasherChip<F>> VerifiedStatement<F, H> {
    /// Public inputs, then the circuit digest, then the constants and sigmas cap.
    pub fn instances(&self) -> Vec<AssignedValue<F>> {
        let mut cells = self.public_inputs.clone();
        cells.extend(H::to_cells(&self.circuit_digest));
        for digest in &self.constants_sigmas_cap {
            cells.extend(H::to_cells(digest));
        }
        cells
    }
}

// VERIFIER CHIP
// =========================================================================

/// Verifies a plonky2 proof of the circuit described by `description`, with `hasher` as the
/// Merkle hash of the proof's commitments.
pub struct VerifierChip<'a, F: BigPrimeField, H: MerkleHasherChip<F>> {
    description: &'a CircuitDescription,
    extension: ExtensionFieldChip<F>,
    poseidon: PoseidonGoldilocksChip<F>,
    hasher: H,
}

impl<'a, F: BigPrimeField, H: MerkleHasherChip<F>> VerifierChip<'a, F, H> {
    pub fn new(extension: ExtensionFieldChip<F>, hasher: H, description: &'a CircuitDescription) -> Result<Self> {
        description.validate()?;
        Ok(Self {
            description,
            poseidon: PoseidonGoldilocksChip::new(extension.clone()),
            extension,
            hasher,
        })
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Checks the proof's shape, loads it and verifies it. Returns the cells of the verified
    /// statement so the caller can expose them.
    pub fn verify(
        &self,
        ctx: &mut Context<F>,
        proof_with_pis: &ProofWithPublicInputs,
        verifier_data: &VerifierOnlyCircuitData,
    ) -> Result<VerifiedStatement<F, H>> {
        proof_with_pis.validate_shape(self.description)?;
        verifier_data.validate_shape(self.description)?;

        let proof = proof_with_pis.assign(ctx, &self.extension, &self.hasher)?;
        let data = verifier_data.assign(ctx, &self.extension, &self.hasher)?;
        debug!("assigned proof witness, {} advice cells so far", ctx.advice.len());

        self.verify_assigned(ctx, &proof, &data)?;
        Ok(VerifiedStatement {
            public_inputs: proof.public_inputs,
            circuit_digest: data.circuit_digest,
            constants_sigmas_cap: data.constants_sigmas_cap,
        })
    }

    pub fn verify_assigned(
        &self,
        ctx: &mut Context<F>,
        proof_with_pis: &AssignedProofWithPublicInputs<F, H>,
        verifier_data: &AssignedVerifierOnlyData<F, H>,
    ) -> Result<()> {
        let public_inputs_hash = self.get_public_inputs_hash(ctx, &proof_with_pis.public_inputs);
        let challenges = self.get_challenges(ctx, proof_with_pis, public_inputs_hash, verifier_data);
        info!(
            "derived challenges: {} PLONK repetitions, {} FRI queries",
            challenges.plonk_alphas.len(),
            challenges.fri_challenges.fri_query_indices.len()
        );

        let proof = &proof_with_pis.proof;
        let plonk = PlonkVerifierChip::new(self.extension.clone(), self.description)?;
        plonk.verify(ctx, &challenges, &proof.openings, public_inputs_hash)?;

        let instance = fri_instance(ctx, &self.extension, self.description, &challenges.plonk_zeta);
        let initial_merkle_caps = [
            &verifier_data.constants_sigmas_cap,
            &proof.wires_cap,
            &proof.plonk_zs_partial_products_cap,
            &proof.quotient_polys_cap,
        ]
        .map(Clone::clone);
        let fri = FriVerifierChip::new(self.extension.clone(), &self.hasher, &self.description.fri_params)?;
        fri.verify_fri_proof(
            ctx,
            &instance,
            &proof.openings.to_fri_openings(),
            &challenges.fri_challenges,
            &initial_merkle_caps,
            &proof.opening_proof,
        )?;
        info!("emitted plonky2 verifier, {} advice cells", ctx.advice.len());
        Ok(())
    }

    pub fn get_public_inputs_hash(&self, ctx: &mut Context<F>, public_inputs: &[AssignedValue<F>]) -> [AssignedValue<F>; 4] {
        self.poseidon.hash_no_pad(ctx, public_inputs)
    }

    /// Replays the prover's transcript.
    pub fn get_challenges(
        &self,
        ctx: &mut Context<F>,
        proof_with_pis: &AssignedProofWithPublicInputs<F, H>,
        public_inputs_hash: [AssignedValue<F>; 4],
        verifier_data: &AssignedVerifierOnlyData<F, H>,
    ) -> ProofChallenges<F> {
        let proof = &proof_with_pis.proof;
        let num_challenges = self.description.num_challenges();
        let mut challenger = ChallengerChip::new(ctx, self.poseidon.clone());

        challenger.observe_hash(ctx, &self.hasher, &verifier_data.circuit_digest);
        challenger.observe_elements(ctx, &public_inputs_hash);

        challenger.observe_cap(ctx, &self.hasher, &proof.wires_cap);
        let plonk_betas = challenger.get_n_challenges(ctx, num_challenges);
        let plonk_gammas = challenger.get_n_challenges(ctx, num_challenges);

        challenger.observe_cap(ctx, &self.hasher, &proof.plonk_zs_partial_products_cap);
        let plonk_alphas = challenger.get_n_challenges(ctx, num_challenges);

        challenger.observe_cap(ctx, &self.hasher, &proof.quotient_polys_cap);
        let plonk_zeta = challenger.get_extension_challenge(ctx);

        challenger.observe_openings(ctx, &proof.openings.to_fri_openings());

        let fri = &proof.opening_proof;
        let fri_challenges = challenger.get_fri_challenges(
            ctx,
            &self.hasher,
            &fri.commit_phase_merkle_caps,
            &fri.final_poly,
            fri.pow_witness,
            self.description.fri_params.config.num_query_rounds,
        );

        ProofChallenges {
            plonk_betas,
            plonk_gammas,
            plonk_alphas,
            plonk_zeta,
            fri_challenges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{goldilocks_of, Goldilocks, GoldilocksExt};
    use crate::hash::HashOut;
    use crate::tests::{init, mock_run, MockChips, Plonky2Fixture, PLONKY2_FIXTURE, SINGLE_QUERY_FIXTURE};
    use halo2_base::halo2_proofs::halo2curves::bn256::Fr;
    use plonky2::field::types::{Field, Field64};
    use plonky2::plonk::config::{GenericConfig, Hasher};

    type NativeConfig = crate::tests::FixtureConfig;

    fn convert(native: &Plonky2Fixture) -> (CircuitDescription, ProofWithPublicInputs, VerifierOnlyCircuitData) {
        (
            CircuitDescription::try_from(&native.common).unwrap(),
            ProofWithPublicInputs::try_from(&native.proof).unwrap(),
            VerifierOnlyCircuitData::from(&native.verifier_only),
        )
    }

    fn fixture() -> (CircuitDescription, ProofWithPublicInputs, VerifierOnlyCircuitData) {
        convert(&PLONKY2_FIXTURE)
    }

    fn verify_single_query(proof: &ProofWithPublicInputs) -> bool {
        let (description, _, data) = convert(&SINGLE_QUERY_FIXTURE);
        mock_run(20, 19, |ctx, chips: &MockChips<Fr>| {
            let hasher = chips.poseidon_goldilocks.clone();
            let verifier = VerifierChip::new(chips.extension.clone(), hasher, &description).unwrap();
            verifier.verify(ctx, proof, &data).unwrap();
        })
    }

    fn to_native(cells: &[AssignedValue<Fr>]) -> Vec<Goldilocks> {
        cells.iter().map(|c| goldilocks_of(c.value())).collect()
    }

    #[test]
    fn test_challenges_match_native() {
        init();
        let (description, proof, data) = fixture();
        let native = &PLONKY2_FIXTURE;
        let expected = native
            .proof
            .get_challenges(
                native.proof.get_public_inputs_hash(),
                &native.verifier_only.circuit_digest,
                &native.common,
            )
            .unwrap();
        let expected_pi_hash = <NativeConfig as GenericConfig<2>>::InnerHasher::hash_no_pad(&native.proof.public_inputs);

        assert!(mock_run(20, 19, |ctx, chips: &MockChips<Fr>| {
            let hasher = chips.poseidon_goldilocks.clone();
            let verifier = VerifierChip::new(chips.extension.clone(), hasher, &description).unwrap();
            let assigned = proof.assign(ctx, &chips.extension, verifier.hasher()).unwrap();
            let assigned_data = data.assign(ctx, &chips.extension, verifier.hasher()).unwrap();

            let pi_hash = verifier.get_public_inputs_hash(ctx, &assigned.public_inputs);
            assert_eq!(to_native(&pi_hash), expected_pi_hash.elements.to_vec());

            let challenges = verifier.get_challenges(ctx, &assigned, pi_hash, &assigned_data);
            assert_eq!(to_native(&challenges.plonk_betas), expected.plonk_betas);
            assert_eq!(to_native(&challenges.plonk_gammas), expected.plonk_gammas);
            assert_eq!(to_native(&challenges.plonk_alphas), expected.plonk_alphas);
            assert_eq!(challenges.plonk_zeta.value(), expected.plonk_zeta);

            let fri = &challenges.fri_challenges;
            assert_eq!(fri.fri_alpha.value(), expected.fri_challenges.fri_alpha);
            let betas = fri.fri_betas.iter().map(|b| b.value()).collect::<Vec<_>>();
            assert_eq!(betas, expected.fri_challenges.fri_betas);
            assert_eq!(
                goldilocks_of(fri.fri_pow_response.value()),
                expected.fri_challenges.fri_pow_response
            );
            let lde_size = description.fri_params.lde_size() as u64;
            let indices = to_native(&fri.fri_query_indices)
                .iter()
                .map(|i| (i.0 % lde_size) as usize)
                .collect::<Vec<_>>();
            assert_eq!(indices, expected.fri_challenges.fri_query_indices);
        }));
    }

    #[test]
    fn test_plonk_identity_on_fixture() {
        init();
        let (description, proof, data) = fixture();
        assert!(mock_run(20, 19, |ctx, chips: &MockChips<Fr>| {
            let hasher = chips.poseidon_goldilocks.clone();
            let verifier = VerifierChip::new(chips.extension.clone(), hasher, &description).unwrap();
            let assigned = proof.assign(ctx, &chips.extension, verifier.hasher()).unwrap();
            let assigned_data = data.assign(ctx, &chips.extension, verifier.hasher()).unwrap();
            let pi_hash = verifier.get_public_inputs_hash(ctx, &assigned.public_inputs);
            let challenges = verifier.get_challenges(ctx, &assigned, pi_hash, &assigned_data);

            let plonk = PlonkVerifierChip::new(chips.extension.clone(), &description).unwrap();
            plonk
                .verify(ctx, &challenges, &assigned.proof.openings, pi_hash)
                .unwrap();
        }));
    }

    #[test]
    fn test_plonk_identity_rejects_tampered_quotient() {
        init();
        let (description, mut proof, data) = fixture();
        let quotient = &mut proof.proof.openings.quotient_polys[0];
        *quotient += GoldilocksExt::ONE;
        assert!(!mock_run(20, 19, |ctx, chips: &MockChips<Fr>| {
            let hasher = chips.poseidon_goldilocks.clone();
            let verifier = VerifierChip::new(chips.extension.clone(), hasher, &description).unwrap();
            let assigned = proof.assign(ctx, &chips.extension, verifier.hasher()).unwrap();
            let assigned_data = data.assign(ctx, &chips.extension, verifier.hasher()).unwrap();
            let pi_hash = verifier.get_public_inputs_hash(ctx, &assigned.public_inputs);
            let challenges = verifier.get_challenges(ctx, &assigned, pi_hash, &assigned_data);
            let plonk = PlonkVerifierChip::new(chips.extension.clone(), &description).unwrap();
            plonk
                .verify(ctx, &challenges, &assigned.proof.openings, pi_hash)
                .unwrap();
        }));
    }

    #[test]
    fn test_verify_rejects_malformed_proof() {
        init();
        let (description, mut proof, data) = fixture();
        proof.proof.opening_proof.final_poly.pop();
        assert!(mock_run(12, 11, |ctx, chips: &MockChips<Fr>| {
            let hasher = chips.poseidon_goldilocks.clone();
            let verifier = VerifierChip::new(chips.extension.clone(), hasher, &description).unwrap();
            assert!(verifier.verify(ctx, &proof, &data).is_err());
        }));
    }

    #[test]
    fn test_verify_single_query_proof() {
        init();
        let (_, proof, _) = convert(&SINGLE_QUERY_FIXTURE);
        assert!(verify_single_query(&proof));
    }

    #[test]
    fn test_verify_rejects_tampered_merkle_sibling() {
        init();
        let (_, mut proof, _) = convert(&SINGLE_QUERY_FIXTURE);
        let step = &mut proof.proof.opening_proof.query_round_proofs[0].steps[0];
        match step.merkle_proof.siblings.first_mut() {
            Some(HashOut::Goldilocks { elements }) => elements[0] = (elements[0] + 1) % Goldilocks::ORDER,
            other => panic!("expected a Goldilocks sibling, got {other:?}"),
        }
        assert!(!verify_single_query(&proof));
    }

    #[test]
    fn test_verify_rejects_tampered_final_poly() {
        init();
        let (_, mut proof, _) = convert(&SINGLE_QUERY_FIXTURE);
        proof.proof.opening_proof.final_poly[0] += GoldilocksExt::ONE;
        assert!(!verify_single_query(&proof));
    }

    #[test]
    #[ignore = "full verifier MockProver run, needs several GB of memory"]
    fn test_verify_fixture() {
        init();
        let (description, proof, data) = fixture();
        assert!(mock_run(21, 20, |ctx, chips: &MockChips<Fr>| {
            let hasher = chips.poseidon_goldilocks.clone();
            let verifier = VerifierChip::new(chips.extension.clone(), hasher, &description).unwrap();
            let statement = verifier.verify(ctx, &proof, &data).unwrap();
            assert_eq!(statement.instances().len(), proof.public_inputs.len() + 4 + 4 * data.constants_sigmas_cap.len());
        }));
    }
}

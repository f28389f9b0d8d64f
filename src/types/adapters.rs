//! Conversions from plonky2's own circuit data and proofs, for proofs made with
//! `PoseidonGoldilocksConfig`.

use plonky2::{
    field::types::PrimeField64,
    gates::gate::Gate as _,
    hash::{hash_types::HashOut as NativeHashOut, merkle_proofs, merkle_tree, poseidon::PoseidonHash},
    plonk::{circuit_data, config::PoseidonGoldilocksConfig, proof},
};

use super::{
    CircuitConfig, CircuitDescription, FriConfig, FriInitialTreeProof, FriParams, FriProof,
    FriQueryRound, FriQueryStep, MerkleCap, MerkleProof, OpeningSet, Proof, ProofWithPublicInputs,
    VerifierOnlyCircuitData,
};
use crate::error::{Result, VerifierError};
use crate::fields::Goldilocks;
use crate::gates::{Gate, SelectorsInfo};
use crate::hash::HashOut;
use crate::D;

type NativeConfig = PoseidonGoldilocksConfig;

fn convert_hash(hash: &NativeHashOut<Goldilocks>) -> HashOut {
    HashOut::Goldilocks {
        elements: hash.elements.map(|e| e.to_canonical_u64()),
    }
}

fn convert_cap(cap: &merkle_tree::MerkleCap<Goldilocks, PoseidonHash>) -> MerkleCap {
    cap.0.iter().map(convert_hash).collect()
}

fn convert_merkle_proof(proof: &merkle_proofs::MerkleProof<Goldilocks, PoseidonHash>) -> MerkleProof {
    MerkleProof {
        siblings: proof.siblings.iter().map(convert_hash).collect(),
    }
}

fn convert_fri_config(config: &plonky2::fri::FriConfig) -> FriConfig {
    FriConfig {
        rate_bits: config.rate_bits,
        cap_height: config.cap_height,
        proof_of_work_bits: config.proof_of_work_bits,
        num_query_rounds: config.num_query_rounds,
    }
}

impl TryFrom<&circuit_data::CommonCircuitData<Goldilocks, D>> for CircuitDescription {
    type Error = VerifierError;

    fn try_from(common: &circuit_data::CommonCircuitData<Goldilocks, D>) -> Result<Self> {
        let gates = common
            .gates
            .iter()
            .map(|gate| gate.0.id().parse::<Gate>())
            .collect::<Result<Vec<_>>>()?;
        // The selector fields are crate private upstream, its serde form is the public one.
        let selectors_info: SelectorsInfo =
            serde_json::from_value(serde_json::to_value(&common.selectors_info)?)?;

        let config = &common.config;
        let description = Self {
            config: CircuitConfig {
                num_wires: config.num_wires,
                num_routed_wires: config.num_routed_wires,
                num_constants: config.num_constants,
                num_challenges: config.num_challenges,
                zero_knowledge: config.zero_knowledge,
                max_quotient_degree_factor: config.max_quotient_degree_factor,
                fri_config: convert_fri_config(&config.fri_config),
            },
            fri_params: FriParams {
                config: convert_fri_config(&common.fri_params.config),
                hiding: common.fri_params.hiding,
                degree_bits: common.fri_params.degree_bits,
                reduction_arity_bits: common.fri_params.reduction_arity_bits.clone(),
            },
            gates,
            selectors_info,
            quotient_degree_factor: common.quotient_degree_factor,
            num_gate_constraints: common.num_gate_constraints,
            num_constants: common.num_constants,
            num_public_inputs: common.num_public_inputs,
            k_is: common.k_is.iter().map(|k| k.to_canonical_u64()).collect(),
            num_partial_products: common.num_partial_products,
            num_lookup_polys: common.num_lookup_polys,
        };
        description.validate()?;
        Ok(description)
    }
}

impl From<&circuit_data::VerifierOnlyCircuitData<NativeConfig, D>> for VerifierOnlyCircuitData {
    fn from(data: &circuit_data::VerifierOnlyCircuitData<NativeConfig, D>) -> Self {
        Self {
            constants_sigmas_cap: convert_cap(&data.constants_sigmas_cap),
            circuit_digest: convert_hash(&data.circuit_digest),
        }
    }
}

impl TryFrom<&proof::ProofWithPublicInputs<Goldilocks, NativeConfig, D>> for ProofWithPublicInputs {
    type Error = VerifierError;

    fn try_from(native: &proof::ProofWithPublicInputs<Goldilocks, NativeConfig, D>) -> Result<Self> {
        let proof = &native.proof;
        let openings = &proof.openings;
        if !openings.lookup_zs.is_empty() || !openings.lookup_zs_next.is_empty() {
            return Err(VerifierError::Unsupported("lookup openings".into()));
        }

        let fri = &proof.opening_proof;
        let opening_proof = FriProof {
            commit_phase_merkle_caps: fri.commit_phase_merkle_caps.iter().map(convert_cap).collect(),
            query_round_proofs: fri
                .query_round_proofs
                .iter()
                .map(|round| FriQueryRound {
                    initial_trees_proof: FriInitialTreeProof {
                        evals_proofs: round
                            .initial_trees_proof
                            .evals_proofs
                            .iter()
                            .map(|(evals, merkle_proof)| (evals.clone(), convert_merkle_proof(merkle_proof)))
                            .collect(),
                    },
                    steps: round
                        .steps
                        .iter()
                        .map(|step| FriQueryStep {
                            evals: step.evals.clone(),
                            merkle_proof: convert_merkle_proof(&step.merkle_proof),
                        })
                        .collect(),
                })
                .collect(),
            final_poly: fri.final_poly.coeffs.clone(),
            pow_witness: fri.pow_witness,
        };

        Ok(Self {
            proof: Proof {
                wires_cap: convert_cap(&proof.wires_cap),
                plonk_zs_partial_products_cap: convert_cap(&proof.plonk_zs_partial_products_cap),
                quotient_polys_cap: convert_cap(&proof.quotient_polys_cap),
                openings: OpeningSet {
                    constants: openings.constants.clone(),
                    plonk_sigmas: openings.plonk_sigmas.clone(),
                    wires: openings.wires.clone(),
                    plonk_zs: openings.plonk_zs.clone(),
                    plonk_zs_next: openings.plonk_zs_next.clone(),
                    partial_products: openings.partial_products.clone(),
                    quotient_polys: openings.quotient_polys.clone(),
                },
                opening_proof,
            },
            public_inputs: native.public_inputs.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{init, PLONKY2_FIXTURE};

    #[test]
    fn test_gate_ids_roundtrip() {
        init();
        let common = &PLONKY2_FIXTURE.common;
        let description = CircuitDescription::try_from(common).unwrap();
        assert_eq!(description.gates.len(), common.gates.len());
        for (gate, native) in description.gates.iter().zip(&common.gates) {
            assert_eq!(gate.to_string(), native.0.id());
        }
        assert_eq!(description.selectors_info.selector_indices.len(), common.gates.len());
        assert_eq!(description.selectors_info.num_selectors(), common.selectors_info.num_selectors());
    }

    #[test]
    fn test_digests_are_canonical() {
        init();
        let data = VerifierOnlyCircuitData::from(&PLONKY2_FIXTURE.verifier_only);
        let HashOut::Goldilocks { elements } = data.circuit_digest else {
            panic!("expected a Goldilocks digest");
        };
        let native = PLONKY2_FIXTURE.verifier_only.circuit_digest.elements;
        assert_eq!(elements, native.map(|e| e.to_canonical_u64()));
    }
}

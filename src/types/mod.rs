use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifierError};
use crate::fields::{Goldilocks, GoldilocksExt, TWO_ADICITY};
use crate::gates::{Gate, SelectorsInfo};
use crate::hash::HashOut;

mod adapters;

/// FRI folding arity supported by the in-circuit verifier.
pub const SUPPORTED_ARITY_BITS: usize = 4;

// CIRCUIT DESCRIPTION
// =========================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriConfig {
    pub rate_bits: usize,
    pub cap_height: usize,
    pub proof_of_work_bits: u32,
    pub num_query_rounds: usize,
}

impl FriConfig {
    pub fn rate(&self) -> f64 {
        1.0 / ((1u64 << self.rate_bits) as f64)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriParams {
    pub config: FriConfig,
    pub hiding: bool,
    pub degree_bits: usize,
    pub reduction_arity_bits: Vec<usize>,
}

impl FriParams {
    pub fn total_arities(&self) -> usize {
        self.reduction_arity_bits.iter().sum()
    }

    pub fn lde_bits(&self) -> usize {
        self.degree_bits + self.config.rate_bits
    }

    pub fn lde_size(&self) -> usize {
        1 << self.lde_bits()
    }

    pub fn final_poly_bits(&self) -> usize {
        self.degree_bits - self.total_arities()
    }

    pub fn final_poly_len(&self) -> usize {
        1 << self.final_poly_bits()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub num_wires: usize,
    pub num_routed_wires: usize,
    pub num_constants: usize,
    pub num_challenges: usize,
    pub zero_knowledge: bool,
    pub max_quotient_degree_factor: usize,
    pub fri_config: FriConfig,
}

/// Everything about the verified circuit that is fixed before a proof exists. Read only;
/// every chip of a verification session borrows the same description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitDescription {
    pub config: CircuitConfig,
    pub fri_params: FriParams,
    pub gates: Vec<Gate>,
    pub selectors_info: SelectorsInfo,
    pub quotient_degree_factor: usize,
    pub num_gate_constraints: usize,
    /// Constant polynomials, selectors included.
    pub num_constants: usize,
    pub num_public_inputs: usize,
    /// Coset shifts of the permutation argument, one per routed wire.
    pub k_is: Vec<u64>,
    pub num_partial_products: usize,
    #[serde(default)]
    pub num_lookup_polys: usize,
}

impl CircuitDescription {
    /// Parses a JSON description and checks it describes a circuit this crate can verify.
    pub fn from_json(json: &str) -> Result<Self> {
        let description: Self = serde_json::from_str(json)?;
        description.validate()?;
        Ok(description)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fri_params.hiding {
            return Err(VerifierError::Unsupported("hiding FRI".into()));
        }
        if self.num_lookup_polys != 0 {
            return Err(VerifierError::Unsupported("lookup tables".into()));
        }
        if let Some(bits) = self
            .fri_params
            .reduction_arity_bits
            .iter()
            .find(|bits| **bits != SUPPORTED_ARITY_BITS)
        {
            return Err(VerifierError::Unsupported(format!(
                "FRI reduction arity 2^{bits}, only 2^{SUPPORTED_ARITY_BITS} is supported"
            )));
        }
        if self.fri_params.lde_bits() > TWO_ADICITY {
            return Err(VerifierError::InvalidParameter(format!(
                "LDE size 2^{} exceeds the two-adic subgroup of order 2^{TWO_ADICITY}",
                self.fri_params.lde_bits()
            )));
        }
        if self.fri_params.total_arities() > self.fri_params.degree_bits {
            return Err(VerifierError::InvalidParameter(format!(
                "FRI folds {} bits of a degree 2^{} polynomial",
                self.fri_params.total_arities(),
                self.fri_params.degree_bits
            )));
        }
        if self.fri_params.config.cap_height > self.fri_params.lde_bits() {
            return Err(VerifierError::InvalidParameter(format!(
                "cap height {} exceeds the LDE size 2^{}",
                self.fri_params.config.cap_height,
                self.fri_params.lde_bits()
            )));
        }
        if self.quotient_degree_factor == 0 {
            return Err(VerifierError::InvalidParameter("quotient degree factor is zero".into()));
        }
        if self.k_is.len() < self.config.num_routed_wires {
            return Err(VerifierError::shape("k_is", self.config.num_routed_wires, self.k_is.len()));
        }
        let expected_partial_products =
            (self.config.num_routed_wires + self.quotient_degree_factor - 1) / self.quotient_degree_factor - 1;
        VerifierError::ensure_len("partial products", expected_partial_products, self.num_partial_products)
    }

    pub fn degree_bits(&self) -> usize {
        self.fri_params.degree_bits
    }

    pub fn degree(&self) -> usize {
        1 << self.degree_bits()
    }

    pub fn num_challenges(&self) -> usize {
        self.config.num_challenges
    }

    pub fn num_preprocessed_polys(&self) -> usize {
        self.num_constants + self.config.num_routed_wires
    }

    pub fn num_zs_partial_products_polys(&self) -> usize {
        self.config.num_challenges * (1 + self.num_partial_products)
    }

    pub fn num_quotient_polys(&self) -> usize {
        self.config.num_challenges * self.quotient_degree_factor
    }
}

// PROOF CONTAINERS
// =========================================================================

pub type MerkleCap = Vec<HashOut>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub siblings: Vec<HashOut>,
}

/// Openings of every committed polynomial at `zeta`, plus the `Z`s at `g * zeta`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningSet {
    pub constants: Vec<GoldilocksExt>,
    pub plonk_sigmas: Vec<GoldilocksExt>,
    pub wires: Vec<GoldilocksExt>,
    pub plonk_zs: Vec<GoldilocksExt>,
    pub plonk_zs_next: Vec<GoldilocksExt>,
    pub partial_products: Vec<GoldilocksExt>,
    pub quotient_polys: Vec<GoldilocksExt>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriInitialTreeProof {
    /// Leaf values and authentication path, one entry per committed oracle.
    pub evals_proofs: Vec<(Vec<Goldilocks>, MerkleProof)>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriQueryStep {
    pub evals: Vec<GoldilocksExt>,
    pub merkle_proof: MerkleProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriQueryRound {
    pub initial_trees_proof: FriInitialTreeProof,
    pub steps: Vec<FriQueryStep>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriProof {
    pub commit_phase_merkle_caps: Vec<MerkleCap>,
    pub query_round_proofs: Vec<FriQueryRound>,
    pub final_poly: Vec<GoldilocksExt>,
    pub pow_witness: Goldilocks,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub wires_cap: MerkleCap,
    pub plonk_zs_partial_products_cap: MerkleCap,
    pub quotient_polys_cap: MerkleCap,
    pub openings: OpeningSet,
    pub opening_proof: FriProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofWithPublicInputs {
    pub proof: Proof,
    pub public_inputs: Vec<Goldilocks>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierOnlyCircuitData {
    pub constants_sigmas_cap: MerkleCap,
    pub circuit_digest: HashOut,
}

impl ProofWithPublicInputs {
    /// Checks every length the verifier indexes by against the circuit description, so that
    /// synthesis never reads past a vector.
    pub fn validate_shape(&self, description: &CircuitDescription) -> Result<()> {
        VerifierError::ensure_len(
            "public inputs",
            description.num_public_inputs,
            self.public_inputs.len(),
        )?;
        let cap_len = 1 << description.fri_params.config.cap_height;
        let proof = &self.proof;
        VerifierError::ensure_len("wires cap", cap_len, proof.wires_cap.len())?;
        VerifierError::ensure_len(
            "zs partial products cap",
            cap_len,
            proof.plonk_zs_partial_products_cap.len(),
        )?;
        VerifierError::ensure_len("quotient cap", cap_len, proof.quotient_polys_cap.len())?;
        proof.openings.validate_shape(description)?;
        crate::fri::validate_fri_proof_shape(
            &proof.opening_proof,
            &crate::fri::fri_oracles(description),
            &description.fri_params,
        )
    }
}

impl OpeningSet {
    pub fn validate_shape(&self, description: &CircuitDescription) -> Result<()> {
        let num_challenges = description.num_challenges();
        let expected = [
            ("constant openings", description.num_constants, self.constants.len()),
            (
                "sigma openings",
                description.config.num_routed_wires,
                self.plonk_sigmas.len(),
            ),
            ("wire openings", description.config.num_wires, self.wires.len()),
            ("Z openings", num_challenges, self.plonk_zs.len()),
            ("next Z openings", num_challenges, self.plonk_zs_next.len()),
            (
                "partial product openings",
                num_challenges * description.num_partial_products,
                self.partial_products.len(),
            ),
            (
                "quotient openings",
                description.num_quotient_polys(),
                self.quotient_polys.len(),
            ),
        ];
        for (what, expected, actual) in expected {
            VerifierError::ensure_len(what, expected, actual)?;
        }
        Ok(())
    }
}

impl VerifierOnlyCircuitData {
    pub fn validate_shape(&self, description: &CircuitDescription) -> Result<()> {
        VerifierError::ensure_len(
            "constants sigmas cap",
            1 << description.fri_params.config.cap_height,
            self.constants_sigmas_cap.len(),
        )
    }
}

//! The verifier packaged as a halo2 circuit over BN254.
//!
//! Instances are laid out in one column: the proof's public inputs, then the circuit digest
//! cells, then the cells of the constants and sigmas cap.

use halo2_base::{
    gates::{
        circuit::{builder::BaseCircuitBuilder, BaseCircuitParams, BaseConfig, CircuitBuilderStage},
        GateChip,
    },
    halo2_proofs::{
        circuit::{Layouter, SimpleFloorPlanner},
        halo2curves::bn256::Fr,
        plonk::{Circuit, ConstraintSystem, Error},
    },
    AssignedValue, Context,
};
use log::{error, info};

use crate::error::Result;
use crate::fields::{fe_from_goldilocks, ExtensionFieldChip, GoldilocksChip, RangeCheckBackend, RangeChecker};
use crate::hash::{poseidon_bn254::BN254_PARAMS, HashOut, MerkleHasherChip, PoseidonBn254Chip, PoseidonGoldilocksChip};
use crate::types::{CircuitDescription, ProofWithPublicInputs, VerifierOnlyCircuitData};
use crate::verifier::VerifierChip;

pub const DEFAULT_K: usize = 20;
pub const DEFAULT_LOOKUP_BITS: usize = 19;

#[derive(Clone)]
pub struct Plonky2VerifierCircuit {
    description: CircuitDescription,
    proof: ProofWithPublicInputs,
    verifier_data: VerifierOnlyCircuitData,
    params: BaseCircuitParams,
    range_backend: RangeCheckBackend,
    stage: CircuitBuilderStage,
}

impl Plonky2VerifierCircuit {
    /// Keygen only reads the proof's shape, so any well formed proof of the described
    /// circuit serves as its witness.
    pub fn new(
        description: CircuitDescription,
        proof: ProofWithPublicInputs,
        verifier_data: VerifierOnlyCircuitData,
    ) -> Result<Self> {
        description.validate()?;
        proof.validate_shape(&description)?;
        verifier_data.validate_shape(&description)?;
        Ok(Self {
            description,
            proof,
            verifier_data,
            params: BaseCircuitParams {
                k: DEFAULT_K,
                num_advice_per_phase: vec![1],
                num_fixed: 1,
                num_lookup_advice_per_phase: vec![1],
                lookup_bits: Some(DEFAULT_LOOKUP_BITS),
                num_instance_columns: 1,
            },
            range_backend: RangeCheckBackend::Lookup,
            stage: CircuitBuilderStage::Mock,
        })
    }

    pub fn with_params(mut self, params: BaseCircuitParams) -> Self {
        self.range_backend = RangeCheckBackend::for_lookup_bits(params.lookup_bits);
        self.params = params;
        self
    }

    pub fn with_range_backend(mut self, backend: RangeCheckBackend) -> Self {
        self.range_backend = backend;
        self
    }

    fn with_stage(mut self, stage: CircuitBuilderStage) -> Self {
        self.stage = stage;
        self
    }

    /// Lays the circuit out once at degree `k` and sizes the advice, fixed and lookup columns
    /// to fit it.
    pub fn autotune(mut self, k: usize, minimum_rows: Option<usize>) -> Result<Self> {
        let lookup_bits = match self.range_backend {
            RangeCheckBackend::BitDecomposition => None,
            _ => Some(k.saturating_sub(1)),
        };
        self.params.k = k;
        self.params.lookup_bits = lookup_bits;

        let mut builder = self.builder(CircuitBuilderStage::Keygen);
        self.build_constraints(&mut builder)?;
        let mut params = builder.calculate_params(minimum_rows);
        params.num_instance_columns = 1;
        info!(
            "autotuned verifier circuit: k = {}, advice = {:?}, lookup advice = {:?}, fixed = {}",
            params.k, params.num_advice_per_phase, params.num_lookup_advice_per_phase, params.num_fixed
        );
        self.params = params;
        Ok(self)
    }

    pub fn description(&self) -> &CircuitDescription {
        &self.description
    }

    pub fn circuit_params(&self) -> &BaseCircuitParams {
        &self.params
    }

    /// The instance column the circuit expects, computed from the native proof.
    pub fn instances(&self) -> Vec<Vec<Fr>> {
        vec![public_instances(&self.proof, &self.verifier_data)]
    }

    fn builder(&self, stage: CircuitBuilderStage) -> BaseCircuitBuilder<Fr> {
        let mut builder = BaseCircuitBuilder::<Fr>::from_stage(stage)
            .use_k(self.params.k)
            .use_instance_columns(self.params.num_instance_columns);
        if let Some(bits) = self.params.lookup_bits {
            builder = builder.use_lookup_bits(bits);
        }
        builder
    }

    pub fn build_constraints(&self, builder: &mut BaseCircuitBuilder<Fr>) -> Result<()> {
        let gate = GateChip::<Fr>::default();
        let range = self.params.lookup_bits.map(|_| builder.range_chip());
        let checker = RangeChecker::new(self.range_backend, &gate, range.as_ref())?;
        let goldilocks = GoldilocksChip::new(gate.clone(), checker);
        let extension = ExtensionFieldChip::new(goldilocks.clone());

        info!(
            "building verifier for a 2^{} row plonky2 circuit with {} Merkle digests",
            self.description.degree_bits(),
            self.verifier_data.circuit_digest.kind()
        );
        let ctx = builder.main(0);
        let instances = match &self.verifier_data.circuit_digest {
            HashOut::Goldilocks { .. } => {
                let hasher = PoseidonGoldilocksChip::new(extension.clone());
                self.verify_with(ctx, extension, hasher)?
            }
            HashOut::Bn254(_) => {
                let hasher = PoseidonBn254Chip::new(gate, BN254_PARAMS.clone());
                self.verify_with(ctx, extension, hasher)?
            }
        };
        goldilocks.finalize(ctx);

        if let Some(column) = builder.assigned_instances.first_mut() {
            column.extend(instances);
        }
        Ok(())
    }

    fn verify_with<H: MerkleHasherChip<Fr>>(
        &self,
        ctx: &mut Context<Fr>,
        extension: ExtensionFieldChip<Fr>,
        hasher: H,
    ) -> Result<Vec<AssignedValue<Fr>>> {
        let verifier = VerifierChip::new(extension, hasher, &self.description)?;
        let statement = verifier.verify(ctx, &self.proof, &self.verifier_data)?;
        Ok(statement.instances())
    }
}

impl Circuit<Fr> for Plonky2VerifierCircuit {
    type Config = BaseConfig<Fr>;
    type FloorPlanner = SimpleFloorPlanner;
    type Params = BaseCircuitParams;

    fn params(&self) -> Self::Params {
        self.params.clone()
    }

    fn without_witnesses(&self) -> Self {
        self.clone().with_stage(CircuitBuilderStage::Keygen)
    }

    fn configure_with_params(meta: &mut ConstraintSystem<Fr>, params: Self::Params) -> Self::Config {
        BaseConfig::configure(meta, params)
    }

    fn configure(_: &mut ConstraintSystem<Fr>) -> Self::Config {
        unreachable!("Plonky2VerifierCircuit must be configured with explicit parameters")
    }

    fn synthesize(&self, config: Self::Config, layouter: impl Layouter<Fr>) -> std::result::Result<(), Error> {
        let mut builder = self.builder(self.stage).use_params(self.params.clone());
        self.build_constraints(&mut builder).map_err(|e| {
            error!("failed to build verifier circuit: {e}");
            Error::Synthesis
        })?;
        <BaseCircuitBuilder<Fr> as Circuit<Fr>>::synthesize(&builder, config, layouter)
    }
}

/// Instance column for a proof, without building the circuit.
pub fn public_instances(proof: &ProofWithPublicInputs, verifier_data: &VerifierOnlyCircuitData) -> Vec<Fr> {
    let mut column = proof
        .public_inputs
        .iter()
        .map(|&x| fe_from_goldilocks::<Fr>(x))
        .collect::<Vec<_>>();
    column.extend(verifier_data.circuit_digest.to_field_elements::<Fr>());
    for digest in &verifier_data.constants_sigmas_cap {
        column.extend(digest.to_field_elements::<Fr>());
    }
    column
}

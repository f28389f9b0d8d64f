use halo2_base::{
    gates::{circuit::builder::BaseCircuitBuilder, GateChip, RangeChip},
    halo2_proofs::{dev::MockProver, halo2curves::bn256::Fr},
    utils::BigPrimeField,
    Context,
};
use lazy_static::lazy_static;
use plonky2::{
    field::{extension::FieldExtension, types::Field},
    fri::{reduction_strategies::FriReductionStrategy, FriConfig},
    hash::poseidon::PoseidonHash,
    iop::witness::{PartialWitness, WitnessWrite},
    plonk::{
        circuit_builder::CircuitBuilder,
        circuit_data::{CircuitConfig, CommonCircuitData, VerifierOnlyCircuitData},
        config::PoseidonGoldilocksConfig,
        proof::ProofWithPublicInputs,
    },
};
use rand::Rng;

use crate::fields::{
    ExtensionFieldChip, Goldilocks, GoldilocksChip, GoldilocksExt, RangeCheckBackend, RangeChecker,
};
use crate::hash::{poseidon_bn254::BN254_PARAMS, PoseidonBn254Chip, PoseidonGoldilocksChip};
use crate::D;

pub(crate) fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// MOCK PROVER HARNESS
// =========================================================================

/// Chips built over one lookup enabled range chip, handed to [`mock_run`] closures.
pub(crate) struct MockChips<F: BigPrimeField> {
    pub range: RangeChip<F>,
    pub goldilocks: GoldilocksChip<F>,
    pub extension: ExtensionFieldChip<F>,
    pub poseidon_goldilocks: PoseidonGoldilocksChip<F>,
    pub poseidon_bn254: PoseidonBn254Chip<F>,
}

impl MockChips<Fr> {
    fn new(range: RangeChip<Fr>) -> Self {
        let gate = GateChip::default();
        let checker = RangeChecker::new(RangeCheckBackend::Lookup, &gate, Some(&range))
            .expect("lookup range checker");
        let goldilocks = GoldilocksChip::new(gate.clone(), checker);
        let extension = ExtensionFieldChip::new(goldilocks.clone());
        Self {
            range,
            goldilocks,
            poseidon_goldilocks: PoseidonGoldilocksChip::new(extension.clone()),
            extension,
            poseidon_bn254: PoseidonBn254Chip::new(gate, BN254_PARAMS.clone()),
        }
    }
}

/// Runs `f` in the main context of a fresh circuit and reports whether the MockProver
/// accepts the result.
pub(crate) fn mock_run(
    k: u32,
    lookup_bits: usize,
    f: impl FnOnce(&mut Context<Fr>, &MockChips<Fr>),
) -> bool {
    let mut builder = BaseCircuitBuilder::<Fr>::new(false)
        .use_k(k as usize)
        .use_lookup_bits(lookup_bits);
    let chips = MockChips::new(builder.range_chip());

    let ctx = builder.main(0);
    f(ctx, &chips);
    chips.goldilocks.finalize(ctx);

    builder.calculate_params(Some(9));
    MockProver::run(k, &builder, vec![])
        .expect("mock prover")
        .verify()
        .is_ok()
}

pub(crate) fn random_goldilocks(rng: &mut impl Rng) -> Goldilocks {
    Goldilocks::from_noncanonical_u64(rng.gen())
}

pub(crate) fn random_extension(rng: &mut impl Rng) -> GoldilocksExt {
    GoldilocksExt::from_basefield_array([random_goldilocks(rng), random_goldilocks(rng)])
}

// PLONKY2 FIXTURE
// =========================================================================

pub(crate) type FixtureConfig = PoseidonGoldilocksConfig;

/// A small plonky2 proof over a circuit that uses most of the supported gates.
pub(crate) struct Plonky2Fixture {
    pub proof: ProofWithPublicInputs<Goldilocks, FixtureConfig, D>,
    pub verifier_only: VerifierOnlyCircuitData<FixtureConfig, D>,
    pub common: CommonCircuitData<Goldilocks, D>,
}

lazy_static! {
    pub(crate) static ref PLONKY2_FIXTURE: Plonky2Fixture =
        build_fixture(CircuitConfig::standard_recursion_config());
    /// The same circuit proven with a single FRI query round, small enough for the full
    /// verifier to run under the MockProver in every test pass.
    pub(crate) static ref SINGLE_QUERY_FIXTURE: Plonky2Fixture = build_fixture(single_query_config());
}

fn single_query_config() -> CircuitConfig {
    CircuitConfig {
        fri_config: FriConfig {
            rate_bits: 3,
            cap_height: 4,
            proof_of_work_bits: 2,
            reduction_strategy: FriReductionStrategy::ConstantArityBits(4, 5),
            num_query_rounds: 1,
        },
        ..CircuitConfig::standard_recursion_config()
    }
}

fn build_fixture(config: CircuitConfig) -> Plonky2Fixture {
    let mut builder = CircuitBuilder::<Goldilocks, D>::new(config);

    let x = builder.add_virtual_target();
    let y = builder.add_virtual_target();
    builder.register_public_input(x);
    builder.register_public_input(y);

    // Enough multiplications for the FRI commit phase to run one folding round.
    let mut acc = builder.add(x, y);
    for _ in 0..3000 {
        acc = builder.mul(acc, x);
    }
    let three = builder.constant(Goldilocks::from_canonical_u64(3));
    acc = builder.add(acc, three);

    // BaseSumGate and ExponentiationGate.
    let power = builder.exp(x, y, 8);

    // RandomAccessGate.
    let list = vec![x, y, acc, power];
    let index = builder.constant(Goldilocks::TWO);
    let picked = builder.random_access(index, list);

    // Extension arithmetic gates.
    let ext_a = builder.convert_to_ext(picked);
    let ext_b = builder.convert_to_ext(power);
    let ext_prod = builder.mul_extension(ext_a, ext_b);
    let ext_many = builder.mul_many_extension([ext_a, ext_b, ext_prod]);

    // PoseidonGate.
    let digest = builder.hash_n_to_hash_no_pad::<PoseidonHash>(vec![acc, power, picked]);
    builder.register_public_inputs(&digest.elements);
    builder.register_public_inputs(&ext_many.0);

    let data = builder.build::<FixtureConfig>();
    let mut pw = PartialWitness::new();
    pw.set_target(x, Goldilocks::from_canonical_u64(5));
    pw.set_target(y, Goldilocks::from_canonical_u64(171));
    let proof = data.prove(pw).expect("plonky2 proof");
    data.verify(proof.clone()).expect("native verification");

    Plonky2Fixture {
        proof,
        verifier_only: data.verifier_only,
        common: data.common,
    }
}

#[test]
fn test_fixture_shape() {
    init();
    let fixture = &*PLONKY2_FIXTURE;
    let fri = &fixture.common.fri_params;
    assert!(!fri.hiding);
    assert_eq!(fri.reduction_arity_bits, vec![4]);
    assert_eq!(fixture.proof.public_inputs.len(), 2 + 4 + D);
}

#[test]
fn test_single_query_fixture_shape() {
    init();
    let fixture = &*SINGLE_QUERY_FIXTURE;
    let fri = &fixture.common.fri_params;
    assert_eq!(fri.config.num_query_rounds, 1);
    assert_eq!(fri.config.proof_of_work_bits, 2);
    assert_eq!(fri.reduction_arity_bits, PLONKY2_FIXTURE.common.fri_params.reduction_arity_bits);
    assert_eq!(fixture.proof.proof.opening_proof.query_round_proofs.len(), 1);
}

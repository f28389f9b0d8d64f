use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use halo2_base::{utils::BigPrimeField, AssignedValue, Context};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifierError};
use crate::fields::{AssignedExtensionAlgebra, AssignedExtensionValue, ExtensionFieldChip};
use crate::D;

mod arithmetic;
mod base_sum;
mod constant;
mod coset_interpolation;
mod evaluator;
mod exponentiation;
pub(crate) mod id;
mod poseidon;
mod random_access;
mod reducing;

pub use arithmetic::{ArithmeticExtensionGate, ArithmeticGate, MulExtensionGate};
pub use base_sum::BaseSumGate;
pub use constant::{ConstantGate, NoopGate, PublicInputGate};
pub use coset_interpolation::CosetInterpolationGate;
pub use evaluator::GateEvaluatorChip;
pub use exponentiation::ExponentiationGate;
pub use poseidon::{PoseidonGate, PoseidonMdsGate};
pub use random_access::RandomAccessGate;
pub use reducing::{ReducingExtensionGate, ReducingGate};

use id::GateId;

/// Selector value reserved for rows that use none of the gates of a selector group.
pub const UNUSED_SELECTOR: u64 = u32::MAX as u64;

/// The openings a gate's constraints are evaluated over: the constants and wires of one
/// row at the challenge point `zeta`, plus the public inputs hash.
#[derive(Clone, Debug)]
pub struct EvaluationVars<F: BigPrimeField> {
    pub local_constants: Vec<AssignedExtensionValue<F>>,
    pub local_wires: Vec<AssignedExtensionValue<F>>,
    pub public_inputs_hash: [AssignedValue<F>; 4],
}

impl<F: BigPrimeField> EvaluationVars<F> {
    /// The algebra element spanning wires `range`, which must hold exactly `D` wires.
    pub fn get_local_ext_algebra(&self, range: Range<usize>) -> AssignedExtensionAlgebra<F> {
        debug_assert_eq!(range.len(), D);
        AssignedExtensionAlgebra::construct([
            self.local_wires[range.start],
            self.local_wires[range.start + 1],
        ])
    }

    /// Drops the first `num` constants, which hold selector values.
    pub fn remove_prefix(&mut self, num: usize) {
        self.local_constants.drain(..num.min(self.local_constants.len()));
    }
}

/// Which selector polynomial each gate is filtered by, and which gates share a selector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorsInfo {
    pub selector_indices: Vec<usize>,
    pub groups: Vec<SelectorGroup>,
}

/// Gates `start..end` share one selector polynomial.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorGroup {
    pub start: usize,
    pub end: usize,
}

impl SelectorGroup {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl SelectorsInfo {
    pub fn num_selectors(&self) -> usize {
        self.groups.len()
    }
}

/// Shared interface of the supported gates. Evaluation mirrors the gate's native
/// `eval_unfiltered`: one extension value per constraint, in the same order.
pub trait CustomGate: fmt::Display {
    fn num_wires(&self) -> usize;

    fn num_constants(&self) -> usize;

    fn num_constraints(&self) -> usize;

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>>;
}

/// A gate of the verified circuit, identified by its id string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Gate {
    Arithmetic(ArithmeticGate),
    ArithmeticExtension(ArithmeticExtensionGate),
    MulExtension(MulExtensionGate),
    BaseSum(BaseSumGate),
    Constant(ConstantGate),
    CosetInterpolation(CosetInterpolationGate),
    Exponentiation(ExponentiationGate),
    Noop(NoopGate),
    Poseidon(PoseidonGate),
    PoseidonMds(PoseidonMdsGate),
    PublicInput(PublicInputGate),
    RandomAccess(RandomAccessGate),
    Reducing(ReducingGate),
    ReducingExtension(ReducingExtensionGate),
}

macro_rules! dispatch {
    ($self:ident, $gate:ident => $body:expr) => {
        match $self {
            Gate::Arithmetic($gate) => $body,
            Gate::ArithmeticExtension($gate) => $body,
            Gate::MulExtension($gate) => $body,
            Gate::BaseSum($gate) => $body,
            Gate::Constant($gate) => $body,
            Gate::CosetInterpolation($gate) => $body,
            Gate::Exponentiation($gate) => $body,
            Gate::Noop($gate) => $body,
            Gate::Poseidon($gate) => $body,
            Gate::PoseidonMds($gate) => $body,
            Gate::PublicInput($gate) => $body,
            Gate::RandomAccess($gate) => $body,
            Gate::Reducing($gate) => $body,
            Gate::ReducingExtension($gate) => $body,
        }
    };
}

impl FromStr for Gate {
    type Err = VerifierError;

    fn from_str(s: &str) -> Result<Self> {
        let id = GateId::split(s);
        let gate = match id.name {
            "ArithmeticGate" => Self::Arithmetic(ArithmeticGate::parse(&id)?),
            "ArithmeticExtensionGate" => Self::ArithmeticExtension(ArithmeticExtensionGate::parse(&id)?),
            "MulExtensionGate" => Self::MulExtension(MulExtensionGate::parse(&id)?),
            "BaseSumGate" => Self::BaseSum(BaseSumGate::parse(&id)?),
            "ConstantGate" => Self::Constant(ConstantGate::parse(&id)?),
            "CosetInterpolationGate" => Self::CosetInterpolation(CosetInterpolationGate::parse(&id)?),
            "ExponentiationGate" => Self::Exponentiation(ExponentiationGate::parse(&id)?),
            "NoopGate" => Self::Noop(NoopGate),
            "PoseidonGate" => Self::Poseidon(PoseidonGate::parse(&id)?),
            "PoseidonMdsGate" => Self::PoseidonMds(PoseidonMdsGate::parse(&id)?),
            "PublicInputGate" => Self::PublicInput(PublicInputGate),
            "RandomAccessGate" => Self::RandomAccess(RandomAccessGate::parse(&id)?),
            "ReducingGate" => Self::Reducing(ReducingGate::parse(&id)?),
            "ReducingExtensionGate" => Self::ReducingExtension(ReducingExtensionGate::parse(&id)?),
            "LookupGate" | "LookupTableGate" => {
                return Err(VerifierError::Unsupported(format!("lookup gate `{s}`")))
            }
            _ => return Err(VerifierError::UnknownGate(s.to_string())),
        };
        Ok(gate)
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, gate => fmt::Display::fmt(gate, f))
    }
}

impl CustomGate for Gate {
    fn num_wires(&self) -> usize {
        dispatch!(self, gate => gate.num_wires())
    }

    fn num_constants(&self) -> usize {
        dispatch!(self, gate => gate.num_constants())
    }

    fn num_constraints(&self) -> usize {
        dispatch!(self, gate => gate.num_constraints())
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        dispatch!(self, gate => gate.eval_unfiltered(ctx, chip, vars))
    }
}

impl Serialize for Gate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Gate {
    fn deserialize<De: serde::Deserializer<'de>>(deserializer: De) -> std::result::Result<Self, De::Error> {
        let id = String::deserialize(deserializer)?;
        id.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_and_lookup_ids() {
        assert!(matches!(
            "FooGate { x: 1 }".parse::<Gate>(),
            Err(VerifierError::UnknownGate(_))
        ));
        assert!(matches!(
            "LookupGate { num_slots: 2, lut_hash: [0, 0, 0, 0] }".parse::<Gate>(),
            Err(VerifierError::Unsupported(_))
        ));
        assert!(matches!(
            "ArithmeticGate { num_ops: many }".parse::<Gate>(),
            Err(VerifierError::MalformedGate { .. })
        ));
    }

    #[test]
    fn test_poseidon_ids_are_distinguished() {
        let mds = "PoseidonMdsGate(PhantomData<plonky2_field::goldilocks_field::GoldilocksField>)<WIDTH=12>";
        let full = "PoseidonGate(PhantomData<plonky2_field::goldilocks_field::GoldilocksField>)<WIDTH=12>";
        assert!(matches!(mds.parse::<Gate>().unwrap(), Gate::PoseidonMds(_)));
        assert!(matches!(full.parse::<Gate>().unwrap(), Gate::Poseidon(_)));
    }

    #[test]
    fn test_gate_json() {
        let gates: Vec<Gate> =
            serde_json::from_str(r#"["NoopGate", "ConstantGate { num_consts: 2 }", "BaseSumGate { num_limbs: 63 } + Base: 2"]"#)
                .unwrap();
        assert_eq!(gates[1], Gate::Constant(ConstantGate { num_consts: 2 }));
        assert_eq!(gates[2].num_constraints(), 64);
        let json = serde_json::to_string(&gates).unwrap();
        assert!(json.contains("BaseSumGate { num_limbs: 63 } + Base: 2"));
    }

    mod native {
        use super::*;
        use crate::fields::{Goldilocks, GoldilocksExt};
        use crate::tests::{init, mock_run, random_extension, random_goldilocks, MockChips};
        use halo2_base::halo2_proofs::halo2curves::bn256::Fr;
        use plonky2::gates::{
            arithmetic_base::ArithmeticGate as NativeArithmetic,
            arithmetic_extension::ArithmeticExtensionGate as NativeArithmeticExtension,
            base_sum::BaseSumGate as NativeBaseSum, constant::ConstantGate as NativeConstant,
            coset_interpolation::CosetInterpolationGate as NativeCosetInterpolation,
            exponentiation::ExponentiationGate as NativeExponentiation,
            gate::Gate as NativeGate,
            multiplication_extension::MulExtensionGate as NativeMulExtension,
            noop::NoopGate as NativeNoop, poseidon::PoseidonGate as NativePoseidon,
            poseidon_mds::PoseidonMdsGate as NativePoseidonMds,
            public_input::PublicInputGate as NativePublicInput,
            random_access::RandomAccessGate as NativeRandomAccess,
            reducing::ReducingGate as NativeReducing,
            reducing_extension::ReducingExtensionGate as NativeReducingExtension,
        };
        use plonky2::hash::hash_types::HashOut as NativeHashOut;
        use plonky2::plonk::circuit_data::CircuitConfig;
        use plonky2::plonk::vars::EvaluationVars as NativeVars;
        use rand::{rngs::StdRng, SeedableRng};

        /// Parses the native gate's id, checks the layout counts, then compares every
        /// constraint against the native evaluation on random openings.
        fn check_against_native<G: NativeGate<Goldilocks, D>>(native: G, k: u32, seed: u64) {
            init();
            let id = native.id();
            let gate: Gate = id.parse().unwrap_or_else(|e| panic!("{id}: {e}"));
            assert_eq!(gate.to_string(), id);
            assert_eq!(gate.num_wires(), native.num_wires(), "{id}");
            assert_eq!(gate.num_constants(), native.num_constants(), "{id}");
            assert_eq!(gate.num_constraints(), native.num_constraints(), "{id}");

            let mut rng = StdRng::seed_from_u64(seed);
            let wires = (0..native.num_wires())
                .map(|_| random_extension(&mut rng))
                .collect::<Vec<GoldilocksExt>>();
            let constants = (0..native.num_constants())
                .map(|_| random_extension(&mut rng))
                .collect::<Vec<GoldilocksExt>>();
            let public_inputs_hash = NativeHashOut {
                elements: core::array::from_fn(|_| random_goldilocks(&mut rng)),
            };
            let expected = native.eval_unfiltered(NativeVars {
                local_constants: &constants,
                local_wires: &wires,
                public_inputs_hash: &public_inputs_hash,
            });

            assert!(mock_run(k, k as usize - 1, |ctx, chips: &MockChips<Fr>| {
                let vars = EvaluationVars {
                    local_constants: constants
                        .iter()
                        .map(|c| chips.extension.load_canonical(ctx, *c))
                        .collect(),
                    local_wires: wires.iter().map(|w| chips.extension.load_canonical(ctx, *w)).collect(),
                    public_inputs_hash: public_inputs_hash
                        .elements
                        .map(|e| chips.goldilocks.load_canonical(ctx, e)),
                };
                let constraints = gate.eval_unfiltered(ctx, &chips.extension, &vars);
                let values = constraints.iter().map(|c| c.value()).collect::<Vec<_>>();
                assert_eq!(values, expected, "{id}");
            }));
        }

        #[test]
        fn test_arithmetic_gates() {
            let config = CircuitConfig::standard_recursion_config();
            check_against_native(NativeArithmetic::new_from_config(&config), 17, 1);
            check_against_native(NativeArithmeticExtension::<D>::new_from_config(&config), 17, 2);
            check_against_native(NativeMulExtension::<D>::new_from_config(&config), 17, 3);
        }

        #[test]
        fn test_base_sum_gate() {
            check_against_native(NativeBaseSum::<2>::new(13), 16, 4);
            check_against_native(NativeBaseSum::<4>::new(5), 16, 5);
        }

        #[test]
        fn test_constant_noop_and_public_input_gates() {
            check_against_native(NativeConstant::new(2), 14, 6);
            check_against_native(NativeNoop, 12, 7);
            check_against_native(NativePublicInput, 14, 8);
        }

        #[test]
        fn test_exponentiation_gate() {
            check_against_native(NativeExponentiation::<Goldilocks, D>::new(6), 16, 9);
        }

        #[test]
        fn test_random_access_gate() {
            let config = CircuitConfig::standard_recursion_config();
            check_against_native(NativeRandomAccess::<Goldilocks, D>::new_from_config(&config, 2), 18, 10);
        }

        #[test]
        fn test_coset_interpolation_gate() {
            check_against_native(NativeCosetInterpolation::<Goldilocks, D>::new(2), 17, 11);
            check_against_native(NativeCosetInterpolation::<Goldilocks, D>::with_max_degree(4, 6), 18, 12);
        }

        #[test]
        fn test_poseidon_gates() {
            check_against_native(NativePoseidonMds::<Goldilocks, D>::new(), 17, 13);
            check_against_native(NativePoseidon::<Goldilocks, D>::new(), 20, 14);
        }

        #[test]
        fn test_reducing_gates() {
            check_against_native(NativeReducing::<D>::new(7), 17, 15);
            check_against_native(NativeReducingExtension::<D>::new(4), 17, 16);
        }
    }
}

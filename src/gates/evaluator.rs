use std::ops::Range;

use halo2_base::{utils::BigPrimeField, Context};
use log::debug;
use plonky2::field::types::Field;

use super::{CustomGate, EvaluationVars, Gate, SelectorsInfo, UNUSED_SELECTOR};
use crate::error::{Result, VerifierError};
use crate::fields::{AssignedExtensionValue, ExtensionFieldChip, Goldilocks};

/// Evaluates the combined gate constraints of a circuit at the opening point: every gate's
/// constraints, scaled by the gate's selector filter, summed slot by slot.
#[derive(Clone, Debug)]
pub struct GateEvaluatorChip<F: BigPrimeField> {
    extension: ExtensionFieldChip<F>,
    gates: Vec<Gate>,
    selectors_info: SelectorsInfo,
    num_gate_constraints: usize,
}

impl<F: BigPrimeField> GateEvaluatorChip<F> {
    pub fn new(
        extension: ExtensionFieldChip<F>,
        gates: Vec<Gate>,
        selectors_info: SelectorsInfo,
        num_gate_constraints: usize,
    ) -> Result<Self> {
        VerifierError::ensure_len(
            "selector indices",
            gates.len(),
            selectors_info.selector_indices.len(),
        )?;
        for (row, selector_index) in selectors_info.selector_indices.iter().enumerate() {
            let group = selectors_info.groups.get(*selector_index).ok_or_else(|| {
                VerifierError::InvalidParameter(format!(
                    "gate {row} uses selector {selector_index} but only {} exist",
                    selectors_info.groups.len()
                ))
            })?;
            if !group.range().contains(&row) {
                return Err(VerifierError::InvalidParameter(format!(
                    "gate {row} lies outside its selector group {}..{}",
                    group.start, group.end
                )));
            }
        }
        Ok(Self {
            extension,
            gates,
            selectors_info,
            num_gate_constraints,
        })
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// `prod_{j in group, j != row} (j - s)`, times `(UNUSED_SELECTOR - s)` when the circuit
    /// has more than one selector. Non-zero exactly on rows running gate `row`.
    pub fn compute_filter(
        &self,
        ctx: &mut Context<F>,
        row: usize,
        group_range: Range<usize>,
        s: AssignedExtensionValue<F>,
        many_selectors: bool,
    ) -> AssignedExtensionValue<F> {
        let chip = &self.extension;
        let factors = group_range
            .filter(|j| *j != row)
            .map(|j| j as u64)
            .chain(many_selectors.then_some(UNUSED_SELECTOR))
            .collect::<Vec<_>>();

        let mut filter = chip.one(ctx);
        for (i, j) in factors.into_iter().enumerate() {
            let factor = chip.sub(ctx, Goldilocks::from_canonical_u64(j), s);
            filter = if i == 0 {
                factor
            } else {
                chip.mul(ctx, filter, factor)
            };
        }
        filter
    }

    /// The `num_gate_constraints` combined constraint values.
    pub fn evaluate_gate_constraints(
        &self,
        ctx: &mut Context<F>,
        vars: &EvaluationVars<F>,
    ) -> Result<Vec<AssignedExtensionValue<F>>> {
        let chip = &self.extension;
        let num_selectors = self.selectors_info.num_selectors();

        let zero = chip.zero(ctx);
        let mut constraints = vec![zero; self.num_gate_constraints];
        for (row, gate) in self.gates.iter().enumerate() {
            let selector_index = self.selectors_info.selector_indices[row];
            let group_range = self.selectors_info.groups[selector_index].range();
            let s = *vars.local_constants.get(selector_index).ok_or_else(|| {
                VerifierError::shape("selector constants", selector_index + 1, vars.local_constants.len())
            })?;
            let filter = self.compute_filter(ctx, row, group_range, s, num_selectors > 1);

            let mut gate_vars = vars.clone();
            gate_vars.remove_prefix(num_selectors);
            if gate_vars.local_constants.len() < gate.num_constants() || vars.local_wires.len() < gate.num_wires() {
                return Err(VerifierError::InvalidParameter(format!(
                    "gate `{gate}` needs {} wires and {} constants, the circuit has {} and {}",
                    gate.num_wires(),
                    gate.num_constants(),
                    vars.local_wires.len(),
                    gate_vars.local_constants.len()
                )));
            }

            let gate_constraints = gate.eval_unfiltered(ctx, chip, &gate_vars);
            if gate_constraints.len() > self.num_gate_constraints {
                return Err(VerifierError::TooManyConstraints {
                    gate: gate.to_string(),
                    produced: gate_constraints.len(),
                    max: self.num_gate_constraints,
                });
            }
            debug!(
                "gate {row} `{gate}`: {} constraints, selector {selector_index}",
                gate_constraints.len()
            );
            for (acc, c) in constraints.iter_mut().zip(gate_constraints) {
                *acc = chip.mul_add(ctx, c, filter, *acc);
            }
        }
        Ok(constraints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::GoldilocksExt;
    use crate::gates::{ArithmeticGate, ConstantGate, NoopGate, SelectorGroup};
    use crate::tests::{init, mock_run, random_extension, MockChips};
    use halo2_base::halo2_proofs::halo2curves::bn256::Fr;
    use rand::{rngs::StdRng, SeedableRng};

    fn selectors(indices: Vec<usize>, groups: Vec<(usize, usize)>) -> SelectorsInfo {
        SelectorsInfo {
            selector_indices: indices,
            groups: groups
                .into_iter()
                .map(|(start, end)| SelectorGroup { start, end })
                .collect(),
        }
    }

    fn native_filter(row: usize, group: Range<usize>, s: GoldilocksExt, many: bool) -> GoldilocksExt {
        group
            .filter(|j| *j != row)
            .map(|j| j as u64)
            .chain(many.then_some(UNUSED_SELECTOR))
            .map(|j| GoldilocksExt::from_canonical_u64(j) - s)
            .product()
    }

    #[test]
    fn test_filter_matches_native() {
        init();
        let mut rng = StdRng::seed_from_u64(8);
        let s = random_extension(&mut rng);
        assert!(mock_run(15, 14, |ctx, chips: &MockChips<Fr>| {
            let evaluator = GateEvaluatorChip::new(
                chips.extension.clone(),
                vec![Gate::Noop(NoopGate); 3],
                selectors(vec![0, 0, 1], vec![(0, 2), (2, 3)]),
                0,
            )
            .unwrap();
            let s_cell = chips.extension.load_canonical(ctx, s);
            for (row, group, many) in [(0, 0..2, true), (1, 0..2, false), (2, 2..3, true), (2, 2..3, false)] {
                let filter = evaluator.compute_filter(ctx, row, group.clone(), s_cell, many);
                assert_eq!(filter.value(), native_filter(row, group, s, many));
            }
        }));
    }

    #[test]
    fn test_filter_vanishes_on_other_rows() {
        init();
        assert!(mock_run(15, 14, |ctx, chips: &MockChips<Fr>| {
            let evaluator = GateEvaluatorChip::new(
                chips.extension.clone(),
                vec![Gate::Noop(NoopGate); 3],
                selectors(vec![0, 0, 0], vec![(0, 3)]),
                0,
            )
            .unwrap();
            for other in [0u64, 2] {
                let s = chips.extension.load_constant(ctx, GoldilocksExt::from_canonical_u64(other));
                let filter = evaluator.compute_filter(ctx, 1, 0..3, s, false);
                assert_eq!(filter.value(), GoldilocksExt::ZERO);
            }
            let s = chips.extension.load_constant(ctx, GoldilocksExt::ONE);
            let filter = evaluator.compute_filter(ctx, 1, 0..3, s, false);
            assert_ne!(filter.value(), GoldilocksExt::ZERO);
        }));
    }

    #[test]
    fn test_selector_validation() {
        init();
        assert!(mock_run(12, 11, |_ctx, chips: &MockChips<Fr>| {
            let gates = vec![Gate::Noop(NoopGate), Gate::Constant(ConstantGate { num_consts: 2 })];
            let bad_group = GateEvaluatorChip::new(
                chips.extension.clone(),
                gates.clone(),
                selectors(vec![0, 0], vec![(0, 1)]),
                2,
            );
            assert!(bad_group.is_err());
            let missing = GateEvaluatorChip::new(chips.extension.clone(), gates, selectors(vec![0], vec![(0, 2)]), 2);
            assert!(missing.is_err());
        }));
    }

    #[test]
    fn test_too_many_constraints() {
        init();
        let mut rng = StdRng::seed_from_u64(9);
        let wires = (0..8).map(|_| random_extension(&mut rng)).collect::<Vec<_>>();
        let constants = (0..3).map(|_| random_extension(&mut rng)).collect::<Vec<_>>();
        assert!(mock_run(16, 15, |ctx, chips: &MockChips<Fr>| {
            let evaluator = GateEvaluatorChip::new(
                chips.extension.clone(),
                vec![Gate::Arithmetic(ArithmeticGate { num_ops: 2 })],
                selectors(vec![0], vec![(0, 1)]),
                1,
            )
            .unwrap();
            let vars = EvaluationVars {
                local_constants: constants.iter().map(|c| chips.extension.load_canonical(ctx, *c)).collect(),
                local_wires: wires.iter().map(|w| chips.extension.load_canonical(ctx, *w)).collect(),
                public_inputs_hash: [ctx.load_zero(); 4],
            };
            let result = evaluator.evaluate_gate_constraints(ctx, &vars);
            assert!(matches!(
                result,
                Err(VerifierError::TooManyConstraints { produced: 2, max: 1, .. })
            ));
        }));
    }
}

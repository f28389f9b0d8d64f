use std::fmt;
use std::ops::Range;

use halo2_base::{utils::BigPrimeField, Context};

use super::{id::GateId, CustomGate, EvaluationVars};
use crate::error::Result;
use crate::fields::{AssignedExtensionAlgebra, AssignedExtensionValue, ExtensionFieldChip};
use crate::D;

const WIRES_OUTPUT: Range<usize> = 0..D;
const WIRES_ALPHA: Range<usize> = D..2 * D;
const WIRES_OLD_ACC: Range<usize> = 2 * D..3 * D;
const START_COEFFS: usize = 3 * D;

/// Runs `acc <- acc * alpha + coeff` over the accumulator wires, checking every step.
fn eval_reduction<F: BigPrimeField>(
    ctx: &mut Context<F>,
    chip: &ExtensionFieldChip<F>,
    vars: &EvaluationVars<F>,
    coeffs: Vec<AssignedExtensionAlgebra<F>>,
    accs: Vec<AssignedExtensionAlgebra<F>>,
) -> Vec<AssignedExtensionValue<F>> {
    let alpha = vars.get_local_ext_algebra(WIRES_ALPHA);
    let mut acc = vars.get_local_ext_algebra(WIRES_OLD_ACC);

    let mut constraints = Vec::with_capacity(D * coeffs.len());
    for (coeff, next_acc) in coeffs.iter().zip(accs) {
        let scaled = chip.mul_algebra(ctx, &acc, &alpha);
        let computed = chip.add_algebra(ctx, &scaled, coeff);
        let diff = chip.sub_algebra(ctx, &computed, &next_acc);
        constraints.extend(diff.to_ext_array());
        acc = next_acc;
    }
    constraints
}

/// Horner steps with base field coefficients, one wire each.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReducingGate {
    pub num_coeffs: usize,
}

impl ReducingGate {
    pub(crate) fn parse(id: &GateId) -> Result<Self> {
        let num_coeffs = id.parse_field("num_coeffs")?;
        if num_coeffs == 0 {
            return Err(id.malformed("num_coeffs must be positive"));
        }
        Ok(Self { num_coeffs })
    }

    pub fn wires_coeffs(&self) -> Range<usize> {
        START_COEFFS..START_COEFFS + self.num_coeffs
    }

    fn start_accs(&self) -> usize {
        START_COEFFS + self.num_coeffs
    }

    /// The last accumulator is the output.
    pub fn wires_accs(&self, i: usize) -> Range<usize> {
        if i == self.num_coeffs - 1 {
            return WIRES_OUTPUT;
        }
        self.start_accs() + D * i..self.start_accs() + D * (i + 1)
    }
}

impl fmt::Display for ReducingGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReducingGate {{ num_coeffs: {} }}", self.num_coeffs)
    }
}

impl CustomGate for ReducingGate {
    fn num_wires(&self) -> usize {
        2 * D + self.num_coeffs * (D + 1)
    }

    fn num_constants(&self) -> usize {
        0
    }

    fn num_constraints(&self) -> usize {
        D * self.num_coeffs
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        let coeffs = self
            .wires_coeffs()
            .map(|i| chip.algebra_from_ext(ctx, vars.local_wires[i]))
            .collect();
        let accs = (0..self.num_coeffs)
            .map(|i| vars.get_local_ext_algebra(self.wires_accs(i)))
            .collect();
        eval_reduction(ctx, chip, vars, coeffs, accs)
    }
}

/// Horner steps with extension field coefficients, `D` wires each.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReducingExtensionGate {
    pub num_coeffs: usize,
}

impl ReducingExtensionGate {
    pub(crate) fn parse(id: &GateId) -> Result<Self> {
        let num_coeffs = id.parse_field("num_coeffs")?;
        if num_coeffs == 0 {
            return Err(id.malformed("num_coeffs must be positive"));
        }
        Ok(Self { num_coeffs })
    }

    pub fn wires_coeff(i: usize) -> Range<usize> {
        START_COEFFS + D * i..START_COEFFS + D * (i + 1)
    }

    fn start_accs(&self) -> usize {
        START_COEFFS + D * self.num_coeffs
    }

    pub fn wires_accs(&self, i: usize) -> Range<usize> {
        if i == self.num_coeffs - 1 {
            return WIRES_OUTPUT;
        }
        self.start_accs() + D * i..self.start_accs() + D * (i + 1)
    }
}

impl fmt::Display for ReducingExtensionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReducingExtensionGate {{ num_coeffs: {} }}", self.num_coeffs)
    }
}

impl CustomGate for ReducingExtensionGate {
    fn num_wires(&self) -> usize {
        2 * D + 2 * D * self.num_coeffs
    }

    fn num_constants(&self) -> usize {
        0
    }

    fn num_constraints(&self) -> usize {
        D * self.num_coeffs
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        let coeffs = (0..self.num_coeffs)
            .map(|i| vars.get_local_ext_algebra(Self::wires_coeff(i)))
            .collect();
        let accs = (0..self.num_coeffs)
            .map(|i| vars.get_local_ext_algebra(self.wires_accs(i)))
            .collect();
        eval_reduction(ctx, chip, vars, coeffs, accs)
    }
}

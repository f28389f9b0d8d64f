use std::fmt;
use std::ops::Range;

use halo2_base::{utils::BigPrimeField, Context};

use super::{id::GateId, CustomGate, EvaluationVars};
use crate::error::Result;
use crate::fields::{AssignedExtensionValue, ExtensionFieldChip, QuantumExtensionCell};
use crate::D;

/// `output = c0 * m0 * m1 + c1 * addend`, `num_ops` copies per row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArithmeticGate {
    pub num_ops: usize,
}

impl ArithmeticGate {
    pub(crate) fn parse(id: &GateId) -> Result<Self> {
        Ok(Self {
            num_ops: id.parse_field("num_ops")?,
        })
    }

    pub fn wire_ith_multiplicand_0(i: usize) -> usize {
        4 * i
    }

    pub fn wire_ith_multiplicand_1(i: usize) -> usize {
        4 * i + 1
    }

    pub fn wire_ith_addend(i: usize) -> usize {
        4 * i + 2
    }

    pub fn wire_ith_output(i: usize) -> usize {
        4 * i + 3
    }
}

impl fmt::Display for ArithmeticGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArithmeticGate {{ num_ops: {} }}", self.num_ops)
    }
}

impl CustomGate for ArithmeticGate {
    fn num_wires(&self) -> usize {
        4 * self.num_ops
    }

    fn num_constants(&self) -> usize {
        2
    }

    fn num_constraints(&self) -> usize {
        self.num_ops
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        let const_0 = vars.local_constants[0];
        let const_1 = vars.local_constants[1];

        (0..self.num_ops)
            .map(|i| {
                let multiplicand_0 = vars.local_wires[Self::wire_ith_multiplicand_0(i)];
                let multiplicand_1 = vars.local_wires[Self::wire_ith_multiplicand_1(i)];
                let addend = vars.local_wires[Self::wire_ith_addend(i)];
                let output = vars.local_wires[Self::wire_ith_output(i)];

                let product = chip.mul(ctx, multiplicand_0, multiplicand_1);
                let computed_output = chip.inner_product(
                    ctx,
                    [
                        (QuantumExtensionCell::from(product), QuantumExtensionCell::from(const_0)),
                        (QuantumExtensionCell::from(addend), QuantumExtensionCell::from(const_1)),
                    ],
                );
                chip.sub(ctx, output, computed_output)
            })
            .collect()
    }
}

/// [`ArithmeticGate`] over extension algebra operands occupying `D` wires each.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArithmeticExtensionGate {
    pub num_ops: usize,
}

impl ArithmeticExtensionGate {
    pub(crate) fn parse(id: &GateId) -> Result<Self> {
        Ok(Self {
            num_ops: id.parse_field("num_ops")?,
        })
    }

    pub fn wires_ith_multiplicand_0(i: usize) -> Range<usize> {
        4 * D * i..4 * D * i + D
    }

    pub fn wires_ith_multiplicand_1(i: usize) -> Range<usize> {
        4 * D * i + D..4 * D * i + 2 * D
    }

    pub fn wires_ith_addend(i: usize) -> Range<usize> {
        4 * D * i + 2 * D..4 * D * i + 3 * D
    }

    pub fn wires_ith_output(i: usize) -> Range<usize> {
        4 * D * i + 3 * D..4 * D * i + 4 * D
    }
}

impl fmt::Display for ArithmeticExtensionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArithmeticExtensionGate {{ num_ops: {} }}", self.num_ops)
    }
}

impl CustomGate for ArithmeticExtensionGate {
    fn num_wires(&self) -> usize {
        4 * D * self.num_ops
    }

    fn num_constants(&self) -> usize {
        2
    }

    fn num_constraints(&self) -> usize {
        D * self.num_ops
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        let const_0 = vars.local_constants[0];
        let const_1 = vars.local_constants[1];

        let mut constraints = Vec::with_capacity(self.num_constraints());
        for i in 0..self.num_ops {
            let multiplicand_0 = vars.get_local_ext_algebra(Self::wires_ith_multiplicand_0(i));
            let multiplicand_1 = vars.get_local_ext_algebra(Self::wires_ith_multiplicand_1(i));
            let addend = vars.get_local_ext_algebra(Self::wires_ith_addend(i));
            let output = vars.get_local_ext_algebra(Self::wires_ith_output(i));

            let product = chip.mul_algebra(ctx, &multiplicand_0, &multiplicand_1);
            let scaled_product = chip.scalar_mul_algebra(ctx, const_0, &product);
            let scaled_addend = chip.scalar_mul_algebra(ctx, const_1, &addend);
            let computed_output = chip.add_algebra(ctx, &scaled_addend, &scaled_product);
            let diff = chip.sub_algebra(ctx, &output, &computed_output);
            constraints.extend(diff.to_ext_array());
        }
        constraints
    }
}

/// `output = c0 * m0 * m1` over extension algebra operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MulExtensionGate {
    pub num_ops: usize,
}

impl MulExtensionGate {
    pub(crate) fn parse(id: &GateId) -> Result<Self> {
        Ok(Self {
            num_ops: id.parse_field("num_ops")?,
        })
    }

    pub fn wires_ith_multiplicand_0(i: usize) -> Range<usize> {
        3 * D * i..3 * D * i + D
    }

    pub fn wires_ith_multiplicand_1(i: usize) -> Range<usize> {
        3 * D * i + D..3 * D * i + 2 * D
    }

    pub fn wires_ith_output(i: usize) -> Range<usize> {
        3 * D * i + 2 * D..3 * D * i + 3 * D
    }
}

impl fmt::Display for MulExtensionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MulExtensionGate {{ num_ops: {} }}", self.num_ops)
    }
}

impl CustomGate for MulExtensionGate {
    fn num_wires(&self) -> usize {
        3 * D * self.num_ops
    }

    fn num_constants(&self) -> usize {
        1
    }

    fn num_constraints(&self) -> usize {
        D * self.num_ops
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        let const_0 = vars.local_constants[0];

        let mut constraints = Vec::with_capacity(self.num_constraints());
        for i in 0..self.num_ops {
            let multiplicand_0 = vars.get_local_ext_algebra(Self::wires_ith_multiplicand_0(i));
            let multiplicand_1 = vars.get_local_ext_algebra(Self::wires_ith_multiplicand_1(i));
            let output = vars.get_local_ext_algebra(Self::wires_ith_output(i));

            let product = chip.mul_algebra(ctx, &multiplicand_0, &multiplicand_1);
            let computed_output = chip.scalar_mul_algebra(ctx, const_0, &product);
            let diff = chip.sub_algebra(ctx, &output, &computed_output);
            constraints.extend(diff.to_ext_array());
        }
        constraints
    }
}

use std::fmt;

use halo2_base::{utils::BigPrimeField, Context};
use plonky2::field::types::Field;

use super::{
    id::{GateId, GOLDILOCKS_PHANTOM},
    CustomGate, EvaluationVars,
};
use crate::error::Result;
use crate::fields::{AssignedExtensionValue, ExtensionFieldChip, GoldilocksExt};
use crate::D;

/// `output = base^power` for a power given by `num_power_bits` little-endian bit wires, with
/// one intermediate wire per square-and-multiply step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExponentiationGate {
    pub num_power_bits: usize,
}

impl ExponentiationGate {
    pub(crate) fn parse(id: &GateId) -> Result<Self> {
        id.expect_degree(D)?;
        let num_power_bits = id.parse_field("num_power_bits")?;
        if num_power_bits == 0 {
            return Err(id.malformed("num_power_bits must be positive"));
        }
        Ok(Self { num_power_bits })
    }

    pub fn wire_base() -> usize {
        0
    }

    /// The `i`th bit of the exponent, little-endian.
    pub fn wire_power_bit(i: usize) -> usize {
        1 + i
    }

    pub fn wire_output(&self) -> usize {
        1 + self.num_power_bits
    }

    pub fn wire_intermediate_value(&self, i: usize) -> usize {
        2 + self.num_power_bits + i
    }
}

impl fmt::Display for ExponentiationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExponentiationGate {{ num_power_bits: {}, _phantom: {GOLDILOCKS_PHANTOM} }}<D={D}>",
            self.num_power_bits
        )
    }
}

impl CustomGate for ExponentiationGate {
    fn num_wires(&self) -> usize {
        self.wire_intermediate_value(self.num_power_bits)
    }

    fn num_constants(&self) -> usize {
        0
    }

    fn num_constraints(&self) -> usize {
        self.num_power_bits + 1
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        let base = vars.local_wires[Self::wire_base()];
        let intermediate_values = (0..self.num_power_bits)
            .map(|i| vars.local_wires[self.wire_intermediate_value(i)])
            .collect::<Vec<_>>();
        let output = vars.local_wires[self.wire_output()];

        let mut constraints = Vec::with_capacity(self.num_constraints());
        for i in 0..self.num_power_bits {
            // bits are stored little-endian but consumed most significant first
            let cur_bit = vars.local_wires[Self::wire_power_bit(self.num_power_bits - 1 - i)];

            // cur_bit * base - (cur_bit - 1), i.e. `base` when the bit is set and 1 otherwise
            let bit_minus_one = chip.sub(ctx, cur_bit, GoldilocksExt::ONE);
            let selected = chip.mul(ctx, cur_bit, base);
            let mul_by = chip.sub(ctx, selected, bit_minus_one);

            let computed = if i == 0 {
                mul_by
            } else {
                let prev = chip.square(ctx, intermediate_values[i - 1]);
                chip.mul(ctx, prev, mul_by)
            };
            constraints.push(chip.sub(ctx, computed, intermediate_values[i]));
        }
        constraints.push(chip.sub(ctx, output, intermediate_values[self.num_power_bits - 1]));
        constraints
    }
}

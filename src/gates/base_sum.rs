use std::fmt;

use halo2_base::{utils::BigPrimeField, Context};
use plonky2::field::types::Field;

use super::{id::GateId, CustomGate, EvaluationVars};
use crate::error::Result;
use crate::fields::{AssignedExtensionValue, ExtensionFieldChip, GoldilocksExt};

/// Decomposes wire 0 into `num_limbs` little-endian digits in base `base`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BaseSumGate {
    pub num_limbs: usize,
    pub base: usize,
}

impl BaseSumGate {
    pub const WIRE_SUM: usize = 0;
    pub const START_LIMBS: usize = 1;

    pub(crate) fn parse(id: &GateId) -> Result<Self> {
        let num_limbs = id.parse_field("num_limbs")?;
        let base = id
            .suffix
            .trim()
            .strip_prefix("+ Base:")
            .ok_or_else(|| id.malformed("missing `+ Base: B` suffix"))?
            .trim();
        let base: usize = base
            .parse()
            .map_err(|_| id.malformed(format!("invalid base `{base}`")))?;
        if base < 2 {
            return Err(id.malformed("base must be at least 2"));
        }
        Ok(Self { num_limbs, base })
    }

    pub fn limbs(&self) -> std::ops::Range<usize> {
        Self::START_LIMBS..Self::START_LIMBS + self.num_limbs
    }
}

impl fmt::Display for BaseSumGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BaseSumGate {{ num_limbs: {} }} + Base: {}",
            self.num_limbs, self.base
        )
    }
}

impl CustomGate for BaseSumGate {
    fn num_wires(&self) -> usize {
        1 + self.num_limbs
    }

    fn num_constants(&self) -> usize {
        0
    }

    fn num_constraints(&self) -> usize {
        1 + self.num_limbs
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        let sum = vars.local_wires[Self::WIRE_SUM];
        let limbs = &vars.local_wires[self.limbs()];

        let base = chip.load_constant(ctx, GoldilocksExt::from_canonical_usize(self.base));
        let computed_sum = chip.reduce_with_powers(ctx, limbs, &base);

        let mut constraints = Vec::with_capacity(self.num_constraints());
        constraints.push(chip.sub(ctx, computed_sum, sum));
        for limb in limbs {
            // prod_{i < base} (limb - i)
            let mut acc = *limb;
            for i in 1..self.base {
                let diff = chip.sub(ctx, limb, GoldilocksExt::from_canonical_usize(i));
                acc = chip.mul(ctx, acc, diff);
            }
            constraints.push(acc);
        }
        constraints
    }
}

use std::fmt;
use std::ops::Range;

use halo2_base::{utils::BigPrimeField, Context};
use itertools::Itertools;
use plonky2::field::types::Field;

use super::{
    id::{parse_u64_list, GateId, GOLDILOCKS_PHANTOM},
    CustomGate, EvaluationVars,
};
use crate::error::Result;
use crate::fields::{
    primitive_root_of_unity, AssignedExtensionValue, ExtensionFieldChip, Goldilocks, TWO_ADICITY,
};
use crate::D;

/// Interpolates `2^subgroup_bits` values on the coset `shift * <g>` and evaluates the
/// interpolant at a point. The barycentric sum is split into chunks of `degree - 1` points,
/// with the partial sums and products checkpointed in intermediate wires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CosetInterpolationGate {
    pub subgroup_bits: usize,
    pub degree: usize,
    /// As printed in the gate id; reduced modulo `p` on use.
    pub barycentric_weights: Vec<u64>,
}

impl CosetInterpolationGate {
    pub(crate) fn parse(id: &GateId) -> Result<Self> {
        id.expect_degree(D)?;
        let subgroup_bits: usize = id.parse_field("subgroup_bits")?;
        let degree: usize = id.parse_field("degree")?;
        let barycentric_weights = parse_u64_list(id, id.field("barycentric_weights")?)?;

        if subgroup_bits == 0 || subgroup_bits > TWO_ADICITY {
            return Err(id.malformed("subgroup_bits out of range"));
        }
        if degree < 2 || degree > 1 << subgroup_bits {
            return Err(id.malformed(format!("degree {degree} out of range")));
        }
        if barycentric_weights.len() != 1 << subgroup_bits {
            return Err(id.malformed(format!(
                "expected {} barycentric weights, found {}",
                1usize << subgroup_bits,
                barycentric_weights.len()
            )));
        }
        Ok(Self {
            subgroup_bits,
            degree,
            barycentric_weights,
        })
    }

    pub fn num_points(&self) -> usize {
        1 << self.subgroup_bits
    }

    pub fn num_intermediates(&self) -> usize {
        (self.num_points() - 2) / (self.degree - 1)
    }

    pub fn wire_shift() -> usize {
        0
    }

    fn start_values() -> usize {
        1
    }

    pub fn wires_value(i: usize) -> Range<usize> {
        let start = Self::start_values() + i * D;
        start..start + D
    }

    fn start_evaluation_point(&self) -> usize {
        Self::start_values() + self.num_points() * D
    }

    pub fn wires_evaluation_point(&self) -> Range<usize> {
        let start = self.start_evaluation_point();
        start..start + D
    }

    fn start_evaluation_value(&self) -> usize {
        self.start_evaluation_point() + D
    }

    pub fn wires_evaluation_value(&self) -> Range<usize> {
        let start = self.start_evaluation_value();
        start..start + D
    }

    fn start_intermediates(&self) -> usize {
        self.start_evaluation_value() + D
    }

    pub fn wires_intermediate_eval(&self, i: usize) -> Range<usize> {
        let start = self.start_intermediates() + D * i;
        start..start + D
    }

    pub fn wires_intermediate_prod(&self, i: usize) -> Range<usize> {
        let start = self.start_intermediates() + D * (self.num_intermediates() + i);
        start..start + D
    }

    /// `evaluation_point / shift`, the point moved onto the subgroup.
    pub fn wires_shifted_evaluation_point(&self) -> Range<usize> {
        let start = self.start_intermediates() + D * 2 * self.num_intermediates();
        start..start + D
    }

    fn weights(&self) -> Vec<Goldilocks> {
        self.barycentric_weights
            .iter()
            .map(|w| Goldilocks::from_noncanonical_u64(*w))
            .collect()
    }
}

impl fmt::Display for CosetInterpolationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CosetInterpolationGate {{ subgroup_bits: {}, degree: {}, barycentric_weights: [{}], _phantom: {GOLDILOCKS_PHANTOM} }}<D={D}>",
            self.subgroup_bits,
            self.degree,
            self.barycentric_weights.iter().join(", ")
        )
    }
}

impl CustomGate for CosetInterpolationGate {
    fn num_wires(&self) -> usize {
        self.wires_shifted_evaluation_point().end
    }

    fn num_constants(&self) -> usize {
        0
    }

    fn num_constraints(&self) -> usize {
        D * (2 + 2 * self.num_intermediates())
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        let mut constraints = Vec::with_capacity(self.num_constraints());

        let shift = vars.local_wires[Self::wire_shift()];
        let evaluation_point = vars.get_local_ext_algebra(self.wires_evaluation_point());
        let shifted_evaluation_point = vars.get_local_ext_algebra(self.wires_shifted_evaluation_point());

        let rescaled = chip.scalar_mul_algebra(ctx, shift, &shifted_evaluation_point);
        let diff = chip.sub_algebra(ctx, &evaluation_point, &rescaled);
        constraints.extend(diff.to_ext_array());

        let generator = primitive_root_of_unity(self.subgroup_bits);
        let domain = generator.powers().take(self.num_points()).collect::<Vec<_>>();
        let values = (0..self.num_points())
            .map(|i| vars.get_local_ext_algebra(Self::wires_value(i)))
            .collect::<Vec<_>>();
        let weights = self.weights();

        let zero = chip.zero_algebra(ctx);
        let one = chip.one_algebra(ctx);
        let (mut computed_eval, mut computed_prod) = chip.partial_interpolate_algebra(
            ctx,
            &domain[..self.degree],
            &values[..self.degree],
            &weights[..self.degree],
            &shifted_evaluation_point,
            zero,
            one,
        );

        for i in 0..self.num_intermediates() {
            let intermediate_eval = vars.get_local_ext_algebra(self.wires_intermediate_eval(i));
            let intermediate_prod = vars.get_local_ext_algebra(self.wires_intermediate_prod(i));

            let eval_diff = chip.sub_algebra(ctx, &intermediate_eval, &computed_eval);
            constraints.extend(eval_diff.to_ext_array());
            let prod_diff = chip.sub_algebra(ctx, &intermediate_prod, &computed_prod);
            constraints.extend(prod_diff.to_ext_array());

            let start = 1 + (self.degree - 1) * (i + 1);
            let end = (start + self.degree - 1).min(self.num_points());
            (computed_eval, computed_prod) = chip.partial_interpolate_algebra(
                ctx,
                &domain[start..end],
                &values[start..end],
                &weights[start..end],
                &shifted_evaluation_point,
                intermediate_eval,
                intermediate_prod,
            );
        }

        let evaluation_value = vars.get_local_ext_algebra(self.wires_evaluation_value());
        let eval_diff = chip.sub_algebra(ctx, &evaluation_value, &computed_eval);
        constraints.extend(eval_diff.to_ext_array());
        constraints
    }
}

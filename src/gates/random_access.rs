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

/// `num_copies` lookups of a claimed element in a list of `2^bits` items, plus
/// `num_extra_constants` constants routed to wires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RandomAccessGate {
    pub bits: usize,
    pub num_copies: usize,
    pub num_extra_constants: usize,
}

impl RandomAccessGate {
    pub(crate) fn parse(id: &GateId) -> Result<Self> {
        id.expect_degree(D)?;
        Ok(Self {
            bits: id.parse_field("bits")?,
            num_copies: id.parse_field("num_copies")?,
            num_extra_constants: id.parse_field("num_extra_constants")?,
        })
    }

    pub fn vec_size(&self) -> usize {
        1 << self.bits
    }

    pub fn wire_access_index(&self, copy: usize) -> usize {
        (2 + self.vec_size()) * copy
    }

    pub fn wire_claimed_element(&self, copy: usize) -> usize {
        (2 + self.vec_size()) * copy + 1
    }

    pub fn wire_list_item(&self, i: usize, copy: usize) -> usize {
        (2 + self.vec_size()) * copy + 2 + i
    }

    fn start_extra_constants(&self) -> usize {
        (2 + self.vec_size()) * self.num_copies
    }

    fn wire_extra_constant(&self, i: usize) -> usize {
        self.start_extra_constants() + i
    }

    /// Wires that take part in copy constraints; the bit wires follow them.
    pub fn num_routed_wires(&self) -> usize {
        self.start_extra_constants() + self.num_extra_constants
    }

    pub fn wire_bit(&self, i: usize, copy: usize) -> usize {
        self.num_routed_wires() + copy * self.bits + i
    }
}

impl fmt::Display for RandomAccessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RandomAccessGate {{ bits: {}, num_copies: {}, num_extra_constants: {}, _phantom: {GOLDILOCKS_PHANTOM} }}<D={D}>",
            self.bits, self.num_copies, self.num_extra_constants
        )
    }
}

impl CustomGate for RandomAccessGate {
    fn num_wires(&self) -> usize {
        self.wire_bit(0, self.num_copies)
    }

    fn num_constants(&self) -> usize {
        self.num_extra_constants
    }

    fn num_constraints(&self) -> usize {
        (self.bits + 2) * self.num_copies + self.num_extra_constants
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        let two = chip.load_constant(ctx, GoldilocksExt::TWO);
        let mut constraints = Vec::with_capacity(self.num_constraints());

        for copy in 0..self.num_copies {
            let access_index = vars.local_wires[self.wire_access_index(copy)];
            let mut list_items = (0..self.vec_size())
                .map(|i| vars.local_wires[self.wire_list_item(i, copy)])
                .collect::<Vec<_>>();
            let claimed_element = vars.local_wires[self.wire_claimed_element(copy)];
            let bits = (0..self.bits)
                .map(|i| vars.local_wires[self.wire_bit(i, copy)])
                .collect::<Vec<_>>();

            for b in &bits {
                let b_squared = chip.square(ctx, b);
                constraints.push(chip.sub(ctx, b_squared, b));
            }

            let reconstructed_index = chip.reduce_with_powers(ctx, &bits, &two);
            constraints.push(chip.sub(ctx, reconstructed_index, access_index));

            // Fold the list one bit at a time: `x + b * (y - x)`.
            for b in &bits {
                list_items = list_items
                    .chunks(2)
                    .map(|pair| {
                        let diff = chip.sub(ctx, pair[1], pair[0]);
                        chip.mul_add(ctx, b, diff, pair[0])
                    })
                    .collect();
            }
            debug_assert_eq!(list_items.len(), 1);

            constraints.push(chip.sub(ctx, list_items[0], claimed_element));
        }

        for i in 0..self.num_extra_constants {
            constraints.push(chip.sub(
                ctx,
                vars.local_constants[i],
                vars.local_wires[self.wire_extra_constant(i)],
            ));
        }
        constraints
    }
}

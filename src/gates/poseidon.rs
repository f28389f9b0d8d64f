use std::fmt;
use std::ops::Range;

use halo2_base::{utils::BigPrimeField, Context};
use plonky2::field::types::Field;

use super::{
    id::{GateId, GOLDILOCKS_PHANTOM},
    CustomGate, EvaluationVars,
};
use crate::error::Result;
use crate::fields::{AssignedExtensionAlgebra, AssignedExtensionValue, ExtensionFieldChip, GoldilocksExt};
use crate::hash::poseidon_goldilocks::{
    FAST_PARTIAL_ROUND_CONSTANTS, HALF_N_FULL_ROUNDS, N_PARTIAL_ROUNDS, WIDTH,
};
use crate::hash::PoseidonGoldilocksChip;
use crate::D;

fn parse_width(id: &GateId) -> Result<()> {
    let width: usize = id.generic_param("WIDTH")?;
    if width != WIDTH {
        return Err(id.malformed(format!("expected WIDTH={WIDTH}, found WIDTH={width}")));
    }
    Ok(())
}

/// One full Poseidon permutation per row. The first eight inputs may be swapped in halves
/// so Merkle paths can be hashed in either order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoseidonGate;

impl PoseidonGate {
    pub const WIRE_SWAP: usize = 2 * WIDTH;

    const START_DELTA: usize = 2 * WIDTH + 1;
    const START_FULL_0: usize = Self::START_DELTA + 4;
    const START_PARTIAL: usize = Self::START_FULL_0 + WIDTH * (HALF_N_FULL_ROUNDS - 1);
    const START_FULL_1: usize = Self::START_PARTIAL + N_PARTIAL_ROUNDS;
    const END: usize = Self::START_FULL_1 + WIDTH * HALF_N_FULL_ROUNDS;

    pub(crate) fn parse(id: &GateId) -> Result<Self> {
        parse_width(id)?;
        Ok(Self)
    }

    pub fn wire_input(i: usize) -> usize {
        i
    }

    pub fn wire_output(i: usize) -> usize {
        WIDTH + i
    }

    /// `swap * (rhs - lhs)` for the `i`th pair of swappable inputs.
    pub fn wire_delta(i: usize) -> usize {
        Self::START_DELTA + i
    }

    /// S-box input of lane `i` in full round `round` of the first half; round 0 takes its
    /// input straight from the input wires.
    fn wire_full_sbox_0(round: usize, i: usize) -> usize {
        debug_assert!(round != 0);
        Self::START_FULL_0 + WIDTH * (round - 1) + i
    }

    fn wire_partial_sbox(round: usize) -> usize {
        Self::START_PARTIAL + round
    }

    fn wire_full_sbox_1(round: usize, i: usize) -> usize {
        Self::START_FULL_1 + WIDTH * round + i
    }
}

impl fmt::Display for PoseidonGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoseidonGate({GOLDILOCKS_PHANTOM})<WIDTH={WIDTH}>")
    }
}

impl CustomGate for PoseidonGate {
    fn num_wires(&self) -> usize {
        Self::END
    }

    fn num_constants(&self) -> usize {
        0
    }

    fn num_constraints(&self) -> usize {
        WIDTH * (HALF_N_FULL_ROUNDS - 1) + N_PARTIAL_ROUNDS + WIDTH * HALF_N_FULL_ROUNDS + WIDTH + 1 + 4
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        let poseidon = PoseidonGoldilocksChip::new(chip.clone());
        let wires = &vars.local_wires;
        let mut constraints = Vec::with_capacity(self.num_constraints());

        let swap = wires[Self::WIRE_SWAP];
        let swap_minus_one = chip.sub(ctx, swap, GoldilocksExt::ONE);
        constraints.push(chip.mul(ctx, swap, swap_minus_one));

        for i in 0..4 {
            let lhs = wires[Self::wire_input(i)];
            let rhs = wires[Self::wire_input(i + 4)];
            let diff = chip.sub(ctx, rhs, lhs);
            let expected_delta = chip.mul(ctx, swap, diff);
            constraints.push(chip.sub(ctx, expected_delta, wires[Self::wire_delta(i)]));
        }

        let mut state: [AssignedExtensionValue<F>; WIDTH] = core::array::from_fn(|i| wires[Self::wire_input(i)]);
        for i in 0..4 {
            let delta = wires[Self::wire_delta(i)];
            state[i] = chip.add(ctx, wires[Self::wire_input(i)], delta);
            state[i + 4] = chip.sub(ctx, wires[Self::wire_input(i + 4)], delta);
        }

        let mut round_ctr = 0;
        for r in 0..HALF_N_FULL_ROUNDS {
            state = poseidon.constant_layer_extension(ctx, &state, round_ctr);
            if r != 0 {
                for i in 0..WIDTH {
                    let sbox_in = wires[Self::wire_full_sbox_0(r, i)];
                    constraints.push(chip.sub(ctx, state[i], sbox_in));
                    state[i] = sbox_in;
                }
            }
            state = poseidon.sbox_layer_extension(ctx, &state);
            state = poseidon.mds_layer_extension(ctx, &state);
            round_ctr += 1;
        }

        state = poseidon.partial_first_constant_layer_extension(ctx, &state);
        state = poseidon.mds_partial_layer_init_extension(ctx, &state);
        for r in 0..N_PARTIAL_ROUNDS {
            let sbox_in = wires[Self::wire_partial_sbox(r)];
            constraints.push(chip.sub(ctx, state[0], sbox_in));
            state[0] = poseidon.sbox_monomial_extension(ctx, &sbox_in);
            if r < N_PARTIAL_ROUNDS - 1 {
                let c = GoldilocksExt::from_canonical_u64(FAST_PARTIAL_ROUND_CONSTANTS[r]);
                state[0] = chip.add(ctx, state[0], c);
            }
            state = poseidon.mds_partial_layer_fast_extension(ctx, &state, r);
        }
        round_ctr += N_PARTIAL_ROUNDS;

        for r in 0..HALF_N_FULL_ROUNDS {
            state = poseidon.constant_layer_extension(ctx, &state, round_ctr);
            for i in 0..WIDTH {
                let sbox_in = wires[Self::wire_full_sbox_1(r, i)];
                constraints.push(chip.sub(ctx, state[i], sbox_in));
                state[i] = sbox_in;
            }
            state = poseidon.sbox_layer_extension(ctx, &state);
            state = poseidon.mds_layer_extension(ctx, &state);
            round_ctr += 1;
        }

        for i in 0..WIDTH {
            constraints.push(chip.sub(ctx, state[i], wires[Self::wire_output(i)]));
        }
        constraints
    }
}

/// The Poseidon MDS layer applied to extension algebra lanes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoseidonMdsGate;

impl PoseidonMdsGate {
    pub(crate) fn parse(id: &GateId) -> Result<Self> {
        parse_width(id)?;
        Ok(Self)
    }

    pub fn wires_input(i: usize) -> Range<usize> {
        i * D..(i + 1) * D
    }

    pub fn wires_output(i: usize) -> Range<usize> {
        (WIDTH + i) * D..(WIDTH + i + 1) * D
    }
}

impl fmt::Display for PoseidonMdsGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoseidonMdsGate({GOLDILOCKS_PHANTOM})<WIDTH={WIDTH}>")
    }
}

impl CustomGate for PoseidonMdsGate {
    fn num_wires(&self) -> usize {
        2 * D * WIDTH
    }

    fn num_constants(&self) -> usize {
        0
    }

    fn num_constraints(&self) -> usize {
        D * WIDTH
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        let poseidon = PoseidonGoldilocksChip::new(chip.clone());
        let inputs: [AssignedExtensionAlgebra<F>; WIDTH] =
            core::array::from_fn(|i| vars.get_local_ext_algebra(Self::wires_input(i)));

        // The MDS matrix has base field entries, so it acts on each algebra coordinate
        // independently.
        let [low, high] = [0, 1].map(|k| {
            let lanes = inputs.map(|input| input.coeffs[k]);
            poseidon.mds_layer_extension(ctx, &lanes)
        });

        let mut constraints = Vec::with_capacity(self.num_constraints());
        for i in 0..WIDTH {
            let output = vars.get_local_ext_algebra(Self::wires_output(i));
            let computed = AssignedExtensionAlgebra::construct([low[i], high[i]]);
            let diff = chip.sub_algebra(ctx, &output, &computed);
            constraints.extend(diff.to_ext_array());
        }
        constraints
    }
}

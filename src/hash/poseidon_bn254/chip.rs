use std::sync::Arc;

use halo2_base::{
    gates::{GateChip, GateInstructions},
    utils::{biguint_to_fe, BigPrimeField},
    AssignedValue, Context,
    QuantumCell::{Constant, Existing},
};

use super::{
    modulus, num_to_vec_chunks, PoseidonBn254Params, GOLDILOCKS_PER_LANE, RATE, T,
    TO_VEC_CHUNK_BITS,
};
use crate::error::{Result, VerifierError};
use crate::hash::{HashOut, MerkleHasherChip};

struct PoseidonState<F: BigPrimeField> {
    s: [AssignedValue<F>; T],
}

impl<F: BigPrimeField> PoseidonState<F> {
    fn x_power5_with_constant(
        ctx: &mut Context<F>,
        gate: &GateChip<F>,
        x: AssignedValue<F>,
        constant: &F,
    ) -> AssignedValue<F> {
        let x = gate.add(ctx, x, Constant(*constant));
        let x2 = gate.mul(ctx, x, x);
        let x4 = gate.mul(ctx, x2, x2);
        gate.mul(ctx, x, x4)
    }

    fn sbox_full(&mut self, ctx: &mut Context<F>, gate: &GateChip<F>, constants: &[F; T]) {
        for (x, constant) in self.s.iter_mut().zip(constants.iter()) {
            *x = Self::x_power5_with_constant(ctx, gate, *x, constant);
        }
    }

    fn sbox_part(&mut self, ctx: &mut Context<F>, gate: &GateChip<F>, constant: &F) {
        let x = &mut self.s[0];
        *x = Self::x_power5_with_constant(ctx, gate, *x, constant);
    }

    /// `state <- M * (state + pending)`. `pending` holds round constants that have not been
    /// added to their lanes yet; they are folded into one constant per row.
    fn apply_mds(&mut self, ctx: &mut Context<F>, gate: &GateChip<F>, mds: &[[F; T]; T], pending: &[F; T]) {
        let s = self.s;
        self.s = core::array::from_fn(|i| {
            let row = &mds[i];
            let folded = row
                .iter()
                .zip(pending.iter())
                .fold(F::ZERO, |acc, (m, c)| acc + *m * c);
            let mixed = gate.inner_product(ctx, s, row.iter().map(|m| Constant(*m)));
            if folded == F::ZERO {
                mixed
            } else {
                gate.add(ctx, mixed, Constant(folded))
            }
        });
    }

    fn permutation(&mut self, ctx: &mut Context<F>, gate: &GateChip<F>, params: &PoseidonBn254Params<F>) {
        let zeros = [F::ZERO; T];
        for (round, constants) in params.round_constants.iter().enumerate() {
            if PoseidonBn254Params::<F>::is_full_round(round) {
                self.sbox_full(ctx, gate, constants);
                self.apply_mds(ctx, gate, &params.mds, &zeros);
            } else {
                self.sbox_part(ctx, gate, &constants[0]);
                let mut pending = *constants;
                pending[0] = F::ZERO;
                self.apply_mds(ctx, gate, &params.mds, &pending);
            }
        }
    }
}

/// Poseidon over the outer field, width 4 and rate 3. Digests are single cells and inner
/// field inputs are packed three per lane.
#[derive(Clone, Debug)]
pub struct PoseidonBn254Chip<F: BigPrimeField> {
    gate: GateChip<F>,
    params: Arc<PoseidonBn254Params<F>>,
}

impl<F: BigPrimeField> PoseidonBn254Chip<F> {
    pub fn new(gate: GateChip<F>, params: Arc<PoseidonBn254Params<F>>) -> Self {
        Self { gate, params }
    }

    pub fn gate(&self) -> &GateChip<F> {
        &self.gate
    }

    pub fn params(&self) -> &PoseidonBn254Params<F> {
        &self.params
    }

    pub fn permute(&self, ctx: &mut Context<F>, state: [AssignedValue<F>; T]) -> [AssignedValue<F>; T] {
        let mut state = PoseidonState { s: state };
        state.permutation(ctx, &self.gate, &self.params);
        state.s
    }

    /// `sum_i inputs[i] * 2^(64 i)`; the inputs must be canonical for the packing to be
    /// injective.
    pub fn pack(&self, ctx: &mut Context<F>, inputs: &[AssignedValue<F>]) -> AssignedValue<F> {
        debug_assert!(inputs.len() <= GOLDILOCKS_PER_LANE);
        if inputs.is_empty() {
            return ctx.load_zero();
        }
        let shift = F::from(1u64 << 32) * F::from(1u64 << 32);
        let mut coeff = F::ONE;
        let coeffs = inputs
            .iter()
            .map(|_| {
                let c = coeff;
                coeff *= shift;
                Constant(c)
            })
            .collect::<Vec<_>>();
        self.gate.inner_product(ctx, inputs.iter().copied(), coeffs)
    }

    /// Overwrite-mode absorption of nine inner field elements per permutation; the digest
    /// is lane 0.
    pub fn hash_no_pad(&self, ctx: &mut Context<F>, inputs: &[AssignedValue<F>]) -> AssignedValue<F> {
        let zero = ctx.load_zero();
        let mut state = [zero; T];
        for chunk in inputs.chunks(RATE * GOLDILOCKS_PER_LANE) {
            for (lane, packed) in chunk.chunks(GOLDILOCKS_PER_LANE).enumerate() {
                state[lane + 1] = self.pack(ctx, packed);
            }
            state = self.permute(ctx, state);
        }
        state[0]
    }

    /// Bits of `x` constrained to be the canonical representative, i.e. at most `r - 1`.
    pub fn to_canonical_bits(&self, ctx: &mut Context<F>, x: AssignedValue<F>) -> Vec<AssignedValue<F>> {
        let num_bits = F::NUM_BITS as usize;
        let bits = self.gate.num_to_bits(ctx, x, num_bits);
        let max = modulus::<F>() - 1u64;

        // `eq` tracks whether the bits scanned so far, from the top, match `r - 1`.
        let mut eq: Option<AssignedValue<F>> = None;
        for i in (0..num_bits).rev() {
            let bit = bits[i];
            if max.bit(i as u64) {
                eq = Some(match eq {
                    None => bit,
                    Some(eq) => self.gate.mul(ctx, eq, bit),
                });
            } else {
                let exceeds = match eq {
                    None => bit,
                    Some(eq) => self.gate.mul(ctx, eq, bit),
                };
                self.gate.assert_is_const(ctx, &exceeds, &F::ZERO);
            }
        }
        bits
    }
}

impl<F: BigPrimeField> MerkleHasherChip<F> for PoseidonBn254Chip<F> {
    type Digest = AssignedValue<F>;

    fn load_digest(&self, ctx: &mut Context<F>, digest: &HashOut) -> Result<Self::Digest> {
        let HashOut::Bn254(digest) = digest else {
            return Err(VerifierError::DigestKind { expected: "BN254" });
        };
        if digest.0 >= modulus::<F>() {
            return Err(VerifierError::InvalidParameter(format!(
                "digest {} is not a canonical field element",
                digest.0
            )));
        }
        Ok(ctx.load_witness(biguint_to_fe(&digest.0)))
    }

    fn hash_or_noop(&self, ctx: &mut Context<F>, inputs: &[AssignedValue<F>]) -> Self::Digest {
        if inputs.len() <= GOLDILOCKS_PER_LANE {
            self.pack(ctx, inputs)
        } else {
            self.hash_no_pad(ctx, inputs)
        }
    }

    fn two_to_one(&self, ctx: &mut Context<F>, left: &Self::Digest, right: &Self::Digest) -> Self::Digest {
        let zero = ctx.load_zero();
        self.permute(ctx, [zero, zero, *left, *right])[0]
    }

    fn select(
        &self,
        ctx: &mut Context<F>,
        bit: AssignedValue<F>,
        a: &Self::Digest,
        b: &Self::Digest,
    ) -> Self::Digest {
        self.gate.select(ctx, Existing(*a), Existing(*b), bit)
    }

    fn constrain_equal(&self, ctx: &mut Context<F>, a: &Self::Digest, b: &Self::Digest) {
        ctx.constrain_equal(a, b);
    }

    fn to_goldilocks(&self, ctx: &mut Context<F>, digest: &Self::Digest) -> Vec<AssignedValue<F>> {
        let bits = self.to_canonical_bits(ctx, *digest);
        bits.chunks(TO_VEC_CHUNK_BITS)
            .map(|chunk| {
                let coeffs = (0..chunk.len()).map(|i| Constant(F::from(1u64 << i)));
                self.gate.inner_product(ctx, chunk.iter().copied(), coeffs)
            })
            .take(num_to_vec_chunks::<F>())
            .collect()
    }

    fn to_cells(digest: &Self::Digest) -> Vec<AssignedValue<F>> {
        vec![*digest]
    }
}

use super::{
    mds_row, ALL_ROUND_CONSTANTS, FAST_PARTIAL_FIRST_ROUND_CONSTANT, FAST_PARTIAL_ROUND_CONSTANTS,
    FAST_PARTIAL_ROUND_INITIAL_MATRIX, FAST_PARTIAL_ROUND_VS, FAST_PARTIAL_ROUND_W_HATS,
    HALF_N_FULL_ROUNDS, HASH_SIZE, MDS_MATRIX_CIRC, MDS_MATRIX_DIAG, N_PARTIAL_ROUNDS, RATE, WIDTH,
};
use crate::error::{Result, VerifierError};
use crate::fields::{
    AssignedExtensionValue, ExtensionFieldChip, Goldilocks, GoldilocksChip, GoldilocksExt,
};
use crate::hash::{HashOut, MerkleHasherChip};
use crate::D;
use halo2_base::{
    gates::GateInstructions, utils::BigPrimeField, AssignedValue, Context,
    QuantumCell::Constant,
};
use plonky2::field::extension::FieldExtension;
use plonky2::field::types::Field;

pub type GoldilocksHashOut<F> = [AssignedValue<F>; HASH_SIZE];

/// Bit bound of a canonical value plus one canonical constant.
const SHIFTED_BITS: usize = 65;

/// Width and partial round optimized Poseidon over Goldilocks, evaluated with emulated
/// arithmetic. The base lane permutation drives hashing and the challenger, the extension lane
/// layers are used to evaluate `PoseidonGate` constraints at an extension point.
#[derive(Clone, Debug)]
pub struct PoseidonGoldilocksChip<F: BigPrimeField> {
    extension: ExtensionFieldChip<F>,
}

impl<F: BigPrimeField> PoseidonGoldilocksChip<F> {
    pub fn new(extension: ExtensionFieldChip<F>) -> Self {
        Self { extension }
    }

    pub fn goldilocks(&self) -> &GoldilocksChip<F> {
        self.extension.goldilocks()
    }

    pub fn extension(&self) -> &ExtensionFieldChip<F> {
        &self.extension
    }

    /// `sum_i coeffs[i] * values[i]` for values below `2^value_bits`, reduced once.
    fn linear_row(
        &self,
        ctx: &mut Context<F>,
        values: &[AssignedValue<F>],
        coeffs: &[u64],
        value_bits: usize,
    ) -> AssignedValue<F> {
        let gl = self.goldilocks();
        let coeff_sum: u128 = coeffs.iter().map(|c| *c as u128).sum();
        let bits = value_bits + (u128::BITS - coeff_sum.leading_zeros()) as usize;
        let raw = gl.inner_product_const_no_reduce(ctx, values.iter().copied(), coeffs.iter().copied());
        gl.reduce_bounded(ctx, raw, bits)
    }

    /// `x^7` for `x < 2^x_bits`, reduced twice.
    fn sbox_monomial(&self, ctx: &mut Context<F>, x: AssignedValue<F>, x_bits: usize) -> AssignedValue<F> {
        let gl = self.goldilocks();
        let x2 = gl.mul_no_reduce(ctx, x, x);
        let x3 = gl.mul_no_reduce(ctx, x, x2);
        let x3 = gl.reduce_bounded(ctx, x3, 3 * x_bits);
        let x6 = gl.mul_no_reduce(ctx, x3, x3);
        let x7 = gl.mul_no_reduce(ctx, x, x6);
        gl.reduce_bounded(ctx, x7, x_bits + 128)
    }

    // BASE LANES
    // =========================================================================

    /// The permutation on canonical lanes. Outputs are canonical.
    pub fn permute(
        &self,
        ctx: &mut Context<F>,
        state: &[AssignedValue<F>; WIDTH],
    ) -> [AssignedValue<F>; WIDTH] {
        let mut state = *state;
        let mut round_ctr = 0;
        self.full_rounds(ctx, &mut state, &mut round_ctr);
        self.partial_rounds(ctx, &mut state, &mut round_ctr);
        self.full_rounds(ctx, &mut state, &mut round_ctr);
        state
    }

    fn full_rounds(
        &self,
        ctx: &mut Context<F>,
        state: &mut [AssignedValue<F>; WIDTH],
        round_ctr: &mut usize,
    ) {
        let gate = self.goldilocks().gate();
        for _ in 0..HALF_N_FULL_ROUNDS {
            for (i, lane) in state.iter_mut().enumerate() {
                let round_constant = ALL_ROUND_CONSTANTS[i + WIDTH * *round_ctr];
                let shifted = gate.add(ctx, *lane, Constant(F::from(round_constant)));
                *lane = self.sbox_monomial(ctx, shifted, SHIFTED_BITS);
            }
            *state = self.mds_layer(ctx, state, 64);
            *round_ctr += 1;
        }
    }

    fn partial_rounds(
        &self,
        ctx: &mut Context<F>,
        state: &mut [AssignedValue<F>; WIDTH],
        round_ctr: &mut usize,
    ) {
        let gate = self.goldilocks().gate();
        for (lane, c) in state.iter_mut().zip(FAST_PARTIAL_FIRST_ROUND_CONSTANT) {
            *lane = gate.add(ctx, *lane, Constant(F::from(c)));
        }
        *state = self.mds_partial_layer_init(ctx, state, SHIFTED_BITS);
        let mut first_bits = SHIFTED_BITS;
        for (r, c) in FAST_PARTIAL_ROUND_CONSTANTS.iter().enumerate() {
            let s0 = self.sbox_monomial(ctx, state[0], first_bits);
            state[0] = gate.add(ctx, s0, Constant(F::from(*c)));
            *state = self.mds_partial_layer_fast(ctx, state, r, SHIFTED_BITS);
            first_bits = 64;
        }
        *round_ctr += N_PARTIAL_ROUNDS;
    }

    fn mds_layer(
        &self,
        ctx: &mut Context<F>,
        state: &[AssignedValue<F>; WIDTH],
        value_bits: usize,
    ) -> [AssignedValue<F>; WIDTH] {
        core::array::from_fn(|r| self.linear_row(ctx, state, &mds_row(r), value_bits))
    }

    /// Lane 0 passes through unchanged, so it keeps its bound.
    fn mds_partial_layer_init(
        &self,
        ctx: &mut Context<F>,
        state: &[AssignedValue<F>; WIDTH],
        value_bits: usize,
    ) -> [AssignedValue<F>; WIDTH] {
        let mut result = *state;
        for c in 1..WIDTH {
            let coeffs = (1..WIDTH)
                .map(|r| FAST_PARTIAL_ROUND_INITIAL_MATRIX[r - 1][c - 1])
                .collect::<Vec<_>>();
            result[c] = self.linear_row(ctx, &state[1..], &coeffs, value_bits);
        }
        result
    }

    fn mds_partial_layer_fast(
        &self,
        ctx: &mut Context<F>,
        state: &[AssignedValue<F>; WIDTH],
        r: usize,
        value_bits: usize,
    ) -> [AssignedValue<F>; WIDTH] {
        let mds0to0 = MDS_MATRIX_CIRC[0] + MDS_MATRIX_DIAG[0];
        let coeffs = std::iter::once(mds0to0)
            .chain(FAST_PARTIAL_ROUND_W_HATS[r])
            .collect::<Vec<_>>();
        let mut result = *state;
        result[0] = self.linear_row(ctx, state, &coeffs, value_bits);
        for i in 1..WIDTH {
            let coeffs = [FAST_PARTIAL_ROUND_VS[r][i - 1], 1];
            result[i] = self.linear_row(ctx, &[state[0], state[i]], &coeffs, value_bits);
        }
        result
    }

    /// Overwrite-mode sponge over canonical inputs, squeezing `num_outputs` elements.
    pub fn hash_n_to_m_no_pad(
        &self,
        ctx: &mut Context<F>,
        inputs: &[AssignedValue<F>],
        num_outputs: usize,
    ) -> Vec<AssignedValue<F>> {
        let zero = ctx.load_zero();
        let mut state = [zero; WIDTH];
        for chunk in inputs.chunks(RATE) {
            state[..chunk.len()].copy_from_slice(chunk);
            state = self.permute(ctx, &state);
        }
        let mut outputs = vec![];
        loop {
            for element in &state[..RATE] {
                outputs.push(*element);
                if outputs.len() == num_outputs {
                    return outputs;
                }
            }
            state = self.permute(ctx, &state);
        }
    }

    pub fn hash_no_pad(&self, ctx: &mut Context<F>, inputs: &[AssignedValue<F>]) -> GoldilocksHashOut<F> {
        let outputs = self.hash_n_to_m_no_pad(ctx, inputs, HASH_SIZE);
        [outputs[0], outputs[1], outputs[2], outputs[3]]
    }

    // EXTENSION LANES
    // =========================================================================

    fn split(state: &[AssignedExtensionValue<F>; WIDTH]) -> [[AssignedValue<F>; WIDTH]; 2] {
        [0, 1].map(|c| state.map(|lane| lane.coeffs[c]))
    }

    fn join(coords: [[AssignedValue<F>; WIDTH]; 2]) -> [AssignedExtensionValue<F>; WIDTH] {
        core::array::from_fn(|i| AssignedExtensionValue::construct([coords[0][i], coords[1][i]]))
    }

    pub fn constant_layer_extension(
        &self,
        ctx: &mut Context<F>,
        state: &[AssignedExtensionValue<F>; WIDTH],
        round_ctr: usize,
    ) -> [AssignedExtensionValue<F>; WIDTH] {
        core::array::from_fn(|i| {
            let c = Goldilocks::from_canonical_u64(ALL_ROUND_CONSTANTS[i + WIDTH * round_ctr]);
            self.extension.add(ctx, state[i], c)
        })
    }

    pub fn sbox_monomial_extension(
        &self,
        ctx: &mut Context<F>,
        x: &AssignedExtensionValue<F>,
    ) -> AssignedExtensionValue<F> {
        let ext = &self.extension;
        let x2 = ext.square(ctx, x);
        let x4 = ext.square(ctx, x2);
        let x3 = ext.mul(ctx, x, x2);
        ext.mul(ctx, x4, x3)
    }

    pub fn sbox_layer_extension(
        &self,
        ctx: &mut Context<F>,
        state: &[AssignedExtensionValue<F>; WIDTH],
    ) -> [AssignedExtensionValue<F>; WIDTH] {
        core::array::from_fn(|i| self.sbox_monomial_extension(ctx, &state[i]))
    }

    pub fn mds_layer_extension(
        &self,
        ctx: &mut Context<F>,
        state: &[AssignedExtensionValue<F>; WIDTH],
    ) -> [AssignedExtensionValue<F>; WIDTH] {
        let coords = Self::split(state).map(|lanes| self.mds_layer(ctx, &lanes, 64));
        Self::join(coords)
    }

    pub fn partial_first_constant_layer_extension(
        &self,
        ctx: &mut Context<F>,
        state: &[AssignedExtensionValue<F>; WIDTH],
    ) -> [AssignedExtensionValue<F>; WIDTH] {
        core::array::from_fn(|i| {
            let c = Goldilocks::from_canonical_u64(FAST_PARTIAL_FIRST_ROUND_CONSTANT[i]);
            self.extension.add(ctx, state[i], c)
        })
    }

    pub fn mds_partial_layer_init_extension(
        &self,
        ctx: &mut Context<F>,
        state: &[AssignedExtensionValue<F>; WIDTH],
    ) -> [AssignedExtensionValue<F>; WIDTH] {
        let coords = Self::split(state).map(|lanes| self.mds_partial_layer_init(ctx, &lanes, 64));
        Self::join(coords)
    }

    pub fn mds_partial_layer_fast_extension(
        &self,
        ctx: &mut Context<F>,
        state: &[AssignedExtensionValue<F>; WIDTH],
        r: usize,
    ) -> [AssignedExtensionValue<F>; WIDTH] {
        let coords = Self::split(state).map(|lanes| self.mds_partial_layer_fast(ctx, &lanes, r, 64));
        Self::join(coords)
    }

    /// The permutation with every lane in the extension field.
    pub fn permute_extension(
        &self,
        ctx: &mut Context<F>,
        state: &[AssignedExtensionValue<F>; WIDTH],
    ) -> [AssignedExtensionValue<F>; WIDTH] {
        let mut state = *state;
        let mut round_ctr = 0;
        for _ in 0..HALF_N_FULL_ROUNDS {
            state = self.constant_layer_extension(ctx, &state, round_ctr);
            state = self.sbox_layer_extension(ctx, &state);
            state = self.mds_layer_extension(ctx, &state);
            round_ctr += 1;
        }
        state = self.partial_first_constant_layer_extension(ctx, &state);
        state = self.mds_partial_layer_init_extension(ctx, &state);
        for (r, c) in FAST_PARTIAL_ROUND_CONSTANTS.iter().enumerate() {
            state[0] = self.sbox_monomial_extension(ctx, &state[0]);
            state[0] = self
                .extension
                .add(ctx, state[0], <GoldilocksExt as FieldExtension<D>>::from_basefield(Goldilocks::from_canonical_u64(*c)));
            state = self.mds_partial_layer_fast_extension(ctx, &state, r);
        }
        round_ctr += N_PARTIAL_ROUNDS;
        for _ in 0..HALF_N_FULL_ROUNDS {
            state = self.constant_layer_extension(ctx, &state, round_ctr);
            state = self.sbox_layer_extension(ctx, &state);
            state = self.mds_layer_extension(ctx, &state);
            round_ctr += 1;
        }
        state
    }
}

impl<F: BigPrimeField> MerkleHasherChip<F> for PoseidonGoldilocksChip<F> {
    type Digest = GoldilocksHashOut<F>;

    fn load_digest(&self, ctx: &mut Context<F>, digest: &HashOut) -> Result<Self::Digest> {
        let HashOut::Goldilocks { elements } = digest else {
            return Err(VerifierError::DigestKind {
                expected: "Poseidon Goldilocks",
            });
        };
        Ok(elements.map(|e| {
            self.goldilocks()
                .load_canonical(ctx, Goldilocks::from_noncanonical_u64(e))
        }))
    }

    /// Inputs of at most four elements are zero padded into the digest.
    fn hash_or_noop(&self, ctx: &mut Context<F>, inputs: &[AssignedValue<F>]) -> Self::Digest {
        if inputs.len() <= HASH_SIZE {
            let zero = ctx.load_zero();
            core::array::from_fn(|i| inputs.get(i).copied().unwrap_or(zero))
        } else {
            self.hash_no_pad(ctx, inputs)
        }
    }

    fn two_to_one(
        &self,
        ctx: &mut Context<F>,
        left: &Self::Digest,
        right: &Self::Digest,
    ) -> Self::Digest {
        let inputs = [left.as_slice(), right.as_slice()].concat();
        self.hash_no_pad(ctx, &inputs)
    }

    fn select(
        &self,
        ctx: &mut Context<F>,
        bit: AssignedValue<F>,
        a: &Self::Digest,
        b: &Self::Digest,
    ) -> Self::Digest {
        let gate = self.goldilocks().gate();
        core::array::from_fn(|i| gate.select(ctx, a[i], b[i], bit))
    }

    fn constrain_equal(&self, ctx: &mut Context<F>, a: &Self::Digest, b: &Self::Digest) {
        for (a, b) in a.iter().zip(b.iter()) {
            ctx.constrain_equal(a, b);
        }
    }

    fn to_goldilocks(&self, _ctx: &mut Context<F>, digest: &Self::Digest) -> Vec<AssignedValue<F>> {
        digest.to_vec()
    }

    fn to_cells(digest: &Self::Digest) -> Vec<AssignedValue<F>> {
        digest.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::goldilocks_of;
    use crate::hash::poseidon_goldilocks::{hash_n_to_m_no_pad_native, permute_native};
    use crate::tests::{init, mock_run, random_goldilocks, MockChips};
    use halo2_base::halo2_proofs::halo2curves::bn256::Fr;
    use plonky2::field::extension::FieldExtension;
    use plonky2::field::types::PrimeField64;
    use rand::{rngs::StdRng, SeedableRng};

    const ZERO_STATE_PERMUTED: [u64; WIDTH] = [
        4330397376401421145,
        14124799381142128323,
        8742572140681234676,
        14345658006221440202,
        15524073338516903644,
        5091405722150716653,
        15002163819607624508,
        2047012902665707362,
        16106391063450633726,
        4680844749859802542,
        15019775476387350140,
        1698615465718385111,
    ];

    #[test]
    fn test_permutation_known_vector() {
        init();
        let native = permute_native([Goldilocks::ZERO; WIDTH]);
        assert_eq!(native.map(|x| x.to_canonical_u64()), ZERO_STATE_PERMUTED);
        assert!(mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let zero = ctx.load_zero();
            let out = chips.poseidon_goldilocks.permute(ctx, &[zero; WIDTH]);
            for (cell, expected) in out.iter().zip(ZERO_STATE_PERMUTED) {
                chips.goldilocks.gate().assert_is_const(ctx, cell, &Fr::from(expected));
            }
        }));
    }

    #[test]
    fn test_hash_no_pad_matches_native() {
        init();
        let mut rng = StdRng::seed_from_u64(1);
        let inputs = (0..19).map(|_| random_goldilocks(&mut rng)).collect::<Vec<_>>();
        let expected = hash_n_to_m_no_pad_native(&inputs, HASH_SIZE);
        let expected_two_to_one = hash_n_to_m_no_pad_native(&inputs[..8], HASH_SIZE);
        assert!(mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let poseidon = &chips.poseidon_goldilocks;
            let cells = inputs
                .iter()
                .map(|x| chips.goldilocks.load_canonical(ctx, *x))
                .collect::<Vec<_>>();
            let digest = poseidon.hash_no_pad(ctx, &cells);
            assert_eq!(digest.map(|c| goldilocks_of(c.value())).to_vec(), expected);

            let left = [cells[0], cells[1], cells[2], cells[3]];
            let right = [cells[4], cells[5], cells[6], cells[7]];
            let node = poseidon.two_to_one(ctx, &left, &right);
            assert_eq!(node.map(|c| goldilocks_of(c.value())).to_vec(), expected_two_to_one);

            let leaf = poseidon.hash_or_noop(ctx, &cells[..3]);
            assert_eq!(*leaf[3].value(), Fr::zero());
        }));
    }

    #[test]
    fn test_extension_lanes_agree_on_base_inputs() {
        init();
        let mut rng = StdRng::seed_from_u64(2);
        let input: [Goldilocks; WIDTH] = core::array::from_fn(|_| random_goldilocks(&mut rng));
        let expected = permute_native(input);
        assert!(mock_run(19, 18, |ctx, chips: &MockChips<Fr>| {
            let state = input.map(|x| {
                chips
                    .extension
                    .load_canonical(ctx, <GoldilocksExt as FieldExtension<D>>::from_basefield(x))
            });
            let out = chips.poseidon_goldilocks.permute_extension(ctx, &state);
            for (lane, expected) in out.iter().zip(expected) {
                assert_eq!(lane.value(), <GoldilocksExt as FieldExtension<D>>::from_basefield(expected));
            }
        }));
    }
}

use std::collections::VecDeque;
use std::sync::Arc;

use halo2_base::utils::{biguint_to_fe, fe_to_biguint, BigPrimeField};
use halo2_proofs::halo2curves::bn256::Fr;
use lazy_static::lazy_static;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use plonky2::field::types::{Field, PrimeField64};

use crate::fields::Goldilocks;

pub mod chip;

pub const T: usize = 4;
pub const RATE: usize = 3;
pub const R_F: usize = 8;
pub const R_P: usize = 56;

/// Inner field elements packed into one outer field lane.
pub const GOLDILOCKS_PER_LANE: usize = 3;

/// Window width used to split a digest into inner field elements. Narrower than 64 bits so
/// every window is canonical.
pub const TO_VEC_CHUNK_BITS: usize = 56;

lazy_static! {
    pub static ref BN254_PARAMS: Arc<PoseidonBn254Params<Fr>> = Arc::new(PoseidonBn254Params::generate());
}

// GRAIN LFSR
// =========================================================================

/// The 80-bit Grain LFSR used to derive Poseidon round constants and the MDS matrix.
struct Grain {
    bits: VecDeque<bool>,
}

impl Grain {
    /// `field = 1` (prime field), `sbox = 0` (`x^alpha`).
    fn new(field_bits: usize, t: usize, r_f: usize, r_p: usize) -> Self {
        let mut bits = VecDeque::with_capacity(80);
        for (value, width) in [(1, 2), (0, 4), (field_bits, 12), (t, 12), (r_f, 10), (r_p, 10)] {
            for i in (0..width).rev() {
                bits.push_back((value >> i) & 1 == 1);
            }
        }
        bits.extend([true; 30]);
        let mut grain = Self { bits };
        for _ in 0..160 {
            grain.update();
        }
        grain
    }

    fn update(&mut self) -> bool {
        let b = &self.bits;
        let new_bit = b[62] ^ b[51] ^ b[38] ^ b[23] ^ b[13] ^ b[0];
        self.bits.pop_front();
        self.bits.push_back(new_bit);
        new_bit
    }

    /// Self-shrinking output: of each pair, the second bit is kept when the first is set.
    fn next_bit(&mut self) -> bool {
        loop {
            let keep = self.update();
            let bit = self.update();
            if keep {
                return bit;
            }
        }
    }

    /// `n` output bits read big-endian.
    fn next_biguint(&mut self, n: usize) -> BigUint {
        (0..n).fold(BigUint::default(), |acc, _| {
            (acc << 1u32) + BigUint::from(self.next_bit() as u8)
        })
    }

    fn next_field_element<F: BigPrimeField>(&mut self, n: usize, modulus: &BigUint) -> F {
        loop {
            let candidate = self.next_biguint(n);
            if &candidate < modulus {
                return biguint_to_fe(&candidate);
            }
        }
    }

    fn next_field_element_without_rejection<F: BigPrimeField>(&mut self, n: usize, modulus: &BigUint) -> F {
        biguint_to_fe(&(self.next_biguint(n) % modulus))
    }
}

pub(crate) fn modulus<F: BigPrimeField>() -> BigUint {
    fe_to_biguint(&-F::ONE) + 1u64
}

// PARAMETERS
// =========================================================================

/// Round constants and MDS matrix of the width 4, `x^5` Poseidon permutation, derived from the
/// Grain LFSR seeded with the field size and round numbers.
#[derive(Clone, Debug)]
pub struct PoseidonBn254Params<F: BigPrimeField> {
    pub round_constants: Vec<[F; T]>,
    pub mds: [[F; T]; T],
}

impl<F: BigPrimeField> PoseidonBn254Params<F> {
    pub fn generate() -> Self {
        let n = F::NUM_BITS as usize;
        let modulus = modulus::<F>();
        let mut grain = Grain::new(n, T, R_F, R_P);

        let round_constants = (0..R_F + R_P)
            .map(|_| core::array::from_fn(|_| grain.next_field_element(n, &modulus)))
            .collect();

        let mds = loop {
            let samples: Vec<F> = (0..2 * T)
                .map(|_| grain.next_field_element_without_rejection(n, &modulus))
                .collect();
            let distinct = samples
                .iter()
                .enumerate()
                .all(|(i, a)| samples[..i].iter().all(|b| a != b));
            if !distinct {
                continue;
            }
            let (xs, ys) = samples.split_at(T);
            let entries = xs
                .iter()
                .flat_map(|x| ys.iter().map(move |y| Option::<F>::from((*x + y).invert())))
                .collect::<Option<Vec<F>>>();
            if let Some(entries) = entries {
                break core::array::from_fn(|i| core::array::from_fn(|j| entries[i * T + j]));
            }
        };

        Self {
            round_constants,
            mds,
        }
    }

    pub fn is_full_round(round: usize) -> bool {
        round < R_F / 2 || round >= R_F / 2 + R_P
    }
}

// NATIVE HASHING
// =========================================================================

fn pow5<F: BigPrimeField>(x: F) -> F {
    let x2 = x.square();
    x2.square() * x
}

pub fn permute_native<F: BigPrimeField>(params: &PoseidonBn254Params<F>, state: &mut [F; T]) {
    for (round, constants) in params.round_constants.iter().enumerate() {
        for (s, c) in state.iter_mut().zip(constants) {
            *s += c;
        }
        if PoseidonBn254Params::<F>::is_full_round(round) {
            for s in state.iter_mut() {
                *s = pow5(*s);
            }
        } else {
            state[0] = pow5(state[0]);
        }
        *state = core::array::from_fn(|i| {
            params.mds[i]
                .iter()
                .zip(state.iter())
                .fold(F::ZERO, |acc, (m, s)| acc + *m * s)
        });
    }
}

/// `sum_i inputs[i] * 2^(64 i)` for up to three inner field elements.
pub fn pack_native<F: BigPrimeField>(inputs: &[Goldilocks]) -> F {
    inputs.iter().rev().fold(F::ZERO, |acc, x| {
        acc * F::from(1u64 << 32) * F::from(1u64 << 32) + F::from(x.to_canonical_u64())
    })
}

/// Overwrite-mode sponge: every 9 inputs fill lanes 1 to 3, three elements per lane.
pub fn hash_no_pad_native<F: BigPrimeField>(params: &PoseidonBn254Params<F>, inputs: &[Goldilocks]) -> F {
    let mut state = [F::ZERO; T];
    for chunk in inputs.chunks(RATE * GOLDILOCKS_PER_LANE) {
        for (lane, packed) in chunk.chunks(GOLDILOCKS_PER_LANE).enumerate() {
            state[lane + 1] = pack_native(packed);
        }
        permute_native(params, &mut state);
    }
    state[0]
}

pub fn hash_or_noop_native<F: BigPrimeField>(params: &PoseidonBn254Params<F>, inputs: &[Goldilocks]) -> F {
    if inputs.len() <= GOLDILOCKS_PER_LANE {
        pack_native(inputs)
    } else {
        hash_no_pad_native(params, inputs)
    }
}

pub fn two_to_one_native<F: BigPrimeField>(params: &PoseidonBn254Params<F>, left: F, right: F) -> F {
    let mut state = [F::ZERO, F::ZERO, left, right];
    permute_native(params, &mut state);
    state[0]
}

/// Little-endian 56-bit windows of the canonical representation.
pub fn to_vec_native<F: BigPrimeField>(digest: &F) -> Vec<Goldilocks> {
    let value = fe_to_biguint(digest);
    let mask = (BigUint::from(1u64) << TO_VEC_CHUNK_BITS) - 1u64;
    (0..num_to_vec_chunks::<F>())
        .map(|i| {
            let chunk = (&value >> (i * TO_VEC_CHUNK_BITS)) & &mask;
            Goldilocks::from_canonical_u64(chunk.to_u64().unwrap_or_default())
        })
        .collect()
}

pub fn num_to_vec_chunks<F: BigPrimeField>() -> usize {
    (F::NUM_BITS as usize + TO_VEC_CHUNK_BITS - 1) / TO_VEC_CHUNK_BITS
}

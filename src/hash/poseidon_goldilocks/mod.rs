use plonky2::field::types::Field;
use plonky2::hash::poseidon::Poseidon;

use crate::fields::Goldilocks;

pub mod chip;

pub use plonky2::hash::poseidon::{ALL_ROUND_CONSTANTS, HALF_N_FULL_ROUNDS, N_PARTIAL_ROUNDS};

pub const WIDTH: usize = 12;
pub const RATE: usize = 8;
pub const HASH_SIZE: usize = 4;

pub const MDS_MATRIX_CIRC: [u64; WIDTH] = <Goldilocks as Poseidon>::MDS_MATRIX_CIRC;
pub const MDS_MATRIX_DIAG: [u64; WIDTH] = <Goldilocks as Poseidon>::MDS_MATRIX_DIAG;
pub const FAST_PARTIAL_FIRST_ROUND_CONSTANT: [u64; WIDTH] =
    <Goldilocks as Poseidon>::FAST_PARTIAL_FIRST_ROUND_CONSTANT;
pub const FAST_PARTIAL_ROUND_CONSTANTS: [u64; N_PARTIAL_ROUNDS] =
    <Goldilocks as Poseidon>::FAST_PARTIAL_ROUND_CONSTANTS;
pub const FAST_PARTIAL_ROUND_VS: [[u64; WIDTH - 1]; N_PARTIAL_ROUNDS] =
    <Goldilocks as Poseidon>::FAST_PARTIAL_ROUND_VS;
pub const FAST_PARTIAL_ROUND_W_HATS: [[u64; WIDTH - 1]; N_PARTIAL_ROUNDS] =
    <Goldilocks as Poseidon>::FAST_PARTIAL_ROUND_W_HATS;
pub const FAST_PARTIAL_ROUND_INITIAL_MATRIX: [[u64; WIDTH - 1]; WIDTH - 1] =
    <Goldilocks as Poseidon>::FAST_PARTIAL_ROUND_INITIAL_MATRIX;

/// Row `r` of the MDS matrix: the circulant shifted by `r` plus the diagonal.
pub fn mds_row(r: usize) -> [u64; WIDTH] {
    let mut row = [0u64; WIDTH];
    for (i, c) in MDS_MATRIX_CIRC.iter().enumerate() {
        row[(i + r) % WIDTH] += c;
    }
    row[r] += MDS_MATRIX_DIAG[r];
    row
}

/// Native permutation.
pub fn permute_native(state: [Goldilocks; WIDTH]) -> [Goldilocks; WIDTH] {
    <Goldilocks as Poseidon>::poseidon(state)
}

/// Native overwrite-mode sponge without padding.
pub fn hash_n_to_m_no_pad_native(inputs: &[Goldilocks], num_outputs: usize) -> Vec<Goldilocks> {
    let mut state = [Goldilocks::ZERO; WIDTH];
    for chunk in inputs.chunks(RATE) {
        state[..chunk.len()].copy_from_slice(chunk);
        state = permute_native(state);
    }
    let mut outputs = vec![];
    loop {
        for element in &state[..RATE] {
            outputs.push(*element);
            if outputs.len() == num_outputs {
                return outputs;
            }
        }
        state = permute_native(state);
    }
}

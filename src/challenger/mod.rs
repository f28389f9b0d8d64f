use halo2_base::{utils::BigPrimeField, AssignedValue, Context};
use log::debug;

use crate::fields::AssignedExtensionValue;
use crate::fri::FriChallenges;
use crate::hash::poseidon_goldilocks::{RATE, WIDTH};
use crate::hash::{MerkleHasherChip, PoseidonGoldilocksChip};

// CHALLENGER CHIP
// =========================================================================

/// Duplex sponge transcript over the Poseidon Goldilocks permutation. Observed elements must
/// be canonical; every derived challenge is canonical.
#[derive(Clone, Debug)]
pub struct ChallengerChip<F: BigPrimeField> {
    poseidon: PoseidonGoldilocksChip<F>,
    sponge_state: [AssignedValue<F>; WIDTH],
    input_buffer: Vec<AssignedValue<F>>,
    output_buffer: Vec<AssignedValue<F>>,
}

impl<F: BigPrimeField> ChallengerChip<F> {
    pub fn new(ctx: &mut Context<F>, poseidon: PoseidonGoldilocksChip<F>) -> Self {
        let zero = ctx.load_zero();
        Self {
            poseidon,
            sponge_state: [zero; WIDTH],
            input_buffer: Vec::with_capacity(RATE),
            output_buffer: Vec::with_capacity(RATE),
        }
    }

    pub fn observe_element(&mut self, ctx: &mut Context<F>, element: AssignedValue<F>) {
        // Any buffered output is stale once new input arrives.
        self.output_buffer.clear();
        self.input_buffer.push(element);
        if self.input_buffer.len() == RATE {
            self.duplexing(ctx);
        }
    }

    pub fn observe_elements(&mut self, ctx: &mut Context<F>, elements: &[AssignedValue<F>]) {
        for element in elements {
            self.observe_element(ctx, *element);
        }
    }

    pub fn observe_extension_element(&mut self, ctx: &mut Context<F>, element: &AssignedExtensionValue<F>) {
        self.observe_elements(ctx, &element.coeffs);
    }

    pub fn observe_extension_elements(&mut self, ctx: &mut Context<F>, elements: &[AssignedExtensionValue<F>]) {
        for element in elements {
            self.observe_extension_element(ctx, element);
        }
    }

    /// Observes a digest through its canonical inner field encoding.
    pub fn observe_hash<H: MerkleHasherChip<F>>(&mut self, ctx: &mut Context<F>, hasher: &H, digest: &H::Digest) {
        let elements = hasher.to_goldilocks(ctx, digest);
        self.observe_elements(ctx, &elements);
    }

    pub fn observe_cap<H: MerkleHasherChip<F>>(&mut self, ctx: &mut Context<F>, hasher: &H, cap: &[H::Digest]) {
        for digest in cap {
            self.observe_hash(ctx, hasher, digest);
        }
    }

    /// Observes every opening batch in order.
    pub fn observe_openings(&mut self, ctx: &mut Context<F>, batches: &[Vec<AssignedExtensionValue<F>>]) {
        for batch in batches {
            self.observe_extension_elements(ctx, batch);
        }
    }

    pub fn get_challenge(&mut self, ctx: &mut Context<F>) -> AssignedValue<F> {
        if self.input_buffer.is_empty() {
            if let Some(challenge) = self.output_buffer.pop() {
                return challenge;
            }
        }
        self.duplexing(ctx);
        self.output_buffer.truncate(RATE - 1);
        self.sponge_state[RATE - 1]
    }

    pub fn get_n_challenges(&mut self, ctx: &mut Context<F>, n: usize) -> Vec<AssignedValue<F>> {
        (0..n).map(|_| self.get_challenge(ctx)).collect()
    }

    pub fn get_extension_challenge(&mut self, ctx: &mut Context<F>) -> AssignedExtensionValue<F> {
        let c0 = self.get_challenge(ctx);
        let c1 = self.get_challenge(ctx);
        AssignedExtensionValue::construct([c0, c1])
    }

    pub fn get_n_extension_challenges(&mut self, ctx: &mut Context<F>, n: usize) -> Vec<AssignedExtensionValue<F>> {
        (0..n).map(|_| self.get_extension_challenge(ctx)).collect()
    }

    pub fn get_hash(&mut self, ctx: &mut Context<F>) -> [AssignedValue<F>; 4] {
        core::array::from_fn(|_| self.get_challenge(ctx))
    }

    /// Replays the FRI commit phase: `alpha`, one `beta` per commit phase cap, then the final
    /// polynomial and proof-of-work witness are absorbed before the PoW response and query
    /// indices are squeezed.
    pub fn get_fri_challenges<H: MerkleHasherChip<F>>(
        &mut self,
        ctx: &mut Context<F>,
        hasher: &H,
        commit_phase_merkle_caps: &[Vec<H::Digest>],
        final_poly: &[AssignedExtensionValue<F>],
        pow_witness: AssignedValue<F>,
        num_query_rounds: usize,
    ) -> FriChallenges<F> {
        let fri_alpha = self.get_extension_challenge(ctx);

        let fri_betas = commit_phase_merkle_caps
            .iter()
            .map(|cap| {
                self.observe_cap(ctx, hasher, cap);
                self.get_extension_challenge(ctx)
            })
            .collect();

        self.observe_extension_elements(ctx, final_poly);
        self.observe_element(ctx, pow_witness);

        let fri_pow_response = self.get_challenge(ctx);
        let fri_query_indices = self.get_n_challenges(ctx, num_query_rounds);
        debug!("derived {} FRI query indices", fri_query_indices.len());

        FriChallenges {
            fri_alpha,
            fri_betas,
            fri_pow_response,
            fri_query_indices,
        }
    }

    fn duplexing(&mut self, ctx: &mut Context<F>) {
        debug_assert!(self.input_buffer.len() <= RATE);
        for (lane, input) in self.sponge_state.iter_mut().zip(self.input_buffer.drain(..)) {
            *lane = input;
        }
        self.sponge_state = self.poseidon.permute(ctx, &self.sponge_state);
        self.output_buffer.clear();
        self.output_buffer.extend_from_slice(&self.sponge_state[..RATE]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{fe_from_goldilocks, goldilocks_of, Goldilocks};
    use crate::tests::{init, mock_run, random_goldilocks, MockChips};
    use halo2_base::halo2_proofs::halo2curves::bn256::Fr;
    use plonky2::hash::poseidon::PoseidonHash;
    use plonky2::iop::challenger::Challenger;
    use rand::{rngs::StdRng, SeedableRng};

    fn values(cells: &[AssignedValue<Fr>]) -> Vec<Goldilocks> {
        cells.iter().map(|c| goldilocks_of(c.value())).collect()
    }

    #[test]
    fn test_matches_native_challenger() {
        init();
        let mut rng = StdRng::seed_from_u64(8);
        let inputs = (0..19).map(|_| random_goldilocks(&mut rng)).collect::<Vec<_>>();

        let mut native = Challenger::<Goldilocks, PoseidonHash>::new();
        native.observe_elements(&inputs[..3]);
        let first = native.get_n_challenges(3);
        native.observe_elements(&inputs[3..]);
        let second = native.get_n_challenges(10);

        assert!(mock_run(17, 16, |ctx, chips: &MockChips<Fr>| {
            let mut challenger = ChallengerChip::new(ctx, chips.poseidon_goldilocks.clone());
            let cells = inputs
                .iter()
                .map(|x| ctx.load_witness(fe_from_goldilocks(*x)))
                .collect::<Vec<_>>();
            challenger.observe_elements(ctx, &cells[..3]);
            assert_eq!(values(&challenger.get_n_challenges(ctx, 3)), first);
            challenger.observe_elements(ctx, &cells[3..]);
            assert_eq!(values(&challenger.get_n_challenges(ctx, 10)), second);
        }));
    }

    #[test]
    fn test_replay_is_deterministic() {
        init();
        assert!(mock_run(17, 16, |ctx, chips: &MockChips<Fr>| {
            let inputs = (1..=5u64).map(|i| ctx.load_witness(Fr::from(i))).collect::<Vec<_>>();
            let extra = ctx.load_witness(Fr::from(6));
            let mut run = |extra: Option<AssignedValue<Fr>>| {
                let mut challenger = ChallengerChip::new(ctx, chips.poseidon_goldilocks.clone());
                challenger.observe_elements(ctx, &inputs);
                let before = challenger.get_challenge(ctx);
                if let Some(extra) = extra {
                    challenger.observe_element(ctx, extra);
                }
                let after = challenger.get_n_challenges(ctx, 4);
                (*before.value(), values(&after))
            };
            let a = run(None);
            let b = run(None);
            assert_eq!(a, b);
            let c = run(Some(extra));
            assert_eq!(a.0, c.0);
            assert!(a.1.iter().zip(&c.1).all(|(x, y)| x != y));
        }));
    }
}

use halo2_base::{
    gates::GateInstructions, utils::BigPrimeField, AssignedValue, Context, QuantumCell::Constant,
};
use log::{debug, info};
use plonky2::field::ops::Square;
use plonky2::field::types::{Field, Field64};

use crate::error::{Result, VerifierError};
use crate::fields::{
    fe_from_goldilocks, primitive_root_of_unity, AssignedExtensionValue, ExtensionFieldChip,
    Goldilocks, GoldilocksChip, QuantumExtensionCell, MULTIPLICATIVE_GROUP_GENERATOR,
};
use crate::hash::MerkleHasherChip;
use crate::merkle::MerkleTreeChip;
use crate::types::{self, CircuitDescription, FriConfig, FriParams, SUPPORTED_ARITY_BITS};
use crate::witness::{AssignedFriProof, AssignedFriQueryRound};

// FRI INSTANCE LAYOUT
// =========================================================================

/// Committed oracles, in commitment order.
pub const CONSTANTS_SIGMAS: usize = 0;
pub const WIRES: usize = 1;
pub const ZS_PARTIAL_PRODUCTS: usize = 2;
pub const QUOTIENT: usize = 3;

pub struct FriChallenges<F: BigPrimeField> {
    pub fri_alpha: AssignedExtensionValue<F>,
    pub fri_betas: Vec<AssignedExtensionValue<F>>,
    pub fri_pow_response: AssignedValue<F>,
    pub fri_query_indices: Vec<AssignedValue<F>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FriOracleInfo {
    pub num_polys: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FriPolynomialInfo {
    pub oracle_index: usize,
    pub polynomial_index: usize,
}

impl FriPolynomialInfo {
    fn from_range(oracle_index: usize, polynomials: std::ops::Range<usize>) -> Vec<Self> {
        polynomials
            .map(|polynomial_index| Self {
                oracle_index,
                polynomial_index,
            })
            .collect()
    }
}

/// Polynomials opened at a common point.
#[derive(Clone, Debug)]
pub struct FriBatchInfo<F: BigPrimeField> {
    pub point: AssignedExtensionValue<F>,
    pub polynomials: Vec<FriPolynomialInfo>,
}

#[derive(Clone, Debug)]
pub struct FriInstanceInfo<F: BigPrimeField> {
    pub oracles: Vec<FriOracleInfo>,
    pub batches: Vec<FriBatchInfo<F>>,
}

/// Opened values, one vector per batch of the instance.
pub type FriOpenings<F> = Vec<Vec<AssignedExtensionValue<F>>>;

pub fn fri_oracles(description: &CircuitDescription) -> Vec<FriOracleInfo> {
    [
        description.num_preprocessed_polys(),
        description.config.num_wires,
        description.num_zs_partial_products_polys(),
        description.num_quotient_polys(),
    ]
    .into_iter()
    .map(|num_polys| FriOracleInfo { num_polys })
    .collect()
}

/// Every polynomial is opened at `zeta`; the `Z`s are opened again at `g * zeta`.
pub fn fri_instance<F: BigPrimeField>(
    ctx: &mut Context<F>,
    extension: &ExtensionFieldChip<F>,
    description: &CircuitDescription,
    zeta: &AssignedExtensionValue<F>,
) -> FriInstanceInfo<F> {
    let oracles = fri_oracles(description);
    let zeta_batch = FriBatchInfo {
        point: *zeta,
        polynomials: oracles
            .iter()
            .enumerate()
            .flat_map(|(i, oracle)| FriPolynomialInfo::from_range(i, 0..oracle.num_polys))
            .collect(),
    };

    let g = primitive_root_of_unity(description.degree_bits());
    let zeta_next = extension.scalar_mul(ctx, *zeta, Constant(fe_from_goldilocks::<F>(g)));
    let zeta_next_batch = FriBatchInfo {
        point: zeta_next,
        polynomials: FriPolynomialInfo::from_range(ZS_PARTIAL_PRODUCTS, 0..description.num_challenges()),
    };

    FriInstanceInfo {
        oracles,
        batches: vec![zeta_batch, zeta_next_batch],
    }
}

// HOST SIDE CHECKS
// =========================================================================

/// Checks every length of `proof` the verifier depends on.
pub fn validate_fri_proof_shape(
    proof: &types::FriProof,
    oracles: &[FriOracleInfo],
    params: &FriParams,
) -> Result<()> {
    let cap_height = params.config.cap_height;
    let lde_bits = params.lde_bits();

    VerifierError::ensure_len(
        "commit phase caps",
        params.reduction_arity_bits.len(),
        proof.commit_phase_merkle_caps.len(),
    )?;
    for cap in &proof.commit_phase_merkle_caps {
        VerifierError::ensure_len("commit phase cap", 1 << cap_height, cap.len())?;
    }

    VerifierError::ensure_len(
        "query rounds",
        params.config.num_query_rounds,
        proof.query_round_proofs.len(),
    )?;
    for round in &proof.query_round_proofs {
        let evals_proofs = &round.initial_trees_proof.evals_proofs;
        VerifierError::ensure_len("initial tree proofs", oracles.len(), evals_proofs.len())?;
        for ((leaf, merkle_proof), oracle) in evals_proofs.iter().zip(oracles) {
            VerifierError::ensure_len("initial tree leaf", oracle.num_polys, leaf.len())?;
            VerifierError::ensure_len(
                "initial tree path",
                lde_bits,
                merkle_proof.siblings.len() + cap_height,
            )?;
        }

        VerifierError::ensure_len("query steps", params.reduction_arity_bits.len(), round.steps.len())?;
        let mut codeword_len_bits = lde_bits;
        for (step, arity_bits) in round.steps.iter().zip(&params.reduction_arity_bits) {
            codeword_len_bits -= arity_bits;
            VerifierError::ensure_len("query step evals", 1 << arity_bits, step.evals.len())?;
            VerifierError::ensure_len(
                "query step path",
                codeword_len_bits,
                step.merkle_proof.siblings.len() + cap_height,
            )?;
        }
    }

    VerifierError::ensure_len("final polynomial", params.final_poly_len(), proof.final_poly.len())
}

/// Query indices are reduced from 64-bit challenges, which slightly favours small indices.
/// Rejects configurations where that bias is not negligible against the query error.
pub fn assert_noncanonical_indices_ok(config: &FriConfig) -> Result<()> {
    let num_ambiguous_elems = u64::MAX - Goldilocks::ORDER + 1;
    let density = num_ambiguous_elems as f64 / Goldilocks::ORDER as f64;
    if density < config.rate() * 1e-5 {
        Ok(())
    } else {
        Err(VerifierError::NoncanonicalIndices { density })
    }
}

/// `i` with its low `num_bits` bits reversed.
fn reverse_bits(i: usize, num_bits: usize) -> usize {
    if num_bits == 0 {
        return 0;
    }
    i.reverse_bits() >> (usize::BITS as usize - num_bits)
}

// FRI VERIFIER CHIP
// =========================================================================

pub struct FriVerifierChip<'a, F: BigPrimeField, H: MerkleHasherChip<F>> {
    extension: ExtensionFieldChip<F>,
    hasher: &'a H,
    params: &'a FriParams,
}

impl<'a, F: BigPrimeField, H: MerkleHasherChip<F>> FriVerifierChip<'a, F, H> {
    pub fn new(extension: ExtensionFieldChip<F>, hasher: &'a H, params: &'a FriParams) -> Result<Self> {
        if params.hiding {
            return Err(VerifierError::Unsupported("hiding FRI".into()));
        }
        if let Some(bits) = params
            .reduction_arity_bits
            .iter()
            .find(|bits| **bits != SUPPORTED_ARITY_BITS)
        {
            return Err(VerifierError::Unsupported(format!("FRI reduction arity 2^{bits}")));
        }
        assert_noncanonical_indices_ok(&params.config)?;
        Ok(Self {
            extension,
            hasher,
            params,
        })
    }

    fn goldilocks(&self) -> &GoldilocksChip<F> {
        self.extension.goldilocks()
    }

    /// Verifies that the openings are evaluations of the committed polynomials, each of
    /// degree below `2^degree_bits`. `initial_merkle_caps` holds one cap per instance oracle.
    pub fn verify_fri_proof(
        &self,
        ctx: &mut Context<F>,
        instance: &FriInstanceInfo<F>,
        openings: &FriOpenings<F>,
        challenges: &FriChallenges<F>,
        initial_merkle_caps: &[Vec<H::Digest>],
        proof: &AssignedFriProof<F, H>,
    ) -> Result<()> {
        VerifierError::ensure_len("opening batches", instance.batches.len(), openings.len())?;
        VerifierError::ensure_len("initial caps", instance.oracles.len(), initial_merkle_caps.len())?;
        VerifierError::ensure_len(
            "query indices",
            proof.query_round_proofs.len(),
            challenges.fri_query_indices.len(),
        )?;
        VerifierError::ensure_len(
            "commit phase caps",
            self.params.reduction_arity_bits.len(),
            proof.commit_phase_merkle_caps.len(),
        )?;
        VerifierError::ensure_len(
            "FRI betas",
            self.params.reduction_arity_bits.len(),
            challenges.fri_betas.len(),
        )?;

        // Proof of work: the response must have `proof_of_work_bits` leading zeros.
        let pow_bits = self.params.config.proof_of_work_bits as usize;
        if pow_bits == 0 {
            self.goldilocks().range_check(ctx, challenges.fri_pow_response);
        } else {
            self.goldilocks()
                .range_check_with_max_bits(ctx, challenges.fri_pow_response, 64 - pow_bits);
        }

        // The batch openings reduced by alpha are shared by every query round.
        let reduced_openings = openings
            .iter()
            .map(|batch| {
                self.extension
                    .reduce_with_powers(ctx, batch, &challenges.fri_alpha)
            })
            .collect::<Vec<_>>();
        let alpha_powers = self.batch_alpha_powers(ctx, instance, &challenges.fri_alpha);

        for (round, (index, round_proof)) in challenges
            .fri_query_indices
            .iter()
            .zip(&proof.query_round_proofs)
            .enumerate()
        {
            debug!("FRI query round {round}");
            self.verify_query_round(
                ctx,
                instance,
                challenges,
                &reduced_openings,
                &alpha_powers,
                initial_merkle_caps,
                proof,
                *index,
                round_proof,
            )?;
        }
        info!(
            "emitted {} FRI query rounds over {} folding steps",
            proof.query_round_proofs.len(),
            self.params.reduction_arity_bits.len()
        );
        Ok(())
    }

    /// `alpha^len(batch)` for every batch but the first, which starts the sum.
    fn batch_alpha_powers(
        &self,
        ctx: &mut Context<F>,
        instance: &FriInstanceInfo<F>,
        alpha: &AssignedExtensionValue<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        instance
            .batches
            .iter()
            .skip(1)
            .map(|batch| self.extension.exp_u64(ctx, alpha, batch.polynomials.len() as u64))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn verify_query_round(
        &self,
        ctx: &mut Context<F>,
        instance: &FriInstanceInfo<F>,
        challenges: &FriChallenges<F>,
        reduced_openings: &[AssignedExtensionValue<F>],
        alpha_powers: &[AssignedExtensionValue<F>],
        initial_merkle_caps: &[Vec<H::Digest>],
        proof: &AssignedFriProof<F, H>,
        index: AssignedValue<F>,
        round_proof: &AssignedFriQueryRound<F, H>,
    ) -> Result<()> {
        let gl = self.goldilocks();
        let lde_bits = self.params.lde_bits();
        let cap_height = self.params.config.cap_height;

        // The challenge is canonical, so its low bits are the index modulo the LDE size.
        let index_bits = gl.to_bits(ctx, index, lde_bits);
        let cap_bits = &index_bits[lde_bits - cap_height..];

        // Leaves of the committed oracles at the queried index.
        let evals_proofs = &round_proof.initial_trees_proof.evals_proofs;
        VerifierError::ensure_len("initial tree proofs", instance.oracles.len(), evals_proofs.len())?;
        VerifierError::ensure_len(
            "query steps",
            self.params.reduction_arity_bits.len(),
            round_proof.steps.len(),
        )?;
        for ((leaf, siblings), cap) in evals_proofs.iter().zip(initial_merkle_caps) {
            MerkleTreeChip::<F, H>::verify_merkle_proof_to_cap(
                ctx,
                self.hasher,
                leaf,
                &index_bits[..lde_bits - cap_height],
                cap_bits,
                cap,
                siblings,
            )?;
        }

        let mut subgroup_x = self.calculate_subgroup_x(ctx, &index_bits);
        let mut old_eval = self.combine_initial(
            ctx,
            instance,
            round_proof,
            reduced_openings,
            alpha_powers,
            subgroup_x,
            &challenges.fri_alpha,
        )?;

        let mut coset_bits = &index_bits[..];
        for (i, arity_bits) in self.params.reduction_arity_bits.iter().enumerate() {
            let step = &round_proof.steps[i];
            VerifierError::ensure_len("query step evals", 1 << arity_bits, step.evals.len())?;
            let within_coset_bits = &coset_bits[..*arity_bits];
            coset_bits = &coset_bits[*arity_bits..];

            // The previous evaluation sits in this coset at the index's low bits.
            let claimed = self.extension.random_access(ctx, within_coset_bits, &step.evals);
            self.extension.constrain_equal(ctx, &claimed, &old_eval);

            old_eval = self.compute_evaluation(
                ctx,
                subgroup_x,
                within_coset_bits,
                *arity_bits,
                &step.evals,
                &challenges.fri_betas[i],
            )?;

            let leaf = step
                .evals
                .iter()
                .flat_map(|eval| eval.coeffs)
                .collect::<Vec<_>>();
            let num_siblings = step.siblings.len();
            VerifierError::ensure_len("query step path", coset_bits.len(), num_siblings + cap_height)?;
            MerkleTreeChip::<F, H>::verify_merkle_proof_to_cap(
                ctx,
                self.hasher,
                &leaf,
                &coset_bits[..num_siblings],
                cap_bits,
                &proof.commit_phase_merkle_caps[i],
                &step.siblings,
            )?;

            subgroup_x = gl.exp_u64(ctx, subgroup_x, 1u64 << arity_bits);
        }

        // The last folded value must match the final polynomial.
        let x = self.extension.from_base(ctx, subgroup_x);
        let final_eval = self.extension.reduce_with_powers(ctx, &proof.final_poly, &x);
        self.extension.constrain_equal(ctx, &final_eval, &old_eval);
        Ok(())
    }

    /// `g * w^rev(index)`, the LDE point of the queried index: `g` is the coset shift and `w`
    /// generates the LDE subgroup.
    pub fn calculate_subgroup_x(&self, ctx: &mut Context<F>, index_bits: &[AssignedValue<F>]) -> AssignedValue<F> {
        let gl = self.goldilocks();
        let omega = primitive_root_of_unity(index_bits.len());
        let mut x = gl.load_constant(ctx, Goldilocks::from_canonical_u64(MULTIPLICATIVE_GROUP_GENERATOR));
        let mut power = omega;
        for bit in index_bits.iter().rev() {
            let factor = self.select_power(ctx, *bit, power);
            x = gl.mul(ctx, x, factor);
            power = power.square();
        }
        x
    }

    /// `power` when `bit = 1`, one otherwise. Canonical without reduction.
    fn select_power(&self, ctx: &mut Context<F>, bit: AssignedValue<F>, power: Goldilocks) -> AssignedValue<F> {
        let shifted = fe_from_goldilocks::<F>(power - Goldilocks::ONE);
        self.goldilocks()
            .gate()
            .mul_add(ctx, bit, Constant(shifted), Constant(F::ONE))
    }

    /// `sum_b alpha^(...) * (reduce(leaf evals) - reduce(openings)) / (x - point_b)`, folding
    /// every batch into a single quotient.
    #[allow(clippy::too_many_arguments)]
    fn combine_initial(
        &self,
        ctx: &mut Context<F>,
        instance: &FriInstanceInfo<F>,
        round_proof: &AssignedFriQueryRound<F, H>,
        reduced_openings: &[AssignedExtensionValue<F>],
        alpha_powers: &[AssignedExtensionValue<F>],
        subgroup_x: AssignedValue<F>,
        alpha: &AssignedExtensionValue<F>,
    ) -> Result<AssignedExtensionValue<F>> {
        let ext = &self.extension;
        let evals_proofs = &round_proof.initial_trees_proof.evals_proofs;

        let mut sum = ext.zero(ctx);
        for (b, (batch, reduced_opening)) in instance.batches.iter().zip(reduced_openings).enumerate() {
            let evals = batch
                .polynomials
                .iter()
                .map(|p| {
                    evals_proofs
                        .get(p.oracle_index)
                        .and_then(|(leaf, _)| leaf.get(p.polynomial_index))
                        .map(|eval| QuantumExtensionCell::Base(*eval))
                        .ok_or_else(|| {
                            VerifierError::InvalidParameter(format!(
                                "oracle {} has no polynomial {}",
                                p.oracle_index, p.polynomial_index
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            let reduced_evals = ext.reduce_with_powers(ctx, &evals, alpha);
            let numerator = ext.sub(ctx, reduced_evals, reduced_opening);
            let denominator = ext.sub(ctx, QuantumExtensionCell::Base(subgroup_x), batch.point);
            let quotient = ext.div_checked(ctx, numerator, &denominator);
            sum = if b == 0 {
                quotient
            } else {
                ext.mul_add(ctx, sum, alpha_powers[b - 1], quotient)
            };
        }
        Ok(sum)
    }

    /// Interpolates the coset values of one folding step and evaluates the interpolant at
    /// `beta`. The coset is `s * <g>` with `n = 2^arity_bits` points, so the barycentric
    /// weights are `g^i / (n * s^(n-1))` and
    /// `P(beta) = (beta^n - s^n) / (n * s^(n-1)) * sum_i g^i * y_i / (beta - s * g^i)`.
    /// The weights share one base field inverse; each `beta - s * g^i` is inverted on its own.
    /// If `beta` hits a coset point the value is read off directly.
    pub fn compute_evaluation(
        &self,
        ctx: &mut Context<F>,
        x: AssignedValue<F>,
        within_coset_bits: &[AssignedValue<F>],
        arity_bits: usize,
        evals: &[AssignedExtensionValue<F>],
        beta: &AssignedExtensionValue<F>,
    ) -> Result<AssignedExtensionValue<F>> {
        let arity = 1usize << arity_bits;
        VerifierError::ensure_len("query step evals", arity, evals.len())?;
        VerifierError::ensure_len("coset index bits", arity_bits, within_coset_bits.len())?;
        let gl = self.goldilocks();
        let ext = &self.extension;
        let gate = gl.gate();

        // s = x * g^(-rev(index within coset)).
        let g = primitive_root_of_unity(arity_bits);
        let mut coset_start = x;
        let mut power = g.inverse();
        for bit in within_coset_bits.iter().rev() {
            let factor = self.select_power(ctx, *bit, power);
            coset_start = gl.mul(ctx, coset_start, factor);
            power = power.square();
        }

        let start_pow = gl.exp_u64(ctx, coset_start, arity as u64 - 1);
        let start_pow_n = gl.mul(ctx, start_pow, coset_start);
        let scaled = gl.mul(ctx, start_pow, Constant(F::from(arity as u64)));
        let (weight_scale, has_inverse) = gl.inverse(ctx, scaled);
        gate.assert_is_const(ctx, &has_inverse, &F::ONE);

        let mut sum = ext.zero(ctx);
        let mut fallback = ext.zero(ctx);
        let mut all_have_inverse = ctx.load_constant(F::ONE);
        for (i, g_i) in g.powers().take(arity).enumerate() {
            let y = evals[reverse_bits(i, arity_bits)];
            let point = gl.mul(ctx, coset_start, Constant(fe_from_goldilocks::<F>(g_i)));
            let diff = ext.sub(ctx, beta, QuantumExtensionCell::Base(point));
            let (diff_inverse, has_inverse) = ext.inverse(ctx, &diff);
            let weighted = ext.scalar_mul(ctx, diff_inverse, Constant(fe_from_goldilocks::<F>(g_i)));
            sum = ext.mul_add(ctx, y, weighted, sum);

            let hit = gate.not(ctx, has_inverse);
            fallback = ext.lookup(ctx, hit, fallback, y);
            all_have_inverse = gate.and(ctx, all_have_inverse, has_inverse);
        }

        let beta_pow_n = ext.exp_power_of_2(ctx, beta, arity_bits);
        let vanishing = ext.sub(ctx, beta_pow_n, QuantumExtensionCell::Base(start_pow_n));
        let scaled_vanishing = ext.scalar_mul(ctx, vanishing, weight_scale);
        let interpolated = ext.mul(ctx, scaled_vanishing, sum);
        Ok(ext.lookup(ctx, all_have_inverse, fallback, interpolated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::GoldilocksExt;
    use crate::hash::HashOut;
    use crate::tests::{init, mock_run, random_extension, random_goldilocks, MockChips, PLONKY2_FIXTURE};
    use crate::types::ProofWithPublicInputs;
    use halo2_base::halo2_proofs::halo2curves::bn256::Fr;
    use plonky2::field::interpolation::{barycentric_weights, interpolate};
    use rand::{rngs::StdRng, SeedableRng};

    fn fixture() -> (CircuitDescription, ProofWithPublicInputs) {
        let description = CircuitDescription::try_from(&PLONKY2_FIXTURE.common).unwrap();
        let proof = ProofWithPublicInputs::try_from(&PLONKY2_FIXTURE.proof).unwrap();
        (description, proof)
    }

    #[test]
    fn test_validate_fixture_shape() {
        init();
        let (description, proof) = fixture();
        let oracles = fri_oracles(&description);
        validate_fri_proof_shape(&proof.proof.opening_proof, &oracles, &description.fri_params).unwrap();
    }

    #[test]
    fn test_rejects_short_commit_cap() {
        init();
        let (description, proof) = fixture();
        let oracles = fri_oracles(&description);
        let mut fri = proof.proof.opening_proof;
        fri.commit_phase_merkle_caps[0].pop();
        assert!(matches!(
            validate_fri_proof_shape(&fri, &oracles, &description.fri_params),
            Err(VerifierError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_wrong_step_count() {
        init();
        let (description, proof) = fixture();
        let oracles = fri_oracles(&description);
        let mut fri = proof.proof.opening_proof;
        let step = fri.query_round_proofs[0].steps[0].clone();
        fri.query_round_proofs[0].steps.push(step);
        assert!(validate_fri_proof_shape(&fri, &oracles, &description.fri_params).is_err());

        let mut fri = fixture().1.proof.opening_proof;
        fri.query_round_proofs[1].steps.clear();
        assert!(validate_fri_proof_shape(&fri, &oracles, &description.fri_params).is_err());
    }

    #[test]
    fn test_rejects_long_commit_cap() {
        init();
        let (description, proof) = fixture();
        let oracles = fri_oracles(&description);
        let mut fri = proof.proof.opening_proof;
        fri.commit_phase_merkle_caps[0].push(HashOut::Goldilocks { elements: [0; 4] });
        assert!(validate_fri_proof_shape(&fri, &oracles, &description.fri_params).is_err());
    }

    #[test]
    fn test_noncanonical_density() {
        let mut config = fixture().0.fri_params.config;
        assert!(assert_noncanonical_indices_ok(&config).is_ok());
        // A rate of 2^-20 makes the index bias dominate the query error.
        config.rate_bits = 20;
        assert!(matches!(
            assert_noncanonical_indices_ok(&config),
            Err(VerifierError::NoncanonicalIndices { .. })
        ));
    }

    #[test]
    fn test_oracle_layout() {
        let description = fixture().0;
        let oracles = fri_oracles(&description);
        let leaves = &fixture().1.proof.opening_proof.query_round_proofs[0]
            .initial_trees_proof
            .evals_proofs;
        for (i, (oracle, (leaf, _))) in oracles.iter().zip(leaves).enumerate() {
            assert_eq!(oracle.num_polys, leaf.len(), "oracle {i}");
        }
        assert_eq!(oracles[CONSTANTS_SIGMAS].num_polys, description.num_preprocessed_polys());
        assert_eq!(oracles[QUOTIENT].num_polys, description.num_quotient_polys());
    }

    #[test]
    fn test_reverse_bits() {
        assert_eq!(reverse_bits(0b0001, 4), 0b1000);
        assert_eq!(reverse_bits(0b0110, 4), 0b0110);
        assert_eq!(reverse_bits(0b1101, 4), 0b1011);
        assert_eq!(reverse_bits(5, 0), 0);
    }

    fn fri_params() -> FriParams {
        fixture().0.fri_params
    }

    #[test]
    fn test_subgroup_x_matches_native() {
        init();
        let params = fri_params();
        let lde_bits = params.lde_bits();
        let index = 0b1011_0110_1u64 % (1 << lde_bits);
        let omega = primitive_root_of_unity(lde_bits);
        let expected = Goldilocks::from_canonical_u64(MULTIPLICATIVE_GROUP_GENERATOR)
            * omega.exp_u64(reverse_bits(index as usize, lde_bits) as u64);
        assert!(mock_run(16, 15, |ctx, chips: &MockChips<Fr>| {
            let hasher = chips.poseidon_goldilocks.clone();
            let chip = FriVerifierChip::new(chips.extension.clone(), &hasher, &params).unwrap();
            let index = chips.goldilocks.load_canonical(ctx, Goldilocks::from_canonical_u64(index));
            let bits = chips.goldilocks.to_bits(ctx, index, lde_bits);
            let x = chip.calculate_subgroup_x(ctx, &bits);
            assert_eq!(crate::fields::goldilocks_of(x.value()), expected);
        }));
    }

    fn native_evaluation(x: Goldilocks, within: usize, evals: &[GoldilocksExt], beta: GoldilocksExt) -> GoldilocksExt {
        let arity_bits = SUPPORTED_ARITY_BITS;
        let arity = 1 << arity_bits;
        let g = primitive_root_of_unity(arity_bits);
        let evals = (0..arity).map(|i| evals[reverse_bits(i, arity_bits)]);
        let rev = reverse_bits(within, arity_bits);
        let coset_start = x * g.exp_u64((arity - rev) as u64);
        let points = g
            .powers()
            .map(|y| GoldilocksExt::from(coset_start * y))
            .zip(evals)
            .take(arity)
            .collect::<Vec<_>>();
        let weights = barycentric_weights(&points);
        interpolate(&points, beta, &weights)
    }

    fn check_evaluation(beta: impl Fn(Goldilocks, usize) -> GoldilocksExt, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let params = fri_params();
        let x = random_goldilocks(&mut rng);
        let within = 0b1010usize;
        let evals = (0..16).map(|_| random_extension(&mut rng)).collect::<Vec<_>>();
        let beta = beta(x, within);
        let expected = native_evaluation(x, within, &evals, beta);
        assert!(mock_run(17, 16, |ctx, chips: &MockChips<Fr>| {
            let hasher = chips.poseidon_goldilocks.clone();
            let chip = FriVerifierChip::new(chips.extension.clone(), &hasher, &params).unwrap();
            let x = chips.goldilocks.load_canonical(ctx, x);
            let within = chips.goldilocks.load_canonical(ctx, Goldilocks::from_canonical_usize(within));
            let bits = chips.goldilocks.to_bits(ctx, within, SUPPORTED_ARITY_BITS);
            let evals = evals
                .iter()
                .map(|e| chips.extension.load_canonical(ctx, *e))
                .collect::<Vec<_>>();
            let beta = chips.extension.load_canonical(ctx, beta);
            let result = chip
                .compute_evaluation(ctx, x, &bits, SUPPORTED_ARITY_BITS, &evals, &beta)
                .unwrap();
            assert_eq!(result.value(), expected);
        }));
    }

    #[test]
    fn test_compute_evaluation_matches_native() {
        init();
        let mut rng = StdRng::seed_from_u64(21);
        let beta = random_extension(&mut rng);
        check_evaluation(|_, _| beta, 22);
    }

    #[test]
    fn test_compute_evaluation_at_coset_point() {
        init();
        // beta equal to the third point of the coset takes the fallback path.
        check_evaluation(
            |x, within| {
                let g = primitive_root_of_unity(SUPPORTED_ARITY_BITS);
                let coset_start = x * g.exp_u64((16 - reverse_bits(within, SUPPORTED_ARITY_BITS)) as u64);
                GoldilocksExt::from(coset_start * g.exp_u64(3))
            },
            23,
        );
    }

    #[test]
    fn test_rejects_other_arities() {
        init();
        let mut params = fri_params();
        params.reduction_arity_bits = vec![3];
        assert!(mock_run(12, 11, |_ctx, chips: &MockChips<Fr>| {
            let hasher = chips.poseidon_goldilocks.clone();
            assert!(matches!(
                FriVerifierChip::new(chips.extension.clone(), &hasher, &params),
                Err(VerifierError::Unsupported(_))
            ));
        }));
    }
}

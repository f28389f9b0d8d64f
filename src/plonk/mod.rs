use halo2_base::{utils::BigPrimeField, AssignedValue, Context};
use log::{debug, info};
use plonky2::field::types::Field;

use crate::error::{Result, VerifierError};
use crate::fields::{AssignedExtensionValue, ExtensionFieldChip, Goldilocks, GoldilocksExt, QuantumExtensionCell};
use crate::fri::FriChallenges;
use crate::gates::{EvaluationVars, GateEvaluatorChip};
use crate::types::CircuitDescription;
use crate::witness::AssignedOpeningSet;

/// Every challenge of one proof, in transcript order.
pub struct ProofChallenges<F: BigPrimeField> {
    pub plonk_betas: Vec<AssignedValue<F>>,
    pub plonk_gammas: Vec<AssignedValue<F>>,
    pub plonk_alphas: Vec<AssignedValue<F>>,
    pub plonk_zeta: AssignedExtensionValue<F>,
    pub fri_challenges: FriChallenges<F>,
}

// PLONK VERIFIER CHIP
// =========================================================================

/// Checks the vanishing polynomial identity at `zeta`:
/// `sum_j alpha^j * vanishing_j(zeta) = Z_H(zeta) * sum_k zeta^(n k) * quotient_k(zeta)`,
/// once per challenge repetition.
pub struct PlonkVerifierChip<'a, F: BigPrimeField> {
    extension: ExtensionFieldChip<F>,
    evaluator: GateEvaluatorChip<F>,
    description: &'a CircuitDescription,
}

impl<'a, F: BigPrimeField> PlonkVerifierChip<'a, F> {
    pub fn new(extension: ExtensionFieldChip<F>, description: &'a CircuitDescription) -> Result<Self> {
        let evaluator = GateEvaluatorChip::new(
            extension.clone(),
            description.gates.clone(),
            description.selectors_info.clone(),
            description.num_gate_constraints,
        )?;
        Ok(Self {
            extension,
            evaluator,
            description,
        })
    }

    pub fn verify(
        &self,
        ctx: &mut Context<F>,
        challenges: &ProofChallenges<F>,
        openings: &AssignedOpeningSet<F>,
        public_inputs_hash: [AssignedValue<F>; 4],
    ) -> Result<()> {
        let ext = &self.extension;
        let zeta = &challenges.plonk_zeta;
        let zeta_pow_n = ext.exp_power_of_2(ctx, zeta, self.description.degree_bits());

        let vars = EvaluationVars {
            local_constants: openings.constants.clone(),
            local_wires: openings.wires.clone(),
            public_inputs_hash,
        };
        let vanishing = self.eval_vanishing_poly(ctx, challenges, openings, &vars, &zeta_pow_n)?;

        let qdf = self.description.quotient_degree_factor;
        VerifierError::ensure_len(
            "quotient openings",
            vanishing.len() * qdf,
            openings.quotient_polys.len(),
        )?;
        let z_h = ext.sub(ctx, zeta_pow_n, GoldilocksExt::ONE);
        for (reduced, chunk) in vanishing.iter().zip(openings.quotient_polys.chunks(qdf)) {
            let quotient = ext.reduce_with_powers(ctx, chunk, &zeta_pow_n);
            let expected = ext.mul(ctx, z_h, quotient);
            ext.constrain_equal(ctx, reduced, &expected);
        }
        info!("emitted PLONK vanishing identity for {} challenges", vanishing.len());
        Ok(())
    }

    /// `L_0(zeta) = (zeta^n - 1) / (n * (zeta - 1))`.
    pub fn eval_l0(
        &self,
        ctx: &mut Context<F>,
        zeta: &AssignedExtensionValue<F>,
        zeta_pow_n: &AssignedExtensionValue<F>,
    ) -> AssignedExtensionValue<F> {
        let ext = &self.extension;
        let n = Goldilocks::from_canonical_usize(self.description.degree());
        let numerator = ext.sub(ctx, zeta_pow_n, GoldilocksExt::ONE);
        let scaled = ext.mul(ctx, zeta, GoldilocksExt::from(n));
        let denominator = ext.sub(ctx, scaled, GoldilocksExt::from(n));
        ext.div_checked(ctx, numerator, &denominator)
    }

    /// `prev * prod(numerators) - next * prod(denominators)` per chunk, where the accumulators
    /// run from `Z(zeta)` through the partial products to `Z(g * zeta)`.
    pub fn check_partial_products(
        &self,
        ctx: &mut Context<F>,
        numerators: &[AssignedExtensionValue<F>],
        denominators: &[AssignedExtensionValue<F>],
        accumulators: &[AssignedExtensionValue<F>],
    ) -> Result<Vec<AssignedExtensionValue<F>>> {
        let ext = &self.extension;
        let qdf = self.description.quotient_degree_factor;
        let num_chunks = (numerators.len() + qdf - 1) / qdf;
        VerifierError::ensure_len("partial product accumulators", num_chunks + 1, accumulators.len())?;

        let product = |ctx: &mut Context<F>, chunk: &[AssignedExtensionValue<F>]| {
            let mut acc = chunk[0];
            for x in &chunk[1..] {
                acc = ext.mul(ctx, acc, x);
            }
            acc
        };

        let mut checks = Vec::with_capacity(num_chunks);
        for ((nume_chunk, deno_chunk), pair) in numerators
            .chunks(qdf)
            .zip(denominators.chunks(qdf))
            .zip(accumulators.windows(2))
        {
            let num_product = product(ctx, nume_chunk);
            let den_product = product(ctx, deno_chunk);
            let lhs = ext.mul(ctx, pair[0], num_product);
            checks.push(ext.sub_mul(ctx, lhs, pair[1], den_product));
        }
        Ok(checks)
    }

    /// The vanishing terms (the `Z(1) = 1` checks, the permutation checks, then the gate
    /// constraints) reduced by each `alpha`.
    pub fn eval_vanishing_poly(
        &self,
        ctx: &mut Context<F>,
        challenges: &ProofChallenges<F>,
        openings: &AssignedOpeningSet<F>,
        vars: &EvaluationVars<F>,
        zeta_pow_n: &AssignedExtensionValue<F>,
    ) -> Result<Vec<AssignedExtensionValue<F>>> {
        let ext = &self.extension;
        let description = self.description;
        let num_challenges = description.num_challenges();
        let num_routed_wires = description.config.num_routed_wires;
        let num_partial_products = description.num_partial_products;
        for (what, expected, actual) in [
            ("betas", num_challenges, challenges.plonk_betas.len()),
            ("gammas", num_challenges, challenges.plonk_gammas.len()),
            ("alphas", num_challenges, challenges.plonk_alphas.len()),
            ("Z openings", num_challenges, openings.plonk_zs.len()),
            ("next Z openings", num_challenges, openings.plonk_zs_next.len()),
            ("sigma openings", num_routed_wires, openings.plonk_sigmas.len()),
            (
                "partial product openings",
                num_challenges * num_partial_products,
                openings.partial_products.len(),
            ),
        ] {
            VerifierError::ensure_len(what, expected, actual)?;
        }
        if openings.wires.len() < num_routed_wires {
            return Err(VerifierError::shape("wire openings", num_routed_wires, openings.wires.len()));
        }

        let constraint_terms = self.evaluator.evaluate_gate_constraints(ctx, vars)?;
        debug!("evaluated {} gate constraints", constraint_terms.len());

        let zeta = &challenges.plonk_zeta;
        let l0 = self.eval_l0(ctx, zeta, zeta_pow_n);
        let s_ids = description.k_is[..num_routed_wires]
            .iter()
            .map(|k| ext.mul(ctx, zeta, GoldilocksExt::from_canonical_u64(*k)))
            .collect::<Vec<_>>();

        let mut z1_terms = Vec::with_capacity(num_challenges);
        let mut partial_product_terms = Vec::with_capacity(num_challenges * (num_partial_products + 1));
        for i in 0..num_challenges {
            let z = openings.plonk_zs[i];
            let z_minus_one = ext.sub(ctx, z, GoldilocksExt::ONE);
            z1_terms.push(ext.mul(ctx, l0, z_minus_one));

            let beta = QuantumExtensionCell::Base(challenges.plonk_betas[i]);
            let gamma = QuantumExtensionCell::Base(challenges.plonk_gammas[i]);
            let mut numerators = Vec::with_capacity(num_routed_wires);
            let mut denominators = Vec::with_capacity(num_routed_wires);
            for j in 0..num_routed_wires {
                let wire_plus_gamma = ext.add(ctx, openings.wires[j], gamma);
                numerators.push(ext.mul_add(ctx, beta, s_ids[j], wire_plus_gamma));
                denominators.push(ext.mul_add(ctx, beta, openings.plonk_sigmas[j], wire_plus_gamma));
            }

            let accumulators = std::iter::once(z)
                .chain(
                    openings.partial_products[i * num_partial_products..(i + 1) * num_partial_products]
                        .iter()
                        .copied(),
                )
                .chain(std::iter::once(openings.plonk_zs_next[i]))
                .collect::<Vec<_>>();
            partial_product_terms.extend(self.check_partial_products(
                ctx,
                &numerators,
                &denominators,
                &accumulators,
            )?);
        }

        let vanishing_terms = z1_terms
            .into_iter()
            .chain(partial_product_terms)
            .chain(constraint_terms)
            .collect::<Vec<_>>();
        Ok(challenges
            .plonk_alphas
            .iter()
            .map(|alpha| {
                let alpha = ext.from_base(ctx, *alpha);
                ext.reduce_with_powers(ctx, &vanishing_terms, &alpha)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{init, mock_run, random_extension, MockChips, PLONKY2_FIXTURE};
    use halo2_base::halo2_proofs::halo2curves::bn256::Fr;
    use rand::{rngs::StdRng, SeedableRng};

    fn description() -> CircuitDescription {
        CircuitDescription::try_from(&PLONKY2_FIXTURE.common).unwrap()
    }

    #[test]
    fn test_eval_l0_matches_native() {
        init();
        let description = description();
        let mut rng = StdRng::seed_from_u64(31);
        let zeta = random_extension(&mut rng);
        let n = description.degree();
        let zeta_pow_n = zeta.exp_u64(n as u64);
        let n_ext = GoldilocksExt::from_canonical_usize(n);
        let expected = (zeta_pow_n - GoldilocksExt::ONE) / (n_ext * (zeta - GoldilocksExt::ONE));
        assert!(mock_run(15, 14, |ctx, chips: &MockChips<Fr>| {
            let chip = PlonkVerifierChip::new(chips.extension.clone(), &description).unwrap();
            let zeta = chips.extension.load_canonical(ctx, zeta);
            let zeta_pow_n = chips.extension.load_canonical(ctx, zeta_pow_n);
            assert_eq!(chip.eval_l0(ctx, &zeta, &zeta_pow_n).value(), expected);
        }));
    }

    #[test]
    fn test_partial_products_uneven_chunks() {
        init();
        let mut description = description();
        description.quotient_degree_factor = 3;
        let mut rng = StdRng::seed_from_u64(32);
        let numerators = (0..7).map(|_| random_extension(&mut rng)).collect::<Vec<_>>();
        let denominators = (0..7).map(|_| random_extension(&mut rng)).collect::<Vec<_>>();

        // Honest accumulators make every check vanish.
        let mut accumulators = vec![random_extension(&mut rng)];
        for (nums, dens) in numerators.chunks(3).zip(denominators.chunks(3)) {
            let prev = *accumulators.last().unwrap();
            let ratio = nums.iter().copied().product::<GoldilocksExt>() / dens.iter().copied().product::<GoldilocksExt>();
            accumulators.push(prev * ratio);
        }
        assert_eq!(accumulators.len(), 4);

        assert!(mock_run(16, 15, |ctx, chips: &MockChips<Fr>| {
            let chip = PlonkVerifierChip::new(chips.extension.clone(), &description).unwrap();
            let load = |ctx: &mut Context<Fr>, values: &[GoldilocksExt]| {
                values
                    .iter()
                    .map(|v| chips.extension.load_canonical(ctx, *v))
                    .collect::<Vec<_>>()
            };
            let nums = load(ctx, &numerators);
            let dens = load(ctx, &denominators);
            let accs = load(ctx, &accumulators);
            let checks = chip.check_partial_products(ctx, &nums, &dens, &accs).unwrap();
            assert_eq!(checks.len(), 3);
            for check in checks {
                assert_eq!(check.value(), GoldilocksExt::ZERO);
            }
            assert!(chip.check_partial_products(ctx, &nums, &dens, &accs[..3]).is_err());
        }));
    }
}

use halo2_base::{
    gates::GateInstructions,
    utils::BigPrimeField,
    Context,
    QuantumCell::{Constant, Existing},
};
use plonky2::field::{extension::FieldExtension, types::Field};

use super::{
    fe_from_goldilocks, AssignedExtensionValue, ExtensionFieldChip, Goldilocks, GoldilocksExt,
    QuantumExtensionCell, W,
};
use crate::D;

/// Coordinate bound of an unreduced algebra product: `7 * 2^131 + 2^131`.
const ALGEBRA_MUL_BITS: usize = 134;

/// `coeffs[0] + coeffs[1] * Y` in `GF(p^2)[Y] / (Y^2 - W)`. Gates that operate on extension
/// values are evaluated over this algebra when the openings are themselves extension values.
#[derive(Clone, Copy, Debug)]
pub struct AssignedExtensionAlgebra<F: BigPrimeField> {
    pub coeffs: [AssignedExtensionValue<F>; D],
}

impl<F: BigPrimeField> AssignedExtensionAlgebra<F> {
    pub fn construct(coeffs: [AssignedExtensionValue<F>; D]) -> Self {
        Self { coeffs }
    }

    /// The extension values making up the algebra element, in order.
    pub fn to_ext_array(&self) -> [AssignedExtensionValue<F>; D] {
        self.coeffs
    }

    pub fn value(&self) -> [GoldilocksExt; D] {
        self.coeffs.map(|c| c.value())
    }
}

impl<F: BigPrimeField> ExtensionFieldChip<F> {
    pub fn zero_algebra(&self, ctx: &mut Context<F>) -> AssignedExtensionAlgebra<F> {
        let zero = self.zero(ctx);
        AssignedExtensionAlgebra::construct([zero, zero])
    }

    pub fn one_algebra(&self, ctx: &mut Context<F>) -> AssignedExtensionAlgebra<F> {
        let zero = self.zero(ctx);
        let one = self.one(ctx);
        AssignedExtensionAlgebra::construct([one, zero])
    }

    /// Embeds an extension value as `a + 0 * Y`.
    pub fn algebra_from_ext(
        &self,
        ctx: &mut Context<F>,
        a: AssignedExtensionValue<F>,
    ) -> AssignedExtensionAlgebra<F> {
        let zero = self.zero(ctx);
        AssignedExtensionAlgebra::construct([a, zero])
    }

    pub fn add_algebra(
        &self,
        ctx: &mut Context<F>,
        a: &AssignedExtensionAlgebra<F>,
        b: &AssignedExtensionAlgebra<F>,
    ) -> AssignedExtensionAlgebra<F> {
        AssignedExtensionAlgebra::construct([0, 1].map(|i| self.add(ctx, a.coeffs[i], b.coeffs[i])))
    }

    pub fn sub_algebra(
        &self,
        ctx: &mut Context<F>,
        a: &AssignedExtensionAlgebra<F>,
        b: &AssignedExtensionAlgebra<F>,
    ) -> AssignedExtensionAlgebra<F> {
        AssignedExtensionAlgebra::construct([0, 1].map(|i| self.sub(ctx, a.coeffs[i], b.coeffs[i])))
    }

    /// `res[(i + j) % D] += a_i * b_j`, with an extra factor `W` when `i + j >= D`. Each output
    /// coordinate is accumulated unreduced and reduced once.
    pub fn mul_algebra(
        &self,
        ctx: &mut Context<F>,
        a: &AssignedExtensionAlgebra<F>,
        b: &AssignedExtensionAlgebra<F>,
    ) -> AssignedExtensionAlgebra<F> {
        let gate = self.goldilocks().gate();
        let mut plain = vec![vec![]; D];
        let mut wrapped = vec![vec![]; D];
        for i in 0..D {
            for j in 0..D {
                let product = self.mul_no_reduce(ctx, a.coeffs[i], b.coeffs[j]);
                if i + j < D {
                    plain[i + j].push(product);
                } else {
                    wrapped[i + j - D].push(product);
                }
            }
        }
        let coeffs = [0, 1].map(|k| {
            let raw = [0, 1].map(|c| {
                let plain = gate.sum(ctx, plain[k].iter().map(|p| p.coeffs[c]));
                let wrapped = gate.sum(ctx, wrapped[k].iter().map(|p| p.coeffs[c]));
                gate.mul_add(ctx, wrapped, Constant(F::from(W)), plain)
            });
            self.reduce_bounded(ctx, AssignedExtensionValue::construct(raw), ALGEBRA_MUL_BITS)
        });
        AssignedExtensionAlgebra::construct(coeffs)
    }

    /// Multiplies every coordinate by an extension scalar.
    pub fn scalar_mul_algebra(
        &self,
        ctx: &mut Context<F>,
        scalar: impl Into<QuantumExtensionCell<F>>,
        a: &AssignedExtensionAlgebra<F>,
    ) -> AssignedExtensionAlgebra<F> {
        let scalar = scalar.into();
        AssignedExtensionAlgebra::construct(a.coeffs.map(|c| self.mul(ctx, scalar, c)))
    }

    /// `a - x` for a base field constant `x`.
    fn sub_base_const_algebra(
        &self,
        ctx: &mut Context<F>,
        a: &AssignedExtensionAlgebra<F>,
        x: Goldilocks,
    ) -> AssignedExtensionAlgebra<F> {
        let gl = self.goldilocks();
        let mut first = a.coeffs[0];
        first.coeffs[0] = gl.sub(ctx, Existing(first.coeffs[0]), Constant(fe_from_goldilocks(x)));
        AssignedExtensionAlgebra::construct([first, a.coeffs[1]])
    }

    /// One barycentric interpolation pass over `domain`, continuing from
    /// `(initial_eval, initial_partial_prod)`:
    /// `eval <- eval * (point - x_i) + w_i * v_i * prod`, `prod <- prod * (point - x_i)`.
    pub fn partial_interpolate_algebra(
        &self,
        ctx: &mut Context<F>,
        domain: &[Goldilocks],
        values: &[AssignedExtensionAlgebra<F>],
        barycentric_weights: &[Goldilocks],
        point: &AssignedExtensionAlgebra<F>,
        initial_eval: AssignedExtensionAlgebra<F>,
        initial_partial_prod: AssignedExtensionAlgebra<F>,
    ) -> (AssignedExtensionAlgebra<F>, AssignedExtensionAlgebra<F>) {
        debug_assert_eq!(domain.len(), values.len());
        debug_assert_eq!(domain.len(), barycentric_weights.len());

        let mut eval = initial_eval;
        let mut partial_prod = initial_partial_prod;
        for ((x, value), weight) in domain.iter().zip(values).zip(barycentric_weights) {
            let term = self.sub_base_const_algebra(ctx, point, *x);
            let weighted = self.scalar_mul_algebra(ctx, <GoldilocksExt as FieldExtension<D>>::from_basefield(*weight), value);
            let shifted = self.mul_algebra(ctx, &eval, &term);
            let contribution = self.mul_algebra(ctx, &weighted, &partial_prod);
            eval = self.add_algebra(ctx, &shifted, &contribution);
            partial_prod = self.mul_algebra(ctx, &partial_prod, &term);
        }
        (eval, partial_prod)
    }
}

/// Native `a * b` in the algebra, mirroring [`ExtensionFieldChip::mul_algebra`].
pub fn mul_algebra_native(a: [GoldilocksExt; D], b: [GoldilocksExt; D]) -> [GoldilocksExt; D] {
    let w = <GoldilocksExt as FieldExtension<D>>::from_basefield(Goldilocks::from_canonical_u64(W));
    let mut res = [GoldilocksExt::ZERO; D];
    for i in 0..D {
        for j in 0..D {
            let product = a[i] * b[j];
            if i + j < D {
                res[i + j] += product;
            } else {
                res[i + j - D] += w * product;
            }
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{init, mock_run, random_extension, MockChips};
    use halo2_base::halo2_proofs::halo2curves::bn256::Fr;
    use plonky2::field::extension::algebra::ExtensionAlgebra;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_native_mul_matches_plonky2() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..8 {
            let a = [random_extension(&mut rng), random_extension(&mut rng)];
            let b = [random_extension(&mut rng), random_extension(&mut rng)];
            let expected = ExtensionAlgebra::<GoldilocksExt, 2>(a) * ExtensionAlgebra(b);
            assert_eq!(mul_algebra_native(a, b), expected.0);
        }
    }

    #[test]
    fn test_algebra_mul_and_interpolate() {
        init();
        let mut rng = StdRng::seed_from_u64(5);
        let a = [random_extension(&mut rng), random_extension(&mut rng)];
        let b = [random_extension(&mut rng), random_extension(&mut rng)];
        let points = (0..3)
            .map(|_| [random_extension(&mut rng), random_extension(&mut rng)])
            .collect::<Vec<_>>();
        assert!(mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let ext_chip = &chips.extension;
            let load = |ctx: &mut Context<Fr>, v: [GoldilocksExt; 2]| {
                AssignedExtensionAlgebra::construct(v.map(|c| ext_chip.load_canonical(ctx, c)))
            };
            let x = load(ctx, a);
            let y = load(ctx, b);
            let product = ext_chip.mul_algebra(ctx, &x, &y);
            assert_eq!(product.value(), mul_algebra_native(a, b));

            // A single-point pass from (0, 1) yields (w * v, point - x).
            let domain = [Goldilocks::from_canonical_u64(9)];
            let weights = [Goldilocks::from_canonical_u64(4)];
            let value = load(ctx, points[0]);
            let point = load(ctx, points[1]);
            let zero = ext_chip.zero_algebra(ctx);
            let one = ext_chip.one_algebra(ctx);
            let (eval, prod) =
                ext_chip.partial_interpolate_algebra(ctx, &domain, &[value], &weights, &point, zero, one);
            let four = <GoldilocksExt as FieldExtension<D>>::from_basefield(weights[0]);
            assert_eq!(eval.value(), points[0].map(|c| c * four));
            let nine = <GoldilocksExt as FieldExtension<D>>::from_basefield(domain[0]);
            assert_eq!(prod.value(), [points[1][0] - nine, points[1][1]]);
        }));
    }
}

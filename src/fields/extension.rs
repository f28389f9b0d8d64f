use halo2_base::{
    gates::GateInstructions,
    utils::{biguint_to_fe, BigPrimeField},
    AssignedValue, Context,
    QuantumCell::{self, Constant},
};
use num_bigint::BigUint;
use plonky2::field::{extension::FieldExtension, types::Field};

use super::{
    goldilocks::quotient_bits, AssignedExtensionValue, GoldilocksChip, GoldilocksExt,
    QuantumExtensionCell, DTH_ROOT, GOLDILOCKS_MODULUS, W,
};
use crate::D;

/// Bit bound of an unreduced product coordinate of canonical operands:
/// `a0 * b0 + W * a1 * b1 < 8 * 2^128`.
const MUL_BITS: usize = 131;

/// [`MUL_BITS`] plus one canonical addend.
const MUL_ADD_BITS: usize = 132;

/// `p * 2^68`, a multiple of `p` larger than any unreduced product, used to keep `a - b * c`
/// non-negative.
fn sub_mul_offset<F: BigPrimeField>() -> F {
    biguint_to_fe(&(BigUint::from(GOLDILOCKS_MODULUS) << 68))
}

fn bits_for_terms(term_bits: usize, num_terms: usize) -> usize {
    term_bits + (usize::BITS - num_terms.max(1).saturating_sub(1).leading_zeros()) as usize
}

#[derive(Clone, Debug)]
pub struct ExtensionFieldChip<F: BigPrimeField> {
    goldilocks: GoldilocksChip<F>,
}

impl<F: BigPrimeField> ExtensionFieldChip<F> {
    pub fn new(goldilocks: GoldilocksChip<F>) -> Self {
        Self { goldilocks }
    }

    pub fn goldilocks(&self) -> &GoldilocksChip<F> {
        &self.goldilocks
    }

    pub fn load_witness(&self, ctx: &mut Context<F>, x: GoldilocksExt) -> AssignedExtensionValue<F> {
        let coeffs = x.to_basefield_array().map(|c| self.goldilocks.load_witness(ctx, c));
        AssignedExtensionValue::construct(coeffs)
    }

    /// Loads and range checks both coefficients.
    pub fn load_canonical(&self, ctx: &mut Context<F>, x: GoldilocksExt) -> AssignedExtensionValue<F> {
        let coeffs = x.to_basefield_array().map(|c| self.goldilocks.load_canonical(ctx, c));
        AssignedExtensionValue::construct(coeffs)
    }

    pub fn load_constant(&self, ctx: &mut Context<F>, c: GoldilocksExt) -> AssignedExtensionValue<F> {
        let coeffs = c.to_basefield_array().map(|c| self.goldilocks.load_constant(ctx, c));
        AssignedExtensionValue::construct(coeffs)
    }

    pub fn zero(&self, ctx: &mut Context<F>) -> AssignedExtensionValue<F> {
        self.load_constant(ctx, GoldilocksExt::ZERO)
    }

    pub fn one(&self, ctx: &mut Context<F>) -> AssignedExtensionValue<F> {
        self.load_constant(ctx, GoldilocksExt::ONE)
    }

    /// Embeds a base field cell, `a + 0 * X`.
    pub fn from_base(&self, ctx: &mut Context<F>, a: AssignedValue<F>) -> AssignedExtensionValue<F> {
        let zero = ctx.load_zero();
        AssignedExtensionValue::construct([a, zero])
    }

    pub fn constrain_equal(
        &self,
        ctx: &mut Context<F>,
        a: &AssignedExtensionValue<F>,
        b: &AssignedExtensionValue<F>,
    ) {
        for (a, b) in a.coeffs.iter().zip(b.coeffs.iter()) {
            ctx.constrain_equal(a, b);
        }
    }

    pub fn range_check(&self, ctx: &mut Context<F>, a: &AssignedExtensionValue<F>) {
        for c in a.coeffs {
            self.goldilocks.range_check(ctx, c);
        }
    }

    /// Reduces each coordinate of a value whose coordinates are below `2^value_bits`.
    pub fn reduce_bounded(
        &self,
        ctx: &mut Context<F>,
        a: AssignedExtensionValue<F>,
        value_bits: usize,
    ) -> AssignedExtensionValue<F> {
        let coeffs = a
            .coeffs
            .map(|c| self.goldilocks.reduce_with_max_bits(ctx, c, quotient_bits(value_bits)));
        AssignedExtensionValue::construct(coeffs)
    }

    // ADDITIVE
    // =========================================================================

    pub fn add(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
        b: impl Into<QuantumExtensionCell<F>>,
    ) -> AssignedExtensionValue<F> {
        let (a, b) = (a.into().coeffs(), b.into().coeffs());
        AssignedExtensionValue::construct([0, 1].map(|i| self.goldilocks.add(ctx, a[i], b[i])))
    }

    pub fn sub(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
        b: impl Into<QuantumExtensionCell<F>>,
    ) -> AssignedExtensionValue<F> {
        let (a, b) = (a.into().coeffs(), b.into().coeffs());
        AssignedExtensionValue::construct([0, 1].map(|i| self.goldilocks.sub(ctx, a[i], b[i])))
    }

    pub fn neg(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
    ) -> AssignedExtensionValue<F> {
        let a = a.into().coeffs();
        AssignedExtensionValue::construct(a.map(|c| self.goldilocks.neg(ctx, c)))
    }

    /// Coordinate-wise `a + b`, bounded by the sum of the operand bounds.
    pub fn add_no_reduce(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
        b: impl Into<QuantumExtensionCell<F>>,
    ) -> AssignedExtensionValue<F> {
        let (a, b) = (a.into().coeffs(), b.into().coeffs());
        AssignedExtensionValue::construct(
            [0, 1].map(|i| self.goldilocks.add_no_reduce(ctx, a[i], b[i])),
        )
    }

    /// Coordinate-wise `a - b + p`, for canonical `b`.
    pub fn sub_no_reduce(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
        b: impl Into<QuantumExtensionCell<F>>,
    ) -> AssignedExtensionValue<F> {
        let (a, b) = (a.into().coeffs(), b.into().coeffs());
        AssignedExtensionValue::construct(
            [0, 1].map(|i| self.goldilocks.sub_no_reduce(ctx, a[i], b[i])),
        )
    }

    /// Sum of canonical terms with a single reduction per coordinate.
    pub fn sum(
        &self,
        ctx: &mut Context<F>,
        terms: impl IntoIterator<Item = AssignedExtensionValue<F>>,
    ) -> AssignedExtensionValue<F> {
        let terms = terms.into_iter().collect::<Vec<_>>();
        let gate = self.goldilocks.gate();
        let coeffs = [0, 1].map(|i| gate.sum(ctx, terms.iter().map(|t| t.coeffs[i])));
        self.reduce_bounded(ctx, AssignedExtensionValue::construct(coeffs), bits_for_terms(64, terms.len()))
    }

    // MULTIPLICATIVE
    // =========================================================================

    /// Schoolbook `a * b + c` without reduction:
    /// `(a0 b0 + W a1 b1 + c0, a0 b1 + a1 b0 + c1)`.
    fn mul_add_raw(
        &self,
        ctx: &mut Context<F>,
        a: [QuantumCell<F>; D],
        b: [QuantumCell<F>; D],
        c: [QuantumCell<F>; D],
    ) -> AssignedExtensionValue<F> {
        let gate = self.goldilocks.gate();
        let a1b1 = gate.mul(ctx, a[1], b[1]);
        let lo = gate.mul_add(ctx, a1b1, Constant(F::from(W)), c[0]);
        let lo = gate.mul_add(ctx, a[0], b[0], lo);
        let hi = gate.mul_add(ctx, a[0], b[1], c[1]);
        let hi = gate.mul_add(ctx, a[1], b[0], hi);
        AssignedExtensionValue::construct([lo, hi])
    }

    /// `a * b` without reduction, coordinates below `2^131` for canonical operands.
    pub fn mul_no_reduce(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
        b: impl Into<QuantumExtensionCell<F>>,
    ) -> AssignedExtensionValue<F> {
        let zero = [Constant(F::ZERO), Constant(F::ZERO)];
        self.mul_add_raw(ctx, a.into().coeffs(), b.into().coeffs(), zero)
    }

    /// `a * b + c` without reduction. Each coordinate is bounded by the product bound plus
    /// the bound of `c`.
    pub fn mul_add_no_reduce(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
        b: impl Into<QuantumExtensionCell<F>>,
        c: impl Into<QuantumExtensionCell<F>>,
    ) -> AssignedExtensionValue<F> {
        self.mul_add_raw(ctx, a.into().coeffs(), b.into().coeffs(), c.into().coeffs())
    }

    pub fn mul(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
        b: impl Into<QuantumExtensionCell<F>>,
    ) -> AssignedExtensionValue<F> {
        let product = self.mul_no_reduce(ctx, a, b);
        self.reduce_bounded(ctx, product, MUL_BITS)
    }

    pub fn mul_add(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
        b: impl Into<QuantumExtensionCell<F>>,
        c: impl Into<QuantumExtensionCell<F>>,
    ) -> AssignedExtensionValue<F> {
        let result = self.mul_add_no_reduce(ctx, a, b, c);
        self.reduce_bounded(ctx, result, MUL_ADD_BITS)
    }

    /// `a - b * c`.
    pub fn sub_mul(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
        b: impl Into<QuantumExtensionCell<F>>,
        c: impl Into<QuantumExtensionCell<F>>,
    ) -> AssignedExtensionValue<F> {
        let a = a.into().coeffs();
        let product = self.mul_no_reduce(ctx, b, c);
        let gate = self.goldilocks.gate();
        let offset = Constant(sub_mul_offset::<F>());
        let coeffs = [0, 1].map(|i| {
            let shifted = gate.add(ctx, a[i], offset);
            gate.sub(ctx, shifted, product.coeffs[i])
        });
        self.reduce_bounded(ctx, AssignedExtensionValue::construct(coeffs), 133)
    }

    pub fn square(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
    ) -> AssignedExtensionValue<F> {
        let a = a.into();
        self.mul(ctx, a, a)
    }

    /// Multiplies both coordinates by a base field cell.
    pub fn scalar_mul(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
        s: impl Into<QuantumCell<F>>,
    ) -> AssignedExtensionValue<F> {
        let (a, s) = (a.into().coeffs(), s.into());
        AssignedExtensionValue::construct(a.map(|c| self.goldilocks.mul(ctx, c, s)))
    }

    /// `sum_i a_i * b_i`, reduced once at the end.
    pub fn inner_product(
        &self,
        ctx: &mut Context<F>,
        pairs: impl IntoIterator<Item = (QuantumExtensionCell<F>, QuantumExtensionCell<F>)>,
    ) -> AssignedExtensionValue<F> {
        let mut acc = [Constant(F::ZERO), Constant(F::ZERO)];
        let mut num_terms = 0;
        for (a, b) in pairs {
            let next = self.mul_add_raw(ctx, a.coeffs(), b.coeffs(), acc);
            acc = next.coeffs.map(QuantumCell::Existing);
            num_terms += 1;
        }
        let acc = AssignedExtensionValue::construct(acc.map(|c| match c {
            QuantumCell::Existing(c) => c,
            _ => ctx.load_zero(),
        }));
        self.reduce_bounded(ctx, acc, bits_for_terms(MUL_BITS, num_terms))
    }

    /// `(a^-1, has_inverse)`. Uses the Frobenius map: `a^p = a0 + DTH_ROOT * a1 * X`, so the
    /// norm `a * a^p` lies in the base field and one base field inversion suffices.
    pub fn inverse(
        &self,
        ctx: &mut Context<F>,
        a: &AssignedExtensionValue<F>,
    ) -> (AssignedExtensionValue<F>, AssignedValue<F>) {
        let gl = &self.goldilocks;
        let frobenius = AssignedExtensionValue::construct([
            a.coeffs[0],
            gl.mul(ctx, a.coeffs[1], Constant(F::from(DTH_ROOT))),
        ]);
        let norm = self.mul(ctx, a, frobenius);
        let (norm_inverse, has_inverse) = gl.inverse(ctx, norm.coeffs[0]);
        (self.scalar_mul(ctx, frobenius, norm_inverse), has_inverse)
    }

    pub fn div(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
        b: &AssignedExtensionValue<F>,
    ) -> (AssignedExtensionValue<F>, AssignedValue<F>) {
        let (b_inverse, has_inverse) = self.inverse(ctx, b);
        (self.mul(ctx, a, b_inverse), has_inverse)
    }

    /// `a / b`, constraining `b != 0`.
    pub fn div_checked(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumExtensionCell<F>>,
        b: &AssignedExtensionValue<F>,
    ) -> AssignedExtensionValue<F> {
        let (quotient, has_inverse) = self.div(ctx, a, b);
        self.goldilocks.gate().assert_is_const(ctx, &has_inverse, &F::ONE);
        quotient
    }

    /// `a^exponent` for a constant exponent.
    pub fn exp_u64(
        &self,
        ctx: &mut Context<F>,
        a: &AssignedExtensionValue<F>,
        exponent: u64,
    ) -> AssignedExtensionValue<F> {
        match exponent {
            0 => return self.one(ctx),
            1 => return *a,
            2 => return self.square(ctx, a),
            _ => {}
        }
        let mut current = *a;
        let mut product: QuantumExtensionCell<F> = GoldilocksExt::ONE.into();
        for i in 0..(64 - exponent.leading_zeros()) {
            if i != 0 {
                current = self.square(ctx, current);
            }
            if (exponent >> i) & 1 == 1 {
                product = self.mul(ctx, product, current).into();
            }
        }
        match product {
            QuantumExtensionCell::Existing(product) => product,
            _ => self.one(ctx),
        }
    }

    /// `a^(2^power_log)` by repeated squaring.
    pub fn exp_power_of_2(
        &self,
        ctx: &mut Context<F>,
        a: &AssignedExtensionValue<F>,
        power_log: usize,
    ) -> AssignedExtensionValue<F> {
        (0..power_log).fold(*a, |acc, _| self.square(ctx, acc))
    }

    /// Horner evaluation `sum_i terms[i] * scalar^i`, reducing after every step.
    pub fn reduce_with_powers<T>(
        &self,
        ctx: &mut Context<F>,
        terms: &[T],
        scalar: &AssignedExtensionValue<F>,
    ) -> AssignedExtensionValue<F>
    where
        T: Into<QuantumExtensionCell<F>> + Copy,
    {
        let mut sum = self.zero(ctx);
        for term in terms.iter().rev() {
            sum = self.mul_add(ctx, sum, scalar, *term);
        }
        sum
    }

    // SELECTION
    // =========================================================================

    /// Boolean `a == 0` for canonical `a`.
    pub fn is_zero(&self, ctx: &mut Context<F>, a: &AssignedExtensionValue<F>) -> AssignedValue<F> {
        let gate = self.goldilocks.gate();
        let [c0, c1] = a.coeffs.map(|c| gate.is_zero(ctx, c));
        gate.and(ctx, c0, c1)
    }

    /// Boolean `a == b` for canonical operands.
    pub fn is_equal(
        &self,
        ctx: &mut Context<F>,
        a: &AssignedExtensionValue<F>,
        b: impl Into<QuantumExtensionCell<F>>,
    ) -> AssignedValue<F> {
        let gate = self.goldilocks.gate();
        let b = b.into().coeffs();
        let c0 = gate.is_equal(ctx, a.coeffs[0], b[0]);
        let c1 = gate.is_equal(ctx, a.coeffs[1], b[1]);
        gate.and(ctx, c0, c1)
    }

    /// `x` when `bit = 0`, `y` when `bit = 1`.
    pub fn lookup(
        &self,
        ctx: &mut Context<F>,
        bit: AssignedValue<F>,
        x: impl Into<QuantumExtensionCell<F>>,
        y: impl Into<QuantumExtensionCell<F>>,
    ) -> AssignedExtensionValue<F> {
        let gate = self.goldilocks.gate();
        let (x, y) = (x.into().coeffs(), y.into().coeffs());
        AssignedExtensionValue::construct([0, 1].map(|i| gate.select(ctx, y[i], x[i], bit)))
    }

    /// `values[b0 + 2 * b1]`.
    pub fn lookup2(
        &self,
        ctx: &mut Context<F>,
        b0: AssignedValue<F>,
        b1: AssignedValue<F>,
        values: [AssignedExtensionValue<F>; 4],
    ) -> AssignedExtensionValue<F> {
        let low = self.lookup(ctx, b0, values[0], values[1]);
        let high = self.lookup(ctx, b0, values[2], values[3]);
        self.lookup(ctx, b1, low, high)
    }

    /// `values[index]` for little-endian `index_bits`, through a binary tree of selects.
    /// `values.len()` must be `2^index_bits.len()`.
    pub fn random_access(
        &self,
        ctx: &mut Context<F>,
        index_bits: &[AssignedValue<F>],
        values: &[AssignedExtensionValue<F>],
    ) -> AssignedExtensionValue<F> {
        debug_assert_eq!(values.len(), 1 << index_bits.len());
        let mut layer = values.to_vec();
        for bit in index_bits {
            layer = layer
                .chunks(2)
                .map(|pair| self.lookup(ctx, *bit, pair[0], pair[1]))
                .collect();
        }
        layer[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Goldilocks;
    use crate::tests::{init, mock_run, random_extension, MockChips};
    use halo2_base::halo2_proofs::halo2curves::bn256::Fr;
    use rand::{rngs::StdRng, SeedableRng};

    fn ext(c0: u64, c1: u64) -> GoldilocksExt {
        GoldilocksExt::from_basefield_array([
            Goldilocks::from_canonical_u64(c0),
            Goldilocks::from_canonical_u64(c1),
        ])
    }

    #[test]
    fn test_mul_known_vector() {
        init();
        let a = ext(4994088319481652598, 16489566008211790727);
        let b = ext(3797605683985595697, 13424401189265534004);
        let expected = ext(15052319864161058789, 16841416332519902625);
        assert_eq!(a * b, expected);
        assert!(mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let ext_chip = &chips.extension;
            let x = ext_chip.load_canonical(ctx, a);
            let y = ext_chip.load_canonical(ctx, b);
            let product = ext_chip.mul(ctx, x, y);
            assert_eq!(product.value(), expected);
            let expected = ext_chip.load_constant(ctx, expected);
            ext_chip.constrain_equal(ctx, &product, &expected);
        }));
    }

    #[test]
    fn test_arithmetic_matches_native() {
        init();
        let mut rng = StdRng::seed_from_u64(11);
        let values = (0..8).map(|_| random_extension(&mut rng)).collect::<Vec<_>>();
        assert!(mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let ext_chip = &chips.extension;
            let assigned = values
                .iter()
                .map(|v| ext_chip.load_canonical(ctx, *v))
                .collect::<Vec<_>>();
            for w in assigned.windows(3).zip(values.windows(3)) {
                let ([a, b, c], [x, y, z]) = (w.0, w.1) else {
                    unreachable!()
                };
                assert_eq!(ext_chip.mul_add(ctx, a, b, c).value(), *x * *y + *z);
                assert_eq!(ext_chip.sub_mul(ctx, a, b, c).value(), *x - *y * *z);
                assert_eq!(ext_chip.sub(ctx, a, b).value(), *x - *y);
                assert_eq!(ext_chip.div_checked(ctx, a, b).value(), *x / *y);
                assert_eq!(ext_chip.exp_u64(ctx, a, 13).value(), x.exp_u64(13));
            }
            let scalar = assigned[0];
            let reduced = ext_chip.reduce_with_powers(ctx, &assigned[1..], &scalar);
            let expected = values[1..]
                .iter()
                .rev()
                .fold(GoldilocksExt::ZERO, |acc, v| acc * values[0] + *v);
            assert_eq!(reduced.value(), expected);

            let pairs = assigned.iter().zip(assigned.iter().skip(1));
            let product = ext_chip.inner_product(ctx, pairs.map(|(a, b)| ((*a).into(), (*b).into())));
            let expected = values
                .iter()
                .zip(values.iter().skip(1))
                .fold(GoldilocksExt::ZERO, |acc, (a, b)| acc + *a * *b);
            assert_eq!(product.value(), expected);
        }));
    }

    #[test]
    fn test_inverse_of_zero() {
        init();
        assert!(mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let zero = chips.extension.zero(ctx);
            let (_, has_inverse) = chips.extension.inverse(ctx, &zero);
            chips.goldilocks.gate().assert_is_const(ctx, &has_inverse, &Fr::zero());
        }));
        assert!(!mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let one = chips.extension.one(ctx);
            let zero = chips.extension.zero(ctx);
            chips.extension.div_checked(ctx, one, &zero);
        }));
    }

    #[test]
    fn test_lookup2() {
        init();
        assert!(mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let ext_chip = &chips.extension;
            let values = [1, 2, 3, 4].map(|i| ext_chip.load_constant(ctx, ext(i, 10 * i)));
            for index in 0..4u64 {
                let b0 = ctx.load_witness(Fr::from(index & 1));
                let b1 = ctx.load_witness(Fr::from(index >> 1));
                let selected = ext_chip.lookup2(ctx, b0, b1, values);
                assert_eq!(selected.value(), ext(index + 1, 10 * (index + 1)));
                let bits = [b0, b1];
                let selected = ext_chip.random_access(ctx, &bits, &values);
                assert_eq!(selected.value(), ext(index + 1, 10 * (index + 1)));
            }
        }));
    }
}

use halo2_base::{
    gates::{GateChip, GateInstructions},
    utils::{biguint_to_fe, fe_to_biguint, BigPrimeField},
    AssignedValue, Context,
    QuantumCell::{self, Constant},
};
use num_bigint::BigUint;
use plonky2::field::types::{Field, PrimeField64};

use super::{
    fe_from_goldilocks, goldilocks_of, range::RangeCheckStrategy, Goldilocks, RangeChecker,
    GOLDILOCKS_MODULUS,
};

/// Default quotient width for [`GoldilocksChip::reduce`]. Enough for inner products of a
/// few thousand products of canonical values.
pub const REDUCE_QUOTIENT_BITS: usize = 144;

/// Number of quotient bits needed to reduce a value known to be below `2^value_bits`.
pub fn quotient_bits(value_bits: usize) -> usize {
    // p > 2^63
    value_bits.saturating_sub(63).max(1)
}

// GOLDILOCKS CHIP
// =========================================================================

/// Emulated arithmetic for `GF(p)`, `p = 2^64 - 2^32 + 1`, with one outer cell per element.
///
/// Reducing operations expect canonical operands (below `p`) and return canonical results.
/// The `*_no_reduce` variants only emit the raw outer field relation: the result is congruent
/// to the true value but its magnitude grows, and each documents its bound so that callers
/// can size the eventual [`GoldilocksChip::reduce_with_max_bits`].
#[derive(Clone, Debug)]
pub struct GoldilocksChip<F: BigPrimeField> {
    gate: GateChip<F>,
    range: RangeChecker<F>,
}

impl<F: BigPrimeField> GoldilocksChip<F> {
    pub fn new(gate: GateChip<F>, range: RangeChecker<F>) -> Self {
        Self { gate, range }
    }

    pub fn gate(&self) -> &GateChip<F> {
        &self.gate
    }

    pub fn range(&self) -> &RangeChecker<F> {
        &self.range
    }

    fn modulus() -> QuantumCell<F> {
        Constant(F::from(GOLDILOCKS_MODULUS))
    }

    pub fn load_witness(&self, ctx: &mut Context<F>, x: Goldilocks) -> AssignedValue<F> {
        ctx.load_witness(fe_from_goldilocks(x))
    }

    /// Loads and range checks a witness.
    pub fn load_canonical(&self, ctx: &mut Context<F>, x: Goldilocks) -> AssignedValue<F> {
        let a = self.load_witness(ctx, x);
        self.range_check(ctx, a);
        a
    }

    pub fn load_constant(&self, ctx: &mut Context<F>, c: Goldilocks) -> AssignedValue<F> {
        ctx.load_constant(fe_from_goldilocks(c))
    }

    pub fn load_zero(&self, ctx: &mut Context<F>) -> AssignedValue<F> {
        ctx.load_zero()
    }

    pub fn load_one(&self, ctx: &mut Context<F>) -> AssignedValue<F> {
        ctx.load_constant(F::ONE)
    }

    // REDUCING ARITHMETIC
    // =========================================================================

    /// `a * b + c mod p`. Witnesses `(q, r)` with `a * b + c = q * p + r`, then checks
    /// `q < 2^64` and `r < p`. Operands must be canonical (`< p`): `q` only fits in 64 bits
    /// when `a * b + c < 2^64 * p`.
    pub fn mul_add(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumCell<F>>,
        b: impl Into<QuantumCell<F>>,
        c: impl Into<QuantumCell<F>>,
    ) -> AssignedValue<F> {
        let (a, b, c) = (a.into(), b.into(), c.into());
        let sum = fe_to_biguint(a.value()) * fe_to_biguint(b.value()) + fe_to_biguint(c.value());
        let (q, r) = div_rem_modulus(&sum);
        let q = ctx.load_witness(biguint_to_fe(&q));
        let r = ctx.load_witness(biguint_to_fe(&r));

        let lhs = self.gate.mul_add(ctx, a, b, c);
        let rhs = self.gate.mul_add(ctx, q, Self::modulus(), r);
        ctx.constrain_equal(&lhs, &rhs);

        self.range.check(ctx, q, 64);
        self.range_check(ctx, r);
        r
    }

    pub fn add(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumCell<F>>,
        b: impl Into<QuantumCell<F>>,
    ) -> AssignedValue<F> {
        self.mul_add(ctx, a, Constant(F::ONE), b)
    }

    pub fn sub(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumCell<F>>,
        b: impl Into<QuantumCell<F>>,
    ) -> AssignedValue<F> {
        self.mul_add(ctx, b, Constant(F::from(GOLDILOCKS_MODULUS - 1)), a)
    }

    pub fn mul(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumCell<F>>,
        b: impl Into<QuantumCell<F>>,
    ) -> AssignedValue<F> {
        self.mul_add(ctx, a, b, Constant(F::ZERO))
    }

    pub fn neg(&self, ctx: &mut Context<F>, a: impl Into<QuantumCell<F>>) -> AssignedValue<F> {
        self.sub(ctx, Constant(F::ZERO), a)
    }

    pub fn square(&self, ctx: &mut Context<F>, a: AssignedValue<F>) -> AssignedValue<F> {
        self.mul(ctx, a, a)
    }

    /// `a^exponent` for a constant exponent, square and multiply.
    pub fn exp_u64(&self, ctx: &mut Context<F>, a: AssignedValue<F>, exponent: u64) -> AssignedValue<F> {
        let mut product = self.load_one(ctx);
        let mut current = a;
        for i in 0..(64 - exponent.leading_zeros()) {
            if i != 0 {
                current = self.square(ctx, current);
            }
            if (exponent >> i) & 1 == 1 {
                product = self.mul(ctx, product, current);
            }
        }
        product
    }

    /// `x mod p` with the default quotient width.
    pub fn reduce(&self, ctx: &mut Context<F>, x: AssignedValue<F>) -> AssignedValue<F> {
        self.reduce_with_max_bits(ctx, x, REDUCE_QUOTIENT_BITS)
    }

    /// `x mod p` for any `x < 2^(quotient_bits + 63)`. Witnesses `x = q * p + r` and range
    /// checks `q < 2^quotient_bits`, `r < p`.
    pub fn reduce_with_max_bits(
        &self,
        ctx: &mut Context<F>,
        x: AssignedValue<F>,
        quotient_bits: usize,
    ) -> AssignedValue<F> {
        let (q, r) = div_rem_modulus(&fe_to_biguint(x.value()));
        let q = ctx.load_witness(biguint_to_fe(&q));
        let r = ctx.load_witness(biguint_to_fe(&r));

        let recomposed = self.gate.mul_add(ctx, q, Self::modulus(), r);
        ctx.constrain_equal(&recomposed, &x);

        self.range.check(ctx, q, quotient_bits);
        self.range_check(ctx, r);
        r
    }

    /// `x mod p` for `x < 2^value_bits`, with the tightest quotient check.
    pub fn reduce_bounded(
        &self,
        ctx: &mut Context<F>,
        x: AssignedValue<F>,
        value_bits: usize,
    ) -> AssignedValue<F> {
        self.reduce_with_max_bits(ctx, x, quotient_bits(value_bits))
    }

    /// `(x^-1, has_inverse)` with `has_inverse = 0` exactly when `x = 0`. The returned inverse
    /// is only meaningful when `has_inverse = 1`.
    pub fn inverse(
        &self,
        ctx: &mut Context<F>,
        x: AssignedValue<F>,
    ) -> (AssignedValue<F>, AssignedValue<F>) {
        let native = goldilocks_of(x.value()).try_inverse().unwrap_or(Goldilocks::ZERO);
        let inverse = self.load_canonical(ctx, native);

        let is_zero = self.gate.is_zero(ctx, x);
        let has_inverse = self.gate.not(ctx, is_zero);
        let product = self.mul(ctx, inverse, x);
        let checked = self.gate.select(ctx, product, Constant(F::ONE), has_inverse);
        self.gate.assert_is_const(ctx, &checked, &F::ONE);
        (inverse, has_inverse)
    }

    // NO-REDUCE ARITHMETIC
    // =========================================================================

    /// `a + b`, bounded by the sum of the operand bounds.
    pub fn add_no_reduce(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumCell<F>>,
        b: impl Into<QuantumCell<F>>,
    ) -> AssignedValue<F> {
        self.gate.add(ctx, a, b)
    }

    /// `a - b + p`. `b` must be canonical, so the result stays non-negative and below `a + p`.
    pub fn sub_no_reduce(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumCell<F>>,
        b: impl Into<QuantumCell<F>>,
    ) -> AssignedValue<F> {
        let shifted = self.gate.add(ctx, a, Self::modulus());
        self.gate.sub(ctx, shifted, b)
    }

    /// `a * b`, bounded by the product of the operand bounds.
    pub fn mul_no_reduce(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumCell<F>>,
        b: impl Into<QuantumCell<F>>,
    ) -> AssignedValue<F> {
        self.gate.mul(ctx, a, b)
    }

    /// `a * b + c`, bounded by `bound(a) * bound(b) + bound(c)`.
    pub fn mul_add_no_reduce(
        &self,
        ctx: &mut Context<F>,
        a: impl Into<QuantumCell<F>>,
        b: impl Into<QuantumCell<F>>,
        c: impl Into<QuantumCell<F>>,
    ) -> AssignedValue<F> {
        self.gate.mul_add(ctx, a, b, c)
    }

    /// `sum_i coeffs[i] * values[i]` against constant coefficients.
    pub fn inner_product_const_no_reduce(
        &self,
        ctx: &mut Context<F>,
        values: impl IntoIterator<Item = AssignedValue<F>>,
        coeffs: impl IntoIterator<Item = u64>,
    ) -> AssignedValue<F> {
        self.gate.inner_product(
            ctx,
            values,
            coeffs.into_iter().map(|c| Constant(F::from(c))),
        )
    }

    // CHECKS AND SELECTION
    // =========================================================================

    /// Constrains `x < p`. Splits `x = hi * 2^32 + lo` with 32-bit limbs; because
    /// `p = (2^32 - 1) * 2^32 + 1`, a saturated `hi` forces `lo = 0`.
    pub fn range_check(&self, ctx: &mut Context<F>, x: AssignedValue<F>) {
        let value = fe_to_biguint(x.value());
        let mask = BigUint::from(u32::MAX);
        let lo = ctx.load_witness(biguint_to_fe(&(&value & &mask)));
        let hi = ctx.load_witness(biguint_to_fe(&(value >> 32)));

        let recomposed = self.gate.mul_add(ctx, hi, Constant(F::from(1u64 << 32)), lo);
        ctx.constrain_equal(&recomposed, &x);
        self.range.check(ctx, hi, 32);
        self.range.check(ctx, lo, 32);

        let saturated = self.gate.is_equal(ctx, hi, Constant(F::from(u32::MAX as u64)));
        let masked = self.gate.mul(ctx, saturated, lo);
        self.gate.assert_is_const(ctx, &masked, &F::ZERO);
    }

    /// Constrains `x < 2^bits`.
    pub fn range_check_with_max_bits(&self, ctx: &mut Context<F>, x: AssignedValue<F>, bits: usize) {
        self.range.check(ctx, x, bits);
    }

    /// Flushes deferred range checks. Must be the last call on the chip.
    pub fn finalize(&self, ctx: &mut Context<F>) {
        self.range.finalize(ctx);
    }

    pub fn assert_equal(&self, ctx: &mut Context<F>, a: &AssignedValue<F>, b: &AssignedValue<F>) {
        ctx.constrain_equal(a, b);
    }

    /// `x` when `bit = 0`, `y` when `bit = 1`.
    pub fn lookup(
        &self,
        ctx: &mut Context<F>,
        bit: AssignedValue<F>,
        x: AssignedValue<F>,
        y: AssignedValue<F>,
    ) -> AssignedValue<F> {
        self.gate.select(ctx, y, x, bit)
    }

    /// Little-endian bits of a canonical `x`, `n_bits <= 64`.
    pub fn to_bits(&self, ctx: &mut Context<F>, x: AssignedValue<F>, n_bits: usize) -> Vec<AssignedValue<F>> {
        let mut bits = self.gate.num_to_bits(ctx, x, 64);
        bits.truncate(n_bits);
        bits
    }

    /// Recomposes little-endian bits into a single cell.
    pub fn from_bits(&self, ctx: &mut Context<F>, bits: &[AssignedValue<F>]) -> AssignedValue<F> {
        self.gate.inner_product(
            ctx,
            bits.iter().copied(),
            (0..bits.len()).map(|i| Constant(F::from(1u64 << i))),
        )
    }
}

fn div_rem_modulus(x: &BigUint) -> (BigUint, BigUint) {
    let p = BigUint::from(GOLDILOCKS_MODULUS);
    (x / &p, x % &p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{init, mock_run, random_goldilocks, MockChips};
    use halo2_base::halo2_proofs::halo2curves::bn256::Fr;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_mul_add_matches_native() {
        init();
        let mut rng = StdRng::seed_from_u64(7);
        let triples = (0..16)
            .map(|_| {
                (
                    random_goldilocks(&mut rng),
                    random_goldilocks(&mut rng),
                    random_goldilocks(&mut rng),
                )
            })
            .chain([(
                Goldilocks::NEG_ONE,
                Goldilocks::NEG_ONE,
                Goldilocks::NEG_ONE,
            )])
            .collect::<Vec<_>>();
        assert!(mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let gl = &chips.goldilocks;
            for (a, b, c) in &triples {
                let [x, y, z] = [a, b, c].map(|v| gl.load_canonical(ctx, *v));
                let r = gl.mul_add(ctx, x, y, z);
                let expected = *a * *b + *c;
                assert_eq!(goldilocks_of(r.value()), expected);
                assert!(fe_to_biguint(r.value()) < BigUint::from(GOLDILOCKS_MODULUS));

                let s = gl.sub(ctx, x, y);
                assert_eq!(goldilocks_of(s.value()), *a - *b);
                let t = gl.add(ctx, x, y);
                assert_eq!(goldilocks_of(t.value()), *a + *b);
            }
        }));
    }

    fn range_check_accepts(value: u64) -> bool {
        mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let x = ctx.load_witness(Fr::from(value));
            chips.goldilocks.range_check(ctx, x);
        })
    }

    #[test]
    fn test_range_check_boundary() {
        init();
        assert!(range_check_accepts(0));
        assert!(range_check_accepts(1));
        assert!(range_check_accepts(GOLDILOCKS_MODULUS - 1));
        assert!(range_check_accepts(u32::MAX as u64 * (1 << 32) - 1));
        assert!(!range_check_accepts(GOLDILOCKS_MODULUS));
        assert!(!range_check_accepts(GOLDILOCKS_MODULUS + 1));
        assert!(!range_check_accepts(u64::MAX));
    }

    #[test]
    fn test_reduce_and_inverse() {
        init();
        assert!(mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let gl = &chips.goldilocks;
            let a = gl.load_canonical(ctx, Goldilocks::from_canonical_u64(GOLDILOCKS_MODULUS - 2));
            let wide = gl.mul_no_reduce(ctx, a, a);
            let wide = gl.add_no_reduce(ctx, wide, a);
            let reduced = gl.reduce_bounded(ctx, wide, 129);
            assert_eq!(goldilocks_of(reduced.value()), Goldilocks::from_canonical_u64(2));

            let (inv, has_inv) = gl.inverse(ctx, a);
            assert_eq!(*has_inv.value(), Fr::one());
            let one = gl.mul(ctx, inv, a);
            gl.gate().assert_is_const(ctx, &one, &Fr::one());

            let zero = gl.load_zero(ctx);
            let (_, has_inv) = gl.inverse(ctx, zero);
            gl.gate().assert_is_const(ctx, &has_inv, &Fr::zero());

            let e = gl.exp_u64(ctx, a, 5);
            let native = Goldilocks::from_canonical_u64(GOLDILOCKS_MODULUS - 2).exp_u64(5);
            assert_eq!(goldilocks_of(e.value()), native);
        }));
    }

    #[test]
    fn test_forged_remainder_rejected() {
        init();
        // p + 3 is congruent to a valid remainder but saturates the high limb
        assert!(!mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let r = ctx.load_witness(Fr::from(GOLDILOCKS_MODULUS) + Fr::from(3));
            chips.goldilocks.range_check(ctx, r);
        }));
    }
}

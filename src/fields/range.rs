use std::sync::{Arc, Mutex};

use halo2_base::{
    gates::{GateChip, GateInstructions, RangeChip, RangeInstructions},
    utils::{biguint_to_fe, fe_to_biguint, BigPrimeField},
    AssignedValue, Context,
    QuantumCell::Constant,
};
use log::{debug, warn};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VerifierError};

// RANGE CHECK STRATEGY
// =========================================================================

/// Bit-width checks used by the inner field chip. Which implementation is used depends on
/// what the outer constraint system offers, never on the proof being verified.
pub trait RangeCheckStrategy<F: BigPrimeField> {
    /// Constrains `a < 2^bits`.
    fn check(&self, ctx: &mut Context<F>, a: AssignedValue<F>, bits: usize);

    /// Emits any checks that were postponed. Strategies that check eagerly do nothing.
    fn finalize(&self, _ctx: &mut Context<F>) {}
}

/// Backend selection, see [`RangeChecker::new`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeCheckBackend {
    /// One lookup argument per check, via the halo2-base range chip.
    #[default]
    Lookup,
    /// Checks are collected and flushed in one batch with a chosen limb width.
    Deferred,
    /// Boolean decomposition; needs no lookup table.
    BitDecomposition,
}

impl RangeCheckBackend {
    /// The cheapest backend the outer circuit supports.
    pub fn for_lookup_bits(lookup_bits: Option<usize>) -> Self {
        match lookup_bits {
            Some(bits) if bits > 0 => Self::Lookup,
            _ => Self::BitDecomposition,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LookupRangeCheck<F: BigPrimeField> {
    range: RangeChip<F>,
}

impl<F: BigPrimeField> LookupRangeCheck<F> {
    pub fn new(range: RangeChip<F>) -> Self {
        Self { range }
    }
}

impl<F: BigPrimeField> RangeCheckStrategy<F> for LookupRangeCheck<F> {
    fn check(&self, ctx: &mut Context<F>, a: AssignedValue<F>, bits: usize) {
        if bits == 0 {
            self.range.gate().assert_is_const(ctx, &a, &F::ZERO);
        } else {
            self.range.range_check(ctx, a, bits);
        }
    }
}

#[derive(Clone, Debug)]
pub struct BitDecompositionRangeCheck<F: BigPrimeField> {
    gate: GateChip<F>,
}

impl<F: BigPrimeField> BitDecompositionRangeCheck<F> {
    pub fn new(gate: GateChip<F>) -> Self {
        Self { gate }
    }
}

impl<F: BigPrimeField> RangeCheckStrategy<F> for BitDecompositionRangeCheck<F> {
    fn check(&self, ctx: &mut Context<F>, a: AssignedValue<F>, bits: usize) {
        if bits == 0 {
            self.gate.assert_is_const(ctx, &a, &F::ZERO);
        } else {
            self.gate.num_to_bits(ctx, a, bits);
        }
    }
}

#[derive(Debug)]
enum Collection<F: BigPrimeField> {
    Open(Vec<(AssignedValue<F>, usize)>),
    Flushed { limb_bits: usize },
}

/// Committed-batch range checking: an open collection phase tied to the chip's lifetime,
/// closed by exactly one [`RangeCheckStrategy::finalize`] call. Clones share the buffer.
#[derive(Clone, Debug)]
pub struct DeferredRangeCheck<F: BigPrimeField> {
    range: RangeChip<F>,
    collected: Arc<Mutex<Collection<F>>>,
}

impl<F: BigPrimeField> DeferredRangeCheck<F> {
    pub fn new(range: RangeChip<F>) -> Self {
        Self {
            range,
            collected: Arc::new(Mutex::new(Collection::Open(vec![]))),
        }
    }

    pub fn num_pending(&self) -> usize {
        match &*self.collected.lock().unwrap_or_else(|e| e.into_inner()) {
            Collection::Open(pending) => pending.len(),
            Collection::Flushed { .. } => 0,
        }
    }

    fn check_with_limbs(
        &self,
        ctx: &mut Context<F>,
        a: AssignedValue<F>,
        bits: usize,
        limb_bits: usize,
    ) {
        if bits == 0 {
            self.range.gate().assert_is_const(ctx, &a, &F::ZERO);
            return;
        }
        if bits <= limb_bits {
            self.range.range_check(ctx, a, bits);
            return;
        }
        let gate = self.range.gate();
        let num_limbs = (bits + limb_bits - 1) / limb_bits;
        let mask = (BigUint::from(1u64) << limb_bits) - 1u64;
        let mut value = fe_to_biguint(a.value());
        let limbs = (0..num_limbs)
            .map(|_| {
                let limb = &value & &mask;
                value >>= limb_bits;
                ctx.load_witness(biguint_to_fe::<F>(&limb))
            })
            .collect::<Vec<_>>();
        let powers = (0..num_limbs)
            .map(|i| Constant(biguint_to_fe::<F>(&(BigUint::from(1u64) << (i * limb_bits)))))
            .collect::<Vec<_>>();
        let recomposed = gate.inner_product(ctx, limbs.clone(), powers);
        ctx.constrain_equal(&recomposed, &a);
        for (i, limb) in limbs.into_iter().enumerate() {
            let width = if i + 1 == num_limbs {
                bits - limb_bits * (num_limbs - 1)
            } else {
                limb_bits
            };
            self.range.range_check(ctx, limb, width);
        }
    }
}

impl<F: BigPrimeField> RangeCheckStrategy<F> for DeferredRangeCheck<F> {
    fn check(&self, ctx: &mut Context<F>, a: AssignedValue<F>, bits: usize) {
        let mut guard = self.collected.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *guard {
            Collection::Open(pending) => pending.push((a, bits)),
            Collection::Flushed { limb_bits } => {
                let limb_bits = *limb_bits;
                drop(guard);
                warn!("range check requested after finalize, checking eagerly");
                self.check_with_limbs(ctx, a, bits, limb_bits);
            }
        }
    }

    fn finalize(&self, ctx: &mut Context<F>) {
        let pending = {
            let mut guard = self.collected.lock().unwrap_or_else(|e| e.into_inner());
            let Collection::Open(pending) = &mut *guard else {
                return;
            };
            let pending = std::mem::take(pending);
            let limb_bits = optimal_limb_width(
                pending.iter().map(|(_, bits)| *bits),
                self.range.lookup_bits(),
            );
            *guard = Collection::Flushed { limb_bits };
            (pending, limb_bits)
        };
        let (pending, limb_bits) = pending;
        debug!(
            "flushing {} deferred range checks with {}-bit limbs",
            pending.len(),
            limb_bits
        );
        for (a, bits) in pending {
            self.check_with_limbs(ctx, a, bits, limb_bits);
        }
    }
}

/// Limb width minimising the number of lookups over a batch of checks. A limb narrower
/// than the lookup table costs an extra shifted lookup, so widths dividing the common
/// check sizes win. Ties go to the wider limb.
pub fn optimal_limb_width(bits: impl Iterator<Item = usize> + Clone, max_width: usize) -> usize {
    let cost = |width: usize| -> usize {
        bits.clone()
            .map(|b| {
                let full = b / width;
                let partial = b % width;
                match (partial, width < max_width) {
                    (0, false) => full,
                    (0, true) => 2 * full,
                    (_, false) => full + 2,
                    (_, true) => 2 * full + 2,
                }
            })
            .sum()
    };
    (1..=max_width.max(1))
        .rev()
        .min_by_key(|&width| cost(width))
        .unwrap_or(max_width)
}

// RANGE CHECKER
// =========================================================================

#[derive(Clone, Debug)]
pub enum RangeChecker<F: BigPrimeField> {
    Lookup(LookupRangeCheck<F>),
    Deferred(DeferredRangeCheck<F>),
    BitDecomposition(BitDecompositionRangeCheck<F>),
}

impl<F: BigPrimeField> RangeChecker<F> {
    /// `range` is required by the lookup based backends.
    pub fn new(
        backend: RangeCheckBackend,
        gate: &GateChip<F>,
        range: Option<&RangeChip<F>>,
    ) -> Result<Self> {
        let require_range = || {
            range.cloned().ok_or_else(|| {
                VerifierError::InvalidParameter(format!(
                    "{backend:?} range checks need a lookup table"
                ))
            })
        };
        Ok(match backend {
            RangeCheckBackend::Lookup => Self::Lookup(LookupRangeCheck::new(require_range()?)),
            RangeCheckBackend::Deferred => Self::Deferred(DeferredRangeCheck::new(require_range()?)),
            RangeCheckBackend::BitDecomposition => {
                Self::BitDecomposition(BitDecompositionRangeCheck::new(gate.clone()))
            }
        })
    }

    pub fn backend(&self) -> RangeCheckBackend {
        match self {
            Self::Lookup(_) => RangeCheckBackend::Lookup,
            Self::Deferred(_) => RangeCheckBackend::Deferred,
            Self::BitDecomposition(_) => RangeCheckBackend::BitDecomposition,
        }
    }
}

impl<F: BigPrimeField> RangeCheckStrategy<F> for RangeChecker<F> {
    fn check(&self, ctx: &mut Context<F>, a: AssignedValue<F>, bits: usize) {
        match self {
            Self::Lookup(s) => s.check(ctx, a, bits),
            Self::Deferred(s) => s.check(ctx, a, bits),
            Self::BitDecomposition(s) => s.check(ctx, a, bits),
        }
    }

    fn finalize(&self, ctx: &mut Context<F>) {
        match self {
            Self::Lookup(s) => s.finalize(ctx),
            Self::Deferred(s) => s.finalize(ctx),
            Self::BitDecomposition(s) => s.finalize(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{init, mock_run, MockChips};
    use halo2_base::halo2_proofs::halo2curves::bn256::Fr;

    #[test]
    fn test_optimal_limb_width() {
        let bits = vec![32, 32, 64, 64, 144];
        assert_eq!(optimal_limb_width(bits.iter().copied(), 16), 16);
        assert_eq!(optimal_limb_width(bits.iter().copied(), 17), 17);
        assert_eq!(optimal_limb_width(std::iter::empty(), 12), 12);
    }

    fn check_all(backend: RangeCheckBackend, value: u64, bits: usize) -> bool {
        mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let checker = RangeChecker::new(backend, chips.range.gate(), Some(&chips.range))
                .expect("backend");
            let a = ctx.load_witness(Fr::from(value));
            checker.check(ctx, a, bits);
            checker.finalize(ctx);
        })
    }

    #[test]
    fn test_backends_agree() {
        init();
        for backend in [
            RangeCheckBackend::Lookup,
            RangeCheckBackend::Deferred,
            RangeCheckBackend::BitDecomposition,
        ] {
            assert!(check_all(backend, u32::MAX as u64, 32), "{backend:?}");
            assert!(!check_all(backend, 1 << 32, 32), "{backend:?}");
            assert!(check_all(backend, u64::MAX, 64), "{backend:?}");
        }
    }

    #[test]
    fn test_deferred_flushes_once() {
        init();
        assert!(mock_run(18, 17, |ctx, chips: &MockChips<Fr>| {
            let deferred = DeferredRangeCheck::new(chips.range.clone());
            let shared = deferred.clone();
            let a = ctx.load_witness(Fr::from(5));
            deferred.check(ctx, a, 3);
            shared.check(ctx, a, 8);
            assert_eq!(deferred.num_pending(), 2);
            deferred.finalize(ctx);
            assert_eq!(shared.num_pending(), 0);
            shared.finalize(ctx);
        }));
    }

    #[test]
    fn test_capability_selection() {
        assert_eq!(
            RangeCheckBackend::for_lookup_bits(Some(16)),
            RangeCheckBackend::Lookup
        );
        assert_eq!(
            RangeCheckBackend::for_lookup_bits(None),
            RangeCheckBackend::BitDecomposition
        );
    }
}

use halo2_base::{
    utils::{fe_to_biguint, ScalarField},
    AssignedValue,
    QuantumCell::{self, Constant, Existing},
};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use plonky2::field::{
    extension::{quadratic::QuadraticExtension, FieldExtension},
    goldilocks_field::GoldilocksField,
    ops::Square,
    types::{Field, PrimeField64},
};

use crate::D;

pub mod algebra;
pub mod extension;
pub mod goldilocks;
pub mod range;

pub use algebra::AssignedExtensionAlgebra;
pub use extension::ExtensionFieldChip;
pub use goldilocks::GoldilocksChip;
pub use range::{RangeCheckBackend, RangeCheckStrategy, RangeChecker};

pub type Goldilocks = GoldilocksField;
pub type GoldilocksExt = QuadraticExtension<GoldilocksField>;

// GOLDILOCKS CONSTANTS
// =========================================================================

/// `p = 2^64 - 2^32 + 1`
pub const GOLDILOCKS_MODULUS: u64 = 0xFFFF_FFFF_0000_0001;

pub const MULTIPLICATIVE_GROUP_GENERATOR: u64 = 7;

pub const TWO_ADICITY: usize = 32;

/// Generator of the order `2^32` subgroup.
pub const POWER_OF_TWO_GENERATOR: u64 = 1753635133440165772;

/// Quadratic non-residue defining `X^2 = W`.
pub const W: u64 = 7;

/// `W^((p - 1) / 2)`, the image of `X` under Frobenius divided by `X`.
pub const DTH_ROOT: u64 = GOLDILOCKS_MODULUS - 1;

/// Generator of the order `2^n_log` subgroup, obtained by squaring the two-adic generator.
pub fn primitive_root_of_unity(n_log: usize) -> Goldilocks {
    assert!(n_log <= TWO_ADICITY);
    let mut root = Goldilocks::from_canonical_u64(POWER_OF_TWO_GENERATOR);
    for _ in n_log..TWO_ADICITY {
        root = root.square();
    }
    root
}

/// Interprets an outer field value as an inner field element, reducing it modulo `p`.
pub fn goldilocks_of<F: ScalarField>(x: &F) -> Goldilocks {
    let reduced = fe_to_biguint(x) % BigUint::from(GOLDILOCKS_MODULUS);
    Goldilocks::from_canonical_u64(reduced.to_u64().unwrap_or_default())
}

pub fn fe_from_goldilocks<F: ScalarField>(x: Goldilocks) -> F {
    F::from(x.to_canonical_u64())
}

// ASSIGNED EXTENSION VALUES
// =========================================================================

/// Inner field elements live in a single outer field cell, see [`GoldilocksChip`].
pub type AssignedGoldilocks<F> = AssignedValue<F>;

/// `coeffs[0] + coeffs[1] * X` in `GF(p)[X] / (X^2 - W)`.
#[derive(Clone, Copy, Debug)]
pub struct AssignedExtensionValue<F: ScalarField> {
    pub coeffs: [AssignedValue<F>; D],
}

impl<F: ScalarField> AssignedExtensionValue<F> {
    pub fn construct(coeffs: [AssignedValue<F>; D]) -> Self {
        Self { coeffs }
    }

    pub fn coeffs(&self) -> [AssignedValue<F>; D] {
        self.coeffs
    }

    /// Native value of the assignment, each coefficient taken modulo `p`.
    pub fn value(&self) -> GoldilocksExt {
        GoldilocksExt::from_basefield_array([
            goldilocks_of(self.coeffs[0].value()),
            goldilocks_of(self.coeffs[1].value()),
        ])
    }
}

/// Operand of the extension field chip: either an assigned value or a circuit constant.
#[derive(Clone, Copy, Debug)]
pub enum QuantumExtensionCell<F: ScalarField> {
    Existing(AssignedExtensionValue<F>),
    /// A base field cell embedded as `a + 0 * X`.
    Base(AssignedValue<F>),
    Constant(GoldilocksExt),
}

impl<F: ScalarField> QuantumExtensionCell<F> {
    pub fn coeffs(&self) -> [QuantumCell<F>; D] {
        match self {
            Self::Existing(a) => [Existing(a.coeffs[0]), Existing(a.coeffs[1])],
            Self::Base(a) => [Existing(*a), Constant(F::ZERO)],
            Self::Constant(c) => {
                let [c0, c1] = c.to_basefield_array();
                [
                    Constant(fe_from_goldilocks(c0)),
                    Constant(fe_from_goldilocks(c1)),
                ]
            }
        }
    }

    pub fn value(&self) -> GoldilocksExt {
        match self {
            Self::Existing(a) => a.value(),
            Self::Base(a) => <GoldilocksExt as FieldExtension<D>>::from_basefield(goldilocks_of(a.value())),
            Self::Constant(c) => *c,
        }
    }
}

impl<F: ScalarField> From<AssignedExtensionValue<F>> for QuantumExtensionCell<F> {
    fn from(a: AssignedExtensionValue<F>) -> Self {
        Self::Existing(a)
    }
}

impl<F: ScalarField> From<&AssignedExtensionValue<F>> for QuantumExtensionCell<F> {
    fn from(a: &AssignedExtensionValue<F>) -> Self {
        Self::Existing(*a)
    }
}

impl<F: ScalarField> From<GoldilocksExt> for QuantumExtensionCell<F> {
    fn from(c: GoldilocksExt) -> Self {
        Self::Constant(c)
    }
}

impl<F: ScalarField> From<Goldilocks> for QuantumExtensionCell<F> {
    fn from(c: Goldilocks) -> Self {
        Self::Constant(<GoldilocksExt as FieldExtension<D>>::from_basefield(c))
    }
}

use std::fmt;

use halo2_base::{utils::BigPrimeField, Context};

use super::{id::GateId, CustomGate, EvaluationVars};
use crate::error::Result;
use crate::fields::{AssignedExtensionValue, ExtensionFieldChip, QuantumExtensionCell};

/// Copies `num_consts` constants into the first wires of the row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstantGate {
    pub num_consts: usize,
}

impl ConstantGate {
    pub(crate) fn parse(id: &GateId) -> Result<Self> {
        Ok(Self {
            num_consts: id.parse_field("num_consts")?,
        })
    }
}

impl fmt::Display for ConstantGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConstantGate {{ num_consts: {} }}", self.num_consts)
    }
}

impl CustomGate for ConstantGate {
    fn num_wires(&self) -> usize {
        self.num_consts
    }

    fn num_constants(&self) -> usize {
        self.num_consts
    }

    fn num_constraints(&self) -> usize {
        self.num_consts
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        (0..self.num_consts)
            .map(|i| chip.sub(ctx, vars.local_constants[i], vars.local_wires[i]))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoopGate;

impl fmt::Display for NoopGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoopGate")
    }
}

impl CustomGate for NoopGate {
    fn num_wires(&self) -> usize {
        0
    }

    fn num_constants(&self) -> usize {
        0
    }

    fn num_constraints(&self) -> usize {
        0
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        _ctx: &mut Context<F>,
        _chip: &ExtensionFieldChip<F>,
        _vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        vec![]
    }
}

/// Exposes the four limbs of the public inputs hash on wires `0..4`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublicInputGate;

impl PublicInputGate {
    pub fn wires_public_inputs_hash() -> std::ops::Range<usize> {
        0..4
    }
}

impl fmt::Display for PublicInputGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicInputGate")
    }
}

impl CustomGate for PublicInputGate {
    fn num_wires(&self) -> usize {
        4
    }

    fn num_constants(&self) -> usize {
        0
    }

    fn num_constraints(&self) -> usize {
        4
    }

    fn eval_unfiltered<F: BigPrimeField>(
        &self,
        ctx: &mut Context<F>,
        chip: &ExtensionFieldChip<F>,
        vars: &EvaluationVars<F>,
    ) -> Vec<AssignedExtensionValue<F>> {
        Self::wires_public_inputs_hash()
            .zip(vars.public_inputs_hash)
            .map(|(wire, hash_part)| {
                chip.sub(ctx, vars.local_wires[wire], QuantumExtensionCell::Base(hash_part))
            })
            .collect()
    }
}

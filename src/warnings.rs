//! Structured warning channel.
//!
//! Non-fatal conditions are collected as [`Warning`] values so that a driving
//! script can inspect them after a call, and each one is also forwarded to the
//! `log` facade at warn level.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A recoverable condition encountered while assembling data or optimising.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Warning {
    /// RDC data exists for a spin but its bond vectors do not.
    MissingBondVector { spin: String },
    /// A pseudo-atom with an unsupported number of members.
    UnsupportedPseudoAtom { spin: String, members: usize },
    /// The model has no optimisable parameters.
    NoParameters { operation: String },
    /// Linear constraints were switched off for a model without populations.
    ConstraintsDisabled,
    /// Linear constraints were switched on for the population model.
    ConstraintsEnabled,
    /// A previously selected model was replaced.
    ModelSwitch { from: String, to: String },
    /// A Q factor could not be calculated.
    QFactorSkipped { reason: String },
    /// NOE restraints only contribute to the reported potential.
    NoeReportingOnly,
    /// The optimiser terminated without meeting its tolerances.
    Optimiser { message: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MissingBondVector { spin } => write!(
                f,
                "RDC data exists but the bond vectors are missing, skipping spin {}",
                spin
            ),
            Warning::UnsupportedPseudoAtom { spin, members } => write!(
                f,
                "Only methyl pseudo-atoms with 3 members are supported, skipping spin {} with {} members",
                spin, members
            ),
            Warning::NoParameters { operation } => write!(
                f,
                "The model has no parameters, the {} cannot be performed",
                operation
            ),
            Warning::ConstraintsDisabled => write!(
                f,
                "Turning constraints off. These cannot be used for the 'fixed' model"
            ),
            Warning::ConstraintsEnabled => write!(
                f,
                "Turning constraints on. These absolutely must be used for the 'population' model"
            ),
            Warning::ModelSwitch { from, to } => write!(
                f,
                "The N-state model has already been set up. Switching from model '{}' to '{}'",
                from, to
            ),
            Warning::QFactorSkipped { reason } => write!(f, "Q factor skipped: {}", reason),
            Warning::NoeReportingOnly => write!(
                f,
                "NOE restraints are not part of the chi-squared target, only the potential is reported"
            ),
            Warning::Optimiser { message } => write!(f, "Optimisation warning: {}", message),
        }
    }
}

/// Collector for warnings raised during one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Warnings {
    entries: Vec<Warning>,
}

impl Warnings {
    /// Create an empty warning sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and forward it to the log.
    pub fn push(&mut self, warning: Warning) {
        log::warn!("{}", warning);
        self.entries.push(warning);
    }

    /// Move all warnings of another sink into this one.
    pub fn extend(&mut self, other: Warnings) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.entries.iter()
    }

    /// Consume the sink, returning the recorded warnings.
    pub fn into_vec(self) -> Vec<Warning> {
        self.entries
    }
}

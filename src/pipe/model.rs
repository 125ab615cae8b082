//! N-state model selection and configuration.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::DataPipe;
use crate::alignment::{AlignTensor, TensorComponents};
use crate::error::{NStateError, Result};
use crate::warnings::{Warning, Warnings};

/// The N-state model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelVariant {
    /// Free population weights for N states.
    Population,
    /// Populations are constants, only tensors (and the paramagnetic centre) are optimised.
    Fixed,
    /// Populations plus one set of Euler angles per state, fitted to reduced tensors.
    TwoDomain,
}

impl ModelVariant {
    /// Whether the model carries free population weights.
    pub fn has_populations(&self) -> bool {
        matches!(self, ModelVariant::Population | ModelVariant::TwoDomain)
    }

    /// Whether the model carries per-state Euler angles.
    pub fn has_angles(&self) -> bool {
        matches!(self, ModelVariant::TwoDomain)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::Population => "population",
            ModelVariant::Fixed => "fixed",
            ModelVariant::TwoDomain => "2-domain",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = NStateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "population" => Ok(ModelVariant::Population),
            "fixed" => Ok(ModelVariant::Fixed),
            "2-domain" => Ok(ModelVariant::TwoDomain),
            _ => Err(NStateError::InvalidInput(format!(
                "The model name '{}' is invalid",
                s
            ))),
        }
    }
}

/// The optimisable quantities of the model.
///
/// The primary fit and every Monte Carlo slot hold one of these, so packing
/// and unpacking the parameter vector only ever deals with this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    /// Population weights of all N states (`None` when unset).
    pub probs: Vec<Option<f64>>,
    pub alpha: Vec<Option<f64>>,
    pub beta: Vec<Option<f64>>,
    pub gamma: Vec<Option<f64>>,
    /// Tensor components, parallel to the data pipe's tensor list.
    pub tensors: Vec<TensorComponents>,
    /// Paramagnetic centre in Angstrom.
    pub paramagnetic_centre: Option<Vector3<f64>>,
}

impl ModelState {
    /// Population weights with unset entries read as zero.
    pub fn probs_or_zero(&self) -> Vec<f64> {
        self.probs.iter().map(|p| p.unwrap_or(0.0)).collect()
    }
}

fn resize_optional(values: &mut Vec<Option<f64>>, n: usize) {
    values.resize(n, None);
}

impl DataPipe {
    /// Select the N-state model, replacing any previous selection with a warning.
    pub fn select_model(&mut self, model: &str, warnings: &mut Warnings) -> Result<()> {
        let model: ModelVariant = model.parse()?;

        if let Some(previous) = self.model {
            warnings.push(Warning::ModelSwitch {
                from: previous.to_string(),
                to: model.to_string(),
            });
        }

        self.model = Some(model);
        self.params.clear();
        self.update_model()
    }

    /// Set the number of states.
    pub fn number_of_states(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(NStateError::InvalidInput(
                "The number of states must be at least 1".to_string(),
            ));
        }

        self.n_states = Some(n);
        if self.model.is_some() {
            self.update_model()?;
        }
        Ok(())
    }

    /// Set the reference domain of the 2-domain model.
    pub fn set_ref_domain(&mut self, domain: &str) -> Result<()> {
        let model = self.model()?;
        if model != ModelVariant::TwoDomain {
            return Err(NStateError::Config(
                "Setting the reference domain is only possible for the '2-domain' N-state model"
                    .to_string(),
            ));
        }

        if !self
            .align_tensors
            .iter()
            .any(|t| t.domain.as_deref() == Some(domain))
        {
            return Err(NStateError::Config(
                "The reference domain cannot be found within any of the loaded tensors".to_string(),
            ));
        }

        self.ref_domain = Some(domain.to_string());
        self.update_model()
    }

    /// Label the domain a tensor belongs to.
    pub fn set_domain(&mut self, tensor: &str, domain: &str) -> Result<()> {
        let index = self.require_tensor(tensor)?;
        self.align_tensors[index].domain = Some(domain.to_string());
        Ok(())
    }

    /// Flag a tensor as reduced (`true`) or full (`false`).
    pub fn set_type(&mut self, tensor: &str, reduced: bool) -> Result<()> {
        let index = self.require_tensor(tensor)?;
        self.align_tensors[index].reduced = reduced;
        Ok(())
    }

    /// Declare that the `reduced` tensor is a linear reduction of the `full` one.
    pub fn set_reduction(&mut self, full: &str, reduced: &str) -> Result<()> {
        let full_index = self.require_tensor(full)?;
        let red_index = self.require_tensor(reduced)?;
        self.align_tensors[full_index].reduced = false;
        self.align_tensors[red_index].reduced = true;
        self.reductions.retain(|(_, r)| *r != red_index);
        self.reductions.push((full_index, red_index));
        Ok(())
    }

    /// Fix or release a single tensor.
    pub fn set_fixed(&mut self, tensor: &str, fixed: bool) -> Result<()> {
        let index = self.require_tensor(tensor)?;
        self.align_tensors[index].fixed = fixed;
        Ok(())
    }

    /// Fix or release all tensors.
    pub fn fix_all_tensors(&mut self, fixed: bool) {
        for tensor in &mut self.align_tensors {
            tensor.fixed = fixed;
        }
    }

    /// Set the paramagnetic centre (Angstrom) and whether it stays fixed during optimisation.
    pub fn set_paramagnetic_centre(&mut self, pos: Option<Vector3<f64>>, fixed: bool) {
        if pos.is_some() {
            self.state.paramagnetic_centre = pos;
        }
        self.paramag_centre_fixed = fixed;
    }

    /// Set the sample temperature (K) of an alignment.
    pub fn set_temperature(&mut self, align_id: &str, temp: f64) {
        self.temperature.insert(align_id.to_string(), temp);
    }

    /// Set the proton spectrometer frequency (Hz) of an alignment.
    pub fn set_frequency(&mut self, align_id: &str, frq: f64) {
        self.frequency.insert(align_id.to_string(), frq);
    }

    /// Bring the parameter names, state arrays and tensors in line with the model.
    ///
    /// When the number of states has not been set it is taken from the number
    /// of loaded structural models; without those nothing else can be updated.
    pub fn update_model(&mut self) -> Result<()> {
        let model = self.model()?;

        if self.n_states.is_none() {
            if self.structure_models == 0 {
                return Ok(());
            }
            self.n_states = Some(self.structure_models);
        }
        let n = self.n_states()?;

        self.params.clear();
        if model.has_populations() {
            self.params.extend((0..n - 1).map(|i| format!("p{}", i)));
        }
        if model.has_angles() {
            for c in 0..n {
                self.params.push(format!("alpha{}", c));
                self.params.push(format!("beta{}", c));
                self.params.push(format!("gamma{}", c));
            }
        }

        if model.has_populations() {
            resize_optional(&mut self.state.probs, n);
        }
        if model.has_angles() {
            resize_optional(&mut self.state.alpha, n);
            resize_optional(&mut self.state.beta, n);
            resize_optional(&mut self.state.gamma, n);
        }

        let missing: Vec<String> = self
            .align_ids
            .iter()
            .filter(|id| !self.align_tensors.iter().any(|t| &t.id == *id))
            .cloned()
            .collect();
        for id in missing {
            self.push_tensor(AlignTensor::new(id), TensorComponents::default());
        }

        Ok(())
    }

    /// The default value of a model parameter such as `p0` or `beta2`.
    pub fn default_value(&self, param: &str) -> Result<f64> {
        let n = self.n_states()? as f64;

        let split = param
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(param.len());
        let (name, index) = param.split_at(split);
        let index: usize = index.parse().map_err(|_| {
            NStateError::InvalidInput(format!("The parameter '{}' has no state index", param))
        })?;

        match name {
            "p" => Ok(1.0 / n),
            "alpha" | "beta" | "gamma" => Ok((index as f64 + 1.0) * PI / (n + 1.0)),
            _ => Err(NStateError::InvalidInput(format!(
                "The parameter '{}' is unknown",
                param
            ))),
        }
    }

    /// Fill every unset population and Euler angle with its default value.
    pub fn set_default_values(&mut self) -> Result<()> {
        let n = self.n_states()?;
        let angle = |c: usize| (c as f64 + 1.0) * PI / (n as f64 + 1.0);

        for p in self.state.probs.iter_mut() {
            p.get_or_insert(1.0 / n as f64);
        }
        for values in [
            &mut self.state.alpha,
            &mut self.state.beta,
            &mut self.state.gamma,
        ] {
            for (c, v) in values.iter_mut().enumerate() {
                v.get_or_insert(angle(c));
            }
        }
        Ok(())
    }

    fn require_tensor(&self, id: &str) -> Result<usize> {
        self.tensor_index(id).ok_or_else(|| {
            NStateError::Config(format!("The alignment tensor '{}' does not exist", id))
        })
    }
}

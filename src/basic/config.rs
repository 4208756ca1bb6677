use serde::{Deserialize, Serialize};

use super::{
    error::{LoadFlowError, Result},
    helm::{HelmConfig, HelmWithCurrentIteration, HolomorphicEmbeddedLoadFlowMethod, SeriesHelm},
    methods::{
        CurrentIterationMethod, FastDecoupledMethod, NewtonRaphsonMethod, NodePotentialMethod,
        NodeVoltageCalculator,
    },
};

/// Serializable choice of a node voltage calculator, e.g.
/// `{"method": "newton_raphson", "maximum_iterations": 20}`. Missing options take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum MethodConfig {
    NodePotential,
    CurrentIteration(CurrentIterationMethod),
    NewtonRaphson(NewtonRaphsonMethod),
    FastDecoupled(FastDecoupledMethod),
    /// HELM on the built-in double precision back end.
    Helm(HelmConfig),
    HelmWithCurrentIteration {
        #[serde(default)]
        helm: HelmConfig,
        #[serde(default)]
        iteration: CurrentIterationMethod,
    },
}

impl Default for MethodConfig {
    fn default() -> Self {
        MethodConfig::CurrentIteration(CurrentIterationMethod::default())
    }
}

impl MethodConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LoadFlowError::config(e.to_string()))
    }

    /// Validates the options and builds the calculator.
    pub fn build(&self) -> Result<Box<dyn NodeVoltageCalculator>> {
        Ok(match self {
            MethodConfig::NodePotential => Box::new(NodePotentialMethod),
            MethodConfig::CurrentIteration(method) => {
                method.validate()?;
                Box::new(*method)
            }
            MethodConfig::NewtonRaphson(method) => {
                method.validate()?;
                Box::new(*method)
            }
            MethodConfig::FastDecoupled(method) => {
                method.validate()?;
                Box::new(*method)
            }
            MethodConfig::Helm(config) => {
                Box::new(HolomorphicEmbeddedLoadFlowMethod::new(SeriesHelm::default(), *config)?)
            }
            MethodConfig::HelmWithCurrentIteration { helm, iteration } => Box::new(
                HelmWithCurrentIteration::with_iteration(SeriesHelm::default(), *helm, *iteration)?,
            ),
        })
    }
}

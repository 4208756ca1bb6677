pub(crate) mod dsbus_dv;
pub(crate) mod jacobian;
pub(crate) mod newtonpf;

pub mod config;
pub mod error;
pub mod helm;
pub mod loadflow;
pub mod methods;
pub(crate) mod post_processing;
pub mod solver;
pub(crate) mod sparse;
pub mod system;
#[cfg(test)]
pub(crate) mod testing;

pub use config::MethodConfig;
pub use error::{LoadFlowError, Result};
pub use loadflow::{LoadFlowCalculator, LoadFlowResult};
pub use newtonpf::newton_pf;

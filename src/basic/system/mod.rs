mod admittance;
mod node;

pub use admittance::*;
pub use node::*;

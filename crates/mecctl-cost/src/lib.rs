pub mod formula;
pub mod model;

pub use formula::{t_mig, t_pre_mig, CostInputs};
pub use model::{MigrationCostModel, PairCost};

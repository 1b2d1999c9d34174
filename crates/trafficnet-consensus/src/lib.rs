pub mod validator_selector;

pub use validator_selector::{selection_weights, StakeWeightedSelector};

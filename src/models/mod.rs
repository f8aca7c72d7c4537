//! Base forecasters and their trainer.
//!
//! - `Forecaster`: capability set consumed by cross-validation
//! - `DecisionTree`: weighted CART
//! - `BaggedTreeClassifier`, `BoostedTreeClassifier`: the fixed base pair
//! - `ModelTrainer`: trains and scores the pair on a fold

pub mod boosting;
pub mod forecaster;
pub mod forest;
pub mod trainer;
pub mod tree;

pub use boosting::{BoostedTreeClassifier, BoostingConfig};
pub use forecaster::{
    check_training_input, Forecaster, PredictionOutput, PredictionTable, PREDICTION_COLUMNS,
};
pub use forest::{BaggedTreeClassifier, ForestConfig};
pub use trainer::{ModelOutcome, ModelReport, ModelTrainer, TrainerConfig, TrainingReport};
pub use tree::{balanced_sample_weights, DecisionTree, TreeConfig};

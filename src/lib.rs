pub mod augmentation;
pub mod classes;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod logging;
pub mod model;
pub mod module;
pub mod pipeline;
pub mod reporting;
pub mod training;

pub use classes::ClassIndex;
pub use error::{Error, Result};
pub use pipeline::{run, Experiment, ExperimentConfig};

//! Reading training data and reading/writing model files.
pub mod model;
pub mod reader;

pub use model::{load_model, read_model, save_model, write_model, LinearModel, ModelEntry, ModelKind};
pub use reader::{read_files, read_source, ReadOptions};

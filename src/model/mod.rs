pub mod info;
pub mod scanner;

pub use info::ModelInfo;
pub use scanner::list_local_models;

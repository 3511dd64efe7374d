pub mod config;
pub mod error;
pub mod generation;
pub mod types;

pub use config::CityboardConfig;
pub use error::{CityboardError, Result};
pub use generation::{Generation, GenerationToken};
pub use types::*;

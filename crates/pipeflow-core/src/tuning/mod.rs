//! Tuning de hiperparámetros: espacio, búsqueda y selección.

pub mod search;
pub mod select;
pub mod space;

pub use search::{tune, SearchAlgorithm, SearchResult, TrialOutcome, TrialRecord};
pub use select::{select_best_params, BestParameters, BEST_PARAMETERS_FILE};
pub use space::{Distribution, SearchSpace};

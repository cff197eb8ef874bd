//! Constantes del motor de pipelines.
//!
//! `ENGINE_VERSION` forma parte del input de los fingerprints: cambiarla
//! invalida determinísticamente los fingerprints previos.

pub const ENGINE_VERSION: &str = "P1.0";

/// Subdirectorio bajo la raíz del pipeline donde viven los steps.
pub const STEPS_DIR: &str = "steps";
/// Subdirectorio de outputs de cada step.
pub const OUTPUTS_DIR: &str = "outputs";
pub const CARD_FILE: &str = "card.html";

pub const PIPELINE_FILE: &str = "pipeline.yaml";
pub const PROFILES_DIR: &str = "profiles";
pub const DEFAULT_PROFILE: &str = "local";
pub const DEFAULT_TEMPLATE: &str = "regression/v1";

pub const DEFAULT_PRIMARY_METRIC: &str = "root_mean_squared_error";
pub const DEFAULT_TUNING_ALGORITHM: &str = "hyperopt.rand.suggest";
pub const DEFAULT_TUNING_SEED: u64 = 42;
pub const DEFAULT_SPLIT_RATIOS: [f64; 3] = [0.75, 0.125, 0.125];

// Placeholders que el engine rellena en la pestaña "Run Summary".
pub const RUN_SUMMARY_TAB: &str = "Run Summary";
pub const EXE_DURATION: &str = "EXE_DURATION";
pub const LAST_UPDATE_TIME: &str = "LAST_UPDATE_TIME";

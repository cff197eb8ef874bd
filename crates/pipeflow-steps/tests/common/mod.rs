#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use pipeflow_core::{Components, PipelineConfig, PipelineEngine, StepContext};
use pipeflow_steps::standard_pipeline;
use pipeflow_tracking::TrackingStore;
use serde_json::Value;

/// `y = 3*x1 - 2*x2 + 1` con un ruido pequeño y determinista; una fila sin
/// target.
pub fn write_dataset(root: &Path, rows: usize) {
    let mut csv = String::from("x1,x2,y\n");
    for i in 0..rows {
        let x1 = (i % 17) as f64 / 4.0;
        let x2 = (i % 11) as f64 / 3.0;
        let noise = ((i * 7919) % 13) as f64 / 100.0 - 0.06;
        csv.push_str(&format!("{x1},{x2},{}\n", 3.0 * x1 - 2.0 * x2 + 1.0 + noise));
    }
    csv.push_str("1.0,1.0,\n");
    fs::write(root.join("data.csv"), csv).unwrap();
}

pub fn config(value: Value) -> PipelineConfig {
    PipelineConfig::from_value(value, "local", "regression-demo").unwrap()
}

pub fn engine(root: &Path, config: &PipelineConfig, components: &Components, store: Arc<dyn TrackingStore>) -> PipelineEngine {
    let ctx = StepContext::new(config, root, store).unwrap();
    let mut engine = PipelineEngine::new(ctx);
    for step in standard_pipeline(config, components).unwrap() {
        engine.push_step(step);
    }
    engine
}

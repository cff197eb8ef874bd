use std::fs;
use std::path::Path;
use std::sync::Arc;

use pipeflow_core::card::RUN_SUMMARY_TEMPLATE;
use pipeflow_core::constants::RUN_SUMMARY_TAB;
use pipeflow_core::{Card, PipelineConfig, PipelineEngine, PipelineError, PipelineEventKind, PipelineStep, StepContext};
use pipeflow_tracking::{InMemoryTrackingStore, TrackingStore};
use serde_json::json;

struct WriteStep {
    name: &'static str,
    content: &'static str,
}

impl PipelineStep for WriteStep {
    fn name(&self) -> &str {
        self.name
    }

    fn params(&self) -> serde_json::Value {
        json!({ "content": self.content })
    }

    fn run(&self, ctx: &StepContext, output_dir: &Path) -> Result<Card, PipelineError> {
        fs::create_dir_all(output_dir.join("nested"))?;
        fs::write(output_dir.join("data.txt"), self.content)?;
        fs::write(output_dir.join("nested").join("extra.txt"), "x")?;
        let mut card = Card::new(&ctx.pipeline_name, self.name);
        card.add_tab("Summary", "{{ BODY }}")?.add_text("BODY", self.content);
        card.add_tab(RUN_SUMMARY_TAB, RUN_SUMMARY_TEMPLATE)?;
        Ok(card)
    }
}

/// Lee un artifact del step anterior; falla si no existe.
struct ReadStep;

impl PipelineStep for ReadStep {
    fn name(&self) -> &str {
        "reader"
    }

    fn run(&self, ctx: &StepContext, output_dir: &Path) -> Result<Card, PipelineError> {
        let src = ctx.locator.resolve("writer", "data.txt")?;
        fs::copy(src, output_dir.join("copy.txt"))?;
        Ok(Card::new(&ctx.pipeline_name, "reader"))
    }
}

struct FailingStep;

impl PipelineStep for FailingStep {
    fn name(&self) -> &str {
        "broken"
    }

    fn run(&self, _ctx: &StepContext, _output_dir: &Path) -> Result<Card, PipelineError> {
        Err(PipelineError::Estimator("fit exploded".into()))
    }
}

fn context(root: &Path) -> StepContext {
    let config = PipelineConfig::from_value(json!({ "target_col": "y" }), "local", "demo").unwrap();
    let tracking: Arc<dyn TrackingStore> = Arc::new(InMemoryTrackingStore::new());
    StepContext::new(&config, root, tracking).unwrap()
}

#[test]
fn runs_steps_in_order_and_hashes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = PipelineEngine::new(context(dir.path())).add_step(WriteStep { name: "writer", content: "hello" })
                                                            .add_step(ReadStep);
    let report = engine.run().unwrap();

    assert_eq!(report.steps.len(), 2);
    let writer = &report.steps[0];
    let paths: Vec<&str> = writer.artifacts.iter().map(|a| a.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["data.txt", "nested/extra.txt"]);
    assert!(writer.card_path.exists());
    let html = fs::read_to_string(&writer.card_path).unwrap();
    assert!(html.contains("Run duration"));

    let events = engine.events(report.run_id);
    assert!(matches!(events.first().map(|e| &e.kind), Some(PipelineEventKind::PipelineStarted { step_count: 2, .. })));
    assert!(matches!(events.last().map(|e| &e.kind), Some(PipelineEventKind::PipelineCompleted { .. })));
}

#[test]
fn rerun_with_same_inputs_gives_same_fingerprints() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = PipelineEngine::new(context(dir.path())).add_step(WriteStep { name: "writer", content: "same" });
    let first = engine.run().unwrap();
    let second = engine.run().unwrap();
    assert_eq!(first.steps[0].fingerprint, second.steps[0].fingerprint);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_ne!(first.run_id, second.run_id);
}

#[test]
fn failure_stops_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = PipelineEngine::new(context(dir.path())).add_step(FailingStep)
                                                            .add_step(WriteStep { name: "writer", content: "never" });
    let err = engine.run().unwrap_err();
    assert!(matches!(err, PipelineError::Estimator(_)));

    let run_id = engine.last_run_id().unwrap();
    let events = engine.events(run_id);
    assert!(events.iter()
                  .any(|e| matches!(&e.kind, PipelineEventKind::StepFailed { step_name, retryable: false, .. } if step_name == "broken")));
    assert!(!events.iter().any(|e| matches!(&e.kind, PipelineEventKind::StepStarted { step_name, .. } if step_name == "writer")));
    assert!(!dir.path().join("steps").join("writer").exists());
}

#[test]
fn missing_upstream_aborts_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = PipelineEngine::new(context(dir.path())).add_step(ReadStep);
    let err = engine.run().unwrap_err();
    assert!(matches!(err, PipelineError::UpstreamMissing { ref step, .. } if step == "writer"));
    let outputs = dir.path().join("steps").join("reader").join("outputs");
    assert_eq!(fs::read_dir(outputs).unwrap().count(), 0);
}

#[test]
fn run_until_stops_at_target() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = PipelineEngine::new(context(dir.path())).add_step(WriteStep { name: "writer", content: "a" })
                                                            .add_step(ReadStep);
    let report = engine.run_until(Some("writer")).unwrap();
    assert_eq!(report.steps.len(), 1);
    assert!(matches!(engine.run_until(Some("nope")), Err(PipelineError::Config(_))));
}

use std::fs;
use std::path::Path;

use pipeflow::commands::{inspect_step, predict, run_pipeline, show_run, summarize};
use pipeflow::config::AppConfig;

fn write_pipeline(root: &Path) {
    let mut csv = String::from("size,rooms,price\n");
    for i in 0..90 {
        let size = 40.0 + (i % 23) as f64 * 3.0;
        let rooms = (i % 5 + 1) as f64;
        csv.push_str(&format!("{size},{rooms},{}\n", 2.5 * size + 10.0 * rooms));
    }
    fs::write(root.join("houses.csv"), csv).unwrap();
    fs::write(root.join("pipeline.yaml"),
              "target_col: price\n\
               steps:\n  split:\n    source: houses.csv\n  \
               transform:\n    transformer_method: pipeflow.transformers.standard_scaler\n  \
               train:\n    estimator_method: pipeflow.estimators.linear_regression\n").unwrap();
    fs::create_dir_all(root.join("profiles")).unwrap();
    fs::write(root.join("profiles").join("quick.yaml"), "steps:\n  transform:\n    skip_data_profiling: true\n").unwrap();
}

fn app_for(root: &Path) -> AppConfig {
    let uri = format!("file:{}", root.join("mlruns").display());
    AppConfig::from_lookup(move |k| (k == "PIPEFLOW_TRACKING_URI").then(|| uri.clone()))
}

#[test]
fn run_inspect_predict_and_show_run() {
    let dir = tempfile::tempdir().unwrap();
    write_pipeline(dir.path());
    let app = app_for(dir.path());

    let report = run_pipeline(dir.path(), None, Some("quick"), &app).unwrap();
    assert_eq!(report.steps.len(), 3);
    assert!(!report.steps[1].card.tab_names().contains(&"Data Profile (Train Transformed)"));
    assert!(summarize(&report).contains("pipeline fingerprint"));

    let (artifacts, card) = inspect_step(dir.path(), "train").unwrap();
    assert!(artifacts.iter().any(|a| a.relative_path == "model/MLmodel"));
    assert!(card.is_file());

    let input = dir.path().join("input.json");
    fs::write(&input, r#"[{"size": 60.0, "rooms": 2.0}]"#).unwrap();
    let out = predict(&dir.path().join("steps/train/outputs/model"), &input).unwrap();
    let value = out[0].as_f64().unwrap();
    assert!((value - 170.0).abs() < 1.0, "{value}");

    let run_id = fs::read_to_string(dir.path().join("steps/train/outputs/run_id")).unwrap();
    let run = show_run(&run_id, &app).unwrap();
    assert_eq!(run["info"]["status"], "FINISHED");
}

#[test]
fn running_a_single_step_leaves_later_steps_untouched() {
    let dir = tempfile::tempdir().unwrap();
    write_pipeline(dir.path());
    let report = run_pipeline(dir.path(), Some("split"), None, &app_for(dir.path())).unwrap();
    assert_eq!(report.steps.len(), 1);
    assert!(inspect_step(dir.path(), "train").is_err());
}

#[test]
fn missing_profile_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_pipeline(dir.path());
    let err = run_pipeline(dir.path(), None, Some("nope"), &app_for(dir.path())).unwrap_err();
    assert!(err.to_string().contains("nope"), "{err}");
}

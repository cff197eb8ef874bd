use std::fs;
use std::path::{Path, PathBuf};

use pipeflow_serving::{load_pyfunc, CustomModel, MlModel, ModelContext, ModelKind, ModelRegistry, ServingError};
use serde_json::{json, Map, Value};

/// Suma un offset leído de un artifact y multiplica por `scale` de la config.
struct Affine {
    offset: f64,
    scale: f64,
}

impl CustomModel for Affine {
    fn load_context(&mut self, context: &ModelContext) -> Result<(), ServingError> {
        self.scale = context.model_config.get("scale").and_then(Value::as_f64).unwrap_or(1.0);
        Ok(())
    }

    fn predict(&self, _c: &ModelContext, input: &Value, _p: Option<&Map<String, Value>>) -> Result<Value, ServingError> {
        let xs = input.as_array().ok_or_else(|| ServingError::InvalidInput("expected a list".into()))?;
        Ok(Value::Array(xs.iter().map(|x| json!((x.as_f64().unwrap_or(0.0) + self.offset) * self.scale)).collect()))
    }
}

fn registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.register("tests.affine", |_dir: &Path, _meta: &MlModel, ctx: &ModelContext| {
                let path: &PathBuf = ctx.artifacts
                                        .get("offset")
                                        .ok_or_else(|| ServingError::InvalidModel("missing offset artifact".into()))?;
                let offset: f64 = fs::read_to_string(path)?.trim()
                                                           .parse()
                                                           .map_err(|_| ServingError::InvalidModel("bad offset".into()))?;
                let model: Box<dyn CustomModel> = Box::new(Affine { offset, scale: 1.0 });
                Ok(model)
            });
    registry
}

fn saved_model(dir: &Path) {
    fs::create_dir_all(dir.join("data")).unwrap();
    fs::write(dir.join("data").join("offset.txt"), "10").unwrap();
    let mut meta = MlModel::new("tests.affine");
    meta.artifacts.insert("offset".into(), "data/offset.txt".into());
    meta.model_config.insert("scale".into(), json!(2.0));
    meta.write(dir).unwrap();
}

#[test]
fn loads_with_artifacts_and_config_override() {
    let dir = tempfile::tempdir().unwrap();
    saved_model(dir.path());

    let model = load_pyfunc(dir.path(), None, &registry()).unwrap();
    assert_eq!(model.kind(), ModelKind::Custom);
    assert_eq!(model.predict(&json!([1.0]), None).unwrap(), json!([22.0]));

    let overrides = json!({"scale": 3.0}).as_object().cloned().unwrap();
    let model = load_pyfunc(dir.path(), Some(&overrides), &registry()).unwrap();
    assert_eq!(model.predict(&json!([1.0]), None).unwrap(), json!([33.0]));
}

#[test]
fn unknown_loader_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    MlModel::new("tests.missing").write(dir.path()).unwrap();
    assert!(matches!(load_pyfunc(dir.path(), None, &registry()), Err(ServingError::UnknownLoader(name)) if name == "tests.missing"));
}

#[test]
fn missing_metadata_is_invalid_model() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(load_pyfunc(dir.path(), None, &registry()), Err(ServingError::InvalidModel(_))));
}

#[test]
fn missing_artifact_is_invalid_model() {
    let dir = tempfile::tempdir().unwrap();
    saved_model(dir.path());
    fs::remove_file(dir.path().join("data").join("offset.txt")).unwrap();
    assert!(matches!(load_pyfunc(dir.path(), None, &registry()), Err(ServingError::InvalidModel(_))));
}

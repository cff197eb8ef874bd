//! Step `transform`: ajusta el transformador sobre train (sin target) y lo
//! aplica a train y validation.

use std::fs;
use std::path::Path;

use log::{info, warn};
use pipeflow_core::card::{escape_html, render_profile, render_table, RUN_SUMMARY_TEMPLATE};
use pipeflow_core::components::TransformerFactory;
use pipeflow_core::config::TransformConfig;
use pipeflow_core::constants::RUN_SUMMARY_TAB;
use pipeflow_core::model::ColumnSchema;
use pipeflow_core::{Card, Components, Frame, PipelineConfig, PipelineError, PipelineStep, StepContext, Transformed, Transformer};
use serde_json::{json, Value};

use super::{SPLIT, TRAIN_FILE, TRANSFORM, TRANSFORMED_TRAIN_FILE, TRANSFORMED_VALIDATION_FILE, TRANSFORMER_FILE, VALIDATION_FILE};
use crate::builtins::IDENTITY;

pub struct TransformStep {
    transformer_method: String,
    factory: TransformerFactory,
    skip_data_profiling: bool,
    target_col: String,
}

impl std::fmt::Debug for TransformStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformStep").field("transformer_method", &self.transformer_method).finish()
    }
}

/// `f_0..f_{n-1}` con relleno de ceros al ancho de `n` (12 -> `f_00..f_11`).
pub fn synthesized_feature_names(n: usize) -> Vec<String> {
    let width = n.to_string().len();
    (0..n).map(|i| format!("f_{i:0width$}")).collect()
}

/// Nombres de salida: introspección del transformador si la soporta y
/// devuelve `n` nombres; si no, nombres sintetizados.
pub fn output_feature_names(transformer: &dyn Transformer, input: &[String], n: usize) -> Vec<String> {
    match transformer.feature_names_out(input) {
        None => synthesized_feature_names(n),
        Some(Ok(names)) if names.len() == n => names,
        Some(Ok(names)) => {
            warn!("transformer reported {} output names for {n} features; using f_* names", names.len());
            synthesized_feature_names(n)
        }
        Some(Err(e)) => {
            warn!("Failed to get output feature names from {}: {e}. Using f_* feature names.", transformer.kind());
            synthesized_feature_names(n)
        }
    }
}

fn to_frame(output: Transformed, input: &[String], transformer: &dyn Transformer) -> Result<Frame, PipelineError> {
    match output {
        Transformed::Table(frame) => Ok(frame),
        Transformed::Matrix { n_features, rows } => Frame::new(output_feature_names(transformer, input, n_features), rows),
    }
}

fn schema_table(schema: &[ColumnSchema]) -> String {
    let headers = vec!["Name".to_string(), "Type".to_string()];
    let rows: Vec<Vec<String>> = schema.iter().map(|c| vec![c.name.clone(), c.dtype.clone()]).collect();
    render_table(&headers, &rows)
}

fn output_schema(train: &Frame, validation: &Frame) -> Result<String, PipelineError> {
    if train.columns() != validation.columns() {
        return Err(PipelineError::Enrichment(format!("transformed train columns {:?} differ from validation columns {:?}",
                                                     train.columns(),
                                                     validation.columns())));
    }
    Ok(schema_table(&train.schema()))
}

impl TransformStep {
    pub fn from_pipeline(config: &PipelineConfig, components: &Components) -> Result<Self, PipelineError> {
        let TransformConfig { transformer_method, skip_data_profiling } = TransformConfig::from_pipeline(config)?;
        let transformer_method = transformer_method.unwrap_or_else(|| IDENTITY.to_string());
        let factory = components.transformer_factory(&transformer_method)?;
        Ok(Self { transformer_method, factory, skip_data_profiling, target_col: config.target_col.clone() })
    }
}

impl PipelineStep for TransformStep {
    fn name(&self) -> &str {
        TRANSFORM
    }

    fn params(&self) -> Value {
        json!({"transformer_method": self.transformer_method,
               "skip_data_profiling": self.skip_data_profiling,
               "target_col": self.target_col})
    }

    fn run(&self, ctx: &StepContext, output_dir: &Path) -> Result<Card, PipelineError> {
        let train_path = ctx.locator.resolve(SPLIT, TRAIN_FILE)?;
        let validation_path = ctx.locator.resolve(SPLIT, VALIDATION_FILE)?;
        let (x_train, y_train) = Frame::read_json(&train_path)?.split_target(&self.target_col)?;
        let (x_val, y_val) = Frame::read_json(&validation_path)?.split_target(&self.target_col)?;

        let mut transformer = (self.factory)()?;
        transformer.fit(&x_train)?;

        let train_out = to_frame(transformer.transform(&x_train)?, x_train.columns(), transformer.as_ref())?;
        let val_out = to_frame(transformer.transform(&x_val)?, x_val.columns(), transformer.as_ref())?;
        let train_t = train_out.with_column(&self.target_col, y_train)?;
        let val_t = val_out.with_column(&self.target_col, y_val)?;

        fs::write(output_dir.join(TRANSFORMER_FILE), serde_json::to_vec_pretty(&transformer.save()?)?)?;
        train_t.write_json(&output_dir.join(TRANSFORMED_TRAIN_FILE))?;
        val_t.write_json(&output_dir.join(TRANSFORMED_VALIDATION_FILE))?;
        info!("fitted {} on {} rows: {} -> {} features",
              self.transformer_method,
              x_train.n_rows(),
              x_train.n_cols(),
              train_t.n_cols() - 1);

        let mut card = Card::new(&ctx.pipeline_name, TRANSFORM);
        if !self.skip_data_profiling {
            card.add_tab("Data Profile (Train Transformed)", "{{PROFILE}}")?
                .add_html("PROFILE", render_profile("Profile of Train Transformed Dataset", &train_t.profile()));
        }
        card.add_tab("Transformer", "{{TRANSFORMER}}")?
            .add_text("TRANSFORMER", &transformer.describe());
        card.add_tab("Input Schema", "{{INPUT_SCHEMA}}")?
            .add_html("INPUT_SCHEMA", schema_table(&x_train.schema()));
        let output_schema_html = match output_schema(&train_t, &val_t) {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to extract transformer schema: {e}");
                format!("Failed to extract transformer schema. Error: {}", escape_html(&e.to_string()))
            }
        };
        card.add_tab("Output Schema", "{{OUTPUT_SCHEMA}}")?
            .add_html("OUTPUT_SCHEMA", output_schema_html);
        card.add_tab(RUN_SUMMARY_TAB, RUN_SUMMARY_TEMPLATE)?;
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_names_pad_to_feature_count_width() {
        let names = synthesized_feature_names(12);
        assert_eq!(names.first().map(String::as_str), Some("f_00"));
        assert_eq!(names.last().map(String::as_str), Some("f_11"));
        assert_eq!(synthesized_feature_names(3), vec!["f_0", "f_1", "f_2"]);
        assert_eq!(synthesized_feature_names(100)[7], "f_007");
    }

    #[test]
    fn empty_training_split_keeps_output_width() {
        use crate::builtins::PolynomialFeatures;

        let columns = vec!["a".to_string(), "b".to_string()];
        let empty = Frame::new(columns.clone(), Vec::new()).unwrap();
        let validation = Frame::new(columns.clone(), vec![vec![2.0, 3.0]]).unwrap();
        let mut poly = PolynomialFeatures::new();
        poly.fit(&empty).unwrap();

        let train_out = to_frame(poly.transform(&empty).unwrap(), &columns, &poly).unwrap();
        let val_out = to_frame(poly.transform(&validation).unwrap(), &columns, &poly).unwrap();
        assert_eq!(train_out.n_rows(), 0);
        assert_eq!(train_out.n_cols(), 5);
        assert_eq!(train_out.columns(), val_out.columns());
        assert_eq!(val_out.rows()[0], vec![2.0, 3.0, 4.0, 6.0, 9.0]);
    }
}

//! Step `split`: CSV de origen -> train / validation / test.

use std::path::Path;

use log::info;
use pipeflow_core::card::{render_table, RUN_SUMMARY_TEMPLATE};
use pipeflow_core::config::SplitConfig;
use pipeflow_core::constants::RUN_SUMMARY_TAB;
use pipeflow_core::{Card, Frame, PipelineConfig, PipelineError, PipelineStep, StepContext};
use serde_json::{json, Value};

use super::{SPLIT, TEST_FILE, TRAIN_FILE, VALIDATION_FILE};

#[derive(Debug, Clone)]
pub struct SplitStep {
    config: SplitConfig,
    target_col: String,
}

/// Partición (0 = train, 1 = validation, 2 = test) de la fila `index`.
/// Depende sólo del índice y de los ratios.
pub fn assign_partition(index: usize, ratios: &[f64; 3]) -> usize {
    let digest = blake3::hash(&(index as u64).to_le_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    let u = u64::from_le_bytes(head) as f64 / u64::MAX as f64;
    if u < ratios[0] {
        0
    } else if u < ratios[0] + ratios[1] {
        1
    } else {
        2
    }
}

impl SplitStep {
    pub fn from_pipeline(config: &PipelineConfig) -> Result<Self, PipelineError> {
        Ok(Self { config: SplitConfig::from_pipeline(config)?, target_col: config.target_col.clone() })
    }
}

impl PipelineStep for SplitStep {
    fn name(&self) -> &str {
        SPLIT
    }

    fn params(&self) -> Value {
        json!({"source": self.config.source, "split_ratios": self.config.split_ratios, "target_col": self.target_col})
    }

    fn run(&self, ctx: &StepContext, output_dir: &Path) -> Result<Card, PipelineError> {
        let source = ctx.pipeline_root().join(&self.config.source);
        if !source.is_file() {
            return Err(PipelineError::config(format!("split source {} not found", source.display())));
        }
        let raw = Frame::read_csv(&source)?;
        let target = raw.column_index(&self.target_col).ok_or_else(|| {
                                                           PipelineError::config(format!("target column '{}' is not present in {}",
                                                                                         self.target_col, self.config.source))
                                                       })?;

        let mut parts: [Vec<usize>; 3] = Default::default();
        let mut dropped = 0usize;
        for (i, row) in raw.rows().iter().enumerate() {
            if row[target].is_nan() {
                dropped += 1;
                continue;
            }
            parts[assign_partition(i, &self.config.split_ratios)].push(i);
        }

        let frames: Vec<Frame> = parts.iter().map(|idx| raw.take_rows(idx)).collect();
        for (frame, file) in frames.iter().zip([TRAIN_FILE, VALIDATION_FILE, TEST_FILE]) {
            frame.write_json(&output_dir.join(file))?;
        }
        info!("split {} rows into {}/{}/{} ({} dropped for missing target)",
              raw.n_rows(),
              frames[0].n_rows(),
              frames[1].n_rows(),
              frames[2].n_rows(),
              dropped);

        let headers = vec!["Dataset".to_string(), "Rows".to_string()];
        let rows = vec![vec!["source".to_string(), raw.n_rows().to_string()],
                        vec!["dropped (missing target)".to_string(), dropped.to_string()],
                        vec!["train".to_string(), frames[0].n_rows().to_string()],
                        vec!["validation".to_string(), frames[1].n_rows().to_string()],
                        vec!["test".to_string(), frames[2].n_rows().to_string()]];

        let mut card = Card::new(&ctx.pipeline_name, SPLIT);
        card.add_tab("Split Summary", "{{ SPLIT_SUMMARY }}")?
            .add_html("SPLIT_SUMMARY", render_table(&headers, &rows));
        card.add_tab(RUN_SUMMARY_TAB, RUN_SUMMARY_TEMPLATE)?;
        Ok(card)
    }
}

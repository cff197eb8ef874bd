//! Tabla numérica intercambiada entre steps.
//!
//! `Frame` guarda nombres de columna ordenados y filas `f64`. Los valores
//! faltantes son `NaN` en memoria y `null` en JSON. La serialización es
//! determinista: mismo contenido, mismos bytes.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

/// Forma persistida: `NaN` <-> `null`.
#[derive(Serialize, Deserialize)]
struct FrameDoc {
    columns: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub dtype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub count: usize,
    pub missing: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Frame {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        for c in &columns {
            if !seen.insert(c.as_str()) {
                return Err(PipelineError::Data(format!("duplicate column '{c}'")));
            }
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(PipelineError::Data(format!("row {i} has {} values, expected {}", row.len(), columns.len())));
        }
        Ok(Self { columns, rows })
    }

    /// Construye a partir de columnas (column-major).
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self, PipelineError> {
        let n_rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        if let Some((name, _)) = columns.iter().find(|(_, v)| v.len() != n_rows) {
            return Err(PipelineError::Data(format!("column '{name}' length differs from {n_rows}")));
        }
        let rows = (0..n_rows).map(|i| columns.iter().map(|(_, v)| v[i]).collect()).collect();
        Self::new(columns.into_iter().map(|(n, _)| n).collect(), rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn require(&self, name: &str) -> Result<usize, PipelineError> {
        self.column_index(name)
            .ok_or_else(|| PipelineError::Data(format!("column '{name}' not found (available: {})", self.columns.join(", "))))
    }

    pub fn column(&self, name: &str) -> Result<Vec<f64>, PipelineError> {
        let idx = self.require(name)?;
        Ok(self.rows.iter().map(|r| r[idx]).collect())
    }

    pub fn drop_column(&self, name: &str) -> Result<Frame, PipelineError> {
        let idx = self.require(name)?;
        let mut columns = self.columns.clone();
        columns.remove(idx);
        let rows = self.rows
                       .iter()
                       .map(|r| {
                           let mut r = r.clone();
                           r.remove(idx);
                           r
                       })
                       .collect();
        Ok(Frame { columns, rows })
    }

    /// Separa features y target.
    pub fn split_target(&self, target: &str) -> Result<(Frame, Vec<f64>), PipelineError> {
        Ok((self.drop_column(target)?, self.column(target)?))
    }

    pub fn insert_column(mut self, index: usize, name: &str, values: Vec<f64>) -> Result<Frame, PipelineError> {
        if self.column_index(name).is_some() {
            return Err(PipelineError::Data(format!("duplicate column '{name}'")));
        }
        if values.len() != self.rows.len() {
            return Err(PipelineError::Data(format!("column '{name}' has {} values, frame has {} rows",
                                                   values.len(),
                                                   self.rows.len())));
        }
        let index = index.min(self.columns.len());
        self.columns.insert(index, name.to_string());
        for (row, v) in self.rows.iter_mut().zip(values) {
            row.insert(index, v);
        }
        Ok(self)
    }

    pub fn with_column(self, name: &str, values: Vec<f64>) -> Result<Frame, PipelineError> {
        let end = self.columns.len();
        self.insert_column(end, name, values)
    }

    pub fn take_rows(&self, indices: &[usize]) -> Frame {
        Frame { columns: self.columns.clone(),
                rows: indices.iter().filter_map(|&i| self.rows.get(i).cloned()).collect() }
    }

    /// Índices (ordenados) de una muestra sin reemplazo. Mismo `seed`, misma
    /// muestra.
    pub fn sample_indices(&self, fraction: f64, seed: u64) -> Vec<usize> {
        let n = self.rows.len();
        if fraction >= 1.0 || n == 0 {
            return (0..n).collect();
        }
        let k = ((n as f64) * fraction).round().clamp(1.0, n as f64) as usize;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut picked = index::sample(&mut rng, n, k).into_vec();
        picked.sort_unstable();
        picked
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        let doc = FrameDoc { columns: self.columns.clone(),
                             rows: self.rows
                                       .iter()
                                       .map(|r| r.iter().map(|v| if v.is_nan() { None } else { Some(*v) }).collect())
                                       .collect() };
        Ok(serde_json::to_vec_pretty(&doc)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Frame, PipelineError> {
        let doc: FrameDoc = serde_json::from_slice(bytes)?;
        let rows = doc.rows
                      .into_iter()
                      .map(|r| r.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
                      .collect();
        Frame::new(doc.columns, rows)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), PipelineError> {
        fs::write(path, self.to_json_bytes()?)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Frame, PipelineError> {
        Frame::from_json_bytes(&fs::read(path)?)
    }

    /// Lee un CSV con cabecera. Los campos entre comillas dobles pueden
    /// contener comas y `""` como comilla escapada.
    /// Celdas vacías, `NA` o `nan` son faltantes.
    pub fn read_csv(path: &Path) -> Result<Frame, PipelineError> {
        let text = fs::read_to_string(path)?;
        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
        let Some((header_no, header)) = lines.next() else {
            return Err(PipelineError::Data(format!("{} is empty", path.display())));
        };
        let located = |line_no: usize, e: String| PipelineError::Data(format!("{}:{}: {e}", path.display(), line_no + 1));
        let header = split_csv_line(header).map_err(|e| located(header_no, e))?;
        let columns: Vec<String> = header.iter().map(|c| c.trim().to_string()).collect();
        let mut rows = Vec::new();
        for (line_no, line) in lines {
            let cells = split_csv_line(line).map_err(|e| located(line_no, e))?;
            if cells.len() != columns.len() {
                return Err(PipelineError::Data(format!("{}:{}: expected {} fields, found {}",
                                                       path.display(),
                                                       line_no + 1,
                                                       columns.len(),
                                                       cells.len())));
            }
            let mut row = Vec::with_capacity(cells.len());
            for (col, cell) in columns.iter().zip(cells) {
                let value = match cell.trim() {
                    "" | "NA" | "nan" | "NaN" => f64::NAN,
                    other => other.parse::<f64>().map_err(|_| {
                                                     PipelineError::Data(format!("{}:{}: column '{col}': cannot parse '{other}' as number",
                                                                                 path.display(),
                                                                                 line_no + 1))
                                                 })?,
                };
                row.push(value);
            }
            rows.push(row);
        }
        Frame::new(columns, rows)
    }

    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns
            .iter()
            .map(|c| ColumnSchema { name: c.clone(), dtype: "double".to_string() })
            .collect()
    }

    /// Estadísticos por columna. `std` es la desviación muestral (n - 1).
    pub fn profile(&self) -> Vec<ColumnProfile> {
        self.columns
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let present: Vec<f64> = self.rows.iter().map(|r| r[j]).filter(|v| !v.is_nan()).collect();
                let n = present.len();
                let mean = if n == 0 { f64::NAN } else { present.iter().sum::<f64>() / n as f64 };
                let std = if n < 2 {
                    f64::NAN
                } else {
                    (present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
                };
                let min = present.iter().copied().fold(f64::NAN, f64::min);
                let max = present.iter().copied().fold(f64::NAN, f64::max);
                ColumnProfile { name: name.clone(),
                                count: self.rows.len(),
                                missing: self.rows.len() - n,
                                mean,
                                std,
                                min,
                                max }
            })
            .collect()
    }
}

/// Separa una línea CSV en campos. Dentro de comillas dobles la coma es
/// literal y `""` es una comilla.
fn split_csv_line(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(current);
    Ok(fields)
}

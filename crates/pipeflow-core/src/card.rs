//! Report card: secuencia ordenada de pestañas con plantillas.
//!
//! Cada pestaña tiene una plantilla con placeholders `{{ NOMBRE }}` que se
//! rellenan con fragmentos HTML. Las pestañas se renderizan de forma
//! independiente: un placeholder sin rellenar produce un fragmento vacío.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::constants::{CARD_FILE, EXE_DURATION, LAST_UPDATE_TIME};
use crate::errors::PipelineError;
use crate::model::ColumnProfile;

pub const RUN_SUMMARY_TEMPLATE: &str = "{{ RUN_ID }} {{ MODEL_URI }} {{ EXE_DURATION }} {{ LAST_UPDATE_TIME }}";

#[derive(Debug, Clone, PartialEq)]
pub struct CardTab {
    name: String,
    template: String,
    values: IndexMap<String, String>,
}

impl CardTab {
    fn new(name: &str, template: &str) -> Self {
        Self { name: name.to_string(), template: template.to_string(), values: IndexMap::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rellena un placeholder con HTML ya renderizado.
    pub fn add_html(&mut self, placeholder: &str, html: impl Into<String>) -> &mut Self {
        self.values.insert(placeholder.to_string(), html.into());
        self
    }

    /// Rellena con texto plano (escapado, preformateado).
    pub fn add_text(&mut self, placeholder: &str, text: &str) -> &mut Self {
        self.add_html(placeholder, format!("<pre>{}</pre>", escape_html(text)))
    }

    pub fn value(&self, placeholder: &str) -> Option<&str> {
        self.values.get(placeholder).map(String::as_str)
    }

    /// Nombres de placeholder en orden de aparición.
    pub fn placeholders(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else { break };
            out.push(after[..end].trim().to_string());
            rest = &after[end + 2..];
        }
        out
    }

    pub fn render(&self) -> String {
        let mut html = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find("{{") {
            html.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                html.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let key = after[..end].trim();
            html.push_str(self.values.get(key).map(String::as_str).unwrap_or(""));
            rest = &after[end + 2..];
        }
        html.push_str(rest);
        html
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pipeline_name: String,
    step_name: String,
    tabs: Vec<CardTab>,
}

impl Card {
    pub fn new(pipeline_name: &str, step_name: &str) -> Self {
        Self { pipeline_name: pipeline_name.to_string(), step_name: step_name.to_string(), tabs: Vec::new() }
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Añade una pestaña. Los nombres son únicos dentro de la card.
    pub fn add_tab(&mut self, name: &str, template: &str) -> Result<&mut CardTab, PipelineError> {
        if self.tabs.iter().any(|t| t.name == name) {
            return Err(PipelineError::Card(format!("tab '{name}' already exists in card for step '{}'", self.step_name)));
        }
        self.tabs.push(CardTab::new(name, template));
        let last = self.tabs.len() - 1;
        Ok(&mut self.tabs[last])
    }

    pub fn tab(&self, name: &str) -> Option<&CardTab> {
        self.tabs.iter().find(|t| t.name == name)
    }

    pub fn tab_mut(&mut self, name: &str) -> Option<&mut CardTab> {
        self.tabs.iter_mut().find(|t| t.name == name)
    }

    pub fn tab_names(&self) -> Vec<&str> {
        self.tabs.iter().map(|t| t.name.as_str()).collect()
    }

    /// Pares (nombre, fragmento renderizado) en orden.
    pub fn sections(&self) -> Vec<(String, String)> {
        self.tabs.iter().map(|t| (t.name.clone(), t.render())).collect()
    }

    /// Rellena la duración y la hora de actualización de "Run Summary".
    pub fn fill_run_summary(&mut self, tab_name: &str, duration_secs: f64, updated_at: &str) {
        if let Some(tab) = self.tab_mut(tab_name) {
            tab.add_html(EXE_DURATION, format!("<b>Run duration (s):</b> {}<br><br>", format_sig(duration_secs, 3)))
               .add_html(LAST_UPDATE_TIME, format!("<b>Last updated:</b> {}<br><br>", escape_html(updated_at)));
        }
    }

    pub fn to_html(&self) -> String {
        let title = format!("{}: {}", escape_html(&self.pipeline_name), escape_html(&self.step_name));
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str(&format!("<title>{title}</title>\n"));
        html.push_str("<style>details{margin:8px 0}summary{font-weight:bold;cursor:pointer}\
                       table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:2px 6px}</style>\n");
        html.push_str("</head>\n<body>\n");
        html.push_str(&format!("<h1>{title}</h1>\n"));
        for (i, (name, body)) in self.sections().into_iter().enumerate() {
            let open = if i == 0 { " open" } else { "" };
            html.push_str(&format!("<details{open}><summary>{}</summary>\n<div>{body}</div>\n</details>\n",
                                   escape_html(&name)));
        }
        html.push_str("</body>\n</html>\n");
        html
    }

    /// Escribe `card.html` dentro de `dir`.
    pub fn save_as_html(&self, dir: &Path) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(CARD_FILE);
        fs::write(&path, self.to_html())?;
        Ok(path)
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Tabla HTML; las celdas se escapan.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut html = String::from("<table>\n<thead><tr>");
    for h in headers {
        html.push_str(&format!("<th>{}</th>", escape_html(h)));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<td>{}</td>", escape_html(cell)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>");
    html
}

pub fn render_profile(title: &str, profile: &[ColumnProfile]) -> String {
    let headers: Vec<String> = ["Column", "Count", "Missing", "Mean", "Std", "Min", "Max"].iter().map(|s| s.to_string()).collect();
    let rows: Vec<Vec<String>> = profile.iter()
                                        .map(|p| {
                                            vec![p.name.clone(),
                                                 p.count.to_string(),
                                                 p.missing.to_string(),
                                                 format_sig(p.mean, 6),
                                                 format_sig(p.std, 6),
                                                 format_sig(p.min, 6),
                                                 format_sig(p.max, 6)]
                                        })
                                        .collect();
    format!("<h3>{}</h3>{}", escape_html(title), render_table(&headers, &rows))
}

/// Formato con `digits` cifras significativas (al estilo `{:.6g}`).
pub fn format_sig(value: f64, digits: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if value == 0.0 {
        return "0".to_string();
    }
    let digits = digits.max(1);
    let exp = value.abs().log10().floor() as i32;
    if exp < -4 || exp >= digits as i32 {
        let s = format!("{:.*e}", digits - 1, value);
        let (mantissa, exponent) = s.split_once('e').unwrap_or((&s, "0"));
        let mantissa = trim_zeros(mantissa);
        let exp_num: i32 = exponent.parse().unwrap_or(0);
        let sign = if exp_num < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp_num.abs())
    } else {
        let decimals = (digits as i32 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

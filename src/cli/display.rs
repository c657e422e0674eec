//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use std::collections::BTreeMap;

use serde::Serialize;

use crate::client::ModelRecord;
use crate::deployment::GuardOutcome;

/// Format rows as a left-aligned table under upper-cased headers
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let render = |cells: Vec<String>| -> String {
        let line = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| match widths.get(i) {
                Some(width) => format!("{:width$}", cell, width = *width),
                None => cell.clone(),
            })
            .collect::<Vec<_>>()
            .join("   ");
        format!("{}\n", line.trim_end())
    };

    let mut output = render(headers.iter().map(|h| h.to_uppercase()).collect());
    for row in rows {
        output.push_str(&render(row));
    }
    output
}

/// Pretty-printed JSON followed by a newline
pub fn format_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(format!("{}\n", serde_json::to_string_pretty(value)?))
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Deployed models, one per row
pub fn format_model_records(records: &[ModelRecord]) -> String {
    let headers = &["identifier", "model name", "type", "batch", "max input", "gpu", "workers"];
    let rows = records
        .iter()
        .map(|m| {
            vec![
                m.identifier.clone(),
                m.model_name.clone(),
                m.model_type.clone(),
                optional(m.batch_size),
                optional(m.max_input),
                optional(m.disable_gpu.map(|disabled| if disabled { "no" } else { "yes" })),
                optional(m.number_of_workers),
            ]
        })
        .collect();

    format_table(headers, rows)
}

/// Deployments in flight, model name to type
pub fn format_models_in_deployment(models: &BTreeMap<String, String>) -> String {
    let rows = models
        .iter()
        .map(|(name, model_type)| vec![name.clone(), model_type.clone()])
        .collect();
    format_table(&["model name", "type"], rows)
}

pub fn format_guard_outcome(model_name: &str, outcome: &GuardOutcome) -> String {
    match outcome {
        GuardOutcome::NothingToDeploy => "Nothing to deploy.\n".to_string(),
        GuardOutcome::AlreadyDeployed => format!("{} is already deployed.\n", model_name),
        GuardOutcome::InDeployment => format!("{} is already being deployed.\n", model_name),
        GuardOutcome::Deployed(result) => format!("{} deployed: {}\n", model_name, result),
    }
}

//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use super::commands::{CommandError, CommandResult, TenantView, ValidationResult};
use super::OutputFormat;
use crate::address::{Address, BrokerState};
use crate::cluster::{ResourceSet, RouterCluster, LABEL_BROKER_KIND};

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();
    push_row(&mut output, headers.iter().map(|h| h.to_uppercase()), &widths);
    for row in rows {
        push_row(&mut output, row.into_iter(), &widths);
    }
    output
}

fn push_row(output: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let mut line = String::new();
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            line.push_str("   ");
        }
        match widths.get(i) {
            Some(width) => line.push_str(&format!("{:width$}", cell, width = *width)),
            None => line.push_str(&cell),
        }
    }
    output.push_str(line.trim_end());
    output.push('\n');
}

// ============================================================================
// Address display
// ============================================================================

/// Broker associations as `cluster(state)` pairs; active ones unadorned
fn format_brokers(address: &Address) -> String {
    if address.status.broker_statuses.is_empty() {
        return "-".to_string();
    }
    address
        .status
        .broker_statuses
        .iter()
        .map(|b| match b.state {
            BrokerState::Active => b.cluster_id.clone(),
            state => format!("{}({:?})", b.cluster_id, state),
        })
        .collect::<Vec<_>>()
        .join(",")
}

pub fn format_address_list(addresses: &[Address]) -> String {
    let headers = &["NAME", "ADDRESS", "TYPE", "PLAN", "PHASE", "READY", "BROKERS", "MESSAGE"];
    let rows: Vec<Vec<String>> = addresses
        .iter()
        .map(|a| {
            vec![
                a.name().to_string(),
                a.spec.address.clone(),
                a.spec.address_type.to_string(),
                a.spec.plan.clone(),
                format!("{:?}", a.status.phase),
                a.status.ready.to_string(),
                format_brokers(a),
                a.status.messages.first().cloned().unwrap_or_default(),
            ]
        })
        .collect();

    format_table(headers, rows)
}

// ============================================================================
// Cluster display
// ============================================================================

pub fn format_cluster_list(clusters: &[ResourceSet]) -> String {
    let headers = &["CLUSTER", "KIND", "TEMPLATE", "READY", "STORAGE"];
    let rows: Vec<Vec<String>> = clusters
        .iter()
        .map(|c| {
            vec![
                c.cluster_id.clone(),
                c.labels
                    .get(LABEL_BROKER_KIND)
                    .cloned()
                    .unwrap_or_else(|| "-".to_string()),
                c.template.clone(),
                format!("{}/{}", c.ready_replicas, c.replicas),
                c.storage_size.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();

    format_table(headers, rows)
}

pub fn format_router(router: Option<&RouterCluster>) -> String {
    match router {
        Some(r) => format!(
            "Router: {} ({}/{} ready)\n",
            r.name, r.ready_replicas, r.replicas
        ),
        None => "Router: not deployed\n".to_string(),
    }
}

/// Render a tenant view in the requested format
pub fn render_view(view: &TenantView, format: OutputFormat) -> CommandResult<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(view)?),
        OutputFormat::Yaml => {
            serde_yaml::to_string(view).map_err(|e| CommandError::Yaml(e.to_string()))
        }
        OutputFormat::Table => {
            let mut output = format!("Address space: {}\n", view.address_space);
            output.push_str(&format_router(view.router.as_ref()));
            output.push('\n');
            output.push_str(&format_cluster_list(&view.clusters));
            output.push('\n');
            output.push_str(&format_address_list(&view.addresses));
            Ok(output)
        }
    }
}

// ============================================================================
// Validation display
// ============================================================================

pub fn format_validation(results: &[ValidationResult]) -> String {
    let headers = &["NAME", "ADDRESS", "PLAN", "RESULT"];
    let rows: Vec<Vec<String>> = results
        .iter()
        .map(|r| {
            vec![
                r.name.clone(),
                r.address.clone(),
                r.plan.clone(),
                r.error.clone().unwrap_or_else(|| "OK".to_string()),
            ]
        })
        .collect();

    let invalid = results.iter().filter(|r| !r.is_valid()).count();
    let mut output = format_table(headers, rows);
    output.push_str(&format!("\n{} of {} addresses valid\n", results.len() - invalid, results.len()));
    output
}

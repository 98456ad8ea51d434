//! Read-only queries over index partitions.
//!
//! Queries never touch an orchestration root: they read only the partition
//! files the indexer produced, so any number of viewers can run while a
//! rebuild is in progress.

use super::index::{ProjectIndex, RequestEdge, RunSummary};
use super::registry::load_registry;
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Runs of one project, in start order.
pub fn project_runs(home: &Path, project_id: &str) -> Result<Vec<RunSummary>> {
    Ok(ProjectIndex::load(home, project_id)?
        .map(|index| index.runs)
        .unwrap_or_default())
}

/// Runs across every registered project, in start order.
pub fn global_runs(home: &Path) -> Result<Vec<RunSummary>> {
    let mut runs = Vec::new();
    for project in load_registry(home) {
        if let Some(index) = ProjectIndex::load(home, &project.project_id)? {
            runs.extend(index.runs);
        }
    }
    runs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.run_id.cmp(&b.run_id)));
    Ok(runs)
}

/// The thread a run belongs to: ancestors (via parent pointers) first, the
/// run itself, then descendants in start order.
pub fn run_thread(home: &Path, project_id: &str, run_id: &str) -> Result<Vec<RunSummary>> {
    let runs = project_runs(home, project_id)?;
    let by_id: BTreeMap<&str, &RunSummary> =
        runs.iter().map(|r| (r.run_id.as_str(), r)).collect();

    let Some(start) = by_id.get(run_id) else {
        return Ok(Vec::new());
    };

    // Walk up the parent chain; a cycle in corrupted data is bounded by the
    // visited set.
    let mut ancestors = Vec::new();
    let mut visited = std::collections::BTreeSet::new();
    let mut cursor = start.parent_run_id.as_deref();
    while let Some(parent_id) = cursor {
        if !visited.insert(parent_id.to_string()) {
            break;
        }
        let Some(parent) = by_id.get(parent_id) else {
            break;
        };
        ancestors.push((*parent).clone());
        cursor = parent.parent_run_id.as_deref();
    }
    ancestors.reverse();

    // Walk down: breadth-first over parent pointers.
    let mut thread = ancestors;
    thread.push((*start).clone());
    let mut frontier = vec![run_id.to_string()];
    while let Some(current) = frontier.pop() {
        for run in &runs {
            if run.parent_run_id.as_deref() == Some(current.as_str()) {
                thread.push(run.clone());
                frontier.push(run.run_id.clone());
            }
        }
    }

    Ok(thread)
}

/// Aggregated cross-phase edge: how often one `{subsystem, phase}` pair
/// handed work to another, and with what outcomes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EdgeSummary {
    pub from_subsystem: String,
    pub from_phase: String,
    pub to_subsystem: String,
    pub to_phase: String,
    pub total: usize,
    pub ok: usize,
    pub failed: usize,
    pub blocked: usize,
    pub pending: usize,
}

/// Cross-phase edge summary, derived from request/response pairs.
///
/// With a project id the summary is project-scoped; without one it spans
/// every registered project.
pub fn phase_edges(home: &Path, project_id: Option<&str>) -> Result<Vec<EdgeSummary>> {
    let mut edges: Vec<RequestEdge> = Vec::new();
    match project_id {
        Some(project_id) => {
            if let Some(index) = ProjectIndex::load(home, project_id)? {
                edges = index.requests;
            }
        }
        None => {
            for project in load_registry(home) {
                if let Some(index) = ProjectIndex::load(home, &project.project_id)? {
                    edges.extend(index.requests);
                }
            }
        }
    }

    let mut summaries: BTreeMap<(String, String, String, String), EdgeSummary> = BTreeMap::new();
    for edge in edges {
        let from_phase = edge.from_phase.clone().unwrap_or_else(|| "?".to_string());
        let key = (
            edge.from_subsystem.clone(),
            from_phase.clone(),
            edge.to_subsystem.clone(),
            edge.to_phase.clone(),
        );
        let summary = summaries.entry(key).or_insert_with(|| EdgeSummary {
            from_subsystem: edge.from_subsystem.clone(),
            from_phase,
            to_subsystem: edge.to_subsystem.clone(),
            to_phase: edge.to_phase.clone(),
            total: 0,
            ok: 0,
            failed: 0,
            blocked: 0,
            pending: 0,
        });
        summary.total += 1;
        match edge.status.as_str() {
            "ok" => summary.ok += 1,
            "failed" => summary.failed += 1,
            "blocked" => summary.blocked += 1,
            _ => summary.pending += 1,
        }
    }

    Ok(summaries.into_values().collect())
}

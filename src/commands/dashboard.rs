//! The `dashboard` commands: registry, indexing, and queries.

use crate::cli::{
    DashboardAction, DashboardCommand, DashboardEdgesArgs, DashboardIndexArgs,
    DashboardRegisterArgs, DashboardRunsArgs, DashboardThreadArgs, DashboardUnregisterArgs,
};
use crate::context::WardenContext;
use crate::dashboard;
use crate::error::{Result, WardenError};
use std::path::PathBuf;

pub fn dispatch_dashboard(command: DashboardCommand) -> Result<()> {
    match command.action {
        DashboardAction::Register(args) => cmd_register(args),
        DashboardAction::Unregister(args) => cmd_unregister(args),
        DashboardAction::Index(args) => cmd_index(args),
        DashboardAction::Projects => cmd_projects(),
        DashboardAction::Runs(args) => cmd_runs(args),
        DashboardAction::Thread(args) => cmd_thread(args),
        DashboardAction::Edges(args) => cmd_edges(args),
    }
}

fn cmd_register(args: DashboardRegisterArgs) -> Result<()> {
    let home = dashboard::dashboard_home();

    let orchestration_root = match args.root {
        Some(root) => PathBuf::from(root),
        None => WardenContext::resolve()?.root,
    };
    let project_root = args
        .project_root
        .map(PathBuf::from)
        .unwrap_or_else(|| orchestration_root.clone());

    let record = dashboard::register(
        &home,
        &orchestration_root,
        &project_root,
        args.label.as_deref(),
    )?;

    println!("Registered: {} ({})", record.label, record.project_id);
    println!("Root:       {}", record.orchestration_root);
    Ok(())
}

fn cmd_unregister(args: DashboardUnregisterArgs) -> Result<()> {
    let home = dashboard::dashboard_home();
    if dashboard::unregister(&home, &args.project_id)? {
        println!("Unregistered {}.", args.project_id);
        Ok(())
    } else {
        Err(WardenError::UserError(format!(
            "project '{}' is not registered",
            args.project_id
        )))
    }
}

fn cmd_index(args: DashboardIndexArgs) -> Result<()> {
    let home = dashboard::dashboard_home();

    let stats = match args.project {
        Some(project_id) => {
            let project = dashboard::list_projects(&home)
                .into_iter()
                .find(|p| p.project_id == project_id)
                .ok_or_else(|| {
                    WardenError::UserError(format!(
                        "project '{}' is not registered",
                        project_id
                    ))
                })?;
            dashboard::index_project(&home, &project)?
        }
        None => dashboard::index_all(&home)?,
    };

    println!(
        "Indexed {} project(s): {} run(s), {} request(s).",
        stats.projects_indexed, stats.runs_indexed, stats.requests_indexed
    );
    for missing in &stats.missing_roots {
        eprintln!("Warning: no runs directory under {}", missing);
    }
    Ok(())
}

fn cmd_projects() -> Result<()> {
    let home = dashboard::dashboard_home();
    let projects = dashboard::list_projects(&home);

    if projects.is_empty() {
        println!("No projects registered.");
        return Ok(());
    }

    for project in projects {
        println!(
            "{}  {}  {}",
            project.project_id, project.label, project.orchestration_root
        );
    }
    Ok(())
}

fn cmd_runs(args: DashboardRunsArgs) -> Result<()> {
    let home = dashboard::dashboard_home();
    let runs = match args.project {
        Some(project_id) => dashboard::project_runs(&home, &project_id)?,
        None => dashboard::global_runs(&home)?,
    };

    if runs.is_empty() {
        println!("No runs indexed.");
        return Ok(());
    }

    for run in runs {
        let orphan_flag = if run.orphaned { " ORPHANED" } else { "" };
        println!(
            "{}  {}.{}  {}{}",
            run.run_id, run.subsystem, run.phase, run.status, orphan_flag
        );
    }
    Ok(())
}

fn cmd_thread(args: DashboardThreadArgs) -> Result<()> {
    let home = dashboard::dashboard_home();
    let thread = dashboard::run_thread(&home, &args.project, &args.run_id)?;

    if thread.is_empty() {
        return Err(WardenError::UserError(format!(
            "run '{}' is not in project '{}''s index",
            args.run_id, args.project
        )));
    }

    for (depth, run) in thread.iter().enumerate() {
        let marker = if run.run_id == args.run_id { "*" } else { " " };
        println!(
            "{} {}{}  {}.{}  {}",
            marker,
            "  ".repeat(depth),
            run.run_id,
            run.subsystem,
            run.phase,
            run.status
        );
    }
    Ok(())
}

fn cmd_edges(args: DashboardEdgesArgs) -> Result<()> {
    let home = dashboard::dashboard_home();
    let edges = dashboard::phase_edges(&home, args.project.as_deref())?;

    if edges.is_empty() {
        println!("No cross-phase edges indexed.");
        return Ok(());
    }

    for edge in edges {
        println!(
            "{}.{} -> {}.{}  total={} ok={} failed={} blocked={} pending={}",
            edge.from_subsystem,
            edge.from_phase,
            edge.to_subsystem,
            edge.to_phase,
            edge.total,
            edge.ok,
            edge.failed,
            edge.blocked,
            edge.pending
        );
    }
    Ok(())
}

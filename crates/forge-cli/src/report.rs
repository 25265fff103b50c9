//! Console report for a completed run.

use console::style;
use forge_core::run::{JobStatus, RunStatus, StageStatus, WorkflowRun};

pub fn print_run(run: &WorkflowRun) {
    println!();
    if run.status == RunStatus::NotTriggered {
        println!(
            "{} Event {} ({}) does not fire a run",
            style("●").dim(),
            run.event.kind.as_str(),
            run.event.git_ref
        );
        return;
    }

    println!(
        "{} Workflow: {}",
        style("▶").cyan().bold(),
        style(&run.workflow_name).bold()
    );

    for stage in &run.stages {
        println!("  {} {}", stage_glyph(stage.status), style(&stage.name).bold());
        for job in &stage.jobs {
            if stage.jobs.len() > 1 || !job.assignment.is_empty() {
                println!("      {} {}", job_glyph(job.status), style(&job.display_name).dim());
            }
        }
        if let Some(error) = &stage.error {
            println!("      {}", style(error).red());
        }
    }

    if let Some(release) = &run.release {
        println!("  {} {}", stage_glyph(release.status), style("release").bold());
        for package in &release.packages {
            println!(
                "      {} {} ({} bytes)",
                style("📦").cyan(),
                package.file_name,
                package.size_bytes
            );
        }
        if let Some(error) = &release.error {
            println!("      {}", style(error).red());
        }
    }

    println!();
    let seconds = run.duration_ms.unwrap_or(0) as f64 / 1000.0;
    match run.status {
        RunStatus::Succeeded => println!(
            "{} Run completed successfully in {:.2}s",
            style("✓").green().bold(),
            seconds
        ),
        RunStatus::Failed => println!(
            "{} Run failed after {:.2}s",
            style("✗").red().bold(),
            seconds
        ),
        _ => {}
    }
}

fn stage_glyph(status: StageStatus) -> console::StyledObject<&'static str> {
    match status {
        StageStatus::Succeeded => style("✓").green(),
        StageStatus::Failed => style("✗").red(),
        StageStatus::Skipped => style("⊘").dim(),
        StageStatus::SkippedOnFailure => style("⊘").yellow(),
        StageStatus::Pending | StageStatus::Running => style("…").dim(),
    }
}

fn job_glyph(status: JobStatus) -> console::StyledObject<&'static str> {
    match status {
        JobStatus::Succeeded => style("✓").green(),
        JobStatus::Failed => style("✗").red(),
        JobStatus::Skipped => style("⊘").dim(),
        JobStatus::Pending | JobStatus::Running => style("…").dim(),
    }
}

//! Output formatting and styling module.
//!
//! All user-facing terminal output goes through [`OutputFormatter`]; library
//! diagnostics go through `tracing` instead.

use crate::executor::{ExecutionReport, ExecutionResult, Outcome};
use crate::planner::Plan;
use crate::rule::Profile;
use crate::tags::Tag;
use crate::undo::UndoReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use smartorg::output::OutputFormatter;
    /// OutputFormatter::success("Organized 12 files");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[PREVIEW] {}", message).yellow());
    }

    /// Creates a progress bar for executing `total` operations.
    ///
    /// ```no_run
    /// use smartorg::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("done");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints every planned operation and every rejected file.
    pub fn preview(plan: &Plan, root: &Path) {
        Self::header(&format!("Planned operations ({})", plan.len()));
        for op in &plan.operations {
            let source = op
                .source
                .path
                .strip_prefix(root)
                .unwrap_or(&op.source.path);
            println!(
                " - {} {} {} {}",
                source.display(),
                "→".cyan(),
                op.relative.display(),
                format!("[{}, {}]", op.rule, op.kind).dimmed()
            );
        }

        if !plan.rejected.is_empty() {
            Self::header(&format!("Not planned ({})", plan.rejected.len()));
            for rejection in &plan.rejected {
                println!(
                    " - {}: {}",
                    rejection.source.display(),
                    rejection.reason.red()
                );
            }
        }
    }

    /// Prints a per-folder count table.
    ///
    /// ```no_run
    /// use smartorg::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("2023".to_string(), 15);
    /// counts.insert("Unsorted".to_string(), 8);
    /// OutputFormatter::summary_table(&counts, 23);
    /// ```
    pub fn summary_table(folder_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let width = folder_counts
            .keys()
            .map(|name| name.chars().count())
            .max()
            .unwrap_or(0)
            .max(6);

        println!("{:<width$} | {}", "Folder".bold(), "Files".bold(), width = width);
        println!("{}", "-".repeat(width + 10));
        for (folder, count) in folder_counts {
            println!(
                "{:<width$} | {} {}",
                folder,
                count.to_string().green(),
                plural(*count),
                width = width
            );
        }
        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files),
            width = width
        );
    }

    /// Prints successes, then every skipped or failed file with its reason.
    pub fn execution_report(report: &ExecutionReport) {
        let succeeded: Vec<&ExecutionResult> = report.succeeded().collect();
        let problems: Vec<&ExecutionResult> = report.problems().collect();

        if !succeeded.is_empty() {
            Self::header(&format!("Completed ({})", succeeded.len()));
            for result in &succeeded {
                let destination = result
                    .final_path
                    .as_deref()
                    .unwrap_or(&result.operation.destination);
                println!(
                    " {} {} → {}",
                    "✓".green(),
                    result.operation.source.path.display(),
                    destination.display()
                );
            }
        }

        let not_completed = problems.len() + report.rejected.len();
        if not_completed > 0 {
            Self::header(&format!("Not completed ({})", not_completed));
            for rejection in &report.rejected {
                println!(
                    " {} {} [{}]: {}",
                    "✗".red(),
                    rejection.source.display(),
                    "skipped (rejected)".yellow(),
                    rejection.reason
                );
            }
            for result in &problems {
                let label = match result.outcome {
                    Outcome::Failed => result.outcome.label().red(),
                    _ => result.outcome.label().yellow(),
                };
                println!(
                    " {} {} [{}]: {}",
                    "✗".red(),
                    result.operation.source.path.display(),
                    label,
                    result.detail.as_deref().unwrap_or("no details")
                );
            }
        }

        println!();
        println!(
            "{} succeeded, {} skipped, {} failed",
            report.count(Outcome::Succeeded).to_string().green(),
            report.skipped().to_string().yellow(),
            report.count(Outcome::Failed).to_string().red()
        );
        if report.cancelled {
            Self::warning("Cancelled before all operations ran; completed files were kept.");
        }
    }

    pub fn undo_report(report: &UndoReport) {
        Self::success(&format!("Restored: {}", report.restored_files));

        if !report.skipped_files.is_empty() {
            Self::warning(&format!("Skipped: {}", report.skipped_files.len()));
            for (path, reason) in &report.skipped_files {
                println!("    - {}: {}", path.display(), reason);
            }
        }

        if !report.failed_restores.is_empty() {
            Self::error(&format!("Failed: {}", report.failed_restores.len()));
            for (path, reason) in &report.failed_restores {
                eprintln!("    - {}: {}", path.display(), reason);
            }
        }

        if !report.is_complete_success() {
            Self::warning("History was kept; fix the issues above and run undo again.");
        }
    }

    pub fn profiles(profiles: &[Profile]) {
        if profiles.is_empty() {
            Self::plain("No profiles configured.");
            return;
        }
        for profile in profiles {
            println!(
                "{} ({} {}, default: {})",
                profile.name().bold(),
                profile.rules().len(),
                if profile.rules().len() == 1 { "rule" } else { "rules" },
                profile.default_rule().template()
            );
            for rule in profile.rules() {
                let constraints = rule.matcher().constraint_names();
                let matcher = if constraints.is_empty() {
                    "any file".to_string()
                } else {
                    constraints.join(" + ")
                };
                println!("    {} {} → {}", rule.name(), format!("[{matcher}]").dimmed(), rule.template());
            }
        }
    }

    pub fn tags() {
        for tag in Tag::ALL {
            println!("{:<14} {}", tag.to_string().cyan(), tag.description());
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ColumnConstraint, ContentArrangement, Table, Width,
};

use soa_cli::pipeline::PipelineMode;
use soa_core::ReconciliationReport;
use soa_core::provenance::TagCounts;
use soa_validate::{Severity, ValidationReport, ValidationViolation};

use crate::commands::{RunResult, ValidateResult};

pub fn print_run_summary(result: &RunResult) {
    let outcome = &result.outcome;
    let design = &outcome.document.study_design;
    match outcome.mode {
        PipelineMode::Reconciled => println!("Mode: reconciled (text + vision)"),
        PipelineMode::SingleSource(tag) => println!("Mode: single source ({tag})"),
    }
    if let Some(study_id) = &design.study_id {
        println!("Study: {study_id}");
    }
    match &result.artifacts {
        Some(paths) => {
            println!("Graph: {}", paths.graph.display());
            println!("Provenance: {}", paths.provenance.display());
            println!("Validation: {}", paths.validation.display());
        }
        None => println!("Dry run: no files written"),
    }

    for (tag, report) in &outcome.normalization {
        println!(
            "Normalized {tag}: {} defaults, {} timing extractions, {} ID rewrites, {} defects",
            report.defaults.len(),
            report.timing_extractions.len(),
            report.id_rewrites.len(),
            report.defects.len()
        );
    }
    if let Some(report) = &outcome.reconciliation {
        print_alignment_table(report);
    }
    print_provenance_table(
        &outcome.ledger.entity_tag_counts(),
        &outcome.ledger.cell_tag_counts(),
    );
    print_validation(&outcome.validation);

    if !outcome.source_errors.is_empty() {
        eprintln!("Dropped sources:");
        for (tag, error) in &outcome.source_errors {
            eprintln!("- {tag}: {error}");
        }
    }
}

pub fn print_validate_summary(result: &ValidateResult) {
    println!("Document: {}", result.document.display());
    if let Some(path) = &result.written {
        println!("Validation: {}", path.display());
    }
    print_validation(&result.report);
}

fn print_alignment_table(report: &ReconciliationReport) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Entity"),
        header_cell("Aligned"),
        header_cell("Text only"),
        header_cell("Vision only"),
    ]);
    apply_table_style(&mut table);
    for column in 1..=3 {
        align_column(&mut table, column, CellAlignment::Right);
    }
    for summary in &report.alignments {
        table.add_row(vec![
            kind_cell(summary.kind.label()),
            count_cell(summary.aligned, Color::Green),
            count_cell(summary.text_only, Color::Yellow),
            count_cell(summary.vision_only, Color::Yellow),
        ]);
    }
    println!();
    println!(
        "Alignment (structure from {}, {} field resolutions, {} tie-breaks, {} collapsed):",
        report.structural_source,
        report.resolutions.len(),
        report.tie_breaks.len(),
        report.redirects.len()
    );
    println!("{table}");
}

fn print_provenance_table(entities: &TagCounts, cells: &TagCounts) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Provenance"),
        header_cell("Text"),
        header_cell("Vision"),
        header_cell("Both"),
        header_cell("Total"),
    ]);
    apply_table_style(&mut table);
    for column in 1..=4 {
        align_column(&mut table, column, CellAlignment::Right);
    }
    for (label, counts) in [("Entities", entities), ("Cells", cells)] {
        table.add_row(vec![
            kind_cell(label),
            dim_or_plain(counts.text),
            dim_or_plain(counts.vision),
            dim_or_plain(counts.both),
            Cell::new(counts.total()).add_attribute(Attribute::Bold),
        ]);
    }
    println!();
    println!("{table}");
}

fn print_validation(report: &ValidationReport) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Category"),
        header_cell("Status"),
        header_cell("Errors"),
        header_cell("Warnings"),
        header_cell("Checked"),
        header_cell("Score"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    for column in 2..=5 {
        align_column(&mut table, column, CellAlignment::Right);
    }
    for result in &report.categories {
        table.add_row(vec![
            kind_cell(result.category.label()),
            status_cell(result.passed),
            count_cell(result.errors, Color::Red),
            count_cell(result.warnings, Color::Yellow),
            Cell::new(result.checked),
            Cell::new(format!("{:.1}%", result.score * 100.0)),
        ]);
    }
    println!();
    println!("{table}");
    println!(
        "Completeness: {:.1}%  Linkage: {:.1}% ({}/{} references)",
        report.scores.weighted_completeness * 100.0,
        report.scores.linkage_accuracy * 100.0,
        report.scores.references_resolved,
        report.scores.references_total
    );
    print_violation_table(&report.violations, report.truncated);
}

fn print_violation_table(violations: &[ValidationViolation], truncated: bool) {
    if violations.is_empty() {
        return;
    }
    let mut ordered: Vec<&ValidationViolation> = violations.iter().collect();
    ordered.sort_by_key(|v| (severity_rank(v.severity), v.rule_id));
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Severity"),
        header_cell("Rule"),
        header_cell("Entity"),
        header_cell("Field"),
        header_cell("Message"),
    ]);
    apply_issue_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Center);
    align_column(&mut table, 1, CellAlignment::Center);
    for violation in ordered {
        table.add_row(vec![
            severity_cell(violation.severity),
            Cell::new(violation.rule_id),
            Cell::new(violation.entity_id.as_deref().unwrap_or("-")),
            Cell::new(violation.field.unwrap_or("-")),
            Cell::new(&violation.message),
        ]);
    }
    println!();
    println!("Violations:");
    println!("{table}");
    if truncated {
        println!("(violation list truncated at the configured cap)");
    }
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(100);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(100);
}

fn apply_issue_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(160);
    if table.column_count() >= 5 {
        table.set_constraints(vec![
            ColumnConstraint::UpperBoundary(Width::Fixed(9)),
            ColumnConstraint::UpperBoundary(Width::Fixed(10)),
            ColumnConstraint::UpperBoundary(Width::Fixed(16)),
            ColumnConstraint::UpperBoundary(Width::Fixed(20)),
            ColumnConstraint::UpperBoundary(Width::Percentage(60)),
        ]);
    }
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn severity_rank(severity: Severity) -> u8 {
    match severity {
        Severity::Error => 0,
        Severity::Warning => 1,
    }
}

fn severity_cell(severity: Severity) -> Cell {
    match severity {
        Severity::Error => Cell::new("ERROR").fg(Color::Red),
        Severity::Warning => Cell::new("WARN").fg(Color::Yellow),
    }
}

fn status_cell(passed: bool) -> Cell {
    if passed {
        Cell::new("✓").fg(Color::Green).add_attribute(Attribute::Bold)
    } else {
        Cell::new("✗").fg(Color::Red).add_attribute(Attribute::Bold)
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn dim_or_plain(count: usize) -> Cell {
    if count > 0 {
        Cell::new(count)
    } else {
        dim_cell(count)
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn kind_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Blue)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

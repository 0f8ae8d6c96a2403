//! Plain-text cutting plan.

use crate::types::{OptimizationOutcome, OptimizerError, PackingResult, Result, Sheet};
use std::collections::BTreeMap;

/// Characters in a sheet's usage bar
pub const DEFAULT_BAR_WIDTH: usize = 50;

/// Widest usage bar accepted from callers
pub const MAX_BAR_WIDTH: usize = 1000;

/// Text rendered when there is nothing to cut
pub const EMPTY_REPORT: &str = "No pieces to optimize.";

const FILLED: char = '█';
const EMPTY: char = '░';
const DOUBLE_RULE: &str = "======================================";
const SINGLE_RULE: &str = "--------------------------------------";

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub bar_width: usize,
}

impl ReportOptions {
    /// Options with a caller-supplied bar width, rejecting widths above
    /// [`MAX_BAR_WIDTH`].
    pub fn with_bar_width(bar_width: usize) -> Result<Self> {
        if bar_width > MAX_BAR_WIDTH {
            return Err(OptimizerError::InvalidInput(format!(
                "bar width must be at most {}, got {}",
                MAX_BAR_WIDTH, bar_width
            )));
        }
        Ok(Self { bar_width })
    }
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            bar_width: DEFAULT_BAR_WIDTH,
        }
    }
}

/// Counts cuts per width, widest first.
pub fn group_cuts(cuts: &[u32]) -> Vec<(u32, usize)> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for &width in cuts {
        *counts.entry(width).or_insert(0) += 1;
    }
    counts.into_iter().rev().collect()
}

/// Renders grouped cuts as `500×2 // 110×1`.
pub fn format_cut_groups(cuts: &[u32]) -> String {
    group_cuts(cuts)
        .into_iter()
        .map(|(width, count)| format!("{}×{}", width, count))
        .collect::<Vec<_>>()
        .join(" // ")
}

/// Proportional bar `|███░░|` whose inner length is always `bar_width`.
pub fn usage_bar(used_width: u64, capacity: u32, bar_width: usize) -> String {
    let filled = if capacity == 0 {
        0
    } else {
        let ratio = used_width as f64 / capacity as f64;
        ((ratio * bar_width as f64).round() as usize).min(bar_width)
    };

    let mut bar = String::from("|");
    bar.extend(std::iter::repeat(FILLED).take(filled));
    bar.extend(std::iter::repeat(EMPTY).take(bar_width - filled));
    bar.push('|');
    bar
}

fn sheet_line(number: usize, sheet: &Sheet, capacity: u32) -> String {
    format!(
        "Sheet {:<2}: [{}]  ->  Used: {}mm | Leftover: {}mm (Util: {:.2}%)",
        number,
        format_cut_groups(&sheet.cuts),
        sheet.used_width,
        (capacity as u64).saturating_sub(sheet.used_width),
        sheet.utilization(capacity)
    )
}

/// Renders the cutting plan for `result` on sheets of `capacity` mm.
pub fn format_result(result: &PackingResult, capacity: u32, options: &ReportOptions) -> String {
    if result.is_empty() {
        return EMPTY_REPORT.to_string();
    }

    let mut lines = vec![
        DOUBLE_RULE.to_string(),
        "==         FINAL CUTTING PLAN       ==".to_string(),
        DOUBLE_RULE.to_string(),
        format!(
            "  Overall utilization..: {:.2}%",
            result.utilization_percent
        ),
        format!("  Total sheets.........: {}", result.sheet_count),
        format!("{}\n", SINGLE_RULE),
    ];

    for (idx, sheet) in result.sheets.iter().enumerate() {
        lines.push(sheet_line(idx + 1, sheet, capacity));
        lines.push(format!(
            "          {}\n",
            usage_bar(sheet.used_width, capacity, options.bar_width)
        ));
    }

    lines.join("\n")
}

/// Renders an optimization outcome: a banner when the plan came from history,
/// the plan itself, and a warning when the target was missed.
pub fn format_outcome(outcome: &OptimizationOutcome, options: &ReportOptions) -> String {
    let plan = format_result(&outcome.result, outcome.capacity, options);
    if outcome.result.is_empty() {
        return plan;
    }

    let mut report = String::new();
    if outcome.from_history {
        report.push_str(&format!(
            "--- Solution (algorithm: {}) found in history ---\n",
            outcome.algorithm.tag().to_uppercase()
        ));
    }
    report.push_str(&plan);

    if !outcome.target_met {
        report.push_str(&format!(
            "\n\n{}\nWARNING: the {}% utilization target was not met.\nBest utilization found: {:.2}%",
            SINGLE_RULE, outcome.target, outcome.result.utilization_percent
        ));
    }

    report
}

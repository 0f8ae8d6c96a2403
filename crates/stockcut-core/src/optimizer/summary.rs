use super::packing::OpenSheet;
use crate::types::{PackingResult, Sheet};

/// Closes the open sheets and computes sheet count, leftovers and utilization.
pub(super) fn summarize(sheets: Vec<OpenSheet>, capacity: u32) -> PackingResult {
    if sheets.is_empty() {
        return PackingResult::empty();
    }

    let capacity_mm = capacity as u64;
    let sheet_count = sheets.len();
    let total_used: u64 = sheets.iter().map(|s| s.used).sum();
    let total_capacity = sheet_count as u64 * capacity_mm;
    let utilization_percent = if total_capacity > 0 {
        (total_used as f64 / total_capacity as f64) * 100.0
    } else {
        0.0
    };

    let sheets = sheets
        .into_iter()
        .map(|sheet| Sheet {
            used_width: sheet.used,
            leftover: capacity_mm.saturating_sub(sheet.used),
            cuts: sheet.cuts,
        })
        .collect();

    PackingResult {
        sheet_count,
        utilization_percent,
        sheets,
    }
}

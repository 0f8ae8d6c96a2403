use super::summary::summarize;
use crate::types::PackingResult;

/// A sheet while pieces are still being assigned to it.
#[derive(Debug, Clone)]
pub(super) struct OpenSheet {
    pub used: u64,
    pub cuts: Vec<u32>,
}

impl OpenSheet {
    fn with_piece(piece: u32) -> Self {
        Self {
            used: piece as u64,
            cuts: vec![piece],
        }
    }

    fn remaining(&self, capacity: u64) -> u64 {
        capacity.saturating_sub(self.used)
    }

    fn push(&mut self, piece: u32) {
        self.used += piece as u64;
        self.cuts.push(piece);
    }
}

/// Places each piece, in input order, on the open sheet whose remaining
/// capacity is the smallest one that still fits it. Ties go to the sheet
/// opened first. A piece that fits nowhere opens a new sheet.
///
/// Every piece must be no wider than `capacity`.
pub fn best_fit(pieces: &[u32], capacity: u32) -> PackingResult {
    let capacity_mm = capacity as u64;
    let mut sheets: Vec<OpenSheet> = Vec::new();

    for &piece in pieces {
        debug_assert!(piece <= capacity, "piece {} wider than sheet", piece);
        let piece_mm = piece as u64;
        let mut best: Option<(usize, u64)> = None;

        for (idx, sheet) in sheets.iter().enumerate() {
            let free = sheet.remaining(capacity_mm);
            if piece_mm > free {
                continue;
            }
            match best {
                // Strictly smaller wins, so the lowest index keeps ties
                Some((_, best_free)) if free >= best_free => {}
                _ => best = Some((idx, free)),
            }
        }

        match best {
            Some((idx, _)) => sheets[idx].push(piece),
            None => sheets.push(OpenSheet::with_piece(piece)),
        }
    }

    summarize(sheets, capacity)
}

/// Places each piece, in input order, on the first open sheet with enough
/// room, opening a new sheet when none has.
///
/// This is the placement pass of first-fit-decreasing; callers that want FFD
/// pass pieces sorted by width descending (see [`first_fit_decreasing`]).
pub fn first_fit(pieces: &[u32], capacity: u32) -> PackingResult {
    let capacity_mm = capacity as u64;
    let mut sheets: Vec<OpenSheet> = Vec::new();

    for &piece in pieces {
        debug_assert!(piece <= capacity, "piece {} wider than sheet", piece);
        let piece_mm = piece as u64;

        match sheets
            .iter_mut()
            .find(|sheet| sheet.remaining(capacity_mm) >= piece_mm)
        {
            Some(sheet) => sheet.push(piece),
            None => sheets.push(OpenSheet::with_piece(piece)),
        }
    }

    summarize(sheets, capacity)
}

/// Sorts a copy of `pieces` by width descending and runs [`first_fit`].
pub fn first_fit_decreasing(pieces: &[u32], capacity: u32) -> PackingResult {
    let mut sorted = pieces.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    first_fit(&sorted, capacity)
}

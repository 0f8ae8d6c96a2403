use super::packing::best_fit;
use crate::types::PackingResult;
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Number of shuffled orderings tried after the two sorted ones.
pub const SHUFFLE_COUNT: usize = 8;

/// Piece ordering fed to best-fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Descending,
    Ascending,
    /// Random permutation, numbered from 1
    Shuffled(usize),
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Descending => f.write_str("descending"),
            Strategy::Ascending => f.write_str("ascending"),
            Strategy::Shuffled(n) => write!(f, "shuffle #{}", n),
        }
    }
}

/// An ordering of the flattened demand and where it came from
#[derive(Debug, Clone)]
pub struct Candidate {
    pub strategy: Strategy,
    pub pieces: Vec<u32>,
}

/// Best result found by a search
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub result: PackingResult,
    /// Ordering that produced `result`
    pub strategy: Strategy,
    /// How many candidates were packed before the search stopped
    pub evaluated: usize,
}

/// Builds the fixed candidate list: descending, ascending, then
/// [`SHUFFLE_COUNT`] shuffles drawn from `rng` in order.
pub fn candidate_orderings<R: Rng + ?Sized>(pieces: &[u32], rng: &mut R) -> Vec<Candidate> {
    let mut descending = pieces.to_vec();
    descending.sort_unstable_by(|a, b| b.cmp(a));
    let mut ascending = pieces.to_vec();
    ascending.sort_unstable();

    let mut candidates = Vec::with_capacity(2 + SHUFFLE_COUNT);
    candidates.push(Candidate {
        strategy: Strategy::Descending,
        pieces: descending,
    });
    candidates.push(Candidate {
        strategy: Strategy::Ascending,
        pieces: ascending,
    });

    for n in 1..=SHUFFLE_COUNT {
        let mut shuffled = pieces.to_vec();
        shuffled.shuffle(rng);
        candidates.push(Candidate {
            strategy: Strategy::Shuffled(n),
            pieces: shuffled,
        });
    }

    candidates
}

/// Packs candidates in order and keeps the best utilization.
///
/// A later candidate replaces the incumbent only when strictly better. The
/// search stops as soon as the incumbent reaches `target`.
pub fn select_best(candidates: &[Candidate], capacity: u32, target: f64) -> Option<SearchOutcome> {
    let results = candidates.iter().enumerate().map(|(idx, candidate)| {
        let result = best_fit(&candidate.pieces, capacity);
        debug!(
            strategy = %candidate.strategy,
            sheets = result.sheet_count,
            utilization = result.utilization_percent,
            "evaluated candidate ordering"
        );
        (idx, result)
    });

    keep_best(results, target).map(|(idx, result, evaluated)| SearchOutcome {
        result,
        strategy: candidates[idx].strategy,
        evaluated,
    })
}

/// Same selection as [`select_best`] with candidates packed on the rayon pool.
///
/// Once a candidate reaches `target`, candidates after it are skipped. The
/// reduction walks results in candidate order, so the winner and the
/// evaluated count match the sequential search.
pub fn select_best_parallel(
    candidates: &[Candidate],
    capacity: u32,
    target: f64,
) -> Option<SearchOutcome> {
    let cutoff = AtomicUsize::new(usize::MAX);

    let results: Vec<Option<PackingResult>> = candidates
        .par_iter()
        .enumerate()
        .map(|(idx, candidate)| {
            if idx > cutoff.load(Ordering::Relaxed) {
                return None;
            }
            let result = best_fit(&candidate.pieces, capacity);
            if result.meets(target) {
                cutoff.fetch_min(idx, Ordering::Relaxed);
            }
            Some(result)
        })
        .collect();

    // Skipped slots only ever follow the first candidate that met the
    // target, where the sequential walk stops anyway.
    let ordered = results
        .into_iter()
        .enumerate()
        .map_while(|(idx, result)| result.map(|r| (idx, r)));

    keep_best(ordered, target).map(|(idx, result, evaluated)| SearchOutcome {
        result,
        strategy: candidates[idx].strategy,
        evaluated,
    })
}

/// Returns the winning index, its result and the number of results consumed.
fn keep_best<I>(results: I, target: f64) -> Option<(usize, PackingResult, usize)>
where
    I: IntoIterator<Item = (usize, PackingResult)>,
{
    let mut best: Option<(usize, PackingResult)> = None;
    let mut evaluated = 0;

    for (idx, result) in results {
        evaluated += 1;
        let replace = match &best {
            None => true,
            Some((_, incumbent)) => result.utilization_percent > incumbent.utilization_percent,
        };
        if replace {
            best = Some((idx, result));
        }
        if matches!(&best, Some((_, incumbent)) if incumbent.meets(target)) {
            break;
        }
    }

    best.map(|(idx, result)| (idx, result, evaluated))
}

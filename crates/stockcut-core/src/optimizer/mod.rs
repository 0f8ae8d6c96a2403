use crate::history::HistoryStore;
use crate::types::*;
use rand::rngs::StdRng;
use rand::{thread_rng, Rng, SeedableRng};
use tracing::{debug, info};

mod packing;
mod strategy;
mod summary;

pub use packing::{best_fit, first_fit, first_fit_decreasing};
pub use strategy::{
    candidate_orderings, select_best, select_best_parallel, Candidate, SearchOutcome, Strategy,
    SHUFFLE_COUNT,
};

/// Packs a one-dimensional piece demand onto fixed-width sheets.
pub struct Optimizer {
    request: OptimizationRequest,
}

impl Optimizer {
    /// Validates the request and builds a new optimizer instance.
    pub fn new(request: OptimizationRequest) -> Result<Self> {
        if request.capacity == 0 {
            return Err(OptimizerError::InvalidCapacity(request.capacity));
        }

        if !request.target.is_finite() || request.target < 0.0 {
            return Err(OptimizerError::InvalidInput(format!(
                "utilization target must be a non-negative percentage, got {}",
                request.target
            )));
        }

        request.demand.validate()?;

        if let Some(width) = request.demand.max_width() {
            if width > request.capacity {
                return Err(OptimizerError::PieceTooWide {
                    width,
                    capacity: request.capacity,
                });
            }
        }

        Ok(Self { request })
    }

    /// Cache key of this request's demand and algorithm.
    pub fn signature(&self) -> Result<String> {
        self.request
            .demand
            .canonical_signature(self.request.algorithm)
    }

    /// Runs the search with the request's seed, or thread-local entropy when
    /// no seed is set.
    pub fn search(&self) -> SearchOutcome {
        match self.request.seed {
            Some(seed) => self.search_with_rng(&mut StdRng::seed_from_u64(seed)),
            None => self.search_with_rng(&mut thread_rng()),
        }
    }

    /// Runs the selected heuristic, drawing shuffled orderings from `rng`.
    pub fn search_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> SearchOutcome {
        let pieces = self.request.demand.flatten();
        let capacity = self.request.capacity;

        match self.request.algorithm {
            Algorithm::Ffd => SearchOutcome {
                result: first_fit_decreasing(&pieces, capacity),
                strategy: Strategy::Descending,
                evaluated: 1,
            },
            Algorithm::BestFit => {
                let candidates = candidate_orderings(&pieces, rng);
                let best = if self.request.parallel {
                    select_best_parallel(&candidates, capacity, self.request.target)
                } else {
                    select_best(&candidates, capacity, self.request.target)
                };
                // The candidate list is never empty
                best.unwrap_or(SearchOutcome {
                    result: PackingResult::empty(),
                    strategy: Strategy::Descending,
                    evaluated: 0,
                })
            }
        }
    }

    /// Executes the full flow: reuse an excellent stored result, or search and
    /// record the new result when it improves on history.
    pub fn run<S: HistoryStore + ?Sized>(&self, store: &mut S) -> Result<OptimizationOutcome> {
        let signature = self.signature()?;
        let target = self.request.target;

        if self.request.demand.is_empty() {
            return Ok(self.outcome(signature, PackingResult::empty(), false));
        }

        store.refresh();
        if let Some(record) = store.lookup(&signature) {
            if record.result.meets(target) {
                info!(
                    %signature,
                    utilization = record.result.utilization_percent,
                    "reusing stored solution"
                );
                return Ok(self.outcome(signature, record.result, true));
            }
            debug!(
                %signature,
                utilization = record.result.utilization_percent,
                "stored solution is below target, searching again"
            );
        }

        let search = self.search();
        info!(
            %signature,
            strategy = %search.strategy,
            evaluated = search.evaluated,
            sheets = search.result.sheet_count,
            utilization = search.result.utilization_percent,
            "search complete"
        );

        if store.record_if_better(&signature, &search.result)? {
            info!(%signature, "recorded new best solution");
        }

        Ok(self.outcome(signature, search.result, false))
    }

    fn outcome(
        &self,
        signature: String,
        result: PackingResult,
        from_history: bool,
    ) -> OptimizationOutcome {
        OptimizationOutcome {
            signature,
            algorithm: self.request.algorithm,
            capacity: self.request.capacity,
            target: self.request.target,
            target_met: result.meets(self.request.target),
            result,
            from_history,
        }
    }
}

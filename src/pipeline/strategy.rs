/*!
Fit strategy

Pure decision logic for a projection run, kept free of stores and engines
so the rules stay unit-testable.

## Decision rules

A run transforms incrementally, reusing the stored reducer, only when all
three hold:

1. a reducer is stored for the collection,
2. the request addresses a memory batch (not the whole collection),
3. the stored reducer trained on at least `sample_size` vectors.

Everything else refits from scratch. Rule 3 exists because a reducer
fitted on a small early collection embeds later vectors poorly; refitting
keeps absorbing data until the training sample reaches the cap, after
which the model is considered stable enough to extend.

Full-refit input handling: shuffle, then split at the cap. The fit sample
is the first `sample_size` records post-shuffle, the remainder is
transformed through the freshly fitted model. Shuffling first keeps the
sample unbiased by ingestion order.
*/

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::stores::Reducer;
use crate::types::{EmbeddingRecord, FitMode, MemoryId};

/// Resolved plan for one run.
#[derive(Debug)]
pub enum FitPlan {
    /// Reuse the stored reducer; only the addressed batch is transformed.
    Incremental(Reducer),
    /// Fit a fresh reducer over the whole collection.
    FullRefit,
}

impl FitPlan {
    /// The mode this plan reports.
    pub fn mode(&self) -> FitMode {
        match self {
            FitPlan::Incremental(_) => FitMode::Incremental,
            FitPlan::FullRefit => FitMode::FullRefit,
        }
    }
}

/// Decide how the run fits (see the module docs for the rules).
pub fn plan_fit(
    reducer: Option<Reducer>,
    memory_id: Option<MemoryId>,
    sample_size: usize,
) -> FitPlan {
    match (reducer, memory_id) {
        (Some(reducer), Some(_)) if reducer.trained_on_count >= sample_size => {
            FitPlan::Incremental(reducer)
        }
        _ => FitPlan::FullRefit,
    }
}

/// Shuffle records in place, seeded when `seed` is set (tests pin the
/// permutation this way).
pub fn shuffle_records(records: &mut [EmbeddingRecord], seed: Option<u64>) {
    match seed {
        Some(seed) => records.shuffle(&mut StdRng::seed_from_u64(seed)),
        None => records.shuffle(&mut rand::rng()),
    }
}

/// Split into `(fit_sample, remainder)` at `cap`. Order is preserved on
/// both sides; collections at or under the cap keep everything in the
/// sample.
pub fn split_fit_sample(
    mut records: Vec<EmbeddingRecord>,
    cap: usize,
) -> (Vec<EmbeddingRecord>, Vec<EmbeddingRecord>) {
    if records.len() <= cap {
        return (records, Vec::new());
    }
    let remainder = records.split_off(cap);
    (records, remainder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectionParams;
    use crate::engine::{MODEL_SCHEMA_VERSION, ReducerModel};
    use proptest::prelude::*;

    fn reducer_trained_on(count: usize) -> Reducer {
        let model = ReducerModel {
            schema_version: MODEL_SCHEMA_VERSION,
            engine: "test-engine".into(),
            input_dim: 4,
            output_dim: 2,
            state: serde_json::Value::Null,
        };
        Reducer::new(model, count, ProjectionParams::default())
    }

    fn record(id: &str) -> EmbeddingRecord {
        EmbeddingRecord::new(id, "notes", vec![0.0, 1.0])
    }

    #[test]
    fn no_reducer_means_full_refit() {
        let plan = plan_fit(None, MemoryId::new(7), 1500);
        assert!(matches!(plan, FitPlan::FullRefit));
    }

    #[test]
    fn whole_collection_request_always_refits() {
        let plan = plan_fit(Some(reducer_trained_on(1500)), None, 1500);
        assert!(matches!(plan, FitPlan::FullRefit));
    }

    #[test]
    fn undertrained_reducer_refits_even_for_a_batch() {
        let plan = plan_fit(Some(reducer_trained_on(1499)), MemoryId::new(7), 1500);
        assert!(matches!(plan, FitPlan::FullRefit));
    }

    #[test]
    fn trained_at_cap_plus_batch_goes_incremental() {
        let plan = plan_fit(Some(reducer_trained_on(1500)), MemoryId::new(7), 1500);
        assert_eq!(plan.mode(), FitMode::Incremental);
    }

    #[test]
    fn seeded_shuffle_is_deterministic() {
        let mut a: Vec<_> = (0..64).map(|i| record(&format!("c{i}"))).collect();
        let mut b = a.clone();
        shuffle_records(&mut a, Some(42));
        shuffle_records(&mut b, Some(42));
        let ids_a: Vec<_> = a.iter().map(|r| r.id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn split_under_cap_keeps_everything_in_sample() {
        let records: Vec<_> = (0..10).map(|i| record(&format!("c{i}"))).collect();
        let (sample, remainder) = split_fit_sample(records, 1500);
        assert_eq!(sample.len(), 10);
        assert!(remainder.is_empty());
    }

    #[test]
    fn split_over_cap_preserves_order_across_the_seam() {
        let records: Vec<_> = (0..30).map(|i| record(&format!("c{i:02}"))).collect();
        let (sample, remainder) = split_fit_sample(records, 20);
        assert_eq!(sample.len(), 20);
        assert_eq!(remainder.len(), 10);
        assert_eq!(sample.last().map(|r| r.id.as_str()), Some("c19"));
        assert_eq!(remainder.first().map(|r| r.id.as_str()), Some("c20"));
    }

    proptest! {
        #[test]
        fn shuffle_preserves_the_record_multiset(seed in any::<u64>(), len in 0usize..128) {
            let mut records: Vec<_> = (0..len).map(|i| record(&format!("c{i}"))).collect();
            let mut expected: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
            shuffle_records(&mut records, Some(seed));
            let mut shuffled: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
            expected.sort();
            shuffled.sort();
            prop_assert_eq!(shuffled, expected);
        }
    }
}

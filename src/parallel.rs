use crate::aggregate::Aggregator;
use crate::db::ReferenceDatabase;
use crate::error::Ja4CorrelateError;
use crate::matcher::Matcher;
use crate::record::RecordInput;
use std::num::NonZeroUsize;
use tracing::debug;

/// Matches `inputs` on up to `workers` threads and merges the partial summaries.
///
/// Inputs are split into contiguous batches, one per worker. Each worker folds its batch
/// into its own [`Aggregator`] against the shared, read-only database; partial summaries
/// are merged in batch order, so the result equals a sequential run over `inputs`,
/// samples included.
///
/// # Errors
///
/// Returns an error if `workers` is 0, a worker thread cannot be spawned, or a worker panics.
pub fn correlate_batches(
    database: &ReferenceDatabase,
    inputs: &[RecordInput],
    workers: usize,
    sample_limit: usize,
) -> Result<Aggregator, Ja4CorrelateError> {
    let workers = NonZeroUsize::new(workers).ok_or_else(|| {
        Ja4CorrelateError::Misconfiguration("Worker count must be greater than 0".to_string())
    })?;

    if inputs.is_empty() {
        return Ok(Aggregator::new(sample_limit));
    }

    let batch_size = inputs.len().div_ceil(workers.get()).max(1);
    debug!(
        "Correlating {} records: {} workers, batch size {}",
        inputs.len(),
        workers,
        batch_size
    );

    let partials = crossbeam::thread::scope(
        |scope| -> Result<Vec<Aggregator>, Ja4CorrelateError> {
            let mut handles = Vec::with_capacity(workers.get());
            for (worker_id, batch) in inputs.chunks(batch_size).enumerate() {
                let handle = scope
                    .builder()
                    .name(format!("ja4-worker-{worker_id}"))
                    .spawn(move |_| {
                        debug!("Worker {} started with {} records", worker_id, batch.len());
                        let matcher = Matcher::new(database);
                        let mut aggregator = Aggregator::new(sample_limit);
                        for input in batch {
                            aggregator.ingest(&matcher, input);
                        }
                        debug!("Worker {} stopped", worker_id);
                        aggregator
                    })
                    .map_err(|e| {
                        Ja4CorrelateError::Worker(format!("Failed to spawn worker thread: {e}"))
                    })?;
                handles.push(handle);
            }

            handles
                .into_iter()
                .enumerate()
                .map(|(worker_id, handle)| {
                    handle.join().map_err(|_| {
                        Ja4CorrelateError::Worker(format!("worker {worker_id} panicked"))
                    })
                })
                .collect()
        },
    )
    .map_err(|_| Ja4CorrelateError::Worker("worker pool panicked".to_string()))??;

    let mut merged = Aggregator::new(sample_limit);
    for partial in partials {
        merged.merge(partial);
    }
    Ok(merged)
}

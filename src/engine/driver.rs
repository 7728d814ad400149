//! The parallel row driver.
//!
//! Population rows are partitioned into contiguous shards, one worker
//! thread per shard. Each worker owns its [`RowBuilder`], its row cache and
//! its shard writer; the output rows are disjoint so no locks are taken on
//! the hot path. Shard 0 additionally emits periodic progress events; an
//! error from another shard only surfaces if shard 0 did not fail first.
//!
//! Cancellation is cooperative: a shared flag checked at the row-loop
//! boundary aborts the build with [`RelPropError::Cancelled`].

use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

use crate::engine::builder::{BuildContext, LOG_ITER, RowBuilder, flush_cache};
use crate::engine::matrix::{FeatureMatrix, ShardWriter};
use crate::error::{RelPropError, Result};

/// Inputs of one driven build.
pub struct DriveParams<'a> {
    pub ctx: &'a BuildContext<'a>,
    /// Number of population view rows to build.
    pub nrows: usize,
    pub num_threads: usize,
    /// Back the output matrix with a memory-mapped temp file in this
    /// directory instead of the heap.
    pub temp_dir: Option<&'a Path>,
    /// Whether shard 0 emits progress events (off for scoring batches).
    pub log_progress: bool,
}

/// Contiguous shard ranges covering `0..nrows`, one per thread. The last
/// shard absorbs the remainder.
pub fn shard_ranges(nrows: usize, num_threads: usize) -> Vec<Range<usize>> {
    let num_threads = num_threads.max(1);

    let mut rows_per_thread = 0usize;
    loop {
        let remaining = nrows - rows_per_thread * num_threads;
        rows_per_thread += remaining / num_threads;
        if remaining < num_threads {
            break;
        }
    }

    (0..num_threads)
        .map(|t| {
            let begin = t * rows_per_thread;
            let end = if t + 1 < num_threads {
                (t + 1) * rows_per_thread
            } else {
                nrows
            };
            begin..end
        })
        .collect()
}

/// Build the full feature matrix across worker threads and join them all
/// before returning. The first error wins, with shard 0 taking precedence;
/// worker panics surface as internal errors.
pub fn drive(params: DriveParams<'_>) -> Result<FeatureMatrix> {
    let ncols = params.ctx.index.len();
    let mut matrix = FeatureMatrix::new(params.nrows, ncols, params.temp_dir)?;

    if params.nrows == 0 || ncols == 0 {
        return Ok(matrix);
    }

    let ranges = shard_ranges(params.nrows, params.num_threads);
    let writers = matrix.shard_writers(&ranges)?;
    let num_completed = AtomicUsize::new(0);

    let mut results: Vec<Result<()>> = Vec::with_capacity(writers.len());

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(writers.len());

        for (shard, writer) in writers.into_iter().enumerate() {
            let num_completed = &num_completed;
            let ctx = params.ctx;
            let log = params.log_progress && shard == 0;
            let total = params.nrows;

            handles.push(scope.spawn(move || {
                build_shard(ctx, writer, num_completed, log, total)
            }));
        }

        for handle in handles {
            results.push(match handle.join() {
                Ok(result) => result,
                Err(_) => Err(RelPropError::Internal(
                    "worker thread panicked".to_string(),
                )),
            });
        }
    });

    // Shard 0's error takes precedence over the other shards'.
    let mut iter = results.into_iter();
    if let Some(first) = iter.next() {
        first?;
    }
    for result in iter {
        result?;
    }

    Ok(matrix)
}

fn build_shard(
    ctx: &BuildContext<'_>,
    mut writer: ShardWriter<'_>,
    num_completed: &AtomicUsize,
    log_progress: bool,
    total_rows: usize,
) -> Result<()> {
    let rows: Vec<usize> = writer.rows().collect();
    if rows.is_empty() {
        return Ok(());
    }

    let ncols = ctx.index.len();
    let cache_rows = LOG_ITER.min(rows.len());
    let mut cache = vec![0.0f64; cache_rows * ncols];
    let mut builder = RowBuilder::new(ctx);
    let mut flushed = 0usize;

    for (i, &row) in rows.iter().enumerate() {
        if i % LOG_ITER == 0 && i != 0 {
            flush_cache(&cache, ncols, &rows, flushed, &mut writer);
            flushed = i;
            num_completed.fetch_add(LOG_ITER, Ordering::Relaxed);
            if log_progress {
                log_rows_built(num_completed.load(Ordering::Relaxed), total_rows);
            }
        }

        if ctx.cancelled() {
            return Err(RelPropError::Cancelled);
        }

        let slot = (i % LOG_ITER) * ncols;
        builder.build_row(row, &mut cache[slot..slot + ncols])?;
    }

    flush_cache(&cache, ncols, &rows, flushed, &mut writer);
    num_completed.fetch_add(rows.len() - flushed, Ordering::Relaxed);
    if log_progress {
        log_rows_built(num_completed.load(Ordering::Relaxed), total_rows);
    }

    Ok(())
}

fn log_rows_built(completed: usize, total: usize) {
    let progress = if total == 0 {
        100
    } else {
        (completed * 100) / total
    };
    info!(rows = completed, progress_pct = progress, "built rows");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_ranges_cover_exactly() {
        for (nrows, threads) in [(10, 3), (100, 7), (5, 5), (4, 8), (0, 2), (1, 1)] {
            let ranges = shard_ranges(nrows, threads);
            assert_eq!(ranges.len(), threads.max(1));
            let mut covered = 0;
            let mut expected_start = 0;
            for r in &ranges {
                assert_eq!(r.start, expected_start);
                expected_start = r.end;
                covered += r.len();
            }
            assert_eq!(covered, nrows, "nrows {nrows} threads {threads}");
            assert_eq!(ranges.last().map(|r| r.end), Some(nrows));
        }
    }

    #[test]
    fn test_shard_ranges_are_balanced() {
        let ranges = shard_ranges(100, 4);
        assert_eq!(ranges, vec![0..25, 25..50, 50..75, 75..100]);
    }

    #[test]
    fn test_more_threads_than_rows() {
        let ranges = shard_ranges(2, 4);
        let covered: usize = ranges.iter().map(|r| r.len()).sum();
        assert_eq!(covered, 2);
    }
}

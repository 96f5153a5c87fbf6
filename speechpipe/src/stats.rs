//! Corpus-wide mean/variance statistics pass.

use crate::error::Result;
use crate::mvn::MeanVarStats;
use crate::pipe::DataPipe;
use crate::view::DatasetView;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::thread;

/// Accumulate feature statistics over every sample of `view`.
///
/// Batches of `batch_size` are dealt round-robin to `num_workers` scoped
/// threads. Worker `w` draws from `StdRng::seed_from_u64(seed + w)` and keeps
/// its own partial stats; partials are merged in worker order on the calling
/// thread, so results depend only on the seed and worker count.
///
/// # Errors
///
/// Returns the first error in worker order.
pub fn compute_mean_var_stats(
    view: &DatasetView<'_>,
    pipe: &DataPipe,
    batch_size: usize,
    num_workers: usize,
    seed: u64,
) -> Result<MeanVarStats> {
    let num_workers = num_workers.max(1);
    let batches: Vec<_> = view.batches(batch_size).collect();

    tracing::info!(
        samples = view.len(),
        batches = batches.len(),
        workers = num_workers,
        stages = ?pipe.stages(),
        "computing mean/var stats"
    );

    let partials: Vec<Result<MeanVarStats>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..num_workers)
            .map(|worker| {
                let assigned: Vec<_> = batches
                    .iter()
                    .skip(worker)
                    .step_by(num_workers)
                    .cloned()
                    .collect();

                scope.spawn(move || -> Result<MeanVarStats> {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(worker as u64));
                    let mut stats = MeanVarStats::new();

                    for mut samples in assigned {
                        let batch = pipe.process(&mut samples, &mut rng)?;
                        for sample in &batch.samples {
                            stats.accumulate(sample.feature.view())?;
                        }
                        tracing::debug!(worker, frames = batch.num_frames, "batch accumulated");
                    }

                    Ok(stats)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let mut stats = MeanVarStats::new();
    for partial in partials {
        stats.merge(&partial?)?;
    }

    tracing::info!(frames = stats.n, dim = ?stats.dim(), "mean/var stats computed");

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::write_wav;
    use crate::dataset::Dataset;
    use crate::fbank::FbankExtractor;
    use crate::sample::{FLOAT_INF, Sample};

    fn dataset(dir: &std::path::Path, lengths: &[usize]) -> Dataset {
        let samples = lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                let path = dir.join(format!("{i}.wav"));
                let wave: Vec<f32> = (0..len)
                    .map(|t| ((t * (i + 3)) % 40) as f32 / 40.0 - 0.5)
                    .collect();
                write_wav(&path, 16000, 1, &wave);
                Sample {
                    id: format!("utt{i}"),
                    audio: path,
                    begin: 0.0,
                    duration: FLOAT_INF,
                    text: String::new(),
                    speaker: String::new(),
                }
            })
            .collect();
        Dataset::from_samples(samples)
    }

    #[test]
    fn counts_every_frame_once() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dataset(dir.path(), &[1600, 3200, 400, 8000, 4000]);
        let view = DatasetView::new(&dataset);
        let fbank = FbankExtractor::new(23, 0.0);
        let pipe = DataPipe::new().with_feature_extractor(fbank.clone());

        let stats = compute_mean_var_stats(&view, &pipe, 2, 3, 0).unwrap();

        let expected: usize = [1600, 3200, 400, 8000, 4000]
            .iter()
            .map(|&n| fbank.num_frames(n, 16000))
            .sum();
        assert_eq!(stats.n as usize, expected);
        assert_eq!(stats.dim(), Some(23));
    }

    #[test]
    fn worker_count_does_not_change_deterministic_stats() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dataset(dir.path(), &[1600, 3200, 2400, 800]);
        let view = DatasetView::new(&dataset);
        let pipe = DataPipe::new().with_feature_extractor(FbankExtractor::new(10, 0.0));

        let one = compute_mean_var_stats(&view, &pipe, 1, 1, 5).unwrap();
        let four = compute_mean_var_stats(&view, &pipe, 1, 4, 5).unwrap();

        assert_eq!(one.n, four.n);
        for (a, b) in one.o1_sum.iter().zip(&four.o1_sum) {
            assert!((a - b).abs() < 1e-6 * a.abs().max(1.0));
        }
    }

    #[test]
    fn same_seed_reproduces_dithered_stats() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dataset(dir.path(), &[1600, 3200, 2400]);
        let view = DatasetView::new(&dataset);
        let pipe = DataPipe::new().with_feature_extractor(FbankExtractor::new(10, 1.0));

        let a = compute_mean_var_stats(&view, &pipe, 1, 2, 9).unwrap();
        let b = compute_mean_var_stats(&view, &pipe, 1, 2, 9).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn empty_view_gives_empty_stats() {
        let dataset = Dataset::default();
        let view = DatasetView::new(&dataset);

        let stats = compute_mean_var_stats(&view, &DataPipe::new(), 4, 2, 0).unwrap();

        assert_eq!(stats, MeanVarStats::new());
    }

    #[test]
    fn missing_audio_fails() {
        let dataset = Dataset::from_samples(vec![Sample {
            id: "x".into(),
            audio: "/nonexistent/x.wav".into(),
            ..Default::default()
        }]);
        let view = DatasetView::new(&dataset);

        assert!(compute_mean_var_stats(&view, &DataPipe::new(), 1, 1, 0).is_err());
    }
}

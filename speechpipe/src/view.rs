//! Non-destructive index views over a [`Dataset`].

use crate::dataset::Dataset;
use crate::error::{ConfigError, Result};
use crate::sample::Sample;
use rand::Rng;
use rand::seq::SliceRandom;

/// How [`DatasetView::draw`] selects samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawMode {
    /// Uniform sample without replacement
    Random,
    /// First n entries
    Head,
    /// Last n entries
    Tail,
}

/// Sample attribute used by [`DatasetView::sort`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKey {
    Duration,
}

/// Reorderable index table over a borrowed dataset.
///
/// Every operation rewrites only the index table and returns the view for
/// chaining.
#[derive(Clone, Debug)]
pub struct DatasetView<'a> {
    dataset: &'a Dataset,
    indices: Vec<usize>,
}

impl<'a> DatasetView<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self {
            dataset,
            indices: (0..dataset.len()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn get(&self, i: usize) -> Option<&'a Sample> {
        let dataset = self.dataset;
        self.indices.get(i).map(|&k| &dataset[k])
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Sample> + '_ {
        let dataset = self.dataset;
        self.indices.iter().map(move |&k| &dataset[k])
    }

    /// Owned sample batches in view order; the last batch may be short.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = Vec<Sample>> + '_ {
        self.indices
            .chunks(batch_size.max(1))
            .map(move |chunk| chunk.iter().map(|&k| self.dataset[k].clone()).collect())
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> &mut Self {
        self.indices.shuffle(rng);
        self
    }

    /// Keep `n` entries; `n` larger than the view keeps everything.
    pub fn draw<R: Rng + ?Sized>(&mut self, n: usize, how: DrawMode, rng: &mut R) -> &mut Self {
        let n = n.min(self.indices.len());
        match how {
            DrawMode::Random => {
                self.indices = self.indices.choose_multiple(rng, n).copied().collect();
            }
            DrawMode::Head => self.indices.truncate(n),
            DrawMode::Tail => {
                self.indices.drain(..self.indices.len() - n);
            }
        }
        self
    }

    /// Tile the index table `num_copies` times.
    pub fn repeat(&mut self, num_copies: usize) -> &mut Self {
        self.indices = self.indices.repeat(num_copies);
        self
    }

    /// Keep every `num_shards`-th entry starting at position `shard_index`.
    pub fn shard(&mut self, shard_index: usize, num_shards: usize) -> Result<&mut Self> {
        if num_shards == 0 || shard_index >= num_shards {
            return Err(ConfigError::InvalidShard {
                index: shard_index,
                count: num_shards,
            }
            .into());
        }

        self.indices = self
            .indices
            .iter()
            .copied()
            .skip(shard_index)
            .step_by(num_shards)
            .collect();
        Ok(self)
    }

    /// Stable sort by a sample attribute.
    pub fn sort(&mut self, by: SortKey, decreasing: bool) -> &mut Self {
        let dataset = self.dataset;
        let key = |k: usize| match by {
            SortKey::Duration => dataset[k].duration,
        };

        if decreasing {
            self.indices.sort_by(|&a, &b| key(b).total_cmp(&key(a)));
        } else {
            self.indices.sort_by(|&a, &b| key(a).total_cmp(&key(b)));
        }
        self
    }
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Windowed scanning and set-membership tests.

Edge arrays are processed in half-open windows of `chunk_size` rows so
memory stays bounded. Membership tests on inputs of at least `chunk_size`
elements fan out over a dedicated rayon pool in sub-windows; results are
collected in window order, so the mask is identical to a sequential test.
*/

use crate::{SplitError, SplitOptions, SplitResult};
use ahash::AHashSet;
use rayon::prelude::*;
use std::ops::Range;
use std::sync::Arc;

/// Read-only set of ids tested against
#[derive(Debug, Clone, Default)]
pub struct NeedleSet {
    ids: AHashSet<u64>,
}

impl NeedleSet {
    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<u64> for NeedleSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a u64> for NeedleSet {
    fn from_iter<I: IntoIterator<Item = &'a u64>>(iter: I) -> Self {
        iter.into_iter().copied().collect()
    }
}

/// Half-open windows `[k*chunk, min((k+1)*chunk, len))` covering `0..len`
pub fn windows(len: u64, chunk_size: usize) -> impl Iterator<Item = Range<u64>> {
    let chunk = chunk_size.max(1) as u64;
    (0..len)
        .step_by(chunk as usize)
        .map(move |start| start..(start + chunk).min(len))
}

/// Elements whose mask entry is `true`, in order
pub fn masked(elements: &[u64], mask: &[bool]) -> Vec<u64> {
    elements
        .iter()
        .zip(mask)
        .filter_map(|(&e, &keep)| keep.then_some(e))
        .collect()
}

#[derive(Clone)]
pub struct ChunkScanner {
    chunk_size: usize,
    sub_window: usize,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl std::fmt::Debug for ChunkScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkScanner")
            .field("chunk_size", &self.chunk_size)
            .field("sub_window", &self.sub_window)
            .field("threads", &self.pool.as_ref().map(|p| p.current_num_threads()))
            .finish()
    }
}

impl ChunkScanner {
    /// Scanner with a worker pool sized from the options
    pub fn new(options: &SplitOptions) -> SplitResult<Self> {
        let chunk_size = options.read_chunk_size.max(1);
        let sub_window = (chunk_size / options.membership_window_divisor.max(1))
            .max(options.membership_min_window.max(1));
        let threads = if options.max_threads > 0 {
            options.max_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1)
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("circuit-scan-{}", i))
            .build()
            .map_err(|e| SplitError::ThreadPool(e.to_string()))?;

        tracing::debug!(
            target: "circuit-split",
            "Chunk scanner: chunk={} sub_window={} threads={}",
            chunk_size,
            sub_window,
            threads
        );

        Ok(Self {
            chunk_size,
            sub_window,
            pool: Some(Arc::new(pool)),
        })
    }

    /// Single-threaded scanner
    pub fn sequential(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            sub_window: chunk_size.max(1),
            pool: None,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn windows(&self, len: u64) -> impl Iterator<Item = Range<u64>> {
        windows(len, self.chunk_size)
    }

    /// `mask[i] == needles.contains(elements[i])`
    pub fn membership(&self, elements: &[u64], needles: &NeedleSet) -> Vec<bool> {
        self.test(elements, needles, false)
    }

    /// `mask[i] == !needles.contains(elements[i])`
    pub fn non_membership(&self, elements: &[u64], needles: &NeedleSet) -> Vec<bool> {
        self.test(elements, needles, true)
    }

    fn test(&self, elements: &[u64], needles: &NeedleSet, invert: bool) -> Vec<bool> {
        let probe = |window: &[u64]| -> Vec<bool> {
            window.iter().map(|&e| needles.contains(e) != invert).collect()
        };

        match &self.pool {
            Some(pool) if elements.len() >= self.chunk_size => {
                let parts: Vec<Vec<bool>> = pool.install(|| {
                    elements
                        .par_chunks(self.sub_window)
                        .map(probe)
                        .collect()
                });
                parts.concat()
            }
            _ => probe(elements),
        }
    }
}

//! A database split across several files by magnitude range.
//!
//! Gaia releases ship as a bright file plus fainter slices. A search only
//! touches the files whose magnitude range overlaps the query, runs them in
//! parallel, and merges the results into one.

use std::path::Path;
use std::time::Instant;

use log::{debug, warn};
use rayon::prelude::*;

use crate::catalog::{CatalogFile, CatalogOptions};
use crate::codec::RecordCodec;
use crate::error::XpsdResult;
use crate::search::{CancelToken, SearchCriteria, SearchResult, SortBy};

/// Catalog files of one release, ordered by `magnitude_low`.
pub struct CatalogSet<C: RecordCodec> {
    files: Vec<CatalogFile<C>>,
}

impl<C: RecordCodec> CatalogSet<C> {
    pub fn new(mut files: Vec<CatalogFile<C>>) -> Self {
        files.sort_by(|a, b| {
            a.metadata()
                .magnitude_low
                .total_cmp(&b.metadata().magnitude_low)
        });
        Self { files }
    }

    /// Open every path with default options.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> XpsdResult<Self> {
        Self::open_with(paths, CatalogOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(paths: &[P], options: CatalogOptions) -> XpsdResult<Self> {
        let files = paths
            .iter()
            .map(|p| CatalogFile::open_with(p, options.clone()))
            .collect::<XpsdResult<Vec<_>>>()?;
        Ok(Self::new(files))
    }

    pub fn files(&self) -> &[CatalogFile<C>] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Combined magnitude range of all files, `None` for an empty set.
    pub fn magnitude_range(&self) -> Option<(f32, f32)> {
        self.files.iter().fold(None, |acc, file| {
            let meta = file.metadata();
            Some(match acc {
                None => (meta.magnitude_low, meta.magnitude_high),
                Some((low, high)) => (low.min(meta.magnitude_low), high.max(meta.magnitude_high)),
            })
        })
    }

    /// Files whose magnitude range overlaps the criteria range.
    pub fn select(&self, criteria: &SearchCriteria) -> Vec<&CatalogFile<C>> {
        let (low, high) = (criteria.magnitude_low, criteria.magnitude_high);
        if low > high {
            return Vec::new();
        }
        self.files
            .iter()
            .filter(|f| f.metadata().magnitude_high >= low && f.metadata().magnitude_low <= high)
            .collect()
    }

    /// Search all selected files, merge, sort, and apply the source limit.
    pub fn search(
        &self,
        criteria: &SearchCriteria,
        sort: SortBy,
    ) -> XpsdResult<SearchResult<C::Record>> {
        self.run(criteria, sort, None)
    }

    pub fn search_with(
        &self,
        criteria: &SearchCriteria,
        sort: SortBy,
        cancel: &CancelToken,
    ) -> XpsdResult<SearchResult<C::Record>> {
        self.run(criteria, sort, Some(cancel))
    }

    fn run(
        &self,
        criteria: &SearchCriteria,
        sort: SortBy,
        cancel: Option<&CancelToken>,
    ) -> XpsdResult<SearchResult<C::Record>> {
        criteria.validate()?;
        let start = Instant::now();
        let selected = self.select(criteria);
        if selected.is_empty() {
            warn!(
                "No catalog file covers magnitudes [{}, {}]",
                criteria.magnitude_low, criteria.magnitude_high
            );
        }

        let results = selected
            .par_iter()
            .map(|file| match cancel {
                Some(token) => file.search_with(criteria, token),
                None => file.search(criteria),
            })
            .collect::<XpsdResult<Vec<_>>>()?;

        let mut merged = SearchResult::new();
        for result in results {
            merged.merge(result);
        }
        merged.sort_by(sort);
        merged.truncate(criteria.source_limit);
        merged.stats.total_time = start.elapsed();

        debug!(
            "Searched {} of {} files: {} sources, {} excess",
            selected.len(),
            self.files.len(),
            merged.stars.len(),
            merged.excess_count
        );
        Ok(merged)
    }
}

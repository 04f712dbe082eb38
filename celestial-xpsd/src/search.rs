//! Query input, query output and per-query state.
//!
//! A [`SearchCriteria`] describes one circular query with magnitude and flag
//! filters. Running it produces a [`SearchResult`], a fresh accumulator owned
//! by the calling thread. [`SearchContext`] bundles both while a search is in
//! flight and is passed explicitly by `&mut` through the traversal.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BlockError, XpsdError, XpsdResult};

/// Source limit meaning "no limit".
pub const UNLIMITED: usize = usize::MAX;

/// A circular range query with magnitude and quality-flag filters.
///
/// Defaults: center (0, 0), radius 1°, magnitudes `[-1.5, 26]`, no source
/// limit, no flag filters.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCriteria {
    /// Center right ascension, in degrees.
    pub center_ra: f64,
    /// Center declination, in degrees.
    pub center_dec: f64,
    /// Search radius, in degrees. Records at exactly this distance are excluded.
    pub radius: f64,
    /// Brightest accepted magnitude (inclusive).
    pub magnitude_low: f32,
    /// Faintest accepted magnitude (inclusive).
    pub magnitude_high: f32,
    /// Maximum number of records stored in the result.
    pub source_limit: usize,
    /// Every one of these bits must be set.
    pub inclusion_flags: u32,
    /// None of these bits may be set.
    pub exclusion_flags: u32,
    /// If nonzero, at least one of these bits must be set.
    pub any_flags: u32,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            center_ra: 0.0,
            center_dec: 0.0,
            radius: 1.0,
            magnitude_low: -1.5,
            magnitude_high: 26.0,
            source_limit: UNLIMITED,
            inclusion_flags: 0,
            exclusion_flags: 0,
            any_flags: 0,
        }
    }
}

impl SearchCriteria {
    pub fn new(center_ra: f64, center_dec: f64, radius: f64) -> Self {
        Self {
            center_ra,
            center_dec,
            radius,
            ..Self::default()
        }
    }

    pub fn with_magnitude_range(mut self, low: f32, high: f32) -> Self {
        self.magnitude_low = low;
        self.magnitude_high = high;
        self
    }

    pub fn with_source_limit(mut self, limit: usize) -> Self {
        self.source_limit = limit;
        self
    }

    pub fn with_inclusion_flags(mut self, flags: u32) -> Self {
        self.inclusion_flags = flags;
        self
    }

    pub fn with_exclusion_flags(mut self, flags: u32) -> Self {
        self.exclusion_flags = flags;
        self
    }

    pub fn with_any_flags(mut self, flags: u32) -> Self {
        self.any_flags = flags;
        self
    }

    /// Reject inputs no search can meaningfully run with.
    ///
    /// An empty magnitude interval (`low > high`) is valid and matches nothing.
    pub fn validate(&self) -> XpsdResult<()> {
        if !self.center_ra.is_finite() || !self.center_dec.is_finite() {
            return Err(XpsdError::invalid_criteria(format!(
                "center ({}, {}) is not finite",
                self.center_ra, self.center_dec
            )));
        }
        if !(-90.0..=90.0).contains(&self.center_dec) {
            return Err(XpsdError::invalid_criteria(format!(
                "declination {} outside [-90, 90]",
                self.center_dec
            )));
        }
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(XpsdError::invalid_criteria(format!(
                "radius {} must be finite and non-negative",
                self.radius
            )));
        }
        if self.magnitude_low.is_nan() || self.magnitude_high.is_nan() {
            return Err(XpsdError::invalid_criteria("magnitude limit is NaN"));
        }
        Ok(())
    }

    #[inline]
    pub fn accepts_flags(&self, flags: u32) -> bool {
        (flags & self.inclusion_flags) == self.inclusion_flags
            && (self.any_flags == 0 || (flags & self.any_flags) != 0)
            && (flags & self.exclusion_flags) == 0
    }

    #[inline]
    pub fn accepts_magnitude(&self, magnitude: f32) -> bool {
        magnitude >= self.magnitude_low && magnitude <= self.magnitude_high
    }
}

impl fmt::Display for SearchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Center Right Ascension ..... {:13.9} deg", self.center_ra)?;
        writeln!(f, "Center Declination ......... {:+13.9} deg", self.center_dec)?;
        writeln!(f, "Search radius .............. {:13.9} deg", self.radius)?;
        writeln!(f, "Magnitude low limit ........ {:6.3}", self.magnitude_low)?;
        writeln!(f, "Magnitude high limit ....... {:6.3}", self.magnitude_high)?;
        if self.source_limit == UNLIMITED {
            writeln!(f, "Source count limit ......... unlimited")?;
        } else {
            writeln!(f, "Source count limit ......... {}", self.source_limit)?;
        }
        writeln!(f, "Inclusion flags ............ {:08x}", self.inclusion_flags)?;
        write!(f, "Exclusion flags ............ {:08x}", self.exclusion_flags)?;
        if self.any_flags != 0 {
            write!(f, "\nAny flags .................. {:08x}", self.any_flags)?;
        }
        Ok(())
    }
}

/// Performance counters collected during one search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Wall time of the whole search.
    pub total_time: Duration,
    /// Time spent reading blocks.
    pub io_time: Duration,
    /// Number of block reads.
    pub io_count: u64,
    /// Time spent decompressing blocks.
    pub decompress_time: Duration,
    /// Time spent decoding and filtering records.
    pub decode_time: Duration,
    /// Leaves that passed the pruning test, including empty ones.
    pub blocks_visited: u64,
    /// Blocks served from the block cache.
    pub cache_hits: u64,
}

impl SearchStats {
    /// Combine counters from a search that ran in parallel with this one:
    /// counts add up, times take the maximum.
    pub fn merge_parallel(&mut self, other: &SearchStats) {
        self.total_time = self.total_time.max(other.total_time);
        self.io_time = self.io_time.max(other.io_time);
        self.decompress_time = self.decompress_time.max(other.decompress_time);
        self.decode_time = self.decode_time.max(other.decode_time);
        self.io_count += other.io_count;
        self.blocks_visited += other.blocks_visited;
        self.cache_hits += other.cache_hits;
    }
}

impl fmt::Display for SearchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        writeln!(f, "Total search time .......... {:.2} ms", ms(self.total_time))?;
        writeln!(f, "Total I/O time ............. {:.2} ms", ms(self.io_time))?;
        writeln!(f, "Total I/O operations ....... {}", self.io_count)?;
        writeln!(f, "Total uncompression time ... {:.2} ms", ms(self.decompress_time))?;
        writeln!(f, "Total decoding time ........ {:.2} ms", ms(self.decode_time))?;
        write!(f, "Blocks visited ............. {}", self.blocks_visited)
    }
}

/// Output of one search.
#[derive(Debug, Clone)]
pub struct SearchResult<R> {
    /// Matching records, at most `source_limit` of them.
    pub stars: Vec<R>,
    /// Matches found after the source limit was reached.
    pub excess_count: u64,
    /// Records examined and rejected by the magnitude, flag or radius tests.
    pub reject_count: u64,
    /// Blocks that could not be read and were skipped.
    pub block_errors: Vec<BlockError>,
    pub stats: SearchStats,
}

impl<R> Default for SearchResult<R> {
    fn default() -> Self {
        Self {
            stars: Vec::new(),
            excess_count: 0,
            reject_count: 0,
            block_errors: Vec::new(),
            stats: SearchStats::default(),
        }
    }
}

impl<R> SearchResult<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    /// Stored plus excess matches.
    pub fn total_matches(&self) -> u64 {
        self.stars.len() as u64 + self.excess_count
    }

    /// True if no block had to be skipped.
    pub fn is_complete(&self) -> bool {
        self.block_errors.is_empty()
    }

    /// Fold a result produced concurrently for a different file into this one.
    pub fn merge(&mut self, other: SearchResult<R>) {
        self.stars.extend(other.stars);
        self.excess_count += other.excess_count;
        self.reject_count += other.reject_count;
        self.block_errors.extend(other.block_errors);
        self.stats.merge_parallel(&other.stats);
    }

    /// Drop stored records beyond `limit`, counting them as excess.
    pub fn truncate(&mut self, limit: usize) {
        if self.stars.len() > limit {
            self.excess_count += (self.stars.len() - limit) as u64;
            self.stars.truncate(limit);
        }
    }
}

impl<R: PointSource> SearchResult<R> {
    pub fn sort_by(&mut self, key: SortBy) {
        sort_sources(&mut self.stars, key);
    }
}

/// Cooperative cancellation flag shared between a search and its owner.
///
/// Checked between leaf visits; a cancelled search returns
/// [`XpsdError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

/// State of one in-flight search.
pub struct SearchContext<'a, R> {
    pub criteria: &'a SearchCriteria,
    pub result: SearchResult<R>,
    cancel: Option<&'a CancelToken>,
}

impl<'a, R> SearchContext<'a, R> {
    pub fn new(criteria: &'a SearchCriteria, cancel: Option<&'a CancelToken>) -> Self {
        Self {
            criteria,
            result: SearchResult::new(),
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    /// True once the result holds `source_limit` records.
    pub fn is_full(&self) -> bool {
        self.result.stars.len() >= self.criteria.source_limit
    }

    pub fn into_result(self) -> SearchResult<R> {
        self.result
    }
}

/// Output ordering for merged results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    None,
    Ra,
    Dec,
    #[default]
    G,
    Bp,
    Rp,
    Parallax,
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Ra => "ra",
            Self::Dec => "dec",
            Self::G => "g",
            Self::Bp => "bp",
            Self::Rp => "rp",
            Self::Parallax => "parallax",
        };
        f.write_str(name)
    }
}

/// A decoded catalog record with a sky position.
pub trait PointSource {
    fn ra(&self) -> f64;
    fn dec(&self) -> f64;
    /// Magnitude used by the search filter.
    fn magnitude(&self) -> f32;

    /// Value to order by, or `None` if this record has no such field.
    fn sort_key(&self, by: SortBy) -> Option<f64> {
        match by {
            SortBy::Ra => Some(self.ra()),
            SortBy::Dec => Some(self.dec()),
            SortBy::G => Some(self.magnitude() as f64),
            _ => None,
        }
    }
}

/// Stable ascending sort; records without a key go last.
pub fn sort_sources<R: PointSource>(sources: &mut [R], by: SortBy) {
    if by == SortBy::None {
        return;
    }
    sources.sort_by(|a, b| match (a.sort_key(by), b.sort_key(by)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

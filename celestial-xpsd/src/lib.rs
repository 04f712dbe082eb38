//! Indexed reader for Gaia XPSD point-source database files.
//!
//! An XPSD file holds millions of stars as fixed-width, quantized records
//! grouped into leaf blocks of a quadtree forest. Each tree lives on its own
//! gnomonic tangent plane. Opening a file maps it read-only and loads only the
//! index; a circular search walks the trees, prunes by enclosing spherical
//! caps, and decompresses just the blocks it reaches.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`catalog`] | [`CatalogFile`] open/search/close, [`CatalogOptions`] |
//! | [`set`] | [`CatalogSet`], parallel search over magnitude-sliced files |
//! | [`search`] | [`SearchCriteria`], [`SearchResult`], [`SearchStats`], [`CancelToken`], [`SortBy`] |
//! | [`codec`] | [`RecordCodec`] trait, [`GaiaDr2`], [`GaiaDr3`], block decoding |
//! | [`index`] | Quadtree forest: [`IndexTree`], [`IndexNode`] |
//! | [`block`] | Leaf block loading, decompression, optional LRU cache |
//! | [`format`] | On-disk header and index layout |
//! | [`sphere`] | Angular separation, gnomonic projection, spherical caps |
//! | [`builder`] | [`CatalogBuilder`], writes XPSD files from records |
//! | [`output`] | CSV and tabular text renderers |
//! | [`error`] | [`XpsdError`], [`BlockError`] |
//!
//! # Quick Start
//!
//! ```ignore
//! use celestial_xpsd::{CatalogFile, GaiaDr3, SearchCriteria};
//!
//! let catalog = CatalogFile::<GaiaDr3>::open("gdr3-1.0.0-01.xpsd")?;
//!
//! let result = catalog.search(
//!     &SearchCriteria::new(83.633, -5.375, 0.5)
//!         .with_magnitude_range(-1.5, 14.0)
//!         .with_source_limit(50),
//! )?;
//! for star in &result.stars {
//!     println!("{:.6} {:+.6} {:.3}", star.ra, star.dec, star.mag_g);
//! }
//! ```
//!
//! # Features
//!
//! - **`cli`**: enables the `xpsd-query` binary for inspecting and searching
//!   catalog files from the command line.

pub mod block;
pub mod builder;
pub mod catalog;
pub mod codec;
pub mod error;
pub mod format;
pub mod index;
pub mod output;
pub mod search;
pub mod set;
pub mod sphere;

pub use builder::CatalogBuilder;
pub use catalog::{CatalogFile, CatalogOptions};
pub use codec::{GaiaDr2, GaiaDr3, GaiaStar, RecordCodec};
pub use error::{BlockError, XpsdError, XpsdResult};
pub use format::{CatalogMetadata, Compression};
pub use index::{IndexNode, IndexTree};
pub use search::{
    CancelToken, PointSource, SearchCriteria, SearchResult, SearchStats, SortBy, UNLIMITED,
};
pub use set::CatalogSet;

//! Stream preprocessing: global prefilter and fixed band split
//!
//! All filtering is done with second-order IIR sections (RBJ cookbook
//! coefficients) applied in place to mono chunks. The global prefilter
//! band-limits the stream before analysis; the band split produces the
//! five band-limited copies consumed by the onset detectors.

pub mod band_split;
pub mod biquad;

pub use band_split::{BandSplitter, BAND_EDGES_HZ, NUM_BANDS};
pub use biquad::{BandFilter, Biquad};

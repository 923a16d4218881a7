//! Builds the download plan of a DASH presentation: the ordered list of every segment an
//! offline download has to fetch, or has to delete when the download is removed.
//!
//! ```text
//!  MPD ──► Manifest ──► SegmentListBuilder ──► [Segment { start_time_us, FetchRequest }]
//!                               │
//!                               └─► ContainerIndexProber ──► DataSource (sidx lookup)
//! ```

mod builder;
pub mod error;
pub mod exclusion;
pub mod index;
pub mod manifest;
pub mod probe;
pub mod range;
mod resolve;
pub mod segment;

pub use builder::SegmentListBuilder;
pub use error::{OfflineError, OfflineResult};
pub use exclusion::{select_base_url, BaseUrlExclusionList, ExclusionState};
pub use manifest::{Manifest, StreamKey};
pub use probe::{DataSource, HttpDataSource, InlineExecutor, ProbeExecutor, TokioExecutor};
pub use range::ByteRange;
pub use resolve::merge_baseurls;
pub use segment::{FetchRequest, Segment};

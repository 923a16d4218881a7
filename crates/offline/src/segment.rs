use reqwest::header::HeaderMap;
use url::Url;

use crate::range::ByteRange;

/// Everything needed to fetch one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: Url,
    pub byte_range: Option<ByteRange>,
    pub headers: HeaderMap,
    /// Key the downloaded bytes are cached under. Stable across mirrors.
    pub cache_key: String,
}

/// One independently fetchable unit of a download plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Start of the segment on the presentation timeline.
    pub start_time_us: i64,
    pub request: FetchRequest,
}

//! Where the media fragments of a representation live.
//!
//! A [`SegmentIndex`] is either read from the manifest itself ([`EmbeddedIndex`]: segment
//! templates, segment lists, single-resource representations) or discovered by probing the
//! container ([`WrappingSegmentIndex`] over a [`ChunkIndex`]). Both are pure views: none of
//! the methods here perform I/O.

mod chunk;
mod embedded;
pub mod template;

pub use chunk::{ChunkIndex, WrappingSegmentIndex};
pub use embedded::{EmbeddedIndex, SegmentTimeline, TimelineEntry};

use url::Url;

use crate::{error::OfflineResult, range::ByteRange, resolve::merge_baseurls};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentCount {
    Bounded(u64),
    /// The index grows with time and cannot be enumerated without a period end.
    Unbounded,
}

pub trait SegmentIndex {
    /// Number of segments in a period of the given duration. `None` means the duration is unknown.
    fn segment_count(&self, period_duration_us: Option<u64>) -> SegmentCount;

    fn first_segment_num(&self) -> u64;

    /// Start time of a segment, relative to the start of its period.
    fn time_us(&self, segment_num: u64) -> i64;

    fn duration_us(&self, segment_num: u64, period_duration_us: Option<u64>) -> Option<u64>;

    fn segment_url(&self, segment_num: u64) -> RangedUri;

    /// The segment containing `time_us`, clamped to the first and last segment.
    fn segment_num(&self, time_us: i64, period_duration_us: Option<u64>) -> u64 {
        let first = self.first_segment_num();
        match self.segment_count(period_duration_us) {
            SegmentCount::Bounded(0) => first,
            SegmentCount::Bounded(count) => {
                let (mut low, mut high) = (first, first + count - 1);
                while low < high {
                    let mid = low + (high - low + 1) / 2;
                    if self.time_us(mid) <= time_us {
                        low = mid;
                    } else {
                        high = mid - 1;
                    }
                }
                low
            }
            SegmentCount::Unbounded => match self.duration_us(first, period_duration_us) {
                Some(duration) if duration > 0 => {
                    let elapsed = (time_us - self.time_us(first)).max(0) as u64;
                    first + elapsed / duration
                }
                _ => first,
            },
        }
    }
}

/// The index a representation resolved to, whichever way it was obtained.
#[derive(Debug)]
pub enum RepresentationIndex<'a> {
    Embedded(EmbeddedIndex<'a>),
    Discovered(WrappingSegmentIndex),
}

impl SegmentIndex for RepresentationIndex<'_> {
    fn segment_count(&self, period_duration_us: Option<u64>) -> SegmentCount {
        match self {
            Self::Embedded(index) => index.segment_count(period_duration_us),
            Self::Discovered(index) => index.segment_count(period_duration_us),
        }
    }

    fn first_segment_num(&self) -> u64 {
        match self {
            Self::Embedded(index) => index.first_segment_num(),
            Self::Discovered(index) => index.first_segment_num(),
        }
    }

    fn time_us(&self, segment_num: u64) -> i64 {
        match self {
            Self::Embedded(index) => index.time_us(segment_num),
            Self::Discovered(index) => index.time_us(segment_num),
        }
    }

    fn duration_us(&self, segment_num: u64, period_duration_us: Option<u64>) -> Option<u64> {
        match self {
            Self::Embedded(index) => index.duration_us(segment_num, period_duration_us),
            Self::Discovered(index) => index.duration_us(segment_num, period_duration_us),
        }
    }

    fn segment_url(&self, segment_num: u64) -> RangedUri {
        match self {
            Self::Embedded(index) => index.segment_url(segment_num),
            Self::Discovered(index) => index.segment_url(segment_num),
        }
    }

    fn segment_num(&self, time_us: i64, period_duration_us: Option<u64>) -> u64 {
        match self {
            Self::Embedded(index) => index.segment_num(time_us, period_duration_us),
            Self::Discovered(index) => index.segment_num(time_us, period_duration_us),
        }
    }
}

/// A reference relative to a base URL, plus the part of the resource it covers.
///
/// An empty reference points at the base URL itself, which is how indexed (single resource)
/// representations address their initialization, index and media ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangedUri {
    reference: String,
    pub range: ByteRange,
}

impl RangedUri {
    pub fn new(reference: impl Into<String>, start: u64, length: Option<u64>) -> Self {
        Self {
            reference: reference.into(),
            range: ByteRange::new(start, length),
        }
    }

    /// The whole resource at `reference`.
    pub fn whole(reference: impl Into<String>) -> Self {
        Self::new(reference, 0, None)
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn resolve(&self, base_url: &Url) -> OfflineResult<Url> {
        if self.reference.is_empty() {
            Ok(base_url.clone())
        } else {
            merge_baseurls(base_url, &self.reference)
        }
    }

    /// `None` when the whole resource is requested.
    pub fn byte_range(&self) -> Option<ByteRange> {
        (self.range.offset != 0 || self.range.length.is_some()).then_some(self.range)
    }

    /// Joins two ranges of the same resource when one ends exactly where the other starts.
    pub fn attempt_merge(&self, other: &RangedUri) -> Option<RangedUri> {
        if self.reference != other.reference {
            return None;
        }

        let (first, second) = if self.range.end() == Some(other.range.offset) {
            (self, other)
        } else if other.range.end() == Some(self.range.offset) {
            (other, self)
        } else {
            return None;
        };

        let length = match (first.range.length, second.range.length) {
            (Some(first_length), Some(second_length)) => {
                let length = first_length.checked_add(second_length)?;
                first.range.offset.checked_add(length)?;
                Some(length)
            }
            _ => None,
        };
        Some(RangedUri::new(
            self.reference.clone(),
            first.range.offset,
            length,
        ))
    }
}

/// `value / timescale` seconds expressed in microseconds.
pub(crate) fn scale_to_us(value: i128, timescale: u64) -> i64 {
    (value * 1_000_000 / i128::from(timescale.max(1))) as i64
}

/// `value_us` microseconds expressed in `timescale` units.
pub(crate) fn scale_from_us(value_us: u64, timescale: u64) -> u128 {
    u128::from(value_us) * u128::from(timescale) / 1_000_000
}

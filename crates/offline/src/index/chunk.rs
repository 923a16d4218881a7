use super::{RangedUri, SegmentCount, SegmentIndex};

/// Time to byte-offset table discovered in a media container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkIndex {
    pub sizes: Vec<u32>,
    /// Absolute offsets in the resource.
    pub offsets: Vec<u64>,
    pub durations_us: Vec<u64>,
    pub times_us: Vec<i64>,
}

impl ChunkIndex {
    pub fn new(sizes: Vec<u32>, offsets: Vec<u64>, durations_us: Vec<u64>, times_us: Vec<i64>) -> Self {
        Self {
            sizes,
            offsets,
            durations_us,
            times_us,
        }
    }

    pub fn len(&self) -> usize {
        self.times_us.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times_us.is_empty()
    }

    /// Index of the last chunk starting at or before `time_us`.
    pub fn chunk_index(&self, time_us: i64) -> usize {
        self.times_us
            .partition_point(|&start| start <= time_us)
            .saturating_sub(1)
    }
}

/// Exposes a [`ChunkIndex`] through the [`SegmentIndex`] contract.
///
/// Chunk times are on the media timeline; subtracting the representation's presentation
/// time offset aligns them with the period.
#[derive(Debug, Clone)]
pub struct WrappingSegmentIndex {
    chunk_index: ChunkIndex,
    time_offset_us: i64,
}

impl WrappingSegmentIndex {
    pub fn new(chunk_index: ChunkIndex, time_offset_us: i64) -> Self {
        Self {
            chunk_index,
            time_offset_us,
        }
    }

    pub fn chunk_index(&self) -> &ChunkIndex {
        &self.chunk_index
    }
}

impl SegmentIndex for WrappingSegmentIndex {
    fn segment_count(&self, _period_duration_us: Option<u64>) -> SegmentCount {
        SegmentCount::Bounded(self.chunk_index.len() as u64)
    }

    fn first_segment_num(&self) -> u64 {
        0
    }

    fn time_us(&self, segment_num: u64) -> i64 {
        self.chunk_index.times_us[segment_num as usize] - self.time_offset_us
    }

    fn duration_us(&self, segment_num: u64, _period_duration_us: Option<u64>) -> Option<u64> {
        self.chunk_index.durations_us.get(segment_num as usize).copied()
    }

    fn segment_url(&self, segment_num: u64) -> RangedUri {
        let n = segment_num as usize;
        RangedUri::new(
            "",
            self.chunk_index.offsets[n],
            Some(u64::from(self.chunk_index.sizes[n])),
        )
    }

    fn segment_num(&self, time_us: i64, _period_duration_us: Option<u64>) -> u64 {
        self.chunk_index.chunk_index(time_us + self.time_offset_us) as u64
    }
}

use super::{scale_from_us, scale_to_us, template::Template, RangedUri, SegmentCount, SegmentIndex};
use crate::manifest::{MultiSegmentBase, Representation, SegmentBase};

/// One `S` element of a `SegmentTimeline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    /// `S@t`, continues from the previous entry when absent.
    pub time: Option<u64>,
    pub duration: u64,
    /// `S@r`. A negative value repeats until the next entry or the end of the period.
    pub repeat: i64,
}

/// A segment timeline with repeats expanded.
///
/// A negative repeat on the last entry cannot be expanded without knowing where the period
/// ends, so it is kept as an open tail and resolved when counting segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentTimeline {
    starts: Vec<u64>,
    durations: Vec<u64>,
    open_tail: Option<(u64, u64)>,
}

impl SegmentTimeline {
    pub fn new(entries: &[TimelineEntry]) -> Self {
        let mut timeline = Self::default();
        let mut time = 0;
        for (i, entry) in entries.iter().enumerate() {
            if let Some(t) = entry.time {
                time = t;
            }
            if entry.duration == 0 {
                tracing::warn!("Ignoring zero duration timeline entry at {time}");
                continue;
            }

            let occurrences = if entry.repeat >= 0 {
                entry.repeat as u64 + 1
            } else {
                match entries.get(i + 1) {
                    Some(TimelineEntry {
                        time: Some(next), ..
                    }) => next.saturating_sub(time).div_ceil(entry.duration),
                    Some(_) => 1,
                    None => {
                        timeline.open_tail = Some((time, entry.duration));
                        break;
                    }
                }
            };

            for _ in 0..occurrences {
                timeline.starts.push(time);
                timeline.durations.push(entry.duration);
                time += entry.duration;
            }
        }
        timeline
    }

    /// Number of segments before `end`, in timescale units.
    fn count(&self, end: Option<u128>) -> SegmentCount {
        let closed = self.starts.len() as u64;
        match (self.open_tail, end) {
            (None, _) => SegmentCount::Bounded(closed),
            (Some((start, duration)), Some(end)) => {
                let remaining = end.saturating_sub(u128::from(start));
                let open = remaining.div_ceil(u128::from(duration));
                SegmentCount::Bounded(closed + open as u64)
            }
            (Some(_), None) => SegmentCount::Unbounded,
        }
    }

    fn start(&self, index: u64) -> u64 {
        match self.starts.get(index as usize) {
            Some(start) => *start,
            None => {
                let (start, duration) = self.open_tail.unwrap_or_default();
                start + (index - self.starts.len() as u64) * duration
            }
        }
    }

    fn duration(&self, index: u64) -> u64 {
        match self.durations.get(index as usize) {
            Some(duration) => *duration,
            None => self.open_tail.map_or(0, |(_, duration)| duration),
        }
    }
}

/// The segment index described by the manifest itself.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedIndex<'a> {
    representation: &'a Representation,
}

impl<'a> EmbeddedIndex<'a> {
    pub(crate) fn new(representation: &'a Representation) -> Self {
        Self { representation }
    }

    fn multi(&self) -> Option<&'a MultiSegmentBase> {
        match &self.representation.segment_base {
            SegmentBase::Single(_) => None,
            SegmentBase::List(list) => Some(&list.base),
            SegmentBase::Template(template) => Some(&template.base),
        }
    }

    /// Start of a segment on the sample timeline, in timescale units.
    fn start_time(&self, base: &MultiSegmentBase, segment_num: u64) -> u64 {
        let index = segment_num - base.start_number;
        match &base.timeline {
            Some(timeline) => timeline.start(index),
            None => index * base.duration.unwrap_or(0),
        }
    }
}

impl SegmentIndex for EmbeddedIndex<'_> {
    fn segment_count(&self, period_duration_us: Option<u64>) -> SegmentCount {
        let base = match &self.representation.segment_base {
            SegmentBase::Single(_) => return SegmentCount::Bounded(1),
            SegmentBase::List(list) => return SegmentCount::Bounded(list.media.len() as u64),
            SegmentBase::Template(template) => {
                if let Some(end_number) = template.end_number {
                    // The last number has to stay addressable
                    return match end_number.checked_add(1) {
                        Some(end) => {
                            SegmentCount::Bounded(end.saturating_sub(template.base.start_number))
                        }
                        None => SegmentCount::Unbounded,
                    };
                }
                &template.base
            }
        };

        let period_end = period_duration_us.map(|duration| {
            scale_from_us(duration, base.timescale) + u128::from(base.presentation_time_offset)
        });
        if let Some(timeline) = &base.timeline {
            return timeline.count(period_end);
        }

        match (base.duration, period_duration_us) {
            (Some(duration), Some(period_duration_us)) if duration > 0 => {
                let period = u128::from(period_duration_us) * u128::from(base.timescale);
                let segment = u128::from(duration) * 1_000_000;
                SegmentCount::Bounded(period.div_ceil(segment) as u64)
            }
            _ => SegmentCount::Unbounded,
        }
    }

    fn first_segment_num(&self) -> u64 {
        self.multi().map_or(0, |base| base.start_number)
    }

    fn time_us(&self, segment_num: u64) -> i64 {
        let Some(base) = self.multi() else {
            return 0;
        };
        let start = i128::from(self.start_time(base, segment_num));
        match base.timeline {
            Some(_) => scale_to_us(start - i128::from(base.presentation_time_offset), base.timescale),
            None => scale_to_us(start, base.timescale),
        }
    }

    fn duration_us(&self, segment_num: u64, period_duration_us: Option<u64>) -> Option<u64> {
        let Some(base) = self.multi() else {
            return period_duration_us;
        };
        if let Some(timeline) = &base.timeline {
            let duration = timeline.duration(segment_num - base.start_number);
            return Some(scale_to_us(i128::from(duration), base.timescale) as u64);
        }

        // The last segment is cut at the end of the period
        if let (SegmentCount::Bounded(count), Some(period_duration_us)) =
            (self.segment_count(period_duration_us), period_duration_us)
        {
            if count > 0 && self.first_segment_num().checked_add(count - 1) == Some(segment_num) {
                let start_us = self.time_us(segment_num).max(0) as u64;
                return Some(period_duration_us.saturating_sub(start_us));
            }
        }
        base.duration
            .map(|duration| scale_to_us(i128::from(duration), base.timescale) as u64)
    }

    fn segment_url(&self, segment_num: u64) -> RangedUri {
        match &self.representation.segment_base {
            SegmentBase::Single(_) => RangedUri::whole(""),
            SegmentBase::List(list) => {
                list.media[(segment_num - list.base.start_number) as usize].clone()
            }
            SegmentBase::Template(template) => {
                let mut values = self.representation.template_values();
                values.insert(Template::NUMBER, segment_num.to_string());
                values.insert(
                    Template::TIME,
                    self.start_time(&template.base, segment_num).to_string(),
                );
                RangedUri::whole(values.resolve(&template.media))
            }
        }
    }
}

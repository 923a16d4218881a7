//! In-memory manifest tree: periods, adaptation sets and representations.
//!
//! The tree is read-only input for [`crate::SegmentListBuilder`]. It can be built by hand or
//! converted from a parsed `dash-mpd` document with [`Manifest::from_mpd`].

mod mpd;

use url::Url;

use crate::{
    index::{scale_to_us, template::Template, EmbeddedIndex, RangedUri, SegmentTimeline},
    range::ByteRange,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    /// Duration of the whole presentation, `None` when unknown (live content).
    pub duration_us: Option<u64>,
    pub periods: Vec<Period>,
}

impl Manifest {
    /// Duration of the period at `index`.
    ///
    /// A period ends where the next one starts. The last period ends with the presentation,
    /// so its duration is unknown when the presentation duration is.
    pub fn period_duration_us(&self, index: usize) -> Option<u64> {
        let period = self.periods.get(index)?;
        match self.periods.get(index + 1) {
            Some(next) => Some(next.start_us.saturating_sub(period.start_us)),
            None => self
                .duration_us
                .map(|duration| duration.saturating_sub(period.start_us)),
        }
    }

    /// Keeps only the representations selected by `keys`.
    ///
    /// Adaptation sets left without representations are dropped, and so are periods without
    /// keys. Later periods are moved earlier by the duration of the dropped ones. An empty key
    /// list keeps the whole manifest.
    pub fn copy_with_keys(&self, keys: &[StreamKey]) -> Self {
        if keys.is_empty() {
            return self.clone();
        }

        let mut duration_us = self.duration_us;
        let mut shift_us = 0;
        let mut periods = Vec::new();
        for (period_index, period) in self.periods.iter().enumerate() {
            let period_keys: Vec<&StreamKey> = keys
                .iter()
                .filter(|key| key.period_index == period_index)
                .collect();
            if period_keys.is_empty() {
                if let Some(period_duration) = self.period_duration_us(period_index) {
                    shift_us += period_duration;
                    duration_us = duration_us.map(|d| d.saturating_sub(period_duration));
                }
                continue;
            }

            let adaptation_sets = period
                .adaptation_sets
                .iter()
                .enumerate()
                .filter_map(|(group_index, adaptation_set)| {
                    let representations: Vec<Representation> = adaptation_set
                        .representations
                        .iter()
                        .enumerate()
                        .filter(|(stream_index, _)| {
                            period_keys.iter().any(|key| {
                                key.group_index == group_index && key.stream_index == *stream_index
                            })
                        })
                        .map(|(_, representation)| representation.clone())
                        .collect();
                    (!representations.is_empty()).then(|| AdaptationSet {
                        track_type: adaptation_set.track_type.clone(),
                        representations,
                    })
                })
                .collect();

            periods.push(Period {
                id: period.id.clone(),
                start_us: period.start_us.saturating_sub(shift_us),
                adaptation_sets,
            });
        }

        Self {
            duration_us,
            periods,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Period {
    pub id: Option<String>,
    pub start_us: u64,
    pub adaptation_sets: Vec<AdaptationSet>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationSet {
    pub track_type: TrackType,
    pub representations: Vec<Representation>,
}

/// Top-level type defined in [RFC6838](https://datatracker.ietf.org/doc/html/rfc6838#section-4.2)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrackType {
    Video,
    Audio,
    Text,
    Image,
    Application,
    #[default]
    Unknown,
}

impl TrackType {
    /// Accepts both a bare content type (`audio`) and a mime type (`audio/mp4`).
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return Self::Unknown;
        };
        let top_level = content_type
            .split_once('/')
            .map_or(content_type, |(top_level, _)| top_level);
        match top_level {
            "video" => Self::Video,
            "audio" => Self::Audio,
            "text" => Self::Text,
            "image" => Self::Image,
            // TTML and WebVTT in ISO-BMFF are usually advertised as application/mp4
            "application" if content_type.ends_with("ttml+xml") => Self::Text,
            "application" => Self::Application,
            _ => Self::Unknown,
        }
    }
}

/// A mirror location of a representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl {
    pub url: Url,
    /// Mirrors sharing a service location usually resolve to the same CDN.
    pub service_location: Option<String>,
}

impl BaseUrl {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            service_location: None,
        }
    }

    pub fn with_service_location(mut self, service_location: impl Into<String>) -> Self {
        self.service_location = Some(service_location.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Representation {
    pub id: Option<String>,
    pub bandwidth: Option<u64>,
    pub mime_type: Option<String>,
    /// Mirrors in manifest order.
    pub base_urls: Vec<BaseUrl>,
    pub segment_base: SegmentBase,
    /// Overrides the key under which downloaded data is cached.
    pub cache_key: Option<String>,
}

impl Representation {
    pub fn initialization_uri(&self) -> Option<RangedUri> {
        match &self.segment_base {
            SegmentBase::Single(base) => base.initialization.clone(),
            SegmentBase::List(list) => list.base.initialization.clone(),
            SegmentBase::Template(template) => match &template.initialization {
                Some(initialization) => Some(RangedUri::whole(
                    self.template_values().resolve(initialization),
                )),
                None => template.base.initialization.clone(),
            },
        }
    }

    /// The separate index segment, only declared by single resource representations.
    pub fn index_uri(&self) -> Option<RangedUri> {
        match &self.segment_base {
            SegmentBase::Single(SingleSegmentBase {
                index_range: Some(range),
                ..
            }) => Some(RangedUri::new("", range.offset, range.length)),
            _ => None,
        }
    }

    /// The index carried by the manifest, or `None` if it has to be discovered in the container.
    pub fn index(&self) -> Option<EmbeddedIndex<'_>> {
        match &self.segment_base {
            SegmentBase::Single(SingleSegmentBase {
                index_range: Some(_),
                ..
            }) => None,
            _ => Some(EmbeddedIndex::new(self)),
        }
    }

    pub fn presentation_time_offset_us(&self) -> i64 {
        let (presentation_time_offset, timescale) = match &self.segment_base {
            SegmentBase::Single(base) => (base.presentation_time_offset, base.timescale),
            SegmentBase::List(list) => (list.base.presentation_time_offset, list.base.timescale),
            SegmentBase::Template(template) => (
                template.base.presentation_time_offset,
                template.base.timescale,
            ),
        };
        scale_to_us(i128::from(presentation_time_offset), timescale)
    }

    pub(crate) fn template_values(&self) -> Template<'static> {
        Template::for_representation(self.id.as_deref(), self.bandwidth)
    }
}

/// How a representation addresses its segments.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentBase {
    /// Indexed addressing: one resource with an optional index range (`SegmentBase`).
    Single(SingleSegmentBase),
    /// Explicit segment URLs (`SegmentList`).
    List(SegmentList),
    /// URLs built from a template (`SegmentTemplate`).
    Template(SegmentTemplate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingleSegmentBase {
    pub initialization: Option<RangedUri>,
    /// When declared, the index must be loaded from this range of the resource.
    pub index_range: Option<ByteRange>,
    pub timescale: u64,
    pub presentation_time_offset: u64,
}

impl Default for SingleSegmentBase {
    fn default() -> Self {
        Self {
            initialization: None,
            index_range: None,
            timescale: 1,
            presentation_time_offset: 0,
        }
    }
}

/// Values shared by segment lists and segment templates.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiSegmentBase {
    pub initialization: Option<RangedUri>,
    pub timescale: u64,
    pub presentation_time_offset: u64,
    pub start_number: u64,
    /// Duration of every segment in timescale units, when there is no timeline.
    pub duration: Option<u64>,
    pub timeline: Option<SegmentTimeline>,
}

impl Default for MultiSegmentBase {
    fn default() -> Self {
        Self {
            initialization: None,
            timescale: 1,
            presentation_time_offset: 0,
            start_number: 1,
            duration: None,
            timeline: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentList {
    pub base: MultiSegmentBase,
    pub media: Vec<RangedUri>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentTemplate {
    pub base: MultiSegmentBase,
    /// Overrides `base.initialization` when set.
    pub initialization: Option<String>,
    pub media: String,
    pub end_number: Option<u64>,
}

/// Selects one representation: `(period, adaptation set, representation)` indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamKey {
    pub period_index: usize,
    pub group_index: usize,
    pub stream_index: usize,
}

impl StreamKey {
    pub fn new(period_index: usize, group_index: usize, stream_index: usize) -> Self {
        Self {
            period_index,
            group_index,
            stream_index,
        }
    }
}

impl std::str::FromStr for StreamKey {
    type Err = String;

    /// Parses `period.group.stream`, e.g. `0.1.0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        let [period, group, stream] = parts.as_slice() else {
            return Err(format!("Invalid stream key: {s}"));
        };
        let parse = |v: &str| {
            v.parse::<usize>()
                .map_err(|_| format!("Invalid stream key: {s}"))
        };
        Ok(Self::new(parse(period)?, parse(group)?, parse(stream)?))
    }
}

use std::time::Duration;

use url::Url;

use super::{
    AdaptationSet, BaseUrl, Manifest, MultiSegmentBase, Period, Representation, SegmentBase,
    SegmentList, SegmentTemplate, SingleSegmentBase, TrackType,
};
use crate::{
    error::{OfflineError, OfflineResult},
    index::{RangedUri, SegmentTimeline, TimelineEntry},
    range::ByteRange,
    resolve::merge_baseurls,
};

/// Addressing elements declared by an enclosing period or adaptation set.
#[derive(Clone, Copy, Default)]
struct InheritedAddressing<'a> {
    segment_base: Option<&'a dash_mpd::SegmentBase>,
    segment_list: Option<&'a dash_mpd::SegmentList>,
    segment_template: Option<&'a dash_mpd::SegmentTemplate>,
}

impl<'a> InheritedAddressing<'a> {
    /// Elements declared on the inner level win.
    fn merge(self, outer: &Self) -> Self {
        Self {
            segment_base: self.segment_base.or(outer.segment_base),
            segment_list: self.segment_list.or(outer.segment_list),
            segment_template: self.segment_template.or(outer.segment_template),
        }
    }
}

impl Manifest {
    /// Converts a parsed MPD document.
    ///
    /// `manifest_url` is the location the document was loaded from, relative `BaseURL`s are
    /// resolved against it.
    pub fn from_mpd(mpd: &dash_mpd::MPD, manifest_url: &Url) -> OfflineResult<Self> {
        let base_urls = resolve_base_urls(&[BaseUrl::new(manifest_url.clone())], &mpd.base_url)?;

        let mut periods: Vec<Period> = Vec::with_capacity(mpd.periods.len());
        let mut previous_end_us = Some(0);
        for period in &mpd.periods {
            let start_us = match period.start {
                Some(start) => duration_us(start),
                None => previous_end_us.ok_or_else(|| {
                    OfflineError::MpdParsing(format!(
                        "Period {:?} has no start and the previous period has no duration",
                        period.id
                    ))
                })?,
            };
            previous_end_us = period.duration.map(|d| start_us.saturating_add(duration_us(d)));
            periods.push(convert_period(period, start_us, &base_urls)?);
        }

        let duration_us = mpd
            .mediaPresentationDuration
            .map(duration_us)
            .or_else(|| previous_end_us.filter(|_| !periods.is_empty()));

        Ok(Self {
            duration_us,
            periods,
        })
    }
}

fn duration_us(duration: Duration) -> u64 {
    duration.as_micros() as u64
}

/// Resolves the `BaseURL` elements of one level against every mirror of the enclosing level.
fn resolve_base_urls(
    parents: &[BaseUrl],
    elements: &[dash_mpd::BaseURL],
) -> OfflineResult<Vec<BaseUrl>> {
    if elements.is_empty() {
        return Ok(parents.to_vec());
    }

    let mut base_urls: Vec<BaseUrl> = Vec::new();
    for parent in parents {
        for element in elements {
            let url = merge_baseurls(&parent.url, &element.base)?;
            if base_urls.iter().any(|b| b.url == url) {
                continue;
            }
            base_urls.push(BaseUrl {
                url,
                service_location: element
                    .serviceLocation
                    .clone()
                    .or_else(|| parent.service_location.clone()),
            });
        }
    }
    Ok(base_urls)
}

fn convert_period(
    period: &dash_mpd::Period,
    start_us: u64,
    parent_base_urls: &[BaseUrl],
) -> OfflineResult<Period> {
    let base_urls = resolve_base_urls(parent_base_urls, &period.BaseURL)?;
    let inherited = InheritedAddressing {
        segment_base: period.SegmentBase.as_ref(),
        segment_list: period.SegmentList.as_ref(),
        segment_template: period.SegmentTemplate.as_ref(),
    };

    let mut adaptation_sets = Vec::with_capacity(period.adaptations.len());
    for adaptation_set in &period.adaptations {
        let base_urls = resolve_base_urls(&base_urls, &adaptation_set.BaseURL)?;
        let inherited = InheritedAddressing {
            segment_base: adaptation_set.SegmentBase.as_ref(),
            segment_list: adaptation_set.SegmentList.as_ref(),
            segment_template: adaptation_set.SegmentTemplate.as_ref(),
        }
        .merge(&inherited);

        let representations = adaptation_set
            .representations
            .iter()
            .map(|representation| {
                convert_representation(representation, adaptation_set, &inherited, &base_urls)
            })
            .collect::<OfflineResult<Vec<_>>>()?;

        let content_type = adaptation_set
            .contentType
            .as_deref()
            .or(adaptation_set.mimeType.as_deref())
            .or_else(|| {
                representations
                    .first()
                    .and_then(|r: &Representation| r.mime_type.as_deref())
            });
        adaptation_sets.push(AdaptationSet {
            track_type: TrackType::from_content_type(content_type),
            representations,
        });
    }

    Ok(Period {
        id: period.id.clone(),
        start_us,
        adaptation_sets,
    })
}

fn convert_representation(
    representation: &dash_mpd::Representation,
    adaptation_set: &dash_mpd::AdaptationSet,
    inherited: &InheritedAddressing,
    parent_base_urls: &[BaseUrl],
) -> OfflineResult<Representation> {
    let base_urls = resolve_base_urls(parent_base_urls, &representation.BaseURL)?;
    let addressing = InheritedAddressing {
        segment_base: representation.SegmentBase.as_ref(),
        segment_list: representation.SegmentList.as_ref(),
        segment_template: representation.SegmentTemplate.as_ref(),
    }
    .merge(inherited);

    let segment_base = if let Some(segment_base) = addressing.segment_base {
        SegmentBase::Single(convert_segment_base(segment_base)?)
    } else if let Some(segment_list) = addressing.segment_list {
        SegmentBase::List(convert_segment_list(segment_list)?)
    } else if let Some(segment_template) = addressing.segment_template {
        SegmentBase::Template(convert_segment_template(segment_template)?)
    } else {
        // The BaseURL is the only segment
        SegmentBase::Single(SingleSegmentBase::default())
    };

    Ok(Representation {
        id: representation.id.clone(),
        bandwidth: representation.bandwidth,
        mime_type: representation
            .mimeType
            .clone()
            .or_else(|| adaptation_set.mimeType.clone()),
        base_urls,
        segment_base,
        cache_key: None,
    })
}

fn convert_initialization(
    initialization: Option<&dash_mpd::Initialization>,
) -> OfflineResult<Option<RangedUri>> {
    let Some(initialization) = initialization else {
        return Ok(None);
    };
    let reference = initialization.sourceURL.clone().unwrap_or_default();
    Ok(Some(match &initialization.range {
        Some(range) => {
            let range = ByteRange::parse(range)?;
            RangedUri::new(reference, range.offset, range.length)
        }
        None => RangedUri::whole(reference),
    }))
}

fn convert_segment_base(segment_base: &dash_mpd::SegmentBase) -> OfflineResult<SingleSegmentBase> {
    Ok(SingleSegmentBase {
        initialization: convert_initialization(segment_base.Initialization.as_ref())?,
        index_range: segment_base
            .indexRange
            .as_deref()
            .map(ByteRange::parse)
            .transpose()?,
        timescale: timescale(segment_base.timescale),
        presentation_time_offset: segment_base.presentationTimeOffset.unwrap_or(0),
    })
}

fn convert_segment_list(segment_list: &dash_mpd::SegmentList) -> OfflineResult<SegmentList> {
    let media = segment_list
        .segment_urls
        .iter()
        .map(|segment_url| {
            let reference = segment_url.media.clone().unwrap_or_default();
            Ok(match &segment_url.mediaRange {
                Some(range) => {
                    let range = ByteRange::parse(range)?;
                    RangedUri::new(reference, range.offset, range.length)
                }
                None => RangedUri::whole(reference),
            })
        })
        .collect::<OfflineResult<Vec<_>>>()?;

    Ok(SegmentList {
        base: MultiSegmentBase {
            initialization: convert_initialization(segment_list.Initialization.as_ref())?,
            timescale: timescale(segment_list.timescale),
            duration: segment_list.duration,
            ..Default::default()
        },
        media,
    })
}

fn convert_segment_template(
    segment_template: &dash_mpd::SegmentTemplate,
) -> OfflineResult<SegmentTemplate> {
    let media = segment_template.media.clone().ok_or_else(|| {
        OfflineError::MpdParsing("Missing media url template in SegmentTemplate".to_string())
    })?;

    let timeline = segment_template.SegmentTimeline.as_ref().map(|timeline| {
        let entries: Vec<TimelineEntry> = timeline
            .segments
            .iter()
            .map(|s| TimelineEntry {
                time: s.t,
                duration: s.d,
                repeat: s.r.unwrap_or(0),
            })
            .collect();
        SegmentTimeline::new(&entries)
    });

    let duration = segment_template
        .duration
        .filter(|duration| duration.is_finite() && *duration > 0.0)
        .map(|duration| duration.round() as u64);

    Ok(SegmentTemplate {
        base: MultiSegmentBase {
            initialization: None,
            timescale: timescale(segment_template.timescale),
            presentation_time_offset: segment_template.presentationTimeOffset.unwrap_or(0),
            start_number: segment_template.startNumber.unwrap_or(1),
            duration,
            timeline,
        },
        initialization: segment_template.initialization.clone(),
        media,
        end_number: None,
    })
}

fn timescale(timescale: Option<u64>) -> u64 {
    timescale.filter(|t| *t > 0).unwrap_or(1)
}

use std::{num::NonZeroUsize, sync::Arc};

use futures::StreamExt;
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    error::{OfflineError, OfflineResult},
    exclusion::{select_base_url, ExclusionState},
    index::{RangedUri, RepresentationIndex, SegmentCount, SegmentIndex, WrappingSegmentIndex},
    manifest::{Manifest, Representation},
    probe::{ContainerIndexProber, DataSource, InlineExecutor, ProbeExecutor},
    segment::{FetchRequest, Segment},
};

const MAX_PREALLOCATED_SEGMENTS: u64 = 4096;

/// Flattens a [`Manifest`] into the ordered list of segments a download job fetches.
///
/// ```text
///  Period 0 ── AdaptationSet 0 ── Representation 0 ─► [init] [index] [media 0..n]
///          │                  └── Representation 1 ─► [init] [index] [media 0..n]
///          └── AdaptationSet 1 ── Representation 0 ─► ...
///  Period 1 ── ...
/// ```
///
/// Segments come out in this traversal order, not sorted by time. Representations without an
/// index in the manifest are probed through the [`DataSource`]; up to `concurrency` probes run
/// at once on the configured [`ProbeExecutor`], without changing the output order.
pub struct SegmentListBuilder<D, E = InlineExecutor, X = ()> {
    data_source: Arc<D>,
    executor: E,
    exclusions: X,
    concurrency: NonZeroUsize,
    cancel: CancellationToken,
    headers: HeaderMap,
}

impl<D> SegmentListBuilder<D>
where
    D: DataSource,
{
    pub fn new(data_source: D) -> Self {
        Self {
            data_source: Arc::new(data_source),
            executor: InlineExecutor,
            exclusions: (),
            concurrency: NonZeroUsize::MIN,
            cancel: CancellationToken::new(),
            headers: HeaderMap::new(),
        }
    }
}

impl<D, E, X> SegmentListBuilder<D, E, X>
where
    D: DataSource,
    E: ProbeExecutor,
    X: ExclusionState,
{
    pub fn with_executor<E2>(self, executor: E2) -> SegmentListBuilder<D, E2, X>
    where
        E2: ProbeExecutor,
    {
        SegmentListBuilder {
            data_source: self.data_source,
            executor,
            exclusions: self.exclusions,
            concurrency: self.concurrency,
            cancel: self.cancel,
            headers: self.headers,
        }
    }

    pub fn with_exclusions<X2>(self, exclusions: X2) -> SegmentListBuilder<D, E, X2>
    where
        X2: ExclusionState,
    {
        SegmentListBuilder {
            data_source: self.data_source,
            executor: self.executor,
            exclusions,
            concurrency: self.concurrency,
            cancel: self.cancel,
            headers: self.headers,
        }
    }

    /// Maximum number of index probes in flight.
    pub fn with_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Cancelling `cancel` interrupts running builds with [`OfflineError::Interrupted`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Headers attached to every produced request.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Lists every segment of `manifest`.
    ///
    /// With `removing` set the list is used to delete previously downloaded data, so a
    /// representation whose index cannot be loaded is skipped instead of failing the build.
    /// Missing or unbounded indices and interruptions fail the build either way.
    pub async fn build_segment_list(
        &self,
        manifest: &Manifest,
        removing: bool,
    ) -> OfflineResult<Vec<Segment>> {
        // Probes left running when the build returns early observe this token
        let cancel = self.cancel.child_token();
        let _guard = cancel.clone().drop_guard();
        let prober = ContainerIndexProber::new(self.data_source.clone(), cancel);

        let jobs = manifest
            .periods
            .iter()
            .enumerate()
            .flat_map(|(period_index, period)| {
                let period_duration_us = manifest.period_duration_us(period_index);
                period.adaptation_sets.iter().flat_map(move |adaptation_set| {
                    adaptation_set
                        .representations
                        .iter()
                        .map(move |representation| RepresentationJob {
                            period_start_us: period.start_us,
                            period_duration_us,
                            representation,
                        })
                })
            });

        let mut results = futures::stream::iter(jobs)
            .map(|job| self.segments_for_representation(job, &prober, removing))
            .buffered(self.concurrency.get());

        let mut segments = Vec::new();
        let mut skipped = 0;
        while let Some(result) = results.next().await {
            match result? {
                Some(representation_segments) => segments.extend(representation_segments),
                None => skipped += 1,
            }
        }

        tracing::info!(
            "Built segment list with {} segments, {skipped} representation(s) skipped.",
            segments.len()
        );
        Ok(segments)
    }

    /// `Ok(None)` when the representation is skipped.
    async fn segments_for_representation(
        &self,
        job: RepresentationJob<'_>,
        prober: &ContainerIndexProber<D>,
        removing: bool,
    ) -> OfflineResult<Option<Vec<Segment>>> {
        let representation = job.representation;
        let base_url = select_base_url(&representation.base_urls, &self.exclusions)
            .ok_or_else(|| OfflineError::NoBaseUrl(representation.id.clone()))?;

        let index = match representation.index() {
            Some(index) => RepresentationIndex::Embedded(index),
            None => match self
                .executor
                .execute(prober.probe(representation, &base_url.url))
                .await
            {
                Ok(Some(chunk_index)) => RepresentationIndex::Discovered(WrappingSegmentIndex::new(
                    chunk_index,
                    representation.presentation_time_offset_us(),
                )),
                // Loading succeeded but there was no index
                Ok(None) => return Err(OfflineError::MissingSegmentIndex),
                Err(e) if removing && !e.is_interruption() => {
                    tracing::warn!(
                        "Skipping representation {:?}, index unavailable: {e}",
                        representation.id
                    );
                    return Ok(None);
                }
                Err(e) => return Err(e),
            },
        };

        let count = match index.segment_count(job.period_duration_us) {
            SegmentCount::Bounded(count) => count,
            SegmentCount::Unbounded => return Err(OfflineError::UnboundedSegmentIndex),
        };
        tracing::debug!(
            "Representation {:?}: {count} segment(s) from {}",
            representation.id,
            base_url.url
        );

        let first_segment_num = index.first_segment_num();
        let end_segment_num = first_segment_num
            .checked_add(count)
            .ok_or(OfflineError::UnboundedSegmentIndex)?;

        let period_start_us = job.period_start_us as i64;
        // Counts come straight from the manifest
        let capacity = count.min(MAX_PREALLOCATED_SEGMENTS).saturating_add(2);
        let mut segments = Vec::with_capacity(capacity as usize);
        let initialization = representation.initialization_uri();
        if let Some(initialization) = &initialization {
            segments.push(self.create_segment(
                representation,
                &base_url.url,
                period_start_us,
                initialization,
            )?);
        }
        if let Some(index_uri) = representation.index_uri() {
            if initialization.as_ref() != Some(&index_uri) {
                segments.push(self.create_segment(
                    representation,
                    &base_url.url,
                    period_start_us,
                    &index_uri,
                )?);
            }
        }

        for segment_num in first_segment_num..end_segment_num {
            segments.push(self.create_segment(
                representation,
                &base_url.url,
                period_start_us + index.time_us(segment_num),
                &index.segment_url(segment_num),
            )?);
        }
        Ok(Some(segments))
    }

    fn create_segment(
        &self,
        representation: &Representation,
        base_url: &Url,
        start_time_us: i64,
        ranged_uri: &RangedUri,
    ) -> OfflineResult<Segment> {
        let url = ranged_uri.resolve(base_url)?;

        // Keyed on the first mirror, so data cached from any mirror is found again
        let cache_key = match (&representation.cache_key, representation.base_urls.first()) {
            (Some(cache_key), _) => cache_key.clone(),
            (None, Some(first)) => ranged_uri.resolve(&first.url)?.to_string(),
            (None, None) => url.to_string(),
        };

        Ok(Segment {
            start_time_us,
            request: FetchRequest {
                url,
                byte_range: ranged_uri.byte_range(),
                headers: self.headers.clone(),
                cache_key,
            },
        })
    }
}

struct RepresentationJob<'a> {
    period_start_us: u64,
    period_duration_us: Option<u64>,
    representation: &'a Representation,
}

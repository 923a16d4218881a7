use std::{collections::HashSet, num::NonZeroUsize, sync::Arc, time::Duration};

use iori_offline::{
    index::{RangedUri, SegmentTimeline, TimelineEntry},
    manifest::{BaseUrl, SegmentBase, SingleSegmentBase},
    BaseUrlExclusionList, ByteRange, OfflineError, SegmentListBuilder, TokioExecutor,
};
use tokio_util::sync::CancellationToken;

use crate::{
    source::{
        list, manifest, representation, sidx_box_v1, template, timeline_template, url, Fmp4,
        MemoryDataSource, Resource,
    },
    AssertWrapper,
};

fn urls(segments: &[iori_offline::Segment]) -> Vec<String> {
    segments
        .iter()
        .map(|s| s.request.url.to_string())
        .collect()
}

#[tokio::test]
async fn test_embedded_index_is_not_probed() {
    let source = MemoryDataSource::new();
    let manifest = manifest(
        Some(16_000_000),
        vec![(
            10_000_000,
            vec![representation("v", &["https://a.example/video/"], template(5, 2000))],
        )],
    );

    let segments = SegmentListBuilder::new(source.clone())
        .build_segment_list(&manifest, false)
        .await
        .assert_success();

    assert_eq!(source.opens(), 0);
    assert_eq!(
        urls(&segments),
        [
            "https://a.example/video/v/init.mp4",
            "https://a.example/video/v/5.m4s",
            "https://a.example/video/v/6.m4s",
            "https://a.example/video/v/7.m4s",
        ]
    );
    let start_times: Vec<_> = segments.iter().map(|s| s.start_time_us).collect();
    assert_eq!(start_times, [10_000_000, 10_000_000, 12_000_000, 14_000_000]);
    assert!(segments.iter().all(|s| s.request.byte_range.is_none()));
}

#[tokio::test]
async fn test_discovered_index() {
    let fmp4 = Fmp4::new(1000, 1000, &[(100, 2000), (150, 2000), (80, 1000)]);
    let source = MemoryDataSource::new();
    source.insert("https://a.example/media.mp4", Resource::Data(fmp4.data.clone()));

    let SegmentBase::Single(mut segment_base) = fmp4.segment_base() else {
        unreachable!()
    };
    segment_base.presentation_time_offset = 1000;
    let manifest = manifest(
        Some(5_000_000),
        vec![(
            0,
            vec![representation(
                "v",
                &["https://a.example/media.mp4"],
                SegmentBase::Single(segment_base),
            )],
        )],
    );

    let segments = SegmentListBuilder::new(source.clone())
        .build_segment_list(&manifest, false)
        .await
        .assert_success();

    // Initialization and index are contiguous, one read covers both
    assert_eq!(source.opens(), 1);
    assert_eq!(segments.len(), 5);
    assert!(segments
        .iter()
        .all(|s| s.request.url.as_str() == "https://a.example/media.mp4"));

    let media_start = fmp4.init_len + fmp4.sidx_len;
    let ranges: Vec<_> = segments.iter().map(|s| s.request.byte_range).collect();
    assert_eq!(
        ranges,
        [
            Some(ByteRange::new(0, Some(fmp4.init_len))),
            Some(ByteRange::new(fmp4.init_len, Some(fmp4.sidx_len))),
            Some(ByteRange::new(media_start, Some(100))),
            Some(ByteRange::new(media_start + 100, Some(150))),
            Some(ByteRange::new(media_start + 250, Some(80))),
        ]
    );
    let start_times: Vec<_> = segments.iter().map(|s| s.start_time_us).collect();
    assert_eq!(start_times, [0, 0, 0, 2_000_000, 4_000_000]);
}

#[tokio::test]
async fn test_index_equal_to_initialization_is_listed_once() {
    let fmp4 = Fmp4::new(1000, 0, &[(100, 2000)]);
    let source = MemoryDataSource::new();
    source.insert("https://a.example/media.mp4", Resource::Data(fmp4.data.clone()));

    let whole_header = fmp4.init_len + fmp4.sidx_len;
    let segment_base = SegmentBase::Single(SingleSegmentBase {
        initialization: Some(RangedUri::new("", 0, Some(whole_header))),
        index_range: Some(ByteRange::new(0, Some(whole_header))),
        timescale: 1000,
        presentation_time_offset: 0,
    });
    let manifest = manifest(
        Some(2_000_000),
        vec![(0, vec![representation("v", &["https://a.example/media.mp4"], segment_base)])],
    );

    let segments = SegmentListBuilder::new(source)
        .build_segment_list(&manifest, false)
        .await
        .assert_success();
    assert_eq!(segments.len(), 2);
    assert_eq!(
        segments[0].request.byte_range,
        Some(ByteRange::new(0, Some(whole_header)))
    );
}

#[tokio::test]
async fn test_missing_index_is_fatal() {
    let fmp4 = Fmp4::without_sidx(&[(100, 2000)]);
    let source = MemoryDataSource::new();
    source.insert("https://a.example/media.mp4", Resource::Data(fmp4.data.clone()));
    let manifest = manifest(
        Some(2_000_000),
        vec![(
            0,
            vec![representation(
                "v",
                &["https://a.example/media.mp4"],
                fmp4.segment_base(),
            )],
        )],
    );

    let builder = SegmentListBuilder::new(source);
    for removing in [false, true] {
        let result = builder.build_segment_list(&manifest, removing).await;
        assert!(
            matches!(result, Err(OfflineError::MissingSegmentIndex)),
            "removing: {removing}, got {result:?}"
        );
    }
}

#[tokio::test]
async fn test_io_error_depends_on_intent() {
    let fmp4 = Fmp4::new(1000, 0, &[(100, 2000)]);
    let source = MemoryDataSource::new();
    source.insert("https://broken.example/media.mp4", Resource::Fail);
    let manifest = manifest(
        Some(4_000_000),
        vec![(
            0,
            vec![
                representation(
                    "broken",
                    &["https://broken.example/media.mp4"],
                    fmp4.segment_base(),
                ),
                representation("ok", &["https://a.example/"], template(1, 2000)),
            ],
        )],
    );

    let builder = SegmentListBuilder::new(source);
    let result = builder.build_segment_list(&manifest, false).await;
    assert!(matches!(result, Err(OfflineError::IOError(_))), "{result:?}");

    let segments = builder
        .build_segment_list(&manifest, true)
        .await
        .assert_success();
    assert_eq!(
        urls(&segments),
        [
            "https://a.example/ok/init.mp4",
            "https://a.example/ok/1.m4s",
            "https://a.example/ok/2.m4s",
        ]
    );
}

#[tokio::test]
async fn test_malformed_container_depends_on_intent() {
    // Offsets past u64::MAX
    let fmp4 = Fmp4::with_sidx(sidx_box_v1(1000, 0, u64::MAX, &[(100, 2000)]), &[(100, 2000)]);
    let source = MemoryDataSource::new();
    source.insert("https://a.example/broken.mp4", Resource::Data(fmp4.data.clone()));
    let manifest = manifest(
        Some(4_000_000),
        vec![(
            0,
            vec![
                representation(
                    "broken",
                    &["https://a.example/broken.mp4"],
                    fmp4.segment_base(),
                ),
                representation("ok", &["https://a.example/"], template(1, 2000)),
            ],
        )],
    );

    let builder = SegmentListBuilder::new(source);
    let result = builder.build_segment_list(&manifest, false).await;
    assert!(
        matches!(result, Err(OfflineError::InvalidContainer(_))),
        "{result:?}"
    );

    let segments = builder
        .build_segment_list(&manifest, true)
        .await
        .assert_success();
    assert_eq!(
        urls(&segments),
        [
            "https://a.example/ok/init.mp4",
            "https://a.example/ok/1.m4s",
            "https://a.example/ok/2.m4s",
        ]
    );
}

#[tokio::test]
async fn test_segment_numbers_past_u64_are_unbounded() {
    let SegmentBase::Template(mut last_number) = template(0, 2000) else {
        unreachable!()
    };
    last_number.end_number = Some(u64::MAX);

    let manifest_with = |segment_base| {
        manifest(
            Some(4_000_000),
            vec![(0, vec![representation("v", &["https://a.example/"], segment_base)])],
        )
    };
    let builder = SegmentListBuilder::new(MemoryDataSource::new());
    for segment_base in [
        SegmentBase::Template(last_number),
        // Two segments numbered from u64::MAX
        template(u64::MAX, 2000),
    ] {
        let result = builder
            .build_segment_list(&manifest_with(segment_base), true)
            .await;
        assert!(
            matches!(result, Err(OfflineError::UnboundedSegmentIndex)),
            "{result:?}"
        );
    }
}

#[tokio::test]
async fn test_no_base_url() {
    let manifest = manifest(
        Some(4_000_000),
        vec![(0, vec![representation("v", &[], template(1, 2000))])],
    );
    let result = SegmentListBuilder::new(MemoryDataSource::new())
        .build_segment_list(&manifest, true)
        .await;
    assert!(
        matches!(&result, Err(OfflineError::NoBaseUrl(Some(id))) if id == "v"),
        "{result:?}"
    );
}

#[tokio::test]
async fn test_excluded_base_url() {
    let manifest = manifest(
        Some(2_000_000),
        vec![(
            0,
            vec![representation(
                "v",
                &["https://a.example/media/", "https://b.example/media/"],
                template(1, 2000),
            )],
        )],
    );
    let source = MemoryDataSource::new();

    let segments = SegmentListBuilder::new(source.clone())
        .build_segment_list(&manifest, false)
        .await
        .assert_success();
    assert_eq!(
        segments[1].request.url.as_str(),
        "https://a.example/media/v/1.m4s"
    );

    let excluded: HashSet<String> = ["https://a.example/media/".to_string()].into();
    let segments = SegmentListBuilder::new(source.clone())
        .with_exclusions(excluded)
        .build_segment_list(&manifest, false)
        .await
        .assert_success();
    assert_eq!(
        urls(&segments),
        [
            "https://b.example/media/v/init.mp4",
            "https://b.example/media/v/1.m4s",
        ]
    );
    // Cached data stays keyed on the first mirror
    assert_eq!(
        segments[1].request.cache_key,
        "https://a.example/media/v/1.m4s"
    );

    // Every mirror excluded: back to the first one
    let exclusions = Arc::new(BaseUrlExclusionList::new());
    for base_url in ["https://a.example/media/", "https://b.example/media/"] {
        exclusions.exclude(&BaseUrl::new(url(base_url)), Duration::from_secs(60));
    }
    let segments = SegmentListBuilder::new(source)
        .with_exclusions(exclusions.clone())
        .build_segment_list(&manifest, false)
        .await
        .assert_success();
    assert_eq!(
        segments[1].request.url.as_str(),
        "https://a.example/media/v/1.m4s"
    );
}

#[tokio::test]
async fn test_cache_key_override() {
    let mut v = representation("v", &["https://a.example/"], template(1, 2000));
    v.cache_key = Some("video-v".to_string());
    let manifest = manifest(Some(2_000_000), vec![(0, vec![v])]);

    let segments = SegmentListBuilder::new(MemoryDataSource::new())
        .build_segment_list(&manifest, false)
        .await
        .assert_success();
    assert!(segments.iter().all(|s| s.request.cache_key == "video-v"));
}

#[tokio::test]
async fn test_unbounded_index_is_fatal() {
    let mut representations: Vec<_> = (0..9)
        .map(|i| {
            representation(
                &format!("list-{i}"),
                &["https://a.example/"],
                list(&["1.mp4", "2.mp4"]),
            )
        })
        .collect();
    representations.push(representation("live", &["https://a.example/"], template(1, 2000)));
    let manifest = manifest(None, vec![(0, representations)]);

    let builder = SegmentListBuilder::new(MemoryDataSource::new());
    for removing in [false, true] {
        let result = builder.build_segment_list(&manifest, removing).await;
        assert!(
            matches!(result, Err(OfflineError::UnboundedSegmentIndex)),
            "removing: {removing}, got {result:?}"
        );
    }
}

#[tokio::test]
async fn test_open_ended_timeline() {
    let timeline = SegmentTimeline::new(&[TimelineEntry {
        time: Some(0),
        duration: 2000,
        repeat: -1,
    }]);
    let manifest = manifest(
        Some(7_000_000),
        vec![(
            0,
            vec![representation("v", &["https://a.example/"], timeline_template(timeline))],
        )],
    );

    let segments = SegmentListBuilder::new(MemoryDataSource::new())
        .build_segment_list(&manifest, false)
        .await
        .assert_success();
    assert_eq!(
        urls(&segments),
        [
            "https://a.example/v/t0.m4s",
            "https://a.example/v/t2000.m4s",
            "https://a.example/v/t4000.m4s",
            "https://a.example/v/t6000.m4s",
        ]
    );
}

#[tokio::test]
async fn test_multi_period_order() {
    let manifest = manifest(
        Some(6_000_000),
        vec![
            (
                0,
                vec![
                    representation("a", &["https://a.example/"], template(1, 2000)),
                    representation("b", &["https://a.example/"], list(&["b1.mp4", "b2.mp4"])),
                ],
            ),
            (
                4_000_000,
                vec![representation("c", &["https://a.example/"], template(1, 2000))],
            ),
        ],
    );

    let segments = SegmentListBuilder::new(MemoryDataSource::new())
        .build_segment_list(&manifest, false)
        .await
        .assert_success();
    assert_eq!(
        urls(&segments),
        [
            "https://a.example/a/init.mp4",
            "https://a.example/a/1.m4s",
            "https://a.example/a/2.m4s",
            "https://a.example/init.mp4",
            "https://a.example/b1.mp4",
            "https://a.example/b2.mp4",
            "https://a.example/c/init.mp4",
            "https://a.example/c/1.m4s",
        ]
    );
    assert_eq!(segments.last().unwrap().start_time_us, 4_000_000);
}

#[tokio::test]
async fn test_cancellation_interrupts_build() {
    let fmp4 = Fmp4::new(1000, 0, &[(100, 2000)]);
    let source = MemoryDataSource::new();
    source.insert("https://a.example/media.mp4", Resource::Hang);
    let manifest = manifest(
        Some(2_000_000),
        vec![(
            0,
            vec![representation(
                "v",
                &["https://a.example/media.mp4"],
                fmp4.segment_base(),
            )],
        )],
    );

    let cancel = CancellationToken::new();
    let builder = SegmentListBuilder::new(source).with_cancellation(cancel.clone());
    let (result, _) = tokio::join!(builder.build_segment_list(&manifest, true), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    assert!(matches!(result, Err(OfflineError::Interrupted)), "{result:?}");

    // Already cancelled
    let result = builder.build_segment_list(&manifest, true).await;
    assert!(matches!(result, Err(OfflineError::Interrupted)), "{result:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_probes_keep_order() {
    let source = MemoryDataSource::new().with_delay(Duration::from_millis(100));
    let mut representations = Vec::new();
    for i in 0..6 {
        let fmp4 = Fmp4::new(1000, 0, &[(100, 2000), (100, 2000)]);
        let media_url = format!("https://a.example/{i}.mp4");
        source.insert(&media_url, Resource::Data(fmp4.data.clone()));
        representations.push(representation(
            &i.to_string(),
            &[media_url.as_str()],
            fmp4.segment_base(),
        ));
    }
    let manifest = manifest(Some(4_000_000), vec![(0, representations)]);

    let segments = SegmentListBuilder::new(source.clone())
        .with_executor(TokioExecutor::current().unwrap())
        .with_concurrency(NonZeroUsize::new(3).unwrap())
        .build_segment_list(&manifest, false)
        .await
        .assert_success();

    assert_eq!(source.opens(), 6);
    assert!(source.peak_in_flight() > 1);
    assert!(source.peak_in_flight() <= 3);

    assert_eq!(segments.len(), 6 * 4);
    for (i, chunk) in segments.chunks(4).enumerate() {
        let expected = format!("https://a.example/{i}.mp4");
        assert!(chunk.iter().all(|s| s.request.url.as_str() == expected));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_interrupts_spawned_reads() {
    let fmp4 = Fmp4::new(1000, 0, &[(100, 2000)]);
    let source = MemoryDataSource::new();
    source.insert("https://a.example/media.mp4", Resource::Hang);
    let manifest = manifest(
        Some(2_000_000),
        vec![(
            0,
            vec![representation(
                "v",
                &["https://a.example/media.mp4"],
                fmp4.segment_base(),
            )],
        )],
    );

    let cancel = CancellationToken::new();
    let builder = SegmentListBuilder::new(source.clone())
        .with_executor(TokioExecutor::current().unwrap())
        .with_cancellation(cancel.clone());
    let (result, _) = tokio::join!(builder.build_segment_list(&manifest, true), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    assert!(matches!(result, Err(OfflineError::Interrupted)), "{result:?}");
    assert_eq!(source.released_hangs(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fatal_error_stops_running_reads() {
    let missing = Fmp4::without_sidx(&[(100, 2000)]);
    let hanging = Fmp4::new(1000, 0, &[(100, 2000)]);
    let source = MemoryDataSource::new();
    // Fails once the other representation is waiting on its read
    source.insert(
        "https://a.example/missing.mp4",
        Resource::Delayed(Duration::from_millis(100), missing.data.clone()),
    );
    source.insert("https://a.example/hanging.mp4", Resource::Hang);
    let manifest = manifest(
        Some(2_000_000),
        vec![(
            0,
            vec![
                representation(
                    "missing",
                    &["https://a.example/missing.mp4"],
                    missing.segment_base(),
                ),
                representation(
                    "hanging",
                    &["https://a.example/hanging.mp4"],
                    hanging.segment_base(),
                ),
            ],
        )],
    );

    // The caller's token is never cancelled
    let cancel = CancellationToken::new();
    let result = SegmentListBuilder::new(source.clone())
        .with_executor(TokioExecutor::current().unwrap())
        .with_concurrency(NonZeroUsize::new(2).unwrap())
        .with_cancellation(cancel.clone())
        .build_segment_list(&manifest, false)
        .await;
    assert!(
        matches!(result, Err(OfflineError::MissingSegmentIndex)),
        "{result:?}"
    );
    assert!(!cancel.is_cancelled());

    // The spawned read outlives the build until it sees the build's own token
    for _ in 0..100 {
        if source.released_hangs() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(source.released_hangs(), 1);
}

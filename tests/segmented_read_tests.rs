#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

mod common;

use std::sync::Arc;

use common::{MemoryBackend, dyn_backend};
use ipfs_mount::errors::FsError;
use ipfs_mount::read::{ReadError, ReadStrategy, SegmentedReader};
use ipfs_mount::segment::Segment;

const MARGIN: usize = 16;

fn source() -> Vec<u8> {
    (0..=255u8).cycle().take(1000).collect()
}

fn reader(backend: &Arc<MemoryBackend>, strategy: ReadStrategy) -> SegmentedReader {
    SegmentedReader::new(dyn_backend(backend), strategy)
}

/// Reads `segment` into a zeroed buffer `MARGIN` bytes larger than needed.
async fn read_with_margin(reader: &SegmentedReader, segment: Segment) -> (Segment, Vec<u8>) {
    let mut buf = vec![0u8; usize::try_from(segment.length).unwrap() + MARGIN];
    let filled = reader.read("/obj", &mut buf, segment).await.unwrap();
    (filled, buf)
}

fn assert_round_trip(segment: Segment, filled: Segment, buf: &[u8]) {
    let src = source();
    let start = usize::try_from(segment.offset).unwrap();
    let len = usize::try_from(segment.length).unwrap();
    assert_eq!(filled, segment, "full segment should be reported");
    assert_eq!(&buf[..len], &src[start..start + len], "bytes differ for {segment}");
    assert!(
        buf[len..].iter().all(|&b| b == 0),
        "margin past {segment} was touched"
    );
}

const SEGMENTS: [Segment; 5] = [
    Segment::new(0, 1),
    Segment::new(0, 1000),
    Segment::new(3, 100),
    Segment::new(511, 489),
    Segment::new(999, 1),
];

#[tokio::test]
async fn honoring_backend_round_trips() {
    let backend = Arc::new(MemoryBackend::new().with_file("/obj", &source()));
    for strategy in [ReadStrategy::Buffered, ReadStrategy::Streaming] {
        let reader = reader(&backend, strategy);
        for segment in SEGMENTS {
            let (filled, buf) = read_with_margin(&reader, segment).await;
            assert_round_trip(segment, filled, &buf);
        }
    }
}

#[tokio::test]
async fn range_ignoring_backend_is_clamped() {
    let backend = Arc::new(MemoryBackend::new().with_file("/obj", &source()));
    backend.knobs.lock().unwrap().ignore_range = true;

    for strategy in [ReadStrategy::Buffered, ReadStrategy::Streaming] {
        let reader = reader(&backend, strategy);
        // The streaming reader only copies from the front of what it receives, so offset zero
        // is the case it can serve correctly from a whole-object reply.
        let (filled, buf) = read_with_margin(&reader, Segment::new(0, 10)).await;
        assert_round_trip(Segment::new(0, 10), filled, &buf);
    }
}

#[tokio::test]
async fn buffered_read_locates_offset_in_whole_object_reply() {
    let backend = Arc::new(MemoryBackend::new().with_file("/obj", &source()));
    backend.knobs.lock().unwrap().ignore_range = true;
    let reader = reader(&backend, ReadStrategy::Buffered);

    for segment in [Segment::new(3, 100), Segment::new(900, 50)] {
        let (filled, buf) = read_with_margin(&reader, segment).await;
        assert_round_trip(segment, filled, &buf);
    }
}

#[tokio::test]
async fn chunked_replies_are_reassembled() {
    let backend = Arc::new(MemoryBackend::new().with_file("/obj", &source()));
    backend.knobs.lock().unwrap().read_chunk = Some(7);

    for strategy in [ReadStrategy::Buffered, ReadStrategy::Streaming] {
        let reader = reader(&backend, strategy);
        for segment in SEGMENTS {
            let (filled, buf) = read_with_margin(&reader, segment).await;
            assert_round_trip(segment, filled, &buf);
        }
    }
}

#[tokio::test]
async fn streaming_stops_once_filled() {
    let backend = Arc::new(MemoryBackend::new().with_file("/obj", &source()));
    {
        let mut knobs = backend.knobs.lock().unwrap();
        knobs.ignore_range = true;
        knobs.read_chunk = Some(4);
    }
    let reader = reader(&backend, ReadStrategy::Streaming);

    let (filled, buf) = read_with_margin(&reader, Segment::new(0, 6)).await;
    assert_round_trip(Segment::new(0, 6), filled, &buf);
}

#[tokio::test]
async fn short_reply_is_a_short_read() {
    let backend = Arc::new(MemoryBackend::new().with_file("/obj", &source()));
    backend.knobs.lock().unwrap().read_cap = Some(10);

    for strategy in [ReadStrategy::Buffered, ReadStrategy::Streaming] {
        let reader = reader(&backend, strategy);
        let (filled, buf) = read_with_margin(&reader, Segment::new(5, 50)).await;
        assert_eq!(filled, Segment::new(5, 10));
        assert_eq!(&buf[..10], &source()[5..15]);
        assert!(buf[10..].iter().all(|&b| b == 0));
    }
}

#[tokio::test]
async fn read_past_end_returns_nothing() {
    let backend = Arc::new(MemoryBackend::new().with_file("/obj", b"tiny"));
    let reader = reader(&backend, ReadStrategy::Buffered);
    let mut buf = [0u8; 8];
    let filled = reader.read("/obj", &mut buf, Segment::new(100, 8)).await.unwrap();
    assert_eq!(filled, Segment::new(100, 0));
}

#[tokio::test]
async fn zero_length_segment_skips_the_backend() {
    let backend = Arc::new(MemoryBackend::new().with_file("/obj", b"data"));
    let reader = reader(&backend, ReadStrategy::Streaming);
    let mut buf = [0u8; 4];
    let filled = reader.read("/obj", &mut buf, Segment::new(2, 0)).await.unwrap();
    assert_eq!(filled, Segment::new(2, 0));
    assert!(backend.reads().is_empty());
}

#[tokio::test]
async fn segment_larger_than_buffer_is_rejected() {
    let backend = Arc::new(MemoryBackend::new().with_file("/obj", b"data"));
    let reader = reader(&backend, ReadStrategy::Buffered);
    let mut buf = [0u8; 2];
    let err = reader
        .read("/obj", &mut buf, Segment::new(0, 4))
        .await
        .unwrap_err();
    assert!(matches!(err, ReadError::SegmentExceedsBuffer { capacity: 2, .. }));
    assert_eq!(FsError::from(err), FsError::BadSegment);
    assert!(backend.reads().is_empty(), "no fetch for an invalid request");
}

#[tokio::test]
async fn overflowing_segment_is_rejected() {
    let backend = Arc::new(MemoryBackend::new());
    let reader = reader(&backend, ReadStrategy::Buffered);
    let mut buf = [0u8; 2];
    let err = reader
        .read("/obj", &mut buf, Segment::new(u64::MAX, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, ReadError::SegmentOverflow(_)));
}

#[tokio::test]
async fn missing_object_maps_to_not_found() {
    let backend = Arc::new(MemoryBackend::new());
    for strategy in [ReadStrategy::Buffered, ReadStrategy::Streaming] {
        let reader = reader(&backend, strategy);
        let mut buf = [0u8; 4];
        let err = reader
            .read("/nope", &mut buf, Segment::new(0, 4))
            .await
            .unwrap_err();
        assert_eq!(FsError::from(err), FsError::NotFound);
    }
    assert_eq!(backend.reads().len(), 2, "exactly one fetch per read, no retry");
}

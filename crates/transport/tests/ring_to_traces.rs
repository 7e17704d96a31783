//! Frames written by a producer reach the trace table through the ring

use seisbuf_metadata::{CatalogChannel, ChannelKey, ChannelMetadata};
use seisbuf_tracebuf::{
    reassemble, ByteOrder, ChannelRegistry, Decoder, RingFrameDecoder, SampleWidth, TraceFrame,
    TraceTable,
};
use seisbuf_transport::{
    read_cycle, ReadStatus, RingBuffer, RingReaderConfig, FRAME_KIND_TRACEBUF2,
};
use tokio_util::sync::CancellationToken;

fn frame(sta: &str, start: f64, samples: Vec<i32>) -> Vec<u8> {
    TraceFrame {
        pin: 0,
        key: ChannelKey::new(sta, "XX", "HNZ", "00").unwrap(),
        start_time: start,
        end_time: start + (samples.len() as f64 - 1.0) * 0.5,
        sample_rate: 2.0,
        byte_order: ByteOrder::Big,
        width: SampleWidth::Four,
        quality: [0, 0],
        samples,
    }
    .encode()
}

#[test]
fn test_ring_frames_reassemble_with_gap() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("seisbuf.ring");
    let producer = RingBuffer::create(&path, 64).unwrap();

    // Second and first frame are contiguous; the third follows a gap
    assert!(producer.try_write(FRAME_KIND_TRACEBUF2, &frame("YYYY", 102.0, vec![5, 6, 7, 8])));
    assert!(producer.try_write(FRAME_KIND_TRACEBUF2, &frame("YYYY", 100.0, vec![1, 2, 3, 4])));
    assert!(producer.try_write(FRAME_KIND_TRACEBUF2, &frame("ZZZZ", 100.0, vec![0])));
    assert!(producer.try_write(FRAME_KIND_TRACEBUF2, &frame("YYYY", 110.0, vec![9])));

    let mut consumer = RingBuffer::open(&path).unwrap();
    let channels = vec![CatalogChannel {
        key: ChannelKey::new("YYYY", "XX", "HNZ", "00").unwrap(),
        metadata: ChannelMetadata::default(),
    }];
    let mut table = TraceTable::new(&channels);
    let registry = ChannelRegistry::build(&table.keys());

    let batch = read_cycle(
        &mut consumer,
        &registry,
        &RingReaderConfig::default(),
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(batch.status, ReadStatus::Drained);
    assert_eq!(batch.read, 4);
    assert_eq!(batch.skipped, 1);

    let decoded = Decoder::RingFrame(RingFrameDecoder::default()).decode_batch(batch.frames.iter());
    assert_eq!(decoded.failed, 0);

    let report = reassemble(&mut table, &registry, decoded.messages).unwrap();
    assert_eq!(report.accepted, 3);

    let trace = table.get(0).unwrap();
    assert_eq!(trace.dt, Some(0.5));
    assert_eq!(trace.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    assert_eq!(trace.chunk_ptr, vec![0, 8, 9]);
    assert_eq!(trace.times[7], 103.5);
}

//! JSON position messages through decoding and reassembly

use seisbuf_metadata::{ChannelCatalog, Station};
use seisbuf_tracebuf::{reassemble, ChannelRegistry, Decoder, JsonDecoder, TraceTable};

fn catalog() -> ChannelCatalog {
    let station = |sta: &str| Station {
        network: "PW".to_string(),
        station: sta.to_string(),
        channel_prefix: "LY".to_string(),
        location: "00".to_string(),
        latitude: 45.0,
        longitude: -122.0,
        elevation: 0.0,
        gain: 1.0,
    };
    ChannelCatalog {
        stations: vec![station("P373"), station("P395")],
    }
}

fn position(sta: &str, time_ms: i64, up: f64) -> Vec<u8> {
    format!(
        r#"{{"time": {time_ms}, "Q": 1, "type": "ENU", "SNCL": "{sta}.PW.LY_.00",
            "coor": [0.1, 0.2, {up}], "err": [0.01, 0.02, 0.03], "rate": 1}}"#
    )
    .into_bytes()
}

#[test]
fn test_position_stream_reassembles_per_channel() {
    let channels = catalog().channels().unwrap();
    let mut table = TraceTable::new(&channels);
    let registry = ChannelRegistry::build(&table.keys());
    assert_eq!(table.len(), 14);

    // Out of order, one second gap for P373, one unknown station
    let frames = vec![
        position("P373", 3_000, 3.0),
        position("P373", 1_000, 1.0),
        position("P395", 1_000, 9.0),
        position("OTHR", 1_000, 0.0),
        position("P373", 2_000, 2.0),
        position("P373", 5_000, 5.0),
    ];
    let decoder = Decoder::Json(JsonDecoder);
    let batch = decoder.decode_batch(frames.iter().map(Vec::as_slice));
    assert_eq!(batch.frames, 6);
    assert_eq!(batch.failed, 0);
    assert_eq!(batch.messages.len(), 42);

    let report = reassemble(&mut table, &registry, batch.messages).unwrap();
    assert_eq!(report.total, 42);
    assert_eq!(report.skipped, 7);
    assert_eq!(report.accepted, 35);
    assert_eq!(report.channels_with_data, 14);

    let up = table
        .iter()
        .find(|t| t.key.canonical() == "PW.P373.LYZ.00")
        .unwrap();
    assert_eq!(up.data, vec![1.0, 2.0, 3.0, 5.0]);
    assert_eq!(up.times, vec![1.0, 2.0, 3.0, 5.0]);
    assert_eq!(up.chunk_ptr, vec![0, 3, 4]);

    let quality = table
        .iter()
        .find(|t| t.key.canonical() == "PW.P395.LYQ.00")
        .unwrap();
    assert_eq!(quality.data, vec![1.0]);
    assert_eq!(quality.nchunks(), 1);
}

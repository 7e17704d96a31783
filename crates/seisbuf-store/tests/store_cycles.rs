use chrono::{TimeZone, Utc};
use seisbuf_metadata::{CatalogChannel, ChannelKey, ChannelMetadata};
use seisbuf_store::{StoreError, TraceStore};
use seisbuf_tracebuf::{reassemble, ChannelRegistry, DecodedMessage, TraceTable};
use tempfile::TempDir;

fn channel(name: &str, gain: f64) -> CatalogChannel {
    CatalogChannel {
        key: ChannelKey::parse_canonical(name).unwrap(),
        metadata: ChannelMetadata {
            latitude: 34.0,
            longitude: -118.0,
            elevation: 250.0,
            gain,
        },
    }
}

fn msg(name: &str, start: f64, dt: f64, samples: Vec<f64>) -> DecodedMessage {
    DecodedMessage::new(ChannelKey::parse_canonical(name).unwrap(), start, samples, dt)
}

fn setup() -> (TraceTable, ChannelRegistry) {
    let table = TraceTable::new(&[
        channel("CI.SBCC.LYZ.00", 1.0),
        channel("CI.SBCC.HNZ.00", 1000.0),
        channel("CI.SBCC.HNN.00", 1000.0),
        channel("CI.PASA.LYZ.00", 1.0),
    ]);
    let registry = ChannelRegistry::build(&table.keys());
    (table, registry)
}

#[test]
fn test_cycles_round_trip_grouped_by_dt() {
    let tmp = TempDir::new().unwrap();
    let (mut table, registry) = setup();
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    let mut writer = TraceStore::create(tmp.path()).unwrap();

    reassemble(
        &mut table,
        &registry,
        vec![
            msg("CI.SBCC.HNZ.00", 10.0, 0.01, vec![1.0, 2.0]),
            msg("CI.SBCC.LYZ.00", 10.0, 1.0, vec![0.5]),
            msg("CI.SBCC.HNN.00", 10.0, 0.01, vec![3.0]),
            msg("CI.SBCC.HNZ.00", 11.0, 0.01, vec![4.0]),
        ],
    )
    .unwrap();
    let first = writer.write_cycle(&table, at).unwrap();
    assert_eq!(first.cycle, 0);
    assert_eq!(first.groups.len(), 2);
    assert_eq!(first.groups[0].file, "dt_10000.parquet");
    assert_eq!(first.groups[0].traces, 2);
    assert_eq!(first.groups[0].samples, 4);
    assert_eq!(first.groups[1].file, "dt_1000000.parquet");

    reassemble(&mut table, &registry, vec![msg("CI.PASA.LYZ.00", 20.0, 1.0, vec![7.0])]).unwrap();
    writer.write_cycle(&table, at).unwrap();
    writer.close().unwrap();
    assert!(matches!(writer.write_cycle(&table, at), Err(StoreError::Closed)));

    let reader = TraceStore::open(tmp.path()).unwrap();
    assert_eq!(reader.cycles().unwrap(), vec![0, 1]);
    assert_eq!(reader.manifest().unwrap().cycles.len(), 2);

    let groups = reader.read_cycle(0).unwrap();
    assert_eq!(groups.len(), 2);
    assert!(groups[0].dt < groups[1].dt);
    assert_eq!(groups[0].dt, 0.01);

    let hnz = groups[0]
        .traces
        .iter()
        .find(|t| t.key.canonical() == "CI.SBCC.HNZ.00")
        .unwrap();
    assert_eq!(hnz.data, vec![1.0, 2.0, 4.0]);
    assert_eq!(hnz.chunk_ptr, vec![0, 2, 3]);
    assert_eq!(hnz.metadata.gain, 1000.0);
    assert_eq!(hnz.metadata.elevation, 250.0);

    let (mut restored, _) = setup();
    assert_eq!(reader.load_cycle_into(0, &mut restored).unwrap(), 3);
    assert_eq!(restored.get(1).unwrap().data, vec![1.0, 2.0, 4.0]);
    assert!(!restored.get(3).unwrap().has_data());

    assert!(matches!(reader.read_cycle(9), Err(StoreError::CycleNotFound(9))));
}

#[test]
fn test_reopened_writer_continues_numbering() {
    let tmp = TempDir::new().unwrap();
    let (mut table, registry) = setup();
    let at = Utc::now();
    reassemble(&mut table, &registry, vec![msg("CI.PASA.LYZ.00", 0.0, 1.0, vec![1.0])]).unwrap();

    {
        let mut writer = TraceStore::create(tmp.path()).unwrap();
        writer.write_cycle(&table, at).unwrap();
        // Closed on drop
    }
    assert!(tmp.path().join("manifest.json").exists());

    let mut writer = TraceStore::create(tmp.path()).unwrap();
    assert_eq!(writer.write_cycle(&table, at).unwrap().cycle, 1);
    writer.close().unwrap();

    let reader = TraceStore::open(tmp.path()).unwrap();
    assert_eq!(reader.cycles().unwrap(), vec![0, 1]);
}

#[test]
fn test_empty_table_records_empty_cycle() {
    let tmp = TempDir::new().unwrap();
    let (table, _) = setup();
    let mut writer = TraceStore::create(tmp.path()).unwrap();
    let entry = writer.write_cycle(&table, Utc::now()).unwrap();
    assert!(entry.groups.is_empty());
    writer.close().unwrap();

    let reader = TraceStore::open(tmp.path()).unwrap();
    assert!(reader.read_cycle(0).unwrap().is_empty());
}

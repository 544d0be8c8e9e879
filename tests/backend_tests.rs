//! Backend round-trips and isolation, seen from outside the workspace crates.

use std::sync::Arc;

use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use hopper::backend::SqlBackend;
use hopper::io::connectors::{BytesFile, IoContext, Source, Target};
use hopper::io::MemoryStorage;
use hopper::{build_backend, Backend, BackendKind, Error};

const KINDS: [BackendKind; 4] = [
    BackendKind::Columnar,
    BackendKind::Dataframe,
    BackendKind::Sql,
    BackendKind::Bytes,
];

fn trades() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("symbol", DataType::Utf8, true),
        Field::new("price", DataType::Float64, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![10, 11, 12])),
            Arc::new(StringArray::from(vec![Some("ABC"), None, Some("XYZ")])),
            Arc::new(Float64Array::from(vec![Some(1.5), Some(2.0), None])),
        ],
    )
    .unwrap()
}

#[test]
fn every_backend_round_trips_its_own_values() {
    for kind in KINDS {
        let backend = build_backend(kind).unwrap();
        let ir = backend.from_columnar(trades()).unwrap();
        assert_eq!(ir.origin().kind, kind);
        let back = backend.to_columnar(&ir).unwrap();
        assert_eq!(back.num_rows(), 3, "{kind}");
        assert_eq!(back.columns(), trades().columns(), "{kind}");
    }
}

#[test]
fn no_backend_reads_another_backends_values() {
    for producer in KINDS {
        let from = build_backend(producer).unwrap();
        let ir = from.from_columnar(trades()).unwrap();
        for consumer in KINDS.into_iter().filter(|k| *k != producer) {
            let to = build_backend(consumer).unwrap();
            let err = to.to_columnar(&ir).unwrap_err();
            assert!(
                matches!(err, Error::Conversion { .. }),
                "{producer} -> {consumer}: {err}"
            );
        }
    }
}

#[test]
fn sql_backends_are_independent_sessions() {
    let a = SqlBackend::new().unwrap();
    let b = SqlBackend::new().unwrap();
    let ir = a.from_columnar(trades()).unwrap();
    assert_eq!(a.relation_names().len(), 1);
    assert!(b.relation_names().is_empty());
    assert!(b.to_columnar(&ir).is_err());
    assert!(b.query(&ir, "SELECT * FROM this").is_err());
}

#[test]
fn bytes_payloads_move_through_storage_untouched() {
    let store = MemoryStorage::named("backend-bytes-test");
    store.insert("in.bin", &b"\x00\x01opaque\xff"[..]);

    let backend = build_backend(BackendKind::Bytes).unwrap();
    let ctx = IoContext::new(Arc::clone(&backend));
    let source = BytesFile::new("memory://backend-bytes-test/in.bin", &ctx).unwrap();
    let target = BytesFile::new("memory://backend-bytes-test/out.bin", &ctx).unwrap();

    let tables = source.load().unwrap();
    assert_eq!(tables.len(), 1);
    target.write(&tables[0].1).unwrap();
    assert_eq!(store.get("out.bin").unwrap(), store.get("in.bin").unwrap());
}

//! Fixed-width decoding through the public connectors and pipeline.

use std::fs;
use std::sync::Arc;

use arrow::array::{Array, Float64Array, StringArray};
use arrow::record_batch::RecordBatch;
use hopper::core::report::RunState;
use hopper::fwf::{ColumnLayout, DecodeOptions, Discriminator, FixedWidthDecoder, MultiSchemaDecoder, RejectKind, SchemaMap};
use hopper::io::connectors::{CsvFile, CsvOptions, IoContext, MultiFixedWidthFile, MultiFixedWidthOptions};
use hopper::{build_backend, BackendKind, Error, Pipeline};

const FEED: &str = "HDR20240101\n\
DTLacct01     12.50\n\
DTLacct02      7.25\n\
XXXgarbage\n\
\n\
HDR20240102\n\
TRLend\n";

const SCHEMA_MAP: &str = r#"{
    "HDR": {"colspecs": [[0, 8]], "colnames": ["date"]},
    "DTL": {"colspecs": [[0, 6], [6, 10]], "colnames": ["account", "amount"], "dtypes": ["utf8", "f64"]}
}"#;

fn strings(batch: &RecordBatch, col: &str) -> Vec<String> {
    let arr = batch
        .column_by_name(col)
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    (0..arr.len()).map(|i| arr.value(i).to_string()).collect()
}

#[test]
fn single_schema_slices_and_strips() {
    let layout = ColumnLayout::from_parts(&[(0, 2), (3, 5)], &["x".into(), "y".into()], None).unwrap();
    let decoded = FixedWidthDecoder::new(layout, DecodeOptions::default())
        .decode_str("ab cd   ")
        .unwrap();
    assert_eq!(decoded.batch.num_rows(), 1);
    assert_eq!(strings(&decoded.batch, "x"), vec!["ab"]);
    assert_eq!(strings(&decoded.batch, "y"), vec!["cd"]);
}

#[test]
fn overlapping_columns_are_cut_independently() {
    let layout = ColumnLayout::from_parts(
        &[(0, 8), (0, 4), (4, 4)],
        &["date".into(), "year".into(), "monthday".into()],
        None,
    )
    .unwrap();
    let decoded = FixedWidthDecoder::new(layout, DecodeOptions::default())
        .decode_str("20240315\n")
        .unwrap();
    assert_eq!(strings(&decoded.batch, "date"), vec!["20240315"]);
    assert_eq!(strings(&decoded.batch, "year"), vec!["2024"]);
    assert_eq!(strings(&decoded.batch, "monthday"), vec!["0315"]);
}

#[test]
fn multi_schema_dispatches_in_first_encounter_order() {
    let map = SchemaMap::from_json_str(SCHEMA_MAP).unwrap();
    let decoder = MultiSchemaDecoder::new(
        Discriminator::new(0, 3).unwrap(),
        map,
        DecodeOptions::default().lenient(),
    )
    .unwrap();
    let decoded = decoder.decode_str(FEED).unwrap();

    let keys: Vec<&str> = decoded.tables.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["HDR", "DTL"]);

    let hdr = decoded.table("HDR").unwrap();
    assert_eq!(strings(hdr, "date"), vec!["20240101", "20240102"]);

    let dtl = decoded.table("DTL").unwrap();
    assert_eq!(strings(dtl, "account"), vec!["acct01", "acct02"]);
    let amounts = dtl
        .column_by_name("amount")
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(amounts.values().to_vec(), vec![12.5, 7.25]);
}

#[test]
fn every_unmatched_line_is_reported_once() {
    let map = SchemaMap::from_json_str(SCHEMA_MAP).unwrap();
    let decoder = MultiSchemaDecoder::new(
        Discriminator::new(0, 3).unwrap(),
        map,
        DecodeOptions::default().lenient(),
    )
    .unwrap();
    let decoded = decoder.decode_str(FEED).unwrap();

    let unmatched: Vec<(usize, String)> = decoded
        .rejects
        .iter()
        .filter_map(|r| match &r.kind {
            RejectKind::Unmatched { discriminator } => Some((r.line, discriminator.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(unmatched, vec![(4, "XXX".to_string()), (7, "TRL".to_string())]);
    assert_eq!(decoded.rejects.len(), 2);
}

#[test]
fn strict_decode_stops_at_the_first_unmatched_line() {
    let map = SchemaMap::from_json_str(SCHEMA_MAP).unwrap();
    let decoder =
        MultiSchemaDecoder::new(Discriminator::new(0, 3).unwrap(), map, DecodeOptions::default()).unwrap();
    match decoder.decode_str(FEED).unwrap_err() {
        Error::UnmatchedDiscriminator { line, discriminator } => {
            assert_eq!(line, 4);
            assert_eq!(discriminator, "XXX");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn multi_schema_file_writes_one_target_per_key() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("feed.txt");
    let output = dir.path().join("feed.csv");
    fs::write(&input, FEED).unwrap();

    let backend = build_backend(BackendKind::Columnar).unwrap();
    let ctx = IoContext::new(Arc::clone(&backend));
    let options: MultiFixedWidthOptions = serde_json::from_str(&format!(
        r#"{{"schema_map": {SCHEMA_MAP}, "lenient": true}}"#
    ))
    .unwrap();
    let source = Arc::new(MultiFixedWidthFile::new(input.to_str().unwrap(), &ctx, options).unwrap());
    let target = CsvFile::new(output.to_str().unwrap(), &ctx, CsvOptions::default()).unwrap();

    let mut pipeline = Pipeline::new(backend)
        .with_shared_source(source.clone())
        .with_target(target);
    let report = pipeline.run().unwrap();
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.steps[0].rows, Some(4));

    assert_eq!(
        fs::read_to_string(dir.path().join("feed_HDR.csv")).unwrap(),
        "date\n20240101\n20240102\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("feed_DTL.csv")).unwrap(),
        "account,amount\nacct01,12.5\nacct02,7.25\n"
    );
    assert!(!output.exists());
    assert_eq!(source.last_rejects().len(), 2);
}

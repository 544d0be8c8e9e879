//! Declarative pipelines run end to end against temp directories.

use std::fs;

use hopper::core::config::RunConfig;
use hopper::core::report::{RunState, StepKind};
use hopper::{Pipeline, PipelineDoc, Registry};

fn write_orders(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("orders.csv");
    fs::write(
        &path,
        "id,region,total\n1,eu,10.5\n2,us,3.0\n3,eu,7.25\n4,apac,\n",
    )
    .unwrap();
    path
}

#[test]
fn csv_to_jsonl_over_the_sql_backend() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_orders(dir.path());
    let output = dir.path().join("eu.jsonl");

    let yaml = format!(
        r#"
backend: sql
source: {{ type: csv, path: "{}" }}
transforms:
  - type: sql
    query: "SELECT id, total FROM this WHERE region = 'eu' ORDER BY id"
  - {{ type: rename_columns, mapping: {{ total: amount }} }}
target: {{ type: jsonl, path: "{}" }}
"#,
        input.display(),
        output.display()
    );
    let mut pipeline = Pipeline::from_yaml_str(&yaml).unwrap();
    let report = pipeline.run().unwrap();
    assert_eq!(report.backend, "sql");
    assert_eq!(report.state, RunState::Completed);

    let written = fs::read_to_string(&output).unwrap();
    let rows: Vec<serde_json::Value> = written
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], 1);
    assert_eq!(rows[0]["amount"], 10.5);
    assert_eq!(rows[1]["id"], 3);
}

#[test]
fn same_document_runs_on_every_table_backend() {
    for backend in ["columnar", "dataframe", "sql"] {
        let dir = tempfile::tempdir().unwrap();
        let input = write_orders(dir.path());
        let output = dir.path().join("out.csv");
        let yaml = format!(
            r#"
backend: {backend}
source: {{ type: csv, path: "{}" }}
transforms:
  - {{ type: drop_nulls }}
  - {{ type: filter, expr: "total > 5" }}
  - {{ type: select_columns, columns: [region, id] }}
target: {{ type: csv, path: "{}" }}
"#,
            input.display(),
            output.display()
        );
        Pipeline::from_yaml_str(&yaml).unwrap().run().unwrap();
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "region,id\neu,1\neu,3\n",
            "{backend}"
        );
    }
}

#[test]
fn failing_step_leaves_the_target_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_orders(dir.path());
    let output = dir.path().join("never.csv");
    let yaml = format!(
        r#"
source: {{ type: csv, path: "{}" }}
transforms:
  - {{ type: drop_columns, columns: [total] }}
  - {{ type: filter, expr: "total > 5" }}
  - {{ type: select_columns, columns: [id] }}
target: {{ type: csv, path: "{}" }}
"#,
        input.display(),
        output.display()
    );
    let mut pipeline = Pipeline::from_yaml_str(&yaml).unwrap();
    let err = pipeline.run().unwrap_err();
    assert!(err.to_string().contains("no column 'total'"), "{err}");
    assert!(matches!(err, hopper::Error::Conversion { .. }));
    assert_eq!(pipeline.state(), RunState::Failed);
    assert!(!output.exists());
}

#[test]
fn partitioned_dataset_target() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_orders(dir.path());
    let out = dir.path().join("by_region");
    let json = serde_json::json!({
        "source": {"type": "csv", "path": input},
        "target": {"type": "parquet_dataset", "path": out, "partition_by": ["region"]}
    })
    .to_string();

    let doc = PipelineDoc::from_json_str(&json).unwrap();
    let mut pipeline = doc.build(&RunConfig::default(), &Registry::builtin()).unwrap();
    let report = pipeline.run().unwrap();
    let kinds: Vec<StepKind> = report.steps.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, vec![StepKind::Load, StepKind::Write]);

    for region in ["eu", "us", "apac"] {
        assert!(
            out.join(format!("region={region}")).join("part-0.parquet").exists(),
            "{region}"
        );
    }
}

#[test]
fn missing_input_is_a_medium_error_naming_the_connector() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.csv");
    let yaml = format!(
        r#"
source: {{ type: csv, path: "{}" }}
target: {{ type: csv, path: "{}" }}
"#,
        missing.display(),
        dir.path().join("out.csv").display()
    );
    let err = Pipeline::from_yaml_str(&yaml).unwrap().run().unwrap_err();
    assert!(matches!(err, hopper::Error::Medium { .. }));
    assert!(err.to_string().starts_with("CsvFile("), "{err}");
}

#[test]
fn lenient_run_reports_each_set_aside_line_once() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("batches.txt");
    fs::write(&input, "HDR2024 run01\nSCH9whatever\nDTLbolt \nHDR2025 run02\n").unwrap();
    let output = dir.path().join("batches.csv");

    let yaml = format!(
        r#"
config: {{ error_policy: lenient }}
source:
  type: multi_fixed_width
  path: "{}"
  schema_map:
    HDR: {{ colspecs: [[0, 4], [4, 6]], colnames: [year, batch] }}
    DTL: {{ colspecs: [[0, 5]], colnames: [item] }}
target: {{ type: csv, path: "{}" }}
"#,
        input.display(),
        output.display()
    );
    let doc = PipelineDoc::from_yaml_str(&yaml).unwrap();
    let mut pipeline = doc.build(&RunConfig::default(), &Registry::builtin()).unwrap();
    let report = pipeline.run().unwrap();

    assert_eq!(report.rejects.len(), 1);
    let reject = &report.rejects[0];
    assert_eq!(reject.line, 2);
    assert_eq!(reject.raw, "SCH9whatever");
    assert_eq!(reject.reason, "unmatched discriminator 'SCH'");
    assert!(reject.source.starts_with("MultiFixedWidthFile("), "{}", reject.source);

    assert_eq!(
        fs::read_to_string(dir.path().join("batches_HDR.csv")).unwrap(),
        "year,batch\n2024,run01\n2025,run02\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("batches_DTL.csv")).unwrap(),
        "item\nbolt\n"
    );
}

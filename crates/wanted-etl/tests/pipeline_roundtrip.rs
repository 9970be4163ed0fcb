//! End-to-end pipeline tests: mock source → cleaned table → sinks.

use std::collections::BTreeMap;
use std::time::Duration;

use assert_json_diff::assert_json_eq;
use serde_json::{json, Value};
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wanted_etl::sink::{read_csv, CsvSink, SqliteSink, WriteMode};
use wanted_etl::{
    normalize_pages, Cell, ExtractionPolicy, FetchBudget, Page, Pipeline, PipelineError,
    PipelineSettings, RetryPolicy, SourceConfig,
};

fn settings(max_pages: u32) -> PipelineSettings {
    PipelineSettings {
        budget: FetchBudget::new(max_pages, 5, 1).unwrap(),
        retry: RetryPolicy::immediate(1),
        timeout: Duration::from_secs(5),
    }
}

fn source_for(server: &MockServer) -> SourceConfig {
    SourceConfig::parse(
        &json!({
            "url": format!("{}/@wanted", server.uri()),
            "headers": {"Accept": "application/json"}
        })
        .to_string(),
    )
    .unwrap()
}

async fn serve(server: &MockServer, page: u32, body: Value) {
    Mock::given(method("GET"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn page_one() -> Value {
    json!({
        "total": 3,
        "page": 1,
        "items": [
            {
                "title": "John Doe",
                "age_max": "45",
                "age_min": null,
                "details": "<p>Wanted for robbery</p>"
            },
            {
                "title": "JANE ROE",
                "age_max": 38,
                "age_min": "Null",
                "sex": "Female",
                "race_raw": "White",
                "aliases": ["Jane R.", "J. Roe"],
                "subjects": ["Cyber's Most Wanted"],
                "reward_text": "<p>Up to $10,000</p>\r\n",
                "caution": "<ul><li>Armed</li></ul>"
            }
        ]
    })
}

fn page_two() -> Value {
    json!({
        "total": 3,
        "page": 2,
        "items": [
            {"title": "Unknown Subject", "age_max": "unknown", "occupations": null, "warning_message": "Null"}
        ]
    })
}

#[test]
fn normalized_record_has_every_canonical_key() {
    let page = Page::new(1, page_one());
    let records = normalize_pages(&[page], &ExtractionPolicy::wanted_persons()).unwrap();
    assert_eq!(records.len(), 2);

    assert_json_eq!(
        serde_json::to_value(&records[0]).unwrap(),
        json!({
            "name": "John Doe",
            "age_max": "45",
            "age_min": null,
            "sex": null,
            "warning_message": null,
            "race": null,
            "place_of_birth": null,
            "details": "<p>Wanted for robbery</p>",
            "occupations": [],
            "locations": [],
            "subjects": [],
            "aliases": [],
            "reward_text": null,
            "scars_and_marks": null,
            "caution": null
        })
    );
}

#[tokio::test]
async fn pipeline_to_csv_and_back() {
    let server = MockServer::start().await;
    serve(&server, 1, page_one()).await;
    serve(&server, 2, page_two()).await;

    let source = source_for(&server);
    let pipeline = Pipeline::from_config(&source, &settings(2), None).unwrap();
    let run = pipeline.run().await.unwrap();

    assert!(run.fetch.complete);
    assert_eq!(run.record_count, 3);
    let table = &run.table;
    assert_eq!(table.row_count(), 3);
    assert_eq!(table.column_names(), pipeline.schema());

    let column = |name: &str| table.column(name).unwrap().values.clone();
    assert_eq!(
        column("age_max"),
        vec![Cell::Integer(45), Cell::Integer(38), Cell::Missing]
    );
    assert_eq!(
        column("age_min"),
        vec![Cell::Missing, Cell::Missing, Cell::Missing]
    );
    assert_eq!(column("details")[0], Cell::from("Wanted for robbery"));
    assert_eq!(column("aliases")[1], Cell::from("Jane R., J. Roe"));
    assert_eq!(column("reward_text")[1], Cell::from("Up to $10,000"));
    assert_eq!(column("caution")[1], Cell::from("Armed"));
    assert_eq!(column("race")[1], Cell::from("White"));
    assert_eq!(column("warning_message")[2], Cell::Missing);
    assert_eq!(column("occupations")[2], Cell::from(""));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("wanted.csv");
    let written = CsvSink::new(&path).write(table).unwrap();
    assert_eq!(written, 3);

    let types = source.cleaning_policy().column_types;
    let back = read_csv(&path, &types).unwrap();
    assert_eq!(back.row_count(), table.row_count());
    assert_eq!(back.column_count(), table.column_count());
    assert_eq!(back.column("age_max").unwrap().values, column("age_max"));
    assert_eq!(back.column("age_min").unwrap().values, column("age_min"));
    assert_eq!(back.column("name").unwrap().values, column("name"));
}

#[tokio::test]
async fn pipeline_to_sqlite() {
    let server = MockServer::start().await;
    serve(&server, 1, page_one()).await;

    let source = source_for(&server);
    let run = Pipeline::from_config(&source, &settings(1), None)
        .unwrap()
        .run()
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut sink = SqliteSink::open(&dir.path().join("wanted.db")).unwrap();
    let types = source.cleaning_policy().column_types;
    let rows = sink
        .write("wanted", &run.table, &types, WriteMode::Replace)
        .unwrap();
    assert_eq!(rows, 2);

    let total: i64 = sink
        .connection()
        .query_row("SELECT SUM(age_max) FROM wanted", [], |r| r.get(0))
        .unwrap();
    assert_eq!(total, 83);
}

#[tokio::test]
async fn missing_items_aborts_run() {
    let server = MockServer::start().await;
    serve(&server, 1, page_one()).await;
    serve(&server, 2, json!({"total": 3, "page": 2, "message": "gone"})).await;

    let pipeline = Pipeline::from_config(&source_for(&server), &settings(2), None).unwrap();
    let err = pipeline.run().await.unwrap_err();
    match err {
        PipelineError::MissingKey {
            page,
            key,
            available,
        } => {
            assert_eq!(page, 2);
            assert_eq!(key, "items");
            assert_eq!(available, vec!["message", "page", "total"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn short_fetch_still_produces_table() {
    let server = MockServer::start().await;
    serve(&server, 1, page_one()).await;
    Mock::given(method("GET"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let run = Pipeline::from_config(&source_for(&server), &settings(3), None)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert!(!run.fetch.complete);
    assert_eq!(run.fetch.pages.len(), 1);
    assert_eq!(run.table.row_count(), 2);
}

#[test]
fn custom_field_list_drives_schema() {
    let source = SourceConfig::parse(
        r#"{
            "url": "https://api.example.org/list",
            "headers": {},
            "fields": [
                {"column": "title"},
                {"column": "age_max"},
                {"column": "age_range"}
            ],
            "column_types": {"age_max": "float"}
        }"#,
    )
    .unwrap();
    let extraction = source.extraction_policy().unwrap();
    let (table, _) = wanted_etl::process_pages(
        &[Page::new(1, page_one())],
        &extraction,
        &source.cleaning_policy(),
    )
    .unwrap();
    assert_eq!(table.column_names(), vec!["title", "age_max", "age_range"]);
    assert_eq!(
        table.column("age_max").unwrap().values,
        vec![Cell::Float(45.0), Cell::Float(38.0)]
    );

    let mut expected = BTreeMap::new();
    expected.insert("age_max".to_string(), wanted_etl::ColumnType::NullableFloat);
    expected.insert("age_min".to_string(), wanted_etl::ColumnType::NullableInteger);
    assert_eq!(source.cleaning_policy().column_types, expected);
}

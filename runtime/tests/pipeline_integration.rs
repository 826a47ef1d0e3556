//! Work file in, result files out: the surrounding I/O of a crawl run.

use sitecrawl_runtime::crawl::{CrawlResult, FailureReason, ItemFailure};
use sitecrawl_runtime::extraction::ExtractedRecord;
use sitecrawl_runtime::io::{read_work_file, CsvSink, JsonlSink, ResultSink};
use sitecrawl_runtime::profile::SiteProfile;
use sitecrawl_runtime::CrawlError;
use tempfile::TempDir;

fn record(pairs: &[(&str, Option<&str>)]) -> ExtractedRecord {
    ExtractedRecord::new(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect(),
    )
}

#[test]
fn test_two_item_scenario_writes_two_rows() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("targets.csv");
    std::fs::write(&input, "acme.example/company\nblocked.example/company\n").unwrap();

    let items = read_work_file(&input).unwrap();
    assert_eq!(items.len(), 2);

    let results = vec![
        CrawlResult::extracted(
            &items[0],
            "https://acme.example/company",
            record(&[
                ("title", Some("Acme")),
                ("description", Some("Anvils")),
                ("logo_url", Some("https://acme.example/logo.png")),
            ]),
        ),
        CrawlResult::extracted(
            &items[1],
            "https://blocked.example/company",
            record(&[
                ("title", Some("Blocked Co")),
                ("description", Some("Recovered after a rebuild")),
                ("logo_url", None),
            ]),
        ),
    ];

    let output = dir.path().join("out.csv");
    let jsonl = dir.path().join("logs/out.jsonl");
    let profile = SiteProfile::directory();
    let mut csv = CsvSink::create(&output, &profile).unwrap();
    let mut json = JsonlSink::create(&jsonl).unwrap();
    for result in &results {
        csv.write(result).unwrap();
        json.write(result).unwrap();
    }
    csv.finish().unwrap();
    json.finish().unwrap();
    drop((csv, json));

    let written = std::fs::read_to_string(&output).unwrap();
    let rows: Vec<&str> = written.lines().collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], "target,link,title,description,logo_url");
    assert!(rows[1].ends_with(",https://acme.example/logo.png"));
    assert_eq!(
        rows[2],
        "blocked.example/company,https://blocked.example/company,Blocked Co,Recovered after a rebuild,"
    );

    assert_eq!(std::fs::read_to_string(&jsonl).unwrap().lines().count(), 2);
}

#[test]
fn test_failed_rows_keep_only_the_target() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("companies.csv");
    std::fs::write(&input, "Acme Corp\nGhost Inc\n").unwrap();
    let items = read_work_file(&input).unwrap();

    let output = dir.path().join("out.csv");
    let mut csv = CsvSink::create(&output, &SiteProfile::network()).unwrap();
    csv.write(&CrawlResult::extracted(
        &items[0],
        "https://www.linkedin.com/company/acme/",
        record(&[("employees_number", Some("10015000"))]),
    ))
    .unwrap();
    csv.write(&CrawlResult::failed(
        &items[1],
        None,
        ItemFailure::new(FailureReason::NoLinksResolved, 1),
    ))
    .unwrap();
    csv.finish().unwrap();
    drop(csv);

    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "company,link,employees_number\n\
         Acme Corp,https://www.linkedin.com/company/acme/,10015000\n\
         Ghost Inc,,\n"
    );
}

#[test]
fn test_malformed_input_is_fatal() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("bad.csv");
    std::fs::write(&input, "Acme Corp\nGhost Inc,extra\n").unwrap();

    let err = read_work_file(&input).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, CrawlError::Input { line: 2, .. }));
}

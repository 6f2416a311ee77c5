use cbrates::core::RateError;
use cbrates::providers::cbr::CbrClient;
use cbrates::service::RateService;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const FEED: &str = r#"<?xml version="1.0" encoding="windows-1251"?>
<ValCurs Date="18.10.2026" name="Foreign Currency Market">
    <Valute ID="R01235">
        <NumCode>840</NumCode>
        <CharCode>USD</CharCode>
        <Nominal>1</Nominal>
        <Name>US Dollar</Name>
        <Value>91,23</Value>
    </Valute>
    <Valute ID="R01375">
        <NumCode>156</NumCode>
        <CharCode>CNY</CharCode>
        <Nominal>1</Nominal>
        <Name>Yuan Renminbi</Name>
        <Value>12,7801</Value>
    </Valute>
</ValCurs>"#;

const FEED_PATH: &str = "/scripts/XML_daily.asp";

mod test_utils {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn create_mock_server(status: u16, body: &str, expected_calls: u64) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(super::FEED_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .expect(expected_calls)
            .mount(&mock_server)
            .await;

        mock_server
    }

    pub fn write_config(mock_server: &MockServer) -> tempfile::NamedTempFile {
        let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        let config_content = format!(
            r#"
client:
  url: "{}{}"
  timeout_seconds: 5
cache:
  ttl_seconds: 60
"#,
            mock_server.uri(),
            super::FEED_PATH
        );
        std::fs::write(config_file.path(), config_content).expect("Failed to write config file");
        config_file
    }
}

fn service_for(mock_server: &wiremock::MockServer, ttl: Duration) -> RateService {
    let url = format!("{}{}", mock_server.uri(), FEED_PATH);
    let client = CbrClient::new(&url, Duration::from_secs(5)).expect("Failed to build client");
    RateService::new(Arc::new(client), ttl)
}

#[test_log::test(tokio::test)]
async fn test_lookups_within_ttl_fetch_once() {
    // Verified when the server is dropped
    let mock_server = test_utils::create_mock_server(200, FEED, 1).await;
    let service = service_for(&mock_server, Duration::from_secs(60));

    let usd = service.rate_for("USD").await;
    let cny = service.rate_for("CNY").await;
    let missing = service.rate_for("XYZ").await;
    info!(?usd, ?cny, ?missing, "Looked up rates");

    assert_eq!(usd, Ok(Decimal::new(9123, 2)));
    assert_eq!(cny, Ok(Decimal::new(127801, 4)));
    assert_eq!(missing, Err(RateError::Lookup("XYZ".to_string())));
}

#[test_log::test(tokio::test)]
async fn test_concurrent_lookups_fetch_once() {
    let mock_server = test_utils::create_mock_server(200, FEED, 1).await;
    let service = service_for(&mock_server, Duration::from_secs(60));

    let (usd, cny, usd_again) = futures::join!(
        service.rate_for("USD"),
        service.rate_for("CNY"),
        service.rate_for("USD")
    );

    assert_eq!(usd, Ok(Decimal::new(9123, 2)));
    assert_eq!(cny, Ok(Decimal::new(127801, 4)));
    assert_eq!(usd_again, usd);
}

#[test_log::test(tokio::test)]
async fn test_upstream_failure_is_not_cached() {
    let mock_server = test_utils::create_mock_server(503, "", 2).await;
    let service = service_for(&mock_server, Duration::from_secs(60));

    for _ in 0..2 {
        let result = service.rate_for("USD").await;
        assert!(
            matches!(result, Err(RateError::Fetch(_))),
            "Expected fetch error, got {result:?}"
        );
    }
}

#[test_log::test(tokio::test)]
async fn test_snapshot_for_explicit_date() {
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("date_req", "09/01/2024"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .expect(1)
        .mount(&mock_server)
        .await;
    let service = service_for(&mock_server, Duration::from_secs(60));

    let date = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
    let snapshot = service.snapshot_on(date).await.expect("Snapshot failed");
    assert_eq!(snapshot.date(), date);
    assert_eq!(snapshot.len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let mock_server = test_utils::create_mock_server(200, FEED, 1).await;
    let config_file = test_utils::write_config(&mock_server);

    let result = cbrates::run_command(
        cbrates::AppCommand::Rate {
            codes: vec!["usd".to_string(), "CNY".to_string()],
        },
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(
        result.is_ok(),
        "Rate command failed with: {:?}",
        result.err()
    );
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_rates_table() {
    let mock_server = test_utils::create_mock_server(200, FEED, 1).await;
    let config_file = test_utils::write_config(&mock_server);

    let result = cbrates::run_command(
        cbrates::AppCommand::Rates { date: None },
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(
        result.is_ok(),
        "Rates command failed with: {:?}",
        result.err()
    );
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_unknown_code_fails() {
    let mock_server = test_utils::create_mock_server(200, FEED, 1).await;
    let config_file = test_utils::write_config(&mock_server);

    let result = cbrates::run_command(
        cbrates::AppCommand::Rate {
            codes: vec!["XYZ".to_string()],
        },
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "1 of 1 lookups failed");
}

#[test_log::test(tokio::test)]
async fn test_missing_config_file_fails() {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let config_path = dir.path().join("missing.yaml");
    assert!(!config_path.exists());

    let result = cbrates::run_command(
        cbrates::AppCommand::Rates { date: None },
        Some(config_path.to_str().unwrap()),
    )
    .await;
    assert!(result.is_err());

    fs::write(&config_path, "cache: [").expect("Failed to write config");
    let result = cbrates::run_command(
        cbrates::AppCommand::Rates { date: None },
        Some(config_path.to_str().unwrap()),
    )
    .await;
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file")
    );
}

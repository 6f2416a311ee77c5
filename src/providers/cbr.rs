//! Bank of Russia daily rates feed: HTTP client and XML document parser.

use crate::core::{RateError, RateFetcher, RateSnapshot};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::Url;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};

/// Date format expected by the `date_req` query parameter
const DATE_REQ_FORMAT: &str = "%d/%m/%Y";
const ROOT_ELEMENT: &[u8] = b"ValCurs";

pub struct CbrClient {
    base_url: String,
    client: reqwest::Client,
}

impl CbrClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cbrates/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(CbrClient {
            base_url: base_url.to_string(),
            client,
        })
    }

    /// Appends `date_req` to the base URL, keeping any query it already has.
    fn request_url(&self, date: NaiveDate) -> Result<Url, RateError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| RateError::Fetch(format!("Invalid feed URL '{}': {e}", self.base_url)))?;
        url.query_pairs_mut()
            .append_pair("date_req", &date.format(DATE_REQ_FORMAT).to_string());
        Ok(url)
    }
}

#[async_trait]
impl RateFetcher for CbrClient {
    #[instrument(name = "CbrRatesFetch", skip_all, fields(date = %date))]
    async fn fetch_raw(&self, date: NaiveDate) -> Result<String, RateError> {
        let url = self.request_url(date)?;
        debug!("Requesting rates from {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RateError::Fetch(format!("Request error: {e} for URL: {url}")))?;

        debug!(status = %response.status(), "Received feed response");

        if !response.status().is_success() {
            return Err(RateError::Fetch(format!(
                "HTTP error: {} for date: {}",
                response.status(),
                date.format(DATE_REQ_FORMAT)
            )));
        }

        // reqwest decodes using the charset of the response, the feed is windows-1251
        response
            .text()
            .await
            .map_err(|e| RateError::Fetch(format!("Failed to read response body: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct ValCurs {
    #[serde(rename = "Valute", default)]
    valutes: Vec<Valute>,
}

#[derive(Debug, Deserialize)]
struct Valute {
    #[serde(rename = "CharCode")]
    char_code: String,
    #[serde(rename = "Value")]
    value: String,
}

/// Parses a `ValCurs` document into the snapshot for `date`.
///
/// Only `CharCode` and `Value` of each `Valute` are read. A code listed twice
/// keeps its last value.
pub fn parse_rates(date: NaiveDate, raw: &str) -> Result<RateSnapshot, RateError> {
    check_document(raw)?;
    let document: ValCurs = quick_xml::de::from_str(raw)
        .map_err(|e| RateError::Parse(format!("Malformed rate feed: {e}")))?;

    let rates = document
        .valutes
        .into_iter()
        .map(|valute| {
            let code = valute.char_code.trim().to_string();
            let rate = parse_decimal(&valute.value).map_err(|e| match e {
                RateError::Parse(msg) => RateError::Parse(format!("{msg} for currency: {code}")),
                other => other,
            })?;
            Ok((code, rate))
        })
        .collect::<Result<BTreeMap<_, _>, RateError>>()?;

    Ok(RateSnapshot::new(date, rates))
}

/// Rejects documents that are not a `ValCurs` feed.
///
/// The feed answers bad requests with text inside the root, e.g.
/// `<ValCurs>Error in parameters</ValCurs>`, so text directly under the root
/// is an error as well. An empty `ValCurs` is a valid feed without rates.
fn check_document(raw: &str) -> Result<(), RateError> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);
    let mut depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| RateError::Parse(format!("Malformed rate feed: {e}")))?;
        match &event {
            Event::Start(start) | Event::Empty(start) if depth == 0 => {
                if start.name().as_ref() != ROOT_ELEMENT {
                    return Err(RateError::Parse(format!(
                        "Unexpected root element '{}'",
                        String::from_utf8_lossy(start.name().as_ref())
                    )));
                }
                if matches!(event, Event::Empty(_)) {
                    return Ok(());
                }
                depth = 1;
            }
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Text(text) if depth <= 1 => {
                return Err(RateError::Parse(format!(
                    "Feed returned an error: {}",
                    String::from_utf8_lossy(text).trim()
                )));
            }
            Event::Eof => {
                return Err(RateError::Parse(
                    "Malformed rate feed: no complete ValCurs element".to_string(),
                ));
            }
            _ => {}
        }
    }
}

/// Converts a feed value such as `91,2345` into a decimal.
///
/// The feed uses a comma as decimal separator. It is swapped for a point
/// before parsing, independent of any process locale. Values carrying both
/// separators are rejected instead of guessing which one groups thousands.
pub fn parse_decimal(value: &str) -> Result<Decimal, RateError> {
    let trimmed = value.trim();
    if trimmed.contains(',') && trimmed.contains('.') {
        return Err(RateError::Parse(format!(
            "Ambiguous decimal value '{value}'"
        )));
    }

    Decimal::from_str(&trimmed.replace(',', "."))
        .map_err(|e| RateError::Parse(format!("Invalid decimal value '{value}': {e}")))
}

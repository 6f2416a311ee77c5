//! Date-keyed rate lookups backed by a short-lived single-flight cache.

use crate::core::cache::Cache;
use crate::core::{Clock, RateError, RateFetcher, RateSnapshot, SystemClock};
use crate::providers::cbr::parse_rates;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Serves currency rates for the current date.
///
/// At most one fetch per date is in flight at any time; callers arriving
/// meanwhile wait for it. Snapshots are reused until `ttl` elapses. The cache
/// key is the date at the moment of the lookup, so a lookup after midnight
/// misses even if the previous day's entry is still fresh.
pub struct RateService {
    fetcher: Arc<dyn RateFetcher>,
    clock: Arc<dyn Clock>,
    cache: Cache<NaiveDate, Arc<RateSnapshot>, RateError>,
}

impl RateService {
    pub fn new(fetcher: Arc<dyn RateFetcher>, ttl: Duration) -> Self {
        Self::with_clock(fetcher, Arc::new(SystemClock), ttl)
    }

    pub fn with_clock(fetcher: Arc<dyn RateFetcher>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        RateService {
            fetcher,
            clock,
            cache: Cache::new(ttl),
        }
    }

    /// Rate of `code` for today.
    #[instrument(name = "RateLookup", skip(self))]
    pub async fn rate_for(&self, code: &str) -> Result<Decimal, RateError> {
        self.rate_on(self.clock.today(), code).await
    }

    pub async fn rate_on(&self, date: NaiveDate, code: &str) -> Result<Decimal, RateError> {
        self.snapshot_on(date).await?.rate(code)
    }

    /// All rates for today.
    pub async fn snapshot(&self) -> Result<Arc<RateSnapshot>, RateError> {
        self.snapshot_on(self.clock.today()).await
    }

    pub async fn snapshot_on(&self, date: NaiveDate) -> Result<Arc<RateSnapshot>, RateError> {
        let fetcher = Arc::clone(&self.fetcher);
        self.cache
            .get_or_fetch(date, move || async move {
                let raw = fetcher.fetch_raw(date).await?;
                let snapshot = parse_rates(date, &raw)?;
                debug!(%date, currencies = snapshot.len(), "Fetched rate snapshot");
                Ok(Arc::new(snapshot))
            })
            .await
    }
}

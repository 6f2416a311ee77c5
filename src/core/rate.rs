//! Rate snapshot and the collaborators used to produce one

use crate::core::error::RateError;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// All currency rates published for a single calendar date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateSnapshot {
    date: NaiveDate,
    rates: BTreeMap<String, Decimal>,
}

impl RateSnapshot {
    pub fn new(date: NaiveDate, rates: BTreeMap<String, Decimal>) -> Self {
        Self { date, rates }
    }

    /// Date the snapshot was requested for
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn get(&self, code: &str) -> Option<Decimal> {
        self.rates.get(code).copied()
    }

    /// Like [`RateSnapshot::get`], failing with [`RateError::Lookup`] on a miss.
    pub fn rate(&self, code: &str) -> Result<Decimal, RateError> {
        self.get(code)
            .ok_or_else(|| RateError::Lookup(code.to_string()))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Iterates rates ordered by currency code
    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.rates.iter().map(|(code, rate)| (code.as_str(), *rate))
    }
}

/// Retrieves the raw rate feed document for a date.
#[async_trait]
pub trait RateFetcher: Send + Sync {
    async fn fetch_raw(&self, date: NaiveDate) -> Result<String, RateError>;
}

/// Source of the current calendar date.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Uses the local time zone of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

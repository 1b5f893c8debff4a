//! Exchange rate abstractions and core types

use super::date::DateKey;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use thiserror::Error;

/// Official NBU sale/purchase rate of one currency on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyQuote {
    #[serde(with = "rust_decimal::serde::float")]
    pub sale: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub purchase: Decimal,
}

/// Quotes for one date, keyed by currency code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyRates(BTreeMap<String, CurrencyQuote>);

impl DailyRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, currency: impl Into<String>, quote: CurrencyQuote) {
        self.0.insert(currency.into(), quote);
    }

    pub fn get(&self, currency: &str) -> Option<&CurrencyQuote> {
        self.0.get(currency)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CurrencyQuote)> {
        self.0.iter()
    }
}

/// One report element. Serialized as a single-key object `{"DD.MM.YYYY": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedRates {
    pub date: DateKey,
    pub rates: DailyRates,
}

impl Serialize for DatedRates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.date, &self.rates)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for DatedRates {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DatedRatesVisitor;

        impl<'de> Visitor<'de> for DatedRatesVisitor {
            type Value = DatedRates;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("an object with exactly one date key")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<DatedRates, A::Error> {
                let Some((date, rates)) = map.next_entry::<DateKey, DailyRates>()? else {
                    return Err(de::Error::invalid_length(0, &self));
                };
                if map.next_key::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(2, &self));
                }
                Ok(DatedRates { date, rates })
            }
        }

        deserializer.deserialize_map(DatedRatesVisitor)
    }
}

/// Dated rates ordered from the most recent date to the oldest.
///
/// Dates whose fetch failed are simply absent, so the report may hold fewer
/// entries than the number of days requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeReport {
    pub entries: Vec<DatedRates>,
}

impl ExchangeReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = DateKey> + '_ {
        self.entries.iter().map(|e| e.date)
    }
}

/// Upstream response for a single date.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RatesSnapshot {
    #[serde(rename = "exchangeRate", default)]
    pub exchange_rate: Vec<RateEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateEntry {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(
        rename = "saleRateNB",
        default,
        with = "rust_decimal::serde::float_option"
    )]
    pub sale_rate_nb: Option<Decimal>,
    #[serde(
        rename = "purchaseRateNB",
        default,
        with = "rust_decimal::serde::float_option"
    )]
    pub purchase_rate_nb: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("upstream returned status {0}")]
    BadStatus(u16),
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("malformed response body: {0}")]
    Decode(String),
}

/// A source of daily rate snapshots, one request per date.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch(&self, date: DateKey) -> Result<RatesSnapshot, FetchError>;
}

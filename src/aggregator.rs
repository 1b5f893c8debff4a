//! Turns a day count into an [`ExchangeReport`], one fetch per date.

use crate::core::{
    CurrencyQuote, DailyRates, DateKey, DatedRates, DayCount, ExchangeReport, RateEntry,
    RateSource, RatesSnapshot,
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a successful response could not be turned into [`DailyRates`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("no {0} entry in response")]
    Missing(String),
    #[error("{count} {currency} entries in response, expected one")]
    Duplicate { currency: String, count: usize },
    #[error("{0} entry has no NBU sale/purchase rate")]
    MissingRate(String),
}

/// Finds the single entry for `currency` and reads its NBU rates.
pub fn find_quote(entries: &[RateEntry], currency: &str) -> Result<CurrencyQuote, ShapeError> {
    let mut matches = entries
        .iter()
        .filter(|e| e.currency.as_deref() == Some(currency));

    let entry = matches
        .next()
        .ok_or_else(|| ShapeError::Missing(currency.to_string()))?;
    let extra = matches.count();
    if extra > 0 {
        return Err(ShapeError::Duplicate {
            currency: currency.to_string(),
            count: extra + 1,
        });
    }

    match (entry.sale_rate_nb, entry.purchase_rate_nb) {
        (Some(sale), Some(purchase)) => Ok(CurrencyQuote { sale, purchase }),
        _ => Err(ShapeError::MissingRate(currency.to_string())),
    }
}

/// Extracts every requested currency, failing on the first one that is not found exactly once.
pub fn extract_rates(
    snapshot: &RatesSnapshot,
    currencies: &[String],
) -> Result<DailyRates, ShapeError> {
    let mut rates = DailyRates::new();
    for currency in currencies {
        let quote = find_quote(&snapshot.exchange_rate, currency)?;
        rates.insert(currency.clone(), quote);
    }
    Ok(rates)
}

pub struct ExchangeAggregator {
    source: Arc<dyn RateSource>,
    currencies: Vec<String>,
    max_concurrent: usize,
}

impl ExchangeAggregator {
    pub fn new(source: Arc<dyn RateSource>, currencies: Vec<String>, max_concurrent: usize) -> Self {
        ExchangeAggregator {
            source,
            currencies,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub async fn aggregate(&self, days: DayCount) -> ExchangeReport {
        self.aggregate_from(DateKey::today(), days).await
    }

    /// Fetches `days` dates ending at `today`, most recent first.
    ///
    /// Failed fetches and malformed responses drop their date from the report
    /// and never abort the other dates. An empty report is a valid result.
    pub async fn aggregate_from(&self, today: DateKey, days: DayCount) -> ExchangeReport {
        info!(%today, days = days.get(), "Aggregating exchange rates");

        let dates: Vec<DateKey> = days
            .offsets()
            .filter_map(|offset| today.days_before(offset))
            .collect();

        // `buffered` keeps results in offset order regardless of completion order
        let entries: Vec<Option<DatedRates>> = stream::iter(dates)
            .map(|date| self.fetch_date(date))
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let report = ExchangeReport {
            entries: entries.into_iter().flatten().collect(),
        };
        debug!(
            requested = days.get(),
            collected = report.len(),
            "Aggregation finished"
        );
        report
    }

    async fn fetch_date(&self, date: DateKey) -> Option<DatedRates> {
        let snapshot = match self.source.fetch(date).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(%date, error = %e, "Skipping date, fetch failed");
                return None;
            }
        };

        match extract_rates(&snapshot, &self.currencies) {
            Ok(rates) => Some(DatedRates { date, rates }),
            Err(e) => {
                warn!(%date, error = %e, "Skipping date, unexpected response shape");
                None
            }
        }
    }
}

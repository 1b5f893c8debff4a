//! Core business logic abstractions

pub mod config;
pub mod date;
pub mod days;
pub mod log;
pub mod rates;

// Re-export main types for cleaner imports
pub use date::DateKey;
pub use days::{DayCount, DayCountError};
pub use rates::{
    CurrencyQuote, DailyRates, DatedRates, ExchangeReport, FetchError, RateEntry, RateSource,
    RatesSnapshot,
};

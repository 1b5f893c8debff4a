use crate::core::{DateKey, FetchError, RateSource, RatesSnapshot};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, error, instrument};

const USER_AGENT: &str = concat!("exrates/", env!("CARGO_PKG_VERSION"));

/// Daily NBU rates from the PrivatBank archive API. One GET per date, no retry.
pub struct PrivatBankProvider {
    base_url: String,
    client: Client,
}

impl PrivatBankProvider {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(PrivatBankProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn url_for(&self, date: DateKey) -> String {
        format!("{}/p24api/exchange_rates?date={}", self.base_url, date)
    }
}

#[async_trait]
impl RateSource for PrivatBankProvider {
    #[instrument(name = "PrivatBankFetch", skip(self), fields(date = %date))]
    async fn fetch(&self, date: DateKey) -> Result<RatesSnapshot, FetchError> {
        let url = self.url_for(date);
        debug!("Requesting exchange rates from {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            error!(url = %url, error = %e, "Connection error");
            FetchError::ConnectionFailed(e.to_string())
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            error!(url = %url, status = status.as_u16(), "Error status");
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        response.json::<RatesSnapshot>().await.map_err(|e| {
            error!(url = %url, error = %e, "Failed to parse exchange rate response");
            FetchError::Decode(e.to_string())
        })
    }
}

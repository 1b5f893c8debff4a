use super::ui;
use crate::aggregator::ExchangeAggregator;
use crate::core::DayCount;
use anyhow::{Context, Result};
use tracing::debug;

/// One-shot fetch. An invalid day count prints the protocol error text and
/// returns successfully, like the socket command does.
pub async fn run(aggregator: &ExchangeAggregator, days: &str, table: bool) -> Result<()> {
    let days = match days.parse::<DayCount>() {
        Ok(days) => days,
        Err(e) => {
            println!("{}", ui::style_text(&e.to_string(), ui::StyleType::Error));
            return Ok(());
        }
    };

    let report = aggregator.aggregate(days).await;
    debug!(entries = report.len(), "Fetched report");

    if table {
        if report.is_empty() {
            println!(
                "{}",
                ui::style_text("No exchange rates available.", ui::StyleType::Subtle)
            );
            return Ok(());
        }
        println!(
            "{}\n",
            ui::style_text(
                &format!("Exchange rates for the last {days} day(s)"),
                ui::StyleType::Title
            )
        );
        println!("{}", ui::report_table(&report));
    } else {
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize exchange report")?;
        println!("{json}");
    }
    Ok(())
}

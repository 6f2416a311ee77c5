use super::ui;
use crate::core::RateSnapshot;
use crate::service::RateService;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::Cell;

impl RateSnapshot {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("Currency"), ui::header_cell("Rate")]);

        for (code, rate) in self.iter() {
            table.add_row(vec![Cell::new(code), ui::rate_cell(rate)]);
        }

        let mut output = format!(
            "Rates for {}\n\n",
            ui::style_text(&self.date().format("%d.%m.%Y").to_string(), ui::StyleType::Title)
        );
        output.push_str(&table.to_string());
        output.push_str(&format!(
            "\n\n{}",
            ui::style_text(&format!("{} currencies", self.len()), ui::StyleType::Subtle)
        ));
        output
    }
}

/// Prints every rate for `date`, or for today when no date is given.
pub async fn run(service: &RateService, date: Option<NaiveDate>) -> Result<()> {
    let pb = ui::new_spinner("Fetching rates...");
    let snapshot = match date {
        Some(date) => service.snapshot_on(date).await,
        None => service.snapshot().await,
    };
    pb.finish_and_clear();

    let snapshot = snapshot.context("Failed to load rate snapshot")?;
    println!("{}", snapshot.display_as_table());
    Ok(())
}

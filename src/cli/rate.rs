use super::ui;
use crate::core::RateError;
use crate::service::RateService;
use anyhow::{Result, anyhow};
use comfy_table::Cell;
use futures::future::join_all;
use rust_decimal::Decimal;

type Lookup = (String, Result<Decimal, RateError>);

pub fn display_as_table(lookups: &[Lookup]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Currency"), ui::header_cell("Rate")]);

    for (code, result) in lookups {
        let rate = match result {
            Ok(rate) => ui::rate_cell(*rate),
            Err(_) => ui::na_cell(),
        };
        table.add_row(vec![Cell::new(code), rate]);
    }

    let mut output = table.to_string();
    for (code, result) in lookups {
        if let Err(e) = result {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(&format!("{code}: {e}"), ui::StyleType::Error)
            ));
        }
    }
    output
}

/// Looks up every code for today. The lookups run concurrently and share a
/// single fetch of the feed.
pub async fn run(service: &RateService, codes: &[String]) -> Result<()> {
    // Codes are upper case in the feed
    let codes: Vec<String> = codes.iter().map(|c| c.trim().to_uppercase()).collect();

    let pb = ui::new_spinner("Fetching rates...");
    let lookups = codes.iter().map(|code| async move {
        let result = service.rate_for(code).await;
        (code.clone(), result)
    });
    let results: Vec<Lookup> = join_all(lookups).await;
    pb.finish_and_clear();

    println!("{}", display_as_table(&results));

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    if failed > 0 {
        return Err(anyhow!("{failed} of {} lookups failed", results.len()));
    }
    Ok(())
}

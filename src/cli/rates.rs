use super::ui;
use crate::core::rates::ExchangeRateRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use comfy_table::Cell;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Renders the current snapshot of a record.
pub fn render_current(record: &ExchangeRateRecord) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Currency"), ui::header_cell("Rate")]);

    for (code, rate) in &record.rates {
        table.add_row(vec![Cell::new(code), ui::rate_cell(*rate)]);
    }

    let mut output = format!(
        "Exchange rates: {}\n\n",
        ui::style_text(&record.base_currency, ui::StyleType::Title)
    );
    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\n\n{} {} ({} snapshots retained)",
        ui::style_text("Last updated:", ui::StyleType::Label),
        record.last_updated.to_rfc3339_opts(SecondsFormat::Secs, true),
        ui::style_text(&record.history.len().to_string(), ui::StyleType::Subtle),
    ));
    output
}

/// Renders a historical series with the change between consecutive points.
pub fn render_history(
    base: &str,
    target: &str,
    history: &BTreeMap<DateTime<Utc>, Decimal>,
) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Timestamp"),
        ui::header_cell("Epoch (ms)"),
        ui::header_cell(&format!("Rate ({target})")),
        ui::header_cell("Change"),
    ]);

    let mut previous = None;
    for (ts, rate) in history {
        table.add_row(vec![
            Cell::new(ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Cell::new(ts.timestamp_millis()),
            ui::rate_cell(*rate),
            ui::change_cell(previous, *rate),
        ]);
        previous = Some(*rate);
    }

    let title = format!("{base} → {target}");
    let mut output = format!(
        "Historical rates: {}\n\n",
        ui::style_text(&title, ui::StyleType::Title)
    );
    if history.is_empty() {
        output.push_str(&ui::style_text(
            "No snapshots in the requested range",
            ui::StyleType::Subtle,
        ));
    } else {
        output.push_str(&table.to_string());
    }
    output
}

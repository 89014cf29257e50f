use itertools::Itertools as _;
use scraper::{ElementRef, Html};
use tracing::warn;

use crate::selector;

/// A vehicle listed on the search result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleRecord {
    pub plate: String,
    /// `YYYY-MM-DD HH:MM:SS`, as rendered by the portal.
    pub entered_at: String,
    /// Elapsed time such as `1시간15분`.
    pub parking_time: String,
}

fn parse_card(card: ElementRef<'_>) -> anyhow::Result<VehicleRecord> {
    let plate = card
        .select(selector!("h4.card-title"))
        .next()
        .ok_or_else(|| anyhow::anyhow!("Could not find card-title"))?
        .text()
        .join("");
    let mut labels = card
        .select(selector!("span.control-label"))
        .map(|label| label.text().join(""));
    let entered_at = labels
        .next()
        .ok_or_else(|| anyhow::anyhow!("Could not find entry date of {plate}"))?;
    let parking_time = labels
        .next()
        .ok_or_else(|| anyhow::anyhow!("Could not find parking time of {plate}"))?;

    Ok(VehicleRecord {
        plate: plate.trim().to_string(),
        entered_at: strip_label(&entered_at, "입차일자:"),
        parking_time: strip_label(&parking_time, "주차시간:"),
    })
}

fn strip_label(text: &str, label: &str) -> String {
    let text = text.trim();
    text.strip_prefix(label).unwrap_or(text).trim().to_string()
}

/// Collects the vehicle cards of a search result page. Cards that do not look like a
/// vehicle are skipped.
pub fn parse_vehicle_cards(document: &Html) -> Vec<VehicleRecord> {
    document
        .select(selector!("div.card"))
        .filter_map(|card| match parse_card(card) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skip vehicle card - {e}");
                None
            }
        })
        .collect()
}

/// Whether the discount history table on the detail page lists any redemption.
///
/// Only rows with a `td` cell count. The parser wraps rows written directly under
/// `<table>` in an implied `tbody`, so a header row of `th` cells without a `thead` would
/// otherwise read as a redemption.
pub fn has_discount_history(document: &Html) -> bool {
    let Some(table) = document.select(selector!("table.table")).next() else {
        return false;
    };

    table
        .select(selector!("tbody > tr"))
        .any(|row| row.select(selector!("td")).next().is_some())
}

/// Whether the page is the login form, which the portal serves instead of any page when
/// the session is not authenticated.
pub fn is_login_page(body: &str) -> bool {
    body.contains(super::LOGIN_MARKER)
}

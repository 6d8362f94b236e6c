use std::collections::HashSet;
use std::sync::LazyLock;

use pronos_core::{ConversionConfig, DataQuality, Target, WageRecord};
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Selector};

use super::cells::{
    cells_by_stat, clean_text, commented_fragment, is_non_data_row, leading_u32, selector,
    stat_text,
};
use super::{Extraction, Extractor};
use crate::error::ExtractError;
use crate::fetcher::Document;

/// First currency amount in a wage cell such as `£ 350,000 (€ 417,398, $425,327)`.
static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([£€$])\s*(\d[\d,]*)").expect("valid regex"));

/// Present on every squad page, with or without wage data.
const PAGE_MARKER: &str = "div#meta";

/// Table ids that carry wage rows. Some season pages only have the second.
const WAGE_TABLE_IDS: [&str; 2] = ["wages", "div_wages"];

const WEEKS_PER_YEAR: u64 = 52;

/// Reads `table#wages` and `table#div_wages` from a team's wage details
/// page, live or inside HTML comments. Rows are tagged with the table they
/// came from; a player listed in both keeps the first row.
///
/// A page that renders the squad header but no wage table is a team without
/// published wages, which is an empty result rather than an error. Weekly
/// wages are annualised at parse time; conversion only happens when a rate
/// is configured.
#[derive(Debug, Default, Clone)]
pub struct WagesExtractor {
    conversion: Option<ConversionConfig>,
}

impl WagesExtractor {
    #[must_use]
    pub fn new(conversion: Option<ConversionConfig>) -> Self {
        Self { conversion }
    }

    fn convert(&self, annual: u64, currency: &str) -> (Option<Decimal>, Option<String>) {
        let Some(conversion) = &self.conversion else {
            return (None, None);
        };
        let amount = Decimal::from(annual);
        let converted = if conversion.currency.eq_ignore_ascii_case(currency) {
            amount
        } else {
            (amount * conversion.rate).round_dp(2)
        };
        (Some(converted), Some(conversion.currency.clone()))
    }
}

impl Extractor for WagesExtractor {
    type Record = WageRecord;
    const MARKER: &'static str = "table#wages, table#div_wages";

    fn extract(
        &self,
        document: &Document,
        target: &Target,
    ) -> Result<Extraction<WageRecord>, ExtractError> {
        let page_sel = selector(PAGE_MARKER)?;
        let row_sel = selector("tbody > tr")?;
        let cell_sel = selector("th, td")?;
        let td_sel = selector("td")?;
        let rows = RowSelectors {
            row: &row_sel,
            cell: &cell_sel,
            td: &td_sel,
        };

        let html = document.html();
        let mut extraction = Extraction::default();
        let mut seen_players = HashSet::new();
        let mut tables_found = 0;

        for table_id in WAGE_TABLE_IDS {
            let table_sel = selector(&format!("table#{table_id}"))?;
            let uncommented;
            let root = if html.select(&table_sel).next().is_some() {
                &html
            } else if let Some(fragment) =
                commented_fragment(&html, &format!("id=\"{table_id}\""))
            {
                uncommented = fragment;
                &uncommented
            } else {
                continue;
            };
            let Some(table) = root.select(&table_sel).next() else {
                continue;
            };
            tables_found += 1;
            self.read_table(
                table,
                table_id,
                target,
                &rows,
                &mut seen_players,
                &mut extraction,
            );
        }

        if tables_found == 0 {
            if html.select(&page_sel).next().is_some() {
                tracing::debug!(team = %target.team_name, season = %target.season, "no wage table published");
                return Ok(Extraction::default());
            }
            return Err(ExtractError::missing(Self::MARKER, &document.url));
        }

        Ok(extraction)
    }
}

struct RowSelectors<'a> {
    row: &'a Selector,
    cell: &'a Selector,
    td: &'a Selector,
}

impl WagesExtractor {
    /// Appends one table's rows. A player already read from an earlier
    /// table is skipped without counting as a rejection.
    fn read_table(
        &self,
        table: ElementRef<'_>,
        table_id: &str,
        target: &Target,
        selectors: &RowSelectors<'_>,
        seen_players: &mut HashSet<String>,
        extraction: &mut Extraction<WageRecord>,
    ) {
        for row in table.select(selectors.row) {
            if is_non_data_row(row, selectors.td) {
                continue;
            }
            let cells = cells_by_stat(row, selectors.cell);

            let player_name = cells.get("player").and_then(|cell| clean_text(*cell));
            let amount = stat_text(&cells, "weekly_wages")
                .as_deref()
                .and_then(parse_wage);
            let (Some(player_name), Some((currency, weekly_wage))) = (player_name, amount) else {
                extraction.rejected += 1;
                continue;
            };
            if !seen_players.insert(player_name.to_lowercase()) {
                continue;
            }
            let Some(annual_wage) = weekly_wage.checked_mul(WEEKS_PER_YEAR) else {
                extraction.rejected += 1;
                continue;
            };

            let notes = stat_text(&cells, "notes");
            let data_quality = if notes.as_deref().is_some_and(is_estimate_note) {
                DataQuality::UnverifiedEstimation
            } else {
                DataQuality::Verified
            };
            let (converted_annual_wage, converted_currency) = self.convert(annual_wage, currency);

            extraction.records.push(WageRecord {
                team_id: target.team_id.clone(),
                team_name: target.team_name.clone(),
                season: target.season.clone(),
                player_name,
                nationality: stat_text(&cells, "nationality").map(|n| nationality_code(&n)),
                position: stat_text(&cells, "position"),
                age: stat_text(&cells, "age").as_deref().and_then(leading_u32),
                weekly_wage,
                annual_wage,
                currency: currency.to_string(),
                converted_annual_wage,
                converted_currency,
                notes,
                source_table: table_id.to_string(),
                data_quality,
            });
        }
    }
}

/// Returns the ISO-ish currency code and the first amount in the cell.
fn parse_wage(text: &str) -> Option<(&'static str, u64)> {
    let caps = AMOUNT_RE.captures(text)?;
    let currency = match &caps[1] {
        "£" => "GBP",
        "€" => "EUR",
        "$" => "USD",
        _ => return None,
    };
    let amount = caps[2].replace(',', "").parse().ok()?;
    Some((currency, amount))
}

fn is_estimate_note(note: &str) -> bool {
    let lowered = note.to_lowercase();
    lowered.contains("estimat") || lowered.contains("unverified")
}

/// `"eng ENG"` → `"ENG"`.
fn nationality_code(text: &str) -> String {
    text.split_whitespace()
        .last()
        .unwrap_or(text)
        .to_string()
}

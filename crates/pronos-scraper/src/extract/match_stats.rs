use pronos_core::{DataQuality, MatchStatRecord, StatSource, Target};
use scraper::ElementRef;

use super::cells::{clean_text, parse_number, percentage_or_value, selector};
use super::{Extraction, Extractor};
use crate::error::ExtractError;
use crate::fetcher::Document;
use crate::urls::match_id_from_href;

/// Stat headers that carry icons rather than values.
const SKIPPED_STATS: [&str; 1] = ["Cards"];

/// Reads both sides' team statistics from a match report page.
///
/// `div#team_stats` is required and holds alternating stat-name and value
/// rows. `div#team_stats_extra` is optional and holds value/name/value
/// triplets. Output is long format: one record per side per statistic.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchStatsExtractor;

struct Sides {
    home: String,
    away: String,
}

impl Extractor for MatchStatsExtractor {
    type Record = MatchStatRecord;
    const MARKER: &'static str = "div#team_stats";

    fn extract(
        &self,
        document: &Document,
        target: &Target,
    ) -> Result<Extraction<MatchStatRecord>, ExtractError> {
        let marker_sel = selector(Self::MARKER)?;
        let table_sel = selector("table")?;
        let row_sel = selector("tr")?;
        let th_sel = selector("th")?;
        let td_sel = selector("td")?;
        let link_sel = selector("a")?;
        let extra_sel = selector("div#team_stats_extra > div")?;
        let div_sel = selector("div")?;

        let html = document.html();
        let Some(marker) = html.select(&marker_sel).next() else {
            return Err(ExtractError::missing(Self::MARKER, &document.url));
        };

        let match_id = match_id_from_href(&document.url).unwrap_or_else(|| document.url.clone());
        let builder = RecordBuilder {
            target,
            match_id: &match_id,
            match_url: &document.url,
        };
        let mut extraction = Extraction::default();

        let Some(table) = marker.select(&table_sel).next() else {
            return Ok(extraction);
        };
        let rows: Vec<ElementRef<'_>> = table.select(&row_sel).collect();
        let Some((header, stat_rows)) = rows.split_first() else {
            return Ok(extraction);
        };

        let side_names: Vec<String> = header
            .select(&th_sel)
            .map(|th| side_name(th, &link_sel))
            .collect();
        let [home, away] = side_names.as_slice() else {
            extraction.rejected += stat_rows.len() / 2;
            return Ok(extraction);
        };
        let sides = Sides {
            home: home.clone(),
            away: away.clone(),
        };

        for pair in stat_rows.chunks(2) {
            let [name_row, value_row] = pair else {
                continue;
            };
            let Some(stat_name) = clean_text(*name_row) else {
                extraction.rejected += 1;
                continue;
            };
            if SKIPPED_STATS.contains(&stat_name.as_str()) {
                continue;
            }
            let values: Vec<Option<String>> = value_row.select(&td_sel).map(clean_text).collect();
            match values.as_slice() {
                [Some(home_value), Some(away_value)] => {
                    let home_value = percentage_or_value(home_value);
                    let away_value = percentage_or_value(away_value);
                    extraction.records.push(builder.build(
                        &sides.home,
                        &stat_name,
                        home_value,
                        StatSource::TeamStats,
                    ));
                    extraction.records.push(builder.build(
                        &sides.away,
                        &stat_name,
                        away_value,
                        StatSource::TeamStats,
                    ));
                }
                _ => extraction.rejected += 1,
            }
        }

        for container in html.select(&extra_sel) {
            let cells: Vec<String> = container
                .select(&div_sel)
                .map(|div| clean_text(div).unwrap_or_default())
                .collect();
            for triplet in cells.chunks_exact(3) {
                let [home_value, stat_name, away_value] = triplet else {
                    continue;
                };
                // Header triplets carry team names instead of counts.
                if !is_count(home_value) || !is_count(away_value) || stat_name.is_empty() {
                    continue;
                }
                extraction.records.push(builder.build(
                    &sides.home,
                    stat_name,
                    home_value.clone(),
                    StatSource::TeamStatsExtra,
                ));
                extraction.records.push(builder.build(
                    &sides.away,
                    stat_name,
                    away_value.clone(),
                    StatSource::TeamStatsExtra,
                ));
            }
        }

        Ok(extraction)
    }
}

struct RecordBuilder<'a> {
    target: &'a Target,
    match_id: &'a str,
    match_url: &'a str,
}

impl RecordBuilder<'_> {
    fn build(&self, side: &str, stat_name: &str, value: String, source: StatSource) -> MatchStatRecord {
        MatchStatRecord {
            team_id: self.target.team_id.clone(),
            season: self.target.season.clone(),
            match_id: self.match_id.to_string(),
            match_url: self.match_url.to_string(),
            side_name: side.to_string(),
            stat_name: stat_name.to_string(),
            numeric_value: parse_number(&value),
            stat_value: value,
            source,
            data_quality: DataQuality::Verified,
        }
    }
}

fn side_name(th: ElementRef<'_>, link_sel: &scraper::Selector) -> String {
    th.select(link_sel)
        .next()
        .and_then(clean_text)
        .or_else(|| clean_text(th))
        .unwrap_or_default()
}

fn is_count(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

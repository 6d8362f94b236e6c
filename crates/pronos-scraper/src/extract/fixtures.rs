use pronos_core::{DataQuality, FixtureRecord, Target};

use super::cells::{
    cells_by_stat, commented_fragment, is_non_data_row, leading_u32, parse_count, parse_number,
    selector, stat_href, stat_text,
};
use super::{Extraction, Extractor};
use crate::error::ExtractError;
use crate::fetcher::Document;
use crate::urls::{absolutize, match_id_from_href};

/// Reads `table#matchlogs_for` from a team's all-competitions page.
///
/// Required per row: `date`, `comp`, `venue`, `opponent`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixturesExtractor;

impl Extractor for FixturesExtractor {
    type Record = FixtureRecord;
    const MARKER: &'static str = "table#matchlogs_for";

    fn extract(
        &self,
        document: &Document,
        target: &Target,
    ) -> Result<Extraction<FixtureRecord>, ExtractError> {
        let table_sel = selector(Self::MARKER)?;
        let row_sel = selector("tbody > tr")?;
        let cell_sel = selector("th, td")?;
        let td_sel = selector("td")?;
        let link_sel = selector("a[href]")?;

        let html = document.html();
        let uncommented;
        let root = if html.select(&table_sel).next().is_some() {
            &html
        } else if let Some(fragment) = commented_fragment(&html, "id=\"matchlogs_for\"") {
            uncommented = fragment;
            &uncommented
        } else {
            return Err(ExtractError::missing(Self::MARKER, &document.url));
        };

        let mut extraction = Extraction::default();
        let Some(table) = root.select(&table_sel).next() else {
            return Err(ExtractError::missing(Self::MARKER, &document.url));
        };

        for row in table.select(&row_sel) {
            if is_non_data_row(row, &td_sel) {
                continue;
            }
            let cells = cells_by_stat(row, &cell_sel);

            let (Some(date), Some(competition), Some(venue), Some(opponent)) = (
                stat_text(&cells, "date"),
                stat_text(&cells, "comp"),
                stat_text(&cells, "venue"),
                stat_text(&cells, "opponent"),
            ) else {
                extraction.rejected += 1;
                continue;
            };

            let report_href = stat_href(&cells, "match_report", &link_sel);
            let match_id = report_href.as_deref().and_then(match_id_from_href);
            let match_report_url = match_id
                .as_ref()
                .and(report_href.as_deref())
                .and_then(|href| absolutize(&document.url, href));

            extraction.records.push(FixtureRecord {
                team_id: target.team_id.clone(),
                team_name: target.team_name.clone(),
                season: target.season.clone(),
                date,
                start_time: stat_text(&cells, "start_time"),
                competition,
                round: stat_text(&cells, "round"),
                day_of_week: stat_text(&cells, "dayofweek"),
                venue,
                opponent,
                result: stat_text(&cells, "result"),
                goals_for: stat_text(&cells, "goals_for").as_deref().and_then(leading_u32),
                goals_against: stat_text(&cells, "goals_against")
                    .as_deref()
                    .and_then(leading_u32),
                xg_for: stat_text(&cells, "xg_for").as_deref().and_then(parse_number),
                xg_against: stat_text(&cells, "xg_against")
                    .as_deref()
                    .and_then(parse_number),
                possession: stat_text(&cells, "possession")
                    .as_deref()
                    .and_then(parse_number),
                attendance: stat_text(&cells, "attendance")
                    .as_deref()
                    .and_then(parse_count),
                captain: stat_text(&cells, "captain"),
                formation: stat_text(&cells, "formation"),
                referee: stat_text(&cells, "referee"),
                match_id,
                match_report_url,
                data_quality: DataQuality::Verified,
            });
        }

        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use pronos_core::DataKind;

    use super::*;

    fn target() -> Target {
        Target::new("18bb7c10", "Arsenal", "2022-2023", DataKind::Fixtures)
    }

    fn row(date: &str, comp: &str, venue: &str, opponent: &str, result: &str, gf: &str, report: &str) -> String {
        format!(
            r#"<tr>
              <th data-stat="date"><a href="/en/matches/2022-08-05">{date}</a></th>
              <td data-stat="start_time">20:00</td>
              <td data-stat="comp"><a href="/en/comps/9/">{comp}</a></td>
              <td data-stat="round">Matchweek 1</td>
              <td data-stat="dayofweek">Fri</td>
              <td data-stat="venue">{venue}</td>
              <td data-stat="result">{result}</td>
              <td data-stat="goals_for">{gf}</td>
              <td data-stat="goals_against">0</td>
              <td data-stat="opponent"><a href="/en/squads/e4a775cb/">{opponent}</a></td>
              <td data-stat="xg_for">1.0</td>
              <td data-stat="xg_against">1.2</td>
              <td data-stat="possession">49</td>
              <td data-stat="attendance">25,286</td>
              <td data-stat="captain">Martin Ødegaard</td>
              <td data-stat="formation">4-3-3</td>
              <td data-stat="referee">Anthony Taylor</td>
              <td data-stat="match_report">{report}</td>
            </tr>"#
        )
    }

    fn page(rows: &str) -> Document {
        Document::new(
            "https://fbref.com/en/squads/18bb7c10/2022-2023/all_comps/Arsenal-Stats-All-Competitions",
            format!(
                r#"<html><body><table id="matchlogs_for"><thead><tr><th>Date</th></tr></thead>
                <tbody>{rows}</tbody></table></body></html>"#
            ),
        )
    }

    #[test]
    fn extracts_played_fixture() {
        let rows = row(
            "2022-08-05",
            "Premier League",
            "Away",
            "Crystal Palace",
            "W",
            "2",
            r#"<a href="/en/matches/e62f6e78/Crystal-Palace-Arsenal-August-5-2022">Match Report</a>"#,
        );
        let extraction = FixturesExtractor.extract(&page(&rows), &target()).unwrap();
        assert_eq!(extraction.rejected, 0);
        assert_eq!(extraction.records.len(), 1);

        let fixture = &extraction.records[0];
        assert_eq!(fixture.date, "2022-08-05");
        assert_eq!(fixture.opponent, "Crystal Palace");
        assert_eq!(fixture.goals_for, Some(2));
        assert_eq!(fixture.attendance, Some(25_286));
        assert_eq!(fixture.match_id.as_deref(), Some("e62f6e78"));
        assert_eq!(
            fixture.match_report_url.as_deref(),
            Some("https://fbref.com/en/matches/e62f6e78/Crystal-Palace-Arsenal-August-5-2022")
        );
        assert!(fixture.is_played());
    }

    #[test]
    fn penalty_score_keeps_leading_goals() {
        let rows = row("2023-01-09", "FA Cup", "Away", "Oxford Utd", "W", "3 (4)", "");
        let extraction = FixturesExtractor.extract(&page(&rows), &target()).unwrap();
        assert_eq!(extraction.records[0].goals_for, Some(3));
    }

    #[test]
    fn unplayed_fixture_has_no_match_id() {
        let rows = row(
            "2023-05-28",
            "Premier League",
            "Home",
            "Wolves",
            "",
            "",
            r#"<a href="/en/stathead/matchup/teams/18bb7c10/8cec06e1">Head-to-Head</a>"#,
        );
        let extraction = FixturesExtractor.extract(&page(&rows), &target()).unwrap();
        let fixture = &extraction.records[0];
        assert!(fixture.match_id.is_none());
        assert!(fixture.result.is_none());
        assert!(!fixture.is_played());
    }

    #[test]
    fn row_missing_opponent_is_rejected() {
        let mut rows = row("2022-08-05", "Premier League", "Away", "", "W", "2", "");
        rows.push_str(&row("2022-08-13", "Premier League", "Home", "Leicester City", "W", "4", ""));
        let extraction = FixturesExtractor.extract(&page(&rows), &target()).unwrap();
        assert_eq!(extraction.rejected, 1);
        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0].opponent, "Leicester City");
    }

    #[test]
    fn repeated_header_rows_are_skipped_not_rejected() {
        let mut rows = row("2022-08-05", "Premier League", "Away", "Crystal Palace", "W", "2", "");
        rows.push_str(r#"<tr class="thead"><th>Date</th><th>Time</th></tr>"#);
        let extraction = FixturesExtractor.extract(&page(&rows), &target()).unwrap();
        assert_eq!(extraction.rejected, 0);
        assert_eq!(extraction.records.len(), 1);
    }

    #[test]
    fn empty_table_is_valid() {
        let extraction = FixturesExtractor.extract(&page(""), &target()).unwrap();
        assert!(extraction.records.is_empty());
        assert_eq!(extraction.rejected, 0);
    }

    #[test]
    fn missing_table_is_a_parse_error() {
        let document = Document::new("https://fbref.com/en/404", "<html><body><h1>Page Not Found</h1></body></html>");
        let result = FixturesExtractor.extract(&document, &target());
        assert!(
            matches!(result, Err(ExtractError::MissingMarker { ref marker, .. }) if marker == "table#matchlogs_for"),
            "expected MissingMarker, got: {result:?}"
        );
    }

    #[test]
    fn table_inside_comment_is_found() {
        let rows = row("2022-08-05", "Premier League", "Away", "Crystal Palace", "W", "2", "");
        let document = Document::new(
            "https://fbref.com/en/squads/18bb7c10/",
            format!(
                r#"<html><body><div id="all_matchlogs"><!-- <table id="matchlogs_for"><tbody>{rows}</tbody></table> --></div></body></html>"#
            ),
        );
        let extraction = FixturesExtractor.extract(&document, &target()).unwrap();
        assert_eq!(extraction.records.len(), 1);
    }
}

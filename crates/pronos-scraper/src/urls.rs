//! URL builders and identifier extraction for the stats site.

use std::sync::LazyLock;

use pronos_core::SourceConfig;
use regex::Regex;
use reqwest::Url;

static TEAM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/squads/([a-f0-9]{8})(?:/|$)").expect("valid regex"));
static MATCH_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/matches/([a-f0-9]{8})(?:/|$)").expect("valid regex"));

/// `{base}/comps/{id}/{season}/{season}-{slug}-Stats`
#[must_use]
pub fn league_url(source: &SourceConfig, season: &str) -> String {
    format!(
        "{}/comps/{}/{season}/{season}-{}-Stats",
        source.base_url, source.competition_id, source.competition_slug
    )
}

/// Team page template with `{season}` and `{page}` placeholders, stored on
/// each `TeamRecord`.
#[must_use]
pub fn team_url_template(base_url: &str, team_id: &str) -> String {
    format!("{base_url}/squads/{team_id}/{{season}}/{{page}}")
}

/// The name segment used in team page paths: ASCII, apostrophes dropped,
/// spaces as hyphens, everything else non-alphanumeric removed.
#[must_use]
pub fn name_slug(team_name: &str) -> String {
    let ascii = deunicode::deunicode(team_name);
    let mut slug = String::with_capacity(ascii.len());
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if (c == ' ' || c == '-') && !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        } else if c == '&' && !slug.is_empty() {
            if !slug.ends_with('-') {
                slug.push('-');
            }
            slug.push_str("and");
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Page suffix for the all-competitions match log.
#[must_use]
pub fn fixtures_page(team_name: &str) -> String {
    format!("all_comps/{}-Stats-All-Competitions", name_slug(team_name))
}

/// Page suffix for the squad wage table.
#[must_use]
pub fn wages_page(team_name: &str) -> String {
    format!("wages/{}-Wage-Details", name_slug(team_name))
}

#[must_use]
pub fn team_id_from_href(href: &str) -> Option<String> {
    TEAM_ID_RE
        .captures(href)
        .map(|caps| caps[1].to_string())
}

#[must_use]
pub fn match_id_from_href(href: &str) -> Option<String> {
    MATCH_ID_RE
        .captures(href)
        .map(|caps| caps[1].to_string())
}

/// Resolves a site-relative link (`/en/matches/...`) against `base_url`.
/// Returns `None` if neither parses.
#[must_use]
pub fn absolutize(base_url: &str, href: &str) -> Option<String> {
    if let Ok(url) = Url::parse(href) {
        return Some(url.to_string());
    }
    let base = Url::parse(base_url).ok()?;
    base.join(href).ok().map(|url| url.to_string())
}

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Tokens dropped by [`fold_team_name`] because the site uses them
/// inconsistently ("Arsenal" vs "Arsenal FC").
const NOISE_TOKENS: [&str; 2] = ["fc", "afc"];

/// A team as discovered on the league table page.
///
/// `team_id` is the 8-character hex segment of the team's canonical URL and
/// never changes between seasons; the display name may.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub team_id: String,
    pub canonical_name: String,
    #[serde(default)]
    pub known_aliases: BTreeSet<String>,
    /// Page URL with `{season}` and `{page}` placeholders.
    pub source_url_template: String,
    /// Seasons in which the team appeared in a resolved league table.
    #[serde(default)]
    pub seasons: BTreeSet<String>,
}

impl TeamRecord {
    #[must_use]
    pub fn new(
        team_id: impl Into<String>,
        canonical_name: impl Into<String>,
        source_url_template: impl Into<String>,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            canonical_name: canonical_name.into(),
            known_aliases: BTreeSet::new(),
            source_url_template: source_url_template.into(),
            seasons: BTreeSet::new(),
        }
    }

    /// Fills the URL template for one season and page suffix.
    #[must_use]
    pub fn url_for(&self, season: &str, page: &str) -> String {
        self.source_url_template
            .replace("{season}", season)
            .replace("{page}", page)
    }

    /// Returns the folded keys this record answers to: canonical name first,
    /// then aliases in sorted order.
    pub fn folded_keys(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(fold_team_name(&self.canonical_name))
            .chain(self.known_aliases.iter().map(|a| fold_team_name(a)))
    }

    /// Adds an alias unless it is the canonical name itself. Returns `true`
    /// if the alias was new.
    pub fn add_alias(&mut self, alias: &str) -> bool {
        let alias = alias.trim();
        if alias.is_empty() || alias == self.canonical_name {
            return false;
        }
        self.known_aliases.insert(alias.to_string())
    }
}

/// Folds a team name into the key used for alias resolution.
///
/// The algorithm, in order:
/// 1. transliterate to ASCII (`Atlético` → `Atletico`, `Nürnberg` → `Nurnberg`)
/// 2. lowercase
/// 3. `&` becomes ` and `, apostrophes are removed (`Nott'ham` → `nottham`)
/// 4. every other non-alphanumeric character becomes a space
/// 5. the standalone tokens `fc` and `afc` are dropped
/// 6. remaining tokens are joined with a single space
///
/// The result is deterministic and idempotent.
#[must_use]
pub fn fold_team_name(name: &str) -> String {
    let ascii = deunicode::deunicode(name).to_lowercase();

    let mut spaced = String::with_capacity(ascii.len());
    for c in ascii.chars() {
        match c {
            '&' => spaced.push_str(" and "),
            '\'' | '`' => {}
            c if c.is_ascii_alphanumeric() => spaced.push(c),
            _ => spaced.push(' '),
        }
    }

    spaced
        .split_whitespace()
        .filter(|token| !NOISE_TOKENS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_is_case_insensitive() {
        assert_eq!(fold_team_name("ARSENAL"), fold_team_name("arsenal"));
    }

    #[test]
    fn fold_strips_diacritics() {
        assert_eq!(fold_team_name("Atlético Madrid"), "atletico madrid");
        assert_eq!(fold_team_name("Nürnberg"), "nurnberg");
    }

    #[test]
    fn fold_removes_apostrophes_without_splitting() {
        assert_eq!(fold_team_name("Nott'ham Forest"), "nottham forest");
    }

    #[test]
    fn fold_collapses_punctuation_and_whitespace() {
        assert_eq!(fold_team_name("  Brighton   &  Hove-Albion "), "brighton and hove albion");
    }

    #[test]
    fn fold_drops_club_suffixes() {
        assert_eq!(fold_team_name("Arsenal FC"), "arsenal");
        assert_eq!(fold_team_name("AFC Bournemouth"), "bournemouth");
    }

    #[test]
    fn fold_is_idempotent() {
        let once = fold_team_name("Wolverhampton Wanderers F.C.");
        assert_eq!(fold_team_name(&once), once);
    }

    #[test]
    fn url_for_fills_placeholders() {
        let team = TeamRecord::new(
            "b8fd03ef",
            "Manchester City",
            "https://fbref.com/en/squads/b8fd03ef/{season}/{page}",
        );
        assert_eq!(
            team.url_for("2022-2023", "wages/Manchester-City-Wage-Details"),
            "https://fbref.com/en/squads/b8fd03ef/2022-2023/wages/Manchester-City-Wage-Details"
        );
    }

    #[test]
    fn add_alias_ignores_canonical_and_blank() {
        let mut team = TeamRecord::new("b8fd03ef", "Manchester City", "t");
        assert!(!team.add_alias("Manchester City"));
        assert!(!team.add_alias("   "));
        assert!(team.add_alias("Man City"));
        assert!(!team.add_alias("Man City"));
        assert_eq!(team.known_aliases.len(), 1);
    }
}

//! Fuzzy path matching over the materialized tree.
//!
//! A path matches when the query is a case-insensitive subsequence of it.
//! Scoring rewards consecutive runs, word-boundary hits and short paths, so
//! tight local matches outrank scattered ones. Results are capped at 100,
//! ordered score-descending with ties kept in discovery order.

/// Maximum number of hits returned for any query.
pub const MAX_RESULTS: usize = 100;

const CHAR_SCORE: i64 = 100;
const CONSECUTIVE_BONUS: i64 = 50;
const BOUNDARY_BONUS: i64 = 30;
const START_BONUS: i64 = 20;
const LENGTH_PENALTY: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub path: String,
    pub score: i64,
}

/// Score `query` against `choice`, greedy left-to-right. `None` when the
/// query is not a subsequence of the choice.
pub fn score(query: &str, choice: &str) -> Option<i64> {
    if query.is_empty() {
        return Some(0);
    }
    let choice_chars: Vec<char> = choice.chars().collect();
    let mut total = 0i64;
    let mut at = 0usize;
    let mut prev_matched = false;
    for qc in query.chars() {
        let qc = qc.to_ascii_lowercase();
        let mut found = None;
        for (offset, &cc) in choice_chars[at..].iter().enumerate() {
            if cc.to_ascii_lowercase() == qc {
                found = Some(at + offset);
                break;
            }
        }
        let pos = found?;
        total += CHAR_SCORE;
        if prev_matched && pos == at {
            total += CONSECUTIVE_BONUS;
        }
        if pos == 0 {
            total += START_BONUS;
        } else if matches!(choice_chars[pos - 1], '/' | '_' | '-' | '.') {
            total += BOUNDARY_BONUS;
        }
        at = pos + 1;
        prev_matched = true;
    }
    let excess = choice_chars.len().saturating_sub(query.chars().count()) as i64;
    Some((total - LENGTH_PENALTY * excess).max(0))
}

/// Rank `paths` (already in discovery order) against `query`. An empty query
/// returns every path unscored, uncapped, in its given order.
pub fn rank<'a, I>(query: &str, paths: I) -> Vec<SearchHit>
where
    I: IntoIterator<Item = &'a str>,
{
    if query.is_empty() {
        return paths
            .into_iter()
            .map(|p| SearchHit {
                path: p.to_string(),
                score: 0,
            })
            .collect();
    }
    let mut hits: Vec<SearchHit> = paths
        .into_iter()
        .filter_map(|p| {
            score(query, p).map(|s| SearchHit {
                path: p.to_string(),
                score: s,
            })
        })
        .collect();
    // Stable sort keeps discovery order among equal scores.
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits.truncate(MAX_RESULTS);
    hits
}

/// Live state of the search prompt.
#[derive(Debug, Default)]
pub struct SearchState {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

impl SearchState {
    pub fn clear(&mut self) {
        self.query.clear();
        self.hits.clear();
    }

    pub fn push(&mut self, ch: char, paths: &[String]) {
        self.query.push(ch);
        self.refresh(paths);
    }

    pub fn backspace(&mut self, paths: &[String]) {
        self.query.pop();
        self.refresh(paths);
    }

    pub fn refresh(&mut self, paths: &[String]) {
        self.hits = rank(&self.query, paths.iter().map(String::as_str));
    }

    /// Ordered view of matching paths, for freezing into the tree.
    pub fn view(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.path.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_subsequence(query: &str, choice: &str) -> bool {
        let mut chars = choice.chars().map(|c| c.to_ascii_lowercase());
        query
            .chars()
            .map(|c| c.to_ascii_lowercase())
            .all(|qc| chars.any(|cc| cc == qc))
    }

    #[test]
    fn empty_query_returns_everything() {
        let paths = vec!["/a".to_string(), "/b".to_string(), "/c".to_string()];
        let hits = rank("", paths.iter().map(String::as_str));
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].path, "/a");
    }

    #[test]
    fn non_subsequence_is_rejected() {
        assert!(score("xyz", "/data/velocity").is_none());
        assert!(score("vel", "/data/velocity").is_some());
    }

    #[test]
    fn every_hit_contains_query_as_subsequence() {
        let paths = [
            "/gas/density",
            "/gas/temperature",
            "/stars/mass",
            "/stars/metallicity",
        ];
        for hit in rank("sma", paths.iter().copied()) {
            assert!(is_subsequence("sma", &hit.path), "{}", hit.path);
        }
    }

    #[test]
    fn consecutive_run_beats_scattered_match() {
        let tight = score("mass", "/stars/mass").unwrap();
        let scattered = score("mass", "/metals/abundances_s_sulfur").unwrap();
        assert!(tight > scattered);
    }

    #[test]
    fn shorter_path_wins_on_equal_match() {
        let short = score("den", "/density").unwrap();
        let long = score("den", "/density_contrast_smoothed").unwrap();
        assert!(short > long);
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(score("MASS", "/stars/mass"), score("mass", "/stars/mass"));
    }

    #[test]
    fn results_are_capped() {
        let paths: Vec<String> = (0..500).map(|i| format!("/grp/ds{:03}", i)).collect();
        let hits = rank("ds", paths.iter().map(String::as_str));
        assert_eq!(hits.len(), MAX_RESULTS);
    }

    #[test]
    fn ties_keep_discovery_order() {
        let paths = ["/a/mass", "/b/mass", "/c/mass"];
        let hits = rank("mass", paths.iter().copied());
        let order: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(order, vec!["/a/mass", "/b/mass", "/c/mass"]);
    }
}

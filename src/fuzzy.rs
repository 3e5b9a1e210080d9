use crate::usage::UsageSource;

use std::cmp::Ordering;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchOptions {
    pub max_results: usize,
    pub case_sensitive: bool,
    pub exact_bonus: u32,
    pub prefix_bonus: u32,
}

impl Default for MatchOptions {
    fn default() -> Self {
        MatchOptions {
            max_results: 100,
            case_sensitive: false,
            exact_bonus: 200,
            prefix_bonus: 100,
        }
    }
}

/// How the query matched, weakest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Characters found in order with gaps in between
    Sequential,
    /// Query starts a segment after a `:` or a space
    Component,
    Prefix,
    Exact,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuzzyMatch<'c> {
    pub candidate: &'c str,
    pub score: u32,
    pub usage: u32,
    pub tier: Tier,
    pub gap: usize,
}

fn fold(text: &str, case_sensitive: bool) -> Vec<char> {
    if case_sensitive {
        text.chars().collect()
    } else {
        text.chars().flat_map(char::to_lowercase).collect()
    }
}

fn is_component_start(folded: &[char], idx: usize) -> bool {
    idx > 0 && matches!(folded[idx - 1], ':' | ' ')
}

/// Tier and positional gap of `query` in `candidate`, or `None` when the
/// query is not a subsequence of the candidate.
fn classify(query: &[char], candidate: &[char]) -> Option<(Tier, usize)> {
    if candidate == query {
        return Some((Tier::Exact, 0));
    }
    if candidate.starts_with(query) {
        return Some((Tier::Prefix, 0));
    }

    if candidate.len() >= query.len() {
        let component = (1..=candidate.len() - query.len())
            .find(|&idx| is_component_start(candidate, idx) && candidate[idx..].starts_with(query));
        if let Some(idx) = component {
            return Some((Tier::Component, idx));
        }
    }

    // greedy leftmost subsequence: start offset plus the holes between matches
    let mut gap = 0;
    let mut next = 0;
    for (n, ch) in query.iter().enumerate() {
        let found = next + candidate[next..].iter().position(|c| c == ch)?;
        gap += if n == 0 { found } else { found - next };
        next = found + 1;
    }

    Some((Tier::Sequential, gap))
}

fn tier_bonus(tier: Tier, options: &MatchOptions) -> i64 {
    match tier {
        Tier::Exact => options.exact_bonus as i64 + options.prefix_bonus as i64,
        Tier::Prefix => options.prefix_bonus as i64,
        Tier::Component => options.prefix_bonus as i64 / 2,
        Tier::Sequential => 0,
    }
}

fn score(tier: Tier, usage: u32, length: usize, gap: usize, options: &MatchOptions) -> u32 {
    let raw = tier_bonus(tier, options) + usage as i64 * 5 + (100 - length as i64).max(0)
        - gap as i64 * 2;
    raw.clamp(0, u32::MAX as i64) as u32
}

fn alphabetical(a: &str, b: &str) -> Ordering {
    let folded = a.chars().flat_map(char::to_lowercase).cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}

/// Rank `candidates` against `query`.
///
/// An empty query keeps every candidate, most used first. Otherwise only
/// candidates containing the query as a subsequence are kept, ordered by
/// tier, then gap, then usage, then name.
pub fn fuzzy_match<'c, S: AsRef<str>>(
    query: &str,
    candidates: &'c [S],
    usage: Option<&dyn UsageSource>,
    options: &MatchOptions,
) -> Vec<FuzzyMatch<'c>> {
    let usage_of = |name: &str| usage.map_or(0, |source| source.usage(name));
    let folded_query = fold(query, options.case_sensitive);

    let mut matches: Vec<FuzzyMatch<'c>> = candidates
        .iter()
        .map(|candidate| -> &'c str { candidate.as_ref() })
        .filter_map(|candidate| {
            let folded = fold(candidate, options.case_sensitive);
            let (tier, gap) = if folded_query.is_empty() {
                (Tier::Sequential, 0)
            } else {
                classify(&folded_query, &folded)?
            };
            let usage = usage_of(candidate);
            Some(FuzzyMatch {
                candidate,
                score: score(tier, usage, folded.len(), gap, options),
                usage,
                tier,
                gap,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.tier
            .cmp(&a.tier)
            .then(a.gap.cmp(&b.gap))
            .then(b.usage.cmp(&a.usage))
            .then_with(|| alphabetical(a.candidate, b.candidate))
    });
    matches.truncate(options.max_results);
    matches
}

#[cfg(test)]
mod tests {
    use super::{fuzzy_match, MatchOptions, Tier};
    use std::collections::HashMap;

    fn names<'c>(matches: &[super::FuzzyMatch<'c>]) -> Vec<&'c str> {
        matches.iter().map(|m| m.candidate).collect()
    }

    #[test]
    fn tiers_order_results() {
        let candidates = ["Expenses:Food", "Something:ef", "effort", "ef"];
        let matches = fuzzy_match("ef", &candidates, None, &MatchOptions::default());

        assert_eq!(names(&matches), vec!["ef", "effort", "Something:ef", "Expenses:Food"]);
        assert_eq!(
            matches.iter().map(|m| m.tier).collect::<Vec<_>>(),
            vec![Tier::Exact, Tier::Prefix, Tier::Component, Tier::Sequential]
        );
        assert!(matches[0].score > matches[1].score);
    }

    #[test]
    fn non_latin_scripts_fold_case() {
        let candidates = ["Активы:Счет", "Расходы:Еда"];
        let matches = fuzzy_match("ре", &candidates, None, &MatchOptions::default());
        assert_eq!(names(&matches), vec!["Расходы:Еда"]);

        let matches = fuzzy_match("еда", &candidates, None, &MatchOptions::default());
        assert_eq!(matches[0].tier, Tier::Component);
    }

    #[test]
    fn tighter_clusters_rank_first() {
        let candidates = ["Assets:Cash", "Assets:Checking"];
        let matches = fuzzy_match("ach", &candidates, None, &MatchOptions::default());
        assert_eq!(names(&matches), vec!["Assets:Checking", "Assets:Cash"]);
        assert!(matches[0].gap < matches[1].gap);
    }

    #[test]
    fn usage_breaks_equal_gaps() {
        let usage: HashMap<String, u32> = [("Expenses:Fuel".to_string(), 7)].into_iter().collect();
        let candidates = ["Expenses:Food", "Expenses:Fuel"];
        let matches = fuzzy_match("ef", &candidates, Some(&usage), &MatchOptions::default());

        assert_eq!(names(&matches), vec!["Expenses:Fuel", "Expenses:Food"]);
        assert_eq!(matches[0].usage, 7);
    }

    #[test]
    fn empty_query_orders_by_usage_then_name() {
        let usage: HashMap<String, u32> =
            [("b".to_string(), 3), ("c".to_string(), 3), ("a".to_string(), 1)]
                .into_iter()
                .collect();
        let candidates = ["a", "d", "c", "b"];
        let matches = fuzzy_match("", &candidates, Some(&usage), &MatchOptions::default());
        assert_eq!(names(&matches), vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn case_and_result_limits() {
        let candidates = ["Food", "food", "fold"];
        let options = MatchOptions {
            case_sensitive: true,
            ..MatchOptions::default()
        };
        assert_eq!(names(&fuzzy_match("Fo", &candidates, None, &options)), vec!["Food"]);

        let options = MatchOptions {
            max_results: 2,
            ..MatchOptions::default()
        };
        assert_eq!(names(&fuzzy_match("fo", &candidates, None, &options)), vec!["fold", "Food"]);
        assert!(fuzzy_match("xyz", &candidates, None, &options).is_empty());
    }
}

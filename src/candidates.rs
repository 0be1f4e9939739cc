use std::collections::BTreeSet;

use regex::Regex;

use crate::models::MatchCandidate;

/// Candidates scoring below this are never returned.
pub const MIN_SCORE: u8 = 70;

/// Containment strategies need a needle at least this long, so a short
/// prefix falls through to the starts-with strategy instead of matching
/// half the book of business.
const MIN_NEEDLE: usize = 4;

/// Trailing tokens stripped by business-name normalization.
const BUSINESS_SUFFIXES: &[&str] = &[
    "llc", "pllc", "llp", "inc", "incorporated", "co", "corp", "corporation",
    "ltd", "limited", "company", "pc", "dba",
];

fn norm(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// "Last, First" -> "First Last". None when there is no comma form.
fn reverse_comma(name: &str) -> Option<String> {
    let (last, first) = name.split_once(',')?;
    let first = first.trim();
    let last = last.trim();
    if first.is_empty() || last.is_empty() {
        return None;
    }
    Some(norm(&format!("{first} {last}")))
}

/// Lowercase, strip punctuation, drop trailing corporate suffixes:
/// "Smith L.L.C." and "Smith LLC" both normalize to "smith".
pub fn normalize_business(name: &str) -> String {
    let stripped = Regex::new(r"[^\w\s]")
        .map(|re| re.replace_all(name, "").into_owned())
        .unwrap_or_else(|_| name.to_string());
    let mut words: Vec<String> = stripped
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    while let Some(last) = words.last() {
        if words.len() > 1 && BUSINESS_SUFFIXES.contains(&last.as_str()) {
            words.pop();
        } else {
            break;
        }
    }
    words.join(" ")
}

/// Score one candidate against the query. Every strategy is evaluated and the
/// highest-scoring one wins; strategies are never summed.
pub fn score_candidate(query: &str, candidate: &str) -> Option<(u8, &'static str)> {
    let q = norm(query);
    let c = norm(candidate);
    if q.is_empty() || c.is_empty() {
        return None;
    }

    fn consider(score: u8, strategy: &'static str, best: &mut Option<(u8, &'static str)>) {
        if best.map_or(true, |(s, _)| score > s) {
            *best = Some((score, strategy));
        }
    }
    let mut best: Option<(u8, &'static str)> = None;

    if q == c {
        consider(100, "exact", &mut best);
    }
    if reverse_comma(&q).is_some_and(|r| r == c) || reverse_comma(&c).is_some_and(|r| r == q) {
        consider(98, "reversed", &mut best);
    }

    let qb = normalize_business(&q);
    let cb = normalize_business(&c);
    if !qb.is_empty() && qb == cb {
        consider(95, "normalized", &mut best);
    }

    let q_words: Vec<&str> = q.split_whitespace().collect();
    let c_words: Vec<&str> = c.split_whitespace().collect();
    if q_words.first().is_some() && q_words.first() == c_words.first() {
        consider(90, "first-word", &mut best);
    }
    if q_words.len() > 1 && q_words.len() == c_words.len() {
        let qs: BTreeSet<&str> = q_words.iter().copied().collect();
        let cs: BTreeSet<&str> = c_words.iter().copied().collect();
        if qs == cs {
            consider(88, "all-words", &mut best);
        }
    }

    if q.len() >= MIN_NEEDLE && c.contains(&q) {
        consider(85, "contains", &mut best);
    }
    if qb.len() >= MIN_NEEDLE && !cb.is_empty() && cb.contains(&qb) {
        consider(83, "normalized-contains", &mut best);
    }

    if q_words.len() >= 2 {
        let cs: BTreeSet<&str> = c_words.iter().copied().collect();
        let overlap = q_words.iter().filter(|w| cs.contains(*w)).count();
        if overlap >= 2 && overlap * 2 > q_words.len() {
            consider(82, "most-words", &mut best);
        }
    }

    if c.len() >= MIN_NEEDLE && q.contains(&c) {
        consider(80, "reverse-contains", &mut best);
    }
    if c.starts_with(&q) {
        consider(75, "starts-with", &mut best);
    }

    best
}

/// Rank every name in the pool against the query. Results are ordered by
/// score, then shortest name, then name, so output never depends on pool
/// order. Names below the floor are dropped.
pub fn find_candidates<'a, I>(query: &str, pool: I) -> Vec<MatchCandidate>
where
    I: IntoIterator<Item = &'a str>,
{
    let unique: BTreeSet<&str> = pool.into_iter().filter(|n| !n.trim().is_empty()).collect();

    let mut candidates: Vec<MatchCandidate> = unique
        .into_iter()
        .filter_map(|name| {
            score_candidate(query, name).and_then(|(score, strategy)| {
                (score >= MIN_SCORE).then(|| MatchCandidate {
                    customer_name: name.to_string(),
                    score,
                    strategy,
                })
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.customer_name.len().cmp(&b.customer_name.len()))
            .then(a.customer_name.cmp(&b.customer_name))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top(query: &str, pool: &[&str]) -> MatchCandidate {
        find_candidates(query, pool.iter().copied())
            .into_iter()
            .next()
            .expect("expected a candidate")
    }

    #[test]
    fn test_exact_match() {
        let c = top("John Smith", &["John Smith"]);
        assert_eq!(c.score, 100);
        assert_eq!(c.strategy, "exact");
    }

    #[test]
    fn test_exact_ignores_case_and_spacing() {
        let c = top("  john   SMITH ", &["John Smith"]);
        assert_eq!(c.score, 100);
    }

    #[test]
    fn test_reversed_name() {
        let c = top("Smith, John", &["John Smith"]);
        assert_eq!(c.score, 98);
        assert_eq!(c.strategy, "reversed");
        // And the other direction
        let c = top("John Smith", &["Smith, John"]);
        assert_eq!(c.score, 98);
    }

    #[test]
    fn test_reversed_independent_of_pool_order() {
        let a = find_candidates("Smith, John", ["John Smith", "John Smithers"].into_iter());
        let b = find_candidates("Smith, John", ["John Smithers", "John Smith"].into_iter());
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].customer_name, b[0].customer_name);
        assert_eq!(a[0].score, 98);
    }

    #[test]
    fn test_normalized_business_name() {
        let c = top("Smith LLC", &["Smith L.L.C."]);
        assert_eq!(c.score, 95);
        assert_eq!(c.strategy, "normalized");
    }

    #[test]
    fn test_first_word_beats_all_words() {
        let c = top("Smith", &["Smith Jane"]);
        assert_eq!(c.score, 90);
        assert_eq!(c.strategy, "first-word");
    }

    #[test]
    fn test_all_words_any_order() {
        let c = top("Smith John", &["John Smith"]);
        assert_eq!(c.score, 88);
        assert_eq!(c.strategy, "all-words");
    }

    #[test]
    fn test_contains() {
        let c = top("Smith Agency", &["Big Smith Agency"]);
        assert_eq!(c.score, 85);
        assert_eq!(c.strategy, "contains");
    }

    #[test]
    fn test_normalized_contains() {
        let c = top("Smith & Co", &["Big Smith Co LLC"]);
        assert_eq!(c.score, 83);
        assert_eq!(c.strategy, "normalized-contains");
    }

    #[test]
    fn test_most_words() {
        let c = top("Alice Marie Johnson", &["Johnson Alice"]);
        assert_eq!(c.score, 82);
        assert_eq!(c.strategy, "most-words");
    }

    #[test]
    fn test_reverse_contains() {
        let c = top("Johnsonville", &["Johnson"]);
        assert_eq!(c.score, 80);
        assert_eq!(c.strategy, "reverse-contains");
    }

    #[test]
    fn test_starts_with_short_prefix() {
        let c = top("Smi", &["Smith Jane"]);
        assert_eq!(c.score, 75);
        assert_eq!(c.strategy, "starts-with");
    }

    #[test]
    fn test_floor_drops_weak_candidates() {
        assert!(find_candidates("Garcia", ["Thompson Freight"].into_iter()).is_empty());
    }

    #[test]
    fn test_tie_broken_by_shortest_name() {
        let out = find_candidates("Smith", ["Smith Jane", "Smith J"].into_iter());
        assert_eq!(out[0].customer_name, "Smith J");
        assert_eq!(out[1].customer_name, "Smith Jane");
        assert_eq!(out[0].score, out[1].score);
    }

    #[test]
    fn test_blank_names_skipped() {
        assert!(find_candidates("", ["John Smith"].into_iter()).is_empty());
        assert!(find_candidates("John Smith", ["", "   "].into_iter()).is_empty());
    }
}

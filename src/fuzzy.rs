//! # Fuzzy Scorer
//!
//! Similarity in `[0, 1]` between two normalized medicine names, computed as a
//! weighted ensemble of independent signals:
//!
//! | signal            | base weight |
//! |-------------------|-------------|
//! | ratio             | 0.25        |
//! | partial ratio     | 0.20        |
//! | token-sort ratio  | 0.20        |
//! | token-set ratio   | 0.15        |
//! | phonetic key      | 0.10        |
//! | token Jaccard     | 0.10        |
//! | trigram Jaccard   | 0.05        |
//! | containment       | 0.05        |
//!
//! With [`MatchingStrategy::SequenceOnly`] the first four signals are replaced by
//! a single normalized Levenshtein similarity weighted 0.40. Signals that do not
//! apply to a pair are left out and the remaining weights are renormalized.
//!
//! The ratio family follows the usual Indel definition: `2 * lcs / (len_a + len_b)`.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::phonetic::metaphone;

const RATIO_WEIGHT: f64 = 0.25;
const PARTIAL_WEIGHT: f64 = 0.20;
const TOKEN_SORT_WEIGHT: f64 = 0.20;
const TOKEN_SET_WEIGHT: f64 = 0.15;
const SEQUENCE_WEIGHT: f64 = 0.40;
const PHONETIC_WEIGHT: f64 = 0.10;
const TOKEN_JACCARD_WEIGHT: f64 = 0.10;
const TRIGRAM_WEIGHT: f64 = 0.05;
const CONTAINMENT_WEIGHT: f64 = 0.05;

/// Which family of sequence metrics the scorer uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingStrategy {
    /// Ratio, partial ratio, token-sort and token-set ratios
    #[default]
    FullEnsemble,
    /// One general sequence similarity in place of the ratio family
    SequenceOnly,
}

impl MatchingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchingStrategy::FullEnsemble => "full",
            MatchingStrategy::SequenceOnly => "sequence",
        }
    }
}

impl fmt::Display for MatchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" | "full_ensemble" | "ensemble" => Ok(MatchingStrategy::FullEnsemble),
            "sequence" | "sequence_only" => Ok(MatchingStrategy::SequenceOnly),
            other => Err(format!(
                "Unknown matching strategy '{}', expected 'full' or 'sequence'",
                other
            )),
        }
    }
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

fn indel_distance(a: &[char], b: &[char]) -> usize {
    a.len() + b.len() - 2 * lcs_len(a, b)
}

fn normalized_distance(distance: usize, length_sum: usize) -> f64 {
    if length_sum == 0 {
        1.0
    } else {
        1.0 - distance as f64 / length_sum as f64
    }
}

fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    normalized_distance(indel_distance(a, b), a.len() + b.len())
}

/// Whole-string Indel similarity
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

/// Best ratio of `short` against every alignment window of `long`,
/// including the partial windows hanging off either edge
fn partial_windows(short: &[char], long: &[char]) -> f64 {
    let (ls, ll) = (short.len(), long.len());
    let mut best: f64 = 0.0;

    for i in 1..ls {
        best = best
            .max(ratio_chars(short, &long[..i]))
            .max(ratio_chars(short, &long[ll - i..]));
    }
    for start in 0..=(ll - ls) {
        best = best.max(ratio_chars(short, &long[start..start + ls]));
        if best >= 1.0 {
            break;
        }
    }
    best
}

fn partial_ratio_chars(a: &[char], b: &[char]) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }
    match a.len().cmp(&b.len()) {
        std::cmp::Ordering::Less => partial_windows(a, b),
        std::cmp::Ordering::Greater => partial_windows(b, a),
        std::cmp::Ordering::Equal => partial_windows(a, b).max(partial_windows(b, a)),
    }
}

/// Best-aligned substring similarity of the shorter string within the longer
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    partial_ratio_chars(&a, &b)
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Ratio after sorting whitespace-delimited tokens
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn token_set(s: &str) -> HashSet<&str> {
    s.split_whitespace().collect()
}

fn join_sorted(tokens: &HashSet<&str>) -> String {
    let mut sorted: Vec<&str> = tokens.iter().copied().collect();
    sorted.sort_unstable();
    sorted.join(" ")
}

/// Ratio over the unique token sets, comparing the shared tokens against each
/// side's remainder
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a = token_set(a);
    let tokens_b = token_set(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection: HashSet<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let diff_ab: HashSet<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let diff_ba: HashSet<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !intersection.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 1.0;
    }

    let diff_ab_joined: Vec<char> = join_sorted(&diff_ab).chars().collect();
    let diff_ba_joined: Vec<char> = join_sorted(&diff_ba).chars().collect();
    let ab_len = diff_ab_joined.len();
    let ba_len = diff_ba_joined.len();
    let sect_len = join_sorted(&intersection).chars().count();

    let separator = usize::from(sect_len > 0);
    let sect_ab_len = sect_len + separator + ab_len;
    let sect_ba_len = sect_len + separator + ba_len;

    let result = normalized_distance(
        indel_distance(&diff_ab_joined, &diff_ba_joined),
        sect_ab_len + sect_ba_len,
    );
    if sect_len == 0 {
        return result;
    }

    let sect_ab_ratio = normalized_distance(separator + ab_len, sect_len + sect_ab_len);
    let sect_ba_ratio = normalized_distance(separator + ba_len, sect_len + sect_ba_len);
    result.max(sect_ab_ratio).max(sect_ba_ratio)
}

fn partial_token_ratio(a: &str, b: &str) -> f64 {
    let tokens_a = token_set(a);
    let tokens_b = token_set(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    if tokens_a.intersection(&tokens_b).next().is_some() {
        return 1.0;
    }
    partial_ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Weighted ratio: picks between whole-string, partial and token metrics
/// depending on how different the two lengths are
pub fn weighted_ratio(a: &str, b: &str) -> f64 {
    const UNBASE_SCALE: f64 = 0.95;

    let len_a = a.chars().count();
    let len_b = b.chars().count();
    if len_a == 0 || len_b == 0 {
        return 0.0;
    }

    let len_ratio = len_a.max(len_b) as f64 / len_a.min(len_b) as f64;
    let end_ratio = ratio(a, b);

    if len_ratio < 1.5 {
        let token_ratio = token_sort_ratio(a, b).max(token_set_ratio(a, b));
        return end_ratio.max(token_ratio * UNBASE_SCALE);
    }

    let partial_scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };
    let end_ratio = end_ratio.max(partial_ratio(a, b) * partial_scale);
    end_ratio.max(partial_token_ratio(a, b) * UNBASE_SCALE * partial_scale)
}

/// |intersection| / |union| of the token sets; `None` when either side has no tokens
pub fn token_jaccard(a: &str, b: &str) -> Option<f64> {
    let tokens_a = token_set(a);
    let tokens_b = token_set(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return None;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    Some(intersection as f64 / union as f64)
}

fn trigrams(s: &str) -> HashSet<String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 3 {
        return std::iter::once(s.to_string()).collect();
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

/// Jaccard similarity over overlapping 3-character windows
pub fn trigram_jaccard(a: &str, b: &str) -> Option<f64> {
    let grams_a = trigrams(a);
    let grams_b = trigrams(b);
    if grams_a.is_empty() || grams_b.is_empty() {
        return None;
    }
    let intersection = grams_a.intersection(&grams_b).count();
    let union = grams_a.union(&grams_b).count();
    Some(intersection as f64 / union as f64)
}

/// len(shorter) / len(longer) when one string contains the other
pub fn containment(a: &str, b: &str) -> Option<f64> {
    if !(a.contains(b) || b.contains(a)) {
        return None;
    }
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let longer = len_a.max(len_b);
    if longer == 0 {
        return None;
    }
    Some(len_a.min(len_b) as f64 / longer as f64)
}

/// 1.0 on equal keys, 0.5 when the shorter key (at least 3 long) prefixes the other
pub fn phonetic_similarity(a: &str, b: &str) -> Option<f64> {
    let key_a = metaphone(a);
    let key_b = metaphone(b);
    if key_a.is_empty() || key_b.is_empty() {
        return None;
    }
    if key_a == key_b {
        return Some(1.0);
    }
    let (shorter, longer) = if key_a.len() <= key_b.len() {
        (&key_a, &key_b)
    } else {
        (&key_b, &key_a)
    };
    if shorter.len() >= 3 && longer.starts_with(shorter.as_str()) {
        Some(0.5)
    } else {
        Some(0.0)
    }
}

/// Ensemble scorer, configured once at startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyScorer {
    strategy: MatchingStrategy,
    phonetic: bool,
}

impl Default for FuzzyScorer {
    fn default() -> Self {
        Self::new(MatchingStrategy::FullEnsemble, true)
    }
}

impl FuzzyScorer {
    pub fn new(strategy: MatchingStrategy, phonetic: bool) -> Self {
        Self { strategy, phonetic }
    }

    pub fn strategy(&self) -> MatchingStrategy {
        self.strategy
    }

    pub fn phonetic_enabled(&self) -> bool {
        self.phonetic
    }

    /// Weighted signals that apply to this pair, as `(value, base_weight)`
    fn signals(&self, a: &str, b: &str) -> Vec<(f64, f64)> {
        let mut signals = Vec::with_capacity(8);

        match self.strategy {
            MatchingStrategy::FullEnsemble => {
                signals.push((ratio(a, b), RATIO_WEIGHT));
                signals.push((partial_ratio(a, b), PARTIAL_WEIGHT));
                signals.push((token_sort_ratio(a, b), TOKEN_SORT_WEIGHT));
                signals.push((token_set_ratio(a, b), TOKEN_SET_WEIGHT));
            }
            MatchingStrategy::SequenceOnly => {
                signals.push((strsim::normalized_levenshtein(a, b), SEQUENCE_WEIGHT));
            }
        }

        if self.phonetic {
            if let Some(value) = phonetic_similarity(a, b) {
                signals.push((value, PHONETIC_WEIGHT));
            }
        }
        if let Some(value) = token_jaccard(a, b) {
            signals.push((value, TOKEN_JACCARD_WEIGHT));
        }
        if let Some(value) = trigram_jaccard(a, b) {
            signals.push((value, TRIGRAM_WEIGHT));
        }
        if let Some(value) = containment(a, b) {
            signals.push((value, CONTAINMENT_WEIGHT));
        }

        signals
    }

    /// Similarity of two normalized names.
    ///
    /// Equal names score exactly 1.0; a pair where either side is empty scores 0.0.
    ///
    /// ```rust
    /// use prescription_validator::fuzzy::FuzzyScorer;
    ///
    /// let scorer = FuzzyScorer::default();
    /// assert_eq!(scorer.score("amoxicillin", "amoxicillin"), 1.0);
    /// assert!(scorer.score("paracetmol", "paracetamol") > 0.75);
    /// ```
    pub fn score(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }

        let signals = self.signals(a, b);
        let total_weight: f64 = signals.iter().map(|(_, w)| w).sum();
        if total_weight <= 0.0 {
            return 0.0;
        }

        let weighted: f64 = signals.iter().map(|(v, w)| v * w / total_weight).sum();
        weighted.min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_ratio() {
        assert!(approx(ratio("", ""), 1.0));
        assert!(approx(ratio("abc", ""), 0.0));
        assert!(approx(ratio("abc", "abc"), 1.0));
        // lcs("paracetmol", "paracetamol") = 10
        assert!(approx(ratio("paracetmol", "paracetamol"), 20.0 / 21.0));
    }

    #[test]
    fn test_partial_ratio() {
        assert!(approx(partial_ratio("this is a test", "this is a test!"), 1.0));
        assert!(approx(partial_ratio("amox", "amoxicillin"), 1.0));
        assert!(approx(partial_ratio("paracetmol", "paracetamol"), 0.9));
        assert!(approx(partial_ratio("", "x"), 0.0));
    }

    #[test]
    fn test_token_ratios() {
        assert!(approx(
            token_sort_ratio("clavulanate amoxicillin", "amoxicillin clavulanate"),
            1.0
        ));
        assert!(approx(token_set_ratio("amoxicillin", "amoxicillin clavulanate"), 1.0));
        assert!(approx(token_set_ratio("a b c", "a d"), 0.5));
        assert!(approx(token_set_ratio("", "a"), 0.0));
    }

    #[test]
    fn test_weighted_ratio() {
        assert!(approx(weighted_ratio("paracetmol", "paracetamol"), 20.0 / 21.0));
        assert!(approx(weighted_ratio("", "x"), 0.0));
        // very different lengths use the scaled partial ratio
        assert!(approx(weighted_ratio("ibuprofen", "ibuprofen tablet oral"), 0.9));
    }

    #[test]
    fn test_set_signals() {
        assert_eq!(token_jaccard("a b", "b c"), Some(1.0 / 3.0));
        assert_eq!(token_jaccard("", "b c"), None);
        assert_eq!(trigram_jaccard("ab", "ab"), Some(1.0));
        assert_eq!(trigram_jaccard("abcd", "abce"), Some(1.0 / 3.0));
        assert_eq!(containment("amox", "amoxicillin"), Some(4.0 / 11.0));
        assert_eq!(containment("amox", "ibuprofen"), None);
    }

    #[test]
    fn test_phonetic_similarity() {
        assert_eq!(phonetic_similarity("paracetmol", "paracetamol"), Some(1.0));
        assert_eq!(phonetic_similarity("123", "paracetamol"), None);
        assert_eq!(phonetic_similarity("ibuprofen", "paracetamol"), Some(0.0));
    }

    #[test]
    fn test_score_exact_and_empty() {
        let scorer = FuzzyScorer::default();
        assert_eq!(scorer.score("aspirin", "aspirin"), 1.0);
        assert_eq!(scorer.score("", "aspirin"), 0.0);
        assert_eq!(scorer.score("", ""), 0.0);
    }

    #[test]
    fn test_score_typo() {
        let full = FuzzyScorer::new(MatchingStrategy::FullEnsemble, true);
        let score = full.score("paracetmol", "paracetamol");
        assert!((score - 0.8369).abs() < 1e-3, "score was {}", score);

        let without_phonetic = FuzzyScorer::new(MatchingStrategy::FullEnsemble, false);
        let score = without_phonetic.score("paracetmol", "paracetamol");
        assert!((score - 0.8197).abs() < 1e-3, "score was {}", score);
    }

    #[test]
    fn test_score_unrelated_is_low() {
        let scorer = FuzzyScorer::default();
        assert!(scorer.score("unrelatedxyzdrug", "paracetamol") < 0.3);
        assert!(scorer.score("unrelatedxyzdrug", "amoxicillin") < 0.3);
    }

    #[test]
    fn test_sequence_only_strategy() {
        let scorer = FuzzyScorer::new(MatchingStrategy::SequenceOnly, true);
        let score = scorer.score("paracetmol", "paracetamol");
        assert!((score - 0.7552).abs() < 1e-3, "score was {}", score);
        assert_eq!(scorer.score("same", "same"), 1.0);
    }

    #[test]
    fn test_score_bounds() {
        let scorer = FuzzyScorer::default();
        let pairs = [
            ("a", "b"),
            ("ab", "abc"),
            ("amoxicillin clavulanate", "clavulanate"),
            ("x y z", "z y x"),
        ];
        for (a, b) in pairs {
            let s = scorer.score(a, b);
            assert!((0.0..=1.0).contains(&s), "{} vs {} = {}", a, b, s);
        }
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("full".parse::<MatchingStrategy>(), Ok(MatchingStrategy::FullEnsemble));
        assert_eq!(
            "Sequence".parse::<MatchingStrategy>(),
            Ok(MatchingStrategy::SequenceOnly)
        );
        assert!("fast".parse::<MatchingStrategy>().is_err());
    }
}

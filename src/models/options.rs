//! Option lists for a single address level and their natural ordering.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Catch-all choice offered when a level has no enumerated subdivisions.
pub const OTHER_REGION: &str = "-기타지역";

/// Deduplicated, naturally sorted choices for one level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionList {
    values: Vec<String>,
}

impl OptionList {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Trim, drop blanks, deduplicate and natural-sort raw values
    pub fn normalize<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut values: Vec<String> = raw
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .filter(|s| seen.insert(s.clone()))
            .collect();
        values.sort_by(|a, b| natural_cmp(a, b));
        Self { values }
    }

    /// Guarantee the "other region" entry is present and first.
    ///
    /// The remaining values keep their relative order.
    pub fn with_other_region(self) -> Self {
        let mut values = Vec::with_capacity(self.values.len() + 1);
        values.push(OTHER_REGION.to_string());
        values.extend(self.values.into_iter().filter(|v| v != OTHER_REGION));
        Self { values }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<String> {
        self.values
    }
}

impl<'a> IntoIterator for &'a OptionList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// A run of ASCII digits or of everything else
#[derive(Debug)]
enum Token<'a> {
    Digits(&'a str),
    Text(&'a str),
}

impl PartialEq for Token<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Token<'_> {}

impl Ord for Token<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Token::Digits(a), Token::Digits(b)) => cmp_numeric(a, b),
            (Token::Text(a), Token::Text(b)) => a.cmp(b),
            // numbers sort ahead of text at the same position
            (Token::Digits(_), Token::Text(_)) => Ordering::Less,
            (Token::Text(_), Token::Digits(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Token<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare digit runs by value without parsing, so any length works
fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let significant = |run: &str| -> Vec<u32> {
        run.chars()
            .filter_map(digit_value)
            .skip_while(|d| *d == 0)
            .collect()
    };
    let a = significant(a);
    let b = significant(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(&b))
}

/// ASCII and full-width digits ("１０리" is numbered like "10리")
fn digit_value(ch: char) -> Option<u32> {
    match ch {
        '0'..='9' => Some(ch as u32 - '0' as u32),
        '０'..='９' => Some(ch as u32 - '０' as u32),
        _ => None,
    }
}

fn tokenize(s: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_digits = None;

    for (i, ch) in s.char_indices() {
        let is_digit = digit_value(ch).is_some();
        match in_digits {
            Some(prev) if prev != is_digit => {
                tokens.push(make_token(&s[start..i], prev));
                start = i;
            }
            _ => {}
        }
        in_digits = Some(is_digit);
    }
    if let Some(prev) = in_digits {
        tokens.push(make_token(&s[start..], prev));
    }
    tokens
}

fn make_token(run: &str, digits: bool) -> Token<'_> {
    if digits {
        Token::Digits(run)
    } else {
        Token::Text(run)
    }
}

/// Natural ordering: "2리" < "10리".
///
/// Token lists are compared position by position; a list that is a prefix of
/// the other sorts first. Values that tie (e.g. "01" and "1") fall back to
/// plain string order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    tokenize(a).cmp(&tokenize(b)).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(values: &[&str]) -> Vec<String> {
        OptionList::normalize(values).into_vec()
    }

    #[test]
    fn test_full_width_digits_sort_numerically() {
        assert_eq!(list(&["１０리", "２리", "1리"]), vec!["1리", "２리", "１０리"]);
        assert_eq!(natural_cmp("１０", "9"), Ordering::Greater);
    }

    #[test]
    fn test_numbered_subdivisions_sort_numerically() {
        assert_eq!(list(&["10리", "1리", "2리"]), vec!["1리", "2리", "10리"]);
        assert_eq!(list(&["1리", "2리", "10리"]), vec!["1리", "2리", "10리"]);
    }

    #[test]
    fn test_lot_numbers() {
        assert_eq!(
            list(&["산12", "100-1", "9", "100-10", "100-2", "산3"]),
            vec!["9", "100-1", "100-2", "100-10", "산3", "산12"]
        );
    }

    #[test]
    fn test_dedup_and_trim() {
        let out = list(&["  강동면 ", "강동면", "", "   ", "옥계면", "강동면"]);
        assert_eq!(out, vec!["강동면", "옥계면"]);
    }

    #[test]
    fn test_set_equality_with_dedup_input() {
        let input = ["b2", "a10", "a2", "b2", "a10", "c", "a"];
        let out = list(&input);
        let expected: HashSet<&str> = input.iter().copied().collect();
        let actual: HashSet<&str> = out.iter().map(String::as_str).collect();
        assert_eq!(out.len(), actual.len());
        assert_eq!(actual, expected);
        assert_eq!(out, vec!["a", "a2", "a10", "b2", "c"]);
    }

    #[test]
    fn test_shorter_token_list_first() {
        assert_eq!(natural_cmp("1", "1리"), Ordering::Less);
        assert_eq!(natural_cmp("리", "리1"), Ordering::Less);
    }

    #[test]
    fn test_huge_digit_runs() {
        assert_eq!(
            natural_cmp("99999999999999999999999", "100000000000000000000000"),
            Ordering::Less
        );
        assert_eq!(natural_cmp("007", "7"), Ordering::Less);
        assert_eq!(natural_cmp("7", "007"), Ordering::Greater);
    }

    #[test]
    fn test_other_region_on_empty() {
        let opts = OptionList::empty().with_other_region();
        assert_eq!(opts.into_vec(), vec![OTHER_REGION]);
    }

    #[test]
    fn test_other_region_prepended() {
        let opts = OptionList::normalize(["옥계면", "강동면"]).with_other_region();
        assert_eq!(opts.into_vec(), vec![OTHER_REGION, "강동면", "옥계면"]);
    }

    #[test]
    fn test_other_region_moved_to_front() {
        let opts = OptionList::normalize(["가", OTHER_REGION, "나"]);
        let opts = opts.with_other_region();
        assert_eq!(opts.len(), 3);
        assert_eq!(opts.get(0), Some(OTHER_REGION));
        assert_eq!(opts.iter().skip(1).collect::<Vec<_>>(), vec!["가", "나"]);
    }
}

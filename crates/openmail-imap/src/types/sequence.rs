//! UID sequence sets (RFC 9051 `sequence-set`).
//!
//! Grammar: `seq = item ("," item)*` with
//! `item = num | num ":" num | num ":*" | "*" | "*:" num`.
//! Mutating commands validate a set's expansion against the last search
//! result before anything reaches the wire, so a typo cannot turn into a
//! mass STORE.

use crate::error::{Error, Result};

/// One element of a sequence set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceItem {
    /// Single UID.
    Single(u32),
    /// Inclusive range.
    Range(u32, u32),
    /// Range open at the top (`n:*`).
    RangeFrom(u32),
    /// Range open at the bottom (`*:n`).
    RangeTo(u32),
    /// The highest UID (`*`).
    Star,
}

/// A parsed sequence set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSet {
    items: Vec<SequenceItem>,
}

impl SequenceSet {
    /// Creates a set containing a single UID.
    #[must_use]
    pub fn single(uid: u32) -> Self {
        Self {
            items: vec![SequenceItem::Single(uid)],
        }
    }

    /// Creates a set of explicit UIDs, preserving order.
    #[must_use]
    pub fn from_uids(uids: &[u32]) -> Self {
        Self {
            items: uids.iter().map(|&uid| SequenceItem::Single(uid)).collect(),
        }
    }

    /// Parses a sequence set string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] on syntax errors, zero values, or
    /// descending ranges.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::Validation("Empty sequence set".to_string()));
        }

        let mut items = Vec::new();
        for part in input.split(',') {
            items.push(Self::parse_item(part.trim())?);
        }

        Ok(Self { items })
    }

    fn parse_item(part: &str) -> Result<SequenceItem> {
        let invalid = || Error::Validation(format!("Invalid sequence item: {part:?}"));

        if part == "*" {
            return Ok(SequenceItem::Star);
        }

        match part.split_once(':') {
            None => parse_num(part).map(SequenceItem::Single).ok_or_else(invalid),
            Some(("*", end)) => parse_num(end).map(SequenceItem::RangeTo).ok_or_else(invalid),
            Some((start, "*")) => parse_num(start)
                .map(SequenceItem::RangeFrom)
                .ok_or_else(invalid),
            Some((start, end)) => {
                let (start, end) = parse_num(start)
                    .zip(parse_num(end))
                    .ok_or_else(invalid)?;
                if start > end {
                    return Err(Error::Validation(format!(
                        "Descending range: {start}:{end}"
                    )));
                }
                Ok(SequenceItem::Range(start, end))
            }
        }
    }

    /// True when any item involves the `*` wildcard.
    #[must_use]
    pub fn contains_wildcard(&self) -> bool {
        self.items.iter().any(|item| {
            matches!(
                item,
                SequenceItem::Star | SequenceItem::RangeFrom(_) | SequenceItem::RangeTo(_)
            )
        })
    }

    /// Expands the set to an explicit UID list, in item order.
    ///
    /// Wildcards resolve against `max_uid`. Duplicates from overlapping
    /// items are kept out; order of first appearance wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a wildcard is used while the
    /// mailbox maximum is unknown (`max_uid` = `None`).
    pub fn expand(&self, max_uid: Option<u32>) -> Result<Vec<u32>> {
        let resolve_max = || {
            max_uid.ok_or_else(|| {
                Error::Validation("Wildcard requires a known mailbox maximum".to_string())
            })
        };

        let mut out: Vec<u32> = Vec::new();
        let mut push = |uid: u32, out: &mut Vec<u32>| {
            if !out.contains(&uid) {
                out.push(uid);
            }
        };

        for item in &self.items {
            match *item {
                SequenceItem::Single(uid) => push(uid, &mut out),
                SequenceItem::Range(start, end) => {
                    for uid in start..=end {
                        push(uid, &mut out);
                    }
                }
                SequenceItem::RangeFrom(start) => {
                    let max = resolve_max()?;
                    for uid in start..=max.max(start) {
                        push(uid, &mut out);
                    }
                }
                SequenceItem::RangeTo(end) => {
                    let max = resolve_max()?;
                    for uid in end.min(max)..=max {
                        push(uid, &mut out);
                    }
                }
                SequenceItem::Star => {
                    let max = resolve_max()?;
                    push(max, &mut out);
                }
            }
        }

        Ok(out)
    }
}

fn parse_num(s: &str) -> Option<u32> {
    let n: u32 = s.parse().ok()?;
    (n > 0).then_some(n)
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            match *item {
                SequenceItem::Single(n) => write!(f, "{n}")?,
                SequenceItem::Range(a, b) => write!(f, "{a}:{b}")?,
                SequenceItem::RangeFrom(a) => write!(f, "{a}:*")?,
                SequenceItem::RangeTo(b) => write!(f, "*:{b}")?,
                SequenceItem::Star => write!(f, "*")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_single() {
        let set = SequenceSet::parse("7").unwrap();
        assert_eq!(set.expand(None).unwrap(), vec![7]);
    }

    #[test]
    fn parse_list_and_range() {
        let set = SequenceSet::parse("1,3:5").unwrap();
        assert_eq!(set.expand(None).unwrap(), vec![1, 3, 4, 5]);
    }

    #[test]
    fn parse_preserves_item_order() {
        let set = SequenceSet::parse("5,1:3").unwrap();
        assert_eq!(set.expand(None).unwrap(), vec![5, 1, 2, 3]);
    }

    #[test]
    fn expand_deduplicates() {
        let set = SequenceSet::parse("2,1:3").unwrap();
        assert_eq!(set.expand(None).unwrap(), vec![2, 1, 3]);
    }

    #[test]
    fn parse_rejects_zero() {
        assert!(SequenceSet::parse("0").is_err());
        assert!(SequenceSet::parse("0:5").is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(SequenceSet::parse("").is_err());
        assert!(SequenceSet::parse("a").is_err());
        assert!(SequenceSet::parse("1:2:3").is_err());
        assert!(SequenceSet::parse("1,,2").is_err());
    }

    #[test]
    fn parse_rejects_descending_range() {
        assert!(SequenceSet::parse("5:3").is_err());
    }

    #[test]
    fn wildcard_detection() {
        assert!(SequenceSet::parse("*").unwrap().contains_wildcard());
        assert!(SequenceSet::parse("1:*").unwrap().contains_wildcard());
        assert!(SequenceSet::parse("*:3").unwrap().contains_wildcard());
        assert!(!SequenceSet::parse("1,2:4").unwrap().contains_wildcard());
    }

    #[test]
    fn wildcard_resolves_against_max() {
        let set = SequenceSet::parse("3:*").unwrap();
        assert_eq!(set.expand(Some(5)).unwrap(), vec![3, 4, 5]);

        let set = SequenceSet::parse("*").unwrap();
        assert_eq!(set.expand(Some(9)).unwrap(), vec![9]);

        let set = SequenceSet::parse("*:7").unwrap();
        assert_eq!(set.expand(Some(9)).unwrap(), vec![7, 8, 9]);
    }

    #[test]
    fn wildcard_without_max_is_error() {
        let set = SequenceSet::parse("1:*").unwrap();
        assert!(set.expand(None).is_err());
    }

    #[test]
    fn display_round_trip() {
        for input in ["1", "1,3:5", "1:*", "*", "*:4,9"] {
            let set = SequenceSet::parse(input).unwrap();
            assert_eq!(set.to_string(), input);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_display_round_trip(items in prop::collection::vec(1u32..10_000, 1..8)) {
                let input = items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                let set = SequenceSet::parse(&input).unwrap();
                let reparsed = SequenceSet::parse(&set.to_string()).unwrap();
                prop_assert_eq!(set, reparsed);
            }

            #[test]
            fn expansion_is_within_range(start in 1u32..1000, len in 0u32..50) {
                let end = start + len;
                let set = SequenceSet::parse(&format!("{start}:{end}")).unwrap();
                let expanded = set.expand(None).unwrap();
                prop_assert_eq!(expanded.len() as u32, len + 1);
                prop_assert!(expanded.iter().all(|&u| u >= start && u <= end));
            }
        }
    }
}

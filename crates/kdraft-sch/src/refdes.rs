//! Reference designator parsing and allocation.
//!
//! References are compared case-insensitively: `r1` and `R1` are the same
//! designator. Allocation always hands out the smallest unused numeric
//! suffix >= 1 for a prefix.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRefdes {
    pub prefix: String,
    pub number: u32,
}

/// Parse a designator like `R1`, `IC10` or `LED12` (letters then digits, no
/// leading zeros, number >= 1). Prefix is normalised to uppercase.
pub fn parse_refdes(s: &str) -> Option<ParsedRefdes> {
    if s.len() < 2 {
        return None;
    }

    let first_digit = s.find(|c: char| c.is_ascii_digit())?;
    let (prefix, digits) = s.split_at(first_digit);
    if prefix.is_empty() || digits.is_empty() {
        return None;
    }
    if !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }

    let number: u32 = digits.parse().ok()?;
    if number == 0 {
        return None;
    }

    Some(ParsedRefdes {
        prefix: prefix.to_ascii_uppercase(),
        number,
    })
}

/// Tracks used designator numbers per prefix and hands out fresh ones.
#[derive(Debug, Default, Clone)]
pub struct RefdesAllocator {
    used: HashMap<String, HashSet<u32>>,
}

impl RefdesAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the allocator with designators already present in a document.
    /// Strings that do not parse as designators are ignored.
    pub fn from_existing<'a>(refs: impl IntoIterator<Item = &'a str>) -> Self {
        let mut alloc = Self::new();
        for r in refs {
            alloc.reserve(r);
        }
        alloc
    }

    /// Mark a designator as taken.
    pub fn reserve(&mut self, refdes: &str) {
        if let Some(parsed) = parse_refdes(refdes) {
            self.used.entry(parsed.prefix).or_default().insert(parsed.number);
        }
    }

    pub fn is_taken(&self, refdes: &str) -> bool {
        parse_refdes(refdes)
            .map(|p| self.used.get(&p.prefix).is_some_and(|u| u.contains(&p.number)))
            .unwrap_or(false)
    }

    /// Allocate the smallest unused designator for a prefix and mark it used.
    pub fn allocate(&mut self, prefix: &str) -> String {
        let key = prefix.to_ascii_uppercase();
        let used = self.used.entry(key).or_default();
        let mut n = 1u32;
        while used.contains(&n) {
            n += 1;
        }
        used.insert(n);
        format!("{}{}", prefix, n)
    }
}

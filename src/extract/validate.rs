//! Validation rules for extracted field values.
//!
//! Extractors only ever return values that pass these checks; anything below
//! the bar becomes `None`, never a guess.

use std::sync::LazyLock;

use regex::Regex;

/// Permit cards carry issue years in the same typeface as the identifier
/// code, so any 4-digit token in this range is assumed to be a year.
const YEAR_RANGE: std::ops::RangeInclusive<u32> = 2000..=2030;

/// Plate shape patterns, in priority order: county plates (2-3 letters then
/// 3-4 digits), transit plates (letter-digit-letter-digits), then a generic
/// alphanumeric token.
static PLATE_SHAPES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"^[A-Z]{2,3}[0-9]{3,4}$").expect("failed to compile regex"),
        Regex::new(r"^[A-Z][0-9][A-Z][0-9]{2,4}$").expect("failed to compile regex"),
        Regex::new(r"^[A-Z0-9]{5,7}$").expect("failed to compile regex"),
    ]
});

/// Tokens that match a plate shape but show up on every permit page.
const PLATE_BLACKLIST: &[&str] = &["EURO3", "EURO4", "EURO5", "EURO6", "ISO9001"];

/// Words that mark a line's digits as organizational numbers rather than the
/// permit identifier.
const CONTEXT_KEYWORDS: &[&str] = &[
    "COMPANY",
    "UNIT",
    "MINISTRY",
    "DEPARTMENT",
    "ORDER",
    "REGISTRY",
];

/// Is this 4-digit token a plausible calendar year?
pub fn is_plausible_year(token: &str) -> bool {
    token.len() == 4
        && token
            .parse::<u32>()
            .is_ok_and(|year| YEAR_RANGE.contains(&year))
}

/// Is this token a valid permit identifier code?
pub fn is_valid_code(token: &str) -> bool {
    token.len() == 4
        && token.bytes().all(|b| b.is_ascii_digit())
        && !is_plausible_year(token)
}

/// Is this token a valid vehicle plate?
///
/// Accepted values always match one of the shape patterns, contain at least
/// one letter and one digit, are 5-8 characters long, and are not
/// blacklisted.
pub fn is_valid_plate(token: &str) -> bool {
    if token.len() < 5 || token.len() > 8 {
        return false;
    }
    if !token.bytes().any(|b| b.is_ascii_uppercase())
        || !token.bytes().any(|b| b.is_ascii_digit())
    {
        return false;
    }
    if PLATE_BLACKLIST.contains(&token) {
        return false;
    }
    matches_plate_shape(token).is_some()
}

/// Which shape pattern does this token match, if any? Returns the pattern's
/// priority index.
pub fn matches_plate_shape(token: &str) -> Option<usize> {
    PLATE_SHAPES.iter().position(|shape| shape.is_match(token))
}

/// Does this line mention an organization, making its digits unrelated to
/// the permit identifier?
pub fn has_context_keyword(line: &str) -> bool {
    let upper = line.to_uppercase();
    CONTEXT_KEYWORDS.iter().any(|keyword| upper.contains(keyword))
}

/// Maximal runs of ASCII digits in a line that are exactly 4 digits long.
///
/// A 4-digit window inside a longer digit run does not count: the token must
/// stand on its own.
pub fn four_digit_runs(line: &str) -> Vec<&str> {
    let bytes = line.as_bytes();
    let mut runs = Vec::new();
    let mut start = None;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            start.get_or_insert(i);
        } else if let Some(s) = start.take()
            && i - s == 4
        {
            runs.push(&line[s..i]);
        }
    }
    if let Some(s) = start
        && bytes.len() - s == 4
    {
        runs.push(&line[s..]);
    }
    runs
}

//! Fractional order keys.
//!
//! Rows are ordered by a sortable string rather than an integer so that a row
//! can be placed between two neighbours without renumbering either of them.
//! Keys are base-62 digit strings (`0-9A-Za-z`, which is also ASCII order) with
//! no trailing `0`, so byte-wise comparison of two keys is the same as
//! comparing the fractions they encode.
//!
//! ```text
//! between(None, None)        -> "V"
//! between(Some("V"), None)   -> "l"
//! between(Some("V"), "W")    -> "VV"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ErrorCode;

const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: usize = DIGITS.len();

/// Errors produced when parsing or generating order keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderKeyError {
    #[error("order key is empty")]
    Empty,

    #[error("order key '{key}' contains invalid character '{found}'")]
    InvalidChar { key: String, found: char },

    #[error("order key '{0}' ends in '0' and has no distinct successor encoding")]
    TrailingZero(String),

    #[error("lower bound '{lo}' does not sort before upper bound '{hi}'")]
    NotAscending { lo: String, hi: String },
}

impl OrderKeyError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidOrderKey
    }
}

/// A validated, sortable order key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderKey(String);

impl OrderKey {
    /// Parse and validate a key.
    ///
    /// # Errors
    ///
    /// Returns [`OrderKeyError`] if the key is empty, contains characters
    /// outside the base-62 alphabet, or ends in `0`.
    pub fn parse(raw: &str) -> Result<Self, OrderKeyError> {
        if raw.is_empty() {
            return Err(OrderKeyError::Empty);
        }
        if let Some(found) = raw.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(OrderKeyError::InvalidChar {
                key: raw.to_string(),
                found,
            });
        }
        if raw.ends_with('0') {
            return Err(OrderKeyError::TrailingZero(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// The key used for the first row of an empty table.
    #[must_use]
    pub fn first() -> Self {
        Self(encode(&midpoint(&[], None)))
    }

    /// Generate a key strictly between `lo` and `hi`.
    ///
    /// A missing bound means "open on that side".
    ///
    /// # Errors
    ///
    /// Returns [`OrderKeyError::NotAscending`] when both bounds are present
    /// and `lo >= hi`.
    pub fn between(lo: Option<&Self>, hi: Option<&Self>) -> Result<Self, OrderKeyError> {
        if let (Some(lo), Some(hi)) = (lo, hi) {
            if lo >= hi {
                return Err(OrderKeyError::NotAscending {
                    lo: lo.0.clone(),
                    hi: hi.0.clone(),
                });
            }
        }

        let lo_digits = lo.map(|k| decode(&k.0)).unwrap_or_default();
        let hi_digits = hi.map(|k| decode(&k.0));
        Ok(Self(encode(&midpoint(&lo_digits, hi_digits.as_deref()))))
    }

    /// Generate a key that sorts after `self`.
    #[must_use]
    pub fn after(&self) -> Self {
        Self(encode(&midpoint(&decode(&self.0), None)))
    }

    /// `count` ascending keys of equal width, evenly spaced over the key
    /// space. Used to renumber a table whose keys have collided.
    #[must_use]
    pub fn spread(count: usize) -> Vec<Self> {
        let slots = count.saturating_add(1);
        let mut width = 1;
        let mut space = BASE;
        while space < slots {
            width += 1;
            space = space.saturating_mul(BASE);
        }
        let step = space / slots;

        (1..=count)
            .map(|i| {
                let mut value = i * step;
                let mut digits = vec![0; width];
                for digit in digits.iter_mut().rev() {
                    *digit = value % BASE;
                    value /= BASE;
                }
                while digits.last() == Some(&0) {
                    digits.pop();
                }
                Self(encode(&digits))
            })
            .collect()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrderKey {
    type Err = OrderKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderKey {
    type Error = OrderKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderKey> for String {
    fn from(value: OrderKey) -> Self {
        value.0
    }
}

fn digit_value(c: u8) -> usize {
    match c {
        b'0'..=b'9' => usize::from(c - b'0'),
        b'A'..=b'Z' => usize::from(c - b'A') + 10,
        b'a'..=b'z' => usize::from(c - b'a') + 36,
        _ => 0,
    }
}

fn decode(key: &str) -> Vec<usize> {
    key.bytes().map(digit_value).collect()
}

fn encode(digits: &[usize]) -> String {
    digits.iter().map(|&d| char::from(DIGITS[d])).collect()
}

/// Digit-wise midpoint of two fractions.
///
/// `lo` may be empty (zero); `hi` of `None` is one. Neither may carry
/// trailing zeros and `lo < hi` must hold.
fn midpoint(lo: &[usize], hi: Option<&[usize]>) -> Vec<usize> {
    if let Some(hi) = hi {
        let mut n = 0;
        while n < hi.len() && lo.get(n).copied().unwrap_or(0) == hi[n] {
            n += 1;
        }
        if n > 0 {
            let mut out = hi[..n].to_vec();
            let rest_hi = &hi[n..];
            let rest_lo = lo.get(n..).unwrap_or(&[]);
            out.extend(midpoint(
                rest_lo,
                if rest_hi.is_empty() { None } else { Some(rest_hi) },
            ));
            return out;
        }
    }

    let digit_lo = lo.first().copied().unwrap_or(0);
    let digit_hi = hi.and_then(|h| h.first().copied()).unwrap_or(BASE);

    if digit_hi.saturating_sub(digit_lo) > 1 {
        return vec![(digit_lo + digit_hi).div_ceil(2)];
    }

    match hi {
        Some(h) if h.len() > 1 => vec![h[0]],
        _ => {
            let mut out = vec![digit_lo];
            out.extend(midpoint(lo.get(1..).unwrap_or(&[]), None));
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> OrderKey {
        OrderKey::parse(raw).expect("valid key")
    }

    #[test]
    fn first_key_is_midpoint_of_alphabet() {
        assert_eq!(OrderKey::first().as_str(), "V");
    }

    #[test]
    fn between_open_bounds() {
        let k = OrderKey::between(Some(&key("V")), None).expect("between");
        assert!(k > key("V"));

        let k = OrderKey::between(None, Some(&key("1"))).expect("between");
        assert!(k < key("1"));
        assert_eq!(k.as_str(), "0V");
    }

    #[test]
    fn between_adjacent_digits_extends_length() {
        let lo = key("V");
        let hi = key("W");
        let mid = OrderKey::between(Some(&lo), Some(&hi)).expect("between");
        assert!(lo < mid && mid < hi, "{lo} < {mid} < {hi}");
    }

    #[test]
    fn between_shared_prefix() {
        let lo = key("a1");
        let hi = key("a2");
        let mid = OrderKey::between(Some(&lo), Some(&hi)).expect("between");
        assert!(mid.as_str().starts_with("a1"));
        assert!(lo < mid && mid < hi);
    }

    #[test]
    fn between_rejects_descending_bounds() {
        let err = OrderKey::between(Some(&key("b")), Some(&key("a"))).unwrap_err();
        assert!(matches!(err, OrderKeyError::NotAscending { .. }));
        assert!(OrderKey::between(Some(&key("b")), Some(&key("b"))).is_err());
    }

    #[test]
    fn repeated_insertion_stays_ordered() {
        let lo = key("a");
        let mut hi = key("b");
        for _ in 0..64 {
            let mid = OrderKey::between(Some(&lo), Some(&hi)).expect("between");
            assert!(lo < mid && mid < hi);
            assert!(!mid.as_str().ends_with('0'));
            hi = mid;
        }
    }

    #[test]
    fn spread_keys_are_short_and_ascending() {
        let keys = OrderKey::spread(5);
        assert_eq!(keys.len(), 5);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert!(keys.iter().all(|k| k.as_str().len() == 1));

        let many = OrderKey::spread(10_000);
        assert!(many.windows(2).all(|w| w[0] < w[1]));
        assert!(many.iter().all(|k| k.as_str().len() <= 3 && !k.as_str().ends_with('0')));
        assert!(OrderKey::spread(0).is_empty());
    }

    #[test]
    fn after_sorts_later() {
        assert!(key("z").after() > key("z"));
        assert!(key("zz").after() > key("zz"));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(OrderKey::parse(""), Err(OrderKeyError::Empty));
        assert!(matches!(
            OrderKey::parse("a-b"),
            Err(OrderKeyError::InvalidChar { found: '-', .. })
        ));
        assert!(matches!(
            OrderKey::parse("a0"),
            Err(OrderKeyError::TrailingZero(_))
        ));
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: OrderKey = serde_json::from_str("\"n\"").expect("deserialize");
        assert_eq!(ok.as_str(), "n");
        assert!(serde_json::from_str::<OrderKey>("\"n0\"").is_err());
        assert_eq!(serde_json::to_string(&ok).expect("serialize"), "\"n\"");
    }
}

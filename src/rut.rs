//! Chilean national id (RUT)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RutError {
    #[error("RUT is empty")]
    Empty,
    #[error("RUT has invalid characters: {0}")]
    InvalidFormat(String),
    #[error("RUT check digit mismatch: expected {expected}, got {actual}")]
    CheckDigit { expected: char, actual: char },
}

/// A validated RUT
///
/// Serialized in canonical form, `12345678-5` (upper-case `K`, no dots).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rut {
    number: u32,
    check: char,
}

/// Computes the mod-11 check digit for the numeric part of a RUT
///
/// Digits are weighted 2, 3, 4, 5, 6, 7, 2, 3, ... from the right.
pub fn check_digit(number: u32) -> char {
    let mut sum = 0;
    let mut weight = 2;
    let mut rest = number;
    while rest > 0 {
        sum += (rest % 10) * weight;
        rest /= 10;
        weight = if weight == 7 { 2 } else { weight + 1 };
    }
    match 11 - (sum % 11) {
        11 => '0',
        10 => 'K',
        digit => char::from_digit(digit, 10).unwrap_or('0'),
    }
}

impl Rut {
    /// Parses a RUT written as `12.345.678-5`, `12345678-5` or `123456785`
    pub fn parse(raw: &str) -> Result<Self, RutError> {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '.' | '-' | ' '))
            .collect::<String>()
            .to_uppercase();

        if cleaned.is_empty() {
            return Err(RutError::Empty);
        }

        let mut chars = cleaned.chars();
        let actual = chars.next_back().ok_or(RutError::Empty)?;
        let body = chars.as_str();
        if body.is_empty()
            || body.len() > 9
            || !body.chars().all(|c| c.is_ascii_digit())
            || !(actual.is_ascii_digit() || actual == 'K')
        {
            return Err(RutError::InvalidFormat(raw.to_string()));
        }

        let number: u32 = body
            .parse()
            .map_err(|_| RutError::InvalidFormat(raw.to_string()))?;
        let expected = check_digit(number);
        if expected != actual {
            return Err(RutError::CheckDigit { expected, actual });
        }

        Ok(Self { number, check: actual })
    }

    /// Builds the valid RUT for a numeric body
    pub fn from_number(number: u32) -> Self {
        Self {
            number,
            check: check_digit(number),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn check(&self) -> char {
        self.check
    }

    /// Formats with thousands dots, e.g. `12.345.678-5`
    pub fn to_dotted(&self) -> String {
        let digits = self.number.to_string();
        let mut out = String::new();
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push('.');
            }
            out.push(c);
        }
        format!("{}-{}", out, self.check)
    }
}

impl fmt::Display for Rut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.number, self.check)
    }
}

impl FromStr for Rut {
    type Err = RutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Rut {
    type Error = RutError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Rut> for String {
    fn from(rut: Rut) -> Self {
        rut.to_string()
    }
}

/// Returns the canonical form of `raw`, or `None` if it is not a valid RUT
pub fn canonical_rut(raw: &str) -> Option<String> {
    Rut::parse(raw).ok().map(|rut| rut.to_string())
}

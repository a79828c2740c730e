//! Canonical hex form of arbitrary-precision integers
//!
//! On the wire a bigint is a sign byte followed by its magnitude as uppercase
//! hex digits with no leading zero (zero itself is the single digit `0` and
//! is never negative). Native trees carry the same digits as a string,
//! prefixed with `-` when negative.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::Zero;

/// Sign and magnitude digits of a canonical bigint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigintDigits {
    pub negative: bool,
    pub digits: String,
}

impl BigintDigits {
    pub fn from_bigint(value: &BigInt) -> Self {
        let digits = value.magnitude().to_str_radix(16).to_ascii_uppercase();
        Self {
            negative: value.sign() == Sign::Minus,
            digits,
        }
    }

    /// Parse embedder text: optional `-`, optional `0x`, hex digits of either
    /// case. Leading zeros are dropped and `-0` becomes `0`.
    pub fn parse_native(text: &str) -> Result<Self, &'static str> {
        let (negative, rest) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let rest = rest
            .strip_prefix("0x")
            .or_else(|| rest.strip_prefix("0X"))
            .unwrap_or(rest);
        if rest.is_empty() {
            return Err("no digits");
        }
        if !rest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err("non-hex digit");
        }
        let trimmed = rest.trim_start_matches('0');
        if trimmed.is_empty() {
            return Ok(Self {
                negative: false,
                digits: "0".to_string(),
            });
        }
        Ok(Self {
            negative,
            digits: trimmed.to_ascii_uppercase(),
        })
    }

    /// Check wire digits are already canonical
    pub fn validate_wire(negative: bool, digits: &[u8]) -> Result<(), &'static str> {
        match digits {
            [] => Err("no digits"),
            [b'0'] if negative => Err("negative zero"),
            [b'0'] => Ok(()),
            [b'0', ..] => Err("leading zero"),
            _ if digits
                .iter()
                .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(b)) =>
            {
                Ok(())
            }
            _ => Err("digit outside 0-9 A-F"),
        }
    }

    pub fn to_bigint(&self) -> BigInt {
        let magnitude =
            BigUint::parse_bytes(self.digits.as_bytes(), 16).unwrap_or_else(BigUint::zero);
        let sign = if magnitude.is_zero() {
            Sign::NoSign
        } else if self.negative {
            Sign::Minus
        } else {
            Sign::Plus
        };
        BigInt::from_biguint(sign, magnitude)
    }

    /// Text form used in native trees
    pub fn to_native(&self) -> String {
        if self.negative {
            format!("-{}", self.digits)
        } else {
            self.digits.clone()
        }
    }
}

//! Wildcard byte patterns for signature scanning.
//!
//! A pattern is written in a small text language: whitespace separates
//! tokens and is otherwise ignored, `?` stands for exactly one wildcarded
//! byte, and a pair of hex digits stands for one literal byte. Anything
//! else is rejected. `"DE AD ? BE EF"` matches `DE AD xx BE EF`.

use crate::error::{MemscoutError, Result};

/// A byte template with positional wildcards, plus its first-match result.
///
/// The original text doubles as the pattern's identity key for lookup and
/// removal. The wildcard mask carries one bit per template position.
#[derive(Debug, Clone)]
pub struct Pattern {
    text: String,
    bytes: Vec<u8>,
    mask: Vec<u8>,
    pub(crate) result: Option<u64>,
}

impl Pattern {
    /// Parse pattern text into a byte template and wildcard bitmask.
    pub fn parse(text: &str) -> Result<Self> {
        let mut bytes: Vec<u8> = Vec::new();
        let mut mask: Vec<u8> = Vec::new();

        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c.is_whitespace() {
                continue;
            }
            let pos = bytes.len();
            if pos / 8 >= mask.len() {
                mask.push(0);
            }
            if c == '?' {
                mask[pos / 8] |= 1 << (pos % 8);
                bytes.push(0);
                continue;
            }
            let hi = c.to_digit(16);
            let lo = chars.next().and_then(|c| c.to_digit(16));
            match (hi, lo) {
                (Some(hi), Some(lo)) => bytes.push(((hi << 4) | lo) as u8),
                _ => {
                    return Err(MemscoutError::InvalidPattern {
                        text: text.to_string(),
                        message: format!("unexpected token at byte position {}", pos),
                    })
                }
            }
        }

        Ok(Self {
            text: text.to_string(),
            bytes,
            mask,
            result: None,
        })
    }

    /// The original registration text (identity key).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Template length in bytes, wildcards included.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the template holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// First-match address from the current scan epoch, if any.
    pub fn result(&self) -> Option<u64> {
        self.result
    }

    fn wildcard_at(&self, pos: usize) -> bool {
        self.mask
            .get(pos / 8)
            .is_some_and(|byte| byte & (1 << (pos % 8)) != 0)
    }

    /// Test the template against the start of `window`.
    ///
    /// Returns false when the window is shorter than the template. Stops at
    /// the first mismatching non-wildcard position.
    pub fn matches(&self, window: &[u8]) -> bool {
        if window.len() < self.bytes.len() {
            return false;
        }
        for (pos, &expected) in self.bytes.iter().enumerate() {
            if self.wildcard_at(pos) {
                continue;
            }
            if window[pos] != expected {
                return false;
            }
        }
        true
    }
}

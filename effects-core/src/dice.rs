//! Dice formula grammar used for persistent effect magnitudes and saves.
//!
//! Supports sums of dice terms and constants: `2d6+3`, `1d4-1`,
//! `4d6kh3`, `d8`. Formulas can be evaluated at their maximum
//! (every die shows its highest face) or rolled with an RNG.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest number of dice allowed in a single term.
pub const MAX_DICE_PER_TERM: u32 = 1000;

/// Largest number of faces allowed on a single die.
pub const MAX_DIE_SIDES: u32 = 10_000;

/// Error type for dice parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("Invalid die count {count} (in {notation})")]
    InvalidDieCount { count: u32, notation: String },
    #[error("No dice specified")]
    NoDice,
    #[error("Cannot keep {keep} dice when only rolling {count} (in {notation})")]
    InvalidKeepCount {
        keep: u32,
        count: u32,
        notation: String,
    },
}

/// Which dice of a term count toward its subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Keep {
    #[default]
    All,
    Highest(u32),
    Lowest(u32),
}

impl Keep {
    fn kept_count(&self, count: u32) -> u32 {
        match *self {
            Keep::All => count,
            Keep::Highest(n) | Keep::Lowest(n) => n,
        }
    }
}

/// One `NdS` term of a formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceTerm {
    pub count: u32,
    pub sides: u32,
    pub keep: Keep,
    /// `-1` for subtracted terms.
    pub sign: i32,
}

impl DiceTerm {
    fn maximum(&self) -> i64 {
        self.sign as i64 * self.keep.kept_count(self.count) as i64 * self.sides as i64
    }
}

/// A parsed dice formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceFormula {
    pub terms: Vec<DiceTerm>,
    pub modifier: i32,
    /// The formula as written, lower-cased and trimmed.
    pub original: String,
}

impl DiceFormula {
    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut terms = Vec::new();
        let mut modifier: i32 = 0;
        let mut current = String::new();
        let mut sign: i32 = 1;
        let mut pending_sign = false;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if current.is_empty() && pending_sign {
                        // "1d6+-2" and friends
                        return Err(DiceError::InvalidNotation(notation.clone()));
                    }
                    if !current.is_empty() {
                        Self::parse_term(&current, sign, &mut terms, &mut modifier)?;
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                    pending_sign = true;
                }
                c if c.is_whitespace() => continue,
                _ => {
                    current.push(ch);
                    pending_sign = false;
                }
            }
        }

        if current.is_empty() {
            // Trailing operator: "1d6+"
            if pending_sign {
                return Err(DiceError::InvalidNotation(notation));
            }
        } else {
            Self::parse_term(&current, sign, &mut terms, &mut modifier)?;
        }

        if terms.is_empty() && modifier == 0 {
            return Err(DiceError::NoDice);
        }

        Ok(DiceFormula {
            terms,
            modifier,
            original: notation,
        })
    }

    fn parse_term(
        s: &str,
        sign: i32,
        terms: &mut Vec<DiceTerm>,
        modifier: &mut i32,
    ) -> Result<(), DiceError> {
        let invalid = || DiceError::InvalidNotation(s.to_string());

        let Some(d_pos) = s.find('d') else {
            let value: i32 = s.parse().map_err(|_| invalid())?;
            *modifier = modifier
                .checked_add(sign * value)
                .ok_or_else(invalid)?;
            return Ok(());
        };

        let count_str = &s[..d_pos];
        let rest = &s[d_pos + 1..];

        let count: u32 = if count_str.is_empty() {
            1
        } else {
            count_str.parse().map_err(|_| invalid())?
        };
        if count == 0 || count > MAX_DICE_PER_TERM {
            return Err(DiceError::InvalidDieCount {
                count,
                notation: s.to_string(),
            });
        }

        let (sides_str, keep) = if let Some(pos) = rest.find("kh") {
            let n: u32 = rest[pos + 2..].parse().map_err(|_| invalid())?;
            (&rest[..pos], Keep::Highest(n))
        } else if let Some(pos) = rest.find("kl") {
            let n: u32 = rest[pos + 2..].parse().map_err(|_| invalid())?;
            (&rest[..pos], Keep::Lowest(n))
        } else {
            (rest, Keep::All)
        };

        let sides: u32 = sides_str.parse().map_err(|_| invalid())?;
        if sides == 0 || sides > MAX_DIE_SIDES {
            return Err(DiceError::InvalidDieSize(sides));
        }

        if let Keep::Highest(n) | Keep::Lowest(n) = keep {
            if n == 0 || n > count {
                return Err(DiceError::InvalidKeepCount {
                    keep: n,
                    count,
                    notation: s.to_string(),
                });
            }
        }

        terms.push(DiceTerm {
            count,
            sides,
            keep,
            sign,
        });
        Ok(())
    }

    /// Deterministic upper bound: every die shows its highest face.
    pub fn maximum(&self) -> i64 {
        self.terms.iter().map(DiceTerm::maximum).sum::<i64>() + self.modifier as i64
    }

    /// Roll the formula with the given RNG.
    pub fn roll_with_rng<R: Rng>(&self, rng: &mut R) -> RollResult {
        let mut term_results = Vec::with_capacity(self.terms.len());

        for term in &self.terms {
            let rolls: Vec<u32> = (0..term.count)
                .map(|_| rng.gen_range(1..=term.sides))
                .collect();

            let mut kept = rolls.clone();
            match term.keep {
                Keep::All => {}
                Keep::Highest(n) => {
                    kept.sort_by(|a, b| b.cmp(a));
                    kept.truncate(n as usize);
                }
                Keep::Lowest(n) => {
                    kept.sort();
                    kept.truncate(n as usize);
                }
            }

            let subtotal = term.sign as i64 * kept.iter().map(|&r| r as i64).sum::<i64>();
            term_results.push(TermResult {
                sides: term.sides,
                rolls,
                kept,
                subtotal,
            });
        }

        let total = term_results.iter().map(|t| t.subtotal).sum::<i64>() + self.modifier as i64;

        RollResult {
            formula: self.original.clone(),
            term_results,
            modifier: self.modifier,
            total,
        }
    }

    /// Roll with the thread-local RNG.
    pub fn roll(&self) -> RollResult {
        self.roll_with_rng(&mut rand::thread_rng())
    }
}

impl FromStr for DiceFormula {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceFormula::parse(s)
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Result of rolling a single term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermResult {
    pub sides: u32,
    pub rolls: Vec<u32>,
    pub kept: Vec<u32>,
    pub subtotal: i64,
}

/// Complete result of a roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    pub formula: String,
    pub term_results: Vec<TermResult>,
    pub modifier: i32,
    pub total: i64,
}

impl RollResult {
    /// A result carrying only a total, for random sources that don't
    /// report individual dice.
    pub fn from_total(formula: impl Into<String>, total: i64) -> Self {
        Self {
            formula: formula.into(),
            term_results: Vec::new(),
            modifier: 0,
            total,
        }
    }

    /// Format the individual dice for display, e.g. `[4, (1)] + 2`.
    pub fn dice_display(&self) -> String {
        let parts: Vec<String> = self
            .term_results
            .iter()
            .map(|t| {
                let mut unused = t.kept.clone();
                let shown: Vec<String> = t
                    .rolls
                    .iter()
                    .map(|roll| match unused.iter().position(|k| k == roll) {
                        Some(i) => {
                            unused.swap_remove(i);
                            roll.to_string()
                        }
                        None => format!("({roll})"),
                    })
                    .collect();
                format!("[{}]", shown.join(", "))
            })
            .collect();

        let dice = parts.join(" + ");
        match self.modifier {
            0 => dice,
            m if dice.is_empty() => m.to_string(),
            m if m > 0 => format!("{dice} + {m}"),
            m => format!("{dice} - {}", m.abs()),
        }
    }

    /// Check if the roll meets or exceeds a DC.
    pub fn meets_dc(&self, dc: i64) -> bool {
        self.total >= dc
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.term_results.is_empty() {
            write!(f, "{}", self.total)
        } else {
            write!(f, "{} = {}", self.dice_display(), self.total)
        }
    }
}

/// Validate a formula without keeping the parse.
pub fn validate(notation: &str) -> Result<(), DiceError> {
    DiceFormula::parse(notation).map(|_| ())
}

/// Maximum value of a formula.
pub fn maximize(notation: &str) -> Result<i64, DiceError> {
    Ok(DiceFormula::parse(notation)?.maximum())
}

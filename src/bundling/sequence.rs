//! Batch and bundle number generation
//!
//! Both generators are pure: they take the previous identifier (if any)
//! and the current time and return the next one. Callers decide which
//! identifier counts as "previous".

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;

use super::classification::{BatchScheme, NumberingScheme};

/// Two-digit calendar year used in identifiers.
pub fn two_digit_year(now: DateTime<Utc>) -> u32 {
    now.year().rem_euclid(100) as u32
}

fn year_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2})1(\d{4,})$").expect("static regex"))
}

fn trailing_digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)$").expect("static regex"))
}

// ============================================================================
// Batch ids
// ============================================================================

pub struct BatchSequencer;

impl BatchSequencer {
    /// Next batch id for an order. `previous` is the order's latest batch id.
    pub fn next(
        scheme: BatchScheme,
        order_no: &str,
        previous: Option<&str>,
        now: DateTime<Utc>,
    ) -> String {
        match scheme {
            BatchScheme::YearSequence => {
                let yy = two_digit_year(now);
                let seq = previous
                    .and_then(|p| p.rsplit_once('_'))
                    .and_then(|(_, suffix)| year_suffix_re().captures(suffix))
                    .and_then(|caps| {
                        let year: u32 = caps[1].parse().ok()?;
                        let seq: u32 = caps[2].parse().ok()?;
                        Some(if year == yy { seq.checked_add(1).unwrap_or(1) } else { 1 })
                    })
                    .unwrap_or(1);
                format!("{order_no}_{yy:02}1{seq:04}")
            }
            BatchScheme::OrderSequence => {
                let seq = previous
                    .and_then(|p| p.rsplit('_').next())
                    .and_then(|tail| tail.parse::<u32>().ok())
                    .and_then(|n| n.checked_add(1))
                    .unwrap_or(1);
                format!("{order_no}_{seq:03}")
            }
        }
    }
}

// ============================================================================
// Bundle numbers
// ============================================================================

pub struct BundleNumberGenerator;

impl BundleNumberGenerator {
    /// Next bundle number.
    ///
    /// For `GlobalYear`, `previous` is the classification's most recent bundle
    /// number; for `PerOrder` it is the order's most recent one.
    pub fn next(
        scheme: NumberingScheme,
        class_code: &str,
        order_no: &str,
        previous: Option<&str>,
        now: DateTime<Utc>,
    ) -> String {
        match scheme {
            NumberingScheme::GlobalYear => {
                let yy = two_digit_year(now);
                let seq = previous
                    .and_then(|p| trailing_digits_re().captures(p))
                    .and_then(|caps| caps[1].parse::<u32>().ok())
                    .and_then(|n| n.checked_add(1))
                    .unwrap_or(1);
                format!("{yy:02}1{class_code}{seq:04}")
            }
            NumberingScheme::PerOrder => {
                let prefix = format!("{order_no}{class_code}");
                let seq = previous
                    .and_then(|p| p.strip_prefix(prefix.as_str()))
                    .and_then(|tail| tail.parse::<u32>().ok())
                    .and_then(|n| n.checked_add(1))
                    .unwrap_or(1);
                format!("{prefix}{seq:03}")
            }
        }
    }
}

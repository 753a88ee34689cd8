//! Deterministic availability generation, keyed by date. The numbers look
//! random but are a stable hash of the ISO date, so every run of the mock
//! agrees with every other run.

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use xxhash_rust::xxh3::xxh3_64;

pub const VARIANT_NAMES: [&str; 2] = ["Adult", "Child"];
pub const TIMESLOTS: [&str; 2] = ["17:30", "19:30"];
pub const TIMESLOT_LENGTH_HOURS: i64 = 1;

#[derive(Debug, Clone)]
pub struct GeneratedVariant {
    pub id: String,
    pub name: &'static str,
    pub tickets: i64,
}

#[derive(Debug, Clone)]
pub struct GeneratedDay {
    pub max_tickets: i64,
    pub variants: Vec<GeneratedVariant>,
}

/// First `digits` decimal digits of `xxh3(input) % 10^8`.
pub fn hash_number(input: &str, digits: usize) -> i64 {
    let reduced = (xxh3_64(input.as_bytes()) % 100_000_000).to_string();
    let cut = &reduced[..digits.min(reduced.len())];
    cut.parse().unwrap_or(0)
}

/// Sundays are sold out. Other days get a 1- or 2-digit ticket pool split
/// across the fixed variants, the last variant taking the remainder.
pub fn availability_for(day: NaiveDate) -> GeneratedDay {
    if day.weekday() == Weekday::Sun {
        return GeneratedDay {
            max_tickets: 0,
            variants: Vec::new(),
        };
    }
    let iso = day.format("%Y-%m-%d").to_string();
    let weekday = day.weekday().number_from_monday() as i64;
    let digits = if weekday % 3 == 0 { 1 } else { 2 };

    let max_tickets = hash_number(&iso, digits);
    let mut tickets_left = max_tickets;
    let mut variants = Vec::with_capacity(VARIANT_NAMES.len());
    for (i, name) in VARIANT_NAMES.iter().enumerate() {
        let index = (i + 1) as i64;
        let tickets = if i == VARIANT_NAMES.len() - 1 {
            tickets_left
        } else {
            let share = hash_number(&format!("{}{iso}", index * weekday), digits);
            let share = share.min(tickets_left);
            tickets_left -= share;
            share
        };
        variants.push(GeneratedVariant {
            id: index.to_string(),
            name,
            tickets,
        });
    }
    GeneratedDay {
        max_tickets,
        variants,
    }
}

pub fn timeslot_end(start: &str) -> String {
    let parsed = NaiveTime::parse_from_str(start, "%H:%M").unwrap_or_default();
    (parsed + chrono::Duration::hours(TIMESLOT_LENGTH_HOURS))
        .format("%H:%M")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 10).expect("date");
        let first = availability_for(day);
        let second = availability_for(day);
        assert_eq!(first.max_tickets, second.max_tickets);
        assert_eq!(first.variants.len(), second.variants.len());
        for (a, b) in first.variants.iter().zip(&second.variants) {
            assert_eq!(a.tickets, b.tickets);
        }
    }

    #[test]
    fn sundays_are_sold_out() {
        // 2026-08-09 is a Sunday
        let sunday = NaiveDate::from_ymd_opt(2026, 8, 9).expect("date");
        let generated = availability_for(sunday);
        assert_eq!(generated.max_tickets, 0);
        assert!(generated.variants.is_empty());
    }

    #[test]
    fn variants_sum_to_the_day_total() {
        for offset in 0..14 {
            let day = NaiveDate::from_ymd_opt(2026, 8, 10).expect("date")
                + chrono::Duration::days(offset);
            let generated = availability_for(day);
            let sum: i64 = generated.variants.iter().map(|v| v.tickets).sum();
            if day.weekday() != Weekday::Sun {
                assert_eq!(sum, generated.max_tickets, "{day}");
            }
        }
    }

    #[test]
    fn variant_ids_are_stable_across_days() {
        let monday = availability_for(NaiveDate::from_ymd_opt(2026, 8, 10).expect("date"));
        let tuesday = availability_for(NaiveDate::from_ymd_opt(2026, 8, 11).expect("date"));
        let monday_ids: Vec<_> = monday.variants.iter().map(|v| v.id.clone()).collect();
        let tuesday_ids: Vec<_> = tuesday.variants.iter().map(|v| v.id.clone()).collect();
        assert_eq!(monday_ids, tuesday_ids);
    }

    #[test]
    fn timeslot_end_is_one_hour_later() {
        assert_eq!(timeslot_end("17:30"), "18:30");
        assert_eq!(timeslot_end("19:30"), "20:30");
    }
}

// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! ISO-8601 text in the shape Python's `datetime.isoformat()` writes.
//!
//! Output is `YYYY-MM-DDTHH:MM:SS[.ffffff]±HH:MM[:SS]`, with the fraction
//! present only for non-zero microseconds. Input additionally accepts a
//! space or lowercase `t` separator, `Z` for UTC, 1-9 fraction digits
//! (truncated to microseconds), offsets without colons and date-only
//! strings. Text without an offset parses as a naive datetime.

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::error::{CodecError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed {
    Aware(OffsetDateTime),
    Naive(PrimitiveDateTime),
}

fn write_datetime(out: &mut String, dt: &PrimitiveDateTime, sep: char) {
    out.push_str(&format!(
        "{:04}-{:02}-{:02}{sep}{:02}:{:02}:{:02}",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    ));
    if dt.microsecond() != 0 {
        out.push_str(&format!(".{:06}", dt.microsecond()));
    }
}

pub fn format_naive(dt: &PrimitiveDateTime, sep: char) -> String {
    let mut out = String::with_capacity(26);
    write_datetime(&mut out, dt, sep);
    out
}

pub fn format_offset(dt: &OffsetDateTime) -> String {
    let mut out = String::with_capacity(32);
    write_datetime(&mut out, &PrimitiveDateTime::new(dt.date(), dt.time()), 'T');
    let total = dt.offset().whole_seconds();
    let sign = if total < 0 { '-' } else { '+' };
    let total = total.unsigned_abs();
    out.push_str(&format!("{sign}{:02}:{:02}", total / 3600, total % 3600 / 60));
    if total % 60 != 0 {
        out.push_str(&format!(":{:02}", total % 60));
    }
    out
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, expected: &[u8]) -> bool {
        match self.peek() {
            Some(c) if expected.contains(&c) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn number(&mut self, width: usize) -> Option<u32> {
        let digits = self.bytes.get(self.pos..self.pos + width)?;
        if !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        self.pos += width;
        Some(digits.iter().fold(0, |acc, d| acc * 10 + u32::from(d - b'0')))
    }

    /// Fraction digits scaled to microseconds.
    fn fraction(&mut self) -> Option<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits = &self.bytes[start..self.pos];
        if digits.is_empty() || digits.len() > 9 {
            return None;
        }
        let mut micros = 0;
        for i in 0..6 {
            let digit = digits.get(i).map_or(0, |d| u32::from(d - b'0'));
            micros = micros * 10 + digit;
        }
        Some(micros)
    }

    fn at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

fn parse_parts(input: &str) -> Option<(PrimitiveDateTime, Option<UtcOffset>)> {
    let mut cursor = Cursor {
        bytes: input.as_bytes(),
        pos: 0,
    };
    let year = cursor.number(4)?;
    cursor.eat(b"-").then_some(())?;
    let month = cursor.number(2)?;
    cursor.eat(b"-").then_some(())?;
    let day = cursor.number(2)?;
    let date = Date::from_calendar_date(
        i32::try_from(year).ok()?,
        Month::try_from(u8::try_from(month).ok()?).ok()?,
        u8::try_from(day).ok()?,
    )
    .ok()?;
    if cursor.at_end() {
        return Some((PrimitiveDateTime::new(date, Time::MIDNIGHT), None));
    }

    cursor.eat(b"Tt ").then_some(())?;
    let hour = cursor.number(2)?;
    cursor.eat(b":").then_some(())?;
    let minute = cursor.number(2)?;
    let (mut second, mut micros) = (0, 0);
    if cursor.eat(b":") {
        second = cursor.number(2)?;
        if cursor.eat(b".,") {
            micros = cursor.fraction()?;
        }
    }
    let time = Time::from_hms_micro(
        u8::try_from(hour).ok()?,
        u8::try_from(minute).ok()?,
        u8::try_from(second).ok()?,
        micros,
    )
    .ok()?;
    let datetime = PrimitiveDateTime::new(date, time);

    let offset = match cursor.peek() {
        None => None,
        Some(b'Z' | b'z') => {
            cursor.pos += 1;
            Some(UtcOffset::UTC)
        }
        Some(sign @ (b'+' | b'-')) => {
            cursor.pos += 1;
            let hours = cursor.number(2)?;
            let colon = cursor.eat(b":");
            let minutes = if cursor.at_end() { 0 } else { cursor.number(2)? };
            let seconds = if (colon && cursor.eat(b":")) || (!colon && !cursor.at_end()) {
                cursor.number(2)?
            } else {
                0
            };
            let signed = |v: u32| -> Option<i8> {
                let v = i8::try_from(v).ok()?;
                Some(if sign == b'-' { -v } else { v })
            };
            Some(UtcOffset::from_hms(signed(hours)?, signed(minutes)?, signed(seconds)?).ok()?)
        }
        Some(_) => return None,
    };
    cursor.at_end().then_some((datetime, offset))
}

pub fn parse(input: &str) -> Result<Parsed> {
    match parse_parts(input) {
        Some((datetime, Some(offset))) => Ok(Parsed::Aware(datetime.assume_offset(offset))),
        Some((datetime, None)) => Ok(Parsed::Naive(datetime)),
        None => Err(CodecError::InvalidDateTime(input.to_owned())),
    }
}

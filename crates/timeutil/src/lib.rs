//! # Wall-clock time and rational-duration helpers
//!
//! `IchTime` is a normalised `(seconds, nanoseconds)` pair; `IchFrac` is a
//! rational duration (e.g. `samples/sample_rate`) that gets added onto it
//! without ever going through a float, so that `#EXT-X-PROGRAM-DATE-TIME`
//! stays exact across an arbitrarily long playlist (§8 P7/P8). `IchTm` is
//! the broken-down Gregorian calendar form used to render that tag.
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

use std::time::{SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: i64 = 1_000_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const SEC_PER_MIN: i64 = 60;
const MIN_PER_HOUR: i64 = 60;
const HOUR_PER_DAY: i64 = 24;
const SEC_PER_HOUR: i64 = SEC_PER_MIN * MIN_PER_HOUR;
const SEC_PER_DAY: i64 = SEC_PER_HOUR * HOUR_PER_DAY;

const YEAR_DAYS: [i64; 2] = [365, 366];
const MONTH_DAYS: [[i64; 12]; 2] =
    [[31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31], [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]];

fn is_leap_year(y: i64) -> bool {
    y % 4 == 0 && (y % 100 != 0 || y % 400 == 0)
}

/// A rational duration, e.g. `samples / sample_rate` seconds. `den` is
/// always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IchFrac {
    pub num: i64,
    pub den: i64,
}

impl IchFrac {
    pub fn new(num: i64, den: i64) -> Self {
        debug_assert!(den > 0);
        Self { num, den }
    }
}

/// Normalised wall-clock instant: always `0 <= nanoseconds < 1_000_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IchTime {
    pub seconds: i64,
    pub nanoseconds: i64,
}

impl IchTime {
    pub fn new(seconds: i64, nanoseconds: i64) -> Self {
        let mut t = Self { seconds, nanoseconds };
        t.normalize();
        t
    }

    fn normalize(&mut self) {
        while self.nanoseconds >= NANOS_PER_SEC {
            self.seconds += 1;
            self.nanoseconds -= NANOS_PER_SEC;
        }
        while self.nanoseconds < 0 {
            self.seconds -= 1;
            self.nanoseconds += NANOS_PER_SEC;
        }
    }

    /// Current system time, assuming the clock is at or after the Unix epoch.
    pub fn now() -> Self {
        let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self { seconds: d.as_secs() as i64, nanoseconds: d.subsec_nanos() as i64 }
    }

    /// Add another (assumed non-negative) duration in place.
    pub fn add(&mut self, other: &IchTime) {
        self.nanoseconds += other.nanoseconds;
        self.seconds += other.seconds;
        self.normalize();
    }

    /// Advance by `f.num/f.den` seconds exactly: whole seconds add directly,
    /// the remainder is rescaled into nanoseconds before carrying (§8 P8:
    /// `addFrac` is associative under decomposition of the numerator).
    pub fn add_frac(&mut self, f: &IchFrac) {
        self.seconds += f.num / f.den;
        self.nanoseconds += (f.num % f.den) * NANOS_PER_SEC / f.den;
        self.normalize();
    }

    /// Subtract `f.num/f.den` seconds exactly.
    pub fn sub_frac(&mut self, f: &IchFrac) {
        self.seconds -= f.num / f.den;
        self.nanoseconds -= (f.num % f.den) * NANOS_PER_SEC / f.den;
        self.normalize();
    }

    /// `a - b`.
    pub fn sub(a: &IchTime, b: &IchTime) -> IchTime {
        IchTime::new(a.seconds - b.seconds, a.nanoseconds - b.nanoseconds)
    }

    /// Broken-down Gregorian calendar time (UTC), day arithmetic starting at
    /// the 1970-01-01 epoch.
    pub fn to_tm(&self) -> IchTm {
        let mut days = self.seconds.div_euclid(SEC_PER_DAY);
        let rem = self.seconds.rem_euclid(SEC_PER_DAY);

        let hour = rem / SEC_PER_HOUR;
        let rem = rem % SEC_PER_HOUR;
        let min = rem / SEC_PER_MIN;
        let sec = rem % SEC_PER_MIN;

        let mut year: i64 = 1970;
        let mut leap = is_leap_year(year);
        while days > YEAR_DAYS[leap as usize] {
            days -= YEAR_DAYS[leap as usize];
            year += 1;
            leap = is_leap_year(year);
        }

        let mut month: usize = 0;
        while days >= MONTH_DAYS[leap as usize][month] {
            days -= MONTH_DAYS[leap as usize][month];
            month += 1;
        }

        IchTm {
            year: year as u32,
            month: (month + 1) as u8,
            day: (days + 1) as u8,
            hour: hour as u8,
            min: min as u8,
            sec: sec as u8,
            mill: (self.nanoseconds / NANOS_PER_MILLI) as u16,
        }
    }
}

/// Broken-down calendar time: `month` is 1-based (1 = January).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IchTm {
    pub year: u32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    pub mill: u16,
}

impl IchTm {
    /// `YYYY-MM-DDTHH:MM:SS.mmmZ`, matching the `#EXT-X-PROGRAM-DATE-TIME`
    /// wire format (§6).
    pub fn to_iso8601_millis(&self) -> String {
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
            self.year, self.month, self.day, self.hour, self.min, self.sec, self.mill
        )
    }
}

impl std::fmt::Display for IchTm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_is_1970_01_01() {
        let t = IchTime::new(0, 0);
        let tm = t.to_tm();
        assert_eq!((tm.year, tm.month, tm.day, tm.hour, tm.min, tm.sec), (1970, 1, 1, 0, 0, 0));
    }

    #[test]
    fn known_instant_decodes() {
        // 2021-01-02T03:04:05Z
        let t = IchTime::new(1609556645, 250_000_000);
        let tm = t.to_tm();
        assert_eq!(tm.year, 2021);
        assert_eq!(tm.month, 1);
        assert_eq!(tm.day, 2);
        assert_eq!(tm.hour, 3);
        assert_eq!(tm.min, 4);
        assert_eq!(tm.sec, 5);
        assert_eq!(tm.mill, 250);
    }

    #[test]
    fn leap_day_is_respected() {
        // 2020-02-29T00:00:00Z
        let t = IchTime::new(1582934400, 0);
        let tm = t.to_tm();
        assert_eq!((tm.year, tm.month, tm.day), (2020, 2, 29));
    }

    #[test]
    fn add_frac_carries_into_seconds() {
        let mut t = IchTime::new(0, 900_000_000);
        t.add_frac(&IchFrac::new(1, 5)); // +0.2s
        assert_eq!(t, IchTime::new(1, 100_000_000));
    }

    #[test]
    fn add_frac_associative_under_decomposition() {
        // P8: addFrac(t, (n+m)/d) == addFrac(addFrac(t, n/d), m/d), up to the
        // single-nanosecond truncation error that `add_frac`'s per-hop
        // `(num % den) * 1e9 / den` rounding can introduce between the
        // one-shot and stepwise paths (the original `ich_time_add_frac`
        // truncates the same way; this is not a bug to fix, see §9/§10).
        let base = IchTime::new(10, 123_456_789);
        let d = 48000;
        let n = 17000i64;
        let m = 31000i64;

        let mut combined = base;
        combined.add_frac(&IchFrac::new(n + m, d));

        let mut stepwise = base;
        stepwise.add_frac(&IchFrac::new(n, d));
        stepwise.add_frac(&IchFrac::new(m, d));

        let combined_ns = combined.seconds as i128 * 1_000_000_000 + combined.nanoseconds as i128;
        let stepwise_ns = stepwise.seconds as i128 * 1_000_000_000 + stepwise.nanoseconds as i128;
        assert!(
            (combined_ns - stepwise_ns).abs() <= 1,
            "combined={combined:?} stepwise={stepwise:?} differ by more than 1ns"
        );
    }

    #[test]
    fn sample_rate_frac_matches_program_date_time_step() {
        // 1024 samples at 48kHz is not a whole number of seconds; confirm
        // the nanosecond remainder is computed, not dropped.
        let mut t = IchTime::new(100, 0);
        t.add_frac(&IchFrac::new(1024, 48000));
        assert_eq!(t.seconds, 100);
        assert_eq!(t.nanoseconds, 1024 * 1_000_000_000 / 48000);
    }
}

/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

//! Calendar arithmetic and duration-type adjustment.
//!
//! Scheduled events arrive as a `(start-time, duration, duration-type)`
//! triple, where the duration type packs a timebase (minutes, days, weeks or
//! months) and a start/end-of-timebase control nibble. [`adjusted_start_time`]
//! snaps the raw start time to the corresponding calendar boundary and
//! [`duration_to_seconds`] converts the raw duration into UTC seconds,
//! accounting for variable month lengths and leap years.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

pub const SECONDS_PER_MINUTE: u32 = 60;
pub const SECONDS_PER_HOUR: u32 = 60 * SECONDS_PER_MINUTE;
pub const SECONDS_PER_DAY: u32 = 24 * SECONDS_PER_HOUR;
pub const SECONDS_PER_WEEK: u32 = 7 * SECONDS_PER_DAY;

/// Canonical "runs until changed" duration.
///
/// This is the only value treated as infinite; the month-arithmetic path in
/// [`duration_to_seconds`] converts to it at the boundary as well.
pub const DURATION_FOREVER: u32 = u32::MAX;

/// All UTC values in this crate count seconds since Jan 1 2000 00:00:00 UTC.
pub const EPOCH_YEAR: u16 = 2000;

// Jan 1 2000 was a Saturday; weekday numbering below is Monday = 0.
const EPOCH_WEEKDAY: u32 = 5;

pub fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Weekday of the given UTC time, Monday = 0 .. Sunday = 6.
pub fn weekday(utc: u32) -> u8 {
    ((utc / SECONDS_PER_DAY + EPOCH_WEEKDAY) % 7) as u8
}

/// A broken-down UTC time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalendarTime {
    pub year: u16,
    /// 1-based
    pub month: u8,
    /// 1-based
    pub day: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl CalendarTime {
    pub fn from_utc(utc: u32) -> Self {
        let mut days = utc / SECONDS_PER_DAY;
        let rem = utc % SECONDS_PER_DAY;

        let mut year = EPOCH_YEAR;
        loop {
            let year_days = if is_leap_year(year) { 366 } else { 365 };
            if days < year_days {
                break;
            }

            days -= year_days;
            year += 1;
        }

        let mut month = 1;
        loop {
            let month_days = days_in_month(year, month) as u32;
            if days < month_days {
                break;
            }

            days -= month_days;
            month += 1;
        }

        Self {
            year,
            month,
            day: days as u8 + 1,
            hours: (rem / SECONDS_PER_HOUR) as u8,
            minutes: (rem % SECONDS_PER_HOUR / SECONDS_PER_MINUTE) as u8,
            seconds: (rem % SECONDS_PER_MINUTE) as u8,
        }
    }

    /// Converts back to UTC seconds, saturating at `u32::MAX` (which falls in
    /// February 2136).
    pub fn to_utc(&self) -> u32 {
        let mut days = 0u64;

        for year in EPOCH_YEAR..self.year {
            days += if is_leap_year(year) { 366 } else { 365 };
        }

        for month in 1..self.month {
            days += days_in_month(self.year, month) as u64;
        }

        days += self.day.saturating_sub(1) as u64;

        let secs = days * SECONDS_PER_DAY as u64
            + self.hours as u64 * SECONDS_PER_HOUR as u64
            + self.minutes as u64 * SECONDS_PER_MINUTE as u64
            + self.seconds as u64;

        secs.min(u32::MAX as u64) as u32
    }
}

/// The timebase nibble of a [`DurationType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DurationTimebase {
    Minutes = 0x00,
    Days = 0x01,
    Weeks = 0x02,
    Months = 0x03,
}

/// The packed duration-type byte: bits 0..3 carry the timebase, bits 4..7 the
/// duration control (0 = start of timebase, 1 = end of timebase).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DurationType(pub u8);

impl DurationType {
    pub const MINUTES: Self = Self(0x00);
    pub const DAYS_START_OF_TIMEBASE: Self = Self(0x01);
    pub const WEEKS_START_OF_TIMEBASE: Self = Self(0x02);
    pub const MONTHS_START_OF_TIMEBASE: Self = Self(0x03);
    pub const DAYS_END_OF_TIMEBASE: Self = Self(0x11);
    pub const WEEKS_END_OF_TIMEBASE: Self = Self(0x12);
    pub const MONTHS_END_OF_TIMEBASE: Self = Self(0x13);

    pub fn timebase(&self) -> Option<DurationTimebase> {
        DurationTimebase::from_u8(self.0 & 0x0F)
    }

    pub const fn end_of_timebase(&self) -> bool {
        (self.0 >> 4) & 0x0F == 0x01
    }
}

/// Snaps a raw event start time to the calendar boundary selected by its
/// duration type.
///
/// A zero start time means "now" and is returned as the current time verbatim,
/// with no boundary adjustment. Minute-based events are not adjusted either.
/// Day/week/month timebases snap to 00:00:00 of the containing day, Monday of
/// the containing week, or the first of the containing month respectively;
/// with the end-of-timebase control bit set, to the last second of that period
/// instead.
pub fn adjusted_start_time(start_time: u32, duration_type: DurationType, now: u32) -> u32 {
    if start_time == 0 {
        return now;
    }

    let day_start = start_time - start_time % SECONDS_PER_DAY;

    match duration_type.timebase() {
        Some(DurationTimebase::Minutes) => start_time,
        Some(DurationTimebase::Days) => {
            if duration_type.end_of_timebase() {
                day_start + SECONDS_PER_DAY - 1
            } else {
                day_start
            }
        }
        Some(DurationTimebase::Weeks) => {
            let week_start = day_start - weekday(start_time) as u32 * SECONDS_PER_DAY;
            if duration_type.end_of_timebase() {
                week_start + SECONDS_PER_WEEK - 1
            } else {
                week_start
            }
        }
        Some(DurationTimebase::Months) => {
            let mut ct = CalendarTime::from_utc(start_time);
            if duration_type.end_of_timebase() {
                ct.day = days_in_month(ct.year, ct.month);
                ct.hours = 23;
                ct.minutes = 59;
                ct.seconds = 59;
            } else {
                ct.day = 1;
                ct.hours = 0;
                ct.minutes = 0;
                ct.seconds = 0;
            }
            ct.to_utc()
        }
        None => {
            warn!(
                "Unknown duration timebase 0x{:02x}, start time not adjusted",
                duration_type.0
            );
            start_time
        }
    }
}

/// Converts a raw `(duration, duration-type)` pair into seconds elapsed from
/// the (already adjusted) start time.
///
/// A `0xFFFFFFFF` duration means "until changed" and maps to
/// [`DURATION_FOREVER`]. Month durations do calendar arithmetic: the month
/// count is added with year carry, the day-of-month is clamped to the target
/// month's length (or snapped to it, for end-of-timebase), and the resulting
/// date is converted back to UTC. A result that would overflow the UTC range
/// is reported as [`DURATION_FOREVER`] as well.
pub fn duration_to_seconds(start_time: u32, duration: u32, duration_type: DurationType) -> u32 {
    if duration == DURATION_FOREVER {
        return DURATION_FOREVER;
    }

    match duration_type.timebase() {
        Some(DurationTimebase::Minutes) | None => duration.saturating_mul(SECONDS_PER_MINUTE),
        Some(DurationTimebase::Days) => duration.saturating_mul(SECONDS_PER_DAY),
        Some(DurationTimebase::Weeks) => duration.saturating_mul(SECONDS_PER_WEEK),
        Some(DurationTimebase::Months) => {
            let start = CalendarTime::from_utc(start_time);

            let months = (start.month - 1) as u64 + duration as u64;
            let year = start.year as u64 + months / 12;
            if year > u16::MAX as u64 {
                return DURATION_FOREVER;
            }

            let mut end = start;
            end.year = year as u16;
            end.month = (months % 12) as u8 + 1;

            let month_days = days_in_month(end.year, end.month);
            if duration_type.end_of_timebase() {
                end.day = month_days;
            } else {
                end.day = end.day.min(month_days);
            }

            let end_utc = end.to_utc();
            if end_utc == u32::MAX {
                // Saturated; the event effectively runs out past the epoch range.
                return DURATION_FOREVER;
            }

            end_utc.saturating_sub(start_time)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leap_years() {
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(2100));
        assert!(is_leap_year(2400));
        assert_eq!(days_in_month(2000, 2), 29);
        assert_eq!(days_in_month(2100, 2), 28);
        assert_eq!(days_in_month(2400, 2), 29);
        assert_eq!(days_in_month(2001, 2), 28);
        assert_eq!(days_in_month(2004, 2), 29);
    }

    #[test]
    fn weekday_of_epoch() {
        // Jan 1 2000 was a Saturday
        assert_eq!(weekday(0), 5);
        // Jan 3 2000 was a Monday
        assert_eq!(weekday(2 * SECONDS_PER_DAY), 0);
        assert_eq!(weekday(2 * SECONDS_PER_DAY + SECONDS_PER_DAY - 1), 0);
    }

    #[test]
    fn calendar_round_trip() {
        for utc in [
            0,
            SECONDS_PER_DAY - 1,
            59 * SECONDS_PER_DAY,          // Feb 29 2000
            12345678,
            1000000000,
            u32::MAX - 1,
        ] {
            assert_eq!(CalendarTime::from_utc(utc).to_utc(), utc);
        }

        let feb29 = CalendarTime::from_utc(59 * SECONDS_PER_DAY);
        assert_eq!((feb29.year, feb29.month, feb29.day), (2000, 2, 29));
    }

    #[test]
    fn start_time_adjustment() {
        // 12:00:00 on Wednesday Jan 5 2000
        let start = 4 * SECONDS_PER_DAY + 12 * SECONDS_PER_HOUR;

        assert_eq!(adjusted_start_time(start, DurationType::MINUTES, 7), start);
        assert_eq!(adjusted_start_time(0, DurationType::MINUTES, 7), 7);
        assert_eq!(
            adjusted_start_time(start, DurationType::DAYS_START_OF_TIMEBASE, 0),
            4 * SECONDS_PER_DAY
        );
        assert_eq!(
            adjusted_start_time(start, DurationType::DAYS_END_OF_TIMEBASE, 0),
            5 * SECONDS_PER_DAY - 1
        );
        // The containing week starts on Monday Jan 3
        assert_eq!(
            adjusted_start_time(start, DurationType::WEEKS_START_OF_TIMEBASE, 0),
            2 * SECONDS_PER_DAY
        );
        assert_eq!(
            adjusted_start_time(start, DurationType::MONTHS_START_OF_TIMEBASE, 0),
            0
        );
        assert_eq!(
            adjusted_start_time(start, DurationType::MONTHS_END_OF_TIMEBASE, 0),
            31 * SECONDS_PER_DAY - 1
        );
    }

    #[test]
    fn month_durations() {
        // Jan 1 2000 + 1 month = Feb 1 2000
        assert_eq!(
            duration_to_seconds(0, 1, DurationType::MONTHS_START_OF_TIMEBASE),
            31 * SECONDS_PER_DAY
        );
        // Jan 31 2000 + 1 month clamps to Feb 29 2000 (leap year)
        let jan31 = 30 * SECONDS_PER_DAY;
        assert_eq!(
            duration_to_seconds(jan31, 1, DurationType::MONTHS_START_OF_TIMEBASE),
            29 * SECONDS_PER_DAY
        );
        // Jan 31 2001 + 1 month clamps to Feb 28 2001
        let jan31_2001 = CalendarTime {
            year: 2001,
            month: 1,
            day: 31,
            ..Default::default()
        }
        .to_utc();
        let feb28_2001 = CalendarTime {
            year: 2001,
            month: 2,
            day: 28,
            ..Default::default()
        }
        .to_utc();
        assert_eq!(
            duration_to_seconds(jan31_2001, 1, DurationType::MONTHS_START_OF_TIMEBASE),
            feb28_2001 - jan31_2001
        );
        // Year carry: Nov 15 2000 + 14 months = Jan 15 2002
        let nov15 = CalendarTime {
            year: 2000,
            month: 11,
            day: 15,
            ..Default::default()
        }
        .to_utc();
        let jan15_2002 = CalendarTime {
            year: 2002,
            month: 1,
            day: 15,
            ..Default::default()
        }
        .to_utc();
        assert_eq!(
            duration_to_seconds(nov15, 14, DurationType::MONTHS_START_OF_TIMEBASE),
            jan15_2002 - nov15
        );
    }

    #[test]
    fn forever_is_canonical() {
        assert_eq!(
            duration_to_seconds(12345, DURATION_FOREVER, DurationType::MINUTES),
            DURATION_FOREVER
        );
        assert_eq!(
            duration_to_seconds(12345, DURATION_FOREVER, DurationType::MONTHS_START_OF_TIMEBASE),
            DURATION_FOREVER
        );
        // A month duration running past the UTC range is reported as forever too
        assert_eq!(
            duration_to_seconds(0, 12 * 200, DurationType::MONTHS_START_OF_TIMEBASE),
            DURATION_FOREVER
        );
    }

    #[test]
    fn fixed_timebases() {
        assert_eq!(duration_to_seconds(0, 90, DurationType::MINUTES), 5400);
        assert_eq!(
            duration_to_seconds(0, 2, DurationType::DAYS_START_OF_TIMEBASE),
            2 * SECONDS_PER_DAY
        );
        assert_eq!(
            duration_to_seconds(0, 3, DurationType::WEEKS_START_OF_TIMEBASE),
            3 * SECONDS_PER_WEEK
        );
    }
}

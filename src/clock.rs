//! Software twelve-hour clock, re-synchronized from the service every hour

use core::fmt::{self, Write};

use heapless::String;

/// Broken-down wall-clock time as served by the time endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeStruct {
    pub year: u16,
    pub mon: u8,
    pub mday: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    pub wday: u8,
    pub yday: u16,
    pub isdst: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meridiem {
    Am,
    Pm,
}

impl Meridiem {
    pub fn as_str(self) -> &'static str {
        match self {
            Meridiem::Am => "AM",
            Meridiem::Pm => "PM",
        }
    }
}

impl fmt::Display for Meridiem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a 24-hour value to a 12-hour value and its meridiem.
pub fn convert_time(hour: u8) -> (u8, Meridiem) {
    let (h, meridiem) = if hour >= 12 {
        (hour - 12, Meridiem::Pm)
    } else {
        (hour, Meridiem::Am)
    };
    if h == 0 { (12, meridiem) } else { (h, meridiem) }
}

/// Open-loop clock advanced from a monotonic millisecond counter.
///
/// Hour is never advanced locally. When the minute wraps the clock asks for a
/// resync and keeps showing the stale hour until it gets one.
#[derive(Debug, Clone)]
pub struct SoftClock {
    hour: u8,
    meridiem: Meridiem,
    minute: u8,
    tick: u8,
    reference_ms: u64,
    tick_ms: u64,
    resync_due: bool,
}

impl SoftClock {
    pub fn new(time: &TimeStruct, now_ms: u64, tick_ms: u64) -> Self {
        let mut clock = Self {
            hour: 12,
            meridiem: Meridiem::Am,
            minute: 0,
            tick: 0,
            reference_ms: now_ms,
            tick_ms: tick_ms.max(1),
            resync_due: false,
        };
        clock.resync(time, now_ms);
        clock
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn meridiem(&self) -> Meridiem {
        self.meridiem
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn tick(&self) -> u8 {
        self.tick
    }

    pub fn resync_due(&self) -> bool {
        self.resync_due
    }

    /// Count every whole tick elapsed since the reference.
    ///
    /// Returns the number of ticks counted.
    pub fn advance(&mut self, now_ms: u64) -> u32 {
        let mut counted = 0;
        while now_ms.saturating_sub(self.reference_ms) >= self.tick_ms {
            self.reference_ms += self.tick_ms;
            self.step();
            counted += 1;
        }
        counted
    }

    fn step(&mut self) {
        self.tick += 1;
        if self.tick > 59 {
            self.tick = 0;
            self.minute += 1;
            if self.minute > 59 {
                self.minute = 0;
                self.resync_due = true;
            }
        }
    }

    /// Take hour, minute and tick from an authoritative time.
    pub fn resync(&mut self, time: &TimeStruct, now_ms: u64) {
        let (hour, meridiem) = convert_time(time.hour.min(23));
        self.hour = hour;
        self.meridiem = meridiem;
        self.minute = time.min.min(59);
        self.tick = time.sec.min(59);
        self.reference_ms = now_ms;
        self.resync_due = false;
    }

    /// "Last updated at 3:07 PM"
    pub fn last_updated(&self) -> String<32> {
        let mut text = String::new();
        let _ = write!(
            text,
            "Last updated at {}:{:02} {}",
            self.hour, self.minute, self.meridiem
        );
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u8, min: u8, sec: u8) -> TimeStruct {
        TimeStruct {
            year: 2024,
            mon: 5,
            mday: 1,
            hour,
            min,
            sec,
            ..TimeStruct::default()
        }
    }

    #[test]
    fn convert_time_covers_every_hour() {
        for h in 0..24u8 {
            let expected = match h {
                0 => (12, Meridiem::Am),
                1..=11 => (h, Meridiem::Am),
                12 => (12, Meridiem::Pm),
                _ => (h - 12, Meridiem::Pm),
            };
            assert_eq!(convert_time(h), expected, "hour {}", h);
        }
    }

    #[test]
    fn sixty_ticks_roll_into_a_minute() {
        for start_tick in [0u8, 1, 30, 59] {
            for start_minute in [0u8, 17, 58] {
                let mut clock = SoftClock::new(&at(9, start_minute, start_tick), 0, 1_000);
                assert_eq!(clock.advance(60_000), 60);
                assert_eq!(clock.tick(), start_tick);
                assert_eq!(clock.minute(), start_minute + 1);
                assert!(!clock.resync_due());
            }
        }
    }

    #[test]
    fn tick_wraps_to_zero() {
        let mut clock = SoftClock::new(&at(9, 10, 59), 0, 1_000);
        clock.advance(1_000);
        assert_eq!(clock.tick(), 0);
        assert_eq!(clock.minute(), 11);
    }

    #[test]
    fn partial_ticks_do_not_count() {
        let mut clock = SoftClock::new(&at(9, 10, 5), 1_000, 1_000);
        assert_eq!(clock.advance(1_999), 0);
        assert_eq!(clock.advance(2_000), 1);
        assert_eq!(clock.advance(2_500), 0);
        assert_eq!(clock.tick(), 6);
    }

    #[test]
    fn clock_catches_up_after_a_long_block() {
        let mut clock = SoftClock::new(&at(9, 10, 0), 0, 1_000);
        assert_eq!(clock.advance(3_400), 3);
        assert_eq!(clock.tick(), 3);
        assert_eq!(clock.advance(4_000), 1);
    }

    #[test]
    fn minute_overflow_requests_resync() {
        let mut clock = SoftClock::new(&at(13, 59, 59), 0, 1_000);
        clock.advance(1_000);
        assert!(clock.resync_due());
        assert_eq!(clock.minute(), 0);
        assert_eq!(clock.hour(), 1);

        clock.resync(&at(14, 0, 3), 1_200);
        assert!(!clock.resync_due());
        assert_eq!(clock.hour(), 2);
        assert_eq!(clock.meridiem(), Meridiem::Pm);
        assert_eq!(clock.minute(), 0);
        assert_eq!(clock.tick(), 3);
        assert_eq!(clock.advance(2_199), 0);
        assert_eq!(clock.advance(2_200), 1);
    }

    #[test]
    fn last_updated_pads_minutes() {
        let clock = SoftClock::new(&at(0, 7, 0), 0, 1_000);
        assert_eq!(clock.last_updated().as_str(), "Last updated at 12:07 AM");
        let clock = SoftClock::new(&at(15, 42, 0), 0, 1_000);
        assert_eq!(clock.last_updated().as_str(), "Last updated at 3:42 PM");
    }
}

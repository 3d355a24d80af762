use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Offset in seconds between the unix epoch and the ntp epoch.
const NTP_UNIX_OFFSET_SECONDS: u64 = 0x83AA7E80;

/// 64-bit NTP timestamp as carried in sender reports: seconds since
/// the NTP epoch in the high word, a binary fraction in the low one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleNtp {
    seconds: u32,
    fraction: u32,
}

impl From<u64> for SimpleNtp {
    fn from(value: u64) -> Self {
        Self {
            seconds: ((value >> 32) & 0xFFFF_FFFF) as u32,
            fraction: (value & 0xFFFF_FFFF) as u32,
        }
    }
}

impl From<SimpleNtp> for u64 {
    fn from(value: SimpleNtp) -> Self {
        ((value.seconds as u64) << 32) | (value.fraction as u64)
    }
}

impl From<SystemTime> for SimpleNtp {
    fn from(value: SystemTime) -> Self {
        let nanos = value
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0))
            .as_nanos() as u64;
        let seconds = nanos / 1_000_000_000 + NTP_UNIX_OFFSET_SECONDS;
        let fraction = ((nanos % 1_000_000_000) << 32) / 1_000_000_000;
        Self {
            seconds: seconds as u32,
            fraction: fraction as u32,
        }
    }
}

impl From<SimpleNtp> for SystemTime {
    fn from(value: SimpleNtp) -> Self {
        let seconds = (value.seconds as u64).saturating_sub(NTP_UNIX_OFFSET_SECONDS);
        let nanos = ((value.fraction as u64) * 1_000_000_000) >> 32;
        UNIX_EPOCH
            .checked_add(Duration::new(seconds, nanos as u32))
            .unwrap_or(UNIX_EPOCH)
    }
}

/// 32-bit middle slice of an NTP timestamp, used by the LSR field of
/// reception report blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimpleShortNtp {
    seconds: u16,
    fraction: u16,
}

impl From<u32> for SimpleShortNtp {
    fn from(value: u32) -> Self {
        Self {
            seconds: ((value >> 16) & 0xFFFF) as u16,
            fraction: (value & 0xFFFF) as u16,
        }
    }
}

impl From<SimpleShortNtp> for u32 {
    fn from(value: SimpleShortNtp) -> Self {
        ((value.seconds as u32) << 16) | (value.fraction as u32)
    }
}

impl From<SimpleNtp> for SimpleShortNtp {
    fn from(value: SimpleNtp) -> Self {
        Self {
            seconds: value.seconds as u16,
            fraction: (value.fraction >> 16) as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntp_u64_round_trip() {
        let ntp: SimpleNtp = 0xd01f84417f3b6459_u64.into();
        assert_eq!(u64::from(ntp), 0xd01f84417f3b6459);
    }

    #[test]
    fn short_ntp_is_middle_bits() {
        let ntp: SimpleNtp = 0xd01f84417f3b6459_u64.into();
        let short: SimpleShortNtp = ntp.into();
        assert_eq!(u32::from(short), 0x84417f3b);
    }

    #[test]
    fn system_time_round_trip_is_close() {
        let now = SystemTime::now();
        let ntp: SimpleNtp = now.into();
        let back: SystemTime = ntp.into();
        let delta = now
            .duration_since(back)
            .unwrap_or_else(|e| e.duration())
            .as_millis();
        assert!(delta < 2);
    }
}

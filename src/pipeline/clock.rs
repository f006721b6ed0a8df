//! Pacing arithmetic and wall-clock helpers

use std::time::Duration;

use super::source::SourceError;
use super::types::StreamTiming;

/// Fixed interval between Ogg pages, matching typical Opus page granularity
pub const OGG_PAGE_DURATION: Duration = Duration::from_millis(20);

/// Ogg Opus granule positions always count 48 kHz samples, whatever the input rate
pub const OPUS_GRANULE_RATE: u32 = 48_000;

/// Declared duration of every video frame, independent of the time-base
pub const FRAME_DURATION: Duration = Duration::from_secs(1);

/// Interval between two consecutive units of a stream
///
/// For a time-base this is `1000 * numerator / denominator` milliseconds, in
/// integer arithmetic. Page based streams use [`OGG_PAGE_DURATION`] whatever
/// their content.
pub fn pacing_interval(timing: StreamTiming) -> Result<Duration, SourceError> {
    match timing {
        StreamTiming::TimeBase {
            numerator,
            denominator,
        } => {
            if denominator == 0 {
                return Err(SourceError::InvalidTimeBase);
            }
            let millis = 1000 * numerator as u64 / denominator as u64;
            if millis == 0 {
                return Err(SourceError::InvalidTimeBase);
            }
            Ok(Duration::from_millis(millis))
        }
        StreamTiming::SampleRate(_) => Ok(OGG_PAGE_DURATION),
    }
}

/// Playout duration of an Ogg page from the granule delta to the previous page.
///
/// Saturates at zero when the granule goes backwards (e.g. right after a reopen).
pub fn page_duration(current_granule: u64, previous_granule: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let samples = current_granule.saturating_sub(previous_granule);
    Duration::from_millis(samples.saturating_mul(1000) / sample_rate as u64)
}

/// Current wall-clock time in Unix milliseconds
pub fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_base_interval() {
        for (num, den, expected) in [(1, 30, 33), (1, 25, 40), (1001, 30000, 33), (1, 1, 1000), (2, 1, 2000)] {
            let interval = pacing_interval(StreamTiming::TimeBase {
                numerator: num,
                denominator: den,
            })
            .unwrap();
            assert_eq!(interval, Duration::from_millis(expected), "{num}/{den}");
        }
    }

    #[test]
    fn test_zero_denominator_rejected() {
        let res = pacing_interval(StreamTiming::TimeBase {
            numerator: 1,
            denominator: 0,
        });
        assert!(matches!(res, Err(SourceError::InvalidTimeBase)));
    }

    #[test]
    fn test_sub_millisecond_time_base_rejected() {
        let res = pacing_interval(StreamTiming::TimeBase {
            numerator: 1,
            denominator: 90_000,
        });
        assert!(matches!(res, Err(SourceError::InvalidTimeBase)));
    }

    #[test]
    fn test_page_interval_ignores_sample_rate() {
        assert_eq!(pacing_interval(StreamTiming::SampleRate(48_000)).unwrap(), OGG_PAGE_DURATION);
        assert_eq!(pacing_interval(StreamTiming::SampleRate(8_000)).unwrap(), OGG_PAGE_DURATION);
    }

    #[test]
    fn test_page_duration() {
        assert_eq!(page_duration(960, 0, 48_000), Duration::from_millis(20));
        assert_eq!(page_duration(1920, 960, 48_000), Duration::from_millis(20));
        assert_eq!(page_duration(48_000, 0, 48_000), Duration::from_secs(1));
    }

    #[test]
    fn test_page_duration_never_negative() {
        // granule restarted after a reopen
        assert_eq!(page_duration(960, 480_000, 48_000), Duration::ZERO);
        assert_eq!(page_duration(10, 10, 48_000), Duration::ZERO);
        assert_eq!(page_duration(960, 0, 0), Duration::ZERO);
    }
}

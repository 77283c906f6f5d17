//! Screenshot cue scheduling.
//!
//! [`schedule`] is a pure function of the video duration and a
//! [`CuePolicy`]; it performs no I/O and never returns an instant at or past
//! the end of the video.

use serde::{Deserialize, Serialize};

/// How capture instants are chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CuePolicy {
    /// Fixed fractions of the duration, e.g. `[0.10, 0.50, 0.90]`.
    Percentage { fractions: Vec<f64> },
    /// `count` evenly spaced instants between `low` and `high` fractions.
    Count { count: usize, low: f64, high: f64 },
    /// One instant every `seconds`, starting at `seconds`.
    Interval { seconds: f64 },
}

impl Default for CuePolicy {
    fn default() -> Self {
        CuePolicy::Percentage {
            fractions: vec![0.10, 0.50, 0.90],
        }
    }
}

impl CuePolicy {
    /// `count` instants spread over 10 %–90 % of the video.
    pub fn count(count: usize) -> Self {
        CuePolicy::Count {
            count,
            low: 0.10,
            high: 0.90,
        }
    }

    pub fn interval(seconds: f64) -> Self {
        CuePolicy::Interval { seconds }
    }
}

/// Compute the ordered capture instants (seconds) for a video.
///
/// Returns an empty schedule for a zero, negative or non-finite duration.
pub fn schedule(duration: f64, policy: &CuePolicy) -> Vec<f64> {
    if !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }

    let mut instants = match policy {
        CuePolicy::Percentage { fractions } => fractions
            .iter()
            .filter(|f| (0.0..1.0).contains(*f))
            .map(|f| duration * f)
            .collect(),
        CuePolicy::Count { count, low, high } => {
            if *count <= 1 {
                vec![duration * 0.5]
            } else {
                let step = (high - low) / (*count - 1) as f64;
                (0..*count)
                    .map(|i| duration * (low + step * i as f64))
                    .collect()
            }
        }
        CuePolicy::Interval { seconds } => {
            if !(*seconds > 0.0) || duration < *seconds {
                vec![duration * 0.5]
            } else {
                let mut out = Vec::new();
                let mut k = 1u64;
                loop {
                    // Multiply rather than accumulate to avoid float drift.
                    let t = seconds * k as f64;
                    if t >= duration {
                        break;
                    }
                    out.push(t);
                    k += 1;
                }
                if out.is_empty() {
                    out.push(duration * 0.5);
                }
                out
            }
        }
    };

    instants.retain(|t| t.is_finite() && *t >= 0.0 && *t < duration);
    instants.sort_by(|a, b| a.total_cmp(b));
    instants.dedup();
    instants
}

/// Format an instant as `m:ss` for screenshot captions.
pub fn format_timestamp(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_duration_is_empty() {
        for d in [0.0, -1.0, -0.001, f64::NAN, f64::INFINITY] {
            assert!(schedule(d, &CuePolicy::default()).is_empty(), "d={d}");
            assert!(schedule(d, &CuePolicy::count(4)).is_empty(), "d={d}");
            assert!(schedule(d, &CuePolicy::interval(2.0)).is_empty(), "d={d}");
        }
    }

    #[test]
    fn default_percentages() {
        assert_eq!(schedule(100.0, &CuePolicy::default()), vec![10.0, 50.0, 90.0]);
    }

    #[test]
    fn percentages_are_sorted_and_bounded() {
        let policy = CuePolicy::Percentage {
            fractions: vec![0.9, 0.1, 1.0, 1.5, -0.2, 0.1],
        };
        assert_eq!(schedule(10.0, &policy), vec![1.0, 9.0]);
    }

    #[test]
    fn count_one_is_midpoint() {
        assert_eq!(schedule(7.0, &CuePolicy::count(1)), vec![3.5]);
        assert_eq!(schedule(7.0, &CuePolicy::count(0)), vec![3.5]);
    }

    #[test]
    fn count_is_evenly_spaced() {
        let s = schedule(100.0, &CuePolicy::count(5));
        let expected = [10.0, 30.0, 50.0, 70.0, 90.0];
        assert_eq!(s.len(), expected.len());
        for (got, want) in s.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
    }

    #[test]
    fn interval_shorter_video_is_midpoint() {
        assert_eq!(schedule(5.0, &CuePolicy::interval(30.0)), vec![2.5]);
    }

    #[test]
    fn interval_never_reaches_duration() {
        assert_eq!(schedule(30.0, &CuePolicy::interval(10.0)), vec![10.0, 20.0]);
        assert_eq!(
            schedule(31.0, &CuePolicy::interval(10.0)),
            vec![10.0, 20.0, 30.0]
        );
    }

    #[test]
    fn interval_equal_to_duration_falls_back_to_midpoint() {
        // The only candidate would be the end of the video itself.
        assert_eq!(schedule(10.0, &CuePolicy::interval(10.0)), vec![5.0]);
    }

    #[test]
    fn non_positive_interval_falls_back_to_midpoint() {
        assert_eq!(schedule(8.0, &CuePolicy::interval(0.0)), vec![4.0]);
    }

    #[test]
    fn timestamp_caption_format() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(65.9), "1:05");
        assert_eq!(format_timestamp(600.0), "10:00");
    }

    #[test]
    fn policy_deserialises_from_tagged_json() {
        let p: CuePolicy = serde_json::from_str(r#"{"policy":"interval","seconds":15}"#).unwrap();
        assert_eq!(p, CuePolicy::interval(15.0));
    }
}

//! Response-time trend analysis
//!
//! Splits a component's history into thirds and compares the mean of the
//! oldest third with the mean of the newest. A change beyond ±10% is a trend.
//! When degrading, the slope between the two thirds is extrapolated to
//! estimate when the critical threshold will be crossed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

const TREND_BAND: f64 = 0.10;
const MIN_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    pub older_mean_ms: f64,
    pub recent_mean_ms: f64,
    /// Relative change of the recent mean against the older mean
    pub change_pct: f64,
    /// Estimated time until the threshold is reached, when degrading
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_threshold: Option<Duration>,
}

fn mean_point(samples: &[(DateTime<Utc>, f64)]) -> (f64, f64) {
    let n = samples.len() as f64;
    let t = samples.iter().map(|(at, _)| at.timestamp_millis() as f64).sum::<f64>() / n;
    let v = samples.iter().map(|(_, value)| *value).sum::<f64>() / n;
    (t, v)
}

/// Analyze `(timestamp, response_ms)` samples, oldest first.
/// Without a threshold a degrading trend carries no time estimate.
pub fn analyze(samples: &[(DateTime<Utc>, f64)], threshold_ms: Option<f64>) -> Option<TrendAnalysis> {
    if samples.len() < MIN_SAMPLES {
        return None;
    }

    let third = samples.len() / 3;
    let (older_t, older_mean) = mean_point(&samples[..third]);
    let (recent_t, recent_mean) = mean_point(&samples[samples.len() - third..]);

    let change_pct = if older_mean > 0.0 {
        (recent_mean - older_mean) / older_mean
    } else if recent_mean > 0.0 {
        1.0
    } else {
        0.0
    };

    let direction = if change_pct > TREND_BAND {
        TrendDirection::Degrading
    } else if change_pct < -TREND_BAND {
        TrendDirection::Improving
    } else {
        TrendDirection::Stable
    };

    let time_to_threshold = match (direction, threshold_ms) {
        (TrendDirection::Degrading, Some(threshold_ms)) => {
            let latest = samples.last().map(|(_, value)| *value).unwrap_or(recent_mean);
            if latest >= threshold_ms {
                Some(Duration::ZERO)
            } else {
                let elapsed_ms = recent_t - older_t;
                let slope = if elapsed_ms > 0.0 {
                    (recent_mean - older_mean) / elapsed_ms
                } else {
                    0.0
                };
                (slope > 0.0).then(|| Duration::from_millis(((threshold_ms - latest) / slope) as u64))
            }
        }
        _ => None,
    };

    Some(TrendAnalysis {
        direction,
        older_mean_ms: older_mean,
        recent_mean_ms: recent_mean,
        change_pct,
        time_to_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn series(values: &[f64]) -> Vec<(DateTime<Utc>, f64)> {
        let start = Utc::now() - ChronoDuration::seconds(values.len() as i64 * 30);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (start + ChronoDuration::seconds(i as i64 * 30), *v))
            .collect()
    }

    #[test]
    fn test_too_few_samples() {
        assert!(analyze(&series(&[10.0, 20.0]), Some(100.0)).is_none());
    }

    #[test]
    fn test_stable_within_band() {
        let analysis = analyze(&series(&[100.0, 100.0, 105.0, 104.0, 95.0, 108.0]), Some(1000.0)).unwrap();
        assert_eq!(analysis.direction, TrendDirection::Stable);
        assert!(analysis.time_to_threshold.is_none());
    }

    #[test]
    fn test_improving() {
        let analysis = analyze(&series(&[200.0, 200.0, 150.0, 150.0, 100.0, 100.0]), Some(1000.0)).unwrap();
        assert_eq!(analysis.direction, TrendDirection::Improving);
    }

    #[test]
    fn test_degrading_extrapolates() {
        // older third mean 100, newer third mean 300, 120s apart -> 100ms per minute
        let analysis = analyze(&series(&[100.0, 100.0, 200.0, 200.0, 300.0, 300.0]), Some(500.0)).unwrap();
        assert_eq!(analysis.direction, TrendDirection::Degrading);
        let eta = analysis.time_to_threshold.unwrap();
        assert!(eta >= Duration::from_secs(110) && eta <= Duration::from_secs(130), "{:?}", eta);
    }

    #[test]
    fn test_already_past_threshold() {
        let analysis = analyze(&series(&[100.0, 100.0, 200.0, 200.0, 600.0, 600.0]), Some(500.0)).unwrap();
        assert_eq!(analysis.time_to_threshold, Some(Duration::ZERO));
    }

    #[test]
    fn test_degrading_without_threshold_has_no_estimate() {
        let analysis = analyze(&series(&[1.0, 1.0, 2.0, 2.0, 3.0, 3.0]), None).unwrap();
        assert_eq!(analysis.direction, TrendDirection::Degrading);
        assert!(analysis.time_to_threshold.is_none());
    }
}

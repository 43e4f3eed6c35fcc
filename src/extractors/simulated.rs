use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

use super::{ExtractionOutcome, TranscriptExtractor, EXTRACTION_FAILED_MESSAGE};
use crate::config::SimulationConfig;

/// Extractor that stands in for a real extraction backend.
///
/// Each call waits a uniformly random delay, then succeeds with a fixed
/// probability independent of every other call.
pub struct SimulatedExtractor {
    min_delay: Duration,
    max_delay: Duration,
    success_rate: f64,
}

impl SimulatedExtractor {
    pub fn new(min_delay: Duration, max_delay: Duration, success_rate: f64) -> Self {
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };

        Self {
            min_delay,
            max_delay,
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.success_rate,
        )
    }

    /// Pick the delay and the outcome for one call
    fn roll(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        let delay = Duration::from_millis(rng.gen_range(min..=max));
        (delay, rng.gen_bool(self.success_rate))
    }
}

impl Default for SimulatedExtractor {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}

/// Title generated for the `index`-th link of a batch
pub fn simulated_title(index: usize) -> String {
    format!("Video title {}", index + 1)
}

/// Result identifier from the current time and the batch index.
/// Unique per call in practice, not guaranteed.
pub fn simulated_result_id(index: usize) -> String {
    format!("batch_result_{}_{}", chrono::Utc::now().timestamp_millis(), index)
}

#[async_trait]
impl TranscriptExtractor for SimulatedExtractor {
    async fn extract(&self, url: &str, index: usize) -> ExtractionOutcome {
        let (delay, success) = self.roll();
        tracing::debug!("Simulating extraction of {} for {:?}", url, delay);

        tokio::time::sleep(delay).await;

        if success {
            ExtractionOutcome::success(simulated_title(index), simulated_result_id(index))
        } else {
            ExtractionOutcome::failure(EXTRACTION_FAILED_MESSAGE)
        }
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_always_succeeds_at_full_rate() {
        let extractor = SimulatedExtractor::new(Duration::ZERO, Duration::ZERO, 1.0);
        for index in 0..5 {
            match extractor.extract("https://www.bilibili.com/video/BV1", index).await {
                ExtractionOutcome::Success { title, result_id } => {
                    assert_eq!(title, format!("Video title {}", index + 1));
                    assert!(result_id.starts_with("batch_result_"));
                    assert!(result_id.ends_with(&format!("_{index}")));
                }
                other => panic!("expected success, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_always_fails_at_zero_rate() {
        let extractor = SimulatedExtractor::new(Duration::ZERO, Duration::ZERO, 0.0);
        let outcome = extractor.extract("https://youtube.com/watch?v=1", 0).await;
        assert_eq!(outcome, ExtractionOutcome::failure(EXTRACTION_FAILED_MESSAGE));
    }

    #[test]
    fn test_delay_stays_within_bounds() {
        let extractor = SimulatedExtractor::new(
            Duration::from_millis(3000),
            Duration::from_millis(5000),
            0.9,
        );
        for _ in 0..200 {
            let (delay, _) = extractor.roll();
            assert!(delay >= Duration::from_millis(3000));
            assert!(delay <= Duration::from_millis(5000));
        }
    }

    #[test]
    fn test_swapped_bounds_and_rate_are_normalized() {
        let extractor = SimulatedExtractor::new(Duration::from_millis(50), Duration::from_millis(10), 7.0);
        assert_eq!(extractor.min_delay, Duration::from_millis(10));
        assert_eq!(extractor.max_delay, Duration::from_millis(50));
        assert_eq!(extractor.success_rate, 1.0);
    }
}

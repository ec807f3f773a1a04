use futures_util::future::join_all;
use serde::Serialize;
use std::time::Duration;

use crate::extractors::{StrategyKind, TranscriptSource};

/// Outer limit on a single probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyHealth {
    pub strategy: StrategyKind,
    pub healthy: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub strategies: Vec<StrategyHealth>,
}

/// Probe every strategy independently; results keep priority order
pub async fn health_check<S: TranscriptSource>(strategies: &[S]) -> HealthReport {
    let probes = strategies.iter().map(|strategy| async move {
        let kind = strategy.kind();
        let outcome = tokio::time::timeout(PROBE_TIMEOUT, strategy.probe()).await;

        let (healthy, message) = match outcome {
            Ok(Ok(message)) => (true, message),
            Ok(Err(e)) => (false, e.to_string()),
            Err(_) => (false, format!("probe timed out after {:?}", PROBE_TIMEOUT)),
        };
        tracing::debug!("Probe {}: healthy={} ({})", kind, healthy, message);

        StrategyHealth {
            strategy: kind,
            healthy,
            message,
        }
    });

    let strategies = join_all(probes).await;
    HealthReport {
        status: aggregate(&strategies),
        strategies,
    }
}

/// Healthy when the top-priority strategy works, degraded when only others do
pub fn aggregate(results: &[StrategyHealth]) -> HealthStatus {
    match results.split_first() {
        Some((top, _)) if top.healthy => HealthStatus::Healthy,
        Some((_, rest)) if rest.iter().any(|r| r.healthy) => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{MockTranscriptSource, StrategyError};

    fn probe(kind: StrategyKind, healthy: bool) -> MockTranscriptSource {
        let mut mock = MockTranscriptSource::new();
        mock.expect_kind().return_const(kind);
        mock.expect_probe().times(1).returning(move || {
            if healthy {
                Ok("ok".to_string())
            } else {
                Err(StrategyError::Unavailable("down".to_string()))
            }
        });
        mock
    }

    fn result(healthy: bool) -> StrategyHealth {
        StrategyHealth {
            strategy: StrategyKind::Process,
            healthy,
            message: String::new(),
        }
    }

    #[test]
    fn test_aggregate() {
        assert_eq!(aggregate(&[result(true), result(false)]), HealthStatus::Healthy);
        assert_eq!(aggregate(&[result(false), result(false), result(true)]), HealthStatus::Degraded);
        assert_eq!(aggregate(&[result(false), result(false)]), HealthStatus::Unhealthy);
        assert_eq!(aggregate(&[]), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_health_check_probes_every_strategy() {
        let strategies = vec![
            probe(StrategyKind::Process, false),
            probe(StrategyKind::EmbeddedClient, true),
            probe(StrategyKind::WatchPage, false),
        ];

        let report = health_check(&strategies).await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.strategies.len(), 3);
        assert_eq!(report.strategies[0].message, "down");
        assert!(report.strategies[1].healthy);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["strategies"][1]["strategy"], "embedded_client");
    }
}

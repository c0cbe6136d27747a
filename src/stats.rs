use std::{future::Future, time::Duration};

use crate::{error::RepoError, models::DashboardStats, query::Collection, repository::Repository};

/// Bounds a repository fan-out as a unit. Expiry is `RepoError::Timeout`.
pub async fn within<T, F>(timeout: Duration, fanout: F) -> Result<T, RepoError>
where
    F: Future<Output = Result<T, RepoError>>,
{
    tokio::time::timeout(timeout, fanout)
        .await
        .map_err(|_| RepoError::Timeout(timeout))?
}

/// dashboard_stats
///
/// Runs the five collection counts concurrently. The first failure aborts the whole
/// aggregate, and the fan-out as a unit is bounded by `timeout`.
pub async fn dashboard_stats(
    repo: &dyn Repository,
    timeout: Duration,
) -> Result<DashboardStats, RepoError> {
    let counts = async {
        tokio::try_join!(
            repo.count(Collection::HealthMetrics),
            repo.count(Collection::Appointments),
            repo.count(Collection::Predictions),
            repo.count(Collection::RiskPredictions),
            repo.count(Collection::MedicalImaging),
        )
    };

    let (metrics, appointments, predictions, risk_predictions, imaging) =
        within(timeout, counts).await?;

    Ok(DashboardStats {
        metrics,
        appointments,
        predictions: predictions + risk_predictions,
        imaging,
    })
}

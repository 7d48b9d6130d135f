//! Service health endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub scheduler: &'static str,
}

/// Report liveness: database reachability, plus whether detection cycles run
/// on the in-process scheduler or wait for an external trigger.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "reachable",
        Err(_) => "unreachable",
    };

    let scheduler = if state.config.monitoring.scheduler_enabled {
        "in-process"
    } else {
        "external"
    };

    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        database,
        scheduler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_reports_all_probes() {
        let status = HealthStatus {
            status: "ok",
            version: "0.1.0",
            database: "reachable",
            scheduler: "external",
        };

        let value = serde_json::to_value(&status).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 4);
        assert_eq!(object["database"], "reachable");
        assert_eq!(object["scheduler"], "external");
    }
}

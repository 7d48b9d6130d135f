//! Satellite vegetation-analysis API client
//!
//! The external collaborator computes NDVI/NDRE from imagery; this client
//! only fetches the numbers. NDRE is optional in the payload; consumers
//! derive it from NDVI when absent.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Vegetation-analysis API client
#[derive(Clone)]
pub struct SatelliteClient {
    client: Client,
    api_key: String,
    base_url: String,
}

/// One vegetation reading as supplied by the analysis service
#[derive(Debug, Clone)]
pub struct VegetationReading {
    pub timestamp: DateTime<Utc>,
    pub ndvi: f64,
    pub ndre: Option<f64>,
}

/// Raw API response for a field's index series
#[derive(Debug, Deserialize)]
struct IndexSeriesResponse {
    readings: Vec<IndexReading>,
}

#[derive(Debug, Deserialize)]
struct IndexReading {
    /// Unix timestamp of the satellite pass
    observed_at: i64,
    ndvi: f64,
    ndre: Option<f64>,
}

impl SatelliteClient {
    /// Create a new satellite API client
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
        }
    }

    /// Fetch the most recent readings for a field, newest first
    pub async fn get_recent_readings(
        &self,
        field_id: Uuid,
        days: u32,
    ) -> AppResult<Vec<VegetationReading>> {
        let url = format!("{}/fields/{}/indices", self.base_url, field_id);

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .query(&[("days", days)])
            .send()
            .await
            .map_err(|e| AppError::SatelliteServiceError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::SatelliteServiceError(format!(
                "API returned status {}",
                response.status()
            )));
        }

        let data: IndexSeriesResponse = response
            .json()
            .await
            .map_err(|e| AppError::SatelliteServiceError(format!("Invalid response: {}", e)))?;

        let mut readings: Vec<VegetationReading> = data
            .readings
            .into_iter()
            .filter_map(|r| {
                let timestamp = DateTime::from_timestamp(r.observed_at, 0)?;
                Some(VegetationReading {
                    timestamp,
                    ndvi: r.ndvi,
                    ndre: r.ndre,
                })
            })
            .collect();

        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(readings)
    }
}

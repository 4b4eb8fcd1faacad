//! # NOAA Tide Data Fetching
//!
//! This module handles all network operations against NOAA's Tides and Currents
//! service: station metadata, hi/lo tide predictions and the latest observed water
//! level.
//!
//! ## Data Source
//!
//! ### NOAA Tides and Currents
//! - **Metadata**: `GET {metadata_url}/stations/{id}.json?expand=products`
//! - **Predictions**: `GET {data_url}?product=predictions&interval=hilo&...`
//! - **Water level**: `GET {data_url}?product=water_level&date=latest&...`
//!
//! All data requests use datum `MLLW` and `time_zone=lst_ldt`, so timestamps come
//! back as naive station-local times with minute resolution.
//!
//! ## Error Handling
//!
//! NOAA answers many failures with HTTP 200 and an `{"error": {"message": ...}}`
//! body, or simply omits the expected section. Every such case is mapped to a
//! [`TideError`] at the fetch boundary; callers decide whether it is fatal
//! (station setup) or retried on the next refresh.
//!
//! Parsing is kept separate from transport ([`parse_station_info`],
//! [`parse_predictions`], [`parse_water_level`]) so it can be tested without a
//! network.

use crate::config::ApiConfig;
use crate::units::UnitSystem;
use crate::{round_level, StationCapabilities, TideKind, TidePrediction};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while fetching or decoding NOAA data.
#[derive(Error, Debug)]
pub enum TideError {
    /// HTTP request failed (network, timeout, or non-2xx status)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Body was not valid JSON of the expected shape
    #[error("invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// NOAA returned an error object instead of data
    #[error("NOAA error: {0}")]
    Api(String),

    /// The expected section of the response is absent
    #[error("response is missing {0}")]
    MissingData(&'static str),

    /// A record was present but could not be interpreted
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Timestamp format of prediction records, e.g. `2024-06-16 10:15`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Product names as they appear in station metadata
const WATER_LEVELS_PRODUCT: &str = "Water Levels";
const TIDE_PREDICTIONS_PRODUCT: &str = "Tide Predictions";

/// Station metadata needed to set up tracking.
#[derive(Clone, Debug, PartialEq)]
pub struct StationInfo {
    pub name: String,
    /// Timezone abbreviation, e.g. `EST`
    pub timezone: String,
    pub products: Vec<String>,
}

impl StationInfo {
    pub fn capabilities(&self) -> StationCapabilities {
        let has = |wanted: &str| self.products.iter().any(|p| p == wanted);
        StationCapabilities {
            has_tide_predictions: has(TIDE_PREDICTIONS_PRODUCT),
            has_water_levels: has(WATER_LEVELS_PRODUCT),
        }
    }
}

/// Remote source of station data.
///
/// Implemented by [`NoaaClient`] in production and by fakes in tests.
#[async_trait]
pub trait TideSource: Send + Sync {
    async fn station_info(&self, station: &str) -> Result<StationInfo, TideError>;

    /// Hi/lo predictions starting at local midnight of `begin`, in no particular order.
    async fn predictions(
        &self,
        station: &str,
        units: UnitSystem,
        begin: NaiveDate,
        range_hours: u32,
    ) -> Result<Vec<TidePrediction>, TideError>;

    /// Most recent observed water level, rounded to 0.1.
    async fn latest_water_level(&self, station: &str, units: UnitSystem)
        -> Result<f64, TideError>;
}

// -- Wire format --

#[derive(Deserialize)]
struct ApiErrorRecord {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct StationsResponse {
    stations: Option<Vec<StationRecord>>,
}

#[derive(Deserialize)]
struct StationRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    timezone: String,
    products: Option<ProductsRecord>,
}

#[derive(Deserialize)]
struct ProductsRecord {
    products: Option<Vec<ProductRecord>>,
}

#[derive(Deserialize)]
struct ProductRecord {
    name: String,
}

#[derive(Deserialize)]
struct PredictionsResponse {
    predictions: Option<Vec<RawPrediction>>,
    error: Option<ApiErrorRecord>,
}

/// A prediction exactly as NOAA sends it.
#[derive(Debug, Deserialize)]
pub struct RawPrediction {
    /// `YYYY-MM-DD HH:MM`
    pub t: String,
    /// Level as a decimal string
    pub v: String,
    /// `H` or `L`
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Deserialize)]
struct WaterLevelResponse {
    data: Option<Vec<WaterLevelRecord>>,
    error: Option<ApiErrorRecord>,
}

#[derive(Deserialize)]
struct WaterLevelRecord {
    v: String,
}

impl RawPrediction {
    pub fn parse(&self) -> Result<TidePrediction, TideError> {
        let occurs_at = NaiveDateTime::parse_from_str(self.t.trim(), TIMESTAMP_FORMAT)
            .map_err(|e| TideError::InvalidRecord(format!("timestamp {:?}: {}", self.t, e)))?;

        let level: f64 = self
            .v
            .trim()
            .parse()
            .map_err(|_| TideError::InvalidRecord(format!("level {:?}", self.v)))?;

        let kind = match self.kind.trim() {
            "H" | "HH" => TideKind::High,
            "L" | "LL" => TideKind::Low,
            other => return Err(TideError::InvalidRecord(format!("tide type {:?}", other))),
        };

        Ok(TidePrediction::new(occurs_at, level, kind))
    }
}

/// Decode a station metadata response.
///
/// Fails when the `stations[0].products.products` path is absent.
pub fn parse_station_info(body: &str) -> Result<StationInfo, TideError> {
    let response: StationsResponse = serde_json::from_str(body)?;

    let station = response
        .stations
        .and_then(|stations| stations.into_iter().next())
        .ok_or(TideError::MissingData("stations[0]"))?;

    let products = station
        .products
        .and_then(|p| p.products)
        .ok_or(TideError::MissingData("stations[0].products.products"))?;

    Ok(StationInfo {
        name: station.name,
        timezone: station.timezone,
        products: products.into_iter().map(|p| p.name).collect(),
    })
}

/// Decode a hi/lo predictions response.
///
/// Individual malformed records are skipped; a missing `predictions` section
/// fails the whole response.
pub fn parse_predictions(body: &str) -> Result<Vec<TidePrediction>, TideError> {
    let response: PredictionsResponse = serde_json::from_str(body)?;

    if let Some(error) = response.error {
        return Err(TideError::Api(error.message));
    }

    let raw = response
        .predictions
        .ok_or(TideError::MissingData("predictions"))?;

    let parsed = raw
        .iter()
        .filter_map(|record| match record.parse() {
            Ok(prediction) => Some(prediction),
            Err(e) => {
                warn!("skipping prediction record: {}", e);
                None
            }
        })
        .collect();

    Ok(parsed)
}

/// Decode a latest water level response into a level rounded to 0.1.
pub fn parse_water_level(body: &str) -> Result<f64, TideError> {
    let response: WaterLevelResponse = serde_json::from_str(body)?;

    if let Some(error) = response.error {
        return Err(TideError::Api(error.message));
    }

    let sample = response
        .data
        .and_then(|data| data.into_iter().next())
        .ok_or(TideError::MissingData("data[0]"))?;

    let level: f64 = sample
        .v
        .trim()
        .parse()
        .map_err(|_| TideError::InvalidRecord(format!("water level {:?}", sample.v)))?;

    Ok(round_level(level))
}

/// HTTP client for the NOAA Tides and Currents APIs.
///
/// One client is shared by every station so connections are pooled.
/// Query for the hi/lo predictions covering `range_hours` from midnight of `begin`.
pub fn prediction_query(
    application: &str,
    station: &str,
    units: UnitSystem,
    begin: NaiveDate,
    range_hours: u32,
) -> Vec<(&'static str, String)> {
    vec![
        ("product", "predictions".to_string()),
        ("application", application.to_string()),
        ("begin_date", begin.format("%Y%m%d").to_string()),
        ("range", range_hours.to_string()),
        ("datum", "MLLW".to_string()),
        ("station", station.to_string()),
        ("time_zone", "lst_ldt".to_string()),
        ("units", units.as_param().to_string()),
        ("interval", "hilo".to_string()),
        ("format", "json".to_string()),
    ]
}

pub fn water_level_query(
    application: &str,
    station: &str,
    units: UnitSystem,
) -> Vec<(&'static str, String)> {
    vec![
        ("product", "water_level".to_string()),
        ("application", application.to_string()),
        ("date", "latest".to_string()),
        ("datum", "MLLW".to_string()),
        ("station", station.to_string()),
        ("time_zone", "lst_ldt".to_string()),
        ("units", units.as_param().to_string()),
        ("format", "json".to_string()),
    ]
}

pub struct NoaaClient {
    http: reqwest::Client,
    metadata_url: String,
    data_url: String,
    application: String,
}

impl NoaaClient {
    pub fn new(api: &ApiConfig) -> Result<Self, TideError> {
        let http = reqwest::Client::builder()
            .timeout(api.timeout())
            .user_agent(concat!("tide-calendar/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            metadata_url: api.metadata_url.trim_end_matches('/').to_string(),
            data_url: api.data_url.clone(),
            application: api.application.clone(),
        })
    }

    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, TideError> {
        debug!(url, "requesting");
        let body = self
            .http
            .get(url)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

#[async_trait]
impl TideSource for NoaaClient {
    async fn station_info(&self, station: &str) -> Result<StationInfo, TideError> {
        let url = format!("{}/stations/{}.json", self.metadata_url, station);
        let body = self
            .get_text(&url, &[("expand", "products".to_string())])
            .await?;
        parse_station_info(&body)
    }

    async fn predictions(
        &self,
        station: &str,
        units: UnitSystem,
        begin: NaiveDate,
        range_hours: u32,
    ) -> Result<Vec<TidePrediction>, TideError> {
        let query = prediction_query(&self.application, station, units, begin, range_hours);
        let body = self.get_text(&self.data_url, &query).await?;
        parse_predictions(&body)
    }

    async fn latest_water_level(
        &self,
        station: &str,
        units: UnitSystem,
    ) -> Result<f64, TideError> {
        let query = water_level_query(&self.application, station, units);
        let body = self.get_text(&self.data_url, &query).await?;
        parse_water_level(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATION_BODY: &str = r#"{
        "count": 1,
        "stations": [{
            "id": "8418150",
            "name": "Portland",
            "timezone": "EST",
            "products": {
                "self": null,
                "products": [
                    {"name": "Water Levels"},
                    {"name": "Tide Predictions"},
                    {"name": "Meteorological Observations"}
                ]
            }
        }]
    }"#;

    #[test]
    fn station_info_reads_name_timezone_and_products() {
        let info = parse_station_info(STATION_BODY).unwrap();
        assert_eq!(info.name, "Portland");
        assert_eq!(info.timezone, "EST");
        assert_eq!(info.products.len(), 3);

        let caps = info.capabilities();
        assert!(caps.has_water_levels);
        assert!(caps.has_tide_predictions);
    }

    #[test]
    fn station_info_without_products_path_fails() {
        let body = r#"{"stations": [{"name": "Nowhere", "timezone": "EST"}]}"#;
        assert!(matches!(
            parse_station_info(body),
            Err(TideError::MissingData(_))
        ));

        let body = r#"{"stations": []}"#;
        assert!(matches!(
            parse_station_info(body),
            Err(TideError::MissingData(_))
        ));
    }

    #[test]
    fn station_info_rejects_non_json() {
        assert!(matches!(
            parse_station_info("<html>oops</html>"),
            Err(TideError::Decode(_))
        ));
    }

    #[test]
    fn capabilities_follow_product_names() {
        let info = StationInfo {
            name: "Buoy".to_string(),
            timezone: "PST".to_string(),
            products: vec!["Meteorological Observations".to_string()],
        };
        assert!(!info.capabilities().is_usable());
    }

    #[test]
    fn predictions_are_parsed_and_rounded() {
        let body = r#"{"predictions": [
            {"t": "2024-06-16 04:00", "v": "0.312", "type": "L"},
            {"t": "2024-06-16 10:15", "v": "4.248", "type": "H"}
        ]}"#;
        let predictions = parse_predictions(body).unwrap();

        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].kind, TideKind::Low);
        assert_eq!(predictions[0].level, 0.3);
        assert_eq!(predictions[1].kind, TideKind::High);
        assert_eq!(predictions[1].level, 4.2);
        assert_eq!(predictions[1].time_label(), "10:15");
    }

    #[test]
    fn malformed_prediction_records_are_skipped() {
        let body = r#"{"predictions": [
            {"t": "not a time", "v": "1.0", "type": "H"},
            {"t": "2024-06-16 10:15", "v": "abc", "type": "H"},
            {"t": "2024-06-16 10:15", "v": "1.0", "type": "X"},
            {"t": "2024-06-16 16:30", "v": "-0.4", "type": "L"}
        ]}"#;
        let predictions = parse_predictions(body).unwrap();

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].level, -0.4);
    }

    #[test]
    fn prediction_error_object_is_reported() {
        let body = r#"{"error": {"message": "No Predictions data was found."}}"#;
        match parse_predictions(body) {
            Err(TideError::Api(message)) => assert!(message.contains("No Predictions")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_predictions_section_fails() {
        assert!(matches!(
            parse_predictions("{}"),
            Err(TideError::MissingData("predictions"))
        ));
    }

    #[test]
    fn water_level_uses_first_sample() {
        let body = r#"{"metadata": {"id": "8418150"},
            "data": [{"t": "2024-06-16 09:54", "v": "3.456", "s": "0.01", "f": "0,0,0,0", "q": "p"}]}"#;
        assert_eq!(parse_water_level(body).unwrap(), 3.5);
    }

    #[test]
    fn empty_water_level_value_is_invalid() {
        let body = r#"{"data": [{"t": "2024-06-16 09:54", "v": ""}]}"#;
        assert!(matches!(
            parse_water_level(body),
            Err(TideError::InvalidRecord(_))
        ));

        assert!(matches!(
            parse_water_level(r#"{"data": []}"#),
            Err(TideError::MissingData(_))
        ));
    }

    fn param<'a>(query: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        query.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn prediction_query_asks_for_station_local_hilo() {
        let begin = NaiveDate::from_ymd_opt(2024, 6, 16).unwrap();
        let query = prediction_query("NOS.COOPS.TAC.WL", "8418150", UnitSystem::Metric, begin, 36);

        assert_eq!(param(&query, "product"), Some("predictions"));
        assert_eq!(param(&query, "begin_date"), Some("20240616"));
        assert_eq!(param(&query, "range"), Some("36"));
        assert_eq!(param(&query, "datum"), Some("MLLW"));
        assert_eq!(param(&query, "time_zone"), Some("lst_ldt"));
        assert_eq!(param(&query, "interval"), Some("hilo"));
        assert_eq!(param(&query, "units"), Some("metric"));
        assert_eq!(param(&query, "station"), Some("8418150"));
        assert_eq!(param(&query, "application"), Some("NOS.COOPS.TAC.WL"));
        assert_eq!(param(&query, "format"), Some("json"));
    }

    #[test]
    fn water_level_query_asks_for_latest_sample() {
        let query = water_level_query("NOS.COOPS.TAC.WL", "8418150", UnitSystem::English);

        assert_eq!(param(&query, "product"), Some("water_level"));
        assert_eq!(param(&query, "date"), Some("latest"));
        assert_eq!(param(&query, "datum"), Some("MLLW"));
        assert_eq!(param(&query, "time_zone"), Some("lst_ldt"));
        assert_eq!(param(&query, "units"), Some("english"));
        assert_eq!(param(&query, "format"), Some("json"));
        assert_eq!(param(&query, "interval"), None);
    }
}

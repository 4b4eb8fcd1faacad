//! # Station Controller
//!
//! One controller per tracked station. Setup resolves station metadata once, builds
//! the property set matching the station's data products, then starts two
//! activities:
//!
//! - **refresh** (every ~6 minutes): fetches predictions and the latest water level.
//!   Network calls happen outside the station lock; only the resulting schedule
//!   swap and publishes take it.
//! - **status check** (every second): runs the [`TideStatusMachine`] against the
//!   schedule and publishes every field.
//!
//! All mutable station state sits behind a single mutex, so a schedule replacement
//! and a status evaluation never interleave. Both activities stop as soon as the
//! controller's [`CancellationToken`] is cancelled, dropping any in-flight request.

use crate::clock::{StationClock, SystemClock};
use crate::config::Config;
use crate::properties::{
    Property, PropertyChanged, PropertyPublisher, PropertyValue, CURRENT_LEVEL, HIGH_TIDE, HIGH_TIDE_LEVEL,
    HIGH_TIDE_TIME, LOW_TIDE, LOW_TIDE_LEVEL, LOW_TIDE_TIME, STATUS,
};
use crate::schedule::TideSchedule;
use crate::status::{Evaluation, TideStatusMachine};
use crate::tide_data::TideSource;
use crate::timezone;
use crate::units::UnitSystem;
use crate::{StationCapabilities, TideKind, TidePrediction};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Station setup failures. Fatal for that station only.
#[derive(Error, Debug)]
pub enum StationError {
    #[error("station {station} unavailable: {reason}")]
    Unavailable { station: String, reason: String },
}

/// Per-station settings derived from the application config.
#[derive(Clone, Debug)]
pub struct StationSettings {
    pub unit: UnitSystem,
    pub refresh_interval: Duration,
    pub check_interval: Duration,
    pub prediction_range_hours: u32,
}

impl From<&Config> for StationSettings {
    fn from(config: &Config) -> Self {
        Self {
            unit: config.unit,
            refresh_interval: config.schedule.refresh_interval(),
            check_interval: config.schedule.check_interval(),
            prediction_range_hours: config.schedule.prediction_range(),
        }
    }
}

impl Default for StationSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Device id under which a station is registered with the host.
pub fn device_id_for(station_id: &str) -> String {
    format!("tide-calendar-{}", station_id)
}

/// State shared by both activities, guarded by one lock.
struct StationState {
    schedule: TideSchedule,
    machine: TideStatusMachine,
    publisher: PropertyPublisher,
}

impl StationState {
    fn publish_next(&mut self, kind: TideKind) {
        let Some(next) = self.schedule.next(kind).cloned() else {
            return;
        };
        publish_prediction(&mut self.publisher, &next);
    }
}

fn publish_prediction(publisher: &mut PropertyPublisher, prediction: &TidePrediction) {
    let (time, level) = match prediction.kind {
        TideKind::High => (HIGH_TIDE_TIME, HIGH_TIDE_LEVEL),
        TideKind::Low => (LOW_TIDE_TIME, LOW_TIDE_LEVEL),
    };
    publisher.publish(time, prediction.time_label());
    publisher.publish(level, prediction.level);
}

fn publish_evaluation(publisher: &mut PropertyPublisher, evaluation: &Evaluation) {
    if let Some(next) = &evaluation.next_high {
        publish_prediction(publisher, next);
    }
    if let Some(next) = &evaluation.next_low {
        publish_prediction(publisher, next);
    }
    publisher.publish(HIGH_TIDE, evaluation.high_tide);
    publisher.publish(LOW_TIDE, evaluation.low_tide);
    publisher.publish(STATUS, evaluation.status);
}

/// A station whose metadata has been resolved.
pub struct Station {
    id: String,
    device_id: String,
    name: String,
    capabilities: StationCapabilities,
    timezone: Option<Tz>,
    settings: StationSettings,
    source: Arc<dyn TideSource>,
    clock: Arc<dyn StationClock>,
    state: Mutex<StationState>,
}

impl Station {
    /// Resolve metadata and build the property set.
    ///
    /// `clock` overrides the station clock; by default the station's own
    /// timezone is used, or host-local time if it cannot be resolved.
    pub async fn connect(
        station_id: &str,
        settings: StationSettings,
        source: Arc<dyn TideSource>,
        notifier: UnboundedSender<PropertyChanged>,
        clock: Option<Arc<dyn StationClock>>,
    ) -> Result<Self, StationError> {
        let unavailable = |reason: String| StationError::Unavailable {
            station: station_id.to_string(),
            reason,
        };

        let info = source
            .station_info(station_id)
            .await
            .map_err(|e| unavailable(format!("error fetching station info: {}", e)))?;

        let capabilities = info.capabilities();
        if !capabilities.is_usable() {
            return Err(unavailable(
                "water levels and tide predictions are both unavailable".to_string(),
            ));
        }

        let tz = timezone::resolve(&info.timezone);
        if tz.is_none() {
            warn!(
                station = station_id,
                timezone = %info.timezone,
                "unknown timezone abbreviation, using host local time"
            );
        }

        let device_id = device_id_for(station_id);
        let publisher =
            PropertyPublisher::for_station(device_id.clone(), capabilities, settings.unit, notifier);
        let clock = clock.unwrap_or_else(|| Arc::new(SystemClock::new(tz)));

        info!(
            station = station_id,
            name = %info.name,
            predictions = capabilities.has_tide_predictions,
            water_levels = capabilities.has_water_levels,
            "station ready"
        );

        Ok(Self {
            id: station_id.to_string(),
            device_id,
            name: info.name,
            capabilities,
            timezone: tz,
            settings,
            source,
            clock,
            state: Mutex::new(StationState {
                schedule: TideSchedule::new(),
                machine: TideStatusMachine::new(),
                publisher,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> StationCapabilities {
        self.capabilities
    }

    pub fn timezone(&self) -> Option<Tz> {
        self.timezone
    }

    /// Fetch predictions and the latest water level.
    ///
    /// Failures are logged and leave the previous schedule and level in place.
    pub async fn refresh(&self) {
        let now = self.clock.now();

        if self.capabilities.has_tide_predictions {
            let fetched = self
                .source
                .predictions(
                    &self.id,
                    self.settings.unit,
                    now.date(),
                    self.settings.prediction_range_hours,
                )
                .await;

            match fetched {
                Ok(predictions) => {
                    let fresh = TideSchedule::from_predictions(predictions, now);
                    let mut state = self.state.lock().await;
                    state.schedule.replace(fresh);
                    state.publish_next(TideKind::High);
                    state.publish_next(TideKind::Low);
                    debug!(
                        station = %self.id,
                        highs = state.schedule.sequence(TideKind::High).len(),
                        lows = state.schedule.sequence(TideKind::Low).len(),
                        "tide predictions refreshed"
                    );
                }
                Err(e) => warn!(station = %self.id, "error fetching tide predictions: {}", e),
            }
        }

        if self.capabilities.has_water_levels {
            match self
                .source
                .latest_water_level(&self.id, self.settings.unit)
                .await
            {
                Ok(level) => {
                    let mut state = self.state.lock().await;
                    state.publisher.publish(CURRENT_LEVEL, level);
                }
                Err(e) => warn!(station = %self.id, "error fetching water level: {}", e),
            }
        }
    }

    /// Evaluate the status machine at the station's current time and publish.
    pub async fn tick(&self) -> Evaluation {
        let now = self.clock.now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let evaluation = state.machine.evaluate(&mut state.schedule, now);
        publish_evaluation(&mut state.publisher, &evaluation);
        evaluation
    }

    /// Current value of every exposed property.
    pub async fn snapshot(&self) -> BTreeMap<&'static str, PropertyValue> {
        self.state.lock().await.publisher.snapshot()
    }

    /// Exposed properties with their schema and current value.
    pub async fn properties(&self) -> Vec<Property> {
        self.state.lock().await.publisher.properties().cloned().collect()
    }

    pub async fn schedule(&self) -> TideSchedule {
        self.state.lock().await.schedule.clone()
    }
}

/// Owns a [`Station`] and its two running activities.
pub struct StationController {
    station: Arc<Station>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl StationController {
    /// Resolve the station and start both activities. Nothing is started when
    /// setup fails.
    pub async fn setup(
        station_id: &str,
        settings: StationSettings,
        source: Arc<dyn TideSource>,
        notifier: UnboundedSender<PropertyChanged>,
    ) -> Result<Self, StationError> {
        let station = Station::connect(station_id, settings, source, notifier, None).await?;
        Ok(Self::start(Arc::new(station), CancellationToken::new()))
    }

    /// Spawn the refresh and status activities for an already connected station.
    pub fn start(station: Arc<Station>, token: CancellationToken) -> Self {
        let tasks = vec![
            tokio::spawn(run_refresh(Arc::clone(&station), token.clone())),
            tokio::spawn(run_status_checks(Arc::clone(&station), token.clone())),
        ];

        Self {
            station,
            token,
            tasks,
        }
    }

    pub fn station(&self) -> &Arc<Station> {
        &self.station
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && self.tasks.iter().any(|t| !t.is_finished())
    }

    /// Cancel both activities and wait for them to finish.
    pub async fn stop(mut self) {
        self.token.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!(station = %self.station.id, "station task ended abnormally: {}", e);
            }
        }
        info!(station = %self.station.id, "station stopped");
    }
}

impl Drop for StationController {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_refresh(station: Arc<Station>, token: CancellationToken) {
    let mut ticker = tokio::time::interval(station.settings.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = station.refresh() => {}
                }
            }
        }
    }

    debug!(station = %station.id, "refresh activity stopped");
}

async fn run_status_checks(station: Arc<Station>, token: CancellationToken) {
    let mut ticker = tokio::time::interval(station.settings.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                station.tick().await;
            }
        }
    }

    debug!(station = %station.id, "status activity stopped");
}

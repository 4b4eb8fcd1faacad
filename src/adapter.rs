//! # Tide Calendar Adapter
//!
//! Registers one device per configured station. A station that cannot be set up
//! is logged and skipped; it never affects the others.

use crate::properties::{Property, PropertyChanged};
use crate::station::{device_id_for, StationController, StationSettings};
use crate::tide_data::TideSource;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

/// Link to the public NOAA predictions page for a station
const PREDICTIONS_PAGE: &str = "https://tidesandcurrents.noaa.gov/noaatidepredictions.html";

/// Device metadata handed to the host when a station is added.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescription {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "@type")]
    pub types: Vec<&'static str>,
    pub properties: Vec<Property>,
    pub links: Vec<Link>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub rel: &'static str,
    pub media_type: &'static str,
    pub href: String,
}

pub struct TideCalendarAdapter {
    source: Arc<dyn TideSource>,
    settings: StationSettings,
    notifier: UnboundedSender<PropertyChanged>,
    devices: BTreeMap<String, StationController>,
}

impl TideCalendarAdapter {
    pub fn new(
        source: Arc<dyn TideSource>,
        settings: StationSettings,
        notifier: UnboundedSender<PropertyChanged>,
    ) -> Self {
        Self {
            source,
            settings,
            notifier,
            devices: BTreeMap::new(),
        }
    }

    /// Set up every listed station that is not already tracked.
    ///
    /// Returns the device ids added by this call.
    pub async fn start_pairing(&mut self, stations: &[String]) -> Vec<String> {
        let mut added = Vec::new();

        for station_id in stations {
            let device_id = device_id_for(station_id);
            if self.devices.contains_key(&device_id) {
                continue;
            }

            match StationController::setup(
                station_id,
                self.settings.clone(),
                Arc::clone(&self.source),
                self.notifier.clone(),
            )
            .await
            {
                Ok(controller) => {
                    info!(device = %device_id, "device added");
                    self.devices.insert(device_id.clone(), controller);
                    added.push(device_id);
                }
                Err(e) => error!("{}", e),
            }
        }

        added
    }

    /// Stop tracking a device. Returns false if it was unknown.
    pub async fn remove_station(&mut self, device_id: &str) -> bool {
        match self.devices.remove(device_id) {
            Some(controller) => {
                controller.stop().await;
                info!(device = %device_id, "device removed");
                true
            }
            None => false,
        }
    }

    pub async fn shutdown(&mut self) {
        for (_, controller) in std::mem::take(&mut self.devices) {
            controller.stop().await;
        }
    }

    pub fn device(&self, device_id: &str) -> Option<&StationController> {
        self.devices.get(device_id)
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    /// Host-facing metadata for a tracked device.
    pub async fn describe(&self, device_id: &str) -> Option<DeviceDescription> {
        let station = self.devices.get(device_id)?.station();
        let title = format!("Tide Calendar ({})", station.name());
        let types = if station.capabilities().has_water_levels {
            vec!["MultiLevelSensor"]
        } else {
            Vec::new()
        };

        Some(DeviceDescription {
            id: device_id.to_string(),
            description: title.clone(),
            title,
            types,
            properties: station.properties().await,
            links: vec![Link {
                rel: "alternate",
                media_type: "text/html",
                href: format!("{}?id={}", PREDICTIONS_PAGE, station.id()),
            }],
        })
    }
}

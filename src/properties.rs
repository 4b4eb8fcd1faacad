//! # Published Device Properties
//!
//! The property set a station exposes to the host, and the change-only
//! publishing rule: `publish` stores and notifies only when the value differs
//! from the last published one. Callers publish every computed field on every
//! tick and leave deduplication to this module.

use crate::units::UnitSystem;
use crate::{StationCapabilities, Status};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

pub const LOW_TIDE_TIME: &str = "lowTideTime";
pub const LOW_TIDE_LEVEL: &str = "lowTideLevel";
pub const LOW_TIDE: &str = "lowTide";
pub const HIGH_TIDE_TIME: &str = "highTideTime";
pub const HIGH_TIDE_LEVEL: &str = "highTideLevel";
pub const HIGH_TIDE: &str = "highTide";
pub const STATUS: &str = "status";
pub const CURRENT_LEVEL: &str = "currentLevel";

/// A property value as the host sees it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<Status> for PropertyValue {
    fn from(value: Status) -> Self {
        PropertyValue::Text(value.as_str().to_string())
    }
}

/// Schema of a property, in the shape WebThings-style hosts expect.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescription {
    pub title: &'static str,
    #[serde(rename = "type")]
    pub value_type: &'static str,
    #[serde(rename = "@type", skip_serializing_if = "Option::is_none")]
    pub semantic_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<&'static str>>,
    pub read_only: bool,
}

impl PropertyDescription {
    fn text(title: &'static str) -> Self {
        Self {
            title,
            value_type: "string",
            semantic_type: None,
            unit: None,
            multiple_of: None,
            minimum: None,
            maximum: None,
            allowed: None,
            read_only: true,
        }
    }

    fn boolean(title: &'static str) -> Self {
        Self {
            value_type: "boolean",
            ..Self::text(title)
        }
    }

    fn level(title: &'static str, unit: UnitSystem) -> Self {
        Self {
            value_type: "number",
            unit: Some(unit.length_unit()),
            multiple_of: Some(0.1),
            ..Self::text(title)
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Property {
    pub name: &'static str,
    pub description: PropertyDescription,
    pub value: PropertyValue,
}

/// Notification sent once per actual value change.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyChanged {
    pub device_id: String,
    pub name: &'static str,
    pub value: PropertyValue,
}

pub struct PropertyPublisher {
    device_id: String,
    properties: BTreeMap<&'static str, Property>,
    notifier: UnboundedSender<PropertyChanged>,
}

impl PropertyPublisher {
    /// Build the property set matching a station's capabilities.
    pub fn for_station(
        device_id: impl Into<String>,
        capabilities: StationCapabilities,
        unit: UnitSystem,
        notifier: UnboundedSender<PropertyChanged>,
    ) -> Self {
        let mut publisher = Self {
            device_id: device_id.into(),
            properties: BTreeMap::new(),
            notifier,
        };

        if capabilities.has_tide_predictions {
            publisher.add(LOW_TIDE_TIME, PropertyDescription::text("Low Tide Time"), "".into());
            publisher.add(
                LOW_TIDE_LEVEL,
                PropertyDescription::level("Low Tide Level", unit),
                0.0.into(),
            );
            publisher.add(LOW_TIDE, PropertyDescription::boolean("Low Tide"), false.into());
            publisher.add(HIGH_TIDE_TIME, PropertyDescription::text("High Tide Time"), "".into());
            publisher.add(
                HIGH_TIDE_LEVEL,
                PropertyDescription::level("High Tide Level", unit),
                0.0.into(),
            );
            publisher.add(HIGH_TIDE, PropertyDescription::boolean("High Tide"), false.into());
            publisher.add(
                STATUS,
                PropertyDescription {
                    allowed: Some(vec!["low", "high", "rising", "falling", "unknown"]),
                    ..PropertyDescription::text("Status")
                },
                Status::Unknown.into(),
            );
        }

        if capabilities.has_water_levels {
            let (minimum, maximum) = unit.level_bounds();
            publisher.add(
                CURRENT_LEVEL,
                PropertyDescription {
                    semantic_type: Some("LevelProperty"),
                    minimum: Some(minimum),
                    maximum: Some(maximum),
                    ..PropertyDescription::level("Current Level", unit)
                },
                0.0.into(),
            );
        }

        publisher
    }

    fn add(&mut self, name: &'static str, description: PropertyDescription, value: PropertyValue) {
        self.properties.insert(
            name,
            Property {
                name,
                description,
                value,
            },
        );
    }

    /// Store `value` and notify if it differs from the last published value.
    ///
    /// Returns whether a notification was sent. Unknown property names are
    /// ignored.
    pub fn publish(&mut self, name: &str, value: impl Into<PropertyValue>) -> bool {
        let value = value.into();
        let Some(property) = self.properties.get_mut(name) else {
            return false;
        };

        if property.value == value {
            return false;
        }

        property.value = value.clone();
        debug!(device = %self.device_id, property = property.name, ?value, "property changed");

        // A closed receiver only means nobody is listening any more
        let _ = self.notifier.send(PropertyChanged {
            device_id: self.device_id.clone(),
            name: property.name,
            value,
        });
        true
    }

    pub fn has(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn value(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name).map(|p| &p.value)
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, PropertyValue> {
        self.properties
            .iter()
            .map(|(name, property)| (*name, property.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn full() -> StationCapabilities {
        StationCapabilities {
            has_tide_predictions: true,
            has_water_levels: true,
        }
    }

    #[test]
    fn property_set_follows_capabilities() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let predictions_only = StationCapabilities {
            has_tide_predictions: true,
            has_water_levels: false,
        };
        let publisher = PropertyPublisher::for_station("dev", predictions_only, UnitSystem::English, tx);

        assert!(publisher.has(HIGH_TIDE_TIME));
        assert!(publisher.has(STATUS));
        assert!(!publisher.has(CURRENT_LEVEL));
        assert_eq!(publisher.properties().count(), 7);

        let (tx, _rx) = mpsc::unbounded_channel();
        let levels_only = StationCapabilities {
            has_tide_predictions: false,
            has_water_levels: true,
        };
        let publisher = PropertyPublisher::for_station("dev", levels_only, UnitSystem::Metric, tx);
        assert_eq!(publisher.properties().count(), 1);

        let level = publisher.properties().next().unwrap();
        assert_eq!(level.description.unit, Some("meter"));
        assert_eq!(level.description.maximum, Some(15.2));
    }

    #[test]
    fn publish_notifies_only_on_change() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut publisher = PropertyPublisher::for_station("tide-calendar-1", full(), UnitSystem::English, tx);

        assert!(publisher.publish(HIGH_TIDE, true));
        assert!(!publisher.publish(HIGH_TIDE, true));
        assert!(!publisher.publish(LOW_TIDE, false));
        assert!(publisher.publish(CURRENT_LEVEL, 3.4));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.device_id, "tide-calendar-1");
        assert_eq!(first.name, HIGH_TIDE);
        assert_eq!(first.value, PropertyValue::Bool(true));

        assert_eq!(rx.try_recv().unwrap().name, CURRENT_LEVEL);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn initial_status_is_unknown() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut publisher = PropertyPublisher::for_station("dev", full(), UnitSystem::English, tx);

        assert_eq!(publisher.value(STATUS), Some(&PropertyValue::Text("unknown".into())));
        let status = publisher.properties().find(|p| p.name == STATUS).unwrap();
        assert!(status.description.allowed.as_ref().unwrap().contains(&"unknown"));
        assert!(!publisher.publish(STATUS, Status::Unknown));
        assert!(publisher.publish(STATUS, Status::Rising));
    }

    #[test]
    fn publishing_absent_property_is_ignored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut publisher = PropertyPublisher::for_station(
            "dev",
            StationCapabilities {
                has_tide_predictions: false,
                has_water_levels: true,
            },
            UnitSystem::English,
            tx,
        );

        assert!(!publisher.publish(HIGH_TIDE_TIME, "10:15"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_receiver_does_not_block_publishing() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut publisher = PropertyPublisher::for_station("dev", full(), UnitSystem::English, tx);

        assert!(publisher.publish(CURRENT_LEVEL, 1.2));
        assert_eq!(publisher.value(CURRENT_LEVEL), Some(&PropertyValue::Number(1.2)));
    }

    #[test]
    fn description_serializes_host_schema() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let publisher = PropertyPublisher::for_station("dev", full(), UnitSystem::English, tx);
        let level = publisher
            .properties()
            .find(|p| p.name == CURRENT_LEVEL)
            .unwrap();

        let json = serde_json::to_value(&level.description).unwrap();
        assert_eq!(json["@type"], "LevelProperty");
        assert_eq!(json["type"], "number");
        assert_eq!(json["multipleOf"], 0.1);
        assert_eq!(json["readOnly"], true);
        assert_eq!(json["minimum"], -50.0);

        let status = publisher.properties().find(|p| p.name == STATUS).unwrap();
        let json = serde_json::to_value(&status.description).unwrap();
        assert_eq!(
            json["enum"],
            serde_json::json!(["low", "high", "rising", "falling", "unknown"])
        );
    }
}

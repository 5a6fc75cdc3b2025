// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Structured telemetry reported by the language agent running inside the function.
//!
//! Each event collection uses the agent's harvest layout, a JSON array such as
//!
//! ```text
//! [run_id, {"reservoir_size": 1000, "events_seen": 2}, [event, event]]
//! ```
//!
//! where the event list is the last array element. An event is itself an array of
//! up to three objects: intrinsics, user attributes and agent attributes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub type Attributes = Map<String, Value>;

/// Version 1 payload wrapper: agent metadata next to the agent data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAgentData {
    #[serde(default)]
    pub metadata: Attributes,
    #[serde(default)]
    pub data: AgentData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub span_event_data: EventCollection,
    #[serde(default, deserialize_with = "null_as_default")]
    pub error_event_data: EventCollection,
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_event_data: EventCollection,
}

impl AgentData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.span_event_data.agent_events().is_empty()
            && self.error_event_data.agent_events().is_empty()
            && self.custom_event_data.agent_events().is_empty()
    }
}

/// One harvested event collection, kept in its wire layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCollection(Vec<Value>);

impl EventCollection {
    /// Builds a collection in harvest layout around the given events.
    #[must_use]
    pub fn from_events(events: Vec<AgentEvent>) -> Self {
        let seen = events.len();
        let events = events
            .into_iter()
            .map(|event| {
                Value::Array(vec![
                    Value::Object(event.intrinsics),
                    Value::Object(event.user_attributes),
                    Value::Object(event.agent_attributes),
                ])
            })
            .collect();
        EventCollection(vec![
            Value::Null,
            serde_json::json!({ "reservoir_size": seen, "events_seen": seen }),
            Value::Array(events),
        ])
    }

    /// The events of the collection, in the order the agent reported them.
    ///
    /// Entries that are not arrays are skipped; missing attribute objects are empty.
    #[must_use]
    pub fn agent_events(&self) -> Vec<AgentEvent> {
        let Some(Value::Array(events)) = self.0.iter().rev().find(|v| v.is_array()) else {
            return Vec::new();
        };
        events.iter().filter_map(AgentEvent::from_value).collect()
    }
}

/// One span, error or custom observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentEvent {
    pub intrinsics: Attributes,
    pub user_attributes: Attributes,
    pub agent_attributes: Attributes,
}

impl AgentEvent {
    fn from_value(value: &Value) -> Option<Self> {
        let parts = value.as_array()?;
        let object_at = |idx: usize| {
            parts
                .get(idx)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };
        Some(AgentEvent {
            intrinsics: object_at(0),
            user_attributes: object_at(1),
            agent_attributes: object_at(2),
        })
    }

    pub fn intrinsic_str(&self, key: &str) -> Option<&str> {
        self.intrinsics.get(key).and_then(Value::as_str)
    }

    pub fn intrinsic_f64(&self, key: &str) -> Option<f64> {
        self.intrinsics.get(key).and_then(Value::as_f64)
    }

    pub fn intrinsic_bool(&self, key: &str) -> bool {
        self.intrinsics
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

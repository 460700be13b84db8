//! Metric tuples delivered to the engine callback.
//!
//! A tuple is a flat record with its tags already rendered as JSON text.
//! The machine-id tag and the optional computer name are owned by a
//! [`MetricFactory`] created once per polling session.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::collectors::identity::MmaIds;

/// Origin stamped on every tuple and used as the tag-key prefix.
pub const ORIGIN: &str = "vm.azm.ms";

pub const TAG_MACHINE_ID: &str = "vm.azm.ms/machineId";
pub const TAG_MEMORY_SIZE_MB: &str = "vm.azm.ms/memorySizeMB";
pub const TAG_TOTAL_CPUS: &str = "vm.azm.ms/totalCpus";
pub const TAG_MOUNT_ID: &str = "vm.azm.ms/mountId";
pub const TAG_DISK_SIZE_MB: &str = "vm.azm.ms/diskSizeMB";
pub const TAG_NETWORK_DEVICE_ID: &str = "vm.azm.ms/networkDeviceId";
pub const TAG_BYTES: &str = "vm.azm.ms/bytes";

/// Tag map passed to [`MetricFactory::tuple`].
pub type Tags = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricTuple {
    pub origin: &'static str,
    pub namespace: String,
    pub name: String,
    pub value: f64,
    /// JSON object text.
    pub tags: String,
    /// UTC, second precision: `2024-01-31T12:00:00Z`.
    pub collection_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computer: Option<String>,
}

impl MetricTuple {
    /// Parsed view of [`MetricTuple::tags`].
    pub fn tag_map(&self) -> Tags {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }
}

pub fn format_collection_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Builds tuples carrying the session's machine-id tag and host identity.
#[derive(Debug, Clone)]
pub struct MetricFactory {
    machine_id: Value,
    computer: Option<String>,
}

impl MetricFactory {
    /// Agent ids are tagged as `m-<id>`; several ids become a JSON array.
    pub fn new(mma_ids: &MmaIds, computer: Option<String>) -> Self {
        let machine_id = match mma_ids {
            MmaIds::Single(id) => Value::String(format!("m-{}", id)),
            MmaIds::Multiple(ids) => Value::Array(
                ids.iter()
                    .map(|id| Value::String(format!("m-{}", id)))
                    .collect(),
            ),
        };
        Self {
            machine_id,
            computer,
        }
    }

    pub fn tuple(&self, namespace: &str, name: &str, value: f64, tags: Tags) -> MetricTuple {
        self.tuple_at(namespace, name, value, tags, Utc::now())
    }

    pub fn tuple_at(
        &self,
        namespace: &str,
        name: &str,
        value: f64,
        mut tags: Tags,
        time: DateTime<Utc>,
    ) -> MetricTuple {
        tags.insert(TAG_MACHINE_ID.to_string(), self.machine_id.clone());
        MetricTuple {
            origin: ORIGIN,
            namespace: namespace.to_string(),
            name: name.to_string(),
            value,
            tags: Value::Object(tags).to_string(),
            collection_time: format_collection_time(time),
            computer: self.computer.clone(),
        }
    }
}

/// Convenience for building a tag map from `(key, value)` pairs.
pub fn tags<I, V>(pairs: I) -> Tags
where
    I: IntoIterator<Item = (&'static str, V)>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into()))
        .collect()
}

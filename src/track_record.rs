use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::RouteError;
use crate::geo_utils::{self, TrackPoint};
use crate::import_data;
use crate::polyline;

// Record ids only need to be unique within a process session.
static NEXT_RECORD_ID: AtomicI64 = AtomicI64::new(1);

fn fresh_record_id() -> i64 {
    NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed)
}

/// A single normalized route/activity, the unit handed to the UI and
/// storage collaborators. Geometry and distance are fixed at creation;
/// only `enabled` and `name` are meant to change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredTrackRecord")]
pub struct TrackRecord {
    pub name: String,
    pub encoded_geometry: String,
    pub distance_meters: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    pub activity_type: String,
    pub enabled: bool,
    pub id: i64,
}

impl TrackRecord {
    /// Point accessor for the rendering collaborator. Works for records
    /// loaded from either geometry representation, since legacy `points`
    /// arrays are re-encoded at deserialization time.
    pub fn track_points(&self) -> Result<Vec<TrackPoint>, RouteError> {
        polyline::decode(&self.encoded_geometry)
    }
}

/// Normalizes raw route text into a track record: sniff and parse,
/// compute the distance over the raw sequence, encode the geometry, and
/// fill in the defaults. The matched parser's failure propagates
/// verbatim; no other format is retried.
pub fn build_track_record(
    text: &str,
    source_name: Option<&str>,
) -> Result<TrackRecord, RouteError> {
    let parsed = import_data::parse_route_data(text)?;
    let distance_meters = geo_utils::total_distance(&parsed.points);
    let encoded_geometry = polyline::encode(&parsed.points);
    debug!(
        "normalized {} points, {:.0} m",
        parsed.points.len(),
        distance_meters
    );
    Ok(TrackRecord {
        name: source_name.map_or_else(|| parsed.default_name.to_owned(), str::to_owned),
        encoded_geometry,
        distance_meters,
        captured_at: parsed.captured_at,
        activity_type: parsed
            .activity_type
            .unwrap_or_else(|| "Unknown".to_owned()),
        enabled: true,
        id: fresh_record_id(),
    })
}

/// Wire shape accepted when loading persisted records. Older hosts stored
/// a raw `points` array and a `distance` field instead of the encoded
/// geometry; both are migrated transparently so in-memory records always
/// hold the canonical form.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTrackRecord {
    name: String,
    #[serde(default)]
    encoded_geometry: Option<String>,
    #[serde(default)]
    points: Vec<StoredPoint>,
    #[serde(default, alias = "distance")]
    distance_meters: f64,
    #[serde(default)]
    captured_at: Option<DateTime<Utc>>,
    #[serde(default = "unknown_activity")]
    activity_type: String,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default)]
    id: Option<i64>,
}

#[derive(Deserialize)]
struct StoredPoint {
    lat: f64,
    lon: f64,
}

fn unknown_activity() -> String {
    "Unknown".to_owned()
}

fn enabled_by_default() -> bool {
    true
}

impl From<StoredTrackRecord> for TrackRecord {
    fn from(stored: StoredTrackRecord) -> Self {
        let encoded_geometry = stored.encoded_geometry.unwrap_or_else(|| {
            let points: Vec<TrackPoint> = stored
                .points
                .iter()
                .map(|p| TrackPoint {
                    latitude: p.lat,
                    longitude: p.lon,
                })
                .collect();
            polyline::encode(&points)
        });
        TrackRecord {
            name: stored.name,
            encoded_geometry,
            distance_meters: stored.distance_meters,
            captured_at: stored.captured_at,
            activity_type: stored.activity_type,
            enabled: stored.enabled,
            id: stored.id.unwrap_or_else(fresh_record_id),
        }
    }
}

/// Serializes a record list for the storage collaborator.
pub fn records_to_json(records: &[TrackRecord]) -> Result<String> {
    serde_json::to_string(records).context("failed to serialize track records")
}

/// Loads a record list persisted by this or an older host version.
pub fn records_from_json(json: &str) -> Result<Vec<TrackRecord>> {
    serde_json::from_str(json).context("failed to deserialize track records")
}

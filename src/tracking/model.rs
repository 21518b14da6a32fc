//! Tracking report data model.
//!
//! The wire shapes mirror the downstream build-tracking service: entries
//! serialize with camelCase keys, store coordinates as a single
//! `packageType:storeType:name` string, and absent digests are omitted
//! rather than null.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Correlation key tying every entry to one build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackingKey {
    pub id: String,
}

impl TrackingKey {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreType {
    Group,
    Remote,
    Hosted,
}

impl StoreType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Remote => "remote",
            Self::Hosted => "hosted",
        }
    }
}

impl FromStr for StoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(Self::Group),
            "remote" => Ok(Self::Remote),
            "hosted" => Ok(Self::Hosted),
            other => Err(format!("unknown store type '{other}'")),
        }
    }
}

/// Artifact store coordinates. Serialized in the downstream service's
/// compact form, e.g. `maven:remote:central`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub package_type: String,
    pub store_type: StoreType,
    pub name: String,
}

impl StoreKey {
    #[must_use]
    pub fn new(
        package_type: impl Into<String>,
        store_type: StoreType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            package_type: package_type.into(),
            store_type,
            name: name.into(),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.package_type,
            self.store_type.as_str(),
            self.name
        )
    }
}

impl FromStr for StoreKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(package_type), Some(store_type), Some(name)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("store key '{s}' is not packageType:storeType:name"));
        };
        Ok(Self {
            package_type: package_type.to_string(),
            store_type: store_type.parse()?,
            name: name.to_string(),
        })
    }
}

impl Serialize for StoreKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StoreKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessChannel {
    Native,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreEffect {
    Upload,
    Download,
}

/// One recorded transfer, finalized exactly once when the body has fully
/// drained. Identity covers every field, so replaying the same artifact
/// is naturally idempotent in the sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedContentEntry {
    pub key: TrackingKey,
    pub store_key: StoreKey,
    pub access_channel: AccessChannel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_url: Option<String>,
    pub path: String,
    pub effect: StoreEffect,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Aggregate report for one build: everything uploaded and downloaded
/// through the sidecar since startup or the last clear.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedContent {
    pub key: TrackingKey,
    pub uploads: HashSet<TrackedContentEntry>,
    pub downloads: HashSet<TrackedContentEntry>,
}

/// One pre-built artifact known from a previous run of the same build,
/// loaded from the historical manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalEntry {
    pub store_key: StoreKey,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_url: Option<String>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Manifest shape: the build id plus every download the previous run saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalContent {
    pub build_config_id: String,
    pub downloads: Vec<HistoricalEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_key_round_trips_through_compact_form() {
        let key = StoreKey::new("maven", StoreType::Remote, "central");
        assert_eq!(key.to_string(), "maven:remote:central");
        assert_eq!("maven:remote:central".parse::<StoreKey>().unwrap(), key);
    }

    #[test]
    fn store_key_rejects_malformed_input() {
        assert!("maven:central".parse::<StoreKey>().is_err());
        assert!("maven:virtual:central".parse::<StoreKey>().is_err());
    }

    #[test]
    fn entry_serializes_with_camel_case_and_compact_store_key() {
        let entry = TrackedContentEntry {
            key: TrackingKey::new("build-1"),
            store_key: StoreKey::new("maven", StoreType::Hosted, "builds"),
            access_channel: AccessChannel::Native,
            origin_url: None,
            path: "/org/foo/foo-1.0.jar".into(),
            effect: StoreEffect::Upload,
            size: 42,
            md5: Some("abc".into()),
            sha1: None,
            sha256: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["storeKey"], "maven:hosted:builds");
        assert_eq!(json["accessChannel"], "NATIVE");
        assert_eq!(json["effect"], "UPLOAD");
        assert!(json.get("sha1").is_none());
        assert!(json.get("originUrl").is_none());
    }

    #[test]
    fn historical_manifest_parses() {
        let json = r#"{
            "buildConfigId": "build-7",
            "downloads": [{
                "storeKey": "maven:remote:central",
                "path": "/org/x/x-1.jar",
                "originUrl": "https://repo.example/org/x/x-1.jar",
                "size": 10,
                "md5": "m",
                "sha1": "s1",
                "sha256": "s256"
            }]
        }"#;
        let manifest: HistoricalContent = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.build_config_id, "build-7");
        assert_eq!(manifest.downloads.len(), 1);
        assert_eq!(
            manifest.downloads[0].store_key.store_type,
            StoreType::Remote
        );
    }
}

//! Release version descriptors.
//!
//! A [`VersionDescriptor`] describes one published release: its numeric
//! version, display name, the screen resolutions it supports and where its
//! installer can be downloaded. Descriptors compare by version number only.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Result, UpdateError};

/// Keys a release payload must carry.
pub const REQUIRED_KEYS: [&str; 4] = ["version", "name", "target_resolutions", "url"];

/// Storage identifier some release feeds attach to each record. Ignored.
const STORAGE_ID_KEY: &str = "_id";

/// Version of the running application.
pub const CURRENT_VERSION: f64 = 1.411;

/// Display name of the running application.
pub const CURRENT_NAME: &str = "Gaello";

/// Screen resolution the running build targets.
pub const CURRENT_RESOLUTION: &str = "1920x1080";

/// Download page of the running application.
pub const CURRENT_URL: &str = "https://www.gaello.io/downloads";

/// Monotonically increasing release number (e.g. `1.411`).
///
/// Always finite, so the ordering is total.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseNumber(f64);

impl ReleaseNumber {
    /// # Errors
    ///
    /// Returns [`UpdateError::Schema`] for NaN or infinite values.
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(UpdateError::Schema(format!(
                "version must be a finite number, got {value}"
            )));
        }
        // Fold -0.0 into 0.0 so equality and ordering agree.
        Ok(Self(if value == 0.0 { 0.0 } else { value }))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for ReleaseNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReleaseNumber {}

impl PartialOrd for ReleaseNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReleaseNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for ReleaseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReleaseNumber {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| UpdateError::Schema(format!("invalid version number: {s:?}")))?;
        Self::new(value)
    }
}

impl Serialize for ReleaseNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

/// Release feeds send the version either as a number or a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for ReleaseNumber {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let parsed = match RawNumber::deserialize(deserializer)? {
            RawNumber::Number(n) => Self::new(n),
            RawNumber::Text(s) => s.parse(),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

#[derive(Deserialize)]
struct RawDescriptor {
    version: ReleaseNumber,
    name: String,
    target_resolutions: BTreeSet<String>,
    url: String,
}

/// Immutable description of one software release.
#[derive(Debug, Clone, Serialize)]
pub struct VersionDescriptor {
    version: ReleaseNumber,
    name: String,
    target_resolutions: BTreeSet<String>,
    url: String,
}

impl VersionDescriptor {
    pub fn new<I, S>(
        version: ReleaseNumber,
        name: impl Into<String>,
        resolutions: I,
        url: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version,
            name: name.into(),
            target_resolutions: resolutions.into_iter().map(Into::into).collect(),
            url: url.into(),
        }
    }

    /// Descriptor of the running application.
    pub fn current() -> Self {
        Self {
            version: ReleaseNumber(CURRENT_VERSION),
            name: CURRENT_NAME.to_owned(),
            target_resolutions: BTreeSet::from([CURRENT_RESOLUTION.to_owned()]),
            url: CURRENT_URL.to_owned(),
        }
    }

    /// Build a descriptor from a release payload, enforcing its schema.
    ///
    /// The payload must be an object carrying exactly the four
    /// [`REQUIRED_KEYS`] (a storage `_id` is tolerated), with a finite
    /// version and an absolute download URL.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Schema`] naming missing, unexpected or
    /// ill-typed keys.
    pub fn from_json_value(value: &serde_json::Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(UpdateError::Schema(
                "release payload must be a JSON object".into(),
            ));
        };

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| !object.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(UpdateError::Schema(format!(
                "missing keys: {}",
                missing.join(", ")
            )));
        }

        let unexpected: Vec<&str> = object
            .keys()
            .map(String::as_str)
            .filter(|key| *key != STORAGE_ID_KEY && !REQUIRED_KEYS.contains(key))
            .collect();
        if !unexpected.is_empty() {
            return Err(UpdateError::Schema(format!(
                "unexpected keys: {}",
                unexpected.join(", ")
            )));
        }

        let raw: RawDescriptor = serde_json::from_value(value.clone())
            .map_err(|e| UpdateError::Schema(format!("invalid release payload: {e}")))?;

        url::Url::parse(&raw.url)
            .map_err(|e| UpdateError::Schema(format!("invalid url {:?}: {e}", raw.url)))?;

        Ok(Self {
            version: raw.version,
            name: raw.name,
            target_resolutions: raw.target_resolutions,
            url: raw.url,
        })
    }

    pub fn version(&self) -> ReleaseNumber {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_resolutions(&self) -> &BTreeSet<String> {
        &self.target_resolutions
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether this release supports `resolution` (`WIDTHxHEIGHT`).
    pub fn supports_resolution(&self, resolution: &str) -> bool {
        self.target_resolutions.contains(resolution)
    }

    /// Compare against a dynamically typed value.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::TypeMismatch`] when `other` is not a
    /// [`VersionDescriptor`].
    pub fn try_compare(&self, other: &dyn Any) -> Result<Ordering> {
        other
            .downcast_ref::<VersionDescriptor>()
            .map(|other| self.version.cmp(&other.version))
            .ok_or_else(|| {
                UpdateError::TypeMismatch(
                    "cannot compare VersionDescriptor with a non-descriptor value".into(),
                )
            })
    }

    /// Canonical pretty JSON with exactly the four descriptor keys.
    pub fn to_canonical_json(&self) -> String {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        if self.serialize(&mut serializer).is_err() {
            return String::new();
        }
        String::from_utf8(out).unwrap_or_default()
    }
}

impl PartialEq for VersionDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl PartialOrd for VersionDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.version.cmp(&other.version))
    }
}

impl fmt::Display for VersionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_json())
    }
}

use std::{fmt::Display, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Represents the track ID.
///
/// IDs are assigned by the store, grow strictly and are never reused.
/// On the wire an ID is always a string holding the decimal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(pub i64);

impl Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TrackId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl Serialize for TrackId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TrackId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| de::Error::custom(format!("track id '{s}' is not an integer")))
    }
}

/// Represent a music track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
}

impl Track {
    pub fn new(id: TrackId, attrs: TrackAttrs) -> Self {
        Self {
            id,
            title: attrs.title,
        }
    }

    pub fn attrs(&self) -> TrackAttrs {
        TrackAttrs {
            title: self.title.clone(),
        }
    }
}

/// Fields a client supplies when creating a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackAttrs {
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_is_a_string_on_the_wire() -> anyhow::Result<()> {
        let track = Track {
            id: TrackId(42),
            title: "Blue in Green".to_string(),
        };

        let json = serde_json::to_value(&track)?;

        assert_eq!(json, serde_json::json!({"id": "42", "title": "Blue in Green"}));
        Ok(())
    }

    #[test]
    fn test_numeric_track_id_is_rejected() {
        let result = serde_json::from_str::<Track>(r#"{"id": 42, "title": "x"}"#);

        assert!(result.is_err());
    }

    #[test]
    fn test_track_id_from_str() {
        assert_eq!("17".parse::<TrackId>(), Ok(TrackId(17)));
        assert!("abc".parse::<TrackId>().is_err());
        assert!("".parse::<TrackId>().is_err());
    }
}

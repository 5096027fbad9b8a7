//! Route-set configuration model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// How operators may toggle a route set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteSetBehavior {
    /// Toggled only through the API; not listed for operators
    Hidden,
    /// Freely activated and deactivated
    #[default]
    Toggle,
    /// Deactivated only when another member of its group activates
    ActivateOnly,
}

/// Kind of routing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteType {
    /// Rename an input layer, keeping its mapping
    #[default]
    Reroute,
    /// Replace the device and mapping options
    Remap,
}

/// Lookahead behaviour of a mapped layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookaheadMode {
    #[default]
    None,
    Preload,
    WhenClear,
}

/// A mapped layer: which device plays it and how.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookahead: Option<LookaheadMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_name: Option<String>,
    /// Device-specific fields carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Partial mapping applied by a route.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookahead: Option<LookaheadMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One routing rule of a route set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMapping {
    /// Input layer; absent (or empty) for routes that create a new layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_mapped_layer: Option<String>,
    #[serde(default)]
    pub route_type: RouteType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remapping: Option<Remapping>,
}

impl RouteMapping {
    /// Input layer, treating an empty name as absent.
    pub fn input_layer(&self) -> Option<&str> {
        self.mapped_layer.as_deref().filter(|l| !l.is_empty())
    }

    /// Output layer, treating an empty name as absent.
    pub fn output_layer(&self) -> Option<&str> {
        self.output_mapped_layer.as_deref().filter(|l| !l.is_empty())
    }

    /// Device type and device id, when the route carries a complete
    /// replacement mapping.
    pub fn full_remap(&self) -> Option<(&str, &Remapping, &str)> {
        let device_type = self.device_type.as_deref()?;
        let remapping = self.remapping.as_ref()?;
        let device_id = remapping.device_id.as_deref()?;
        Some((device_type, remapping, device_id))
    }
}

/// Player id inside a device pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlayerId {
    Number(i64),
    Name(String),
}

impl From<i64> for PlayerId {
    fn from(n: i64) -> Self {
        PlayerId::Number(n)
    }
}

impl From<&str> for PlayerId {
    fn from(name: &str) -> Self {
        PlayerId::Name(name.to_string())
    }
}

impl std::str::FromStr for PlayerId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<i64>()
            .map(PlayerId::Number)
            .unwrap_or_else(|_| PlayerId::Name(s.to_string())))
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerId::Number(n) => write!(f, "{}", n),
            PlayerId::Name(s) => write!(f, "{}", s),
        }
    }
}

/// A pool player that is disabled while its route set is inactive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMembership {
    pub pool_name: String,
    pub player_id: PlayerId,
}

/// Named, toggleable bundle of routes and pool membership effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSet {
    pub name: String,
    #[serde(default)]
    pub active: bool,
    /// State restored by a route-set reset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_active: Option<bool>,
    #[serde(default)]
    pub behavior: RouteSetBehavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusivity_group: Option<String>,
    #[serde(default)]
    pub routes: Vec<RouteMapping>,
    #[serde(default)]
    pub ab_players: Vec<PoolMembership>,
    #[serde(rename = "_rank", default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<f64>,
}

impl RouteSet {
    /// Exclusivity group, treating an empty name as no group.
    pub fn group(&self) -> Option<&str> {
        self.exclusivity_group.as_deref().filter(|g| !g.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_route_set_wire_format() {
        let set: RouteSet = serde_json::from_value(json!({
            "name": "Main",
            "active": true,
            "behavior": "ACTIVATE_ONLY",
            "exclusivityGroup": "mains",
            "routes": [{
                "mappedLayer": "cam1",
                "outputMappedLayer": "cam1-out",
                "routeType": "REROUTE"
            }],
            "abPlayers": [{"poolName": "clips", "playerId": 2}]
        }))
        .unwrap();
        assert_eq!(set.behavior, RouteSetBehavior::ActivateOnly);
        assert_eq!(set.group(), Some("mains"));
        assert_eq!(set.routes[0].input_layer(), Some("cam1"));
        assert_eq!(set.ab_players[0].player_id, PlayerId::Number(2));
    }

    #[test]
    fn test_route_set_defaults() {
        let set: RouteSet = serde_json::from_value(json!({"name": "Bare"})).unwrap();
        assert!(!set.active);
        assert_eq!(set.behavior, RouteSetBehavior::Toggle);
        assert!(set.routes.is_empty());
        assert_eq!(set.group(), None);
    }

    #[test]
    fn test_mapping_keeps_device_specific_fields() {
        let mapping: Mapping = serde_json::from_value(json!({
            "device": "ATEM",
            "deviceId": "atem0",
            "index": 4
        }))
        .unwrap();
        assert_eq!(mapping.extra.get("index"), Some(&json!(4)));
        assert_eq!(
            serde_json::to_value(&mapping).unwrap(),
            json!({"device": "ATEM", "deviceId": "atem0", "index": 4})
        );
    }

    #[test]
    fn test_empty_layer_names_are_absent() {
        let route = RouteMapping {
            mapped_layer: Some(String::new()),
            output_mapped_layer: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(route.input_layer(), None);
        assert_eq!(route.output_layer(), None);
    }

    #[test]
    fn test_player_id_parse() {
        assert_eq!("3".parse::<PlayerId>().unwrap(), PlayerId::Number(3));
        assert_eq!("left".parse::<PlayerId>().unwrap(), PlayerId::Name("left".into()));
    }
}

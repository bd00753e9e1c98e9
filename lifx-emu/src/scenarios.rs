//! Fault-injection scenarios.
//!
//! Rule sets exist at five scopes (device, type, location, group, global).  Dispatch never reads
//! the raw scopes; it reads the per-device [MergedRules], computed field-by-field in precedence
//! order and cached until the next rule edit.

use lifx_proto::Serial;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// One scope's rule set.  A `None` field means "this scope has no opinion"; merge picks the
/// first scope that does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// request packet type -> drop probability [0, 1]
    pub drop_packets: Option<HashMap<u16, f64>>,
    /// request packet type -> response delay in seconds
    pub response_delays: Option<HashMap<u16, f64>>,
    /// response packet types whose payloads get truncated
    pub malformed_packets: Option<HashSet<u16>>,
    /// response packet types whose payloads get replaced with 0xFF
    pub invalid_field_values: Option<HashSet<u16>>,
    /// response packet types whose multi-packet lists get truncated
    pub partial_responses: Option<HashSet<u16>>,
    /// (major, minor) reported instead of the device's real firmware version
    pub firmware_version: Option<(u16, u16)>,
    /// reply StateUnhandled (instead of silence) to unregistered packet types
    pub send_unhandled: Option<bool>,
}

impl ScenarioConfig {
    pub fn is_empty(&self) -> bool {
        *self == ScenarioConfig::default()
    }
}

/// The per-device combination of all five scopes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedRules {
    pub drop_packets: HashMap<u16, f64>,
    pub response_delays: HashMap<u16, f64>,
    pub malformed_packets: HashSet<u16>,
    pub invalid_field_values: HashSet<u16>,
    pub partial_responses: HashSet<u16>,
    pub firmware_version: Option<(u16, u16)>,
    pub send_unhandled: bool,
}

impl MergedRules {
    fn from_scopes(scopes: &[&ScenarioConfig]) -> MergedRules {
        MergedRules {
            drop_packets: pick(scopes, |c| c.drop_packets.as_ref()),
            response_delays: pick(scopes, |c| c.response_delays.as_ref()),
            malformed_packets: pick(scopes, |c| c.malformed_packets.as_ref()),
            invalid_field_values: pick(scopes, |c| c.invalid_field_values.as_ref()),
            partial_responses: pick(scopes, |c| c.partial_responses.as_ref()),
            firmware_version: scopes.iter().find_map(|c| c.firmware_version),
            send_unhandled: scopes
                .iter()
                .find_map(|c| c.send_unhandled)
                .unwrap_or(true),
        }
    }
}

fn pick<T: Clone + Default>(
    scopes: &[&ScenarioConfig],
    f: impl Fn(&ScenarioConfig) -> Option<&T>,
) -> T {
    scopes.iter().find_map(|c| f(c)).cloned().unwrap_or_default()
}

/// Identifies one rule set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    /// One device, by serial
    Device(Serial),
    /// A device class: color / multizone / extended_multizone / matrix / hev / infrared
    Type(String),
    /// All devices whose location label matches
    Location(String),
    /// All devices whose group label matches
    Group(String),
}

impl Scope {
    pub fn describe(&self) -> String {
        match self {
            Scope::Global => "global".into(),
            Scope::Device(s) => format!("device:{}", s),
            Scope::Type(t) => format!("type:{}", t),
            Scope::Location(l) => format!("location:{}", l),
            Scope::Group(g) => format!("group:{}", g),
        }
    }
}

/// Everything needed to resolve a device against the five scopes.
#[derive(Debug, Clone)]
pub struct DeviceScopeKeys {
    pub serial: Serial,
    pub type_key: Option<&'static str>,
    pub location: String,
    pub group: String,
}

/// The serializable scope store; this is the schema of the scenarios persistence file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioStore {
    pub global: Option<ScenarioConfig>,
    pub device: HashMap<String, ScenarioConfig>,
    #[serde(rename = "type")]
    pub typ: HashMap<String, ScenarioConfig>,
    pub location: HashMap<String, ScenarioConfig>,
    pub group: HashMap<String, ScenarioConfig>,
}

/// Scope storage plus the per-device merged-rule cache.
///
/// The cache is a read-mostly map: entries are filled lazily on first dispatch for a device and
/// the whole map is evicted on any rule edit (or when a device's group/location/type changes).
#[derive(Default)]
pub struct ScenarioEngine {
    store: RwLock<ScenarioStore>,
    cache: Mutex<HashMap<Serial, Arc<MergedRules>>>,
}

impl ScenarioEngine {
    pub fn new() -> ScenarioEngine {
        ScenarioEngine::default()
    }

    pub fn with_store(store: ScenarioStore) -> ScenarioEngine {
        ScenarioEngine {
            store: RwLock::new(store),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn set(&self, scope: &Scope, config: ScenarioConfig) {
        {
            let mut store = self.store.write().unwrap();
            match scope {
                Scope::Global => store.global = Some(config),
                Scope::Device(serial) => {
                    store.device.insert(serial.to_string(), config);
                }
                Scope::Type(key) => {
                    store.typ.insert(key.clone(), config);
                }
                Scope::Location(key) => {
                    store.location.insert(key.clone(), config);
                }
                Scope::Group(key) => {
                    store.group.insert(key.clone(), config);
                }
            }
        }
        self.invalidate();
    }

    /// Removes a rule set.  Returns false when nothing was stored at that scope.
    pub fn clear(&self, scope: &Scope) -> bool {
        let removed = {
            let mut store = self.store.write().unwrap();
            match scope {
                Scope::Global => store.global.take().is_some(),
                Scope::Device(serial) => store.device.remove(&serial.to_string()).is_some(),
                Scope::Type(key) => store.typ.remove(key).is_some(),
                Scope::Location(key) => store.location.remove(key).is_some(),
                Scope::Group(key) => store.group.remove(key).is_some(),
            }
        };
        if removed {
            self.invalidate();
        }
        removed
    }

    pub fn get(&self, scope: &Scope) -> Option<ScenarioConfig> {
        let store = self.store.read().unwrap();
        match scope {
            Scope::Global => store.global.clone(),
            Scope::Device(serial) => store.device.get(&serial.to_string()).cloned(),
            Scope::Type(key) => store.typ.get(key).cloned(),
            Scope::Location(key) => store.location.get(key).cloned(),
            Scope::Group(key) => store.group.get(key).cloned(),
        }
    }

    /// A copy of the whole store, for persistence and the management plane.
    pub fn snapshot(&self) -> ScenarioStore {
        self.store.read().unwrap().clone()
    }

    /// Clears all cached merged rules.  Called on every rule edit and whenever a device's
    /// type, location or group changes.
    pub fn invalidate(&self) {
        self.cache.lock().unwrap().clear();
    }

    /// The merged rule set for one device, from cache when warm.
    pub fn resolve(&self, keys: &DeviceScopeKeys) -> Arc<MergedRules> {
        if let Some(rules) = self.cache.lock().unwrap().get(&keys.serial) {
            return Arc::clone(rules);
        }

        let merged = {
            let store = self.store.read().unwrap();
            let empty = ScenarioConfig::default();
            // Precedence: device > type > location > group > global
            let scopes: Vec<&ScenarioConfig> = vec![
                store
                    .device
                    .get(&keys.serial.to_string())
                    .unwrap_or(&empty),
                keys.type_key
                    .and_then(|t| store.typ.get(t))
                    .unwrap_or(&empty),
                store.location.get(&keys.location).unwrap_or(&empty),
                store.group.get(&keys.group).unwrap_or(&empty),
                store.global.as_ref().unwrap_or(&empty),
            ];
            Arc::new(MergedRules::from_scopes(&scopes))
        };

        self.cache
            .lock()
            .unwrap()
            .insert(keys.serial, Arc::clone(&merged));
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(serial: &str) -> DeviceScopeKeys {
        DeviceScopeKeys {
            serial: serial.parse().unwrap(),
            type_key: Some("color"),
            location: "Home".into(),
            group: "Lights".into(),
        }
    }

    fn drops(pairs: &[(u16, f64)]) -> Option<HashMap<u16, f64>> {
        Some(pairs.iter().copied().collect())
    }

    #[test]
    fn defaults_when_no_scope_set() {
        let engine = ScenarioEngine::new();
        let rules = engine.resolve(&keys("d073d5000001"));
        assert!(rules.drop_packets.is_empty());
        assert!(rules.send_unhandled);
        assert!(rules.firmware_version.is_none());
    }

    #[test]
    fn device_scope_beats_global() {
        let engine = ScenarioEngine::new();
        engine.set(
            &Scope::Global,
            ScenarioConfig {
                drop_packets: drops(&[(101, 1.0)]),
                ..Default::default()
            },
        );
        engine.set(
            &Scope::Device("d073d5000001".parse().unwrap()),
            ScenarioConfig {
                drop_packets: drops(&[(101, 0.0)]),
                ..Default::default()
            },
        );

        let rules = engine.resolve(&keys("d073d5000001"));
        assert_eq!(rules.drop_packets[&101], 0.0);

        // Another device only sees the global rule
        let rules = engine.resolve(&keys("d073d5000002"));
        assert_eq!(rules.drop_packets[&101], 1.0);
    }

    #[test]
    fn merge_is_field_level() {
        let engine = ScenarioEngine::new();
        engine.set(
            &Scope::Global,
            ScenarioConfig {
                drop_packets: drops(&[(101, 0.5)]),
                firmware_version: Some((2, 80)),
                ..Default::default()
            },
        );
        // The device scope only defines delays; drops and firmware still come from global.
        engine.set(
            &Scope::Device("d073d5000001".parse().unwrap()),
            ScenarioConfig {
                response_delays: Some([(102u16, 0.25f64)].into_iter().collect()),
                ..Default::default()
            },
        );

        let rules = engine.resolve(&keys("d073d5000001"));
        assert_eq!(rules.drop_packets[&101], 0.5);
        assert_eq!(rules.response_delays[&102], 0.25);
        assert_eq!(rules.firmware_version, Some((2, 80)));
    }

    #[test]
    fn precedence_runs_through_all_five_scopes() {
        let engine = ScenarioEngine::new();
        engine.set(
            &Scope::Global,
            ScenarioConfig {
                send_unhandled: Some(false),
                ..Default::default()
            },
        );
        engine.set(
            &Scope::Group("Lights".into()),
            ScenarioConfig {
                firmware_version: Some((1, 1)),
                ..Default::default()
            },
        );
        engine.set(
            &Scope::Location("Home".into()),
            ScenarioConfig {
                firmware_version: Some((2, 2)),
                ..Default::default()
            },
        );
        engine.set(
            &Scope::Type("color".into()),
            ScenarioConfig {
                firmware_version: Some((3, 3)),
                ..Default::default()
            },
        );

        let rules = engine.resolve(&keys("d073d5000001"));
        // type beats location beats group; global still supplies send_unhandled
        assert_eq!(rules.firmware_version, Some((3, 3)));
        assert!(!rules.send_unhandled);
    }

    #[test]
    fn cache_invalidated_on_edit() {
        let engine = ScenarioEngine::new();
        let k = keys("d073d5000001");

        let rules = engine.resolve(&k);
        assert!(rules.drop_packets.is_empty());

        engine.set(
            &Scope::Global,
            ScenarioConfig {
                drop_packets: drops(&[(2, 1.0)]),
                ..Default::default()
            },
        );
        let rules = engine.resolve(&k);
        assert_eq!(rules.drop_packets[&2], 1.0);

        engine.clear(&Scope::Global);
        let rules = engine.resolve(&k);
        assert!(rules.drop_packets.is_empty());
    }

    #[test]
    fn clear_missing_scope_reports_false() {
        let engine = ScenarioEngine::new();
        assert!(!engine.clear(&Scope::Type("matrix".into())));
    }

    #[test]
    fn store_roundtrips_through_json() {
        let engine = ScenarioEngine::new();
        engine.set(
            &Scope::Device("d073d5000001".parse().unwrap()),
            ScenarioConfig {
                partial_responses: Some([506].into_iter().collect()),
                ..Default::default()
            },
        );
        let json = serde_json::to_string(&engine.snapshot()).unwrap();
        let store: ScenarioStore = serde_json::from_str(&json).unwrap();
        let engine = ScenarioEngine::with_store(store);
        let rules = engine.resolve(&keys("d073d5000001"));
        assert!(rules.partial_responses.contains(&506));
    }
}

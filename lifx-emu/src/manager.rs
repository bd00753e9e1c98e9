//! The live device collection and request routing.
//!
//! A [Device] wraps one state record behind a mutex; handler execution for a device runs to
//! completion under that lock, which is what serializes concurrent requests to the same device.
//! The manager owns the collection and resolves a request header to its target devices.

use crate::events::{EmulatorEvent, EventBus};
use crate::scenarios::DeviceScopeKeys;
use crate::state::DeviceState;
use lifx_proto::Serial;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// One live emulated device.
#[derive(Debug)]
pub struct Device {
    state: Mutex<DeviceState>,
}

impl Device {
    pub fn new(state: DeviceState) -> Device {
        Device {
            state: Mutex::new(state),
        }
    }

    pub fn serial(&self) -> Serial {
        self.state.lock().unwrap().serial
    }

    /// A point-in-time copy for the management plane and persistence.
    pub fn snapshot(&self) -> DeviceState {
        self.state.lock().unwrap().clone()
    }

    /// Runs `f` with exclusive access to the state.  Keep the closure free of I/O.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// The keys this device resolves scenario scopes under.
    pub fn scope_keys(&self) -> DeviceScopeKeys {
        let st = self.state.lock().unwrap();
        DeviceScopeKeys {
            serial: st.serial,
            type_key: st.caps.type_key(),
            location: st.location.label.0.clone(),
            group: st.group.label.0.clone(),
        }
    }
}

/// The collection of live devices.
pub struct DeviceManager {
    devices: RwLock<HashMap<Serial, Arc<Device>>>,
    /// The server's bound port, pushed into every device so StateService advertises it.
    /// Zero until the server binds.
    port: AtomicU32,
    events: EventBus,
}

impl DeviceManager {
    pub fn new(events: EventBus) -> DeviceManager {
        DeviceManager {
            devices: RwLock::new(HashMap::new()),
            port: AtomicU32::new(0),
            events,
        }
    }

    /// Records the server's port and rewrites it into every device already present.
    pub fn set_port(&self, port: u16) {
        self.port.store(u32::from(port), Ordering::Relaxed);
        for device in self.devices.read().unwrap().values() {
            device.with_state(|st| st.port = u32::from(port));
        }
    }

    /// Adds a device, stamping the server port onto it.  Replaces any device with the same
    /// serial.
    pub fn add(&self, mut state: DeviceState) -> Arc<Device> {
        let port = self.port.load(Ordering::Relaxed);
        if port != 0 {
            state.port = port;
        }
        let serial = state.serial;
        let device = Arc::new(Device::new(state));
        self.devices
            .write()
            .unwrap()
            .insert(serial, Arc::clone(&device));
        self.events.publish(EmulatorEvent::DeviceAdded { serial });
        device
    }

    pub fn remove(&self, serial: Serial) -> bool {
        let removed = self.devices.write().unwrap().remove(&serial).is_some();
        if removed {
            self.events.publish(EmulatorEvent::DeviceRemoved { serial });
        }
        removed
    }

    pub fn get(&self, serial: Serial) -> Option<Arc<Device>> {
        self.devices.read().unwrap().get(&serial).cloned()
    }

    pub fn snapshot(&self, serial: Serial) -> Option<DeviceState> {
        self.get(serial).map(|d| d.snapshot())
    }

    pub fn len(&self) -> usize {
        self.devices.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().unwrap().is_empty()
    }

    pub fn serials(&self) -> Vec<Serial> {
        self.devices.read().unwrap().keys().copied().collect()
    }

    pub fn all(&self) -> Vec<Arc<Device>> {
        self.devices.read().unwrap().values().cloned().collect()
    }

    /// Routes a request header to its target devices.
    ///
    /// `tagged=1` or an all-zero target means broadcast: every device handles the request.
    /// Otherwise exactly the device whose serial matches the low 6 bytes of `target`; an
    /// unknown target resolves to nothing and the request is silently dropped.
    pub fn resolve_targets(&self, tagged: bool, target: u64) -> Vec<Arc<Device>> {
        if tagged || target == 0 {
            self.all()
        } else {
            self.get(Serial::from_target(target)).into_iter().collect()
        }
    }
}

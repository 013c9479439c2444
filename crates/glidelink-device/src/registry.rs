//! The fixed set of device slots and their lifecycle.
//!
//! A [`DeviceRegistry`] is built once through [`RegistryBuilder`] and then
//! driven by the application's control loop: [`startup`] with the
//! configured devices, [`tick_all`] and [`check_link_timeouts`] at a fixed
//! cadence, [`restart`] when the configuration changes, [`shutdown`] on
//! exit.
//!
//! [`startup`]: DeviceRegistry::startup
//! [`tick_all`]: DeviceRegistry::tick_all
//! [`check_link_timeouts`]: DeviceRegistry::check_link_timeouts
//! [`restart`]: DeviceRegistry::restart
//! [`shutdown`]: DeviceRegistry::shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use glidelink_core::config::DeviceConfig;
use glidelink_core::driver::DriverDescriptor;
use glidelink_core::error::{Error, Result};
use glidelink_core::settings::Setting;
use glidelink_core::transport::PortOpener;
use glidelink_core::types::{DerivedInfo, NavInfo};
use glidelink_line_io::IoConfig;
use glidelink_transport::SystemPortOpener;

use crate::blackboard::Blackboard;
use crate::drivers::{GENERIC, NMEA_OUT};
use crate::slot::DeviceSlot;

/// Number of slots when the builder is not told otherwise.
pub const DEFAULT_SLOT_COUNT: usize = 2;

// ---------------------------------------------------------------------------
// Startup report
// ---------------------------------------------------------------------------

/// What startup did with one slot's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    Opened { driver: &'static str },
    /// No configuration, or a port kind that is not usable.
    Disabled,
    /// Claims the same port as the earlier slot `with`; not opened.
    Overlap { with: usize },
    UnknownDriver(String),
    OpenFailed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    /// One entry per slot, in index order.
    pub outcomes: Vec<SlotOutcome>,
    /// The slot every other slot forwards its lines to.
    pub nmea_out: Option<usize>,
}

impl StartupReport {
    pub fn opened(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, SlotOutcome::Opened { .. }))
            .count()
    }

    /// The slots that were configured but did not open, as errors.
    pub fn failures(&self) -> Vec<Error> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(slot, outcome)| match outcome {
                SlotOutcome::Overlap { with } => Some(Error::Overlap { slot, with: *with }),
                SlotOutcome::UnknownDriver(name) => Some(Error::InvalidParameter(format!(
                    "slot {slot}: unknown driver {name:?}"
                ))),
                SlotOutcome::OpenFailed(reason) => {
                    Some(Error::OpenFailed(format!("slot {slot}: {reason}")))
                }
                SlotOutcome::Opened { .. } | SlotOutcome::Disabled => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Fluent builder for [`DeviceRegistry`].
///
/// The catalog always contains [`GENERIC`] and [`NMEA_OUT`]; instrument
/// drivers are added with [`driver`](Self::driver). Ports are opened
/// through [`SystemPortOpener`] unless another opener is given.
pub struct RegistryBuilder {
    slot_count: usize,
    validate_checksum: bool,
    poll_timeout: Duration,
    drivers: Vec<&'static DriverDescriptor>,
    opener: Option<Arc<dyn PortOpener>>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        RegistryBuilder {
            slot_count: DEFAULT_SLOT_COUNT,
            validate_checksum: true,
            poll_timeout: IoConfig::default().poll_timeout,
            drivers: vec![&GENERIC, &NMEA_OUT],
            opener: None,
        }
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots (default: 2).
    pub fn slots(mut self, count: usize) -> Self {
        self.slot_count = count;
        self
    }

    /// Drop lines with a missing or wrong checksum (default: on).
    pub fn validate_checksums(mut self, enabled: bool) -> Self {
        self.validate_checksum = enabled;
        self
    }

    /// How long one idle read waits in the receive loops.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Add a driver to the catalog, replacing one with the same name.
    pub fn driver(mut self, descriptor: &'static DriverDescriptor) -> Self {
        self.drivers.retain(|d| d.name != descriptor.name);
        self.drivers.push(descriptor);
        self
    }

    pub fn drivers(self, descriptors: impl IntoIterator<Item = &'static DriverDescriptor>) -> Self {
        descriptors.into_iter().fold(self, Self::driver)
    }

    pub fn port_opener(mut self, opener: Arc<dyn PortOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn build(self) -> Result<DeviceRegistry> {
        if self.slot_count == 0 {
            return Err(Error::InvalidParameter(
                "a registry needs at least one slot".into(),
            ));
        }

        let blackboard = Arc::new(Blackboard::new(self.slot_count));
        let io_config = IoConfig {
            poll_timeout: self.poll_timeout,
            ..IoConfig::default()
        };
        let slots = (0..self.slot_count)
            .map(|index| {
                Arc::new(DeviceSlot::new(
                    index,
                    blackboard.clone(),
                    io_config.clone(),
                    self.validate_checksum,
                ))
            })
            .collect();

        Ok(DeviceRegistry {
            slots,
            blackboard,
            drivers: self.drivers,
            opener: self
                .opener
                .unwrap_or_else(|| Arc::new(SystemPortOpener::new())),
            configs: Mutex::new(Vec::new()),
        })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct DeviceRegistry {
    slots: Vec<Arc<DeviceSlot>>,
    blackboard: Arc<Blackboard>,
    drivers: Vec<&'static DriverDescriptor>,
    opener: Arc<dyn PortOpener>,
    /// Configuration of the last startup, for restart.
    configs: Mutex<Vec<DeviceConfig>>,
}

impl DeviceRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn slots(&self) -> &[Arc<DeviceSlot>] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Arc<DeviceSlot>> {
        self.slots.get(index)
    }

    pub fn blackboard(&self) -> &Arc<Blackboard> {
        &self.blackboard
    }

    /// The navigation state of every slot combined.
    pub fn merged(&self) -> NavInfo {
        self.blackboard.merged()
    }

    /// The driver catalog.
    pub fn drivers(&self) -> &[&'static DriverDescriptor] {
        &self.drivers
    }

    pub fn lookup_driver(&self, name: &str) -> Option<&'static DriverDescriptor> {
        self.drivers
            .iter()
            .copied()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Open every slot from `configs`, in index order.
    ///
    /// A configuration whose port overlaps an earlier usable one is
    /// skipped; an earlier slot whose open failed still holds its claim.
    /// The first slot opened with an NMEA-out driver receives every line
    /// the other slots read. Slots still open from a previous startup are
    /// closed first.
    pub async fn startup(&self, configs: &[DeviceConfig]) -> StartupReport {
        self.shutdown().await;
        *self.configs.lock().await = configs.to_vec();

        if configs.len() > self.slots.len() {
            warn!(
                configured = configs.len(),
                slots = self.slots.len(),
                "more devices configured than slots, ignoring the rest"
            );
        }

        let mut report = StartupReport::default();
        let mut claimed: Vec<(usize, &DeviceConfig)> = Vec::new();

        for slot in &self.slots {
            let index = slot.index();
            let outcome = match configs.get(index) {
                None => SlotOutcome::Disabled,
                Some(config) if !config.port.is_available() => SlotOutcome::Disabled,
                Some(config) => {
                    let earlier = claimed.iter().find(|(_, c)| c.port.overlaps(&config.port));
                    match earlier {
                        Some(&(with, _)) => {
                            warn!(slot = index, with, port = %config.port, "port already in use, slot disabled");
                            SlotOutcome::Overlap { with }
                        }
                        None => {
                            claimed.push((index, config));
                            self.open_slot(slot, config).await
                        }
                    }
                }
            };

            if report.nmea_out.is_none()
                && matches!(outcome, SlotOutcome::Opened { .. })
                && slot.descriptor().is_some_and(|d| d.supports_nmea_out())
            {
                report.nmea_out = Some(index);
            }
            report.outcomes.push(outcome);
        }

        if let Some(out) = report.nmea_out {
            self.wire_pass_through(out).await;
        }

        info!(opened = report.opened(), slots = self.slots.len(), "device startup complete");
        report
    }

    async fn open_slot(&self, slot: &DeviceSlot, config: &DeviceConfig) -> SlotOutcome {
        let Some(descriptor) = self.lookup_driver(&config.driver) else {
            warn!(slot = slot.index(), driver = %config.driver, "unknown driver");
            return SlotOutcome::UnknownDriver(config.driver.clone());
        };

        let transport = match self.opener.open_port(&config.port).await {
            Ok(transport) => transport,
            Err(e) => {
                warn!(slot = slot.index(), port = %config.port, error = %e, "cannot open port");
                return SlotOutcome::OpenFailed(open_failure(e));
            }
        };

        match slot.open(config, transport, descriptor).await {
            Ok(()) => SlotOutcome::Opened {
                driver: descriptor.name,
            },
            Err(e) => SlotOutcome::OpenFailed(open_failure(e)),
        }
    }

    async fn wire_pass_through(&self, out: usize) {
        let Some(target) = self.slots.get(out).map(|s| s.outlet()) else {
            return;
        };
        for slot in self
            .slots
            .iter()
            .filter(|s| s.is_open() && !s.outlet().same_target(&target))
        {
            if let Err(e) = slot.set_pipe_to(Some(target.clone())).await {
                debug!(slot = slot.index(), error = %e, "pass-through not set");
            }
        }
        info!(slot = out, "forwarding received lines to NMEA output");
    }

    /// Close every slot.
    pub async fn shutdown(&self) {
        for slot in &self.slots {
            if let Err(e) = slot.close().await {
                warn!(slot = slot.index(), error = %e, "slot not closed");
            }
        }
    }

    /// Close every slot and start again with the last configuration.
    pub async fn restart(&self) -> StartupReport {
        info!("restarting devices");
        let configs = self.configs.lock().await.clone();
        self.startup(&configs).await
    }

    /// The first open slot matching `predicate`.
    pub fn find_by_capability(
        &self,
        predicate: impl Fn(&DeviceSlot) -> bool,
    ) -> Option<&Arc<DeviceSlot>> {
        self.slots
            .iter()
            .find(|slot| slot.is_open() && predicate(slot))
    }

    /// The first open slot running driver `name`.
    pub fn find_by_name(&self, name: &str) -> Option<&Arc<DeviceSlot>> {
        self.find_by_capability(|slot| {
            slot.descriptor()
                .is_some_and(|d| d.name.eq_ignore_ascii_case(name))
        })
    }

    /// Push `setting` to every open slot. Busy slots are skipped.
    pub async fn put_all(&self, setting: &Setting, derived: &DerivedInfo) {
        for slot in self.slots.iter().filter(|s| s.is_open()) {
            match slot.put(setting.clone(), derived).await {
                Ok(()) => {}
                Err(Error::Busy) => debug!(slot = slot.index(), "busy, setting not pushed"),
                Err(e) => warn!(slot = slot.index(), setting = setting.name(), error = %e, "setting push failed"),
            }
        }
    }

    /// Hand the merged navigation state to every slot's driver.
    pub async fn tick_all(&self, derived: &DerivedInfo) {
        let basic = self.blackboard.merged();
        for slot in &self.slots {
            slot.on_tick(&basic, derived).await;
        }
    }

    /// Notify every open, idle slot that has been silent for `timeout`.
    /// Returns the indices of the notified slots.
    pub async fn check_link_timeouts(&self, timeout: Duration) -> Vec<usize> {
        let mut expired = Vec::new();
        for slot in &self.slots {
            if !slot.is_open() || slot.is_busy() || slot.is_alive(timeout) {
                continue;
            }
            debug!(slot = slot.index(), "link timeout");
            slot.on_link_timeout().await;
            expired.push(slot.index());
        }
        expired
    }
}

fn open_failure(error: Error) -> String {
    match error {
        Error::OpenFailed(reason) => reason,
        other => other.to_string(),
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("slots", &self.slots)
            .field("drivers", &self.drivers.iter().map(|d| d.name).collect::<Vec<_>>())
            .finish()
    }
}

//! One device slot: a transport, a driver, and the receive loop between
//! them.
//!
//! A slot is Closed until [`DeviceSlot::open`] hands it a transport and a
//! driver descriptor. While open it streams: a line IO task owns the
//! transport and runs a [`SlotSession`] for every received line and every
//! outbound request. A bulk operation (declare, flight list, download)
//! marks the slot busy, stops the task to get the transport back, runs the
//! exchange, and spawns a new task with the same session. A slot is never
//! left busy; if the transport did not survive the exchange the slot is
//! closed instead.
//!
//! All methods take `&self`, so a registry can share slots between a
//! control loop and long-running bulk operations. Requests that arrive
//! while the slot is busy fail with [`Error::Busy`] instead of waiting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use glidelink_core::config::DeviceConfig;
use glidelink_core::driver::DriverDescriptor;
use glidelink_core::error::{Error, Result};
use glidelink_core::progress::ProgressSink;
use glidelink_core::settings::{ExternalSettings, Setting};
use glidelink_core::transport::Transport;
use glidelink_core::types::{Declaration, DerivedInfo, NavInfo, RadioFrequency, RecordedFlight};
use glidelink_line_io::{IoConfig, LineIo, spawn_line_task};

use crate::blackboard::Blackboard;
use crate::dispatcher::LineDispatcher;
use crate::flarm;
use crate::outlet::Outlet;
use crate::session::{SlotCommand, SlotSession};

// ---------------------------------------------------------------------------
// Bulk operations
// ---------------------------------------------------------------------------

/// An exclusive exchange that needs the receive loop stopped.
#[derive(Debug, Clone, Copy)]
pub enum BulkOperation<'a> {
    Declare(&'a Declaration),
    ReadFlightList,
    DownloadFlight(&'a RecordedFlight),
}

impl BulkOperation<'_> {
    /// What the operation does, for error messages.
    pub fn action(&self) -> &'static str {
        match self {
            BulkOperation::Declare(_) => "declare",
            BulkOperation::ReadFlightList => "read flight list",
            BulkOperation::DownloadFlight(_) => "download flight",
        }
    }

    fn progress_text(&self, device: &str) -> String {
        match self {
            BulkOperation::Declare(_) => format!("Declaring to {device}"),
            BulkOperation::ReadFlightList => format!("Reading flight list from {device}"),
            BulkOperation::DownloadFlight(_) => format!("Downloading flight from {device}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    Declared,
    FlightList(Vec<RecordedFlight>),
    Flight(Vec<u8>),
}

// ---------------------------------------------------------------------------
// DeviceSlot
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Attached {
    descriptor: &'static DriverDescriptor,
    config: DeviceConfig,
}

pub struct DeviceSlot {
    index: usize,
    blackboard: Arc<Blackboard>,
    io_config: IoConfig,
    validate_checksum: bool,
    io: Mutex<Option<LineIo<SlotSession>>>,
    attached: RwLock<Option<Attached>>,
    busy: AtomicBool,
    ticker: AtomicBool,
    outlet: Outlet,
}

impl DeviceSlot {
    pub fn new(
        index: usize,
        blackboard: Arc<Blackboard>,
        io_config: IoConfig,
        validate_checksum: bool,
    ) -> Self {
        DeviceSlot {
            index,
            blackboard,
            io_config,
            validate_checksum,
            io: Mutex::new(None),
            attached: RwLock::new(None),
            busy: AtomicBool::new(false),
            ticker: AtomicBool::new(false),
            outlet: Outlet::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn attached(&self) -> Option<Attached> {
        self.attached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_attached(&self, attached: Option<Attached>) {
        *self.attached.write().unwrap_or_else(PoisonError::into_inner) = attached;
    }

    /// The driver descriptor of the open slot.
    pub fn descriptor(&self) -> Option<&'static DriverDescriptor> {
        self.attached().map(|a| a.descriptor)
    }

    /// The configuration the slot was opened with.
    pub fn config(&self) -> Option<DeviceConfig> {
        self.attached().map(|a| a.config)
    }

    pub fn is_open(&self) -> bool {
        self.attached().is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// This slot's pass-through target handle.
    pub fn outlet(&self) -> Outlet {
        self.outlet.clone()
    }

    /// A copy of this slot's blackboard record.
    pub fn nav_info(&self) -> NavInfo {
        self.blackboard.slot(self.index).unwrap_or_default()
    }

    /// Whether a valid line arrived within `timeout`.
    pub fn is_alive(&self, timeout: Duration) -> bool {
        self.nav_info()
            .is_alive(self.blackboard.now(), timeout.as_secs_f64())
    }

    /// Whether FLARM status sentences have been seen on this channel.
    pub fn flarm_detected(&self) -> bool {
        self.nav_info().flarm.available
    }

    pub fn can_declare(&self) -> bool {
        self.descriptor().is_some_and(|d| d.supports_declare()) || self.flarm_detected()
    }

    pub fn is_logger(&self) -> bool {
        self.descriptor().is_some_and(|d| d.is_logger())
    }

    fn io_config_for(&self, descriptor: &DriverDescriptor) -> IoConfig {
        IoConfig {
            read_enabled: descriptor.factory.is_some(),
            ..self.io_config.clone()
        }
    }

    // -----------------------------------------------------------------------
    // Open / Close
    // -----------------------------------------------------------------------

    /// Bind `transport` and a fresh driver from `descriptor` to this slot
    /// and start streaming.
    ///
    /// On failure the transport is closed and the slot stays closed.
    pub async fn open(
        &self,
        config: &DeviceConfig,
        mut transport: Box<dyn Transport>,
        descriptor: &'static DriverDescriptor,
    ) -> Result<()> {
        let mut io = self.io.lock().await;
        if io.is_some() {
            return Err(Error::InvalidParameter(format!(
                "slot {} is already open",
                self.index
            )));
        }

        let mut driver = descriptor.create(config);
        let opened = match driver.as_mut() {
            Some(driver) => driver.open(&mut *transport).await,
            None => Ok(()),
        };
        let opened = opened.and_then(|()| {
            if transport.is_connected() {
                Ok(())
            } else {
                Err(Error::NotConnected)
            }
        });
        if let Err(e) = opened {
            warn!(slot = self.index, driver = descriptor.name, error = %e, "device open failed");
            if let Err(close_error) = transport.close().await {
                debug!(slot = self.index, error = %close_error, "closing failed port");
            }
            return Err(Error::OpenFailed(format!("{}: {e}", descriptor.display_name)));
        }

        self.blackboard.reset_slot(self.index);
        self.ticker.store(false, Ordering::Relaxed);

        let session = SlotSession::new(
            self.index,
            driver,
            LineDispatcher::new(self.validate_checksum),
            self.blackboard.clone(),
        );
        let line_io = spawn_line_task(transport, self.io_config_for(descriptor), session);
        self.outlet.attach(line_io.writer());
        *io = Some(line_io);
        self.set_attached(Some(Attached {
            descriptor,
            config: config.clone(),
        }));

        info!(slot = self.index, driver = descriptor.name, port = %config.port, "device opened");
        Ok(())
    }

    /// Stop streaming and release the driver and transport.
    ///
    /// Closing a closed slot only clears its blackboard record again.
    pub async fn close(&self) -> Result<()> {
        if self.is_busy() {
            return Err(Error::Busy);
        }
        let mut io = self.io.lock().await;
        self.release(io.take()).await;
        Ok(())
    }

    async fn release(&self, io: Option<LineIo<SlotSession>>) {
        self.outlet.detach();
        if let Some(line_io) = io {
            match line_io.shutdown().await {
                Ok((mut transport, session)) => {
                    drop(session);
                    if let Err(e) = transport.close().await {
                        warn!(slot = self.index, error = %e, "closing port failed");
                    }
                }
                Err(e) => error!(slot = self.index, error = %e, "receive loop did not stop cleanly"),
            }
            info!(slot = self.index, "device closed");
        }
        self.set_attached(None);
        self.blackboard.reset_slot(self.index);
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Push `setting` unless the instrument already holds it.
    ///
    /// Succeeds without writing when the slot is closed or has no driver.
    pub async fn put(&self, setting: Setting, derived: &DerivedInfo) -> Result<()> {
        if self.is_busy() {
            return Err(Error::Busy);
        }
        let io = self.io.lock().await;
        let Some(line_io) = io.as_ref() else {
            return Ok(());
        };
        line_io
            .request(|reply| SlotCommand::Put {
                setting,
                derived: derived.clone(),
                reply,
            })
            .await?
    }

    pub async fn put_mac_cready(&self, value: f64) -> Result<()> {
        self.put(Setting::MacCready(value), &DerivedInfo::default())
            .await
    }

    pub async fn put_bugs(&self, value: f64) -> Result<()> {
        self.put(Setting::Bugs(value), &DerivedInfo::default()).await
    }

    pub async fn put_ballast(&self, fraction: f64) -> Result<()> {
        self.put(Setting::BallastFraction(fraction), &DerivedInfo::default())
            .await
    }

    pub async fn put_qnh(&self, qnh: f64, derived: &DerivedInfo) -> Result<()> {
        self.put(Setting::Qnh(qnh), derived).await
    }

    pub async fn put_volume(&self, volume: u8) -> Result<()> {
        self.put(Setting::Volume(volume), &DerivedInfo::default())
            .await
    }

    pub async fn put_active_frequency(&self, frequency: RadioFrequency) -> Result<()> {
        self.put(Setting::ActiveFrequency(frequency), &DerivedInfo::default())
            .await
    }

    pub async fn put_standby_frequency(&self, frequency: RadioFrequency) -> Result<()> {
        self.put(Setting::StandbyFrequency(frequency), &DerivedInfo::default())
            .await
    }

    pub async fn put_voice(&self, sentence: &str) -> Result<()> {
        self.put(Setting::Voice(sentence.to_string()), &DerivedInfo::default())
            .await
    }

    /// The sent and received settings snapshots.
    pub async fn settings(&self) -> Result<(ExternalSettings, ExternalSettings)> {
        let io = self.io.lock().await;
        let line_io = io.as_ref().ok_or(Error::NotConnected)?;
        line_io
            .request(|reply| SlotCommand::Settings { reply })
            .await
    }

    // -----------------------------------------------------------------------
    // Periodic calls
    // -----------------------------------------------------------------------

    /// Forward a tick to the driver on every second call.
    pub async fn on_tick(&self, basic: &NavInfo, derived: &DerivedInfo) {
        if self.is_busy() || !self.descriptor().is_some_and(|d| d.factory.is_some()) {
            return;
        }
        let io = self.io.lock().await;
        let Some(line_io) = io.as_ref() else {
            return;
        };
        if self.ticker.fetch_xor(true, Ordering::Relaxed) {
            return;
        }
        let command = SlotCommand::Tick {
            basic: Box::new(basic.clone()),
            derived: derived.clone(),
        };
        if let Err(e) = line_io.send(command).await {
            debug!(slot = self.index, error = %e, "tick not delivered");
        }
    }

    /// Tell the driver the channel has gone quiet.
    pub async fn on_link_timeout(&self) {
        if self.is_busy() {
            debug!(slot = self.index, "link timeout ignored while busy");
            return;
        }
        let io = self.io.lock().await;
        if let Some(line_io) = io.as_ref() {
            if let Err(e) = line_io.send(SlotCommand::LinkTimeout).await {
                debug!(slot = self.index, error = %e, "link timeout not delivered");
            }
        }
    }

    /// Forward every received line to `target`, or stop with `None`.
    pub async fn set_pipe_to(&self, target: Option<Outlet>) -> Result<()> {
        let io = self.io.lock().await;
        let line_io = io.as_ref().ok_or(Error::NotConnected)?;
        line_io.send(SlotCommand::SetPipeTo(target)).await
    }

    // -----------------------------------------------------------------------
    // Bulk operations
    // -----------------------------------------------------------------------

    /// Run `operation` with the receive loop stopped.
    ///
    /// Fails with [`Error::Busy`] if another bulk operation is running.
    /// Failures of the exchange itself are wrapped in
    /// [`Error::Operation`] naming the device and the action.
    pub async fn run_bulk(
        &self,
        operation: BulkOperation<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<BulkOutcome> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Busy);
        }
        let result = self.run_exclusive(operation, progress).await;
        self.busy.store(false, Ordering::Release);
        result
    }

    async fn run_exclusive(
        &self,
        operation: BulkOperation<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<BulkOutcome> {
        let mut io = self.io.lock().await;
        let (Some(attached), Some(line_io)) = (self.attached(), io.take()) else {
            return Err(Error::NotConnected);
        };
        let descriptor = attached.descriptor;
        let flarm = self.flarm_detected();

        self.outlet.detach();
        let (mut transport, mut session) = match line_io.shutdown().await {
            Ok(parts) => parts,
            Err(e) => {
                error!(slot = self.index, error = %e, "receive loop lost, closing slot");
                self.release(None).await;
                return Err(e.during(descriptor.display_name, operation.action()));
            }
        };
        debug!(slot = self.index, action = operation.action(), "receive loop stopped");

        progress.set_text(&operation.progress_text(descriptor.display_name));
        let result = perform(&mut session, &mut *transport, operation, flarm, progress)
            .await
            .map_err(|e| e.during(descriptor.display_name, operation.action()));

        if transport.is_connected() {
            let line_io = spawn_line_task(transport, self.io_config_for(descriptor), session);
            self.outlet.attach(line_io.writer());
            *io = Some(line_io);
            debug!(slot = self.index, "receive loop restarted");
        } else {
            error!(slot = self.index, "port lost during {}, closing slot", operation.action());
            drop(session);
            if let Err(e) = transport.close().await {
                debug!(slot = self.index, error = %e, "closing lost port");
            }
            self.release(None).await;
        }

        match &result {
            Ok(_) => info!(slot = self.index, action = operation.action(), "bulk operation complete"),
            Err(e) => warn!(slot = self.index, error = %e, "bulk operation failed"),
        }
        result
    }

    pub async fn declare(
        &self,
        declaration: &Declaration,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        self.run_bulk(BulkOperation::Declare(declaration), progress)
            .await
            .map(|_| ())
    }

    pub async fn read_flight_list(
        &self,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<RecordedFlight>> {
        match self.run_bulk(BulkOperation::ReadFlightList, progress).await? {
            BulkOutcome::FlightList(flights) => Ok(flights),
            other => Err(Error::Protocol(format!("unexpected outcome {other:?}"))),
        }
    }

    pub async fn download_flight(
        &self,
        flight: &RecordedFlight,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        match self
            .run_bulk(BulkOperation::DownloadFlight(flight), progress)
            .await?
        {
            BulkOutcome::Flight(data) => Ok(data),
            other => Err(Error::Protocol(format!("unexpected outcome {other:?}"))),
        }
    }
}

impl std::fmt::Debug for DeviceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSlot")
            .field("index", &self.index)
            .field("driver", &self.descriptor().map(|d| d.name))
            .field("busy", &self.is_busy())
            .finish()
    }
}

/// Run one bulk operation on a stopped channel.
///
/// A declaration also goes to FLARM when it was seen on the channel; it
/// succeeds if either the driver or FLARM accepted it.
async fn perform(
    session: &mut SlotSession,
    port: &mut dyn Transport,
    operation: BulkOperation<'_>,
    flarm: bool,
    progress: &dyn ProgressSink,
) -> Result<BulkOutcome> {
    let unsupported = || Error::Unsupported(operation.action().into());

    match operation {
        BulkOperation::Declare(declaration) => {
            let by_driver = match session.driver_mut() {
                Some(driver) => driver.declare(port, declaration, progress).await,
                None => Err(unsupported()),
            };
            if !flarm {
                return by_driver.map(|()| BulkOutcome::Declared);
            }
            let by_flarm = flarm::declare(port, declaration, progress).await;
            match (by_driver, by_flarm) {
                (Ok(()), _) | (_, Ok(())) => Ok(BulkOutcome::Declared),
                (Err(Error::Unsupported(_)), Err(e)) => Err(e),
                (Err(e), Err(flarm_error)) => {
                    debug!(error = %flarm_error, "FLARM declaration failed too");
                    Err(e)
                }
            }
        }
        BulkOperation::ReadFlightList => {
            let driver = session.driver_mut().ok_or_else(unsupported)?;
            driver
                .read_flight_list(port, progress)
                .await
                .map(BulkOutcome::FlightList)
        }
        BulkOperation::DownloadFlight(flight) => {
            let driver = session.driver_mut().ok_or_else(unsupported)?;
            driver
                .download_flight(port, flight, progress)
                .await
                .map(BulkOutcome::Flight)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{GENERIC, NMEA_OUT};
    use crate::testing::{TEST, flight, mac_cready_sentence};
    use glidelink_core::config::PortConfig;
    use glidelink_core::progress::NullProgress;
    use glidelink_core::types::{DeclarationPoint, GeoPoint, ObservationZone};
    use glidelink_nmea::format_sentence;
    use glidelink_test_harness::{MockHandle, MockTransport};

    fn slot() -> (DeviceSlot, Arc<Blackboard>) {
        let blackboard = Arc::new(Blackboard::new(1));
        let io_config = IoConfig {
            poll_timeout: Duration::from_millis(5),
            ..IoConfig::default()
        };
        (
            DeviceSlot::new(0, blackboard.clone(), io_config, true),
            blackboard,
        )
    }

    fn config() -> DeviceConfig {
        DeviceConfig::new(
            PortConfig::Serial {
                index: 0,
                baud_rate: 4800,
            },
            "Test",
        )
    }

    async fn open(slot: &DeviceSlot, descriptor: &'static DriverDescriptor) -> MockHandle {
        let mock = MockTransport::relaxed();
        let handle = mock.handle();
        slot.open(&config(), Box::new(mock), descriptor).await.unwrap();
        handle
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    fn task() -> Declaration {
        Declaration {
            pilot_name: "Jo".into(),
            turnpoints: vec![
                DeclarationPoint {
                    name: "A".into(),
                    location: GeoPoint::new(47.0, 8.0),
                    zone: ObservationZone::default(),
                },
                DeclarationPoint {
                    name: "B".into(),
                    location: GeoPoint::new(47.5, 8.5),
                    zone: ObservationZone::default(),
                },
            ],
            ..Declaration::default()
        }
    }

    // ===============================================================
    // Open / Close
    // ===============================================================

    #[tokio::test]
    async fn open_streams_lines_into_blackboard() {
        let (slot, blackboard) = slot();
        let handle = open(&slot, &TEST).await;
        assert!(slot.is_open());
        assert_eq!(slot.descriptor().map(|d| d.name), Some("Test"));

        handle.push_line(format_sentence("PGRMZ,1000,m,3").trim_end());
        wait_until(|| blackboard.slot(0).unwrap().pressure_altitude == Some(1000.0)).await;
        assert!(slot.is_alive(Duration::from_secs(5)));
        slot.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_twice_is_rejected() {
        let (slot, _) = slot();
        open(&slot, &TEST).await;
        let result = slot
            .open(&config(), Box::new(MockTransport::relaxed()), &TEST)
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        slot.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_on_dead_port_fails_and_stays_closed() {
        let (slot, _) = slot();
        let mut mock = MockTransport::relaxed();
        mock.set_connected(false);

        let result = slot.open(&config(), Box::new(mock), &TEST).await;
        assert!(matches!(result, Err(Error::OpenFailed(_))));
        assert!(!slot.is_open());
        assert!(!slot.outlet().is_open());
    }

    #[tokio::test]
    async fn close_releases_everything() {
        let (slot, blackboard) = slot();
        let handle = open(&slot, &TEST).await;
        handle.push_line(format_sentence("PGRMZ,1000,m,3").trim_end());
        wait_until(|| blackboard.slot(0).unwrap().alive.is_some()).await;

        slot.close().await.unwrap();
        assert!(!slot.is_open());
        assert!(!handle.is_connected());
        assert!(!slot.outlet().is_open());
        assert_eq!(blackboard.slot(0).unwrap(), NavInfo::default());

        // Closing again is harmless.
        slot.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_while_busy_is_refused() {
        let (slot, _) = slot();
        open(&slot, &TEST).await;
        slot.busy.store(true, Ordering::Release);
        assert!(matches!(slot.close().await, Err(Error::Busy)));
        assert!(slot.is_open());
        slot.busy.store(false, Ordering::Release);
        slot.close().await.unwrap();
    }

    // ===============================================================
    // Settings
    // ===============================================================

    #[tokio::test]
    async fn confirmed_value_is_not_written_again() {
        let (slot, _) = slot();
        let handle = open(&slot, &TEST).await;

        slot.put_mac_cready(2.0).await.unwrap();
        handle.push_line(mac_cready_sentence(2.0).trim_end());
        slot.put_mac_cready(2.0).await.unwrap();
        slot.put_mac_cready(2.0).await.unwrap();

        assert_eq!(handle.sent_bytes(), mac_cready_sentence(2.0).into_bytes());
        let (sent, _) = slot.settings().await.unwrap();
        assert_eq!(sent.mac_cready.map(|s| s.value), Some(2.0));
        slot.close().await.unwrap();
    }

    #[tokio::test]
    async fn put_while_busy_fails_fast() {
        let (slot, _) = slot();
        let handle = open(&slot, &TEST).await;
        slot.busy.store(true, Ordering::Release);

        assert!(matches!(slot.put_mac_cready(1.0).await, Err(Error::Busy)));
        assert!(handle.sent_data().is_empty());

        slot.busy.store(false, Ordering::Release);
        slot.close().await.unwrap();
    }

    #[tokio::test]
    async fn put_on_closed_slot_is_a_no_op() {
        let (slot, _) = slot();
        slot.put_bugs(0.9).await.unwrap();
    }

    // ===============================================================
    // Periodic calls
    // ===============================================================

    #[tokio::test]
    async fn tick_reaches_driver_every_second_call() {
        let (slot, _) = slot();
        let handle = open(&slot, &TEST).await;

        for _ in 0..4 {
            slot.on_tick(&NavInfo::default(), &DerivedInfo::default())
                .await;
        }
        // Round-trip a request so the queued ticks have run.
        slot.settings().await.unwrap();
        assert_eq!(handle.sent_bytes(), b"TICK\r\nTICK\r\n");
        slot.close().await.unwrap();
    }

    #[tokio::test]
    async fn link_timeout_skipped_while_busy() {
        let (slot, _) = slot();
        let handle = open(&slot, &TEST).await;

        slot.busy.store(true, Ordering::Release);
        slot.on_link_timeout().await;
        slot.busy.store(false, Ordering::Release);
        slot.on_link_timeout().await;

        slot.settings().await.unwrap();
        assert_eq!(handle.sent_bytes(), b"WAKE\r\n");
        slot.close().await.unwrap();
    }

    // ===============================================================
    // Bulk operations
    // ===============================================================

    #[tokio::test]
    async fn bulk_operation_resumes_streaming() {
        let (slot, blackboard) = slot();
        let handle = open(&slot, &TEST).await;

        slot.declare(&task(), &NullProgress).await.unwrap();
        assert_eq!(handle.sent_bytes(), b"DECLARE\r\n");
        assert!(!slot.is_busy());
        assert!(slot.outlet().is_open());

        handle.push_line(format_sentence("PGRMZ,500,m,3").trim_end());
        wait_until(|| blackboard.slot(0).unwrap().pressure_altitude == Some(500.0)).await;

        let flights = slot.read_flight_list(&NullProgress).await.unwrap();
        assert_eq!(flights.len(), 2);
        let data = slot.download_flight(&flights[1], &NullProgress).await.unwrap();
        assert_eq!(data, b"flight 1");
        slot.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_bulk_operation_names_device_and_action() {
        let (slot, _) = slot();
        open(&slot, &TEST).await;

        let result = slot.download_flight(&flight(7), &NullProgress).await;
        match result {
            Err(Error::Operation {
                device,
                action,
                source,
            }) => {
                assert_eq!(device, "Test Instrument");
                assert_eq!(action, "download flight");
                assert!(matches!(*source, Error::Timeout));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(!slot.is_busy());
        assert!(slot.is_open());
        slot.close().await.unwrap();
    }

    #[tokio::test]
    async fn second_bulk_operation_while_busy_is_rejected() {
        let (slot, _) = slot();
        open(&slot, &TEST).await;
        slot.busy.store(true, Ordering::Release);

        let result = slot.read_flight_list(&NullProgress).await;
        assert!(matches!(result, Err(Error::Busy)));

        slot.busy.store(false, Ordering::Release);
        slot.close().await.unwrap();
    }

    #[tokio::test]
    async fn lost_port_closes_slot_after_bulk_operation() {
        let (slot, _) = slot();
        let handle = open(&slot, &TEST).await;
        handle.set_connected(false);

        let result = slot.declare(&task(), &NullProgress).await;
        assert!(matches!(result, Err(Error::Operation { .. })));
        assert!(!slot.is_open());
        assert!(!slot.is_busy());
    }

    #[tokio::test]
    async fn bulk_operation_on_closed_slot() {
        let (slot, _) = slot();
        let result = slot.read_flight_list(&NullProgress).await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert!(!slot.is_busy());
    }

    #[tokio::test]
    async fn flarm_on_channel_enables_declaration() {
        let (slot, _) = slot();
        let handle = open(&slot, &GENERIC).await;
        assert!(!slot.can_declare());

        handle.push_line(format_sentence("PFLAU,3,1,2,1").trim_end());
        wait_until(|| slot.flarm_detected()).await;
        assert!(slot.can_declare());

        for (key, value) in [
            ("PILOT", "Jo"),
            ("GLIDERID", ""),
            ("GLIDERTYPE", ""),
            ("COMPID", ""),
            ("COMPCLASS", ""),
            ("NEWTASK", "Task"),
            ("ADDWP", "0000000N,00000000E,TAKEOFF"),
            ("ADDWP", "4700000N,00800000E,A"),
            ("ADDWP", "4730000N,00830000E,B"),
            ("ADDWP", "0000000N,00000000E,LANDING"),
        ] {
            handle.expect(
                format_sentence(&format!("PFLAC,S,{key},{value}")).as_bytes(),
                format_sentence(&format!("PFLAC,A,{key},{value}")).as_bytes(),
            );
        }

        slot.declare(&task(), &NullProgress).await.unwrap();
        assert_eq!(handle.remaining_expectations(), 0);
        slot.close().await.unwrap();
    }

    #[tokio::test]
    async fn nmea_out_slot_writes_but_does_not_parse() {
        let (slot, blackboard) = slot();
        let handle = open(&slot, &NMEA_OUT).await;

        handle.push_line(format_sentence("PGRMZ,1000,m,3").trim_end());
        wait_until(|| handle.incoming_drained()).await;
        assert!(slot.outlet().forward("$GPGGA,1"));
        wait_until(|| !handle.sent_data().is_empty()).await;

        assert_eq!(handle.sent_bytes(), b"$GPGGA,1\r\n");
        assert_eq!(blackboard.slot(0).unwrap().pressure_altitude, None);
        slot.close().await.unwrap();
    }
}

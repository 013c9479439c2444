//! The per-slot state that lives inside the receive loop.
//!
//! [`SlotSession`] is the [`LineHandler`] of a slot's line IO task. It owns
//! the driver, the line dispatcher and both settings snapshots, so every
//! line and every outbound operation for the slot runs on one task and
//! none of them needs a lock of its own. The blackboard lock is taken only
//! around the merge of one parsed line.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use glidelink_core::driver::Driver;
use glidelink_core::error::Result;
use glidelink_core::settings::{ExternalSettings, Setting};
use glidelink_core::transport::Transport;
use glidelink_core::types::{DerivedInfo, NavInfo};
use glidelink_line_io::LineHandler;

use crate::blackboard::Blackboard;
use crate::dispatcher::{Dispatch, LineDispatcher};
use crate::outlet::Outlet;

/// Requests a [`DeviceSlot`](crate::DeviceSlot) sends to its session.
pub enum SlotCommand {
    /// Push one setting unless the instrument already holds it.
    Put {
        setting: Setting,
        derived: DerivedInfo,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Periodic tick with the merged navigation state.
    Tick {
        basic: Box<NavInfo>,
        derived: DerivedInfo,
    },
    /// No line arrived within the watchdog deadline.
    LinkTimeout,
    /// Forward every received line to `target` (or stop forwarding).
    SetPipeTo(Option<Outlet>),
    /// Copies of the sent and received snapshots.
    Settings {
        reply: oneshot::Sender<(ExternalSettings, ExternalSettings)>,
    },
}

pub struct SlotSession {
    index: usize,
    driver: Option<Box<dyn Driver>>,
    dispatcher: LineDispatcher,
    blackboard: Arc<Blackboard>,
    /// Last value written per setting.
    sent: ExternalSettings,
    /// Settings the driver parsed from the last recognized line.
    received: ExternalSettings,
    pipe_to: Option<Outlet>,
}

impl SlotSession {
    pub fn new(
        index: usize,
        driver: Option<Box<dyn Driver>>,
        dispatcher: LineDispatcher,
        blackboard: Arc<Blackboard>,
    ) -> Self {
        SlotSession {
            index,
            driver,
            dispatcher,
            blackboard,
            sent: ExternalSettings::default(),
            received: ExternalSettings::default(),
            pipe_to: None,
        }
    }

    pub fn driver_mut(&mut self) -> Option<&mut Box<dyn Driver>> {
        self.driver.as_mut()
    }

    pub fn sent(&self) -> &ExternalSettings {
        &self.sent
    }

    pub fn received(&self) -> &ExternalSettings {
        &self.received
    }

    async fn put(
        &mut self,
        setting: &Setting,
        derived: &DerivedInfo,
        port: &mut dyn Transport,
    ) -> Result<()> {
        let Some(driver) = self.driver.as_mut() else {
            return Ok(());
        };
        if self.sent.confirms(setting) {
            trace!(slot = self.index, setting = setting.name(), "already sent, skipping");
            return Ok(());
        }

        match setting {
            Setting::MacCready(v) => driver.put_mac_cready(port, *v).await?,
            Setting::Bugs(v) => driver.put_bugs(port, *v).await?,
            Setting::BallastFraction(v) => driver.put_ballast(port, *v).await?,
            Setting::Qnh(v) => driver.put_qnh(port, *v, derived).await?,
            Setting::Volume(v) => driver.put_volume(port, *v).await?,
            Setting::ActiveFrequency(f) => driver.put_active_frequency(port, *f).await?,
            Setting::StandbyFrequency(f) => driver.put_standby_frequency(port, *f).await?,
            Setting::Voice(sentence) => driver.put_voice(port, sentence).await?,
        }

        self.sent.record(setting, self.blackboard.now());
        debug!(slot = self.index, setting = setting.name(), "setting sent");
        Ok(())
    }

    /// Parse `line` into this slot's blackboard record.
    ///
    /// The record's settings are swapped for the driver's last received
    /// snapshot while parsing. If the driver recognized the line, its new
    /// settings minus the ones that merely confirm what was sent are
    /// published; otherwise the previously published settings are put back.
    fn merge_line(&mut self, line: &str) -> Option<Dispatch> {
        let now = self.blackboard.now();
        let SlotSession {
            index,
            driver,
            dispatcher,
            blackboard,
            sent,
            received,
            ..
        } = self;

        blackboard.with_slot(*index, |info| {
            let published = std::mem::replace(&mut info.settings, received.clone());
            let clock = std::mem::replace(&mut info.clock, now);

            let outcome = dispatcher.dispatch(line, driver.as_mut(), info);
            match outcome {
                Dispatch::Rejected => {
                    info.settings = published;
                    info.clock = clock;
                    return outcome;
                }
                Dispatch::Unknown => {
                    info.settings = published;
                    info.clock = clock;
                    info.alive = Some(now);
                    return outcome;
                }
                Dispatch::Driver => {
                    let last_received = std::mem::replace(received, info.settings.clone());
                    info.settings = received.eliminate_redundant(sent, &last_received);
                }
                Dispatch::Generic => info.settings = published,
            }
            info.alive = Some(now);
            info.connected = Some(now);
            outcome
        })
    }
}

#[async_trait]
impl LineHandler for SlotSession {
    type Command = SlotCommand;

    fn line_received(&mut self, line: &str) {
        trace!(target: "glidelink::nmea", slot = self.index, line);

        if let Some(target) = &self.pipe_to {
            if !target.forward(line) {
                trace!(slot = self.index, "pass-through target not accepting");
            }
        }

        if self.merge_line(line).is_some_and(Dispatch::is_recognized) {
            self.blackboard.schedule_merge();
        }
    }

    async fn handle_command(&mut self, command: SlotCommand, transport: &mut dyn Transport) {
        match command {
            SlotCommand::Put {
                setting,
                derived,
                reply,
            } => {
                let result = self.put(&setting, &derived, transport).await;
                if let Err(ref e) = result {
                    debug!(slot = self.index, setting = setting.name(), error = %e, "setting push failed");
                }
                let _ = reply.send(result);
            }
            SlotCommand::Tick { basic, derived } => {
                if let Some(driver) = self.driver.as_mut() {
                    if let Err(e) = driver.on_tick(transport, &basic, &derived).await {
                        debug!(slot = self.index, error = %e, "tick failed");
                    }
                }
            }
            SlotCommand::LinkTimeout => {
                if let Some(driver) = self.driver.as_mut() {
                    if let Err(e) = driver.link_timeout(transport).await {
                        warn!(slot = self.index, error = %e, "link timeout handler failed");
                    }
                }
            }
            SlotCommand::SetPipeTo(target) => self.pipe_to = target,
            SlotCommand::Settings { reply } => {
                let _ = reply.send((self.sent.clone(), self.received.clone()));
            }
        }
    }
}

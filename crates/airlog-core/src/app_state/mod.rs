//! Node context and control loop
//!
//! [`Node`] owns every pipeline component plus the live reading and the
//! interval schedule. The supervisor calls [`Node::poll`] with a monotonically
//! increasing uptime; each due activity runs to completion before the next is
//! checked:
//!
//! 1. drain queued wireless events (attach, detach, writes)
//! 2. sample the sensor (default every 5 s)
//! 3. append the live reading to the log (default every 5 min)
//! 4. aggregate the log and refresh the history value (default every hour)

mod schedule;

pub use schedule::{IntervalTimer, Schedule};

use embassy_time::Instant;
use log::{error, info, warn};
use thiserror_no_std::Error;

use crate::config::NodeConfig;
use crate::display::StatusDisplay;
use crate::sampling::SensorSampler;
use crate::sensors::{ParticulateSensor, Reading, SensorError};
use crate::storage::{AggregationBuffer, AggregationEngine, LogError, LogStore, Storage};
use crate::telemetry::events::LINK_EVENT_CAPACITY;
use crate::telemetry::{LinkEvent, LinkEvents, TelemetryLink, TelemetryPublisher};
use crate::time::{ClockError, DateTime, TimeSource};

/// Boot failures the node cannot run without.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartupError {
    #[error("Clock initialization failed: {0}")]
    Clock(ClockError),
    #[error("Sensor initialization failed: {0}")]
    Sensor(SensorError),
}

/// The hardware collaborators a node is built from.
pub struct Peripherals<P, S, L, D, C> {
    pub sensor: P,
    pub storage: S,
    pub link: L,
    pub display: D,
    pub clock: C,
}

/// Explicit context for the whole pipeline, owned by the control loop.
pub struct Node<'a, P, S, L, D, C> {
    config: NodeConfig,
    sampler: SensorSampler<P>,
    log: LogStore<S>,
    history: AggregationBuffer,
    engine: AggregationEngine,
    publisher: TelemetryPublisher<L>,
    display: D,
    clock: C,
    events: &'a LinkEvents,
    schedule: Schedule,
    live: Option<Reading>,
    uptime: Instant,
    storage_ready: bool,
}

impl<'a, P, S, L, D, C> Node<'a, P, S, L, D, C>
where
    P: ParticulateSensor,
    S: Storage,
    L: TelemetryLink,
    D: StatusDisplay,
    C: TimeSource,
{
    /// Bring every component up.
    ///
    /// Storage problems degrade the node to running without persistence; a
    /// clock or sensor failure is returned to the caller.
    pub fn start(
        config: NodeConfig,
        peripherals: Peripherals<P, S, L, D, C>,
        events: &'a LinkEvents,
        boot: Instant,
    ) -> Result<Self, StartupError> {
        let Peripherals {
            sensor,
            storage,
            link,
            display,
            mut clock,
        } = peripherals;

        info!("Initializing storage...");
        let mut log = LogStore::new(storage);
        let storage_ready = match log.ensure_storage_ready() {
            Ok(()) => {
                info!("Storage initialized.");
                true
            }
            Err(e) => {
                warn!("Storage initialization failed, continuing without persistence: {}", e);
                false
            }
        };

        info!("Initializing clock...");
        clock.advance(boot);
        clock.init().map_err(|e| {
            error!("Clock initialization failed!");
            StartupError::Clock(e)
        })?;
        info!("Clock running at {}", DateTime::from_epoch(clock.now()));

        let mut sampler = SensorSampler::new(sensor);
        sampler.init().map_err(|e| {
            error!("Sensor init failed!");
            StartupError::Sensor(e)
        })?;
        info!("Sensor initialized");

        let history = AggregationBuffer::new();
        let mut publisher = TelemetryPublisher::new(link, &config);
        publisher.start(&history, clock.now());
        info!("Telemetry '{}' initialized", config.device_name);

        let schedule = Schedule::new(&config, boot);
        info!("Setup complete!");

        Ok(Self {
            config,
            sampler,
            log,
            history,
            engine: AggregationEngine::new(),
            publisher,
            display,
            clock,
            events,
            schedule,
            live: None,
            uptime: boot,
            storage_ready,
        })
    }

    /// Run one loop iteration at `uptime`.
    pub fn poll(&mut self, uptime: Instant) {
        if uptime > self.uptime {
            self.uptime = uptime;
        }
        self.clock.advance(self.uptime);

        self.drain_link_events();

        if self.schedule.sample.poll(self.uptime) {
            self.sample_cycle();
        }
        if self.schedule.log.poll(self.uptime) {
            self.log_cycle();
        }
        if self.schedule.aggregate.poll(self.uptime) {
            self.aggregate_cycle();
        }
    }

    /// Apply queued wireless events, at most one queue's worth per call so a
    /// chatty subscriber cannot starve the pipeline.
    pub fn drain_link_events(&mut self) {
        for _ in 0..LINK_EVENT_CAPACITY {
            let Some(event) = self.events.try_next() else {
                break;
            };
            match event {
                LinkEvent::Attached => self.publisher.on_attach(),
                LinkEvent::Detached => self.publisher.on_detach(),
                LinkEvent::Written {
                    characteristic,
                    payload,
                } => {
                    if let Some(epoch) = self.publisher.on_write(characteristic, &payload) {
                        self.clock.adjust(epoch);
                    }
                }
            }
        }
    }

    /// Take a sample and fan it out. A bad frame leaves the live reading as is.
    pub fn sample_cycle(&mut self) {
        let Some(reading) = self.sampler.sample(&self.clock) else {
            return;
        };
        self.live = Some(reading);
        self.publisher.on_reading_updated(&reading);
        self.display
            .show_reading(&reading, self.publisher.is_subscribed(), self.clock.now());
    }

    /// Append the live reading to the log.
    pub fn log_cycle(&mut self) {
        let Some(reading) = self.live else {
            warn!("No reading yet, nothing to log");
            return;
        };

        match self
            .log
            .append(&reading, self.clock.now(), self.uptime.as_secs())
        {
            Ok(record) => {
                if !self.storage_ready {
                    info!("Storage available again");
                    self.storage_ready = true;
                }
                info!("Data logged: {}", record);
            }
            Err(e) => {
                if matches!(e, LogError::Storage(_)) {
                    self.storage_ready = false;
                }
                error!("Write failed! {}", e);
            }
        }
    }

    /// Fold the log into the hourly history and refresh the history value.
    pub fn aggregate_cycle(&mut self) {
        self.engine
            .run(&mut self.log, &mut self.history, &self.clock);
        self.publisher
            .publish_history(&self.history, self.clock.now());
    }

    /// Most recent successful reading.
    pub fn live_reading(&self) -> Option<&Reading> {
        self.live.as_ref()
    }

    pub fn history(&self) -> &AggregationBuffer {
        &self.history
    }

    pub fn publisher(&self) -> &TelemetryPublisher<L> {
        &self.publisher
    }

    pub fn log_store(&self) -> &LogStore<S> {
        &self.log
    }

    pub fn log_store_mut(&mut self) -> &mut LogStore<S> {
        &mut self.log
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn uptime(&self) -> Instant {
        self.uptime
    }

    /// Whether the last storage operation succeeded.
    pub fn storage_ready(&self) -> bool {
        self.storage_ready
    }
}

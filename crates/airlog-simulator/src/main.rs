//! Headless desktop simulator for the airlog particulate telemetry node.
//!
//! Runs the real [`Node`] pipeline against a synthetic HM3301, a logging
//! wireless link and display, and either a host directory or memory as the
//! SD card. Time is virtual: the loop advances uptime one second per step and
//! sleeps `1 / AIRLOG_SPEEDUP` real seconds between steps.
//!
//! # Environment
//!
//! | Variable               | Meaning                                        |
//! |------------------------|------------------------------------------------|
//! | `AIRLOG_CONFIG`        | JSON file with [`NodeConfig`] fields           |
//! | `AIRLOG_DATA_DIR`      | Host directory used as the card root           |
//! | `AIRLOG_SPEEDUP`       | Simulated seconds per real second (0 = max)    |
//! | `AIRLOG_DURATION_SECS` | Simulated run length                           |
//! | `RUST_LOG`             | Log filter, default `info`                     |

mod fs_storage;
mod mock;
mod settings;

use std::process::ExitCode;
use std::time::Duration;

use airlog_core::app_state::Peripherals;
use airlog_core::sensors::Hm3301;
use airlog_core::storage::MemStorage;
use airlog_core::telemetry::LinkEvents;
use airlog_core::time::SoftRtc;
use airlog_core::{Node, NodeConfig};
use embassy_time::Instant;
use log::{error, info};

use fs_storage::{FsStorage, SimStorage};
use mock::{LogDisplay, MockLink, SimulatedBus, SubscriberScript};
use settings::SimSettings;

/// One in this many sensor frames arrives with a bad checksum.
const CORRUPT_FRAME_EVERY: u64 = 97;

/// How long the scripted phone stays connected.
const SUBSCRIBER_STAY_SECS: u64 = 20 * 60;

fn open_storage(settings: &SimSettings) -> SimStorage {
    match &settings.data_dir {
        Some(dir) => match FsStorage::open(dir) {
            Ok(fs) => {
                info!("Card root: {}", fs.root().display());
                SimStorage::Fs(fs)
            }
            Err(e) => {
                // The node degrades to running without persistence
                error!("Cannot open {}: {}", dir.display(), e);
                let mut mem = MemStorage::new();
                mem.set_unavailable(true);
                SimStorage::Memory(mem)
            }
        },
        None => {
            info!("No {} set, logging to memory", settings::DATA_DIR_VAR);
            SimStorage::Memory(MemStorage::new())
        }
    }
}

fn log_config(config: &NodeConfig) {
    info!(
        "Device '{}': sample {} s, log {} s, aggregate {} s, time sync {}, history {:?}",
        config.device_name,
        config.sample_interval_secs,
        config.log_interval_secs,
        config.aggregate_interval_secs,
        if config.time_sync_enabled { "on" } else { "off" },
        config.history_time
    );
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting airlog simulator");

    let settings = match SimSettings::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    log_config(&settings.node);
    info!(
        "Running {} simulated seconds at {}x",
        settings.duration_secs, settings.speedup
    );

    let events = LinkEvents::new();
    let boot = Instant::from_secs(0);
    let peripherals = Peripherals {
        sensor: Hm3301::new(SimulatedBus::new(CORRUPT_FRAME_EVERY)),
        storage: open_storage(&settings),
        link: MockLink::default(),
        display: LogDisplay::default(),
        clock: SoftRtc::from_build_stamp(boot),
    };

    let mut node = match Node::start(settings.node.clone(), peripherals, &events, boot) {
        Ok(node) => node,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Service registered with {} characteristics",
        node.publisher().link().registered.len()
    );

    let step = match settings.speedup {
        0 => Duration::ZERO,
        speedup => Duration::from_secs(1) / speedup,
    };
    let mut subscriber = SubscriberScript::phone(SUBSCRIBER_STAY_SECS);

    for secs in 1..=settings.duration_secs {
        for action in subscriber.run(secs, &events) {
            info!("Subscriber: {:?}", action);
        }
        node.poll(Instant::from_secs(secs));
        if !step.is_zero() {
            std::thread::sleep(step);
        }
    }

    info!(
        "Simulator exiting: {} hourly averages, {} notifications, {} advertising starts, {} screen updates, storage {}",
        node.history().len(),
        node.publisher().link().notifications,
        node.publisher().link().advertising_starts,
        node.display().frames,
        if node.storage_ready() { "ok" } else { "unavailable" }
    );
    ExitCode::SUCCESS
}

//! Wireless link events queued for the control loop
//!
//! The wireless stack runs its callbacks outside the control loop. They never
//! touch node state directly; each callback turns into one whole [`LinkEvent`]
//! pushed onto [`LinkEvents`], and the loop drains the queue at the start of
//! every iteration.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use log::{error, warn};

use super::Characteristic;

/// Queue depth; a burst larger than this between two loop iterations drops events
pub const LINK_EVENT_CAPACITY: usize = 8;

/// Largest write payload any characteristic accepts.
pub const MAX_WRITE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A subscriber connected
    Attached,
    /// The subscriber went away
    Detached,
    /// The subscriber wrote a characteristic
    Written {
        characteristic: Characteristic,
        payload: Vec<u8, MAX_WRITE_LEN>,
    },
}

/// Interrupt-safe event queue between the wireless stack and the loop.
pub struct LinkEvents {
    channel: Channel<CriticalSectionRawMutex, LinkEvent, LINK_EVENT_CAPACITY>,
}

impl Default for LinkEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkEvents {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    fn push(&self, event: LinkEvent) {
        if let Err(e) = self.channel.try_send(event) {
            error!("Link event queue full, dropping {:?}", e);
        }
    }

    /// Connect callback.
    pub fn attached(&self) {
        self.push(LinkEvent::Attached);
    }

    /// Disconnect callback.
    pub fn detached(&self) {
        self.push(LinkEvent::Detached);
    }

    /// Write callback. Payloads longer than any characteristic accepts are
    /// dropped here.
    pub fn written(&self, characteristic: Characteristic, payload: &[u8]) {
        match Vec::from_slice(payload) {
            Ok(payload) => self.push(LinkEvent::Written {
                characteristic,
                payload,
            }),
            Err(_) => warn!(
                "Ignoring {}-byte write to {:?}",
                payload.len(),
                characteristic
            ),
        }
    }

    /// Next queued event, if any.
    pub fn try_next(&self) -> Option<LinkEvent> {
        self.channel.try_receive().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_come_out_in_order() {
        let events = LinkEvents::new();
        events.attached();
        events.written(Characteristic::TimeSync, &[1, 2, 3, 4]);
        events.detached();

        assert_eq!(events.try_next(), Some(LinkEvent::Attached));
        assert_eq!(
            events.try_next(),
            Some(LinkEvent::Written {
                characteristic: Characteristic::TimeSync,
                payload: Vec::from_slice(&[1, 2, 3, 4]).unwrap(),
            })
        );
        assert_eq!(events.try_next(), Some(LinkEvent::Detached));
        assert_eq!(events.try_next(), None);
    }

    #[test]
    fn test_oversized_write_dropped() {
        let events = LinkEvents::new();
        events.written(Characteristic::TimeSync, &[0; MAX_WRITE_LEN + 1]);
        assert_eq!(events.try_next(), None);
    }

    #[test]
    fn test_overflow_drops_newest() {
        let events = LinkEvents::new();
        for _ in 0..LINK_EVENT_CAPACITY {
            events.attached();
        }
        events.detached();

        let mut drained = 0;
        while let Some(event) = events.try_next() {
            assert_eq!(event, LinkEvent::Attached);
            drained += 1;
        }
        assert_eq!(drained, LINK_EVENT_CAPACITY);
    }
}

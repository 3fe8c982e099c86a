//! Bounded event queue between the radio and the dispatcher.
//!
//! Producers run in the radio task and must never wait, so every post is a
//! `try_send`. When the queue is full the event is dropped and counted.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use portable_atomic::{AtomicU32, Ordering};

use crate::config::{EVENT_QUEUE_DEPTH, MAX_PAYLOAD_LEN};
use crate::warn;

/// Link-layer address of a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddress(pub [u8; 6]);

impl PeerAddress {
    /// Used for traffic on links that carry no source address.
    pub const BROADCAST: Self = Self([0xFF; 6]);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendStatus {
    Success,
    Failed,
}

pub type Payload = heapless::Vec<u8, MAX_PAYLOAD_LEN>;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioEvent {
    Sent {
        address: PeerAddress,
        status: SendStatus,
    },
    Received {
        address: PeerAddress,
        payload: Payload,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PostError {
    QueueFull,
    PayloadTooLarge,
    EmptyPayload,
}

pub struct EventQueue {
    channel: Channel<CriticalSectionRawMutex, RadioEvent, EVENT_QUEUE_DEPTH>,
    dropped: AtomicU32,
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    pub fn post_sent(&self, address: PeerAddress, status: SendStatus) -> Result<(), PostError> {
        self.post(RadioEvent::Sent { address, status })
    }

    /// Copies `data` into the queue. The caller's buffer is free again as
    /// soon as this returns.
    pub fn post_received(&self, address: PeerAddress, data: &[u8]) -> Result<(), PostError> {
        if data.is_empty() {
            return Err(self.drop_event(PostError::EmptyPayload));
        }
        let payload = match Payload::from_slice(data) {
            Ok(p) => p,
            Err(()) => return Err(self.drop_event(PostError::PayloadTooLarge)),
        };
        self.post(RadioEvent::Received { address, payload })
    }

    fn post(&self, event: RadioEvent) -> Result<(), PostError> {
        match self.channel.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(self.drop_event(PostError::QueueFull)),
        }
    }

    fn drop_event(&self, reason: PostError) -> PostError {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        warn!("Radio event dropped: {:?} ({} total)", reason, total);
        reason
    }

    pub async fn receive(&self) -> RadioEvent {
        self.channel.receive().await
    }

    pub fn try_receive(&self) -> Option<RadioEvent> {
        self.channel.try_receive().ok()
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

//! The single consumer of the radio event queue.

use crate::arming::{DigitalOutputs, OutputLevels, SharedArming};
use crate::datacells::DataCell;
use crate::events::{EventQueue, RadioEvent, SendStatus};
use crate::frame::{self, ValidationError};
use crate::health::LinkHealth;
use crate::node_id::NodeIdCell;
use crate::{debug, warn};

/// What handling one event did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dispatched {
    Applied(OutputLevels),
    Rejected(ValidationError),
    SendReport(SendStatus),
}

pub struct Dispatcher<'a, O: DigitalOutputs> {
    arming: &'a SharedArming<O>,
    node_id: &'a NodeIdCell,
    health: &'a DataCell<LinkHealth>,
    magic: u32,
}

impl<'a, O: DigitalOutputs> Dispatcher<'a, O> {
    pub fn new(
        arming: &'a SharedArming<O>,
        node_id: &'a NodeIdCell,
        health: &'a DataCell<LinkHealth>,
        magic: u32,
    ) -> Self {
        Self {
            arming,
            node_id,
            health,
            magic,
        }
    }

    /// Handles one event. The payload is dropped on return whatever happened.
    pub fn handle(&mut self, event: RadioEvent) -> Dispatched {
        match event {
            RadioEvent::Received { payload, .. } => match frame::validate(&payload, self.magic) {
                Ok(frame) => {
                    let own_id = self.node_id.load();
                    let levels = self
                        .arming
                        .lock(|ctl| ctl.borrow_mut().on_frame(&frame, own_id));
                    self.health.modify(|h| h.record_accepted());
                    Dispatched::Applied(levels)
                }
                Err(err) => {
                    warn!("Frame rejected: {:?} ({} bytes)", err, payload.len());
                    self.health.modify(|h| h.record_rejection(err));
                    Dispatched::Rejected(err)
                }
            },
            RadioEvent::Sent { status, .. } => {
                if status == SendStatus::Failed {
                    debug!("Send failed");
                }
                self.health.modify(|h| h.record_send(status));
                Dispatched::SendReport(status)
            }
        }
    }

    pub async fn run(&mut self, queue: &EventQueue) -> ! {
        loop {
            let event = queue.receive().await;
            self.handle(event);
        }
    }
}

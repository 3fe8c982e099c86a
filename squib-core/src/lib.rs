// lib.rs
#![no_std]

#[cfg(test)]
extern crate std;

mod macros;

pub mod arming;
pub mod bitmap;
pub mod command;
pub mod config;
pub mod console;
pub mod datacells;
pub mod dispatcher;
pub mod events;
pub mod frame;
pub mod health;
pub mod node_id;

pub use arming::{
    ArmState, ArmingController, ArmingMachine, DigitalOutputs, OutputLevels, OutputPin,
    SharedArming, TickOutcome,
};
pub use bitmap::{DetonateBitmap, get_bit, set_bit};
pub use command::{Command, CommandKind, CommandWindow};
pub use console::{Console, Reply, Role};
pub use datacells::DataCell;
pub use dispatcher::{Dispatched, Dispatcher};
pub use events::{EventQueue, PeerAddress, PostError, RadioEvent, SendStatus};
pub use frame::{FRAME_LEN, FramePayload, TransmitPayload, ValidatedFrame, ValidationError};
pub use health::{HealthReport, LinkHealth};
pub use node_id::{NodeId, NodeIdCell, NodeIdStore, RecordError};

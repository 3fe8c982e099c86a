// datacells.rs
// Values shared between tasks. Each cell is read and written whole.
use squib_core::node_id::NodeIdCell;
use squib_core::{DataCell, LinkHealth, TransmitPayload};

/// This node's id. Unassigned until the store has been read at startup.
pub static NODE_ID: NodeIdCell = NodeIdCell::new(None);

/// Arm flag and detonate bitmap for the next outgoing frame. Only the console
/// writes it, only a transmitter's radio task reads it.
pub static TX_PAYLOAD: DataCell<TransmitPayload> = DataCell::new(TransmitPayload::new());

pub static LINK_HEALTH: DataCell<LinkHealth> = DataCell::new(LinkHealth::new());

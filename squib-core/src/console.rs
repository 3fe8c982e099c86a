//! Applies serial commands to node identity and the staged transmit payload.

use core::fmt;

use crate::command::{Command, CommandKind};
use crate::datacells::DataCell;
use crate::frame::TransmitPayload;
use crate::node_id::{NodeId, NodeIdCell, NodeIdStore};
use crate::{info, warn};

/// Reply lines that carry the node id start with this.
pub const NODE_ID_REPLY_PREFIX: &str = "NODE ";

/// Line rate a host selects to ask for a reboot ("1200 baud touch").
pub const RESET_BAUD: u32 = 1200;

/// A host asks for a reboot by switching the port to [`RESET_BAUD`] and
/// dropping DTR. Either on its own is an ordinary port setting.
pub fn reset_requested(baud: u32, dtr: bool) -> bool {
    baud == RESET_BAUD && !dtr
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Transmitter,
    Receiver,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    NodeIdSet(u16),
    NodeId(u16),
    NodeIdUnavailable,
    TestId(u16),
    Armed(bool),
    DetonateStaged(u32),
    Ignored(CommandKind),
    OutOfRange(u16),
    StoreFailed,
}

impl Reply {
    /// Renders the reply as one CRLF-terminated line.
    pub fn write_to<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        match self {
            Reply::NodeIdSet(id) => write!(out, "OK SID {}", id)?,
            Reply::NodeId(id) => write!(out, "{}{}", NODE_ID_REPLY_PREFIX, id)?,
            Reply::NodeIdUnavailable => write!(out, "{}?", NODE_ID_REPLY_PREFIX)?,
            Reply::TestId(id) => write!(out, "OK TID {}", id)?,
            Reply::Armed(armed) => write!(out, "OK ARM {}", *armed as u8)?,
            Reply::DetonateStaged(count) => write!(out, "OK DET {}", count)?,
            Reply::Ignored(kind) => write!(out, "IGNORED {:?}", kind)?,
            Reply::OutOfRange(id) => write!(out, "ERR RANGE {}", id)?,
            Reply::StoreFailed => out.write_str("ERR STORE")?,
        }
        out.write_str("\r\n")
    }
}

/// Longest rendered reply.
pub const REPLY_MAX_LEN: usize = 32;

pub struct Console<'a, S: NodeIdStore> {
    role: Role,
    store: S,
    node_id: &'a NodeIdCell,
    payload: &'a DataCell<TransmitPayload>,
    test_id: u16,
}

impl<'a, S: NodeIdStore> Console<'a, S> {
    pub fn new(
        role: Role,
        store: S,
        node_id: &'a NodeIdCell,
        payload: &'a DataCell<TransmitPayload>,
    ) -> Self {
        Self {
            role,
            store,
            node_id,
            payload,
            test_id: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn test_id(&self) -> u16 {
        self.test_id
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn execute(&mut self, cmd: Command) -> Reply {
        match cmd {
            Command::SetNodeId(raw) => self.set_node_id(raw),
            Command::ReadNodeId => match self.store.load() {
                Ok(id) => Reply::NodeId(id.get()),
                Err(_) => {
                    warn!("Node id record unreadable");
                    Reply::NodeIdUnavailable
                }
            },
            Command::SetTestId(id) => {
                self.test_id = id;
                Reply::TestId(id)
            }
            Command::SetArmed(armed) => {
                if self.role != Role::Transmitter {
                    return Reply::Ignored(CommandKind::SetArmed);
                }
                self.payload.modify(|p| p.armed = armed);
                info!("Staged arm flag: {}", armed);
                Reply::Armed(armed)
            }
            Command::SetDetonate(bits) => {
                if self.role != Role::Transmitter {
                    return Reply::Ignored(CommandKind::SetDetonate);
                }
                self.payload.modify(|p| p.pyro_bits = bits);
                let count = bits.count();
                info!("Staged detonate bitmap: {} nodes", count);
                Reply::DetonateStaged(count)
            }
        }
    }

    fn set_node_id(&mut self, raw: u16) -> Reply {
        let Some(id) = NodeId::new(raw) else {
            warn!("Node id {} out of range, ignored", raw);
            return Reply::OutOfRange(raw);
        };
        if self.store.store(id).is_err() {
            warn!("Failed to persist node id {}", raw);
            return Reply::StoreFailed;
        }
        self.node_id.store(Some(id));
        info!("Node id set to {}", raw);
        Reply::NodeIdSet(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::DetonateBitmap;
    use crate::command::CommandWindow;
    use crate::node_id::MemoryStore;

    fn line(reply: Reply) -> heapless::String<REPLY_MAX_LEN> {
        let mut s = heapless::String::new();
        reply.write_to(&mut s).unwrap();
        s
    }

    #[test]
    fn test_set_then_read_node_id() {
        let node_id = NodeIdCell::new(None);
        let payload = DataCell::new(TransmitPayload::new());
        let mut console = Console::new(Role::Receiver, MemoryStore::default(), &node_id, &payload);
        let mut window = CommandWindow::new();

        let mut replies = heapless::Vec::<Reply, 4>::new();
        window.feed(b"#SID,042;", |cmd| replies.push(console.execute(cmd)).unwrap());
        window.feed(b"#RID,;", |cmd| replies.push(console.execute(cmd)).unwrap());

        assert_eq!(replies.as_slice(), &[Reply::NodeIdSet(42), Reply::NodeId(42)]);
        assert_eq!(node_id.load(), NodeId::new(42));
        assert_eq!(console.store_mut().record.as_slice(), b"42\n");
    }

    #[test]
    fn test_out_of_range_id_is_ignored() {
        let node_id = NodeIdCell::new(NodeId::new(3));
        let payload = DataCell::new(TransmitPayload::new());
        let mut console = Console::new(Role::Receiver, MemoryStore::default(), &node_id, &payload);
        assert_eq!(console.execute(Command::SetNodeId(512)), Reply::OutOfRange(512));
        assert_eq!(node_id.load(), NodeId::new(3));
        assert_eq!(console.store_mut().writes, 0);
    }

    #[test]
    fn test_store_failure_keeps_live_id() {
        let node_id = NodeIdCell::new(NodeId::new(3));
        let payload = DataCell::new(TransmitPayload::new());
        let store = MemoryStore {
            fail_writes: true,
            ..Default::default()
        };
        let mut console = Console::new(Role::Receiver, store, &node_id, &payload);
        assert_eq!(console.execute(Command::SetNodeId(9)), Reply::StoreFailed);
        assert_eq!(node_id.load(), NodeId::new(3));
    }

    #[test]
    fn test_reset_needs_touch_baud_and_dtr_low() {
        assert!(reset_requested(RESET_BAUD, false));
        assert!(!reset_requested(RESET_BAUD, true));
        assert!(!reset_requested(115_200, false));
        assert!(!reset_requested(115_200, true));
    }

    #[test]
    fn test_read_without_record() {
        let node_id = NodeIdCell::new(None);
        let payload = DataCell::new(TransmitPayload::new());
        let mut console = Console::new(Role::Receiver, MemoryStore::default(), &node_id, &payload);
        assert_eq!(console.execute(Command::ReadNodeId), Reply::NodeIdUnavailable);
    }

    #[test]
    fn test_receiver_ignores_payload_commands() {
        let node_id = NodeIdCell::new(None);
        let payload = DataCell::new(TransmitPayload::new());
        let mut console = Console::new(Role::Receiver, MemoryStore::default(), &node_id, &payload);
        let mut bits = DetonateBitmap::new();
        bits.set(1, true);

        assert_eq!(
            console.execute(Command::SetArmed(true)),
            Reply::Ignored(CommandKind::SetArmed)
        );
        assert_eq!(
            console.execute(Command::SetDetonate(bits)),
            Reply::Ignored(CommandKind::SetDetonate)
        );
        assert_eq!(payload.read(), TransmitPayload::new());
        assert_eq!(payload.updates(), 0);
    }

    #[test]
    fn test_transmitter_stages_payload() {
        let node_id = NodeIdCell::new(None);
        let payload = DataCell::new(TransmitPayload::new());
        let mut console =
            Console::new(Role::Transmitter, MemoryStore::default(), &node_id, &payload);
        let mut bits = DetonateBitmap::new();
        bits.set(1, true);
        bits.set(400, true);

        assert_eq!(console.execute(Command::SetArmed(true)), Reply::Armed(true));
        assert_eq!(console.execute(Command::SetDetonate(bits)), Reply::DetonateStaged(2));
        let staged = payload.read();
        assert!(staged.armed);
        assert_eq!(staged.pyro_bits, bits);

        assert_eq!(console.execute(Command::SetArmed(false)), Reply::Armed(false));
        assert!(!payload.read().armed);
        assert_eq!(payload.read().pyro_bits, bits);
    }

    #[test]
    fn test_test_id_is_scratch() {
        let node_id = NodeIdCell::new(None);
        let payload = DataCell::new(TransmitPayload::new());
        let mut console = Console::new(Role::Receiver, MemoryStore::default(), &node_id, &payload);
        assert_eq!(console.execute(Command::SetTestId(77)), Reply::TestId(77));
        assert_eq!(console.test_id(), 77);
        assert_eq!(node_id.load(), None);
    }

    #[test]
    fn test_reply_lines() {
        assert_eq!(line(Reply::NodeId(42)).as_str(), "NODE 42\r\n");
        assert_eq!(line(Reply::NodeIdUnavailable).as_str(), "NODE ?\r\n");
        assert_eq!(line(Reply::Armed(true)).as_str(), "OK ARM 1\r\n");
        assert_eq!(
            line(Reply::Ignored(CommandKind::SetDetonate)).as_str(),
            "IGNORED SetDetonate\r\n"
        );
    }
}

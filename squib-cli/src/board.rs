use std::io::{Read, Write};
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use log::{debug, info};
use serialport::SerialPort;
use squib_core::command::Command;
use squib_core::console::{NODE_ID_REPLY_PREFIX, RESET_BAUD};
use squib_core::{DetonateBitmap, NodeId};

// Opening the port can reset some boards; give the console time to come up.
const SETTLE: Duration = Duration::from_secs(1);
const READ_TIMEOUT: Duration = Duration::from_millis(100);
const REPLY_TIMEOUT: Duration = Duration::from_secs(3);
// Long enough for the console to poll the line state a few times.
const RESET_HOLD: Duration = Duration::from_millis(250);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineStep {
    Baud(u32),
    Dtr(bool),
}

/// The board reboots on the last step: touch baud with DTR low.
pub const RESET_SEQUENCE: [LineStep; 3] = [
    LineStep::Dtr(true),
    LineStep::Baud(RESET_BAUD),
    LineStep::Dtr(false),
];

/// A board's operator console.
pub struct Board {
    port: Box<dyn SerialPort>,
}

impl Board {
    pub fn open(device: &str, baud: u32) -> Result<Self> {
        let mut port = serialport::new(device, baud)
            .timeout(READ_TIMEOUT)
            .open()
            .with_context(|| format!("opening {device}"))?;
        port.write_data_terminal_ready(false)?;
        port.write_request_to_send(false)?;
        Ok(Self { port })
    }

    pub fn settle(&self) {
        sleep(SETTLE);
    }

    pub fn send(&mut self, cmd: &Command) -> Result<()> {
        let text = command_text(cmd);
        info!(">>> {text}");
        self.port
            .write_all(text.as_bytes())
            .context("writing command")?;
        self.port.flush().context("flushing command")?;
        Ok(())
    }

    /// Asks the board for its stored id. `None` means the board has none.
    pub fn read_id(&mut self) -> Result<Option<u16>> {
        self.send(&Command::ReadNodeId)?;

        let deadline = Instant::now() + REPLY_TIMEOUT;
        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        while Instant::now() < deadline {
            match self.port.read(&mut buf) {
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e).context("reading reply"),
            }
            let text = String::from_utf8_lossy(&received);
            if let Some(reply) = find_node_reply(&text) {
                debug!("<<< {}", text.trim_end());
                return Ok(reply);
            }
        }
        bail!("no node id reply within {:?}", REPLY_TIMEOUT)
    }

    /// Asks the firmware to reboot itself with a 1200 baud touch.
    pub fn reset(&mut self) -> Result<()> {
        for step in RESET_SEQUENCE {
            match step {
                LineStep::Baud(baud) => self.port.set_baud_rate(baud)?,
                LineStep::Dtr(level) => self.port.write_data_terminal_ready(level)?,
            }
        }
        sleep(RESET_HOLD);
        Ok(())
    }
}

pub fn command_text(cmd: &Command) -> String {
    let mut text = String::new();
    // Writing into a String can't fail.
    let _ = cmd.write_to(&mut text);
    text
}

/// Bitmap with exactly the given nodes selected.
pub fn fire_bitmap(ids: &[NodeId]) -> DetonateBitmap {
    let mut bits = DetonateBitmap::new();
    for id in ids {
        bits.set(id.get() as i32, true);
    }
    bits
}

/// Finds a complete `NODE n` line. `Some(None)` is a board without an id.
fn find_node_reply(text: &str) -> Option<Option<u16>> {
    let start = text.find(NODE_ID_REPLY_PREFIX)? + NODE_ID_REPLY_PREFIX.len();
    let rest = &text[start..];
    let end = rest.find('\n')?;
    Some(rest[..end].trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u16) -> NodeId {
        NodeId::new(n).unwrap()
    }

    #[test]
    fn test_set_id_is_zero_padded() {
        assert_eq!(command_text(&Command::SetNodeId(7)), "#SID,007;");
        assert_eq!(command_text(&Command::SetNodeId(511)), "#SID,511;");
    }

    #[test]
    fn test_arm_and_read_text() {
        assert_eq!(command_text(&Command::SetArmed(true)), "#ARM,1;");
        assert_eq!(command_text(&Command::SetArmed(false)), "#ARM,0;");
        assert_eq!(command_text(&Command::ReadNodeId), "#RID,;");
    }

    #[test]
    fn test_fire_selects_lsb_first_within_each_byte() {
        let text = command_text(&Command::SetDetonate(fire_bitmap(&[id(0), id(9), id(511)])));
        assert!(text.starts_with("#DET,0102"));
        assert!(text.ends_with("80;"));
        assert_eq!(text.len(), "#DET,".len() + 128 + 1);
        assert_eq!(&text[9..5 + 126], "0".repeat(122));
    }

    #[test]
    fn test_clear_is_all_zero() {
        let text = command_text(&Command::SetDetonate(DetonateBitmap::new()));
        assert_eq!(text, format!("#DET,{};", "0".repeat(128)));
    }

    #[test]
    fn test_fire_text_is_recognised_by_the_board_window() {
        let cmd = Command::SetDetonate(fire_bitmap(&[id(5), id(300)]));
        let mut window = squib_core::CommandWindow::new();
        let mut seen = Vec::new();
        window.feed(command_text(&cmd).as_bytes(), |c| seen.push(c));
        assert_eq!(seen, vec![cmd]);
    }

    #[test]
    fn test_reset_sequence_only_fires_on_last_step() {
        use squib_core::console::reset_requested;

        // As left by `Board::open`.
        let (mut baud, mut dtr) = (115_200, false);
        let mut requested = Vec::new();
        for step in RESET_SEQUENCE {
            match step {
                LineStep::Baud(b) => baud = b,
                LineStep::Dtr(d) => dtr = d,
            }
            requested.push(reset_requested(baud, dtr));
        }
        assert_eq!(requested, vec![false, false, true]);
    }

    #[test]
    fn test_node_reply_after_echo() {
        assert_eq!(find_node_reply("#RID,;NODE 42\r\n"), Some(Some(42)));
        assert_eq!(find_node_reply("#RID,;NODE ?\r\n"), Some(None));
        assert_eq!(find_node_reply("#RID,;NODE 4"), None);
        assert_eq!(find_node_reply("#RID,;"), None);
    }
}

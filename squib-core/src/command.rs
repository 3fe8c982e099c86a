//! Serial command grammar.
//!
//! Commands are `#XXX,<payload>;` with a fixed payload length per command.
//! Nothing delimits the start of a command, so the parser keeps a sliding
//! window of the newest bytes and, after every byte, checks whether the tail
//! of the window lines up with one of the templates.

use core::fmt;

use crate::bitmap::{BITMAP_HEX_LEN, DetonateBitmap};

pub const TERMINATOR: u8 = b';';

const PREFIX_LEN: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandKind {
    SetNodeId,
    ReadNodeId,
    SetTestId,
    SetArmed,
    SetDetonate,
}

pub struct Template {
    pub prefix: &'static [u8; PREFIX_LEN],
    pub payload_len: usize,
    pub kind: CommandKind,
}

impl Template {
    pub const fn len(&self) -> usize {
        PREFIX_LEN + self.payload_len + 1
    }
}

pub const TEMPLATE_COUNT: usize = 5;

/// Checked in this order after every byte.
pub const TEMPLATES: [Template; TEMPLATE_COUNT] = [
    Template {
        prefix: b"#SID,",
        payload_len: 3,
        kind: CommandKind::SetNodeId,
    },
    Template {
        prefix: b"#RID,",
        payload_len: 0,
        kind: CommandKind::ReadNodeId,
    },
    Template {
        prefix: b"#TID,",
        payload_len: 3,
        kind: CommandKind::SetTestId,
    },
    Template {
        prefix: b"#ARM,",
        payload_len: 1,
        kind: CommandKind::SetArmed,
    },
    Template {
        prefix: b"#DET,",
        payload_len: BITMAP_HEX_LEN,
        kind: CommandKind::SetDetonate,
    },
];

/// Length of the longest template.
pub const WINDOW_LEN: usize = 134;

const fn longest_template() -> usize {
    let mut longest = 0;
    let mut i = 0;
    while i < TEMPLATES.len() {
        if TEMPLATES[i].len() > longest {
            longest = TEMPLATES[i].len();
        }
        i += 1;
    }
    longest
}

const _: () = assert!(longest_template() == WINDOW_LEN);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    SetNodeId(u16),
    ReadNodeId,
    SetTestId(u16),
    SetArmed(bool),
    SetDetonate(DetonateBitmap),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::SetNodeId(_) => CommandKind::SetNodeId,
            Command::ReadNodeId => CommandKind::ReadNodeId,
            Command::SetTestId(_) => CommandKind::SetTestId,
            Command::SetArmed(_) => CommandKind::SetArmed,
            Command::SetDetonate(_) => CommandKind::SetDetonate,
        }
    }

    /// Writes the exact wire text for this command. Ids above 999 can't be
    /// expressed and are written as `999`.
    pub fn write_to<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        match self {
            Command::SetNodeId(id) => write!(out, "#SID,{:03};", (*id).min(999)),
            Command::ReadNodeId => out.write_str("#RID,;"),
            Command::SetTestId(id) => write!(out, "#TID,{:03};", (*id).min(999)),
            Command::SetArmed(armed) => write!(out, "#ARM,{};", *armed as u8),
            Command::SetDetonate(bits) => {
                out.write_str("#DET,")?;
                bits.write_hex(out)?;
                out.write_str(";")
            }
        }
    }

    fn decode(kind: CommandKind, payload: &[u8]) -> Self {
        match kind {
            CommandKind::SetNodeId => Command::SetNodeId(parse_decimal(payload)),
            CommandKind::ReadNodeId => Command::ReadNodeId,
            CommandKind::SetTestId => Command::SetTestId(parse_decimal(payload)),
            CommandKind::SetArmed => Command::SetArmed(parse_decimal(payload) != 0),
            CommandKind::SetDetonate => Command::SetDetonate(DetonateBitmap::from_hex(payload)),
        }
    }
}

/// All-digit fields parse to their value; anything else is zero.
fn parse_decimal(digits: &[u8]) -> u16 {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return 0;
    }
    digits
        .iter()
        .fold(0u16, |acc, &d| acc.saturating_mul(10).saturating_add((d - b'0') as u16))
}

/// The newest `template.len()` bytes of the window, split into fields.
#[derive(Debug, PartialEq, Eq)]
pub struct TemplateView<'a> {
    pub prefix: &'a [u8],
    pub payload: &'a [u8],
    pub terminator: u8,
}

/// Commands recognised by a single byte. Several templates can line up at
/// once when their payloads happen to contain another command.
pub type Matches = heapless::Vec<Command, TEMPLATE_COUNT>;

pub struct CommandWindow {
    buf: [u8; WINDOW_LEN],
    filled: usize,
}

impl CommandWindow {
    pub const fn new() -> Self {
        Self {
            buf: [0; WINDOW_LEN],
            filled: 0,
        }
    }

    /// Shifts `byte` in as the newest byte and returns every template that
    /// now matches, in priority order.
    pub fn push(&mut self, byte: u8) -> Matches {
        self.buf.copy_within(1.., 0);
        self.buf[WINDOW_LEN - 1] = byte;
        self.filled = (self.filled + 1).min(WINDOW_LEN);

        let mut matches = Matches::new();
        if byte != TERMINATOR {
            return matches;
        }
        for template in &TEMPLATES {
            if let Some(view) = self.view(PREFIX_LEN, template.payload_len) {
                if view.prefix == template.prefix {
                    // Capacity equals the template count.
                    let _ = matches.push(Command::decode(template.kind, view.payload));
                }
            }
        }
        matches
    }

    /// Pushes every byte of `chunk`, handing each recognised command to `f`.
    pub fn feed(&mut self, chunk: &[u8], mut f: impl FnMut(Command)) {
        for &byte in chunk {
            for cmd in self.push(byte) {
                f(cmd);
            }
        }
    }

    /// The newest `prefix_len + payload_len + 1` bytes, if that many have
    /// been received.
    pub fn view(&self, prefix_len: usize, payload_len: usize) -> Option<TemplateView<'_>> {
        let total = prefix_len + payload_len + 1;
        if total > self.filled {
            return None;
        }
        let tail = &self.buf[WINDOW_LEN - total..];
        Some(TemplateView {
            prefix: &tail[..prefix_len],
            payload: &tail[prefix_len..prefix_len + payload_len],
            terminator: tail[total - 1],
        })
    }

    pub fn clear(&mut self) {
        self.buf = [0; WINDOW_LEN];
        self.filled = 0;
    }
}

impl Default for CommandWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;

mod board;
mod roster;

use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use board::{Board, fire_bitmap};
use clap::{Args, Parser, Subcommand};
use log::info;
use roster::{Roster, parse_survivor_list};
use squib_core::command::Command;
use squib_core::console::RESET_BAUD;
use squib_core::node_id::MAX_NODE_ID;
use squib_core::{DetonateBitmap, NodeId};

use critical_section as _;

/// squib-cli: drive a squib board over its USB serial console.
#[derive(Parser, Debug)]
#[command(name = "squib-cli", version)]
struct Cli {
    /// Serial device the board enumerates as, e.g. /dev/ttyACM0.
    #[arg(long)]
    device: Option<String>,
    /// Any rate but 1200, which the firmware treats as a reset request.
    #[arg(long, default_value_t = 115_200)]
    baud: u32,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Store a node id on the board's SD card.
    SetId {
        #[arg(value_parser = parse_node_id)]
        id: NodeId,
    },
    /// Print the node id stored on the board.
    ReadId,
    /// Transmitter only: start sending armed frames.
    Arm,
    /// Transmitter only: start sending disarmed frames.
    Disarm,
    /// Transmitter only: select exactly these nodes to fire.
    Fire {
        #[arg(required = true, value_parser = parse_node_id)]
        ids: Vec<NodeId>,
    },
    /// Transmitter only: deselect every node.
    Clear,
    /// Reboot the board (1200 baud touch).
    Reset,
    /// Mark players eliminated and send the updated detonate bitmap.
    Eliminate {
        #[command(flatten)]
        roster: RosterArgs,
        /// Update the roster file only.
        #[arg(long)]
        disable_kills: bool,
        #[arg(required = true)]
        numbers: Vec<u16>,
    },
    /// Bring eliminated players back and send the updated detonate bitmap.
    Revive {
        #[command(flatten)]
        roster: RosterArgs,
        /// Without this, revives are refused.
        #[arg(long)]
        allow_revive: bool,
        /// Update the roster file only.
        #[arg(long)]
        disable_kills: bool,
        #[arg(required = true)]
        numbers: Vec<u16>,
    },
    /// Send the roster's detonate bitmap, once or on a period.
    Sync {
        #[command(flatten)]
        roster: RosterArgs,
        /// Re-read the roster and resend every N seconds until stopped.
        #[arg(long)]
        every: Option<u64>,
    },
    /// Start a roster where only the players listed in a file are alive.
    InitRoster {
        #[command(flatten)]
        roster: RosterArgs,
        /// One surviving player number per line.
        #[arg(long)]
        survivors: PathBuf,
    },
    /// Print the roster.
    Roster {
        #[command(flatten)]
        roster: RosterArgs,
    },
}

#[derive(Args, Debug)]
struct RosterArgs {
    /// Roster file, created on first use.
    #[arg(long, default_value = "state.json")]
    state: PathBuf,
    /// Players in a new roster, numbered from 1.
    #[arg(long, default_value_t = 456, value_parser = clap::value_parser!(u16).range(1..=MAX_NODE_ID as i64))]
    players: u16,
}

fn parse_node_id(s: &str) -> Result<NodeId, String> {
    let n: u16 = s.parse().map_err(|e| format!("{e}"))?;
    NodeId::new(n).ok_or_else(|| format!("node ids go up to {MAX_NODE_ID}"))
}

fn open_board(cli: &Cli) -> Result<Board> {
    let Some(device) = cli.device.as_deref() else {
        bail!("--device is required for this command");
    };
    if cli.baud == RESET_BAUD && !matches!(cli.cmd, Cmd::Reset) {
        bail!("{RESET_BAUD} baud would reset the board, pick another rate");
    }
    let board = Board::open(device, cli.baud)?;
    board.settle();
    Ok(board)
}

/// Sends the roster's eliminated set as the detonate bitmap.
fn send_dead(board: &mut Board, roster: &Roster) -> Result<()> {
    let dead = roster.dead_ids();
    info!("{} of {} players eliminated", dead.len(), roster.player_count());
    board.send(&Command::SetDetonate(fire_bitmap(&dead)))
}

fn set_players(
    cli: &Cli,
    args: &RosterArgs,
    numbers: &[u16],
    alive: bool,
    allow_revive: bool,
    disable_kills: bool,
) -> Result<()> {
    let mut roster = Roster::load_or_new(&args.state, args.players)?;
    for &number in numbers {
        roster.set_alive(number, alive, allow_revive);
    }
    roster.save(&args.state)?;
    if disable_kills {
        info!("Kills disabled, roster updated only");
        return Ok(());
    }
    send_dead(&mut open_board(cli)?, &roster)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match &cli.cmd {
        Cmd::SetId { id } => open_board(&cli)?.send(&Command::SetNodeId(id.get()))?,
        Cmd::ReadId => match open_board(&cli)?.read_id()? {
            Some(id) => println!("{id}"),
            None => println!("unassigned"),
        },
        Cmd::Arm => open_board(&cli)?.send(&Command::SetArmed(true))?,
        Cmd::Disarm => open_board(&cli)?.send(&Command::SetArmed(false))?,
        Cmd::Fire { ids } => open_board(&cli)?.send(&Command::SetDetonate(fire_bitmap(ids)))?,
        Cmd::Clear => open_board(&cli)?.send(&Command::SetDetonate(DetonateBitmap::new()))?,
        Cmd::Reset => {
            let device = cli.device.as_deref().context("--device is required for reset")?;
            Board::open(device, cli.baud)?.reset()?;
            info!("Reset {device}");
        }
        Cmd::Eliminate {
            roster,
            disable_kills,
            numbers,
        } => set_players(&cli, roster, numbers, false, false, *disable_kills)?,
        Cmd::Revive {
            roster,
            allow_revive,
            disable_kills,
            numbers,
        } => set_players(&cli, roster, numbers, true, *allow_revive, *disable_kills)?,
        Cmd::Sync { roster: args, every } => {
            let mut board = open_board(&cli)?;
            match every {
                None => send_dead(&mut board, &Roster::load_or_new(&args.state, args.players)?)?,
                Some(secs) => loop {
                    // Re-read so edits from other invocations go out too.
                    let roster = Roster::load_or_new(&args.state, args.players)?;
                    send_dead(&mut board, &roster)?;
                    sleep(Duration::from_secs(*secs));
                },
            }
        }
        Cmd::InitRoster {
            roster: args,
            survivors,
        } => {
            let text = std::fs::read_to_string(survivors)
                .with_context(|| format!("reading {}", survivors.display()))?;
            let roster = Roster::with_survivors(args.players, &parse_survivor_list(&text)?);
            roster.save(&args.state)?;
            info!(
                "Wrote {} with {} of {} players alive",
                args.state.display(),
                roster.alive_count(),
                roster.player_count()
            );
        }
        Cmd::Roster { roster: args } => {
            let roster = Roster::load_or_new(&args.state, args.players)?;
            let dead: Vec<String> = roster.dead_ids().iter().map(|id| id.get().to_string()).collect();
            println!("{} of {} alive", roster.alive_count(), roster.player_count());
            println!("eliminated: {}", dead.join(" "));
        }
    }
    Ok(())
}

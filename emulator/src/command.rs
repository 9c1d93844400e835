//! Console grammar for the emulator.
//!
//! One command per line, keywords matched case-insensitively:
//!
//! ```text
//! status
//! plug <usb|ac|dc|none>
//! current <mA>
//! advance <n>[ms|s|m|h]
//! finish
//! power-off <minutes>
//! halt [mAh]
//! reset [now|late]
//! events
//! help
//! exit
//! ```

use std::fmt;
use std::time::Duration;

use winnow::ascii::{Caseless, dec_int, dec_uint, space1};
use winnow::combinator::{alt, opt, preceded};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::literal;

use crate::battery::PlugKind;

/// Charge the pack loses during `halt` when no amount is given.
pub const DEFAULT_HALT_DRAIN_MAH: u32 = 400;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("status", "status                 - gauge status, estimate, and pack truth"),
    ("plug", "plug <usb|ac|dc|none>  - connect or remove a charger"),
    ("current", "current <mA>           - override pack current (+ charges)"),
    ("advance", "advance <n>[ms|s|m|h]  - run the gauge for simulated time"),
    ("finish", "finish                 - force charge termination"),
    ("power-off", "power-off <minutes>    - clean shutdown, rest, and reboot"),
    ("halt", "halt [mAh]             - unclean shutdown while the pack drains"),
    ("reset", "reset [now|late]       - request a gauge reset and reboot"),
    ("events", "events                 - print the gauge event ring"),
    ("help", "help                   - show this list"),
    ("exit", "exit                   - leave the emulator"),
];

/// Software reset flavour.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResetKind {
    /// Honoured at the next boot.
    Now,
    /// Honoured once the pack has rested long enough.
    Late,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Status,
    Plug(PlugKind),
    Current(i32),
    Advance(Duration),
    Finish,
    PowerOff { minutes: u32 },
    Halt { drain_mah: u32 },
    Reset(ResetKind),
    Events,
    Help,
    Exit,
}

/// Input the grammar rejected, with the byte offset of the failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyntaxError {
    pub input: String,
    pub offset: usize,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot parse `{}` at column {}", self.input, self.offset + 1)
    }
}

impl std::error::Error for SyntaxError {}

/// Parses one console line.
///
/// # Errors
///
/// [`SyntaxError`] when the line is not a complete command.
pub fn parse(line: &str) -> Result<Command, SyntaxError> {
    let line = line.trim();
    command.parse(line).map_err(|error| SyntaxError {
        input: line.to_string(),
        offset: error.offset(),
    })
}

fn command(input: &mut &str) -> ModalResult<Command> {
    alt((
        keyword("status").value(Command::Status),
        preceded((keyword("plug"), space1), plug_kind).map(Command::Plug),
        preceded((keyword("current"), space1), dec_int::<_, i32, _>).map(Command::Current),
        preceded((keyword("advance"), space1), duration).map(Command::Advance),
        keyword("finish").value(Command::Finish),
        preceded((keyword("power-off"), space1), dec_uint::<_, u32, _>)
            .map(|minutes| Command::PowerOff { minutes }),
        preceded(keyword("halt"), opt(preceded(space1, dec_uint::<_, u32, _>))).map(|drain| {
            Command::Halt {
                drain_mah: drain.unwrap_or(DEFAULT_HALT_DRAIN_MAH),
            }
        }),
        preceded(keyword("reset"), opt(preceded(space1, reset_kind)))
            .map(|kind| Command::Reset(kind.unwrap_or(ResetKind::Now))),
        keyword("events").value(Command::Events),
        keyword("help").value(Command::Help),
        alt((keyword("exit"), keyword("quit"))).value(Command::Exit),
    ))
    .parse_next(input)
}

fn keyword<'i>(word: &'static str) -> impl Parser<&'i str, &'i str, ErrMode<ContextError>> {
    literal(Caseless(word))
}

fn plug_kind(input: &mut &str) -> ModalResult<PlugKind> {
    alt((
        keyword("usb").value(PlugKind::Usb),
        keyword("ac").value(PlugKind::Ac),
        keyword("dc").value(PlugKind::Dc),
        alt((keyword("none"), keyword("off"))).value(PlugKind::None),
    ))
    .parse_next(input)
}

fn reset_kind(input: &mut &str) -> ModalResult<ResetKind> {
    alt((
        keyword("now").value(ResetKind::Now),
        keyword("late").value(ResetKind::Late),
    ))
    .parse_next(input)
}

fn duration(input: &mut &str) -> ModalResult<Duration> {
    let amount = dec_uint::<_, u64, _>.parse_next(input)?;
    let unit = opt(alt((
        keyword("ms").value(1u64),
        keyword("s").value(1_000),
        keyword("m").value(60_000),
        keyword("h").value(3_600_000),
    )))
    .parse_next(input)?;
    Ok(Duration::from_millis(
        amount.saturating_mul(unit.unwrap_or(1_000)),
    ))
}

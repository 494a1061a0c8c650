//! `:` panel commands: `SE` sequence select, `OP` open, `CL` close,
//! `RC` RC passthrough, `ST` stop, `HD` hold.
//!
//! The argument is a panel (servo channel) number.  `00` addresses every
//! channel of the servo bank.

use sith_hal::{HalRegistry, Servos};
use sith_types::{Command, SithError, pulse};
use tracing::{info, warn};

use crate::parser::{Ack, parse_number, unknown_code};

pub(crate) fn handle(cmd: &Command, hal: &mut HalRegistry) -> Result<Ack, SithError> {
    match cmd.code() {
        "SE" => {
            let sequence: u32 = parse_number(cmd, cmd.arguments())?;
            info!(sequence, "sequence selected");
            Ok(Ack::SequenceSelected(sequence))
        }
        "OP" => for_each_channel(cmd, hal, |servos, channel| {
            servos.set_position(channel, pulse::OPEN)
        }),
        "CL" => for_each_channel(cmd, hal, |servos, channel| {
            servos.set_position(channel, pulse::CLOSE)
        }),
        "ST" => for_each_channel(cmd, hal, |servos, channel| servos.stop_channel(channel)),
        "HD" => for_each_channel(cmd, hal, hold),
        "RC" => {
            let channel: usize = parse_number(cmd, cmd.arguments())?;
            info!(channel, "RC passthrough requested");
            Ok(Ack::Applied)
        }
        _ => Err(unknown_code(cmd)),
    }
}

/// Re-command the channel's current target so it stops following anything
/// else.  A channel that was never commanded or has no pulse stays as is.
fn hold(servos: &mut dyn Servos, channel: usize) -> Result<(), SithError> {
    match servos.position(channel) {
        Some(position) if position > 0 => servos.set_position(channel, position),
        _ => Ok(()),
    }
}

/// Resolve the channel argument and apply `op` to it, or to every channel
/// for `0`.  A missing or unavailable servo bank is logged and acknowledged.
fn for_each_channel(
    cmd: &Command,
    hal: &mut HalRegistry,
    mut op: impl FnMut(&mut dyn Servos, usize) -> Result<(), SithError>,
) -> Result<Ack, SithError> {
    let channel: usize = parse_number(cmd, cmd.arguments())?;

    let servos = match hal.servos_mut() {
        Ok(servos) => servos,
        Err(e) => {
            warn!(code = cmd.code(), channel, error = %e, "servo bank unavailable; acknowledging");
            return Ok(Ack::Applied);
        }
    };

    let count = servos.channel_count();
    if channel == 0 {
        info!(code = cmd.code(), count, "applying to all panels");
        for ch in 1..=count {
            op(&mut *servos, ch)?;
        }
    } else if channel <= count {
        info!(code = cmd.code(), channel, "applying to panel");
        op(&mut *servos, channel)?;
    } else {
        return Err(SithError::invalid_argument(
            cmd.code(),
            cmd.arguments(),
            format!("panel {channel} outside 1..={count}"),
        ));
    }
    Ok(Ack::Applied)
}

//! `*` holo projector and `@` logic display commands.

use sith_hal::{HalRegistry, Leds, Rgb};
use sith_types::{Command, SithError};
use tracing::{info, warn};

use crate::parser::{Ack, parse_number, unknown_code};

/// `*H0xx` flash, `*F0xx` flicker (xx seconds), `*ON`, `*ST`, `*RD`.
///
/// Flash and flicker light the strip and report their duration as
/// [`Ack::HoloEffect`]; ending the effect is up to the caller.
pub(crate) fn handle_holo(cmd: &Command, hal: &mut HalRegistry) -> Result<Ack, SithError> {
    match cmd.code() {
        "H0" | "F0" => {
            let seconds: u32 = parse_number(cmd, cmd.arguments())?;
            info!(code = cmd.code(), seconds, "holo projector effect");
            with_leds(cmd, hal, |leds| {
                leds.set_all(Rgb::WHITE)?;
                leds.flush()
            })?;
            Ok(Ack::HoloEffect { seconds })
        }
        "ON" => {
            info!("holo projector lights on");
            with_leds(cmd, hal, |leds| {
                leds.set_all(Rgb::WHITE)?;
                leds.flush()
            })
        }
        "ST" => {
            info!("holo projector stop");
            with_leds(cmd, hal, |leds| {
                leds.clear()?;
                leds.flush()
            })
        }
        "RD" => {
            info!("holo projector random movement");
            Ok(Ack::Applied)
        }
        _ => Err(unknown_code(cmd)),
    }
}

/// `@0Txx`/`@1Txx` display type, `@0Wxx`/`@1Wxx` wait seconds,
/// `@0M…`/`@1M…` message.  The leading digit selects the display.
pub(crate) fn handle_display(cmd: &Command) -> Result<Ack, SithError> {
    match cmd.code() {
        "0T" | "1T" => {
            let display_type: u32 = parse_number(cmd, cmd.arguments())?;
            info!(code = cmd.code(), display_type, "display type");
            Ok(Ack::Applied)
        }
        "0W" | "1W" => {
            let seconds: u32 = parse_number(cmd, cmd.arguments())?;
            info!(code = cmd.code(), seconds, "display wait");
            Ok(Ack::Applied)
        }
        "0M" | "1M" => {
            info!(code = cmd.code(), message = cmd.arguments(), "display message");
            Ok(Ack::Applied)
        }
        _ => Err(unknown_code(cmd)),
    }
}

fn with_leds(
    cmd: &Command,
    hal: &mut HalRegistry,
    op: impl FnOnce(&mut dyn Leds) -> Result<(), SithError>,
) -> Result<Ack, SithError> {
    match hal.leds_mut() {
        Ok(leds) => op(leds)?,
        Err(e) => warn!(code = cmd.code(), error = %e, "leds unavailable; acknowledging"),
    }
    Ok(Ack::Applied)
}

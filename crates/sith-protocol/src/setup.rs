//! Built-in `#` setup codes.
//!
//! | Code     | Meaning                                   |
//! |----------|-------------------------------------------|
//! | `#SDy`   | servo direction for every channel (0/1)   |
//! | `#SRxxy` | servo direction for channel `xx`          |
//! | `#SSxx`  | startup sound                             |
//! | `#SQy`   | quiet mode                                |
//! | `#STxx`  | slave delay in milliseconds               |
//! | `#SMxx`  | MP3 player type                           |

use sith_hal::HalRegistry;
use sith_types::{Command, SithError};
use tracing::{info, warn};

use crate::parser::{Ack, Setting, ShadowParser, parse_flag, parse_number};

pub(crate) fn install_defaults(parser: &mut ShadowParser) {
    parser.register_setup("SD", servo_direction_all);
    parser.register_setup("SR", servo_direction_one);
    parser.register_setup("SS", |cmd, _| {
        Ok(Ack::Setting(Setting::StartupSound(parse_number(
            cmd,
            cmd.arguments(),
        )?)))
    });
    parser.register_setup("SQ", |cmd, _| {
        Ok(Ack::Setting(Setting::QuietMode(parse_flag(
            cmd,
            cmd.arguments(),
        )?)))
    });
    parser.register_setup("ST", |cmd, _| {
        Ok(Ack::Setting(Setting::SlaveDelayMs(parse_number(
            cmd,
            cmd.arguments(),
        )?)))
    });
    parser.register_setup("SM", |cmd, _| {
        Ok(Ack::Setting(Setting::Mp3Player(parse_number(
            cmd,
            cmd.arguments(),
        )?)))
    });
}

fn servo_direction_all(cmd: &Command, hal: &mut HalRegistry) -> Result<Ack, SithError> {
    let reversed = parse_flag(cmd, cmd.arguments())?;
    let servos = match hal.servos_mut() {
        Ok(servos) => servos,
        Err(e) => {
            warn!(error = %e, "servo bank unavailable; acknowledging");
            return Ok(Ack::Applied);
        }
    };
    let count = servos.channel_count();
    for channel in 1..=count {
        servos.set_direction(channel, reversed)?;
    }
    info!(reversed, count, "servo direction set for all channels");
    Ok(Ack::Applied)
}

fn servo_direction_one(cmd: &Command, hal: &mut HalRegistry) -> Result<Ack, SithError> {
    let args = cmd.arguments();
    let (channel_text, flag_text) = match (args.get(0..2), args.get(2..3)) {
        (Some(channel), Some(flag)) if args.len() == 3 => (channel, flag),
        _ => {
            return Err(SithError::invalid_argument(
                cmd.code(),
                args,
                "expected two channel digits and a 0/1 flag",
            ));
        }
    };
    let channel: usize = parse_number(cmd, channel_text)?;
    let reversed = parse_flag(cmd, flag_text)?;

    let servos = match hal.servos_mut() {
        Ok(servos) => servos,
        Err(e) => {
            warn!(channel, error = %e, "servo bank unavailable; acknowledging");
            return Ok(Ack::Applied);
        }
    };
    let count = servos.channel_count();
    if channel == 0 || channel > count {
        return Err(SithError::invalid_argument(
            cmd.code(),
            args,
            format!("channel {channel} outside 1..={count}"),
        ));
    }
    servos.set_direction(channel, reversed)?;
    info!(channel, reversed, "servo direction set");
    Ok(Ack::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sith_hal::sim::{CommandLog, SimBackend};

    fn setup() -> (ShadowParser, HalRegistry, CommandLog) {
        let (mut hal, log) = SimBackend::new().with_servos(4).into_registry();
        hal.initialize_all();
        (ShadowParser::new(), hal, log)
    }

    #[test]
    fn direction_for_every_channel() {
        let (parser, mut hal, log) = setup();
        assert_eq!(parser.parse("#SD1\r", &mut hal), Ok(Ack::Applied));
        let records = log.filter("set_direction");
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.detail.ends_with("reversed=true")));

        log.clear();
        assert_eq!(parser.parse("#SD00\r", &mut hal), Ok(Ack::Applied));
        let records = log.filter("set_direction");
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.detail.ends_with("reversed=false")));
    }

    #[test]
    fn direction_for_one_channel() {
        let (parser, mut hal, log) = setup();
        assert_eq!(parser.parse("#SR031\r", &mut hal), Ok(Ack::Applied));
        let records = log.filter("set_direction");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].detail, "channel=3 reversed=true");
    }

    #[test]
    fn direction_for_one_channel_rejects_bad_arguments() {
        let (parser, mut hal, log) = setup();
        for line in ["#SR01", "#SR0", "#SR0112", "#SRab1", "#SR012", "#SR051", "#SR001"] {
            assert!(
                matches!(
                    parser.parse(line, &mut hal),
                    Err(SithError::InvalidArgument { .. })
                ),
                "{line} should be rejected"
            );
        }
        assert!(log.is_empty());
    }

    #[test]
    fn settings_are_returned_to_caller() {
        let (parser, mut hal, log) = setup();
        assert_eq!(
            parser.parse("#SS12", &mut hal),
            Ok(Ack::Setting(Setting::StartupSound(12)))
        );
        assert_eq!(
            parser.parse("#SQ1", &mut hal),
            Ok(Ack::Setting(Setting::QuietMode(true)))
        );
        assert_eq!(
            parser.parse("#ST250", &mut hal),
            Ok(Ack::Setting(Setting::SlaveDelayMs(250)))
        );
        assert_eq!(
            parser.parse("#SM2", &mut hal),
            Ok(Ack::Setting(Setting::Mp3Player(2)))
        );
        assert!(parser.parse("#SQ7", &mut hal).is_err());
        assert!(log.is_empty());
    }

    #[test]
    fn direction_without_servos_is_acknowledged() {
        let parser = ShadowParser::new();
        let mut hal = HalRegistry::new();
        assert_eq!(parser.parse("#SR010", &mut hal), Ok(Ack::Applied));
        assert_eq!(parser.parse("#SD0", &mut hal), Ok(Ack::Applied));
    }
}

//! `$` sound commands.
//!
//! The first code character selects the action; anything after it is
//! ignored by the letter commands.  A leading digit means "play sound by
//! number", with the number spanning the code and arguments (`$87` plays 87).

use sith_hal::HalRegistry;
use sith_types::{Command, SithError};
use tracing::{info, warn};

use crate::parser::{Ack, parse_number, unknown_code};

enum SoundAction {
    Random(&'static str),
    Stop,
    Play(u32),
}

pub(crate) fn handle(cmd: &Command, hal: &mut HalRegistry) -> Result<Ack, SithError> {
    let action = match cmd.code().chars().next() {
        Some('S') => SoundAction::Random("scream"),
        Some('W') => SoundAction::Random("wave"),
        Some('D') => SoundAction::Random("disco"),
        Some('R') => SoundAction::Random("random"),
        Some('C') => SoundAction::Random("cantina"),
        Some('L') => SoundAction::Random("leia"),
        Some('F') => SoundAction::Random("faint"),
        Some('s') => SoundAction::Stop,
        Some(c) if c.is_ascii_digit() => SoundAction::Play(parse_number(cmd, &cmd.payload())?),
        _ => return Err(unknown_code(cmd)),
    };

    let sound = match hal.sound_mut() {
        Ok(sound) => sound,
        Err(e) => {
            warn!(code = cmd.code(), error = %e, "sound unavailable; acknowledging");
            return Ok(Ack::Applied);
        }
    };

    match action {
        SoundAction::Random(category) => {
            info!(category, "playing sound");
            sound.play_random(category)?;
        }
        SoundAction::Stop => {
            info!("stopping sound");
            sound.stop()?;
        }
        SoundAction::Play(sound_id) => {
            info!(sound_id, "playing sound by number");
            sound.play(sound_id)?;
        }
    }
    Ok(Ack::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sith_hal::sim::{CommandLog, SimBackend};

    fn setup() -> (HalRegistry, CommandLog) {
        let (mut hal, log) = SimBackend::new().with_sound().into_registry();
        hal.initialize_all();
        (hal, log)
    }

    fn run(line: &str, hal: &mut HalRegistry) -> Result<Ack, SithError> {
        handle(&Command::parse(line).unwrap(), hal)
    }

    #[test]
    fn letter_commands_pick_random_category() {
        let (mut hal, log) = setup();
        run("$S0", &mut hal).unwrap();
        run("$W1", &mut hal).unwrap();
        let details: Vec<String> = log
            .filter("play_random")
            .into_iter()
            .map(|r| r.detail)
            .collect();
        assert_eq!(details, vec!["category=scream", "category=wave"]);
    }

    #[test]
    fn lowercase_s_stops() {
        let (mut hal, log) = setup();
        run("$s00", &mut hal).unwrap();
        assert_eq!(log.filter("stop").len(), 1);
    }

    #[test]
    fn digits_play_by_number() {
        let (mut hal, log) = setup();
        assert_eq!(run("$87", &mut hal), Ok(Ack::Applied));
        assert_eq!(run("$105", &mut hal), Ok(Ack::Applied));
        let details: Vec<String> = log.filter("play").into_iter().map(|r| r.detail).collect();
        assert_eq!(details, vec!["sound_id=87", "sound_id=105"]);
        assert!(matches!(
            run("$8x", &mut hal),
            Err(SithError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn unknown_letter_is_rejected() {
        let (mut hal, log) = setup();
        assert!(matches!(
            run("$Q12", &mut hal),
            Err(SithError::MalformedCommand(_))
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn missing_sound_is_acknowledged() {
        let mut hal = HalRegistry::new();
        assert_eq!(run("$C00", &mut hal), Ok(Ack::Applied));
    }
}

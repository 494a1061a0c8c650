//! Families that are not executed locally: `!` alternate sound, `%`
//! alternate holo projector and `&` I2C.

use sith_types::{Command, SithError};
use tracing::info;

use crate::parser::{Ack, I2cWrite, parse_number};

const I2C_CODE: &str = "i2c";
const MAX_I2C_ADDRESS: u8 = 127;

/// Hand the raw payload back to the caller.
pub(crate) fn handle_raw(cmd: &Command) -> Ack {
    let payload = cmd.payload();
    info!(family = %cmd.family(), %payload, "forwarding raw command");
    Ack::Passthrough {
        family: cmd.family(),
        payload,
    }
}

/// Decode `&addr,byte,byte…`.  The address is a 7-bit bus address and at
/// least one data byte must follow it.
pub(crate) fn handle_i2c(cmd: &Command) -> Result<Ack, SithError> {
    let payload = cmd.payload();
    let mut fields = payload.split(',');

    let address: u8 = fields
        .next()
        .ok_or_else(|| SithError::invalid_argument(I2C_CODE, &payload, "missing address"))
        .and_then(|text| parse_number(cmd, text.trim()))
        .map_err(|_| SithError::invalid_argument(I2C_CODE, &payload, "address is not a number"))?;
    if address > MAX_I2C_ADDRESS {
        return Err(SithError::invalid_argument(
            I2C_CODE,
            &payload,
            format!("address {address} outside 0..={MAX_I2C_ADDRESS}"),
        ));
    }

    let bytes = fields
        .map(|text| {
            text.trim().parse::<u8>().map_err(|_| {
                SithError::invalid_argument(I2C_CODE, &payload, format!("{text:?} is not a byte"))
            })
        })
        .collect::<Result<Vec<u8>, SithError>>()?;
    if bytes.is_empty() {
        return Err(SithError::invalid_argument(
            I2C_CODE,
            &payload,
            "no data bytes",
        ));
    }

    info!(address, len = bytes.len(), "i2c write decoded");
    Ok(Ack::I2c(I2cWrite { address, bytes }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sith_types::CommandFamily;

    fn i2c(line: &str) -> Result<Ack, SithError> {
        handle_i2c(&Command::parse(line).unwrap())
    }

    #[test]
    fn raw_families_echo_payload() {
        let ack = handle_raw(&Command::parse("!T15\r").unwrap());
        assert_eq!(
            ack,
            Ack::Passthrough {
                family: CommandFamily::AltSound,
                payload: "T15".to_string(),
            }
        );
        let ack = handle_raw(&Command::parse("%HP0").unwrap());
        assert!(matches!(
            ack,
            Ack::Passthrough {
                family: CommandFamily::AltHoloProjector,
                ..
            }
        ));
    }

    #[test]
    fn i2c_decodes_address_and_bytes() {
        assert_eq!(
            i2c("&42,1,255"),
            Ok(Ack::I2c(I2cWrite {
                address: 42,
                bytes: vec![1, 255],
            }))
        );
    }

    #[test]
    fn i2c_rejects_bad_payloads() {
        for line in ["&42,1,256", "&200,1", "&42", "&42,", "&xx,1", "&42,1,,2"] {
            assert!(
                matches!(i2c(line), Err(SithError::InvalidArgument { .. })),
                "{line} should be rejected"
            );
        }
    }
}

//! # sith-protocol
//!
//! Decoder for the Shadow/MarcDuino line protocol.
//!
//! A command line is a start marker, a two-character code and optional
//! arguments, terminated by CR:
//!
//! | Marker | Family                 | Handled by            |
//! |--------|------------------------|-----------------------|
//! | `:`    | panels                 | servo bank            |
//! | `*`    | holo projectors        | LED strip             |
//! | `@`    | logic displays         | logged                |
//! | `$`    | sound                  | sound channel         |
//! | `!`    | alternate sound        | returned to caller    |
//! | `%`    | alternate holo         | returned to caller    |
//! | `&`    | I2C                    | decoded, returned     |
//! | `#`    | setup                  | runtime table         |
//!
//! [`ShadowParser::parse`] runs one line against a
//! [`HalRegistry`](sith_hal::HalRegistry) and returns an [`Ack`].

mod lights;
mod panel;
pub mod parser;
mod passthrough;
mod setup;
mod sound;

pub use parser::{Ack, I2cWrite, Setting, SetupHandler, ShadowParser};

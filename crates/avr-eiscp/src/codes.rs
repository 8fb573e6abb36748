//! ISCP command codes and value conversion

use avr_core::{DriverError, DriverEvent};

use crate::packet::Message;

pub const POWER: &str = "PWR";
pub const VOLUME: &str = "MVL";
pub const MUTE: &str = "AMT";
pub const SOURCE: &str = "SLI";
pub const SOUND_MODE: &str = "LMD";
pub const DISCOVERY: &str = "ECN";

/// Parameter that turns any command into a status query
pub const QUERY: &str = "QSTN";

/// Parameter receivers answer with when a value is not available
pub const NOT_AVAILABLE: &str = "N/A";

pub const ON: &str = "01";
pub const OFF: &str = "00";

/// Input selector codes (SLI)
const SOURCES: &[(&str, &str)] = &[
    ("00", "vcr/dvr"),
    ("01", "cbl/sat"),
    ("02", "game"),
    ("03", "aux1"),
    ("04", "aux2"),
    ("05", "pc"),
    ("06", "video7"),
    ("10", "bd/dvd"),
    ("11", "strm-box"),
    ("12", "tv"),
    ("20", "tape"),
    ("22", "phono"),
    ("23", "cd"),
    ("24", "fm"),
    ("25", "am"),
    ("26", "tuner"),
    ("27", "music-server"),
    ("28", "internet-radio"),
    ("29", "usb"),
    ("2B", "network"),
    ("2E", "bluetooth"),
    ("40", "universal-port"),
];

/// Listening mode codes (LMD)
const SOUND_MODES: &[(&str, &str)] = &[
    ("00", "stereo"),
    ("01", "direct"),
    ("02", "surround"),
    ("03", "film"),
    ("04", "thx"),
    ("05", "action"),
    ("06", "musical"),
    ("08", "orchestra"),
    ("09", "unplugged"),
    ("0A", "studio-mix"),
    ("0B", "tv-logic"),
    ("0C", "all-ch-stereo"),
    ("0D", "theater-dimensional"),
    ("0E", "enhanced"),
    ("0F", "mono"),
    ("11", "pure-audio"),
    ("13", "full-mono"),
    ("16", "audyssey-dsx"),
    ("40", "straight-decode"),
    ("42", "thx-cinema"),
    ("80", "plii-movie"),
    ("81", "plii-music"),
    ("86", "plii-game"),
    ("A0", "pliix-movie"),
    ("A1", "pliix-music"),
    ("FF", "auto-surround"),
];

fn lookup(table: &[(&str, &str)], code: &str) -> String {
    table
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Name of an input selector code; unknown codes pass through unchanged
pub fn source_name(code: &str) -> String {
    lookup(SOURCES, code)
}

/// Name of a listening mode code; unknown codes pass through unchanged
pub fn sound_mode_name(code: &str) -> String {
    lookup(SOUND_MODES, code)
}

/// Parse a two-state parameter ("00"/"01")
pub fn parse_bool(command: &str, value: &str) -> Result<bool, DriverError> {
    match value {
        ON => Ok(true),
        OFF => Ok(false),
        _ => Err(DriverError::InvalidResponse {
            command: command.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Parse a hexadecimal volume step
pub fn parse_volume(value: &str) -> Result<u32, DriverError> {
    u32::from_str_radix(value, 16).map_err(|_| DriverError::InvalidResponse {
        command: VOLUME.to_string(),
        value: value.to_string(),
    })
}

/// Convert a received message into a status field change, if it carries one
pub fn to_event(message: &Message) -> Option<DriverEvent> {
    let value = message.parameter.as_str();
    if value == NOT_AVAILABLE || value == QUERY {
        return None;
    }

    match message.command.as_str() {
        POWER => parse_bool(POWER, value).ok().map(DriverEvent::Power),
        VOLUME => parse_volume(value).ok().map(DriverEvent::Volume),
        MUTE => parse_bool(MUTE, value).ok().map(DriverEvent::Mute),
        SOURCE => Some(DriverEvent::Source(source_name(value))),
        SOUND_MODE => Some(DriverEvent::SoundMode(sound_mode_name(value))),
        _ => None,
    }
}

//! eISCP packet encoding and decoding
//!
//! Every eISCP packet is a 16-byte header followed by one ISCP message:
//!
//! ```text
//! 0..4   "ISCP"
//! 4..8   header size (big-endian, always 16)
//! 8..12  data size (big-endian)
//! 12     version (1)
//! 13..16 reserved
//! 16..   "!1PWR01\r"
//! ```

use thiserror::Error;

/// Size of the fixed eISCP header
pub const HEADER_SIZE: usize = 16;

/// Largest message body accepted from a device
pub const MAX_DATA_SIZE: usize = 64 * 1024;

const MAGIC: &[u8; 4] = b"ISCP";
const VERSION: u8 = 1;

/// Characters receivers append after the parameter (EOF, EM, CR, LF)
const TERMINATORS: &[char] = &['\u{1a}', '\u{19}', '\r', '\n'];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketError {
    #[error("Bad magic bytes: {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("Unsupported header size {0}")]
    BadHeaderSize(u32),
    #[error("Message too large: {0} bytes")]
    TooLarge(usize),
    #[error("Truncated packet: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("Not an ISCP message: {0:?}")]
    NotIscp(String),
}

/// One ISCP message: `!<unit><command><parameter>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Unit type character ('1' for receivers, 'x' for discovery requests)
    pub unit: char,
    /// Three-letter command, e.g. "PWR"
    pub command: String,
    /// Command parameter, e.g. "01" or "QSTN"
    pub parameter: String,
}

impl Message {
    /// Create a receiver message
    pub fn new(command: &str, parameter: &str) -> Self {
        Self {
            unit: '1',
            command: command.to_string(),
            parameter: parameter.to_string(),
        }
    }

    /// Create a status query for a command
    pub fn query(command: &str) -> Self {
        Self::new(command, crate::codes::QUERY)
    }

    /// Render the ISCP text form without terminator
    pub fn to_iscp(&self) -> String {
        format!("!{}{}{}", self.unit, self.command, self.parameter)
    }

    /// Parse ISCP text, tolerating any trailing terminator characters
    pub fn parse(text: &str) -> Result<Self, PacketError> {
        let text = text.trim_end_matches(TERMINATORS);
        let mut chars = text.chars();

        if chars.next() != Some('!') {
            return Err(PacketError::NotIscp(text.to_string()));
        }
        let unit = chars
            .next()
            .ok_or_else(|| PacketError::NotIscp(text.to_string()))?;

        let rest = chars.as_str();
        if rest.len() < 3 || !rest.is_char_boundary(3) {
            return Err(PacketError::NotIscp(text.to_string()));
        }
        let (command, parameter) = rest.split_at(3);

        Ok(Self {
            unit,
            command: command.to_string(),
            parameter: parameter.to_string(),
        })
    }
}

/// Encode a message into a complete eISCP packet
pub fn encode(message: &Message) -> Vec<u8> {
    let mut data = message.to_iscp().into_bytes();
    data.push(b'\r');

    let mut packet = Vec::with_capacity(HEADER_SIZE + data.len());
    packet.extend_from_slice(MAGIC);
    packet.extend_from_slice(&(HEADER_SIZE as u32).to_be_bytes());
    packet.extend_from_slice(&(data.len() as u32).to_be_bytes());
    packet.push(VERSION);
    packet.extend_from_slice(&[0u8; 3]);
    packet.extend_from_slice(&data);
    packet
}

/// Validate a header and return the size of the data that follows it
pub fn decode_header(header: &[u8]) -> Result<usize, PacketError> {
    if header.len() < HEADER_SIZE {
        return Err(PacketError::Truncated {
            expected: HEADER_SIZE,
            actual: header.len(),
        });
    }

    let magic = [header[0], header[1], header[2], header[3]];
    if &magic != MAGIC {
        return Err(PacketError::BadMagic(magic));
    }

    let header_size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if header_size as usize != HEADER_SIZE {
        return Err(PacketError::BadHeaderSize(header_size));
    }

    let data_size = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
    if data_size > MAX_DATA_SIZE {
        return Err(PacketError::TooLarge(data_size));
    }

    Ok(data_size)
}

/// Decode a message body
pub fn decode_body(body: &[u8]) -> Result<Message, PacketError> {
    Message::parse(&String::from_utf8_lossy(body))
}

/// Decode a complete packet held in one buffer (e.g. a UDP datagram)
pub fn decode(packet: &[u8]) -> Result<Message, PacketError> {
    let data_size = decode_header(packet)?;
    let available = packet.len() - HEADER_SIZE;
    if available < data_size {
        return Err(PacketError::Truncated {
            expected: HEADER_SIZE + data_size,
            actual: packet.len(),
        });
    }
    decode_body(&packet[HEADER_SIZE..HEADER_SIZE + data_size])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_power_query() {
        let packet = encode(&Message::query("PWR"));
        assert_eq!(&packet[0..4], b"ISCP");
        assert_eq!(&packet[4..8], &[0, 0, 0, 16]);
        assert_eq!(&packet[8..12], &[0, 0, 0, 10]);
        assert_eq!(packet[12], 1);
        assert_eq!(&packet[16..], b"!1PWRQSTN\r");
    }

    #[test]
    fn test_decode_strips_terminators() {
        let mut packet = encode(&Message::new("MVL", "1A"));
        // Receivers terminate with EOF CR LF rather than CR
        let len = packet.len();
        packet.truncate(len - 1);
        packet.extend_from_slice(b"\x1a\r\n");
        packet[11] += 2;

        let message = decode(&packet).unwrap();
        assert_eq!(message.unit, '1');
        assert_eq!(message.command, "MVL");
        assert_eq!(message.parameter, "1A");
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut packet = encode(&Message::query("PWR"));
        packet[0] = b'X';
        assert!(matches!(decode(&packet), Err(PacketError::BadMagic(_))));
    }

    #[test]
    fn test_decode_rejects_truncated_body() {
        let packet = encode(&Message::query("PWR"));
        let result = decode(&packet[..packet.len() - 3]);
        assert!(matches!(result, Err(PacketError::Truncated { .. })));
    }

    #[test]
    fn test_parse_discovery_reply() {
        let message = Message::parse("!1ECNTX-NR616/60128/DX/0009B0D1C2E3\x19\r\n").unwrap();
        assert_eq!(message.command, "ECN");
        assert_eq!(message.parameter, "TX-NR616/60128/DX/0009B0D1C2E3");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Message::parse("PWR01").is_err());
        assert!(Message::parse("!1PW").is_err());
    }
}

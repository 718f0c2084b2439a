//! P2P wire framing: `NetworkEnvelope` and the `version` handshake message.

use crate::constants::{NETWORK_MAGIC, TESTNET_NETWORK_MAGIC};
use crate::error::{Error, Result};
use crate::hash::{encode_varint, hash256};
use rand::Rng;
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkEnvelope {
    command: [u8; 12],
    payload: Vec<u8>,
    testnet: bool,
}

impl NetworkEnvelope {
    pub fn new(command: &[u8], payload: Vec<u8>, testnet: bool) -> Result<Self> {
        if command.len() > 12 {
            return Err(Error::Parse("network envelope command too long"));
        }
        let mut padded = [0u8; 12];
        padded[..command.len()].copy_from_slice(command);
        Ok(Self { command: padded, payload, testnet })
    }

    pub fn command(&self) -> &[u8] {
        let end = self.command.iter().position(|&b| b == 0).unwrap_or(12);
        &self.command[..end]
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn magic(&self) -> [u8; 4] {
        if self.testnet { TESTNET_NETWORK_MAGIC } else { NETWORK_MAGIC }
    }

    pub fn parse<R: Read>(reader: &mut R, testnet: bool) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(|_| Error::Parse("network envelope magic"))?;
        let expected = if testnet { TESTNET_NETWORK_MAGIC } else { NETWORK_MAGIC };
        if magic != expected {
            return Err(Error::Parse("network envelope magic mismatch"));
        }

        let mut command = [0u8; 12];
        reader.read_exact(&mut command).map_err(|_| Error::Parse("network envelope command"))?;

        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).map_err(|_| Error::Parse("network envelope payload length"))?;
        let payload_len = u32::from_le_bytes(len_buf) as usize;

        let mut checksum = [0u8; 4];
        reader.read_exact(&mut checksum).map_err(|_| Error::Parse("network envelope checksum"))?;

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload).map_err(|_| Error::Parse("network envelope payload"))?;

        if hash256(&payload)[..4] != checksum {
            return Err(Error::ChecksumMismatch);
        }

        Ok(Self { command, payload, testnet })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.magic().to_vec();
        out.extend_from_slice(&self.command);
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&hash256(&self.payload)[..4]);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// The `version` handshake message, serialized per the legacy P2P wire
/// format (no BIP-155 extensions).
#[derive(Clone, Debug, PartialEq)]
pub struct VersionMessage {
    pub version: u32,
    pub services: u64,
    pub timestamp: u64,
    pub receiver_services: u64,
    pub receiver_ip: [u8; 4],
    pub receiver_port: u16,
    pub sender_services: u64,
    pub sender_ip: [u8; 4],
    pub sender_port: u16,
    pub nonce: u64,
    pub user_agent: Vec<u8>,
    pub latest_block: u32,
    pub relay: bool,
}

impl Default for VersionMessage {
    fn default() -> Self {
        Self {
            version: 70015,
            services: 0,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system clock is after the Unix epoch")
                .as_secs(),
            receiver_services: 0,
            receiver_ip: [0, 0, 0, 0],
            receiver_port: 8333,
            sender_services: 0,
            sender_ip: [0, 0, 0, 0],
            sender_port: 8333,
            nonce: rand::thread_rng().gen(),
            user_agent: b"/bitcoin-primitives:0.1/".to_vec(),
            latest_block: 0,
            relay: false,
        }
    }
}

impl VersionMessage {
    pub const COMMAND: &'static [u8] = b"version";

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.version.to_le_bytes().to_vec();
        out.extend_from_slice(&self.services.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());

        out.extend_from_slice(&self.receiver_services.to_le_bytes());
        out.extend_from_slice(&[0u8; 10]);
        out.extend_from_slice(&[0xff, 0xff]);
        out.extend_from_slice(&self.receiver_ip);
        out.extend_from_slice(&self.receiver_port.to_le_bytes());

        out.extend_from_slice(&self.sender_services.to_le_bytes());
        out.extend_from_slice(&[0u8; 10]);
        out.extend_from_slice(&[0xff, 0xff]);
        out.extend_from_slice(&self.sender_ip);
        out.extend_from_slice(&self.sender_port.to_le_bytes());

        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(&encode_varint(self.user_agent.len() as u64));
        out.extend_from_slice(&self.user_agent);
        out.extend_from_slice(&self.latest_block.to_le_bytes());
        out.push(if self.relay { 1 } else { 0 });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn envelope_round_trips_through_parse() {
        let envelope = NetworkEnvelope::new(b"verack", Vec::new(), false).unwrap();
        let bytes = envelope.serialize();
        let parsed = NetworkEnvelope::parse(&mut Cursor::new(bytes), false).unwrap();
        assert_eq!(parsed.command(), b"verack");
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn envelope_rejects_wrong_network_magic() {
        let envelope = NetworkEnvelope::new(b"verack", Vec::new(), false).unwrap();
        let bytes = envelope.serialize();
        assert!(NetworkEnvelope::parse(&mut Cursor::new(bytes), true).is_err());
    }

    #[test]
    fn envelope_rejects_corrupted_checksum() {
        let envelope = NetworkEnvelope::new(b"ping", vec![1, 2, 3, 4], false).unwrap();
        let mut bytes = envelope.serialize();
        let checksum_offset = 4 + 12 + 4;
        bytes[checksum_offset] ^= 0xff;
        assert!(matches!(
            NetworkEnvelope::parse(&mut Cursor::new(bytes), false),
            Err(Error::ChecksumMismatch)
        ));
    }

    #[test]
    fn version_message_serializes_to_expected_length() {
        let message = VersionMessage {
            nonce: 0,
            timestamp: 0,
            user_agent: b"/test:0.0/".to_vec(),
            ..VersionMessage::default()
        };
        let bytes = message.serialize();
        // 4+8+8 + 8+26+2 + 8+26+2 + 8 + 1(varint) + 10 + 4 + 1
        assert_eq!(bytes.len(), 4 + 8 + 8 + 8 + 26 + 2 + 8 + 26 + 2 + 8 + 1 + 10 + 4 + 1);
    }
}

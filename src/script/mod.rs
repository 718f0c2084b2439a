//! Bitcoin Script: parsing, serialization, and the stack-machine evaluator.

mod op;

use crate::error::{Error, Result};
use crate::hash::{encode_varint, read_varint};
use num_bigint::BigUint;
use std::collections::VecDeque;
use std::io::Read;
use tracing::debug;

/// A single element of a script's command list: either an opcode or a data
/// push. Scripts are value types; concatenation models `a + b` from the
/// original.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Op(u8),
    Data(Vec<u8>),
}

#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct Script {
    commands: Vec<Command>,
}

impl Script {
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Concatenates two scripts' command lists, as script_sig + script_pubkey
    /// does ahead of evaluation.
    pub fn combine(&self, other: &Self) -> Self {
        let mut commands = self.commands.clone();
        commands.extend(other.commands.iter().cloned());
        Self { commands }
    }

    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let length = read_varint(reader)? as usize;
        let mut buf = vec![0u8; length];
        reader.read_exact(&mut buf).map_err(|_| Error::Parse("script body"))?;
        Self::parse_body(&buf)
    }

    fn parse_body(buf: &[u8]) -> Result<Self> {
        let mut commands = Vec::new();
        let mut i = 0usize;
        while i < buf.len() {
            let byte = buf[i];
            i += 1;
            if (1..=75).contains(&byte) {
                let n = byte as usize;
                let data = buf.get(i..i + n).ok_or(Error::Parse("script push"))?.to_vec();
                commands.push(Command::Data(data));
                i += n;
            } else if byte == op::OP_PUSHDATA1 {
                let n = *buf.get(i).ok_or(Error::Parse("OP_PUSHDATA1 length"))? as usize;
                i += 1;
                let data = buf.get(i..i + n).ok_or(Error::Parse("OP_PUSHDATA1 body"))?.to_vec();
                commands.push(Command::Data(data));
                i += n;
            } else if byte == op::OP_PUSHDATA2 {
                let n = u16::from_le_bytes(
                    buf.get(i..i + 2)
                        .ok_or(Error::Parse("OP_PUSHDATA2 length"))?
                        .try_into()
                        .unwrap(),
                ) as usize;
                i += 2;
                let data = buf.get(i..i + n).ok_or(Error::Parse("OP_PUSHDATA2 body"))?.to_vec();
                commands.push(Command::Data(data));
                i += n;
            } else {
                commands.push(Command::Op(byte));
            }
        }
        if i != buf.len() {
            return Err(Error::Parse("script command boundary"));
        }
        Ok(Self { commands })
    }

    fn raw_serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for command in &self.commands {
            match command {
                Command::Op(code) => out.push(*code),
                Command::Data(data) => {
                    let len = data.len();
                    if len <= 75 {
                        out.push(len as u8);
                    } else if len <= 255 {
                        out.push(op::OP_PUSHDATA1);
                        out.push(len as u8);
                    } else if len <= 520 {
                        out.push(op::OP_PUSHDATA2);
                        out.extend_from_slice(&(len as u16).to_le_bytes());
                    } else {
                        return Err(Error::ScriptTooLong);
                    }
                    out.extend_from_slice(data);
                }
            }
        }
        Ok(out)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let body = self.raw_serialize()?;
        let mut out = encode_varint(body.len() as u64);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// `[OP_DUP, OP_HASH160, <20-byte>, OP_EQUALVERIFY, OP_CHECKSIG]`
    pub fn is_p2pkh(&self) -> bool {
        matches!(
            self.commands.as_slice(),
            [
                Command::Op(op::OP_DUP),
                Command::Op(op::OP_HASH160),
                Command::Data(h),
                Command::Op(op::OP_EQUALVERIFY),
                Command::Op(op::OP_CHECKSIG),
            ] if h.len() == 20
        )
    }

    /// `[OP_HASH160, <20-byte>, OP_EQUAL]`
    pub fn is_p2sh(&self) -> bool {
        matches!(
            self.commands.as_slice(),
            [Command::Op(op::OP_HASH160), Command::Data(h), Command::Op(op::OP_EQUAL)]
            if h.len() == 20
        )
    }

    /// Runs the evaluator. `locktime`/`version`/`sequence` are the owning
    /// transaction's and input's fields, consulted only by
    /// `OP_CHECKLOCKTIMEVERIFY`/`OP_CHECKSEQUENCEVERIFY`.
    pub fn evaluate(&self, z: &BigUint, locktime: u32, version: i32, sequence: u32) -> bool {
        let mut queue: VecDeque<Command> = self.commands.iter().cloned().collect();
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut altstack: Vec<Vec<u8>> = Vec::new();

        while let Some(command) = queue.pop_front() {
            let ok = match command {
                Command::Data(data) => {
                    let pushed = Self::maybe_expand_p2sh(&data, &mut queue);
                    stack.push(data);
                    pushed
                }
                Command::Op(op::OP_IF) | Command::Op(op::OP_NOTIF) => {
                    let is_notif = matches!(command, Command::Op(op::OP_NOTIF));
                    op::branch(&mut stack, &mut queue, is_notif)
                }
                Command::Op(op::OP_TOALTSTACK) => op::to_altstack(&mut stack, &mut altstack),
                Command::Op(op::OP_FROMALTSTACK) => op::from_altstack(&mut stack, &mut altstack),
                Command::Op(op::OP_CHECKSIG) => op::checksig(&mut stack, z),
                Command::Op(op::OP_CHECKSIGVERIFY) => {
                    op::checksig(&mut stack, z) && op::verify(&mut stack)
                }
                Command::Op(op::OP_CHECKMULTISIG) => op::checkmultisig(&mut stack, z),
                Command::Op(op::OP_CHECKMULTISIGVERIFY) => {
                    op::checkmultisig(&mut stack, z) && op::verify(&mut stack)
                }
                Command::Op(op::OP_CHECKLOCKTIMEVERIFY) => {
                    op::checklocktimeverify(&stack, locktime, sequence)
                }
                Command::Op(op::OP_CHECKSEQUENCEVERIFY) => {
                    op::checksequenceverify(&stack, version, sequence)
                }
                Command::Op(code) => op::dispatch(code, &mut stack),
            };
            if !ok {
                debug!("script evaluation failed");
                return false;
            }
        }

        matches!(stack.last(), Some(top) if op::decode_num(top) != 0)
    }

    /// BIP-16: after a push, if the remaining queue is exactly
    /// `[OP_HASH160, <20-byte>, OP_EQUAL]`, splice the just-pushed data's own
    /// commands back onto the queue.
    fn maybe_expand_p2sh(data: &[u8], queue: &mut VecDeque<Command>) -> bool {
        let tail: Vec<Command> = queue.iter().cloned().collect();
        if let [Command::Op(op::OP_HASH160), Command::Data(h), Command::Op(op::OP_EQUAL)] = tail.as_slice() {
            if h.len() == 20 && crate::hash::hash160(data) == h.as_slice() {
                queue.clear();
                match Self::parse_body(data) {
                    Ok(redeem) => {
                        for command in redeem.commands.into_iter().rev() {
                            queue.push_front(command);
                        }
                    }
                    Err(_) => return false,
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_runs_spec_addition_example() {
        // script_sig=[OP_4], script_pub_key=[OP_5, OP_ADD, OP_9, OP_EQUAL], z=0
        let script_sig = Script::new(vec![Command::Op(0x54)]);
        let script_pubkey = Script::new(vec![
            Command::Op(0x55),
            Command::Op(0x93),
            Command::Op(0x59),
            Command::Op(0x87),
        ]);
        let combined = script_sig.combine(&script_pubkey);
        assert!(combined.evaluate(&BigUint::from(0u8), 0, 1, 0xffff_ffff));
    }

    #[test]
    fn p2pkh_predicate_matches_exact_shape() {
        let script = Script::new(vec![
            Command::Op(0x76),
            Command::Op(0xa9),
            Command::Data(vec![0u8; 20]),
            Command::Op(0x88),
            Command::Op(0xac),
        ]);
        assert!(script.is_p2pkh());
        assert!(!script.is_p2sh());
    }

    #[test]
    fn serialize_round_trips_through_parse() {
        let script = Script::new(vec![
            Command::Data(vec![1, 2, 3]),
            Command::Op(0x76),
            Command::Data(vec![7u8; 200]),
        ]);
        let bytes = script.serialize().unwrap();
        let parsed = Script::parse(&mut std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(parsed, script);
    }

    #[test]
    fn push_over_520_bytes_fails_to_serialize() {
        let script = Script::new(vec![Command::Data(vec![0u8; 521])]);
        assert!(matches!(script.serialize(), Err(Error::ScriptTooLong)));
    }

    #[test]
    fn evaluate_expands_and_satisfies_a_p2sh_redeem_script() {
        // redeem script: OP_2 OP_3 OP_ADD OP_5 OP_EQUAL  (2 + 3 == 5)
        let redeem_bytes = vec![0x52, 0x53, 0x93, 0x55, 0x87];
        let redeem_hash = crate::hash::hash160(&redeem_bytes);
        let script_sig = Script::new(vec![Command::Data(redeem_bytes)]);
        let script_pubkey = Script::new(vec![
            Command::Op(op::OP_HASH160),
            Command::Data(redeem_hash.to_vec()),
            Command::Op(op::OP_EQUAL),
        ]);
        let combined = script_sig.combine(&script_pubkey);
        assert!(combined.evaluate(&BigUint::from(0u8), 0, 1, 0xffff_ffff));
    }

    #[test]
    fn evaluate_rejects_p2sh_redeem_script_with_wrong_hash() {
        let redeem_bytes = vec![0x52, 0x53, 0x93, 0x55, 0x87];
        let mut wrong_hash = crate::hash::hash160(&redeem_bytes);
        wrong_hash[0] ^= 0xff;
        let script_sig = Script::new(vec![Command::Data(redeem_bytes)]);
        let script_pubkey = Script::new(vec![
            Command::Op(op::OP_HASH160),
            Command::Data(wrong_hash.to_vec()),
            Command::Op(op::OP_EQUAL),
        ]);
        let combined = script_sig.combine(&script_pubkey);
        assert!(!combined.evaluate(&BigUint::from(0u8), 0, 1, 0xffff_ffff));
    }

    #[test]
    fn op_if_takes_true_branch_when_condition_is_nonzero() {
        // OP_1 OP_IF OP_2 OP_ELSE OP_3 OP_ENDIF OP_2 OP_EQUAL
        let script = Script::new(vec![
            Command::Op(0x51),
            Command::Op(op::OP_IF),
            Command::Op(0x52),
            Command::Op(op::OP_ELSE),
            Command::Op(0x53),
            Command::Op(op::OP_ENDIF),
            Command::Op(0x52),
            Command::Op(op::OP_EQUAL),
        ]);
        assert!(script.evaluate(&BigUint::from(0u8), 0, 1, 0xffff_ffff));
    }

    #[test]
    fn op_notif_takes_true_branch_when_condition_is_zero() {
        // OP_0 OP_NOTIF OP_2 OP_ELSE OP_3 OP_ENDIF OP_2 OP_EQUAL
        let script = Script::new(vec![
            Command::Op(0x00),
            Command::Op(op::OP_NOTIF),
            Command::Op(0x52),
            Command::Op(op::OP_ELSE),
            Command::Op(0x53),
            Command::Op(op::OP_ENDIF),
            Command::Op(0x52),
            Command::Op(op::OP_EQUAL),
        ]);
        assert!(script.evaluate(&BigUint::from(0u8), 0, 1, 0xffff_ffff));
    }
}

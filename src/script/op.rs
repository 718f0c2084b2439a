//! Opcode implementations.
//!
//! Grouped by the ambient state each handler needs, since a single
//! `fn(&mut Vec<Vec<u8>>) -> bool` table cannot also serve the opcodes that
//! need the alt stack, the remaining command queue, or the signature hash.

use super::Command;
use crate::secp256k1::Secp256k1Point;
use crate::signature::Signature;
use num_bigint::BigUint;
use std::collections::VecDeque;

pub const OP_PUSHDATA1: u8 = 76;
pub const OP_PUSHDATA2: u8 = 77;
pub const OP_IF: u8 = 99;
pub const OP_NOTIF: u8 = 100;
pub const OP_ELSE: u8 = 103;
pub const OP_ENDIF: u8 = 104;
pub const OP_TOALTSTACK: u8 = 107;
pub const OP_FROMALTSTACK: u8 = 108;
pub const OP_DUP: u8 = 118;
pub const OP_EQUAL: u8 = 135;
pub const OP_EQUALVERIFY: u8 = 136;
pub const OP_HASH160: u8 = 169;
pub const OP_CHECKSIG: u8 = 172;
pub const OP_CHECKSIGVERIFY: u8 = 173;
pub const OP_CHECKMULTISIG: u8 = 174;
pub const OP_CHECKMULTISIGVERIFY: u8 = 175;
pub const OP_CHECKLOCKTIMEVERIFY: u8 = 177;
pub const OP_CHECKSEQUENCEVERIFY: u8 = 178;

/// Encodes a signed integer the way Script numbers are pushed: little-endian
/// magnitude, sign carried in the top bit of the last byte.
pub fn encode_num(num: i64) -> Vec<u8> {
    if num == 0 {
        return Vec::new();
    }
    let negative = num < 0;
    let mut abs_num = num.unsigned_abs();
    let mut result = Vec::new();
    while abs_num != 0 {
        result.push((abs_num & 0xff) as u8);
        abs_num >>= 8;
    }
    let last = *result.last().unwrap();
    if last & 0x80 != 0 {
        result.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        let last_idx = result.len() - 1;
        result[last_idx] |= 0x80;
    }
    result
}

/// The inverse of [`encode_num`].
pub fn decode_num(element: &[u8]) -> i64 {
    if element.is_empty() {
        return 0;
    }
    let big_endian: Vec<u8> = element.iter().rev().copied().collect();
    let negative = big_endian[0] & 0x80 != 0;
    let mut result = (big_endian[0] & 0x7f) as i64;
    for &byte in &big_endian[1..] {
        result = (result << 8) + byte as i64;
    }
    if negative {
        -result
    } else {
        result
    }
}

fn push_bool(stack: &mut Vec<Vec<u8>>, value: bool) {
    stack.push(encode_num(if value { 1 } else { 0 }));
}

pub fn verify(stack: &mut Vec<Vec<u8>>) -> bool {
    match stack.pop() {
        Some(top) => decode_num(&top) != 0,
        None => false,
    }
}

pub fn to_altstack(stack: &mut Vec<Vec<u8>>, altstack: &mut Vec<Vec<u8>>) -> bool {
    match stack.pop() {
        Some(top) => {
            altstack.push(top);
            true
        }
        None => false,
    }
}

pub fn from_altstack(stack: &mut Vec<Vec<u8>>, altstack: &mut Vec<Vec<u8>>) -> bool {
    match altstack.pop() {
        Some(top) => {
            stack.push(top);
            true
        }
        None => false,
    }
}

/// Shared `OP_IF`/`OP_NOTIF` branch parser: partitions the remaining queue
/// into true/false arms at the matching `OP_ELSE`/`OP_ENDIF`, tracking
/// nesting so an inner `OP_IF` does not consume the outer terminator.
fn partition_branches(
    queue: &mut VecDeque<Command>,
) -> Option<(Vec<Command>, Vec<Command>)> {
    let mut true_items = Vec::new();
    let mut false_items = Vec::new();
    let mut current_is_true = true;
    let mut depth = 1u32;
    while let Some(item) = queue.pop_front() {
        match &item {
            Command::Op(OP_IF) | Command::Op(OP_NOTIF) => {
                depth += 1;
                if current_is_true {
                    true_items.push(item);
                } else {
                    false_items.push(item);
                }
            }
            Command::Op(OP_ELSE) if depth == 1 => {
                current_is_true = false;
            }
            Command::Op(OP_ENDIF) => {
                if depth == 1 {
                    return Some((true_items, false_items));
                }
                depth -= 1;
                if current_is_true {
                    true_items.push(item);
                } else {
                    false_items.push(item);
                }
            }
            _ => {
                if current_is_true {
                    true_items.push(item);
                } else {
                    false_items.push(item);
                }
            }
        }
    }
    None
}

pub fn branch(stack: &mut Vec<Vec<u8>>, queue: &mut VecDeque<Command>, is_notif: bool) -> bool {
    if stack.is_empty() {
        return false;
    }
    let (true_items, false_items) = match partition_branches(queue) {
        Some(pair) => pair,
        None => return false,
    };
    let condition = decode_num(&stack.pop().unwrap()) != 0;
    let take_true = if is_notif { !condition } else { condition };
    let chosen = if take_true { true_items } else { false_items };
    for item in chosen.into_iter().rev() {
        queue.push_front(item);
    }
    true
}

pub fn checksig(stack: &mut Vec<Vec<u8>>, z: &BigUint) -> bool {
    if stack.len() < 2 {
        return false;
    }
    let sec_pubkey = stack.pop().unwrap();
    let mut der_sig = stack.pop().unwrap();
    der_sig.pop(); // strip the trailing sighash-type byte
    let point = match Secp256k1Point::parse(&sec_pubkey) {
        Ok(point) => point,
        Err(_) => return false,
    };
    let sig = match Signature::parse(&der_sig) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    push_bool(stack, point.verify(z, &sig));
    true
}

/// The historical bare-multisig algorithm, off-by-one bug included: after
/// popping `n` pubkeys and `m` signatures, one extra stack element is
/// discarded before matching signatures against pubkeys in order.
pub fn checkmultisig(stack: &mut Vec<Vec<u8>>, z: &BigUint) -> bool {
    if stack.is_empty() {
        return false;
    }
    let n = decode_num(&stack.pop().unwrap());
    if n < 0 || (stack.len() as i64) < n + 1 {
        return false;
    }
    let mut sec_pubkeys = Vec::with_capacity(n as usize);
    for _ in 0..n {
        sec_pubkeys.push(stack.pop().unwrap());
    }
    let m = decode_num(&stack.pop().unwrap());
    if m < 0 || (stack.len() as i64) < m + 1 {
        return false;
    }
    let mut der_sigs = Vec::with_capacity(m as usize);
    for _ in 0..m {
        let mut sig = stack.pop().unwrap();
        sig.pop();
        der_sigs.push(sig);
    }
    stack.pop(); // off-by-one bug: one extra element is always discarded

    let mut points: VecDeque<Secp256k1Point> = match sec_pubkeys
        .iter()
        .map(|sec| Secp256k1Point::parse(sec))
        .collect::<Result<_, _>>()
    {
        Ok(points) => points,
        Err(_) => return false,
    };
    let sigs: Vec<Signature> = match der_sigs.iter().map(|der| Signature::parse(der)).collect::<Result<_, _>>() {
        Ok(sigs) => sigs,
        Err(_) => return false,
    };

    for sig in &sigs {
        if points.is_empty() {
            push_bool(stack, false);
            return true;
        }
        let mut matched = false;
        while let Some(point) = points.pop_front() {
            if point.verify(z, sig) {
                matched = true;
                break;
            }
        }
        if !matched {
            push_bool(stack, false);
            return true;
        }
    }
    push_bool(stack, true);
    true
}

pub fn checklocktimeverify(stack: &[Vec<u8>], locktime: u32, sequence: u32) -> bool {
    if sequence == 0xffff_ffff {
        return false;
    }
    let top = match stack.last() {
        Some(top) => top,
        None => return false,
    };
    let element = decode_num(top);
    if element < 0 {
        return false;
    }
    const LOCKTIME_THRESHOLD: i64 = 500_000_000;
    if element < LOCKTIME_THRESHOLD && (locktime as i64) > LOCKTIME_THRESHOLD {
        return false;
    }
    (locktime as i64) >= element
}

pub fn checksequenceverify(stack: &[Vec<u8>], version: i32, sequence: u32) -> bool {
    if sequence & (1 << 31) != 0 {
        return false;
    }
    let top = match stack.last() {
        Some(top) => top,
        None => return false,
    };
    let element = decode_num(top);
    if element < 0 {
        return false;
    }
    if element & (1 << 31) != 0 {
        if version < 2 {
            return false;
        }
        if sequence & (1 << 31) != 0 {
            return false;
        }
        if element & (1 << 22) != (sequence as i64) & (1 << 22) {
            return false;
        }
        if element & 0xffff > (sequence as i64) & 0xffff {
            return false;
        }
    }
    true
}

/// Arithmetic, comparison, stack-shuffling, and single-hash opcodes: the
/// ones that touch only the main stack.
pub fn dispatch(code: u8, stack: &mut Vec<Vec<u8>>) -> bool {
    match code {
        0 => {
            stack.push(encode_num(0));
            true
        }
        79 => {
            stack.push(encode_num(-1));
            true
        }
        81..=96 => {
            stack.push(encode_num((code - 80) as i64));
            true
        }
        97 | 176 | 179..=185 => true, // OP_NOP and the reserved OP_NOP1/4..10
        105 => verify(stack),
        106 => false, // OP_RETURN
        109 => {
            if stack.len() < 2 {
                return false;
            }
            stack.pop();
            stack.pop();
            true
        }
        110 => dup_last(stack, 2),
        111 => dup_last(stack, 3),
        112 => {
            if stack.len() < 4 {
                return false;
            }
            let len = stack.len();
            let pair = stack[len - 4..len - 2].to_vec();
            stack.extend(pair);
            true
        }
        113 => {
            if stack.len() < 6 {
                return false;
            }
            let len = stack.len();
            let moved_pair = stack[len - 6..len - 4].to_vec();
            let last4 = stack[len - 4..len].to_vec();
            stack.truncate(len - 6);
            stack.extend(last4);
            stack.extend(moved_pair);
            true
        }
        114 => {
            if stack.len() < 4 {
                return false;
            }
            let len = stack.len();
            let a = stack[len - 4..len - 2].to_vec();
            let b = stack[len - 2..len].to_vec();
            stack.truncate(len - 4);
            stack.extend(b);
            stack.extend(a);
            true
        }
        115 => {
            match stack.last() {
                Some(top) if decode_num(top) != 0 => {
                    let top = top.clone();
                    stack.push(top);
                }
                Some(_) => {}
                None => return false,
            }
            true
        }
        116 => {
            stack.push(encode_num(stack.len() as i64));
            true
        }
        117 => {
            if stack.is_empty() {
                return false;
            }
            stack.pop();
            true
        }
        118 => dup_last(stack, 1),
        119 => {
            if stack.len() < 2 {
                return false;
            }
            let top = stack.pop().unwrap();
            stack.pop();
            stack.push(top);
            true
        }
        120 => {
            if stack.len() < 2 {
                return false;
            }
            let item = stack[stack.len() - 2].clone();
            stack.push(item);
            true
        }
        121 => unary_index(stack, true),
        122 => unary_index(stack, false),
        123 => {
            if stack.len() < 3 {
                return false;
            }
            let item = stack.remove(stack.len() - 3);
            stack.push(item);
            true
        }
        124 => {
            if stack.len() < 2 {
                return false;
            }
            let item = stack.remove(stack.len() - 2);
            stack.push(item);
            true
        }
        125 => {
            if stack.len() < 2 {
                return false;
            }
            let top = stack.last().unwrap().clone();
            stack.insert(stack.len() - 2, top);
            true
        }
        130 => {
            match stack.last() {
                Some(top) => {
                    let len = top.len() as i64;
                    stack.push(encode_num(len));
                    true
                }
                None => false,
            }
        }
        OP_EQUAL => {
            if stack.len() < 2 {
                return false;
            }
            let a = stack.pop().unwrap();
            let b = stack.pop().unwrap();
            push_bool(stack, a == b);
            true
        }
        OP_EQUALVERIFY => {
            if stack.len() < 2 {
                return false;
            }
            let a = stack.pop().unwrap();
            let b = stack.pop().unwrap();
            a == b
        }
        139 => unary_numeric(stack, |n| n + 1),
        140 => unary_numeric(stack, |n| n - 1),
        143 => unary_numeric(stack, |n| -n),
        144 => unary_numeric(stack, |n| n.abs()),
        145 => {
            match stack.pop() {
                Some(top) => {
                    push_bool(stack, decode_num(&top) == 0);
                    true
                }
                None => false,
            }
        }
        146 => {
            match stack.pop() {
                Some(top) => {
                    push_bool(stack, decode_num(&top) != 0);
                    true
                }
                None => false,
            }
        }
        147 => binary_numeric(stack, |a, b| a + b),
        148 => binary_numeric(stack, |a, b| a - b),
        149 => binary_numeric(stack, |a, b| a * b), // OP_MUL: disabled in consensus, kept here
        154 => binary_bool(stack, |a, b| a != 0 && b != 0),
        155 => binary_bool(stack, |a, b| a != 0 || b != 0),
        156 => binary_bool(stack, |a, b| a == b),
        157 => binary_bool(stack, |a, b| a == b) && verify(stack),
        158 => binary_bool(stack, |a, b| a != b),
        159 => binary_bool(stack, |a, b| a < b),
        160 => binary_bool(stack, |a, b| a > b),
        161 => binary_bool(stack, |a, b| a <= b),
        162 => binary_bool(stack, |a, b| a >= b),
        163 => binary_numeric(stack, |a, b| a.min(b)),
        164 => binary_numeric(stack, |a, b| a.max(b)),
        165 => {
            if stack.len() < 3 {
                return false;
            }
            let maximum = decode_num(&stack.pop().unwrap());
            let minimum = decode_num(&stack.pop().unwrap());
            let element = decode_num(&stack.pop().unwrap());
            push_bool(stack, minimum <= element && element < maximum);
            true
        }
        166 => unary_hash(stack, |data| {
            use ripemd::{Digest, Ripemd160};
            Ripemd160::digest(data).to_vec()
        }),
        167 => unary_hash(stack, |data| {
            use sha1::{Digest, Sha1};
            Sha1::digest(data).to_vec()
        }),
        168 => unary_hash(stack, |data| {
            use sha2::{Digest, Sha256};
            Sha256::digest(data).to_vec()
        }),
        OP_HASH160 => unary_hash(stack, |data| crate::hash::hash160(data).to_vec()),
        170 => unary_hash(stack, |data| crate::hash::hash256(data).to_vec()),
        171 => true, // OP_CODESEPARATOR: no-op without a signature-hash cache
        _ => false,
    }
}

fn dup_last(stack: &mut Vec<Vec<u8>>, n: usize) -> bool {
    if stack.len() < n {
        return false;
    }
    let tail: Vec<Vec<u8>> = stack[stack.len() - n..].to_vec();
    stack.extend(tail);
    true
}

fn unary_index(stack: &mut Vec<Vec<u8>>, copy: bool) -> bool {
    if stack.is_empty() {
        return false;
    }
    let n = decode_num(&stack.pop().unwrap());
    if n < 0 || (stack.len() as i64) < n + 1 {
        return false;
    }
    let idx = stack.len() - 1 - n as usize;
    if copy {
        let item = stack[idx].clone();
        stack.push(item);
    } else if n > 0 {
        let item = stack.remove(idx);
        stack.push(item);
    }
    true
}

fn unary_numeric(stack: &mut Vec<Vec<u8>>, f: impl Fn(i64) -> i64) -> bool {
    match stack.pop() {
        Some(top) => {
            stack.push(encode_num(f(decode_num(&top))));
            true
        }
        None => false,
    }
}

fn unary_hash(stack: &mut Vec<Vec<u8>>, f: impl Fn(&[u8]) -> Vec<u8>) -> bool {
    match stack.pop() {
        Some(top) => {
            stack.push(f(&top));
            true
        }
        None => false,
    }
}

/// `a` is the element popped second (further from the top), `b` is popped
/// first, matching the original's `element1 = pop(); element2 = pop()`
/// naming for non-commutative operators (`sub`, comparisons).
fn binary_numeric(stack: &mut Vec<Vec<u8>>, f: impl Fn(i64, i64) -> i64) -> bool {
    if stack.len() < 2 {
        return false;
    }
    let b = decode_num(&stack.pop().unwrap());
    let a = decode_num(&stack.pop().unwrap());
    stack.push(encode_num(f(a, b)));
    true
}

fn binary_bool(stack: &mut Vec<Vec<u8>>, f: impl Fn(i64, i64) -> bool) -> bool {
    if stack.len() < 2 {
        return false;
    }
    let b = decode_num(&stack.pop().unwrap());
    let a = decode_num(&stack.pop().unwrap());
    push_bool(stack, f(a, b));
    true
}

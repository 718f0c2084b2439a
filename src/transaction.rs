//! Transactions: parsing, the legacy signature hash, and input verification.

use crate::constants::SIGHASH_ALL;
use crate::error::{Error, Result};
use crate::hash::{encode_varint, hash256, read_varint};
use crate::private_key::PrivateKey;
use crate::script::{Command, Script};
use crate::tx_fetcher::FetchTransaction;
use num_bigint::BigUint;
use std::io::{Cursor, Read};
use tracing::warn;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tx {
    version: u32,
    tx_ins: Vec<TxIn>,
    tx_outs: Vec<TxOut>,
    locktime: u32,
    testnet: bool,
}

impl Tx {
    pub fn new(version: u32, tx_ins: Vec<TxIn>, tx_outs: Vec<TxOut>, locktime: u32, testnet: bool) -> Self {
        Self { version, tx_ins, tx_outs, locktime, testnet }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn tx_ins(&self) -> &[TxIn] {
        &self.tx_ins
    }

    pub fn tx_outs(&self) -> &[TxOut] {
        &self.tx_outs
    }

    pub fn locktime(&self) -> u32 {
        self.locktime
    }

    pub fn testnet(&self) -> bool {
        self.testnet
    }

    pub fn hash(&self) -> Result<[u8; 32]> {
        let mut digest = hash256(&self.serialize()?);
        digest.reverse();
        Ok(digest)
    }

    pub fn id(&self) -> Result<String> {
        Ok(hex::encode(self.hash()?))
    }

    /// Detects and undoes the SegWit marker splice so legacy parsing can
    /// proceed, then restores the true locktime from the tail of the buffer.
    pub fn parse(bytes: &[u8], testnet: bool) -> Result<Self> {
        if bytes.get(4) == Some(&0x00) {
            let mut spliced = Vec::with_capacity(bytes.len() - 2);
            spliced.extend_from_slice(&bytes[..4]);
            spliced.extend_from_slice(&bytes[6..]);
            let mut tx = Self::parse_legacy(&mut Cursor::new(&spliced), testnet)?;
            let tail = &bytes[bytes.len() - 4..];
            tx.locktime = u32::from_le_bytes(tail.try_into().unwrap());
            Ok(tx)
        } else {
            Self::parse_legacy(&mut Cursor::new(bytes), testnet)
        }
    }

    fn parse_legacy<R: Read>(reader: &mut R, testnet: bool) -> Result<Self> {
        let mut version_buf = [0u8; 4];
        reader.read_exact(&mut version_buf).map_err(|_| Error::Parse("tx version"))?;
        let version = u32::from_le_bytes(version_buf);

        let n_in = read_varint(reader)?;
        let mut tx_ins = Vec::with_capacity(n_in as usize);
        for _ in 0..n_in {
            tx_ins.push(TxIn::parse(reader)?);
        }

        let n_out = read_varint(reader)?;
        let mut tx_outs = Vec::with_capacity(n_out as usize);
        for _ in 0..n_out {
            tx_outs.push(TxOut::parse(reader)?);
        }

        let mut locktime_buf = [0u8; 4];
        reader.read_exact(&mut locktime_buf).map_err(|_| Error::Parse("tx locktime"))?;
        let locktime = u32::from_le_bytes(locktime_buf);

        Ok(Self { version, tx_ins, tx_outs, locktime, testnet })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = self.version.to_le_bytes().to_vec();
        out.extend_from_slice(&encode_varint(self.tx_ins.len() as u64));
        for tx_in in &self.tx_ins {
            out.extend_from_slice(&tx_in.serialize()?);
        }
        out.extend_from_slice(&encode_varint(self.tx_outs.len() as u64));
        for tx_out in &self.tx_outs {
            out.extend_from_slice(&tx_out.serialize()?);
        }
        out.extend_from_slice(&self.locktime.to_le_bytes());
        Ok(out)
    }

    pub fn fee<F: FetchTransaction>(&self, fetcher: &F) -> Result<i64> {
        let mut in_value = 0i64;
        for tx_in in &self.tx_ins {
            in_value += tx_in.value(fetcher, self.testnet)? as i64;
        }
        let out_value: i64 = self.tx_outs.iter().map(|out| out.amount as i64).sum();
        Ok(in_value - out_value)
    }

    /// Builds the modified-transaction digest that `input_index`'s signature
    /// actually signs.
    pub fn sig_hash<F: FetchTransaction>(
        &self,
        input_index: usize,
        hash_type: u32,
        redeem_script: Option<&Script>,
        fetcher: &F,
    ) -> Result<BigUint> {
        let mut out = self.version.to_le_bytes().to_vec();
        out.extend_from_slice(&encode_varint(self.tx_ins.len() as u64));
        for (i, tx_in) in self.tx_ins.iter().enumerate() {
            let script_sig = if i == input_index {
                match redeem_script {
                    Some(redeem) => redeem.clone(),
                    None => tx_in.script_pubkey(fetcher, self.testnet)?,
                }
            } else {
                Script::default()
            };
            let blanked = TxIn {
                script_sig,
                ..tx_in.clone()
            };
            out.extend_from_slice(&blanked.serialize()?);
        }
        out.extend_from_slice(&encode_varint(self.tx_outs.len() as u64));
        for tx_out in &self.tx_outs {
            out.extend_from_slice(&tx_out.serialize()?);
        }
        out.extend_from_slice(&self.locktime.to_le_bytes());
        out.extend_from_slice(&hash_type.to_le_bytes());
        Ok(BigUint::from_bytes_be(&hash256(&out)))
    }

    pub fn verify_input<F: FetchTransaction>(&self, input_index: usize, fetcher: &F) -> bool {
        match self.verify_input_inner(input_index, fetcher) {
            Ok(ok) => ok,
            Err(err) => {
                warn!(%err, input_index, "input verification failed");
                false
            }
        }
    }

    fn verify_input_inner<F: FetchTransaction>(&self, input_index: usize, fetcher: &F) -> Result<bool> {
        let tx_in = self
            .tx_ins
            .get(input_index)
            .ok_or(Error::Parse("input index out of range"))?;
        let script_pubkey = tx_in.script_pubkey(fetcher, self.testnet)?;

        let redeem_script = if script_pubkey.is_p2sh() {
            match tx_in.script_sig.commands().last() {
                Some(Command::Data(raw)) => {
                    let mut prefixed = encode_varint(raw.len() as u64);
                    prefixed.extend_from_slice(raw);
                    Some(Script::parse(&mut Cursor::new(prefixed))?)
                }
                _ => None,
            }
        } else {
            None
        };

        let z = self.sig_hash(input_index, SIGHASH_ALL, redeem_script.as_ref(), fetcher)?;
        let combined = tx_in.script_sig.combine(&script_pubkey);
        Ok(combined.evaluate(&z, self.locktime, self.version as i32, tx_in.sequence))
    }

    pub fn verify<F: FetchTransaction>(&self, fetcher: &F) -> bool {
        match self.fee(fetcher) {
            Ok(fee) if fee < 0 => return false,
            Err(err) => {
                warn!(%err, "fee computation failed during verify");
                return false;
            }
            _ => {}
        }
        (0..self.tx_ins.len()).all(|i| self.verify_input(i, fetcher))
    }

    pub fn sign_input<F: FetchTransaction>(
        &mut self,
        pk: &PrivateKey,
        input_index: usize,
        fetcher: &F,
    ) -> Result<bool> {
        let z = self.sig_hash(input_index, SIGHASH_ALL, None, fetcher)?;
        let mut sig = pk.sign(&z).der();
        sig.push(SIGHASH_ALL as u8);
        let sec = pk.public_point().sec(true);
        let tx_in = self
            .tx_ins
            .get_mut(input_index)
            .ok_or(Error::Parse("input index out of range"))?;
        tx_in.script_sig = Script::new(vec![Command::Data(sig), Command::Data(sec)]);
        Ok(self.verify_input(input_index, fetcher))
    }

    /// Exactly one input, `prev_tx = 0`, `prev_index = 0xffffffff`.
    pub fn is_coinbase(&self) -> bool {
        matches!(self.tx_ins.as_slice(), [single] if single.prev_tx == [0u8; 32] && single.prev_index == 0xffff_ffff)
    }

    /// BIP-34: the coinbase `script_sig`'s first push, little-endian.
    pub fn coinbase_height(&self) -> Option<u32> {
        if !self.is_coinbase() {
            return None;
        }
        match self.tx_ins[0].script_sig.commands().first() {
            Some(Command::Data(height)) => {
                let mut buf = [0u8; 4];
                let n = height.len().min(4);
                buf[..n].copy_from_slice(&height[..n]);
                Some(u32::from_le_bytes(buf))
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxIn {
    prev_tx: [u8; 32],
    prev_index: u32,
    script_sig: Script,
    sequence: u32,
}

impl TxIn {
    pub fn new(prev_tx: [u8; 32], prev_index: u32, script_sig: Script, sequence: u32) -> Self {
        Self { prev_tx, prev_index, script_sig, sequence }
    }

    pub fn prev_tx(&self) -> &[u8; 32] {
        &self.prev_tx
    }

    pub fn prev_index(&self) -> u32 {
        self.prev_index
    }

    pub fn script_sig(&self) -> &Script {
        &self.script_sig
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut prev_tx = [0u8; 32];
        reader.read_exact(&mut prev_tx).map_err(|_| Error::Parse("txin prev_tx"))?;
        prev_tx.reverse();

        let mut index_buf = [0u8; 4];
        reader.read_exact(&mut index_buf).map_err(|_| Error::Parse("txin prev_index"))?;
        let prev_index = u32::from_le_bytes(index_buf);

        let script_sig = Script::parse(reader)?;

        let mut sequence_buf = [0u8; 4];
        reader.read_exact(&mut sequence_buf).map_err(|_| Error::Parse("txin sequence"))?;
        let sequence = u32::from_le_bytes(sequence_buf);

        Ok(Self { prev_tx, prev_index, script_sig, sequence })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = self.prev_tx;
        out.reverse();
        let mut result = out.to_vec();
        result.extend_from_slice(&self.prev_index.to_le_bytes());
        result.extend_from_slice(&self.script_sig.serialize()?);
        result.extend_from_slice(&self.sequence.to_le_bytes());
        Ok(result)
    }

    fn fetch_tx<F: FetchTransaction>(&self, fetcher: &F, testnet: bool) -> Result<Tx> {
        fetcher.fetch(&hex::encode(self.prev_tx), testnet)
    }

    pub fn value<F: FetchTransaction>(&self, fetcher: &F, testnet: bool) -> Result<u64> {
        let tx = self.fetch_tx(fetcher, testnet)?;
        tx.tx_outs
            .get(self.prev_index as usize)
            .map(|out| out.amount)
            .ok_or(Error::Parse("prev_index out of range"))
    }

    pub fn script_pubkey<F: FetchTransaction>(&self, fetcher: &F, testnet: bool) -> Result<Script> {
        let tx = self.fetch_tx(fetcher, testnet)?;
        tx.tx_outs
            .get(self.prev_index as usize)
            .map(|out| out.script_pubkey.clone())
            .ok_or(Error::Parse("prev_index out of range"))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxOut {
    amount: u64,
    script_pubkey: Script,
}

impl TxOut {
    pub fn new(amount: u64, script_pubkey: Script) -> Self {
        Self { amount, script_pubkey }
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn script_pubkey(&self) -> &Script {
        &self.script_pubkey
    }

    fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let mut amount_buf = [0u8; 8];
        reader.read_exact(&mut amount_buf).map_err(|_| Error::Parse("txout amount"))?;
        let amount = u64::from_le_bytes(amount_buf);
        let script_pubkey = Script::parse(reader)?;
        Ok(Self { amount, script_pubkey })
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = self.amount.to_le_bytes().to_vec();
        out.extend_from_slice(&self.script_pubkey.serialize()?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Command;
    use std::collections::HashMap;

    struct FixtureFetcher(HashMap<String, Tx>);

    impl FetchTransaction for FixtureFetcher {
        fn fetch(&self, tx_id: &str, _testnet: bool) -> Result<Tx> {
            self.0.get(tx_id).cloned().ok_or_else(|| Error::FetchFailure(tx_id.to_string()))
        }
    }

    #[test]
    fn parses_fee_from_four_input_transaction() {
        let hex_str = "010000000456919960ac691763688d3d3bcea9ad6ecaf875df5339e148a1fc61c6ed7a069e010000006a47304402204585bcdef85e6b1c6af5c2669d4830ff86e42dd205c0e089bc2a821657e951c002201024a10366077f87d6bce1f7100ad8cfa8a064b39d4e8fe4ea13a7b71aa8180f012102f0da57e85eec2934a82a585ea337ce2f4998b50ae699dd79f5880e253dafafb7feffffffeb8f51f4038dc17e6313cf831d4f02281c2a468bde0fafd37f1bf882729e7fd3000000006a47304402207899531a52d59a6de200179928ca900254a36b8dff8bb75f5f5d71b1cdc26125022008b422690b8461cb52c3cc30330b23d574351872b7c361e9aae3649071c1a7160121035d5c93d9ac96881f19ba1f686f15f009ded7c62efe85a872e6a19b43c15a2937feffffff567bf40595119d1bb8a3037c356efd56170b64cbcc160fb028fa10704b45d775000000006a47304402204c7c7818424c7f7911da6cddc59655a70af1cb5eaf17c69dadbfc74ffa0b662f02207599e08bc8023693ad4e9527dc42c34210f7a7d1d1ddfc8492b654a11e7620a0012102158b46fbdff65d0172b7989aec8850aa0dae49abfb84c81ae6e5b251a58ace5cfeffffffd63a5e6c16e620f86f375925b21cabaf736c779f88fd04dcad51d26690f7f345010000006a47304402200633ea0d3314bea0d95b3cd8dadb2ef79ea8331ffe1e61f762c0f6daea0fabde022029f23b3e9c30f080446150b23852028751635dcee2be669c2a1686a4b5edf304012103ffd6f4a67e94aba353a00882e563ff2722eb4cff0ad6006e86ee20dfe7520d55feffffff0251430f00000000001976a914ab0c0b2e98b1ab6dbf67d4750b0a56244948a87988ac005a6202000000001976a9143c82d7df364eb6c75be8c80df2b3eda8db57397088ac46430600";
        let bytes = hex::decode(hex_str).unwrap();
        let tx = Tx::parse(&bytes, false).unwrap();
        assert_eq!(tx.tx_ins.len(), 4);
        assert_eq!(tx.tx_outs.len(), 2);
    }

    #[test]
    fn fee_from_four_input_transaction_matches_known_vector() {
        let hex_str = "010000000456919960ac691763688d3d3bcea9ad6ecaf875df5339e148a1fc61c6ed7a069e010000006a47304402204585bcdef85e6b1c6af5c2669d4830ff86e42dd205c0e089bc2a821657e951c002201024a10366077f87d6bce1f7100ad8cfa8a064b39d4e8fe4ea13a7b71aa8180f012102f0da57e85eec2934a82a585ea337ce2f4998b50ae699dd79f5880e253dafafb7feffffffeb8f51f4038dc17e6313cf831d4f02281c2a468bde0fafd37f1bf882729e7fd3000000006a47304402207899531a52d59a6de200179928ca900254a36b8dff8bb75f5f5d71b1cdc26125022008b422690b8461cb52c3cc30330b23d574351872b7c361e9aae3649071c1a7160121035d5c93d9ac96881f19ba1f686f15f009ded7c62efe85a872e6a19b43c15a2937feffffff567bf40595119d1bb8a3037c356efd56170b64cbcc160fb028fa10704b45d775000000006a47304402204c7c7818424c7f7911da6cddc59655a70af1cb5eaf17c69dadbfc74ffa0b662f02207599e08bc8023693ad4e9527dc42c34210f7a7d1d1ddfc8492b654a11e7620a0012102158b46fbdff65d0172b7989aec8850aa0dae49abfb84c81ae6e5b251a58ace5cfeffffffd63a5e6c16e620f86f375925b21cabaf736c779f88fd04dcad51d26690f7f345010000006a47304402200633ea0d3314bea0d95b3cd8dadb2ef79ea8331ffe1e61f762c0f6daea0fabde022029f23b3e9c30f080446150b23852028751635dcee2be669c2a1686a4b5edf304012103ffd6f4a67e94aba353a00882e563ff2722eb4cff0ad6006e86ee20dfe7520d55feffffff0251430f00000000001976a914ab0c0b2e98b1ab6dbf67d4750b0a56244948a87988ac005a6202000000001976a9143c82d7df364eb6c75be8c80df2b3eda8db57397088ac46430600";
        let bytes = hex::decode(hex_str).unwrap();
        let tx = Tx::parse(&bytes, false).unwrap();

        // Four fixture previous transactions whose referenced outputs sum to
        // 41,140,773 sats against 41,000,273 sats of real outputs: a fee of
        // 140,500 sats.
        let mut fixtures = HashMap::new();
        fixtures.insert(
            hex::encode(tx.tx_ins[0].prev_tx),
            Tx::new(
                1,
                Vec::new(),
                vec![TxOut::new(0, Script::default()), TxOut::new(10_000_000, Script::default())],
                0,
                false,
            ),
        );
        fixtures.insert(
            hex::encode(tx.tx_ins[1].prev_tx),
            Tx::new(1, Vec::new(), vec![TxOut::new(10_000_000, Script::default())], 0, false),
        );
        fixtures.insert(
            hex::encode(tx.tx_ins[2].prev_tx),
            Tx::new(1, Vec::new(), vec![TxOut::new(10_000_000, Script::default())], 0, false),
        );
        fixtures.insert(
            hex::encode(tx.tx_ins[3].prev_tx),
            Tx::new(
                1,
                Vec::new(),
                vec![TxOut::new(0, Script::default()), TxOut::new(11_140_773, Script::default())],
                0,
                false,
            ),
        );
        let fetcher = FixtureFetcher(fixtures);

        assert_eq!(tx.fee(&fetcher).unwrap(), 140_500);
    }

    #[test]
    fn detects_coinbase_and_decodes_bip34_height() {
        let raw_tx = hex::decode("01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff5e03d71b07254d696e656420627920416e74506f6f6c20626a31312f4542312f4144362f43205914293101fabe6d6d678e2c8c34afc36896e7d9402824ed38e856676ee94bfdb0c6c4bcd8b2e5666a0400000000000000c7270000a5e00e00ffffffff01faf20b58000000001976a914338c84849423992471bffb1a54a8d9b1d69dc28a88ac00000000").unwrap();
        let tx = Tx::parse(&raw_tx, false).unwrap();
        assert!(tx.is_coinbase());
        assert_eq!(tx.coinbase_height(), Some(465_879));
    }

    #[test]
    fn non_coinbase_has_no_bip34_height() {
        let hex_str = "0100000001813f79011acb80925dfe69b3def355fe914bd1d96a3f5f71bf8303c6a989c7d1000000006b483045022100ed81ff192e75a3fd2304004dcadb746fa5e24c5031ccfcf21320b0277457c98f02207a986d955c6e0cb35d446a89d3f56100f4d7f67801c31967743a9c8e10615bed01210349fc4e631e3624a545de3f89f5d8684c7b8138bd94bdd531d2e213bf016b278afeffffff02a135ef01000000001976a914bc3b654dca7e56b04dca18f2566cdaf02e8d9ada88ac99c39800000000001976a9141c4bc762dd5423e332166702cb75f40df79fea1288ac19430600";
        let bytes = hex::decode(hex_str).unwrap();
        let tx = Tx::parse(&bytes, false).unwrap();
        assert!(!tx.is_coinbase());
        assert_eq!(tx.coinbase_height(), None);
    }

    #[test]
    fn sign_input_produces_expected_serialization() {
        let pk = PrivateKey::new(BigUint::from(8675309u32));
        let stream_hex = "010000000199a24308080ab26e6fb65c4eccfadf76749bb5bfa8cb08f291320b3c21e56f0d0d00000000ffffffff02408af701000000001976a914d52ad7ca9b3d096a38e752c2018e6fbc40cdf26f88ac80969800000000001976a914507b27411ccf7f16f10297de6cef3f291623eddf88ac00000000";
        let bytes = hex::decode(stream_hex).unwrap();
        let mut tx = Tx::parse(&bytes, true).unwrap();

        let prev_script = Script::new(vec![
            Command::Op(0x76),
            Command::Op(0xa9),
            Command::Data(hex::decode("d52ad7ca9b3d096a38e752c2018e6fbc40cdf26").unwrap()),
            Command::Op(0x88),
            Command::Op(0xac),
        ]);
        let mut fixtures = HashMap::new();
        fixtures.insert(
            hex::encode(tx.tx_ins[0].prev_tx),
            Tx::new(1, Vec::new(), vec![TxOut::new(0, prev_script)], 0, true),
        );
        let fetcher = FixtureFetcher(fixtures);

        assert!(tx.sign_input(&pk, 0, &fetcher).unwrap());
        let want = "010000000199a24308080ab26e6fb65c4eccfadf76749bb5bfa8cb08f291320b3c21e56f0d0d0000006b4830450221008ed46aa2cf12d6d81065bfabe903670165b538f65ee9a3385e6327d80c66d3b502203124f804410527497329ec4715e18558082d489b218677bd029e7fa306a72236012103935581e52c354cd2f484fe8ed83af7a3097005b2f9c60bff71d35bd795f54b67ffffffff02408af701000000001976a914d52ad7ca9b3d096a38e752c2018e6fbc40cdf26f88ac80969800000000001976a914507b27411ccf7f16f10297de6cef3f291623eddf88ac00000000";
        assert_eq!(hex::encode(tx.serialize().unwrap()), want);
    }
}

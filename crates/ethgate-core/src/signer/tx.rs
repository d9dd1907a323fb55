//! Legacy (pre-typed) Ethereum transactions and their RLP encoding.
//!
//! ```text
//! unsigned, legacy   : rlp[nonce, gasPrice, gasLimit, to, value, data]
//! unsigned, EIP-155  : rlp[nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]
//! signed             : rlp[nonce, gasPrice, gasLimit, to, value, data, v, r, s]
//!
//! v = 27 + recid                 (legacy)
//! v = 35 + 2 * chainId + recid   (EIP-155)
//! ```

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{BufMut, Encodable, Header};

/// Transaction the gateway builds for contract writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl LegacyTransaction {
    fn fields_len(&self) -> usize {
        self.nonce.length() +
            self.gas_price.length() +
            self.gas_limit.length() +
            self.to.length() +
            self.value.length() +
            self.data.length()
    }

    fn encode_fields(&self, out: &mut dyn BufMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.data.encode(out);
    }

    /// Hash the signer commits to; `chain_id` selects EIP-155 replay protection.
    #[must_use]
    pub fn signing_hash(&self, chain_id: Option<u64>) -> B256 {
        let mut out = Vec::new();
        match chain_id {
            Some(chain_id) => {
                let payload_length = self.fields_len() + chain_id.length() + 0u8.length() * 2;
                Header { list: true, payload_length }.encode(&mut out);
                self.encode_fields(&mut out);
                chain_id.encode(&mut out);
                0u8.encode(&mut out);
                0u8.encode(&mut out);
            }
            None => {
                Header { list: true, payload_length: self.fields_len() }.encode(&mut out);
                self.encode_fields(&mut out);
            }
        }
        keccak256(&out)
    }

    /// Attaches a signature made over [`Self::signing_hash`].
    #[must_use]
    pub fn into_signed(
        self,
        recovery_id: u8,
        r: U256,
        s: U256,
        chain_id: Option<u64>,
    ) -> SignedTransaction {
        let v = match chain_id {
            Some(chain_id) => 35 + 2 * chain_id + u64::from(recovery_id),
            None => 27 + u64::from(recovery_id),
        };
        SignedTransaction { tx: self, v, r, s }
    }
}

/// A transaction with its `(v, r, s)` signature, ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: LegacyTransaction,
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

impl SignedTransaction {
    fn payload_length(&self) -> usize {
        self.tx.fields_len() + self.v.length() + self.r.length() + self.s.length()
    }

    /// Chain id this signature is bound to, if it is replay protected.
    #[must_use]
    pub fn chain_id(&self) -> Option<u64> {
        (self.v >= 35).then(|| (self.v - 35) / 2)
    }

    /// Recovery id (0 or 1) encoded in `v`.
    #[must_use]
    pub fn recovery_id(&self) -> u8 {
        let parity = if self.v >= 35 { (self.v - 35) % 2 } else { self.v.saturating_sub(27) };
        u8::from(parity == 1)
    }

    /// RLP bytes for broadcast.
    #[must_use]
    pub fn rlp_bytes(&self) -> Bytes {
        let mut out = Vec::with_capacity(self.length());
        self.encode(&mut out);
        Bytes::from(out)
    }

    /// Transaction hash, the keccak of the broadcast bytes.
    #[must_use]
    pub fn hash(&self) -> B256 {
        keccak256(self.rlp_bytes())
    }
}

impl Encodable for SignedTransaction {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.payload_length() }.encode(out);
        self.tx.encode_fields(out);
        self.v.encode(out);
        self.r.encode(out);
        self.s.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

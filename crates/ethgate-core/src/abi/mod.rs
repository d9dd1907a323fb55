//! Contract ABI encoding and the transaction pipeline built on it.
//!
//! [`ContractAbi`] wraps a parsed JSON ABI and produces `0x`-prefixed call data (4-byte
//! selector followed by the head/tail argument encoding), and decodes return data back into
//! typed values. [`TxBuilder`] composes it with the node pool and the signer.

pub mod tx_builder;

use alloy_dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy_json_abi::{Function, JsonAbi};
use alloy_primitives::Bytes;
use thiserror::Error;

pub use tx_builder::{SignedSubmission, TxBuilder};

#[derive(Debug, Error)]
pub enum AbiError {
    /// The ABI document is not valid JSON ABI.
    #[error("invalid ABI: {0}")]
    Parse(String),

    #[error("method {0} not found in ABI")]
    MethodNotFound(String),

    #[error("method {method} takes {expected} arguments, got {got}")]
    ArgumentCount { method: String, expected: usize, got: usize },

    /// Arguments do not match the parameter types.
    #[error("encoding error: {0}")]
    Encode(String),

    /// Return data does not match the output types.
    #[error("decoding error: {0}")]
    Decode(String),
}

/// Parsed contract ABI.
#[derive(Debug, Clone)]
pub struct ContractAbi {
    abi: JsonAbi,
}

impl ContractAbi {
    /// Parses a JSON ABI document (the array form emitted by compilers).
    ///
    /// # Errors
    ///
    /// Returns [`AbiError::Parse`] for malformed JSON or entries.
    pub fn from_json(json: &str) -> Result<Self, AbiError> {
        serde_json::from_str::<JsonAbi>(json)
            .map(|abi| Self { abi })
            .map_err(|e| AbiError::Parse(e.to_string()))
    }

    #[must_use]
    pub fn inner(&self) -> &JsonAbi {
        &self.abi
    }

    /// Resolves `method`, preferring the overload with `arity` inputs.
    fn function(&self, method: &str, arity: usize) -> Result<&Function, AbiError> {
        let overloads = self
            .abi
            .function(method)
            .filter(|overloads| !overloads.is_empty())
            .ok_or_else(|| AbiError::MethodNotFound(method.to_string()))?;

        if let Some(function) = overloads.iter().find(|f| f.inputs.len() == arity) {
            return Ok(function);
        }
        let expected = overloads[0].inputs.len();
        Err(AbiError::ArgumentCount { method: method.to_string(), expected, got: arity })
    }

    /// ABI-encodes a call to `method`; returns selector plus arguments.
    ///
    /// # Errors
    ///
    /// [`AbiError::MethodNotFound`], [`AbiError::ArgumentCount`], or [`AbiError::Encode`] when
    /// a value does not match its parameter type.
    pub fn pack_bytes(&self, method: &str, args: &[DynSolValue]) -> Result<Bytes, AbiError> {
        let function = self.function(method, args.len())?;
        function
            .abi_encode_input(args)
            .map(Bytes::from)
            .map_err(|e| AbiError::Encode(e.to_string()))
    }

    /// [`Self::pack_bytes`] as a `0x`-prefixed hex string.
    ///
    /// # Errors
    ///
    /// See [`Self::pack_bytes`].
    pub fn pack(&self, method: &str, args: &[DynSolValue]) -> Result<String, AbiError> {
        self.pack_bytes(method, args).map(|data| data.to_string())
    }

    /// Coerces string arguments against the parameter types, then packs them.
    ///
    /// Arrays and tuples use the bracketed form, e.g. `"[1,2,3]"`.
    ///
    /// # Errors
    ///
    /// See [`Self::pack_bytes`]; unparsable strings are [`AbiError::Encode`].
    pub fn pack_strings(&self, method: &str, args: &[&str]) -> Result<String, AbiError> {
        let function = self.function(method, args.len())?;
        let values = function
            .inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                let ty: DynSolType =
                    param.resolve().map_err(|e| AbiError::Encode(e.to_string()))?;
                ty.coerce_str(arg).map_err(|e| {
                    AbiError::Encode(format!("argument {:?} as {ty}: {e}", param.name))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.pack(method, &values)
    }

    /// Decodes the return data of `method`, given as `0x`-prefixed or bare hex.
    ///
    /// Overloaded methods decode against the first declaration; use [`Self::unpack_call`] to
    /// pick the overload that was packed.
    ///
    /// # Errors
    ///
    /// [`AbiError::MethodNotFound`], or [`AbiError::Decode`] for bad hex or mismatched data.
    pub fn unpack(&self, method: &str, output: &str) -> Result<Vec<DynSolValue>, AbiError> {
        let function = self
            .abi
            .function(method)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| AbiError::MethodNotFound(method.to_string()))?;
        decode_output(function, output)
    }

    /// Decodes the return data of the `method` overload taking `arity` inputs, the same
    /// overload [`Self::pack_bytes`] selects for that many arguments.
    ///
    /// # Errors
    ///
    /// See [`Self::unpack`]; [`AbiError::ArgumentCount`] when no overload has `arity` inputs.
    pub fn unpack_call(
        &self,
        method: &str,
        arity: usize,
        output: &str,
    ) -> Result<Vec<DynSolValue>, AbiError> {
        decode_output(self.function(method, arity)?, output)
    }
}

fn decode_output(function: &Function, output: &str) -> Result<Vec<DynSolValue>, AbiError> {
    let hex_text = output.strip_prefix("0x").unwrap_or(output);
    let data = hex::decode(hex_text).map_err(|e| AbiError::Decode(e.to_string()))?;
    function.abi_decode_output(&data, true).map_err(|e| AbiError::Decode(e.to_string()))
}

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha2::{Digest, Sha256};

use hogvm_core::{
    VmError, VmResult,
    module::{Module, StlContext, StlFunction, items_arg, str_arg},
    val::Value,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Default)]
pub struct CryptoModule;

impl CryptoModule {
    pub fn new() -> Self {
        Self
    }

    fn md5_hex(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        let data = str_arg("md5Hex", args, 0)?;
        Ok(Value::from(hex::encode(Md5::digest(data.as_bytes()))))
    }

    fn sha256_hex(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        let data = str_arg("sha256Hex", args, 0)?;
        Ok(Value::from(hex::encode(Sha256::digest(data.as_bytes()))))
    }

    /// HMAC-SHA256 keyed by the first element over the second, then re-keyed
    /// by each digest over every following element.
    fn sha256_hmac_chain_hex(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let items = items_arg("sha256HmacChainHex", args, 0)?;
        if items.len() < 2 {
            return Err(VmError::InvalidOperation(
                "sha256HmacChainHex() needs at least two elements".into(),
            ));
        }
        let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
        let mut digest = Self::hmac(parts[0].as_bytes(), parts[1].as_bytes())?;
        for part in &parts[2..] {
            digest = Self::hmac(&digest, part.as_bytes())?;
        }
        Ok(Value::from(hex::encode(digest)))
    }

    fn hmac(key: &[u8], data: &[u8]) -> VmResult<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| VmError::InvalidOperation(format!("invalid HMAC key: {e}")))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn base64_encode(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let data = str_arg("base64Encode", args, 0)?;
        Ok(Value::from(STANDARD.encode(data.as_bytes())))
    }

    fn decode(data: &str) -> Option<String> {
        let bytes = STANDARD.decode(data.trim()).ok()?;
        String::from_utf8(bytes).ok()
    }

    fn base64_decode(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let data = str_arg("base64Decode", args, 0)?;
        Self::decode(data)
            .map(Value::from)
            .ok_or_else(|| VmError::script("Error", "base64Decode() got invalid base64 input"))
    }

    /// Like `base64Decode`, but yields an empty string for invalid input.
    fn try_base64_decode(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let data = str_arg("tryBase64Decode", args, 0)?;
        Ok(Value::from(Self::decode(data).unwrap_or_default()))
    }
}

impl Module for CryptoModule {
    fn name(&self) -> &str {
        "crypto"
    }

    fn description(&self) -> &str {
        "Hashing and base64 encoding"
    }

    fn functions(&self) -> Vec<StlFunction> {
        vec![
            StlFunction::pure("md5Hex", 1, Some(1), Self::md5_hex),
            StlFunction::pure("sha256Hex", 1, Some(1), Self::sha256_hex),
            StlFunction::pure("sha256HmacChainHex", 1, Some(1), Self::sha256_hmac_chain_hex),
            StlFunction::pure("base64Encode", 1, Some(1), Self::base64_encode),
            StlFunction::pure("base64Decode", 1, Some(1), Self::base64_decode),
            StlFunction::pure("tryBase64Decode", 1, Some(1), Self::try_base64_decode),
        ]
    }
}

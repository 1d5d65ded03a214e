//! Encoding of the serialized account payload.

use crate::accounts::model::{Account, AccountProfile};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// What the payload carries. Identifying fields are embedded too, but the
/// row's own attributes win whenever the two disagree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountPayload {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub phone_number_identifier: Option<Uuid>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub profile: AccountProfile,
}

impl AccountPayload {
    pub fn from_account(account: &Account) -> Self {
        Self {
            number: Some(account.number.clone()),
            phone_number_identifier: Some(account.phone_number_identifier),
            username: account.username.clone(),
            profile: account.profile.clone(),
        }
    }
}

pub trait AccountCodec: Send + Sync {
    fn encode(&self, payload: &AccountPayload) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<AccountPayload, CodecError>;
}

/// MessagePack payloads with named fields, so older payloads missing newer
/// fields still decode.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgpackAccountCodec;

impl AccountCodec for MsgpackAccountCodec {
    fn encode(&self, payload: &AccountPayload) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(payload).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<AccountPayload, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAccountCodec;

impl AccountCodec for JsonAccountCodec {
    fn encode(&self, payload: &AccountPayload) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(payload).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<AccountPayload, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

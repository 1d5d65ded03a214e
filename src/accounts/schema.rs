//! Persisted layout of account rows and constraint index entries.

use crate::accounts::codec::{AccountCodec, AccountPayload};
use crate::accounts::error::AccountsError;
use crate::accounts::model::Account;
use crate::storage::types::{AttributeValue, Item};
use tracing::warn;

/// Account identifier; key of the accounts table, owner pointer in every index.
pub const KEY_ACCOUNT_UUID: &str = "U";
/// Phone number identifier; key of its index table, denormalized on the row.
pub const ATTR_PNI: &str = "PNI";
/// Phone number; key of its index table, denormalized on the row.
pub const ATTR_ACCOUNT_E164: &str = "P";
/// Serialized payload.
pub const ATTR_ACCOUNT_DATA: &str = "D";
/// Optimistic-locking version.
pub const ATTR_VERSION: &str = "V";
/// Directory visibility flag.
pub const ATTR_CANONICALLY_DISCOVERABLE: &str = "C";
/// Username; key of its index table, denormalized on the row when set.
pub const ATTR_USERNAME: &str = "N";

pub(crate) fn encode_payload(
    codec: &dyn AccountCodec,
    account: &Account,
) -> Result<AttributeValue, AccountsError> {
    Ok(AttributeValue::B(
        codec.encode(&AccountPayload::from_account(account))?,
    ))
}

/// Full account row as written by create. Usernames are only ever attached
/// alongside their index entry, so the row carries no `N` attribute.
pub(crate) fn account_item(
    codec: &dyn AccountCodec,
    account: &Account,
) -> Result<Item, AccountsError> {
    let mut item = Item::new()
        .with(KEY_ACCOUNT_UUID, account.uuid)
        .with(ATTR_ACCOUNT_E164, account.number.as_str())
        .with(ATTR_PNI, account.phone_number_identifier)
        .with(ATTR_VERSION, account.version)
        .with(
            ATTR_CANONICALLY_DISCOVERABLE,
            account.should_be_visible_in_directory(),
        );
    item.set(ATTR_ACCOUNT_DATA, encode_payload(codec, account)?);
    Ok(item)
}

/// Index entry mapping `key_attribute = key` to its owning account.
pub(crate) fn constraint_item(
    key_attribute: &str,
    key: AttributeValue,
    owner: uuid::Uuid,
) -> Item {
    Item::new()
        .with(key_attribute, key)
        .with(KEY_ACCOUNT_UUID, owner)
}

/// Rebuilds an account from a stored row.
///
/// The row's denormalized attributes are authoritative over anything embedded
/// in the payload. A missing or disagreeing phone number identifier is logged,
/// not rejected; older rows were written before the two were kept in step.
pub fn account_from_item(codec: &dyn AccountCodec, item: &Item) -> Result<Account, AccountsError> {
    let data = item
        .get_bytes(ATTR_ACCOUNT_DATA)
        .ok_or(AccountsError::CorruptRecord {
            attribute: ATTR_ACCOUNT_DATA,
        })?;
    let number = item
        .get_str(ATTR_ACCOUNT_E164)
        .ok_or(AccountsError::CorruptRecord {
            attribute: ATTR_ACCOUNT_E164,
        })?;
    let uuid = item
        .get_uuid(KEY_ACCOUNT_UUID)
        .ok_or(AccountsError::CorruptRecord {
            attribute: KEY_ACCOUNT_UUID,
        })?;
    let version = item
        .get_i64(ATTR_VERSION)
        .ok_or(AccountsError::CorruptRecord {
            attribute: ATTR_VERSION,
        })?;

    let payload = codec.decode(data)?;
    let pni_from_attribute = item.get_uuid(ATTR_PNI);
    if payload.phone_number_identifier.is_none()
        || pni_from_attribute.is_none()
        || payload.phone_number_identifier != pni_from_attribute
    {
        warn!(
            account = %uuid,
            from_payload = ?payload.phone_number_identifier,
            from_attribute = ?pni_from_attribute,
            "missing or mismatched phone number identifiers"
        );
    }
    let phone_number_identifier = pni_from_attribute
        .or(payload.phone_number_identifier)
        .ok_or(AccountsError::CorruptRecord {
            attribute: ATTR_PNI,
        })?;

    Ok(Account {
        uuid,
        number: number.to_string(),
        phone_number_identifier,
        username: item.get_str(ATTR_USERNAME).map(str::to_string),
        version,
        canonically_discoverable: item
            .get_bool(ATTR_CANONICALLY_DISCOVERABLE)
            .unwrap_or(false),
        profile: payload.profile,
    })
}

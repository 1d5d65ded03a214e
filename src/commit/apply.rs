use crate::commit::tx::{UpdateAction, WriteItem, WriteOp};
use crate::error::StoreError;
use crate::storage::keyspace::Keyspace;
use crate::storage::types::{AttributeValue, Item};

/// Applies the actions of an update to `item`, which already carries its key.
pub fn apply_update_actions(
    item: &mut Item,
    key_attribute: &str,
    actions: &[UpdateAction],
) -> Result<(), StoreError> {
    for action in actions {
        match action {
            UpdateAction::Set(name, value) => {
                if name == key_attribute {
                    return Err(StoreError::Validation(format!(
                        "cannot update key attribute '{key_attribute}'"
                    )));
                }
                item.set(name.clone(), value.clone());
            }
            UpdateAction::Remove(name) => {
                if name == key_attribute {
                    return Err(StoreError::Validation(format!(
                        "cannot remove key attribute '{key_attribute}'"
                    )));
                }
                item.remove(name);
            }
            UpdateAction::Add(name, delta) => {
                let current = match item.get(name) {
                    None => 0,
                    Some(AttributeValue::N(n)) => *n,
                    Some(other) => {
                        return Err(StoreError::Validation(format!(
                            "cannot add to attribute '{name}' of type {}",
                            other.type_name()
                        )));
                    }
                };
                let next = current.checked_add(*delta).ok_or_else(|| {
                    StoreError::Validation(format!("numeric overflow on attribute '{name}'"))
                })?;
                item.set(name.clone(), AttributeValue::N(next));
            }
        }
    }
    Ok(())
}

/// Computes the item an update produces without touching the keyspace.
/// Updates upsert: a missing item starts out holding only its key.
pub fn updated_item(
    current: Option<&Item>,
    key_attribute: &str,
    key: &AttributeValue,
    actions: &[UpdateAction],
) -> Result<Item, StoreError> {
    let mut item = match current {
        Some(existing) => existing.clone(),
        None => Item::new().with(key_attribute, key.clone()),
    };
    apply_update_actions(&mut item, key_attribute, actions)?;
    Ok(item)
}

/// Applies one write whose condition has already been checked. Returns the
/// resulting item, or `None` for deletes.
pub fn apply_write(keyspace: &mut Keyspace, write: &WriteItem) -> Result<Option<Item>, StoreError> {
    let key_attribute = keyspace
        .key_attribute(&write.table)
        .ok_or_else(|| StoreError::TableNotFound {
            table: write.table.clone(),
        })?
        .to_string();
    match &write.op {
        WriteOp::Put { item } => {
            let key = item.get(&key_attribute).cloned().ok_or_else(|| {
                StoreError::Validation(format!(
                    "put into '{}' is missing key attribute '{key_attribute}'",
                    write.table
                ))
            })?;
            keyspace.put_item(&write.table, &key, item.clone());
            Ok(Some(item.clone()))
        }
        WriteOp::Update { key, actions } => {
            let next = updated_item(
                keyspace.get_item(&write.table, key),
                &key_attribute,
                key,
                actions,
            )?;
            keyspace.put_item(&write.table, key, next.clone());
            Ok(Some(next))
        }
        WriteOp::Delete { key } => {
            keyspace.delete_item(&write.table, key);
            Ok(None)
        }
    }
}

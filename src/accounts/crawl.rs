use crate::accounts::codec::AccountCodec;
use crate::accounts::error::AccountsError;
use crate::accounts::model::Account;
use crate::accounts::schema::account_from_item;
use crate::storage::types::AttributeValue;
use crate::storage::{KeyValueStore, ScanRequest};
use uuid::Uuid;

/// One bounded page of a full-table crawl.
///
/// Crawls are not point-in-time: rows written while a crawl is in progress
/// may be seen zero, one or several times across chunks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccountCrawlChunk {
    pub accounts: Vec<Account>,
    /// Identifier of the last account in this chunk; pass it back to resume.
    /// `None` when the chunk is empty.
    pub last_uuid: Option<Uuid>,
}

impl AccountCrawlChunk {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

pub(crate) struct CrawlRequest<'a> {
    pub table: &'a str,
    pub page_size: usize,
    pub start_after: Option<Uuid>,
    pub max_count: usize,
}

/// Collects up to `max_count` accounts strictly after `start_after`, issuing as
/// many scans of `page_size` rows as it takes.
pub(crate) fn crawl_chunk(
    store: &dyn KeyValueStore,
    codec: &dyn AccountCodec,
    request: CrawlRequest<'_>,
) -> Result<AccountCrawlChunk, AccountsError> {
    let mut accounts = Vec::new();
    let mut exclusive_start_key = request.start_after.map(AttributeValue::from_uuid);
    while accounts.len() < request.max_count {
        let remaining = request.max_count - accounts.len();
        let page = store.scan(ScanRequest {
            table: request.table.to_string(),
            limit: remaining.min(request.page_size),
            exclusive_start_key: exclusive_start_key.take(),
            consistent_read: false,
        })?;
        for item in &page.items {
            accounts.push(account_from_item(codec, item)?);
        }
        match page.last_evaluated_key {
            Some(key) => exclusive_start_key = Some(key),
            None => break,
        }
    }
    accounts.truncate(request.max_count);
    let last_uuid = accounts.last().map(|a| a.uuid);
    Ok(AccountCrawlChunk {
        accounts,
        last_uuid,
    })
}

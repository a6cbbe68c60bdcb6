use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{StoreResult, TransactionLedger};
use crate::domain::{AccountId, LedgerTransaction, TxKind};

const DEFAULT_PAGE_SIZE: u32 = 100;

/// Filter for ledger queries. Date bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_id: Option<AccountId>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    /// Empty means every kind
    pub kinds: Vec<TxKind>,
}

impl TransactionFilter {
    pub fn for_account(account_id: AccountId) -> Self {
        Self {
            account_id: Some(account_id),
            ..Self::default()
        }
    }

    pub fn with_kinds(mut self, kinds: Vec<TxKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from_date = from;
        self.to_date = to;
        self
    }
}

/// Lazy walk over the ledger in sequence order.
///
/// Pages are fetched on demand with keyset pagination, so the walk sees
/// each record at most once even while other writers append. `rewind`
/// starts over from the beginning.
pub struct TransactionCursor {
    ledger: Arc<dyn TransactionLedger>,
    filter: TransactionFilter,
    page_size: u32,
    last_sequence: i64,
    exhausted: bool,
}

impl TransactionCursor {
    pub fn new(ledger: Arc<dyn TransactionLedger>, filter: TransactionFilter) -> Self {
        Self {
            ledger,
            filter,
            page_size: DEFAULT_PAGE_SIZE,
            last_sequence: 0,
            exhausted: false,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn filter(&self) -> &TransactionFilter {
        &self.filter
    }

    /// Next page, or `None` once the sequence is finished.
    pub async fn next_page(&mut self) -> StoreResult<Option<Vec<LedgerTransaction>>> {
        if self.exhausted {
            return Ok(None);
        }
        let page = self
            .ledger
            .query_page(&self.filter, self.last_sequence, self.page_size)
            .await?;
        if (page.len() as u32) < self.page_size {
            self.exhausted = true;
        }
        match page.last() {
            Some(last) => {
                self.last_sequence = last.sequence;
                Ok(Some(page))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    pub fn rewind(&mut self) {
        self.last_sequence = 0;
        self.exhausted = false;
    }

    /// Drain the remaining pages into one vector.
    pub async fn collect_all(&mut self) -> StoreResult<Vec<LedgerTransaction>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}

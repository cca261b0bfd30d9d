//! Local Store Abstractions
//!
//! Defines the shapes exchanged with the host's persistence layer: the
//! entity taxonomy mirrored from QuickBooks, the local projection of a
//! remote record, and the per-entity sync cursor, together with the
//! [`RecordStore`] and [`CursorStore`] traits the host implements.
//!
//! The core never prescribes a schema beyond these types; a host may back
//! them with SQLite, an ERP document store, or anything else that can
//! upsert by `(kind, external_id)`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// The QuickBooks entity types the sync core understands.
///
/// `CompanyInfo` is a single-record special case: it is never paginated and
/// carries no cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    Vendor,
    Item,
    Account,
    Invoice,
    Bill,
    Payment,
    JournalEntry,
    Employee,
    CompanyInfo,
}

impl EntityKind {
    /// Every kind that participates in paginated query sync, in the order
    /// `sync_all` runs them.
    pub const SYNCABLE: [EntityKind; 9] = [
        EntityKind::Customer,
        EntityKind::Vendor,
        EntityKind::Item,
        EntityKind::Account,
        EntityKind::Invoice,
        EntityKind::Bill,
        EntityKind::Payment,
        EntityKind::JournalEntry,
        EntityKind::Employee,
    ];

    /// The QuickBooks query/resource name for this kind
    pub fn resource(&self) -> &'static str {
        match self {
            EntityKind::Customer => "Customer",
            EntityKind::Vendor => "Vendor",
            EntityKind::Item => "Item",
            EntityKind::Account => "Account",
            EntityKind::Invoice => "Invoice",
            EntityKind::Bill => "Bill",
            EntityKind::Payment => "Payment",
            EntityKind::JournalEntry => "JournalEntry",
            EntityKind::Employee => "Employee",
            EntityKind::CompanyInfo => "CompanyInfo",
        }
    }

    /// Stable identifier used for cursor keys and logging
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customer",
            EntityKind::Vendor => "vendor",
            EntityKind::Item => "item",
            EntityKind::Account => "account",
            EntityKind::Invoice => "invoice",
            EntityKind::Bill => "bill",
            EntityKind::Payment => "payment",
            EntityKind::JournalEntry => "journal_entry",
            EntityKind::Employee => "employee",
            EntityKind::CompanyInfo => "company_info",
        }
    }

    /// Parse a kind from its stable identifier
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(EntityKind::Customer),
            "vendor" => Some(EntityKind::Vendor),
            "item" => Some(EntityKind::Item),
            "account" => Some(EntityKind::Account),
            "invoice" => Some(EntityKind::Invoice),
            "bill" => Some(EntityKind::Bill),
            "payment" => Some(EntityKind::Payment),
            "journal_entry" => Some(EntityKind::JournalEntry),
            "employee" => Some(EntityKind::Employee),
            "company_info" => Some(EntityKind::CompanyInfo),
            _ => None,
        }
    }

    /// Whether this kind is fetched through the paginated query endpoint
    pub fn is_paginated(&self) -> bool {
        !matches!(self, EntityKind::CompanyInfo)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resume position within a paginated remote listing.
///
/// Opaque to the store; the API client interprets it as a QuickBooks query
/// start position (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageCursor(pub u64);

impl PageCursor {
    /// The position of the first record in a listing
    pub fn start() -> Self {
        Self(1)
    }

    /// The cursor positioned `count` records past this one
    pub fn advance(&self, count: u64) -> Self {
        Self(self.0 + count)
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted resume state for one entity kind.
///
/// Invariant: `position` is monotonically non-decreasing across successful
/// runs and is left untouched by failed runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub kind: EntityKind,
    pub position: PageCursor,
    pub last_run_at: DateTime<Utc>,
}

impl SyncCursor {
    pub fn new(kind: EntityKind, position: PageCursor) -> Self {
        Self {
            kind,
            position,
            last_run_at: Utc::now(),
        }
    }
}

/// One line on a synced sales invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub item: String,
    pub qty: f64,
    pub rate: f64,
    pub amount: f64,
}

/// One account-based expense line on a synced bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseLine {
    pub account: String,
    pub amount: f64,
}

/// One debit/credit line on a synced journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account: String,
    pub debit: f64,
    pub credit: f64,
}

/// Entity-kind-specific projection of a remote record into the local schema.
///
/// Field choices follow the settings-page integration this core backs:
/// names, contact details, and document lines are carried; everything else
/// stays behind in the remote payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RecordFields {
    Customer {
        email: Option<String>,
        phone: Option<String>,
        /// True when the remote record carries a company name
        is_company: bool,
    },
    Vendor {
        email: Option<String>,
        phone: Option<String>,
    },
    Item {
        code: String,
        group: Option<String>,
        description: Option<String>,
        is_stock_item: bool,
    },
    Account {
        account_type: Option<String>,
        classification: Option<String>,
        number: Option<String>,
    },
    Invoice {
        customer_id: Option<String>,
        customer_name: Option<String>,
        txn_date: Option<NaiveDate>,
        total: f64,
        lines: Vec<InvoiceLine>,
    },
    Bill {
        vendor_id: Option<String>,
        vendor_name: Option<String>,
        txn_date: Option<NaiveDate>,
        total: f64,
        lines: Vec<ExpenseLine>,
    },
    Payment {
        customer_id: Option<String>,
        customer_name: Option<String>,
        txn_date: Option<NaiveDate>,
        amount: f64,
    },
    JournalEntry {
        txn_date: Option<NaiveDate>,
        lines: Vec<JournalLine>,
    },
    Employee {
        email: Option<String>,
        phone: Option<String>,
    },
    CompanyInfo {
        legal_name: Option<String>,
        country: Option<String>,
    },
}

/// Local projection of a remote accounting record.
///
/// `(kind, external_id)` is the reconciliation key: the host must update an
/// existing record with the same key in place rather than creating a
/// duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub kind: EntityKind,
    /// The remote system's identifier for this record
    pub external_id: String,
    pub display_name: String,
    pub fields: RecordFields,
}

/// Result of an upsert against the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Upsert-based persistence for local records
///
/// Implementations must make `upsert` idempotent: re-applying the same
/// record is safe and reports `Updated`. Commit granularity is the single
/// record; the engine sequences records within a page in received order.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or update a record keyed by `(kind, external_id)`
    async fn upsert(&self, record: LocalRecord) -> Result<UpsertOutcome>;

    /// Fetch a record by its reconciliation key
    async fn get(&self, kind: EntityKind, external_id: &str) -> Result<Option<LocalRecord>>;

    /// Number of stored records of a kind
    async fn count(&self, kind: EntityKind) -> Result<u64>;
}

/// Persistence for per-entity sync cursors
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the cursor for an entity kind, or `None` before the first
    /// successful run
    async fn load(&self, kind: EntityKind) -> Result<Option<SyncCursor>>;

    /// Persist a cursor, replacing any previous value for its kind
    async fn save(&self, cursor: SyncCursor) -> Result<()>;
}

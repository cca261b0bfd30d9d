//! Projection of remote payloads into [`LocalRecord`]s.
//!
//! One mapping function per entity kind, dispatched from
//! [`to_local_record`]. Each function validates the fields it needs and
//! fails with a [`MapError`] naming the problem; the engine records the
//! failure against the record and moves on, so one malformed record never
//! aborts a run.

use chrono::NaiveDate;
use qbsync_client::RemoteEntity;
use qbsync_traits::{
    EntityKind, ExpenseLine, InvoiceLine, JournalLine, LocalRecord, RecordFields,
};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("record has no Id")]
    MissingId,
    #[error("missing required field {0}")]
    MissingField(&'static str),
    #[error("field {field} is invalid: {detail}")]
    InvalidField {
        field: &'static str,
        detail: String,
    },
}

/// Maps one remote record to its local projection.
pub fn to_local_record(entity: &RemoteEntity) -> Result<LocalRecord, MapError> {
    let payload = &entity.payload;
    let external_id = entity.id().ok_or(MapError::MissingId)?.to_string();

    let (display_name, fields) = match entity.kind {
        EntityKind::Customer => map_customer(payload)?,
        EntityKind::Vendor => map_vendor(payload)?,
        EntityKind::Item => map_item(payload)?,
        EntityKind::Account => map_account(payload)?,
        EntityKind::Invoice => map_invoice(payload)?,
        EntityKind::Bill => map_bill(payload)?,
        EntityKind::Payment => map_payment(payload)?,
        EntityKind::JournalEntry => map_journal_entry(payload)?,
        EntityKind::Employee => map_employee(payload)?,
        EntityKind::CompanyInfo => map_company_info(payload)?,
    };

    Ok(LocalRecord {
        kind: entity.kind,
        external_id,
        display_name,
        fields,
    })
}

fn map_customer(p: &Value) -> Result<(String, RecordFields), MapError> {
    let name = require_str(p, "DisplayName")?;
    Ok((
        name,
        RecordFields::Customer {
            email: nested_str(p, &["PrimaryEmailAddr", "Address"]),
            phone: nested_str(p, &["PrimaryPhone", "FreeFormNumber"]),
            is_company: opt_str(p, "CompanyName").is_some(),
        },
    ))
}

fn map_vendor(p: &Value) -> Result<(String, RecordFields), MapError> {
    let name = require_str(p, "DisplayName")?;
    Ok((
        name,
        RecordFields::Vendor {
            email: nested_str(p, &["PrimaryEmailAddr", "Address"]),
            phone: nested_str(p, &["PrimaryPhone", "FreeFormNumber"]),
        },
    ))
}

fn map_item(p: &Value) -> Result<(String, RecordFields), MapError> {
    let name = require_str(p, "Name")?;
    Ok((
        name.clone(),
        RecordFields::Item {
            // Stock code falls back to the display name when no SKU is set.
            code: opt_str(p, "Sku").unwrap_or(name),
            group: opt_str(p, "SubItem"),
            description: opt_str(p, "Description"),
            is_stock_item: opt_str(p, "Type").as_deref() == Some("Inventory"),
        },
    ))
}

fn map_account(p: &Value) -> Result<(String, RecordFields), MapError> {
    let name = require_str(p, "Name")?;
    Ok((
        name,
        RecordFields::Account {
            account_type: opt_str(p, "AccountType"),
            classification: opt_str(p, "Classification"),
            number: opt_str(p, "AcctNum"),
        },
    ))
}

fn map_invoice(p: &Value) -> Result<(String, RecordFields), MapError> {
    let lines = p
        .get("Line")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|line| {
                    let detail = line.get("SalesItemLineDetail")?;
                    Some(InvoiceLine {
                        item: nested_str(detail, &["ItemRef", "name"])
                            .or_else(|| nested_str(detail, &["ItemRef", "value"]))?,
                        qty: num(detail, "Qty").unwrap_or(1.0),
                        rate: num(detail, "UnitPrice").unwrap_or(0.0),
                        amount: num(line, "Amount").unwrap_or(0.0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok((
        doc_name(p, "Invoice")?,
        RecordFields::Invoice {
            customer_id: nested_str(p, &["CustomerRef", "value"]),
            customer_name: nested_str(p, &["CustomerRef", "name"]),
            txn_date: txn_date(p)?,
            total: num(p, "TotalAmt").unwrap_or(0.0),
            lines,
        },
    ))
}

fn map_bill(p: &Value) -> Result<(String, RecordFields), MapError> {
    let lines = p
        .get("Line")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|line| {
                    let detail = line.get("AccountBasedExpenseLineDetail")?;
                    Some(ExpenseLine {
                        account: nested_str(detail, &["AccountRef", "name"])
                            .or_else(|| nested_str(detail, &["AccountRef", "value"]))?,
                        amount: num(line, "Amount").unwrap_or(0.0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok((
        doc_name(p, "Bill")?,
        RecordFields::Bill {
            vendor_id: nested_str(p, &["VendorRef", "value"]),
            vendor_name: nested_str(p, &["VendorRef", "name"]),
            txn_date: txn_date(p)?,
            total: num(p, "TotalAmt").unwrap_or(0.0),
            lines,
        },
    ))
}

fn map_payment(p: &Value) -> Result<(String, RecordFields), MapError> {
    Ok((
        doc_name(p, "Payment")?,
        RecordFields::Payment {
            customer_id: nested_str(p, &["CustomerRef", "value"]),
            customer_name: nested_str(p, &["CustomerRef", "name"]),
            txn_date: txn_date(p)?,
            amount: num(p, "TotalAmt").unwrap_or(0.0),
        },
    ))
}

fn map_journal_entry(p: &Value) -> Result<(String, RecordFields), MapError> {
    let lines = p
        .get("Line")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|line| {
                    let detail = line.get("JournalEntryLineDetail")?;
                    let account = nested_str(detail, &["AccountRef", "name"])
                        .or_else(|| nested_str(detail, &["AccountRef", "value"]))?;
                    let amount = num(line, "Amount").unwrap_or(0.0);
                    let posting = nested_str(detail, &["PostingType"]);
                    let (debit, credit) = match posting.as_deref() {
                        Some("Credit") => (0.0, amount),
                        _ => (amount, 0.0),
                    };
                    Some(JournalLine {
                        account,
                        debit,
                        credit,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok((
        doc_name(p, "Journal Entry")?,
        RecordFields::JournalEntry {
            txn_date: txn_date(p)?,
            lines,
        },
    ))
}

fn map_employee(p: &Value) -> Result<(String, RecordFields), MapError> {
    let name = require_str(p, "DisplayName")?;
    Ok((
        name,
        RecordFields::Employee {
            email: nested_str(p, &["PrimaryEmailAddr", "Address"]),
            phone: nested_str(p, &["PrimaryPhone", "FreeFormNumber"]),
        },
    ))
}

fn map_company_info(p: &Value) -> Result<(String, RecordFields), MapError> {
    let name = require_str(p, "CompanyName")?;
    Ok((
        name,
        RecordFields::CompanyInfo {
            legal_name: opt_str(p, "LegalName"),
            country: opt_str(p, "Country"),
        },
    ))
}

/// Document display name: the DocNumber when set, otherwise a generic
/// label from the remote id.
fn doc_name(p: &Value, label: &str) -> Result<String, MapError> {
    match opt_str(p, "DocNumber") {
        Some(doc) => Ok(doc),
        None => {
            let id = p
                .get("Id")
                .and_then(Value::as_str)
                .ok_or(MapError::MissingId)?;
            Ok(format!("{label} {id}"))
        }
    }
}

fn txn_date(p: &Value) -> Result<Option<NaiveDate>, MapError> {
    match opt_str(p, "TxnDate") {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| MapError::InvalidField {
                field: "TxnDate",
                detail: e.to_string(),
            }),
    }
}

fn require_str(p: &Value, field: &'static str) -> Result<String, MapError> {
    opt_str(p, field).ok_or(MapError::MissingField(field))
}

fn opt_str(p: &Value, field: &str) -> Option<String> {
    p.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn nested_str(p: &Value, path: &[&str]) -> Option<String> {
    let mut current = p;
    for segment in path {
        current = current.get(segment)?;
    }
    current
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn num(p: &Value, field: &str) -> Option<f64> {
    p.get(field).and_then(Value::as_f64)
}

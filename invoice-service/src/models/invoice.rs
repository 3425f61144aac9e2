//! Accounting invoice model for invoice-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceDirection {
    Sales,
    Purchase,
}

impl InvoiceDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceDirection::Sales => "sales",
            InvoiceDirection::Purchase => "purchase",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sales" => InvoiceDirection::Sales,
            _ => InvoiceDirection::Purchase,
        }
    }
}

/// Where the invoice record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceSource {
    /// Fetched from the national e-invoice registry.
    External,
    /// Entered by a user.
    Manual,
}

impl InvoiceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceSource::External => "external",
            InvoiceSource::Manual => "manual",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "external" => InvoiceSource::External,
            _ => InvoiceSource::Manual,
        }
    }
}

/// Invoice processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    New,
    Assigned,
    Confirmed,
    Rejected,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::New => "new",
            InvoiceStatus::Assigned => "assigned",
            InvoiceStatus::Confirmed => "confirmed",
            InvoiceStatus::Rejected => "rejected",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "assigned" => InvoiceStatus::Assigned,
            "confirmed" => InvoiceStatus::Confirmed,
            "rejected" => InvoiceStatus::Rejected,
            _ => InvoiceStatus::New,
        }
    }

    /// Allowed status transitions. Confirmed and Rejected are terminal.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        matches!(
            (self, next),
            (InvoiceStatus::New, InvoiceStatus::Assigned)
                | (InvoiceStatus::New, InvoiceStatus::Confirmed)
                | (InvoiceStatus::New, InvoiceStatus::Rejected)
                | (InvoiceStatus::Assigned, InvoiceStatus::Confirmed)
                | (InvoiceStatus::Assigned, InvoiceStatus::Rejected)
        )
    }
}

/// Payment status of the accounting invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    PartiallyPaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::PartiallyPaid => "partially_paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paid" => PaymentStatus::Paid,
            "partially_paid" => PaymentStatus::PartiallyPaid,
            _ => PaymentStatus::Unpaid,
        }
    }
}

/// Operational module that can own the commercial document behind an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    /// Feed purchasing.
    Feed,
    /// Produce sales.
    Sale,
    /// Gas deliveries.
    Gas,
}

impl ModuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Feed => "feed",
            ModuleType::Sale => "sale",
            ModuleType::Gas => "gas",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "feed" => Some(ModuleType::Feed),
            "sale" => Some(ModuleType::Sale),
            "gas" => Some(ModuleType::Gas),
            _ => None,
        }
    }
}

/// Canonical accounting invoice record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceRecord {
    pub invoice_id: Uuid,
    /// KSeF reference number. Absent for manually entered invoices.
    pub external_reference: Option<String>,
    pub direction: String,
    pub source: String,
    pub seller_name: String,
    pub seller_tax_id: Option<String>,
    pub buyer_name: String,
    pub buyer_tax_id: Option<String>,
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub net_amount: Decimal,
    pub tax_amount: Decimal,
    pub gross_amount: Decimal,
    pub currency: String,
    /// Concatenated line descriptions, used for rule matching.
    pub description: Option<String>,
    pub status: String,
    pub payment_status: String,
    pub assigned_user_id: Option<Uuid>,
    pub assigned_module: Option<String>,
    pub assigned_farm_id: Option<Uuid>,
    /// Id of the owning module entity; requires `assigned_module` to be set.
    pub module_entity_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub deleted_utc: Option<DateTime<Utc>>,
}

impl InvoiceRecord {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }

    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.payment_status)
    }

    pub fn assigned_module(&self) -> Option<ModuleType> {
        self.assigned_module
            .as_deref()
            .and_then(ModuleType::from_string)
    }
}

/// Input for persisting a new invoice record.
#[derive(Debug, Clone)]
pub struct CreateInvoiceRecord {
    pub external_reference: Option<String>,
    pub direction: InvoiceDirection,
    pub source: InvoiceSource,
    pub seller_name: String,
    pub seller_tax_id: Option<String>,
    pub buyer_name: String,
    pub buyer_tax_id: Option<String>,
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub net_amount: Decimal,
    pub tax_amount: Decimal,
    pub gross_amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub assigned_user_id: Option<Uuid>,
    pub assigned_module: Option<ModuleType>,
    pub assigned_farm_id: Option<Uuid>,
    pub module_entity_id: Option<Uuid>,
}

impl CreateInvoiceRecord {
    pub fn status(&self) -> InvoiceStatus {
        if self.assigned_user_id.is_some()
            || self.assigned_module.is_some()
            || self.assigned_farm_id.is_some()
        {
            InvoiceStatus::Assigned
        } else {
            InvoiceStatus::New
        }
    }

    pub fn any_assignment(&self) -> bool {
        self.status() == InvoiceStatus::Assigned
    }

    /// Text the rule engine matches substrings against. The concatenation
    /// order is contractual: seller name, buyer name, invoice number,
    /// line descriptions, joined with single spaces.
    pub fn searchable_text(&self) -> String {
        let mut text = String::new();
        text.push_str(&self.seller_name);
        text.push(' ');
        text.push_str(&self.buyer_name);
        text.push(' ');
        text.push_str(&self.invoice_number);
        if let Some(description) = &self.description {
            text.push(' ');
            text.push_str(description);
        }
        text
    }
}

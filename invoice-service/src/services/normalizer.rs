//! Invoice document normalizer.
//!
//! Turns one raw registry document into the canonical flat field set. The
//! national schema is not modeled; the parser walks the XML once and picks
//! out the handful of elements the engine needs, ignoring everything else.

use crate::models::{CreateInvoiceRecord, InvoiceDirection, InvoiceSource};
use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::Event;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::str::FromStr;

/// Fully validated flat invoice extracted from a raw document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedInvoice {
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub seller_name: String,
    pub seller_tax_id: String,
    pub buyer_name: String,
    pub buyer_tax_id: Option<String>,
    pub net_amount: Decimal,
    pub tax_amount: Decimal,
    pub gross_amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
}

impl NormalizedInvoice {
    /// Build the persistence input for an externally sourced invoice.
    /// `own_tax_id` decides the direction: we issued it, or we received it.
    pub fn into_create_record(
        self,
        external_reference: String,
        own_tax_id: &str,
    ) -> CreateInvoiceRecord {
        let direction = if self.seller_tax_id == own_tax_id {
            InvoiceDirection::Sales
        } else {
            InvoiceDirection::Purchase
        };

        CreateInvoiceRecord {
            external_reference: Some(external_reference),
            direction,
            source: InvoiceSource::External,
            seller_name: self.seller_name,
            seller_tax_id: Some(self.seller_tax_id),
            buyer_name: self.buyer_name,
            buyer_tax_id: self.buyer_tax_id,
            invoice_number: self.invoice_number,
            issue_date: self.issue_date,
            net_amount: self.net_amount,
            tax_amount: self.tax_amount,
            gross_amount: self.gross_amount,
            currency: self.currency,
            description: self.description,
            assigned_user_id: None,
            assigned_module: None,
            assigned_farm_id: None,
            module_entity_id: None,
        }
    }
}

/// Cheap extraction result: money totals and invoice number only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicInvoiceFields {
    pub invoice_number: Option<String>,
    pub net_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub gross_amount: Option<Decimal>,
}

/// Amount equality tolerance: two decimal places.
fn rounding_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

#[derive(Debug, Default)]
struct RawFields {
    invoice_number: Option<String>,
    issue_date: Option<String>,
    seller_name: Option<String>,
    seller_tax_id: Option<String>,
    buyer_name: Option<String>,
    buyer_tax_id: Option<String>,
    net_amount: Option<Decimal>,
    tax_amount: Option<Decimal>,
    gross_amount: Option<Decimal>,
    currency: Option<String>,
    line_descriptions: Vec<String>,
}

/// Parse and validate one raw document.
///
/// Mandatory fields: invoice number, issue date, seller tax id and at least
/// one money amount. `gross == net + tax` must balance to under a cent of
/// discrepancy; a full 0.01 off is a malformed document.
pub fn normalize(raw: &[u8]) -> Result<NormalizedInvoice, AppError> {
    let fields = parse_document(raw)?;

    let invoice_number = fields
        .invoice_number
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::MalformedDocument("missing invoice number".to_string()))?;

    let issue_date = fields
        .issue_date
        .as_deref()
        .ok_or_else(|| AppError::MalformedDocument("missing issue date".to_string()))
        .and_then(|raw_date| {
            NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|_| {
                AppError::MalformedDocument(format!("unparsable issue date: {raw_date}"))
            })
        })?;

    let seller_tax_id = fields
        .seller_tax_id
        .filter(|nip| !nip.is_empty())
        .ok_or_else(|| AppError::MalformedDocument("missing seller tax id".to_string()))?;
    if !validate_nip(&seller_tax_id) {
        return Err(AppError::MalformedDocument(format!(
            "invalid seller tax id checksum: {seller_tax_id}"
        )));
    }

    let (net_amount, tax_amount, gross_amount) =
        resolve_amounts(fields.net_amount, fields.tax_amount, fields.gross_amount)?;

    if (gross_amount - (net_amount + tax_amount)).abs() >= rounding_tolerance() {
        return Err(AppError::MalformedDocument(format!(
            "amounts do not balance: net {net_amount} + tax {tax_amount} != gross {gross_amount}"
        )));
    }

    let description = if fields.line_descriptions.is_empty() {
        None
    } else {
        Some(fields.line_descriptions.join("; "))
    };

    Ok(NormalizedInvoice {
        invoice_number,
        issue_date,
        seller_name: fields.seller_name.unwrap_or_default(),
        seller_tax_id,
        buyer_name: fields.buyer_name.unwrap_or_default(),
        buyer_tax_id: fields.buyer_tax_id.filter(|nip| !nip.is_empty()),
        net_amount,
        tax_amount,
        gross_amount,
        currency: fields.currency.unwrap_or_else(|| "PLN".to_string()),
        description,
    })
}

/// Cheap extraction path: money totals and invoice number without the full
/// structural validation, for callers that only need amounts.
pub fn extract_basic_fields(raw: &[u8]) -> Result<BasicInvoiceFields, AppError> {
    let fields = parse_document(raw)?;
    Ok(BasicInvoiceFields {
        invoice_number: fields.invoice_number,
        net_amount: fields.net_amount,
        tax_amount: fields.tax_amount,
        gross_amount: fields.gross_amount,
    })
}

/// Fill in a missing amount from the other two. A lone gross or net amount
/// is accepted as a zero-tax invoice; a lone tax amount is unusable.
fn resolve_amounts(
    net: Option<Decimal>,
    tax: Option<Decimal>,
    gross: Option<Decimal>,
) -> Result<(Decimal, Decimal, Decimal), AppError> {
    match (net, tax, gross) {
        (Some(net), Some(tax), Some(gross)) => Ok((net, tax, gross)),
        (Some(net), Some(tax), None) => Ok((net, tax, net + tax)),
        (Some(net), None, Some(gross)) => Ok((net, gross - net, gross)),
        (None, Some(tax), Some(gross)) => Ok((gross - tax, tax, gross)),
        (Some(net), None, None) => Ok((net, Decimal::ZERO, net)),
        (None, None, Some(gross)) => Ok((gross, Decimal::ZERO, gross)),
        _ => Err(AppError::MalformedDocument(
            "no usable money amounts".to_string(),
        )),
    }
}

fn parse_document(raw: &[u8]) -> Result<RawFields, AppError> {
    let xml = std::str::from_utf8(raw)
        .map_err(|_| AppError::MalformedDocument("document is not valid UTF-8".to_string()))?;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut fields = RawFields::default();
    let mut stack: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| {
                        AppError::MalformedDocument(format!("bad text content: {e}"))
                    })?
                    .trim()
                    .to_string();
                if !text.is_empty() {
                    capture_field(&mut fields, &stack, text)?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(AppError::MalformedDocument(format!("XML parse error: {e}")));
            }
        }
    }

    Ok(fields)
}

fn capture_field(fields: &mut RawFields, stack: &[String], text: String) -> Result<(), AppError> {
    let Some(leaf) = stack.last() else {
        return Ok(());
    };
    let in_context = |name: &str| stack.iter().any(|element| element == name);

    match leaf.as_str() {
        "NIP" if in_context("Podmiot1") => fields.seller_tax_id = Some(normalize_nip(&text)),
        "NIP" if in_context("Podmiot2") => fields.buyer_tax_id = Some(normalize_nip(&text)),
        "Nazwa" | "PelnaNazwa" if in_context("Podmiot1") => fields.seller_name = Some(text),
        "Nazwa" | "PelnaNazwa" if in_context("Podmiot2") => fields.buyer_name = Some(text),
        "P_7" if in_context("FaWiersz") => fields.line_descriptions.push(text),
        "P_1" if !in_context("FaWiersz") => fields.issue_date = Some(text),
        "P_2" if !in_context("FaWiersz") => fields.invoice_number = Some(text),
        "P_13_1" if !in_context("FaWiersz") => fields.net_amount = Some(parse_amount(&text)?),
        "P_14_1" if !in_context("FaWiersz") => fields.tax_amount = Some(parse_amount(&text)?),
        "P_15" if !in_context("FaWiersz") => fields.gross_amount = Some(parse_amount(&text)?),
        "KodWaluty" => fields.currency = Some(text),
        _ => {}
    }
    Ok(())
}

fn parse_amount(text: &str) -> Result<Decimal, AppError> {
    let cleaned = text.replace(' ', "").replace(',', ".");
    Decimal::from_str(&cleaned)
        .map_err(|_| AppError::MalformedDocument(format!("unparsable amount: {text}")))
}

fn normalize_nip(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Polish NIP checksum validation: nine digits weighted 6,5,7,2,3,4,5,6,7,
/// sum mod 11 must equal the tenth digit (and must not be 10).
pub fn validate_nip(nip: &str) -> bool {
    let digits: Vec<u32> = normalize_nip(nip)
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();
    if digits.len() != 10 {
        return false;
    }

    const WEIGHTS: [u32; 9] = [6, 5, 7, 2, 3, 4, 5, 6, 7];
    let checksum: u32 = digits
        .iter()
        .zip(WEIGHTS.iter())
        .map(|(digit, weight)| digit * weight)
        .sum::<u32>()
        % 11;

    checksum != 10 && checksum == digits[9]
}

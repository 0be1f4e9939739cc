use std::collections::{HashMap, HashSet};
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::{RemitError, Result};
use crate::matcher::normalize_policy;
use crate::models::{RowError, StatementRow};

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// Typed mapping from canonical fields to statement column headers, resolved
/// once per file. Either loaded from a JSON file or inferred from the header
/// row via the carrier alias lists.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMapping {
    pub customer: String,
    pub amount: String,
    #[serde(default)]
    pub policy_number: Option<String>,
    #[serde(default)]
    pub effective_date: Option<String>,
    #[serde(default)]
    pub premium: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub policy_type: Option<String>,
}

// Column-name synonyms seen across carrier exports.
const CUSTOMER_ALIASES: &[&str] = &[
    "customer", "customer name", "client name", "insured name", "named insured", "client",
    "insured", "name",
];
const AMOUNT_ALIASES: &[&str] = &[
    "agent paid amount (stmt)", "agent paid amount", "paid amount", "commission amt",
    "commission amount", "commission", "amount", "amt",
];
const POLICY_ALIASES: &[&str] = &[
    "policy number", "policy #", "policy#", "policy no", "policynumber", "policy",
];
const DATE_ALIASES: &[&str] = &["effective date", "eff date", "effective", "date"];
const PREMIUM_ALIASES: &[&str] = &["premium sold", "premium"];
const CARRIER_ALIASES: &[&str] = &["carrier name", "carrier"];
const TYPE_ALIASES: &[&str] = &["transaction type", "trans type", "transaction", "type"];
const POLICY_TYPE_ALIASES: &[&str] = &["policy type"];

fn find_alias(headers: &[String], aliases: &[&str]) -> Option<String> {
    for alias in aliases {
        if let Some(h) = headers.iter().find(|h| h.trim().eq_ignore_ascii_case(alias)) {
            return Some(h.clone());
        }
    }
    None
}

/// Infer a mapping from the header row. Customer and amount columns are
/// required; everything else is optional.
pub fn infer_mapping(headers: &[String]) -> Result<ColumnMapping> {
    let customer = find_alias(headers, CUSTOMER_ALIASES)
        .ok_or_else(|| RemitError::Mapping("no customer column recognized".to_string()))?;
    let amount = find_alias(headers, AMOUNT_ALIASES)
        .ok_or_else(|| RemitError::Mapping("no amount column recognized".to_string()))?;
    Ok(ColumnMapping {
        customer,
        amount,
        policy_number: find_alias(headers, POLICY_ALIASES),
        effective_date: find_alias(headers, DATE_ALIASES),
        premium: find_alias(headers, PREMIUM_ALIASES),
        carrier: find_alias(headers, CARRIER_ALIASES),
        transaction_type: find_alias(headers, TYPE_ALIASES),
        policy_type: find_alias(headers, POLICY_TYPE_ALIASES),
    })
}

pub fn load_mapping(path: &Path) -> Result<ColumnMapping> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| RemitError::Mapping(e.to_string()))
}

// ---------------------------------------------------------------------------
// Raw statement reading
// ---------------------------------------------------------------------------

/// A tabular statement as read from disk, header row located but otherwise
/// untyped.
#[derive(Debug, Clone)]
pub struct RawStatement {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Carrier exports often start with preamble lines (account info, date
/// ranges). The header row is the first one mentioning at least two known
/// column families.
fn looks_like_header(record: &[String]) -> bool {
    let families: &[&[&str]] = &[
        CUSTOMER_ALIASES,
        AMOUNT_ALIASES,
        POLICY_ALIASES,
        DATE_ALIASES,
    ];
    families
        .iter()
        .filter(|aliases| find_alias(record, aliases).is_some())
        .count()
        >= 2
}

pub fn read_csv(path: &Path) -> Result<RawStatement> {
    let file = std::fs::File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));

    let mut records: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let Ok(record) = result else { continue };
        records.push(record.iter().map(|f| f.to_string()).collect());
    }

    let header_idx = records
        .iter()
        .position(|r| looks_like_header(r))
        .ok_or_else(|| RemitError::Mapping("no header row found in statement".to_string()))?;
    let headers = records[header_idx].clone();
    let rows = records.split_off(header_idx + 1);
    Ok(RawStatement { headers, rows })
}

#[cfg(feature = "xlsx")]
pub fn read_xlsx(path: &Path) -> Result<RawStatement> {
    use calamine::{Data, Reader};

    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| RemitError::Other(format!("Failed to open XLSX: {e}")))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| RemitError::Other("workbook has no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| RemitError::Other(format!("Failed to read sheet: {e}")))?;

    let mut records: Vec<Vec<String>> = Vec::new();
    for row in range.rows() {
        let record: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                Data::Empty => String::new(),
                Data::Float(f) => {
                    if f.fract() == 0.0 {
                        format!("{}", *f as i64)
                    } else {
                        format!("{f}")
                    }
                }
                Data::Int(i) => i.to_string(),
                other => other.to_string(),
            })
            .collect();
        records.push(record);
    }

    let header_idx = records
        .iter()
        .position(|r| looks_like_header(r))
        .ok_or_else(|| RemitError::Mapping("no header row found in statement".to_string()))?;
    let headers = records[header_idx].clone();
    let rows = records.split_off(header_idx + 1);
    Ok(RawStatement { headers, rows })
}

pub fn read_statement(path: &Path) -> Result<RawStatement> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => read_csv(path),
        #[cfg(feature = "xlsx")]
        Some(ext) if ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xls") => {
            read_xlsx(path)
        }
        other => Err(RemitError::UnknownFormat(
            other.unwrap_or("(no extension)").to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

/// None when the field is non-empty but not a number. Empty means 0.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace(',', "").replace('"', "").replace('$', "");
    let s = s.trim();
    if s.is_empty() {
        return Some(0.0);
    }
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().map(|v| -v);
    }
    s.parse().ok()
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%m-%d-%Y"];

/// Normalize any accepted date format to YYYY-MM-DD.
pub fn parse_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

fn column_index(headers: &[String], name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
}

fn cell<'a>(row: &'a [String], idx: Option<usize>) -> &'a str {
    idx.and_then(|i| row.get(i)).map(|s| s.trim()).unwrap_or("")
}

/// Turn raw statement rows into canonical `StatementRow`s. Total/subtotal and
/// blank rows are discarded, exact duplicates collapse to the first
/// occurrence, and malformed rows come back as `RowError`s; none of this is
/// fatal to the batch.
pub fn normalize_rows(
    raw: &RawStatement,
    mapping: &ColumnMapping,
) -> Result<(Vec<StatementRow>, Vec<RowError>)> {
    let customer_idx = column_index(&raw.headers, &mapping.customer).ok_or_else(|| {
        RemitError::Mapping(format!("customer column '{}' not in header", mapping.customer))
    })?;
    let amount_idx = column_index(&raw.headers, &mapping.amount).ok_or_else(|| {
        RemitError::Mapping(format!("amount column '{}' not in header", mapping.amount))
    })?;
    let policy_idx = mapping.policy_number.as_deref().and_then(|c| column_index(&raw.headers, c));
    let date_idx = mapping.effective_date.as_deref().and_then(|c| column_index(&raw.headers, c));
    let premium_idx = mapping.premium.as_deref().and_then(|c| column_index(&raw.headers, c));
    let carrier_idx = mapping.carrier.as_deref().and_then(|c| column_index(&raw.headers, c));
    let type_idx = mapping.transaction_type.as_deref().and_then(|c| column_index(&raw.headers, c));
    let policy_type_idx = mapping.policy_type.as_deref().and_then(|c| column_index(&raw.headers, c));

    let totals_re = Regex::new(r"(?i)\b(sub[- ]?total|grand total|totals?|sum)\b")
        .map_err(|e| RemitError::Other(e.to_string()))?;

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    let mut seen: HashSet<(String, String, String, i64)> = HashSet::new();

    for (i, record) in raw.rows.iter().enumerate() {
        let row_index = i + 1;
        let customer = cell(record, Some(customer_idx));
        let policy = cell(record, policy_idx);

        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        if totals_re.is_match(customer) {
            continue;
        }
        if customer.is_empty() && policy.is_empty() {
            continue;
        }

        let amount_raw = cell(record, Some(amount_idx));
        let Some(amount) = parse_amount(amount_raw) else {
            errors.push(RowError {
                row_index,
                reason: format!("unparseable amount '{amount_raw}'"),
            });
            continue;
        };

        let date_raw = cell(record, date_idx);
        let effective_date = if date_raw.is_empty() {
            None
        } else {
            match parse_date(date_raw) {
                Some(d) => Some(d),
                None => {
                    errors.push(RowError {
                        row_index,
                        reason: format!("unparseable date '{date_raw}'"),
                    });
                    continue;
                }
            }
        };

        let key = (
            customer.to_lowercase(),
            normalize_policy(policy),
            effective_date.clone().unwrap_or_default(),
            (amount * 100.0).round() as i64,
        );
        if !seen.insert(key) {
            continue;
        }

        let premium = match parse_amount(cell(record, premium_idx)) {
            Some(p) if p != 0.0 => Some(p),
            _ => None,
        };
        let trans_type = {
            let t = cell(record, type_idx);
            if t.is_empty() { "NEW".to_string() } else { t.to_uppercase() }
        };

        let raw_fields: HashMap<String, String> = raw
            .headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.clone()))
            .collect();

        rows.push(StatementRow {
            row_index,
            customer_name: customer.to_string(),
            policy_number: policy.to_string(),
            effective_date,
            amount,
            premium,
            carrier: {
                let c = cell(record, carrier_idx);
                (!c.is_empty()).then(|| c.to_string())
            },
            transaction_type: trans_type,
            policy_type: {
                let p = cell(record, policy_type_idx);
                (!p.is_empty()).then(|| p.to_string())
            },
            raw_fields,
        });
    }

    Ok((rows, errors))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn raw(header: &[&str], data: &[&[&str]]) -> RawStatement {
        RawStatement {
            headers: headers(header),
            rows: data
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("\"500.00\""), Some(500.0));
        assert_eq!(parse_amount("$250"), Some(250.0));
        assert_eq!(parse_amount("(50.00)"), Some(-50.0));
        assert_eq!(parse_amount("-$1,000.25"), Some(-1000.25));
        assert_eq!(parse_amount(""), Some(0.0));
        assert_eq!(parse_amount("n/a"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2025-03-01"), Some("2025-03-01".to_string()));
        assert_eq!(parse_date("3/1/2025"), Some("2025-03-01".to_string()));
        assert_eq!(parse_date("03/01/25"), Some("2025-03-01".to_string()));
        assert_eq!(parse_date("03-01-2025"), Some("2025-03-01".to_string()));
        assert_eq!(parse_date("13/45/2025"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_infer_mapping_generic_headers() {
        let h = headers(&["Policy Number", "Insured Name", "Commission", "Effective Date", "Type"]);
        let m = infer_mapping(&h).unwrap();
        assert_eq!(m.customer, "Insured Name");
        assert_eq!(m.amount, "Commission");
        assert_eq!(m.policy_number.as_deref(), Some("Policy Number"));
        assert_eq!(m.effective_date.as_deref(), Some("Effective Date"));
        assert_eq!(m.transaction_type.as_deref(), Some("Type"));
    }

    #[test]
    fn test_infer_mapping_requires_customer_column() {
        let h = headers(&["Policy Number", "Commission"]);
        assert!(matches!(infer_mapping(&h), Err(RemitError::Mapping(_))));
    }

    #[test]
    fn test_policy_type_not_confused_with_type() {
        let h = headers(&["Customer", "Amount", "Policy Type"]);
        let m = infer_mapping(&h).unwrap();
        assert_eq!(m.policy_type.as_deref(), Some("Policy Type"));
        assert!(m.transaction_type.is_none());
    }

    #[test]
    fn test_header_found_after_preamble() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stmt.csv");
        std::fs::write(
            &path,
            "Statement for: Coastal Agency\nPeriod:,2025-03\n\nCustomer,Policy Number,Effective Date,Amount\nJohn Doe,POL-1,2025-03-01,250.00\n",
        )
        .unwrap();
        let raw = read_csv(&path).unwrap();
        assert_eq!(raw.headers[0], "Customer");
        assert_eq!(raw.rows.len(), 1);
    }

    #[test]
    fn test_totals_and_blank_rows_discarded() {
        let r = raw(
            &["Customer", "Amount"],
            &[
                &["John Doe", "100.00"],
                &["", ""],
                &["Grand Total", "100.00"],
                &["Subtotal", "50.00"],
            ],
        );
        let m = infer_mapping(&r.headers).unwrap();
        let (rows, errors) = normalize_rows(&r, &m).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_totals_filter_spares_real_names() {
        let r = raw(&["Customer", "Amount"], &[&["Sumner Insurance", "75.00"]]);
        let m = infer_mapping(&r.headers).unwrap();
        let (rows, _) = normalize_rows(&r, &m).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_duplicate_rows_collapse() {
        let r = raw(
            &["Customer", "Policy Number", "Effective Date", "Amount"],
            &[
                &["John Doe", "POL-1", "2025-03-01", "250.00"],
                &["John Doe", "POL-1", "2025-03-01", "250.00"],
                &["John Doe", "POL-1", "2025-03-01", "99.00"],
            ],
        );
        let m = infer_mapping(&r.headers).unwrap();
        let (rows, _) = normalize_rows(&r, &m).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_malformed_rows_reported_not_fatal() {
        let r = raw(
            &["Customer", "Effective Date", "Amount"],
            &[
                &["John Doe", "2025-03-01", "abc"],
                &["Mary Jones", "not-a-date", "50.00"],
                &["Sam Hill", "2025-03-02", "75.00"],
            ],
        );
        let m = infer_mapping(&r.headers).unwrap();
        let (rows, errors) = normalize_rows(&r, &m).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].customer_name, "Sam Hill");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].row_index, 1);
        assert_eq!(errors[1].row_index, 2);
    }

    #[test]
    fn test_row_defaults() {
        let r = raw(&["Customer", "Amount"], &[&["John Doe", "10.00"]]);
        let m = infer_mapping(&r.headers).unwrap();
        let (rows, _) = normalize_rows(&r, &m).unwrap();
        assert_eq!(rows[0].transaction_type, "NEW");
        assert!(rows[0].effective_date.is_none());
        assert_eq!(rows[0].raw_fields.get("Customer").unwrap(), "John Doe");
    }

    #[test]
    fn test_mapping_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(
            &path,
            "{\"customer\": \"Insured\", \"amount\": \"Comm Paid\", \"policy_number\": \"Pol #\"}",
        )
        .unwrap();
        let m = load_mapping(&path).unwrap();
        assert_eq!(m.customer, "Insured");
        assert_eq!(m.amount, "Comm Paid");
        assert_eq!(m.policy_number.as_deref(), Some("Pol #"));
        assert!(m.effective_date.is_none());
    }
}

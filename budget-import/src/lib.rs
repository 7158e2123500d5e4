#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Two-phase CSV import: `preview` classifies every row as `New`,
//! `Duplicate`, or `Invalid` without touching the store; `plan_commit`
//! takes the rows the caller confirmed and decides which are actually
//! new against a fresh read of existing fingerprints, guaranteeing
//! idempotent re-commits.

use std::collections::HashMap;
use std::collections::HashSet;

use budget_core::BudgetError;
use budget_core::BudgetResult;
use budget_core::Money;
use chrono::NaiveDate;
use sha2::Digest;
use sha2::Sha256;

const DATE_GROUP: &[&str] = &["date", "transaction date", "posted date"];
const PAYEE_GROUP: &[&str] = &["payee", "description", "name", "merchant", "transaction"];
const MEMO_GROUP: &[&str] = &["memo", "notes", "note", "details"];
const AMOUNT_GROUP: &[&str] = &["amount", "amt", "value"];
const DEPOSIT_GROUP: &[&str] = &["deposit", "deposits", "credit"];
const WITHDRAWAL_GROUP: &[&str] = &["withdrawal", "withdrawals", "debit"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%m-%d-%Y", "%d-%m-%Y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    New,
    Duplicate,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct PreviewRow {
    pub row_number: usize,
    pub date: Option<NaiveDate>,
    pub amount: Option<Money>,
    pub payee: String,
    pub memo: Option<String>,
    pub status: RowStatus,
    pub fingerprint: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PreviewCounts {
    pub new: usize,
    pub duplicate: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone)]
pub struct PreviewResult {
    pub rows: Vec<PreviewRow>,
    pub counts: PreviewCounts,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
}

/// A `New` row the caller confirmed for commit, carrying the fingerprint
/// computed during preview so commit never has to re-derive it.
#[derive(Debug, Clone)]
pub struct ConfirmedRow {
    pub date: NaiveDate,
    pub amount: Money,
    pub payee: String,
    pub memo: Option<String>,
    pub fingerprint: String,
}

#[derive(Debug, Clone)]
pub struct CommitPlan {
    pub to_insert: Vec<ConfirmedRow>,
    pub skipped_duplicate_count: usize,
}

struct ColumnIndexes {
    date: usize,
    payee: usize,
    memo: Option<usize>,
    amount: Option<usize>,
    deposit: Option<usize>,
    withdrawal: Option<usize>,
}

fn find_index(headers: &[String], group: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let normalized = h.trim().to_ascii_lowercase();
        group.contains(&normalized.as_str())
    })
}

fn resolve_columns(headers: &[String]) -> BudgetResult<ColumnIndexes> {
    let date = find_index(headers, DATE_GROUP)
        .ok_or_else(|| BudgetError::validation_field("no date column found", "date"))?;
    let payee = find_index(headers, PAYEE_GROUP)
        .ok_or_else(|| BudgetError::validation_field("no payee column found", "payee"))?;
    let memo = find_index(headers, MEMO_GROUP);
    let amount = find_index(headers, AMOUNT_GROUP);
    let deposit = find_index(headers, DEPOSIT_GROUP);
    let withdrawal = find_index(headers, WITHDRAWAL_GROUP);
    if amount.is_none() && deposit.is_none() && withdrawal.is_none() {
        return Err(BudgetError::validation_field(
            "no amount, deposit, or withdrawal column found",
            "amount",
        ));
    }
    Ok(ColumnIndexes {
        date,
        payee,
        memo,
        amount,
        deposit,
        withdrawal,
    })
}

fn looks_like_header(headers: &[String]) -> bool {
    find_index(headers, DATE_GROUP).is_some() && find_index(headers, PAYEE_GROUP).is_some()
}

/// `trim, collapse internal whitespace, uppercase`.
fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Parses a monetary cell accepting currency symbols, thousands
/// separators, a leading `-`, and `(...)` accounting-negative notation.
/// Returns minor units (cents), or `None` if the cell is blank or
/// unparseable. Parses the digits directly into integer cents rather than
/// through `f64`, since a binary float cannot represent every exact
/// decimal (`1.005` would round the wrong way if scaled as an `f64`).
fn parse_amount_cell(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let negative_parens = trimmed.starts_with('(') && trimmed.ends_with(')');
    let stripped: String = trimmed
        .trim_matches(|c| c == '(' || c == ')')
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if stripped.is_empty() {
        return None;
    }
    let minor_units = parse_decimal_to_minor_units(&stripped)?;
    Some(if negative_parens { -minor_units.abs() } else { minor_units })
}

/// Parses a plain decimal string (optional leading `-`, digits, optional
/// `.` followed by digits) into integer minor units, rounding
/// half-away-from-zero to 2 fractional digits without ever going through
/// `f64`.
fn parse_decimal_to_minor_units(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let negative = trimmed.starts_with('-');
    let unsigned = trimmed.strip_prefix(['-', '+']).unwrap_or(trimmed);
    if unsigned.is_empty() {
        return None;
    }
    let mut parts = unsigned.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");
    if parts.next().is_some() {
        return None;
    }
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let mut frac_digits = frac_part.chars();
    let first = frac_digits.next().and_then(|c| c.to_digit(10)).unwrap_or(0) as i64;
    let second = frac_digits.next().and_then(|c| c.to_digit(10)).unwrap_or(0) as i64;
    let round_up = frac_digits.next().and_then(|c| c.to_digit(10)).is_some_and(|d| d >= 5);
    let mut cents = whole * 100 + first * 10 + second;
    if round_up {
        cents += 1;
    }
    Some(if negative { -cents } else { cents })
}

fn fingerprint(
    account_id: &str,
    date: NaiveDate,
    amount_minor: i64,
    currency: &str,
    payee: &str,
    memo: &str,
) -> String {
    let account_hex = account_id.replace('-', "");
    let iso_date = date.format("%Y-%m-%d").to_string();
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    let amount_str = format!("{sign}{}.{:02}", abs / 100, abs % 100);
    let payee_norm = normalize(payee);
    let memo_norm = normalize(memo);
    let joined =
        format!("{account_hex}|{iso_date}|{amount_str}|{currency}|{payee_norm}|{memo_norm}");
    let digest = Sha256::digest(joined.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parses `csv_text` for `account_id`/`currency`, classifying every row
/// against `existing_fingerprints` (non-deleted transactions already on
/// this account within the file's date span) and rows already seen
/// earlier in the same file.
pub fn preview(
    csv_text: &str,
    account_id: &str,
    currency: &str,
    existing_fingerprints: &HashSet<String>,
) -> BudgetResult<PreviewResult> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| BudgetError::validation(format!("malformed CSV row: {e}")))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        raw_rows.push(record.iter().map(str::to_string).collect());
    }

    if raw_rows.is_empty() {
        return Ok(PreviewResult {
            rows: Vec::new(),
            counts: PreviewCounts::default(),
            min_date: None,
            max_date: None,
        });
    }

    let (columns, data_rows) = if looks_like_header(&raw_rows[0]) {
        (resolve_columns(&raw_rows[0])?, &raw_rows[1..])
    } else {
        (positional_columns(raw_rows[0].len())?, &raw_rows[..])
    };

    let mut rows = Vec::new();
    let mut counts = PreviewCounts::default();
    let mut seen_in_file: HashSet<String> = HashSet::new();
    let mut min_date: Option<NaiveDate> = None;
    let mut max_date: Option<NaiveDate> = None;

    for (offset, record) in data_rows.iter().enumerate() {
        let row_number = offset + 1;
        let get = |idx: usize| record.get(idx).map(String::as_str).unwrap_or("");

        let date = parse_date(get(columns.date));
        let payee = get(columns.payee).trim().to_string();
        let memo = columns
            .memo
            .map(|idx| get(idx).trim().to_string())
            .filter(|s| !s.is_empty());

        let amount_minor = columns
            .amount
            .and_then(|idx| parse_amount_cell(get(idx)))
            .or_else(|| {
                let deposit = columns
                    .deposit
                    .and_then(|idx| parse_amount_cell(get(idx)))
                    .unwrap_or(0);
                let withdrawal = columns
                    .withdrawal
                    .and_then(|idx| parse_amount_cell(get(idx)))
                    .unwrap_or(0);
                if deposit == 0 && withdrawal == 0 {
                    None
                } else {
                    Some(deposit - withdrawal.abs())
                }
            });

        let mut error = None;
        if date.is_none() {
            error = Some("invalid or missing date".to_string());
        } else if payee.is_empty() {
            error = Some("payee is required".to_string());
        } else if amount_minor.is_none() || amount_minor == Some(0) {
            error = Some("amount is missing, unparseable, or zero".to_string());
        }

        if let Some(message) = error {
            rows.push(PreviewRow {
                row_number,
                date,
                amount: None,
                payee,
                memo,
                status: RowStatus::Invalid,
                fingerprint: None,
                error: Some(message),
            });
            counts.invalid += 1;
            continue;
        }

        let date = date.expect("validated above");
        let amount_minor = amount_minor.expect("validated above");
        let amount = Money::from_minor_units(amount_minor, currency)?;

        if min_date.is_none_or(|d| date < d) {
            min_date = Some(date);
        }
        if max_date.is_none_or(|d| date > d) {
            max_date = Some(date);
        }

        let fp = fingerprint(
            account_id,
            date,
            amount_minor,
            currency,
            &payee,
            memo.as_deref().unwrap_or(""),
        );

        let status = if existing_fingerprints.contains(&fp) || seen_in_file.contains(&fp) {
            counts.duplicate += 1;
            RowStatus::Duplicate
        } else {
            seen_in_file.insert(fp.clone());
            counts.new += 1;
            RowStatus::New
        };

        rows.push(PreviewRow {
            row_number,
            date: Some(date),
            amount: Some(amount),
            payee,
            memo,
            status,
            fingerprint: Some(fp),
            error: None,
        });
    }

    Ok(PreviewResult {
        rows,
        counts,
        min_date,
        max_date,
    })
}

/// Headerless fallback: `date, payee, amount` or `date, payee, memo, amount`.
fn positional_columns(column_count: usize) -> BudgetResult<ColumnIndexes> {
    match column_count {
        3 => Ok(ColumnIndexes {
            date: 0,
            payee: 1,
            memo: None,
            amount: Some(2),
            deposit: None,
            withdrawal: None,
        }),
        4 => Ok(ColumnIndexes {
            date: 0,
            payee: 1,
            memo: Some(2),
            amount: Some(3),
            deposit: None,
            withdrawal: None,
        }),
        other => Err(BudgetError::validation(format!(
            "cannot infer columns for a headerless file with {other} columns"
        ))),
    }
}

/// Builds the commit plan for rows the caller confirmed as `New` in
/// preview. Re-checks each fingerprint against `existing_fingerprints`
/// (a fresh read, covering the file's date span) and an in-batch `seen`
/// set, so committing the same rows twice inserts nothing the second
/// time.
pub fn plan_commit(
    confirmed: Vec<ConfirmedRow>,
    existing_fingerprints: &HashSet<String>,
) -> CommitPlan {
    let mut to_insert = Vec::new();
    let mut skipped_duplicate_count = 0;
    let mut seen: HashSet<String> = HashSet::new();
    for row in confirmed {
        if existing_fingerprints.contains(&row.fingerprint) || seen.contains(&row.fingerprint) {
            skipped_duplicate_count += 1;
            continue;
        }
        seen.insert(row.fingerprint.clone());
        to_insert.push(row);
    }
    CommitPlan {
        to_insert,
        skipped_duplicate_count,
    }
}

/// Recomputes the fingerprint for an already-persisted transaction, so
/// callers can build the `existing_fingerprints` set passed to `preview`
/// and `plan_commit`.
pub fn fingerprint_for(
    account_id: &str,
    date: NaiveDate,
    amount_minor: i64,
    currency: &str,
    payee: &str,
    memo: &str,
) -> String {
    fingerprint(account_id, date, amount_minor, currency, payee, memo)
}

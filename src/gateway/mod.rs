//! SMS vendor gateway abstraction.
//!
//! This module provides:
//! - `Gateway` trait so the send orchestrator can run against a mock
//! - `AligoGateway` implementation over form-encoded HTTP POSTs
//! - Response envelope types; the vendor reports numbers inconsistently as
//!   JSON strings or integers, so numeric fields accept both

pub mod aligo;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::compose::MessageClass;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The vendor answered and refused. The message is the vendor's own.
    #[error("{message}")]
    Vendor { code: i64, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed vendor response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Validation(String),
}

/// Bulk sends carry 2 to 500 recipients; enforced before any network call.
pub const BULK_MIN: usize = 2;
pub const BULK_MAX: usize = 500;

pub fn validate_bulk_size(count: usize) -> Result<(), GatewayError> {
    if count < BULK_MIN {
        return Err(GatewayError::Validation(format!(
            "bulk send needs at least {BULK_MIN} recipients, got {count}"
        )));
    }
    if count > BULK_MAX {
        return Err(GatewayError::Validation(format!(
            "bulk send is limited to {BULK_MAX} recipients, got {count}"
        )));
    }
    Ok(())
}

/// Accepts a numeric field that may arrive as a JSON number or a string.
fn de_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Accepts a string field that may arrive as a JSON number.
fn de_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
    }
    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}

/// Outcome of a send call. `result_code > 0` means the vendor accepted the
/// batch; per-recipient counts are informational only.
#[derive(Debug, Clone, Deserialize)]
pub struct SendOutcome {
    #[serde(deserialize_with = "de_number")]
    pub result_code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "de_string")]
    pub msg_id: String,
    #[serde(default, deserialize_with = "de_number")]
    pub success_cnt: i64,
    #[serde(default, deserialize_with = "de_number")]
    pub error_cnt: i64,
    #[serde(default)]
    pub msg_type: String,
}

impl SendOutcome {
    pub fn accepted(&self) -> bool {
        self.result_code > 0
    }
}

/// Remaining prepaid quota per message class.
#[derive(Debug, Clone, Deserialize)]
pub struct Quota {
    #[serde(rename = "SMS_CNT", default, deserialize_with = "de_number")]
    pub sms: i64,
    #[serde(rename = "LMS_CNT", default, deserialize_with = "de_number")]
    pub lms: i64,
    #[serde(rename = "MMS_CNT", default, deserialize_with = "de_number")]
    pub mms: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(default, deserialize_with = "de_string")]
    pub mid: String,
    #[serde(rename = "type", default)]
    pub msg_type: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default, deserialize_with = "de_string")]
    pub sms_count: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub reg_date: String,
    #[serde(default)]
    pub reserve_state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPage {
    #[serde(deserialize_with = "de_number")]
    pub result_code: i64,
    #[serde(default)]
    pub message: String,
    /// "Y" when another page exists.
    #[serde(default)]
    pub next_yn: String,
    #[serde(default)]
    pub list: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetailEntry {
    #[serde(default, deserialize_with = "de_string")]
    pub mdid: String,
    #[serde(rename = "type", default)]
    pub msg_type: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub sms_state: String,
    #[serde(default)]
    pub reg_date: String,
    #[serde(default)]
    pub send_date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetailPage {
    #[serde(deserialize_with = "de_number")]
    pub result_code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub next_yn: String,
    #[serde(default)]
    pub list: Vec<DetailEntry>,
}

/// One bulk-send slot: a phone number and its already-resolved message.
#[derive(Debug, Clone)]
pub struct BulkRecipient {
    pub phone: String,
    pub message: String,
}

/// Vendor-format reservation: `rdate` is `yyyyMMdd`, `rtime` is `HHmm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub rdate: String,
    pub rtime: String,
}

/// Date range filter for the history listing, `yyyyMMdd` on both ends.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub page: u32,
    pub page_size: u32,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Trait for SMS vendor implementations.
pub trait Gateway {
    /// Sends one message to one recipient.
    fn send(
        &self,
        receiver: &str,
        message: &str,
        class: MessageClass,
    ) -> Result<SendOutcome, GatewayError>;

    /// Sends per-recipient messages in one vendor call. Recipient count must
    /// already satisfy [`validate_bulk_size`]; reservation applies to the
    /// whole batch.
    fn send_bulk(
        &self,
        recipients: &[BulkRecipient],
        class: MessageClass,
        reservation: Option<&Reservation>,
    ) -> Result<SendOutcome, GatewayError>;

    /// Lists sent messages, newest first.
    fn history(&self, query: &HistoryQuery) -> Result<HistoryPage, GatewayError>;

    /// Per-recipient delivery detail for one message id.
    fn detail(&self, mid: &str) -> Result<DetailPage, GatewayError>;

    /// Remaining prepaid quota.
    fn remaining(&self) -> Result<Quota, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_code_decodes_from_string_or_number() {
        let from_string: SendOutcome =
            serde_json::from_str(r#"{"result_code":"1","message":"success"}"#).unwrap();
        assert!(from_string.accepted());

        let from_number: SendOutcome =
            serde_json::from_str(r#"{"result_code":-101,"message":"인증 실패"}"#).unwrap();
        assert!(!from_number.accepted());
        assert_eq!(from_number.message, "인증 실패");
    }

    #[test]
    fn counts_default_when_absent() {
        let outcome: SendOutcome = serde_json::from_str(r#"{"result_code":1}"#).unwrap();
        assert_eq!(outcome.success_cnt, 0);
        assert_eq!(outcome.msg_id, "");
    }

    #[test]
    fn quota_decodes_the_vendor_string_counts() {
        let quota: Quota = serde_json::from_str(
            r#"{"result_code":"1","message":"","SMS_CNT":"250","LMS_CNT":10,"MMS_CNT":"0"}"#,
        )
        .unwrap();
        assert_eq!((quota.sms, quota.lms, quota.mms), (250, 10, 0));
    }

    #[test]
    fn history_entries_accept_numeric_mids() {
        let page: HistoryPage = serde_json::from_str(
            r#"{"result_code":1,"message":"","next_yn":"N","list":[{"mid":531231,"type":"SMS","sender":"01000000000","sms_count":"1","reg_date":"2025-01-02 03:04:05"}]}"#,
        )
        .unwrap();
        assert_eq!(page.list.len(), 1);
        assert_eq!(page.list[0].mid, "531231");
        assert_eq!(page.list[0].msg_type, "SMS");
    }

    #[test]
    fn bulk_size_bounds_are_inclusive() {
        assert!(validate_bulk_size(1).is_err());
        assert!(validate_bulk_size(2).is_ok());
        assert!(validate_bulk_size(500).is_ok());
        let err = validate_bulk_size(501).unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}

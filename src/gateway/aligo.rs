//! Aligo SMS gateway client.
//!
//! All endpoints take form-encoded POSTs carrying the API key and account id.
//! Note the history endpoint wants the account field spelled `userid` while
//! every other endpoint wants `user_id`; that asymmetry is the vendor's.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;

use crate::compose::{MessageClass, LMS_TITLE};
use crate::gateway::{
    BulkRecipient, DetailPage, Gateway, GatewayError, HistoryPage, HistoryQuery, Quota,
    Reservation, SendOutcome,
};

pub const DEFAULT_BASE_URL: &str = "https://apis.aligo.in";

pub struct AligoGateway {
    client: Client,
    base_url: String,
    api_key: String,
    user_id: String,
    sender: String,
}

impl AligoGateway {
    pub fn new(
        base_url: &str,
        api_key: &str,
        user_id: &str,
        sender: &str,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            user_id: user_id.to_string(),
            sender: sender.to_string(),
        })
    }

    fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let body = self.client.post(&url).form(&params).send()?.text()?;
        Ok(serde_json::from_str(&body)?)
    }

    fn credential_params(&self) -> Vec<(String, String)> {
        vec![
            ("key".to_string(), self.api_key.clone()),
            ("user_id".to_string(), self.user_id.clone()),
        ]
    }

    fn vendor_error(code: i64, message: &str) -> GatewayError {
        let message = if message.trim().is_empty() {
            "the vendor rejected the request".to_string()
        } else {
            message.to_string()
        };
        GatewayError::Vendor { code, message }
    }
}

fn push_class_params(params: &mut Vec<(String, String)>, class: MessageClass) {
    params.push(("msg_type".to_string(), class.as_str().to_string()));
    if class == MessageClass::Lms {
        params.push(("title".to_string(), LMS_TITLE.to_string()));
    }
}

impl Gateway for AligoGateway {
    fn send(
        &self,
        receiver: &str,
        message: &str,
        class: MessageClass,
    ) -> Result<SendOutcome, GatewayError> {
        let mut params = self.credential_params();
        params.push(("sender".to_string(), self.sender.clone()));
        params.push(("receiver".to_string(), receiver.to_string()));
        params.push(("msg".to_string(), message.to_string()));
        push_class_params(&mut params, class);

        let outcome: SendOutcome = self.post("/send/", params)?;
        if !outcome.accepted() {
            return Err(Self::vendor_error(outcome.result_code, &outcome.message));
        }
        Ok(outcome)
    }

    fn send_bulk(
        &self,
        recipients: &[BulkRecipient],
        class: MessageClass,
        reservation: Option<&Reservation>,
    ) -> Result<SendOutcome, GatewayError> {
        crate::gateway::validate_bulk_size(recipients.len())?;

        let mut params = self.credential_params();
        params.push(("sender".to_string(), self.sender.clone()));
        params.push(("cnt".to_string(), recipients.len().to_string()));
        push_class_params(&mut params, class);
        if let Some(reservation) = reservation {
            params.push(("rdate".to_string(), reservation.rdate.clone()));
            params.push(("rtime".to_string(), reservation.rtime.clone()));
        }
        for (index, recipient) in recipients.iter().enumerate() {
            let slot = index + 1;
            params.push((format!("rec_{slot}"), recipient.phone.clone()));
            params.push((format!("msg_{slot}"), recipient.message.clone()));
        }

        let outcome: SendOutcome = self.post("/send_mass/", params)?;
        if !outcome.accepted() {
            return Err(Self::vendor_error(outcome.result_code, &outcome.message));
        }
        Ok(outcome)
    }

    fn history(&self, query: &HistoryQuery) -> Result<HistoryPage, GatewayError> {
        // this endpoint spells the account field "userid"
        let mut params = vec![
            ("key".to_string(), self.api_key.clone()),
            ("userid".to_string(), self.user_id.clone()),
            ("page".to_string(), query.page.to_string()),
            ("page_size".to_string(), query.page_size.to_string()),
        ];
        if let Some(start) = &query.start_date {
            params.push(("start_date".to_string(), start.clone()));
        }
        if let Some(end) = &query.end_date {
            params.push(("end_date".to_string(), end.clone()));
        }

        let page: HistoryPage = self.post("/sms_list/", params)?;
        if page.result_code <= 0 {
            return Err(Self::vendor_error(page.result_code, &page.message));
        }
        Ok(page)
    }

    fn detail(&self, mid: &str) -> Result<DetailPage, GatewayError> {
        let mut params = self.credential_params();
        params.push(("mid".to_string(), mid.to_string()));

        let page: DetailPage = self.post("/detail/", params)?;
        if page.result_code <= 0 {
            return Err(Self::vendor_error(page.result_code, &page.message));
        }
        Ok(page)
    }

    fn remaining(&self) -> Result<Quota, GatewayError> {
        #[derive(serde::Deserialize)]
        struct Envelope {
            #[serde(deserialize_with = "crate::gateway::de_number")]
            result_code: i64,
            #[serde(default)]
            message: String,
            #[serde(flatten)]
            quota: Quota,
        }

        let envelope: Envelope = self.post("/remain/", self.credential_params())?;
        if envelope.result_code <= 0 {
            return Err(Self::vendor_error(envelope.result_code, &envelope.message));
        }
        Ok(envelope.quota)
    }
}

//! Bulk send orchestration.
//!
//! A [`SendSession`] holds the contacts pulled into the send workflow. SMS
//! dispatch goes through a [`Gateway`]; the chat channel never touches the
//! network and instead walks an explicit confirmation state machine that ends
//! in a hand-off document for the desktop automation tooling.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use time::macros::format_description;
use time::{Date, Time};

use crate::compose::{self, MessageClass};
use crate::gateway::{validate_bulk_size, BulkRecipient, Gateway, Reservation, SendOutcome};
use crate::handoff;
use crate::store::{SenderContact, Template, SEND_COMPLETE};

/// When the batch should leave the vendor. Reservations only apply to bulk
/// SMS; the single-send and chat paths ignore them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTime {
    Immediate,
    Reserved(Reservation),
}

impl SendTime {
    /// Builds a reservation from `yyyy-MM-dd` and `HH:mm` user input,
    /// reformatted to the vendor's `yyyyMMdd`/`HHmm`.
    pub fn reserved(date: &str, time: &str) -> Result<Self> {
        let date = Date::parse(date, format_description!("[year]-[month]-[day]"))
            .with_context(|| format!("invalid reservation date: {date}"))?;
        let time = Time::parse(time, format_description!("[hour]:[minute]"))
            .with_context(|| format!("invalid reservation time: {time}"))?;
        Ok(SendTime::Reserved(Reservation {
            rdate: date
                .format(format_description!("[year][month][day]"))
                .context("failed to format reservation date")?,
            rtime: time
                .format(format_description!("[hour][minute]"))
                .context("failed to format reservation time")?,
        }))
    }
}

/// What an SMS dispatch did, for reporting and for persisting the sent flags.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub outcome: SendOutcome,
    pub sent_ids: Vec<String>,
    pub class: MessageClass,
}

pub struct SendSession {
    contacts: Vec<SenderContact>,
    in_flight: bool,
}

impl SendSession {
    pub fn new(contacts: Vec<SenderContact>) -> Self {
        Self {
            contacts,
            in_flight: false,
        }
    }

    pub fn contacts(&self) -> &[SenderContact] {
        &self.contacts
    }

    /// Adds a contact to the session. Returns false (leaving the session
    /// unchanged) when the id is already present.
    pub fn add(&mut self, contact: SenderContact) -> bool {
        if self
            .contacts
            .iter()
            .any(|c| c.contact.id == contact.contact.id)
        {
            return false;
        }
        self.contacts.push(contact);
        true
    }

    /// Applies a template to every checked contact, all or nothing. Returns
    /// how many contacts were configured.
    pub fn apply_template(&mut self, template: &Template) -> Result<usize> {
        let mut targets: Vec<SenderContact> = self
            .contacts
            .iter()
            .filter(|c| c.contact.checked)
            .cloned()
            .collect();
        compose::apply_to_selection(template, &mut targets)?;
        let count = targets.len();
        for configured in targets {
            if let Some(slot) = self
                .contacts
                .iter_mut()
                .find(|c| c.contact.id == configured.contact.id)
            {
                *slot = configured;
            }
        }
        Ok(count)
    }

    /// The dispatchable subset: checked and configured.
    pub fn configured_selection(&self) -> Vec<SenderContact> {
        self.contacts
            .iter()
            .filter(|c| c.contact.checked && c.is_configured)
            .cloned()
            .collect()
    }

    /// Sends the configured selection over SMS. One recipient takes the
    /// single-send path; two to five hundred take the bulk path; anything
    /// larger fails before any network call. A vendor acceptance marks every
    /// attempted contact sent; a refusal marks none.
    pub fn dispatch_sms(
        &mut self,
        gateway: &dyn Gateway,
        send_time: &SendTime,
    ) -> Result<DispatchReport> {
        if self.in_flight {
            bail!("a send is already in progress");
        }
        self.in_flight = true;
        let result = self.dispatch_sms_inner(gateway, send_time);
        self.in_flight = false;
        result
    }

    fn dispatch_sms_inner(
        &mut self,
        gateway: &dyn Gateway,
        send_time: &SendTime,
    ) -> Result<DispatchReport> {
        let selection = self.configured_selection();
        if selection.is_empty() {
            bail!("no contacts are both selected and configured");
        }
        if selection.len() > 1 {
            validate_bulk_size(selection.len())?;
        }

        // the whole batch rides the widest class any message needs
        let class = if selection
            .iter()
            .any(|c| compose::classify(&c.message_content) == MessageClass::Lms)
        {
            MessageClass::Lms
        } else {
            MessageClass::Sms
        };

        let outcome = if selection.len() == 1 {
            let only = &selection[0];
            gateway.send(&only.contact.phone_number, &only.message_content, class)?
        } else {
            let recipients: Vec<BulkRecipient> = selection
                .iter()
                .map(|c| BulkRecipient {
                    phone: c.contact.phone_number.clone(),
                    message: c.message_content.clone(),
                })
                .collect();
            let reservation = match send_time {
                SendTime::Immediate => None,
                SendTime::Reserved(reservation) => Some(reservation),
            };
            gateway.send_bulk(&recipients, class, reservation)?
        };

        let sent_ids: Vec<String> = selection.iter().map(|c| c.contact.id.clone()).collect();
        self.mark_sent(&sent_ids);
        Ok(DispatchReport {
            outcome,
            sent_ids,
            class,
        })
    }

    fn mark_sent(&mut self, ids: &[String]) {
        for contact in &mut self.contacts {
            if ids.contains(&contact.contact.id) {
                contact.contact.start_flag = SEND_COMPLETE.to_string();
            }
        }
    }

    /// Starts the chat hand-off over the configured selection.
    pub fn begin_chat_handoff(&self) -> Result<ChatHandoff> {
        let targets = self.configured_selection();
        if targets.is_empty() {
            bail!("no contacts are both selected and configured");
        }
        Ok(ChatHandoff {
            targets,
            stage: HandoffStage::AwaitingStartConfirm,
        })
    }

    /// Marks the handed-off contacts sent. Only valid once the hand-off
    /// document has been written.
    pub fn complete_chat_handoff(&mut self, handoff: &ChatHandoff) -> Result<Vec<String>> {
        if handoff.stage != HandoffStage::HandedOff {
            bail!("the hand-off has not been written yet");
        }
        let ids: Vec<String> = handoff
            .targets
            .iter()
            .map(|c| c.contact.id.clone())
            .collect();
        self.mark_sent(&ids);
        Ok(ids)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffStage {
    AwaitingStartConfirm,
    AwaitingCountConfirm,
    AwaitingPayloadConfirm,
    HandedOff,
}

/// The chat channel's confirmation sequence. Each confirmation advances one
/// stage; the payload confirmation writes the hand-off document. A failed
/// write leaves the machine where it was so the confirmation can be retried.
pub struct ChatHandoff {
    targets: Vec<SenderContact>,
    stage: HandoffStage,
}

impl ChatHandoff {
    pub fn stage(&self) -> HandoffStage {
        self.stage
    }

    pub fn targets(&self) -> &[SenderContact] {
        &self.targets
    }

    pub fn confirm_start(&mut self) -> Result<()> {
        if self.stage != HandoffStage::AwaitingStartConfirm {
            bail!("the hand-off has already been started");
        }
        self.stage = HandoffStage::AwaitingCountConfirm;
        Ok(())
    }

    /// Confirms the recipient count; returns it for display.
    pub fn confirm_count(&mut self) -> Result<usize> {
        if self.stage != HandoffStage::AwaitingCountConfirm {
            bail!("the recipient count is not awaiting confirmation");
        }
        self.stage = HandoffStage::AwaitingPayloadConfirm;
        Ok(self.targets.len())
    }

    /// Writes the hand-off document and finishes the sequence.
    pub fn confirm_payload(&mut self, dir: &Path) -> Result<PathBuf> {
        if self.stage != HandoffStage::AwaitingPayloadConfirm {
            bail!("the payload is not awaiting confirmation");
        }
        let path = handoff::write_json_list(dir, handoff::SENDER_LIST, &self.targets)?;
        self.stage = HandoffStage::HandedOff;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{DetailPage, GatewayError, HistoryPage, HistoryQuery, Quota};
    use crate::store::Contact;
    use std::cell::RefCell;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq)]
    enum Call {
        Send {
            receiver: String,
            class: &'static str,
        },
        SendBulk {
            count: usize,
            class: &'static str,
            reservation: Option<Reservation>,
        },
    }

    struct MockGateway {
        calls: RefCell<Vec<Call>>,
        refuse: bool,
    }

    impl MockGateway {
        fn accepting() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                refuse: false,
            }
        }

        fn refusing() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                refuse: true,
            }
        }

        fn outcome(&self) -> Result<SendOutcome, GatewayError> {
            if self.refuse {
                Err(GatewayError::Vendor {
                    code: -101,
                    message: "인증 오류입니다.".to_string(),
                })
            } else {
                Ok(serde_json::from_str(r#"{"result_code":"1","message":"success"}"#).unwrap())
            }
        }
    }

    impl Gateway for MockGateway {
        fn send(
            &self,
            receiver: &str,
            _message: &str,
            class: MessageClass,
        ) -> Result<SendOutcome, GatewayError> {
            self.calls.borrow_mut().push(Call::Send {
                receiver: receiver.to_string(),
                class: class.as_str(),
            });
            self.outcome()
        }

        fn send_bulk(
            &self,
            recipients: &[BulkRecipient],
            class: MessageClass,
            reservation: Option<&Reservation>,
        ) -> Result<SendOutcome, GatewayError> {
            self.calls.borrow_mut().push(Call::SendBulk {
                count: recipients.len(),
                class: class.as_str(),
                reservation: reservation.cloned(),
            });
            self.outcome()
        }

        fn history(&self, _query: &HistoryQuery) -> Result<HistoryPage, GatewayError> {
            unimplemented!()
        }

        fn detail(&self, _mid: &str) -> Result<DetailPage, GatewayError> {
            unimplemented!()
        }

        fn remaining(&self) -> Result<Quota, GatewayError> {
            unimplemented!()
        }
    }

    fn configured(id: &str, phone: &str, message: &str) -> SenderContact {
        let mut sc = SenderContact::from_contact(Contact {
            id: id.to_string(),
            phone_number: phone.to_string(),
            checked: true,
            ..Contact::default()
        });
        sc.message_content = message.to_string();
        sc.is_configured = true;
        sc
    }

    #[test]
    fn one_recipient_takes_the_single_send_path() {
        let gateway = MockGateway::accepting();
        let mut session = SendSession::new(vec![configured("1", "01000000001", "hi")]);
        let report = session.dispatch_sms(&gateway, &SendTime::Immediate).unwrap();
        assert_eq!(report.sent_ids, vec!["1"]);
        assert_eq!(
            *gateway.calls.borrow(),
            vec![Call::Send {
                receiver: "01000000001".to_string(),
                class: "SMS",
            }]
        );
        assert_eq!(session.contacts()[0].contact.start_flag, SEND_COMPLETE);
    }

    #[test]
    fn a_bulk_batch_rides_the_widest_class_and_the_reservation() {
        let gateway = MockGateway::accepting();
        let long: String = "가".repeat(91);
        let mut session = SendSession::new(vec![
            configured("1", "01000000001", "short"),
            configured("2", "01000000002", &long),
        ]);
        let when = SendTime::reserved("2026-09-01", "13:30").unwrap();
        let report = session.dispatch_sms(&gateway, &when).unwrap();
        assert_eq!(report.class, MessageClass::Lms);
        assert_eq!(
            *gateway.calls.borrow(),
            vec![Call::SendBulk {
                count: 2,
                class: "LMS",
                reservation: Some(Reservation {
                    rdate: "20260901".to_string(),
                    rtime: "1330".to_string(),
                }),
            }]
        );
    }

    #[test]
    fn oversized_batches_fail_before_any_network_call() {
        let gateway = MockGateway::accepting();
        let contacts: Vec<SenderContact> = (0..501)
            .map(|i| configured(&i.to_string(), "01000000001", "hi"))
            .collect();
        let mut session = SendSession::new(contacts);
        let err = session
            .dispatch_sms(&gateway, &SendTime::Immediate)
            .unwrap_err();
        assert!(err.to_string().contains("500"));
        assert!(gateway.calls.borrow().is_empty());
        assert!(session.contacts().iter().all(|c| c.contact.start_flag.is_empty()));
    }

    #[test]
    fn a_vendor_refusal_marks_nothing_sent() {
        let gateway = MockGateway::refusing();
        let mut session = SendSession::new(vec![
            configured("1", "01000000001", "hi"),
            configured("2", "01000000002", "hi"),
        ]);
        let err = session
            .dispatch_sms(&gateway, &SendTime::Immediate)
            .unwrap_err();
        assert_eq!(err.to_string(), "인증 오류입니다.");
        assert!(session.contacts().iter().all(|c| c.contact.start_flag.is_empty()));
    }

    #[test]
    fn a_second_dispatch_is_rejected_while_one_runs() {
        let gateway = MockGateway::accepting();
        let mut session = SendSession::new(vec![configured("1", "01000000001", "hi")]);
        session.in_flight = true;
        let err = session
            .dispatch_sms(&gateway, &SendTime::Immediate)
            .unwrap_err();
        assert!(err.to_string().contains("already in progress"));
        assert!(gateway.calls.borrow().is_empty());
    }

    #[test]
    fn unconfigured_and_unchecked_contacts_never_dispatch() {
        let gateway = MockGateway::accepting();
        let mut unchecked = configured("1", "01000000001", "hi");
        unchecked.contact.checked = false;
        let mut unconfigured = SenderContact::from_contact(Contact {
            id: "2".to_string(),
            checked: true,
            ..Contact::default()
        });
        unconfigured.is_configured = false;
        let mut session = SendSession::new(vec![unchecked, unconfigured]);
        assert!(session.dispatch_sms(&gateway, &SendTime::Immediate).is_err());
        assert!(gateway.calls.borrow().is_empty());
    }

    #[test]
    fn adding_a_present_id_is_a_no_op() {
        let mut session = SendSession::new(vec![configured("1", "01000000001", "hi")]);
        assert!(!session.add(configured("1", "01000000001", "hi")));
        assert!(session.add(configured("2", "01000000002", "hi")));
        assert_eq!(session.contacts().len(), 2);
    }

    #[test]
    fn the_chat_handoff_confirms_in_order_and_survives_a_failed_write() {
        let dir = TempDir::new().unwrap();
        let mut session = SendSession::new(vec![configured("1", "01000000001", "hi")]);
        let mut handoff = session.begin_chat_handoff().unwrap();

        // out-of-order confirmations are rejected
        assert!(handoff.confirm_count().is_err());
        handoff.confirm_start().unwrap();
        assert!(handoff.confirm_start().is_err());
        assert_eq!(handoff.confirm_count().unwrap(), 1);

        // a write into an unwritable target keeps the stage retryable
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, "x").unwrap();
        assert!(handoff.confirm_payload(&blocked).is_err());
        assert_eq!(handoff.stage(), HandoffStage::AwaitingPayloadConfirm);
        assert!(session.complete_chat_handoff(&handoff).is_err());

        let path = handoff.confirm_payload(dir.path()).unwrap();
        assert!(path.ends_with("sender_list.json"));
        assert_eq!(handoff.stage(), HandoffStage::HandedOff);

        let ids = session.complete_chat_handoff(&handoff).unwrap();
        assert_eq!(ids, vec!["1"]);
        assert_eq!(session.contacts()[0].contact.start_flag, SEND_COMPLETE);
    }

    #[test]
    fn reservations_validate_their_input() {
        assert!(SendTime::reserved("2026-13-01", "10:00").is_err());
        assert!(SendTime::reserved("2026-09-01", "25:00").is_err());
        let SendTime::Reserved(r) = SendTime::reserved("2026-01-05", "08:05").unwrap() else {
            panic!("expected a reservation");
        };
        assert_eq!(r.rdate, "20260105");
        assert_eq!(r.rtime, "0805");
    }

    #[test]
    fn apply_template_configures_only_checked_contacts() {
        let mut unchecked = SenderContact::from_contact(Contact {
            id: "2".to_string(),
            name: "Lee".to_string(),
            ..Contact::default()
        });
        unchecked.contact.checked = false;
        let checked = SenderContact::from_contact(Contact {
            id: "1".to_string(),
            name: "Kim".to_string(),
            checked: true,
            ..Contact::default()
        });
        let mut session = SendSession::new(vec![checked, unchecked]);
        let template = Template {
            id: "t".to_string(),
            title: "t".to_string(),
            message: "hi {{이름}}".to_string(),
            attachment_mode: Default::default(),
            files: vec![],
        };
        assert_eq!(session.apply_template(&template).unwrap(), 1);
        assert_eq!(session.contacts()[0].message_content, "hi Kim");
        assert!(session.contacts()[0].is_configured);
        assert!(!session.contacts()[1].is_configured);
    }
}

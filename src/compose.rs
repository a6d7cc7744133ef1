//! Message templating and channel classification.

use anyhow::{bail, Result};

use crate::store::{SenderContact, Template};

/// Messages up to this many characters go out as SMS; anything longer is LMS.
pub const SMS_MAX_CHARS: usize = 90;
/// Fixed subject line the vendor requires on LMS traffic.
pub const LMS_TITLE: &str = "알림";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Sms,
    Lms,
}

impl MessageClass {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageClass::Sms => "SMS",
            MessageClass::Lms => "LMS",
        }
    }
}

/// Classifies by character count, not byte length, so multibyte text counts
/// one per character.
pub fn classify(message: &str) -> MessageClass {
    if message.chars().count() <= SMS_MAX_CHARS {
        MessageClass::Sms
    } else {
        MessageClass::Lms
    }
}

/// Substitutes the per-contact placeholders. Unknown tokens pass through
/// verbatim.
pub fn resolve_template(message: &str, contact: &SenderContact) -> String {
    message
        .replace("{{이름}}", &contact.contact.name)
        .replace("{{정의1}}", &contact.contact.definition1)
        .replace("{{정의2}}", &contact.contact.definition2)
        .replace("{{정의3}}", &contact.contact.definition3)
}

/// Applies a template to every target, all or nothing. A blank message or an
/// empty target set fails before any contact is touched.
pub fn apply_to_selection(template: &Template, targets: &mut [SenderContact]) -> Result<()> {
    if template.message.trim().is_empty() {
        bail!("the template message is empty");
    }
    if targets.is_empty() {
        bail!("no contacts are selected");
    }
    for target in targets.iter_mut() {
        target.message_content = resolve_template(&template.message, target);
        target.attachment_mode = template.attachment_mode;
        target.files = template.files.clone();
        target.is_configured = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AttachmentMode, Contact};

    fn target(name: &str) -> SenderContact {
        SenderContact::from_contact(Contact {
            name: name.to_string(),
            definition1: "gold".to_string(),
            ..Contact::default()
        })
    }

    fn template(message: &str) -> Template {
        Template {
            id: "1".to_string(),
            title: "t".to_string(),
            message: message.to_string(),
            attachment_mode: AttachmentMode::Individual,
            files: vec!["a.jpg".to_string()],
        }
    }

    #[test]
    fn placeholders_resolve_and_unknown_tokens_survive() {
        let resolved = resolve_template("{{이름}}/{{정의1}}/{{정의9}}", &target("Kim"));
        assert_eq!(resolved, "Kim/gold/{{정의9}}");
    }

    #[test]
    fn classification_counts_characters_not_bytes() {
        let korean: String = "가".repeat(90);
        assert_eq!(classify(&korean), MessageClass::Sms);
        let korean_long: String = "가".repeat(91);
        assert_eq!(classify(&korean_long), MessageClass::Lms);
        assert_eq!(classify(""), MessageClass::Sms);
    }

    #[test]
    fn apply_is_all_or_nothing() {
        let mut targets = vec![target("Kim"), target("Lee")];
        assert!(apply_to_selection(&template("  "), &mut targets).is_err());
        assert!(targets.iter().all(|t| !t.is_configured));

        let mut empty: Vec<SenderContact> = Vec::new();
        assert!(apply_to_selection(&template("hi"), &mut empty).is_err());

        apply_to_selection(&template("hi {{이름}}"), &mut targets).unwrap();
        assert_eq!(targets[0].message_content, "hi Kim");
        assert_eq!(targets[1].message_content, "hi Lee");
        assert!(targets.iter().all(|t| t.is_configured));
        assert_eq!(targets[0].attachment_mode, AttachmentMode::Individual);
        assert_eq!(targets[0].files, vec!["a.jpg".to_string()]);
    }
}

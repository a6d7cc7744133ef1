//! Duplicate detection and merge over phone-number identity.
//!
//! Two contacts are duplicates when their digit-normalized phone numbers are
//! equal and non-empty. The merge is a pure function over the selected set;
//! callers apply the result with [`apply_merge`].

use anyhow::{bail, Result};

use crate::phone;
use crate::store::Contact;

/// Finds candidates for a phone-number query. The match is exact equality on
/// the normalized number. When any matching number occurs more than once only
/// members of such duplicated numbers are returned; otherwise the plain match
/// set comes back so the caller can still inspect it.
pub fn find_duplicates(contacts: &[Contact], phone_query: &str) -> Result<Vec<Contact>> {
    let Some(needle) = phone::normalize_query(phone_query) else {
        bail!("enter a phone number to search for");
    };
    let matches: Vec<Contact> = contacts
        .iter()
        .filter(|c| phone::normalize(&c.phone_number) == needle)
        .cloned()
        .collect();

    let groups = group_by_phone(&matches);
    let duplicated: Vec<Contact> = groups
        .iter()
        .filter(|(_, members)| members.len() > 1)
        .flat_map(|(_, members)| members.iter().map(|&c| c.clone()))
        .collect();

    if duplicated.is_empty() {
        Ok(matches)
    } else {
        Ok(duplicated)
    }
}

/// Summary of how much the records in a duplicate set disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Divergence {
    pub total_duplicates: usize,
    pub unique_email_count: usize,
    pub unique_memo_count: usize,
}

/// Summarizes the first duplicated number in the set. Only one group is
/// reported even when several numbers are duplicated; merges are done one
/// number at a time anyway.
pub fn divergence(set: &[Contact]) -> Divergence {
    let groups = group_by_phone(set);
    let Some((_, members)) = groups.iter().find(|(_, members)| members.len() > 1) else {
        return Divergence::default();
    };

    let mut emails: Vec<&str> = members
        .iter()
        .map(|c| c.email.as_str())
        .filter(|e| !e.is_empty())
        .collect();
    emails.sort_unstable();
    emails.dedup();

    let mut memos: Vec<&str> = members
        .iter()
        .map(|c| c.memo.as_str())
        .filter(|m| !m.is_empty())
        .collect();
    memos.sort_unstable();
    memos.dedup();

    Divergence {
        total_duplicates: members.len(),
        unique_email_count: emails.len(),
        unique_memo_count: memos.len(),
    }
}

/// Per-contact duplicate badge counts over the whole book: how many records
/// share this contact's number, and how many distinct emails and memos exist
/// among them. Emails compare case-insensitively after trimming; memos after
/// trimming.
pub fn duplicate_stats(contacts: &[Contact], id: &str) -> (usize, usize, usize) {
    let Some(contact) = contacts.iter().find(|c| c.id == id) else {
        return (0, 0, 0);
    };
    let needle = phone::normalize(&contact.phone_number);
    if needle.is_empty() {
        return (0, 0, 0);
    }
    let same_phone: Vec<&Contact> = contacts
        .iter()
        .filter(|c| phone::normalize(&c.phone_number) == needle)
        .collect();

    let mut emails: Vec<String> = same_phone
        .iter()
        .map(|c| c.email.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();
    emails.sort_unstable();
    emails.dedup();

    let mut memos: Vec<&str> = same_phone
        .iter()
        .map(|c| c.memo.trim())
        .filter(|m| !m.is_empty())
        .collect();
    memos.sort_unstable();
    memos.dedup();

    (same_phone.len(), emails.len(), memos.len())
}

/// Merges donor records into the base without touching the input. Email merge
/// runs before memo merge, so email notes appended to the base memo take part
/// in the memo comparison that follows.
///
/// Each concern keeps its own counter, starting at 2. With an empty base
/// field the first non-empty donor value fills the field itself and later
/// values land in the memo as `추가 이메일N: …` / `추가 메모N: …` with N
/// starting at 2. With a non-empty base field every differing donor value is
/// appended and N starts at 1.
pub fn merge(base: &Contact, others: &[Contact], merge_email: bool, merge_memo: bool) -> Contact {
    let mut merged = base.clone();

    if merge_email {
        let base_email = merged.email.clone();
        let mut count = 2;
        if base_email.is_empty() {
            for donor in others {
                if donor.email.is_empty() {
                    continue;
                }
                if count == 2 {
                    merged.email = donor.email.clone();
                } else {
                    let note = format!("추가 이메일{}: {}", count - 1, donor.email);
                    append_memo_line(&mut merged.memo, &note);
                }
                count += 1;
            }
        } else {
            for donor in others {
                if donor.email.is_empty() || donor.email == base_email {
                    continue;
                }
                let note = format!("추가 이메일{}: {}", count - 1, donor.email);
                append_memo_line(&mut merged.memo, &note);
                count += 1;
            }
        }
    }

    if merge_memo {
        // snapshot taken after the email merge above
        let base_memo = merged.memo.clone();
        let mut count = 2;
        if base_memo.is_empty() {
            for donor in others {
                if donor.memo.is_empty() {
                    continue;
                }
                if count == 2 {
                    merged.memo = donor.memo.clone();
                } else {
                    let note = format!("추가 메모{}: {}", count - 1, donor.memo);
                    append_memo_line(&mut merged.memo, &note);
                }
                count += 1;
            }
        } else {
            for donor in others {
                if donor.memo.is_empty() || donor.memo == base_memo {
                    continue;
                }
                let note = format!("추가 메모{}: {}", count - 1, donor.memo);
                append_memo_line(&mut merged.memo, &note);
                count += 1;
            }
        }
    }

    merged
}

fn append_memo_line(memo: &mut String, line: &str) {
    if memo.is_empty() {
        memo.push_str(line);
    } else {
        memo.push('\n');
        memo.push_str(line);
    }
}

/// Replaces the whole contact array after a merge: every record sharing the
/// base's normalized number is dropped except the base, which is substituted
/// by the merged record.
pub fn apply_merge(contacts: &[Contact], base_id: &str, merged: &Contact) -> Result<Vec<Contact>> {
    let Some(base) = contacts.iter().find(|c| c.id == base_id) else {
        bail!("no contact with id {base_id}");
    };
    let base_phone = phone::normalize(&base.phone_number);
    Ok(contacts
        .iter()
        .filter(|c| phone::normalize(&c.phone_number) != base_phone || c.id == base_id)
        .map(|c| {
            if c.id == base_id {
                merged.clone()
            } else {
                c.clone()
            }
        })
        .collect())
}

fn group_by_phone<'a>(contacts: &'a [Contact]) -> Vec<(String, Vec<&'a Contact>)> {
    let mut groups: Vec<(String, Vec<&'a Contact>)> = Vec::new();
    for contact in contacts {
        let key = phone::normalize(&contact.phone_number);
        if key.is_empty() {
            continue;
        }
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(contact),
            None => groups.push((key, vec![contact])),
        }
    }
    groups
}

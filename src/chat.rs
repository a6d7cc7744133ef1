//! Chat roster maintenance: friend-add marking and display-name changes.

use anyhow::{bail, Result};

use crate::store::{
    Contact, CHECKLIST_MATCHED, FRIEND_ADD_REQUESTED, NAME_CHANGE_CONFIRMED,
    NAME_CHANGE_REQUESTED,
};

/// Contacts eligible for a friend-add request: checklist still undecided and
/// a phone number present.
pub fn friend_add_candidates(contacts: &[Contact]) -> Vec<Contact> {
    contacts
        .iter()
        .filter(|c| !c.checklist_decided() && !c.phone_number.trim().is_empty())
        .cloned()
        .collect()
}

/// Marks the given ids as friend-add requested (`completion_flag = "1"`).
/// Returns the marked subset in book order.
pub fn mark_friend_add_requested(contacts: &mut [Contact], ids: &[String]) -> Result<Vec<Contact>> {
    let mut marked = Vec::new();
    for contact in contacts.iter_mut() {
        if ids.contains(&contact.id) {
            contact.completion_flag = FRIEND_ADD_REQUESTED.to_string();
            marked.push(contact.clone());
        }
    }
    if marked.is_empty() {
        bail!("no contacts need a friend-add request");
    }
    Ok(marked)
}

/// Contacts whose chat display name was flagged as mismatched.
pub fn name_edit_candidates(contacts: &[Contact]) -> Vec<Contact> {
    contacts
        .iter()
        .filter(|c| c.checklist_state == crate::store::CHECKLIST_MISMATCHED)
        .cloned()
        .collect()
}

/// Stages display-name changes for mismatched contacts: each `(id, name)`
/// pair sets `pending_display_name` and `completion_flag = "3"`. Every pair
/// is validated before any contact is touched; a new name must be non-empty
/// after trimming and must differ from the current chat display name.
/// Returns the changed subset in book order.
pub fn request_name_changes(
    contacts: &mut [Contact],
    new_names: &[(String, String)],
) -> Result<Vec<Contact>> {
    if new_names.is_empty() {
        bail!("no display-name changes were given");
    }
    for (id, name) in new_names {
        let Some(contact) = contacts.iter().find(|c| &c.id == id) else {
            bail!("no contact with id {id}");
        };
        if contact.checklist_state != crate::store::CHECKLIST_MISMATCHED {
            bail!("contact {id} is not flagged for a display-name change");
        }
        let name = name.trim();
        if name.is_empty() {
            bail!("the new display name for contact {id} is empty");
        }
        if name == contact.chat_display_name {
            bail!("the new display name for contact {id} matches its chat display name");
        }
    }

    let mut changed = Vec::new();
    for contact in contacts.iter_mut() {
        if let Some((_, name)) = new_names.iter().find(|(id, _)| id == &contact.id) {
            contact.pending_display_name = name.trim().to_string();
            contact.completion_flag = NAME_CHANGE_REQUESTED.to_string();
            changed.push(contact.clone());
        }
    }
    Ok(changed)
}

/// Applies the pending display-name change to every mismatched contact: the
/// chat display name becomes the conversation name, the pending name clears,
/// and the checklist settles as matched. Returns how many changed.
pub fn apply_name_changes(contacts: &mut [Contact]) -> Result<usize> {
    let mut changed = 0;
    for contact in contacts.iter_mut() {
        if contact.checklist_state != crate::store::CHECKLIST_MISMATCHED {
            continue;
        }
        contact.conversation_name = contact.chat_display_name.clone();
        contact.pending_display_name = String::new();
        contact.checklist_state = CHECKLIST_MATCHED.to_string();
        contact.completion_flag = NAME_CHANGE_CONFIRMED.to_string();
        changed += 1;
    }
    if changed == 0 {
        bail!("no contacts need a display-name change");
    }
    Ok(changed)
}

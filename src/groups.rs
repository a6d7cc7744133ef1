//! Group filtering: five computed virtual views plus real named groups.

use crate::phone;
use crate::store::Contact;

/// A filter over the contact list. The virtual views are computed from
/// contact state; only [`GroupSelector::Named`] corresponds to a stored group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSelector {
    All,
    Selected,
    NeedsFriendAdd,
    NeedsNameEdit,
    Duplicates,
    Named(String),
}

impl GroupSelector {
    pub fn parse(name: &str) -> Self {
        match name {
            "전체" => GroupSelector::All,
            "선택됨" => GroupSelector::Selected,
            "카톡친구추가" => GroupSelector::NeedsFriendAdd,
            "대화명수정" => GroupSelector::NeedsNameEdit,
            "중복제거" => GroupSelector::Duplicates,
            other => GroupSelector::Named(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            GroupSelector::All => "전체",
            GroupSelector::Selected => "선택됨",
            GroupSelector::NeedsFriendAdd => "카톡친구추가",
            GroupSelector::NeedsNameEdit => "대화명수정",
            GroupSelector::Duplicates => "중복제거",
            GroupSelector::Named(name) => name,
        }
    }
}

fn is_duplicate(contact: &Contact, contacts: &[Contact]) -> bool {
    let key = phone::normalize(&contact.phone_number);
    if key.is_empty() {
        return false;
    }
    contacts
        .iter()
        .filter(|c| phone::normalize(&c.phone_number) == key)
        .count()
        >= 2
}

fn matches(contact: &Contact, selector: &GroupSelector, contacts: &[Contact]) -> bool {
    match selector {
        GroupSelector::All => true,
        GroupSelector::Selected => contact.checked,
        GroupSelector::NeedsFriendAdd => !contact.checklist_decided(),
        GroupSelector::NeedsNameEdit => {
            contact.checklist_state == crate::store::CHECKLIST_MISMATCHED
        }
        GroupSelector::Duplicates => is_duplicate(contact, contacts),
        GroupSelector::Named(name) => contact.group == *name,
    }
}

pub fn filter_by_group(contacts: &[Contact], selector: &GroupSelector) -> Vec<Contact> {
    contacts
        .iter()
        .filter(|c| matches(c, selector, contacts))
        .cloned()
        .collect()
}

/// Toggles `checked` for exactly the contacts in the current filtered view.
/// Contacts outside the view keep their state, including in the virtual
/// views.
pub fn toggle_all(contacts: &mut [Contact], selector: &GroupSelector, on: bool) -> usize {
    let snapshot = contacts.to_vec();
    let mut touched = 0;
    for contact in contacts.iter_mut() {
        if matches(contact, selector, &snapshot) {
            contact.checked = on;
            touched += 1;
        }
    }
    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CHECKLIST_MATCHED, CHECKLIST_MISMATCHED};

    fn contact(id: &str, phone: &str) -> Contact {
        Contact {
            id: id.to_string(),
            phone_number: phone.to_string(),
            ..Contact::default()
        }
    }

    fn book() -> Vec<Contact> {
        let mut a = contact("1", "010-0000-0001");
        a.checked = true;
        a.checklist_state = CHECKLIST_MATCHED.to_string();
        let mut b = contact("2", "01000000001");
        b.checklist_state = CHECKLIST_MISMATCHED.to_string();
        let mut c = contact("3", "010-0000-0002");
        c.group = "friends".to_string();
        let d = contact("4", "");
        vec![a, b, c, d]
    }

    #[test]
    fn selector_parses_virtual_and_named_groups() {
        assert_eq!(GroupSelector::parse("전체"), GroupSelector::All);
        assert_eq!(GroupSelector::parse("중복제거"), GroupSelector::Duplicates);
        assert_eq!(
            GroupSelector::parse("friends"),
            GroupSelector::Named("friends".to_string())
        );
        assert_eq!(GroupSelector::parse("선택됨").label(), "선택됨");
    }

    #[test]
    fn virtual_views_filter_as_specified() {
        let contacts = book();
        let ids = |sel: GroupSelector| -> Vec<String> {
            filter_by_group(&contacts, &sel)
                .into_iter()
                .map(|c| c.id)
                .collect()
        };
        assert_eq!(ids(GroupSelector::All), vec!["1", "2", "3", "4"]);
        assert_eq!(ids(GroupSelector::Selected), vec!["1"]);
        assert_eq!(ids(GroupSelector::NeedsFriendAdd), vec!["3", "4"]);
        assert_eq!(ids(GroupSelector::NeedsNameEdit), vec!["2"]);
        assert_eq!(ids(GroupSelector::Duplicates), vec!["1", "2"]);
        assert_eq!(ids(GroupSelector::Named("friends".to_string())), vec!["3"]);
    }

    #[test]
    fn empty_phones_never_count_as_duplicates() {
        let contacts = vec![contact("1", ""), contact("2", ""), contact("3", "abc")];
        assert!(filter_by_group(&contacts, &GroupSelector::Duplicates).is_empty());
    }

    #[test]
    fn toggle_all_touches_only_the_filtered_view() {
        let mut contacts = book();
        let touched = toggle_all(&mut contacts, &GroupSelector::Duplicates, true);
        assert_eq!(touched, 2);
        assert!(contacts[0].checked);
        assert!(contacts[1].checked);
        assert!(!contacts[2].checked);
        assert!(!contacts[3].checked);

        toggle_all(&mut contacts, &GroupSelector::Duplicates, false);
        assert!(!contacts[0].checked);
        assert!(!contacts[1].checked);
    }
}

//! Persistent address-book state: contacts, groups, and message templates.
//!
//! The system of record is three named JSON documents behind the
//! [`Repository`] trait. [`Book`] keeps the decoded arrays in memory, reads
//! them once on open, and writes the affected document back on every
//! mutation.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "sendbook";

pub const CONTACTS_DOC: &str = "contacts";
pub const GROUPS_DOC: &str = "groups";
pub const TEMPLATES_DOC: &str = "templates";

/// Fallback bucket for contacts whose group disappears.
pub const DEFAULT_GROUP: &str = "기타";
/// `start_flag` marker for a contact whose send completed.
pub const SEND_COMPLETE: &str = "발송완료";
/// `checklist_state` for a confirmed display name.
pub const CHECKLIST_MATCHED: &str = "일치";
/// `checklist_state` for a display name flagged as wrong.
pub const CHECKLIST_MISMATCHED: &str = "불일치";
/// `completion_flag` once a friend-add run has been requested.
pub const FRIEND_ADD_REQUESTED: &str = "1";
/// `completion_flag` once a display-name change has been requested.
pub const NAME_CHANGE_REQUESTED: &str = "3";
/// `completion_flag` once a display-name change has been applied.
pub const NAME_CHANGE_CONFIRMED: &str = "5";

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

/// One row of the address book. Serde names mirror the JSON documents the
/// hand-off consumers read, so the on-disk shape stays interchangeable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Group", default = "default_group")]
    pub group: String,
    /// Transient selection flag; persisted but not part of business identity.
    #[serde(rename = "Check", default)]
    pub checked: bool,
    #[serde(rename = "Conversation", default)]
    pub conversation_name: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Phone_Number", default)]
    pub phone_number: String,
    #[serde(rename = "Email", default)]
    pub email: String,
    #[serde(rename = "Definition1", default)]
    pub definition1: String,
    #[serde(rename = "Definition2", default)]
    pub definition2: String,
    #[serde(rename = "Definition3", default)]
    pub definition3: String,
    #[serde(rename = "Memo", default)]
    pub memo: String,
    #[serde(rename = "Start_Or", default)]
    pub start_flag: String,
    #[serde(rename = "Whether_Or", default)]
    pub completion_flag: String,
    #[serde(rename = "Checklist", default)]
    pub checklist_state: String,
    #[serde(rename = "Dialogue_Name", default)]
    pub chat_display_name: String,
    #[serde(rename = "Change_Name", default)]
    pub pending_display_name: String,
}

impl Default for Contact {
    fn default() -> Self {
        Self {
            id: String::new(),
            group: default_group(),
            checked: false,
            conversation_name: String::new(),
            name: String::new(),
            phone_number: String::new(),
            email: String::new(),
            definition1: String::new(),
            definition2: String::new(),
            definition3: String::new(),
            memo: String::new(),
            start_flag: String::new(),
            completion_flag: String::new(),
            checklist_state: String::new(),
            chat_display_name: String::new(),
            pending_display_name: String::new(),
        }
    }
}

impl Contact {
    /// Whether the chat-friend checklist has been decided either way.
    pub fn checklist_decided(&self) -> bool {
        self.checklist_state == CHECKLIST_MATCHED || self.checklist_state == CHECKLIST_MISMATCHED
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

/// Attachment delivery mode for a template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentMode {
    #[default]
    #[serde(rename = "묶음")]
    Bundled,
    #[serde(rename = "개별")]
    Individual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "fileType", default)]
    pub attachment_mode: AttachmentMode,
    #[serde(default)]
    pub files: Vec<String>,
}

/// A contact pulled into the send workflow, carrying per-session dispatch
/// fields. Never written back to the contact store; serialized only for
/// hand-off documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderContact {
    #[serde(flatten)]
    pub contact: Contact,
    #[serde(rename = "messageContent", default)]
    pub message_content: String,
    #[serde(rename = "fileType", default)]
    pub attachment_mode: AttachmentMode,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(rename = "isConfigured", default)]
    pub is_configured: bool,
}

impl SenderContact {
    pub fn from_contact(contact: Contact) -> Self {
        Self {
            contact,
            message_content: String::new(),
            attachment_mode: AttachmentMode::Bundled,
            files: Vec::new(),
            is_configured: false,
        }
    }
}

/// Key-value persistence for named JSON documents.
pub trait Repository {
    fn read(&self, name: &str) -> Result<Option<String>>;
    fn write(&self, name: &str, payload: &str) -> Result<()>;
}

/// File-backed repository: one `<name>.json` per document under a data
/// directory.
pub struct JsonFileRepository {
    dir: PathBuf,
}

impl JsonFileRepository {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Opens the repository in the platform data directory.
    pub fn open_default() -> Result<Self> {
        let base = BaseDirs::new().context("unable to determine data directories")?;
        Ok(Self::new(base.data_dir().join(APP_NAME)))
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl Repository for JsonFileRepository {
    fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let payload = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Some(payload))
    }

    fn write(&self, name: &str, payload: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create directory: {}", self.dir.display()))?;
        let path = self.path_for(name);
        fs::write(&path, payload).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// The in-memory address book, loaded on open and persisted on every
/// mutation. Mutations that rewrite the contact array go through
/// [`Book::replace_contacts`], the whole-array replace-and-set contract the
/// rest of the crate relies on.
pub struct Book {
    repo: Box<dyn Repository>,
    contacts: Vec<Contact>,
    groups: Vec<Group>,
    templates: Vec<Template>,
}

impl Book {
    pub fn open(repo: Box<dyn Repository>) -> Result<Self> {
        let contacts = load_list(repo.as_ref(), CONTACTS_DOC)?;
        let groups = load_list(repo.as_ref(), GROUPS_DOC)?;
        let templates = load_list(repo.as_ref(), TEMPLATES_DOC)?;
        Ok(Self {
            repo,
            contacts,
            groups,
            templates,
        })
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn template(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Next contact id: `max(numeric ids) + 1`. Non-numeric ids are ignored;
    /// ids are never reused within a session because deletion cannot lower
    /// the maximum of the remaining rows' history before the next insert.
    pub fn next_contact_id(&self) -> String {
        let highest = self
            .contacts
            .iter()
            .filter_map(|c| c.id.parse::<i64>().ok())
            .max()
            .unwrap_or(0);
        (highest + 1).to_string()
    }

    pub fn replace_contacts(&mut self, contacts: Vec<Contact>) -> Result<()> {
        self.contacts = contacts;
        self.persist(CONTACTS_DOC, &self.contacts)
    }

    /// Adds a contact, assigning its id. Returns the assigned id.
    pub fn add_contact(&mut self, mut contact: Contact) -> Result<String> {
        contact.id = self.next_contact_id();
        let id = contact.id.clone();
        self.contacts.push(contact);
        self.persist(CONTACTS_DOC, &self.contacts)?;
        Ok(id)
    }

    pub fn remove_contact(&mut self, id: &str) -> Result<()> {
        let before = self.contacts.len();
        self.contacts.retain(|c| c.id != id);
        if self.contacts.len() == before {
            bail!("no contact with id {id}");
        }
        self.persist(CONTACTS_DOC, &self.contacts)
    }

    /// Deletes every checked contact; returns how many were removed.
    pub fn remove_checked(&mut self) -> Result<usize> {
        let before = self.contacts.len();
        self.contacts.retain(|c| !c.checked);
        let removed = before - self.contacts.len();
        if removed == 0 {
            bail!("no contacts are selected");
        }
        self.persist(CONTACTS_DOC, &self.contacts)?;
        Ok(removed)
    }

    pub fn add_group(&mut self, name: &str) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            bail!("group name is empty");
        }
        if self.groups.iter().any(|g| g.name == name) {
            bail!("group \"{name}\" already exists");
        }
        let id = self.groups.iter().map(|g| g.id).max().unwrap_or(0) + 1;
        self.groups.push(Group {
            id,
            name: name.to_string(),
        });
        self.persist(GROUPS_DOC, &self.groups)?;
        Ok(id)
    }

    /// Deletes a group. Rejected while the group still has members; the
    /// rebucket to the default group afterwards is vacuous once the member
    /// check passed, kept for parity with the delete contract.
    pub fn delete_group(&mut self, group_id: i64) -> Result<String> {
        let Some(pos) = self.groups.iter().position(|g| g.id == group_id) else {
            bail!("no group with id {group_id}");
        };
        let name = self.groups[pos].name.clone();
        let members = self.contacts.iter().filter(|c| c.group == name).count();
        if members > 0 {
            bail!("group \"{name}\" still has {members} contact(s) and cannot be deleted");
        }
        self.groups.remove(pos);
        for contact in &mut self.contacts {
            if contact.group == name {
                contact.group = DEFAULT_GROUP.to_string();
            }
        }
        // contacts first: the rebucket target must be on disk before the
        // group document stops naming the group
        self.persist(CONTACTS_DOC, &self.contacts)?;
        self.persist(GROUPS_DOC, &self.groups)?;
        Ok(name)
    }

    pub fn add_template(
        &mut self,
        title: &str,
        message: &str,
        attachment_mode: AttachmentMode,
        files: Vec<String>,
    ) -> Result<String> {
        if title.trim().is_empty() {
            bail!("template title is empty");
        }
        if message.trim().is_empty() {
            bail!("template message is empty");
        }
        let id = self.next_template_id();
        self.templates.push(Template {
            id: id.clone(),
            title: title.to_string(),
            message: message.to_string(),
            attachment_mode,
            files,
        });
        self.persist(TEMPLATES_DOC, &self.templates)?;
        Ok(id)
    }

    pub fn delete_template(&mut self, id: &str) -> Result<()> {
        let before = self.templates.len();
        self.templates.retain(|t| t.id != id);
        if self.templates.len() == before {
            bail!("no template with id {id}");
        }
        self.persist(TEMPLATES_DOC, &self.templates)
    }

    /// Template ids are millisecond-timestamp tokens, bumped past any
    /// collision so they stay monotonically increasing.
    fn next_template_id(&self) -> String {
        let mut token = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        while self.templates.iter().any(|t| t.id == token.to_string()) {
            token += 1;
        }
        token.to_string()
    }

    fn persist<T: Serialize>(&self, name: &str, list: &[T]) -> Result<()> {
        let payload = serde_json::to_string_pretty(list)
            .with_context(|| format!("failed to encode {name}"))?;
        self.repo.write(name, &payload)
    }
}

fn load_list<T: DeserializeOwned>(repo: &dyn Repository, name: &str) -> Result<Vec<T>> {
    match repo.read(name)? {
        Some(payload) => {
            serde_json::from_str(&payload).with_context(|| format!("failed to decode {name}"))
        }
        None => Ok(Vec::new()),
    }
}

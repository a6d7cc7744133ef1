mod chat;
mod compose;
mod config;
mod dedup;
mod gateway;
mod groups;
mod handoff;
mod phone;
mod sender;
mod store;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use config::Config;
use gateway::aligo::AligoGateway;
use gateway::{Gateway, HistoryQuery};
use groups::GroupSelector;
use sender::{SendSession, SendTime};
use store::{AttachmentMode, Book, Contact, JsonFileRepository, SenderContact, SEND_COMPLETE};

#[derive(Parser, Debug)]
#[command(name = "sendbook")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List contacts, optionally filtered by a group or virtual view
    List(ListArgs),
    /// Add a contact
    Add(AddArgs),
    /// Remove a contact by id
    Remove(RemoveArgs),
    /// Check or uncheck contacts for the send workflow
    Check(CheckArgs),
    /// Manage groups
    #[command(subcommand)]
    Group(GroupCommand),
    /// Manage message templates
    #[command(subcommand)]
    Template(TemplateCommand),
    /// Find duplicate contacts for a phone number
    Dupes(DupesArgs),
    /// Merge duplicate contacts into a designated base
    Merge(MergeArgs),
    /// Send the configured selection over SMS or hand it to the chat tooling
    Send(SendArgs),
    /// Mark chat friend-add candidates and write their hand-off roster
    FriendAdd(FriendAddArgs),
    /// Stage and apply chat display-name changes
    #[command(subcommand)]
    NameEdit(NameEditCommand),
    /// Show the remaining vendor quota
    Quota,
    /// List sent messages
    History(HistoryArgs),
    /// Show per-recipient delivery detail for one message
    Detail(DetailArgs),
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Group name or one of the virtual views (전체, 선택됨, 카톡친구추가,
    /// 대화명수정, 중복제거)
    #[arg(long)]
    group: Option<String>,
}

#[derive(Args, Debug)]
struct AddArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    group: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    memo: Option<String>,
}

#[derive(Args, Debug)]
struct RemoveArgs {
    /// Contact id to remove
    #[arg(required_unless_present = "checked")]
    id: Option<String>,
    /// Remove every checked contact instead
    #[arg(long, conflicts_with = "id")]
    checked: bool,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Contact ids to check
    ids: Vec<String>,
    /// Toggle every contact in the given group or virtual view instead
    #[arg(long, conflicts_with = "ids")]
    group: Option<String>,
    /// Uncheck instead of check
    #[arg(long)]
    off: bool,
}

#[derive(Subcommand, Debug)]
enum GroupCommand {
    Add { name: String },
    Delete { id: i64 },
    List,
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    Save(TemplateSaveArgs),
    List,
    Delete { id: String },
}

#[derive(Args, Debug)]
struct TemplateSaveArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    message: String,
    #[arg(long, value_enum, default_value_t = AttachmentModeArg::Bundled)]
    mode: AttachmentModeArg,
    #[arg(long)]
    file: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AttachmentModeArg {
    Bundled,
    Individual,
}

impl From<AttachmentModeArg> for AttachmentMode {
    fn from(arg: AttachmentModeArg) -> Self {
        match arg {
            AttachmentModeArg::Bundled => AttachmentMode::Bundled,
            AttachmentModeArg::Individual => AttachmentMode::Individual,
        }
    }
}

#[derive(Args, Debug)]
struct DupesArgs {
    phone: String,
}

#[derive(Args, Debug)]
struct MergeArgs {
    phone: String,
    /// Id of the contact the duplicates merge into
    #[arg(long)]
    base: String,
    /// Merge divergent emails into the base
    #[arg(long)]
    email: bool,
    /// Merge divergent memos into the base
    #[arg(long)]
    memo: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Channel {
    Sms,
    Kakao,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[arg(long, value_enum)]
    channel: Channel,
    /// Template id to apply to the checked contacts
    #[arg(long)]
    template: String,
    /// Pull extra contacts into the send list by id
    #[arg(long = "with")]
    with: Vec<String>,
    /// Reservation date (yyyy-MM-dd); bulk SMS only
    #[arg(long, requires = "time")]
    date: Option<String>,
    /// Reservation time (HH:mm); bulk SMS only
    #[arg(long, requires = "date")]
    time: Option<String>,
    /// Answer yes to every confirmation
    #[arg(long, short = 'y')]
    yes: bool,
}

#[derive(Args, Debug)]
struct FriendAddArgs {
    /// Answer yes to every confirmation
    #[arg(long, short = 'y')]
    yes: bool,
}

#[derive(Subcommand, Debug)]
enum NameEditCommand {
    /// Stage new display names for mismatched contacts and write their
    /// hand-off roster
    Request(NameEditRequestArgs),
    /// Apply the staged display-name changes
    Apply,
}

#[derive(Args, Debug)]
struct NameEditRequestArgs {
    /// Display-name change as <id>=<new name>; repeatable
    #[arg(long = "set", value_parser = parse_name_change, required = true)]
    set: Vec<(String, String)>,
}

fn parse_name_change(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((id, name)) if !id.is_empty() => Ok((id.to_string(), name.to_string())),
        _ => Err(format!("expected <id>=<new name>, got \"{raw}\"")),
    }
}

#[derive(Args, Debug)]
struct HistoryArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 30)]
    page_size: u32,
    /// Range start (yyyyMMdd)
    #[arg(long)]
    start_date: Option<String>,
    /// Range end (yyyyMMdd)
    #[arg(long)]
    end_date: Option<String>,
}

#[derive(Args, Debug)]
struct DetailArgs {
    mid: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Command::List(args) => handle_list(args, &config),
        Command::Add(args) => handle_add(args, &config),
        Command::Remove(args) => handle_remove(args, &config),
        Command::Check(args) => handle_check(args, &config),
        Command::Group(command) => handle_group(command, &config),
        Command::Template(command) => handle_template(command, &config),
        Command::Dupes(args) => handle_dupes(args, &config),
        Command::Merge(args) => handle_merge(args, &config),
        Command::Send(args) => handle_send(args, &config),
        Command::FriendAdd(args) => handle_friend_add(args, &config),
        Command::NameEdit(command) => handle_name_edit(command, &config),
        Command::Quota => handle_quota(&config),
        Command::History(args) => handle_history(args, &config),
        Command::Detail(args) => handle_detail(args, &config),
    }
}

fn open_book(config: &Config) -> Result<Book> {
    let repo = match &config.data_dir {
        Some(dir) => JsonFileRepository::new(dir.clone()),
        None => JsonFileRepository::open_default()?,
    };
    Book::open(Box::new(repo))
}

fn build_gateway(config: &Config) -> Result<AligoGateway> {
    config.gateway.validate()?;
    let gateway = AligoGateway::new(
        &config.gateway.base_url,
        &config.gateway.api_key,
        &config.gateway.user_id,
        &config.gateway.sender,
    )?;
    Ok(gateway)
}

fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    print!("{prompt} [y/N] ");
    io::stdout().flush().context("failed to flush stdout")?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn print_contact_line(contact: &Contact) {
    println!(
        "{}\t{}\t{}\t{}\t{}{}",
        contact.id,
        contact.name,
        contact.phone_number,
        contact.group,
        if contact.checked { "[x]" } else { "[ ]" },
        if contact.start_flag == SEND_COMPLETE {
            format!("\t{SEND_COMPLETE}")
        } else {
            String::new()
        },
    );
}

fn handle_list(args: ListArgs, config: &Config) -> Result<()> {
    let book = open_book(config)?;
    let selector = args
        .group
        .as_deref()
        .map(GroupSelector::parse)
        .unwrap_or(GroupSelector::All);
    let filtered = groups::filter_by_group(book.contacts(), &selector);
    if filtered.is_empty() {
        println!("No contacts in \"{}\"", selector.label());
        return Ok(());
    }
    for contact in &filtered {
        print_contact_line(contact);
        if selector == GroupSelector::Duplicates {
            let (phones, emails, memos) = dedup::duplicate_stats(book.contacts(), &contact.id);
            println!("\t{phones} share this number, {emails} email(s), {memos} memo(s)");
        }
    }
    println!("{} contact(s)", filtered.len());
    Ok(())
}

fn handle_add(args: AddArgs, config: &Config) -> Result<()> {
    let mut book = open_book(config)?;
    if let Some(group) = &args.group {
        if group != store::DEFAULT_GROUP && !book.groups().iter().any(|g| &g.name == group) {
            bail!("group \"{group}\" does not exist");
        }
    }
    let contact = Contact {
        name: args.name,
        phone_number: args.phone,
        group: args.group.unwrap_or_else(|| store::DEFAULT_GROUP.to_string()),
        email: args.email.unwrap_or_default(),
        memo: args.memo.unwrap_or_default(),
        ..Contact::default()
    };
    let id = book.add_contact(contact)?;
    println!("Added contact {id}");
    Ok(())
}

fn handle_remove(args: RemoveArgs, config: &Config) -> Result<()> {
    let mut book = open_book(config)?;
    if args.checked {
        let removed = book.remove_checked()?;
        println!("Removed {removed} contact(s)");
    } else if let Some(id) = args.id {
        book.remove_contact(&id)?;
        println!("Removed contact {id}");
    }
    Ok(())
}

fn handle_check(args: CheckArgs, config: &Config) -> Result<()> {
    let mut book = open_book(config)?;
    let on = !args.off;
    let mut contacts = book.contacts().to_vec();

    let touched = if let Some(group) = &args.group {
        let selector = GroupSelector::parse(group);
        groups::toggle_all(&mut contacts, &selector, on)
    } else {
        if args.ids.is_empty() {
            bail!("pass contact ids or --group");
        }
        let mut ids = args.ids.clone();
        ids.sort_unstable();
        ids.dedup();
        let mut touched = 0;
        for contact in &mut contacts {
            if ids.contains(&contact.id) {
                contact.checked = on;
                touched += 1;
            }
        }
        if touched != ids.len() {
            bail!("some of the given ids do not exist");
        }
        touched
    };

    book.replace_contacts(contacts)?;
    println!(
        "{} {} contact(s)",
        if on { "Checked" } else { "Unchecked" },
        touched
    );
    Ok(())
}

fn handle_group(command: GroupCommand, config: &Config) -> Result<()> {
    let mut book = open_book(config)?;
    match command {
        GroupCommand::Add { name } => {
            let id = book.add_group(&name)?;
            println!("Added group {id} \"{name}\"");
        }
        GroupCommand::Delete { id } => {
            let name = book.delete_group(id)?;
            println!("Deleted group \"{name}\"");
        }
        GroupCommand::List => {
            for group in book.groups() {
                let members = book
                    .contacts()
                    .iter()
                    .filter(|c| c.group == group.name)
                    .count();
                println!("{}\t{}\t{} member(s)", group.id, group.name, members);
            }
        }
    }
    Ok(())
}

fn handle_template(command: TemplateCommand, config: &Config) -> Result<()> {
    let mut book = open_book(config)?;
    match command {
        TemplateCommand::Save(args) => {
            let id = book.add_template(&args.title, &args.message, args.mode.into(), args.file)?;
            println!("Saved template {id}");
        }
        TemplateCommand::List => {
            for template in book.templates() {
                println!(
                    "{}\t{}\t{} file(s)",
                    template.id,
                    template.title,
                    template.files.len()
                );
            }
        }
        TemplateCommand::Delete { id } => {
            book.delete_template(&id)?;
            println!("Deleted template {id}");
        }
    }
    Ok(())
}

fn handle_dupes(args: DupesArgs, config: &Config) -> Result<()> {
    let book = open_book(config)?;
    let found = dedup::find_duplicates(book.contacts(), &args.phone)?;
    if found.is_empty() {
        println!("No contacts match \"{}\"", args.phone);
        return Ok(());
    }
    for contact in &found {
        print_contact_line(contact);
    }
    let divergence = dedup::divergence(&found);
    if divergence.total_duplicates > 0 {
        println!(
            "{} duplicate(s), {} distinct email(s), {} distinct memo(s)",
            divergence.total_duplicates,
            divergence.unique_email_count,
            divergence.unique_memo_count
        );
    } else {
        println!("No duplicates for \"{}\"", args.phone);
    }
    Ok(())
}

fn handle_merge(args: MergeArgs, config: &Config) -> Result<()> {
    let mut book = open_book(config)?;
    let found = dedup::find_duplicates(book.contacts(), &args.phone)?;
    let Some(base) = found.iter().find(|c| c.id == args.base) else {
        bail!("contact {} is not among the duplicates for \"{}\"", args.base, args.phone);
    };
    let others: Vec<Contact> = found.iter().filter(|c| c.id != args.base).cloned().collect();
    if others.is_empty() {
        bail!("nothing to merge for \"{}\"", args.phone);
    }

    let merged = dedup::merge(base, &others, args.email, args.memo);
    let updated = dedup::apply_merge(book.contacts(), &args.base, &merged)?;
    let removed = book.contacts().len() - updated.len();
    book.replace_contacts(updated)?;
    println!("Merged {removed} duplicate(s) into contact {}", args.base);
    Ok(())
}

fn handle_send(args: SendArgs, config: &Config) -> Result<()> {
    let mut book = open_book(config)?;
    let template = book
        .template(&args.template)
        .with_context(|| format!("no template with id {}", args.template))?
        .clone();

    let mut session = SendSession::new(
        book.contacts()
            .iter()
            .filter(|c| c.checked)
            .cloned()
            .map(SenderContact::from_contact)
            .collect(),
    );
    for id in &args.with {
        let contact = book
            .contacts()
            .iter()
            .find(|c| &c.id == id)
            .with_context(|| format!("no contact with id {id}"))?;
        let mut extra = contact.clone();
        extra.checked = true;
        if !session.add(SenderContact::from_contact(extra)) {
            eprintln!("warning: contact {id} is already in the send list");
        }
    }
    let configured = session.apply_template(&template)?;
    println!("Configured {configured} contact(s) with \"{}\"", template.title);

    match args.channel {
        Channel::Sms => {
            let send_time = match (&args.date, &args.time) {
                (Some(date), Some(time)) => SendTime::reserved(date, time)?,
                _ => SendTime::Immediate,
            };
            if args.date.is_some() && session.configured_selection().len() == 1 {
                eprintln!("warning: reservations do not apply to single-recipient sends");
            }
            let gateway = build_gateway(config)?;
            let report = session.dispatch_sms(&gateway, &send_time)?;
            mark_sent_in_book(&mut book, &report.sent_ids)?;
            println!(
                "Sent {} message(s) as {} (vendor said: {})",
                report.sent_ids.len(),
                report.class.as_str(),
                if report.outcome.message.is_empty() {
                    "ok"
                } else {
                    &report.outcome.message
                }
            );
        }
        Channel::Kakao => {
            if args.date.is_some() {
                eprintln!("warning: reservations do not apply to the kakao channel");
            }
            let mut handoff = session.begin_chat_handoff()?;
            if !confirm("Start the kakao hand-off?", args.yes)? {
                println!("Cancelled");
                return Ok(());
            }
            handoff.confirm_start()?;
            if !confirm(
                &format!("Hand off {} contact(s)?", handoff.targets().len()),
                args.yes,
            )? {
                println!("Cancelled");
                return Ok(());
            }
            let count = handoff.confirm_count()?;
            if !confirm(
                &format!("Write the hand-off roster for {count} contact(s)?"),
                args.yes,
            )? {
                println!("Cancelled");
                return Ok(());
            }
            let path = handoff.confirm_payload(&config.handoff_dir)?;
            let ids = session.complete_chat_handoff(&handoff)?;
            mark_sent_in_book(&mut book, &ids)?;
            println!("Wrote {} contact(s) to {}", ids.len(), path.display());
        }
    }
    Ok(())
}

fn mark_sent_in_book(book: &mut Book, ids: &[String]) -> Result<()> {
    let mut contacts = book.contacts().to_vec();
    for contact in &mut contacts {
        if ids.contains(&contact.id) {
            contact.start_flag = SEND_COMPLETE.to_string();
        }
    }
    book.replace_contacts(contacts)
}

fn handle_friend_add(args: FriendAddArgs, config: &Config) -> Result<()> {
    let mut book = open_book(config)?;
    let candidates = chat::friend_add_candidates(book.contacts());
    if candidates.is_empty() {
        bail!("no contacts need a friend-add request");
    }
    if !confirm(
        &format!("Mark {} contact(s) for friend-add?", candidates.len()),
        args.yes,
    )? {
        println!("Cancelled");
        return Ok(());
    }

    let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
    let mut contacts = book.contacts().to_vec();
    let marked = chat::mark_friend_add_requested(&mut contacts, &ids)?;
    book.replace_contacts(contacts)?;

    let path = handoff::write_json_list(&config.handoff_dir, handoff::FRIEND_ADD_LIST, &marked)?;
    println!("Wrote {} contact(s) to {}", marked.len(), path.display());
    Ok(())
}

fn handle_name_edit(command: NameEditCommand, config: &Config) -> Result<()> {
    let mut book = open_book(config)?;
    match command {
        NameEditCommand::Request(args) => {
            let mut contacts = book.contacts().to_vec();
            let changed = chat::request_name_changes(&mut contacts, &args.set)?;
            book.replace_contacts(contacts)?;
            let path =
                handoff::write_json_list(&config.handoff_dir, handoff::FRIEND_ADD_LIST, &changed)?;
            println!(
                "Requested {} display-name change(s); wrote {}",
                changed.len(),
                path.display()
            );
        }
        NameEditCommand::Apply => {
            for contact in chat::name_edit_candidates(book.contacts()) {
                println!(
                    "{}\t{}\t{} -> {}",
                    contact.id, contact.name, contact.conversation_name, contact.chat_display_name
                );
            }
            let mut contacts = book.contacts().to_vec();
            let changed = chat::apply_name_changes(&mut contacts)?;
            book.replace_contacts(contacts)?;
            println!("Updated {changed} display name(s)");
        }
    }
    Ok(())
}

fn handle_quota(config: &Config) -> Result<()> {
    let gateway = build_gateway(config)?;
    let quota = gateway.remaining()?;
    println!("SMS: {}", quota.sms);
    println!("LMS: {}", quota.lms);
    println!("MMS: {}", quota.mms);
    Ok(())
}

fn handle_history(args: HistoryArgs, config: &Config) -> Result<()> {
    let gateway = build_gateway(config)?;
    let page = gateway.history(&HistoryQuery {
        page: args.page,
        page_size: args.page_size,
        start_date: args.start_date,
        end_date: args.end_date,
    })?;
    if page.list.is_empty() {
        println!("No messages");
        return Ok(());
    }
    for entry in &page.list {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            entry.mid, entry.msg_type, entry.reg_date, entry.sms_count, entry.msg
        );
    }
    if page.next_yn == "Y" {
        println!("More on page {}", args.page + 1);
    }
    Ok(())
}

fn handle_detail(args: DetailArgs, config: &Config) -> Result<()> {
    let gateway = build_gateway(config)?;
    let page = gateway.detail(&args.mid)?;
    if page.list.is_empty() {
        println!("No recipients for message {}", args.mid);
        return Ok(());
    }
    for entry in &page.list {
        println!(
            "{}\t{}\t{}\t{}",
            entry.receiver, entry.sms_state, entry.send_date, entry.msg_type
        );
    }
    Ok(())
}

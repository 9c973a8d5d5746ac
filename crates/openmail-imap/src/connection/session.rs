//! The IMAP session: state machine, command dispatch, and the mailbox
//! operations the façade exposes.
//!
//! One session owns one connection. Every public operation takes the
//! session's connection mutex, runs entirely under it, and releases it
//! before returning, so the IDLE monitor and foreground commands never
//! interleave on the socket. Command dispatch brackets IDLE: an active
//! IDLE is suspended with `DONE` before the command is written, and the
//! monitor re-enters IDLE after its activation delay rather than the
//! command paying for the round-trip itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::command::{Command, FetchItem, TagGenerator};
use crate::error::{Error, Result};
use crate::message::{
    self, MessageGroup, PREVIEW_LIMIT, PartSelector, content_body_part, preview_body_part,
};
use crate::parser::{BodyStructure, Response, Untagged, parse_response};
use crate::search::SearchQuery;
use crate::types::{
    AttachmentInfo, EmailFlags, EmailSummary, EmailWithContent, Flag, Folder, MailboxPage, Mark,
    SearchedEmails, SequenceSet, SpecialUse, validate_folder_name,
};

use super::framed::FramedStream;
use super::idle::MailEvent;
use super::stream::{ImapStream, connect_tls};

/// Bound on any wait for a specific response (DONE handshake, IDLE
/// continuation).
pub const WAIT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(180);

/// Default per-command deadline.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Header fields requested for summaries and content.
const HEADER_FIELDS: [&str; 10] = [
    "FROM",
    "TO",
    "SUBJECT",
    "DATE",
    "CC",
    "BCC",
    "MESSAGE-ID",
    "IN-REPLY-TO",
    "REFERENCES",
    "LIST-UNSUBSCRIBE",
];

/// Bytes fetched for a preview body part.
const PREVIEW_FETCH_BYTES: u32 = 1024;

/// Configuration for an IMAP session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server hostname.
    pub host: String,
    /// Server port (993 for implicit TLS).
    pub port: u16,
    /// Login username (usually the address).
    pub username: String,
    /// Login password.
    pub password: String,
    /// Connect deadline.
    pub connect_timeout: Duration,
    /// Per-command deadline.
    pub command_timeout: Duration,
}

impl SessionConfig {
    /// Creates a configuration with default timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: String::new(),
            password: String::new(),
            connect_timeout: Duration::from_secs(30),
            command_timeout: COMMAND_TIMEOUT,
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }
}

/// Session protocol state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No usable connection.
    Disconnected,
    /// Logged in, no folder selected.
    Authenticated,
    /// A folder is selected.
    Selected {
        /// Decoded folder path.
        folder: String,
        /// Selected with EXAMINE.
        readonly: bool,
    },
    /// Logged out (client or server initiated); terminal.
    LoggedOut,
}

/// Active IDLE bookkeeping.
pub(crate) struct IdleHandshake {
    /// Tag the IDLE command was sent with.
    pub tag: String,
    /// When IDLE was (re-)entered, for the 29-minute refresh.
    pub entered_at: Instant,
}

/// Output of a completed command.
pub(crate) struct CommandOutput {
    pub untagged: Vec<Untagged>,
    #[allow(dead_code)]
    pub text: String,
}

/// Connection state guarded by the session mutex.
pub(crate) struct Conn<S> {
    stream: FramedStream<S>,
    tags: TagGenerator,
    config: SessionConfig,
    pub(crate) state: SessionState,
    pub(crate) idle: Option<IdleHandshake>,
    /// Last foreground command, for the IDLE activation debounce.
    pub(crate) last_activity: Instant,
    searched: Option<SearchedEmails>,
    folders: Option<Vec<Folder>>,
    events: mpsc::UnboundedSender<MailEvent>,
}

impl<S> Conn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(
        stream: FramedStream<S>,
        config: SessionConfig,
        events: mpsc::UnboundedSender<MailEvent>,
    ) -> Self {
        Self {
            stream,
            tags: TagGenerator::default(),
            config,
            state: SessionState::Disconnected,
            idle: None,
            last_activity: Instant::now(),
            searched: None,
            folders: None,
            events,
        }
    }

    pub(crate) fn emit(&self, event: MailEvent) {
        let _ = self.events.send(event);
    }

    /// Marks the connection dead after a socket failure and tells
    /// observers.
    pub(crate) fn fail_disconnected(&mut self, reason: &str) {
        self.state = SessionState::Disconnected;
        self.idle = None;
        self.emit(MailEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    // === Low-level protocol ===

    /// Reads and checks the server greeting.
    async fn greeting(&mut self) -> Result<()> {
        let raw = self.timed(self.config.connect_timeout, false).await?;
        match parse_response(&raw)? {
            Response::Untagged(Untagged::Status {
                status: crate::types::Status::Ok,
                ..
            }) => Ok(()),
            Response::Untagged(Untagged::Bye { text }) => Err(Error::LoggedOut(text)),
            other => Err(Error::Protocol(format!("Unexpected greeting: {other:?}"))),
        }
    }

    /// Reads one response with a deadline.
    async fn timed(&mut self, deadline: Duration, disconnect_on_timeout: bool) -> Result<Vec<u8>> {
        match tokio::time::timeout(deadline, self.stream.read_response()).await {
            Ok(result) => result,
            Err(_) => {
                if disconnect_on_timeout {
                    self.state = SessionState::Disconnected;
                }
                Err(Error::Timeout(deadline))
            }
        }
    }

    /// Writes a command and collects everything through its tagged
    /// completion. BYE anywhere turns into `LoggedOut`.
    async fn run_command(&mut self, cmd: &Command) -> Result<CommandOutput> {
        let tag = self.tags.next();
        self.stream.write_command(&cmd.serialize(&tag)).await?;
        self.collect_tagged(&tag, self.config.command_timeout).await
    }

    async fn collect_tagged(&mut self, tag: &str, deadline: Duration) -> Result<CommandOutput> {
        let raw = match tokio::time::timeout(deadline, self.stream.read_until_tagged(tag)).await {
            Ok(result) => result?,
            Err(_) => {
                self.state = SessionState::Disconnected;
                return Err(Error::Timeout(deadline));
            }
        };

        let mut untagged = Vec::new();
        let mut completion: Option<(crate::types::Status, String)> = None;

        for line in &raw {
            match parse_response(line) {
                Ok(Response::Tagged { tag: t, status, text }) if t.as_str() == tag => {
                    completion = Some((status, text));
                }
                Ok(Response::Untagged(Untagged::Bye { text })) => {
                    self.state = SessionState::LoggedOut;
                    self.idle = None;
                    self.emit(MailEvent::Disconnected { reason: text.clone() });
                    return Err(Error::LoggedOut(text));
                }
                Ok(Response::Untagged(data)) => untagged.push(data),
                Ok(_) => {}
                Err(e) => {
                    // One unparseable untagged line should not fail the
                    // whole command
                    debug!(error = %e, "Skipping unparseable response line");
                }
            }
        }

        let (status, text) =
            completion.ok_or_else(|| Error::Protocol("Missing tagged completion".to_string()))?;

        match status {
            crate::types::Status::Ok => Ok(CommandOutput { untagged, text }),
            crate::types::Status::No => Err(Error::No(text)),
            crate::types::Status::Bad => Err(Error::Bad(text)),
            crate::types::Status::Bye | crate::types::Status::PreAuth => {
                self.state = SessionState::LoggedOut;
                Err(Error::LoggedOut(text))
            }
        }
    }

    /// State precondition check before a command is dispatched.
    fn ensure_allowed(&self, cmd: &Command) -> Result<()> {
        use Command::{Authenticate, Capability, Login, Logout};

        if matches!(cmd, Capability | Login { .. } | Authenticate { .. } | Logout) {
            return Ok(());
        }

        match &self.state {
            SessionState::LoggedOut => {
                Err(Error::LoggedOut("Session is logged out".to_string()))
            }
            SessionState::Disconnected => {
                Err(Error::InvalidState("Not connected".to_string()))
            }
            SessionState::Authenticated => match cmd {
                Command::UidSearch { .. }
                | Command::UidFetch { .. }
                | Command::UidStore { .. }
                | Command::UidCopy { .. }
                | Command::UidMove { .. }
                | Command::Expunge
                | Command::Close
                | Command::Idle
                | Command::Done => Err(Error::InvalidState(
                    "Command requires a selected folder".to_string(),
                )),
                _ => Ok(()),
            },
            SessionState::Selected { .. } => Ok(()),
        }
    }

    /// Single dispatch path: precondition check, IDLE suspension, run.
    ///
    /// Re-entering IDLE is the monitor's job (activation debounce), so
    /// bursts of commands pay for at most one DONE.
    pub(crate) async fn dispatch(&mut self, cmd: &Command) -> Result<CommandOutput> {
        self.ensure_allowed(cmd)?;
        self.suspend_idle().await?;
        self.last_activity = Instant::now();
        self.run_command(cmd).await
    }

    // === IDLE plumbing (shared with the monitor) ===

    /// Suspends an active IDLE with DONE and waits for its tagged OK.
    pub(crate) async fn suspend_idle(&mut self) -> Result<bool> {
        let Some(idle) = self.idle.take() else {
            return Ok(false);
        };

        self.stream.write_command(&Command::Done.serialize("")).await?;

        let output = self.collect_tagged(&idle.tag, WAIT_RESPONSE_TIMEOUT).await;
        match output {
            Ok(out) => {
                // Notifications that raced the DONE still count
                self.surface_idle_data(&out.untagged);
                Ok(true)
            }
            Err(Error::No(text) | Error::Bad(text))
                if text.to_uppercase().contains("AUTH")
                    || text.to_uppercase().contains("SELECTED") =>
            {
                self.state = SessionState::LoggedOut;
                Err(Error::LoggedOut(text))
            }
            Err(e) => Err(e),
        }
    }

    fn surface_idle_data(&mut self, untagged: &[Untagged]) {
        for data in untagged {
            match data {
                Untagged::Exists(n) => self.emit(MailEvent::NewMail { exists: *n }),
                Untagged::Expunge(seq) => self.emit(MailEvent::Expunged { seq: *seq }),
                _ => {}
            }
        }
    }

    /// Sends IDLE and waits for the continuation.
    pub(crate) async fn enter_idle(&mut self) -> Result<()> {
        if self.idle.is_some() {
            return Ok(());
        }
        self.ensure_allowed(&Command::Idle)?;

        let tag = self.tags.next();
        self.stream
            .write_command(&Command::Idle.serialize(&tag))
            .await?;

        loop {
            let raw = self.timed(WAIT_RESPONSE_TIMEOUT, true).await?;
            match parse_response(&raw)? {
                Response::Continuation { .. } => {
                    self.idle = Some(IdleHandshake {
                        tag,
                        entered_at: Instant::now(),
                    });
                    return Ok(());
                }
                Response::Untagged(Untagged::Bye { text }) => {
                    self.state = SessionState::LoggedOut;
                    self.emit(MailEvent::Disconnected { reason: text.clone() });
                    return Err(Error::LoggedOut(text));
                }
                Response::Untagged(data) => {
                    // EXISTS between the command and the continuation
                    self.surface_idle_data(&[data]);
                }
                Response::Tagged { status, text, .. } => {
                    return match status {
                        crate::types::Status::No => Err(Error::No(text)),
                        crate::types::Status::Bad => Err(Error::Bad(text)),
                        _ => Err(Error::Protocol("Unexpected reply to IDLE".to_string())),
                    };
                }
            }
        }
    }

    /// DONE + IDLE, used by the monitor's refresh timer.
    pub(crate) async fn refresh_idle(&mut self) -> Result<()> {
        self.suspend_idle().await?;
        self.enter_idle().await
    }

    /// Reads one response while idling and surfaces events.
    ///
    /// Returns `false` when the connection is no longer usable.
    pub(crate) async fn pump_idle_response(&mut self) -> Result<bool> {
        let raw = self.stream.read_response().await?;
        match parse_response(&raw)? {
            Response::Untagged(Untagged::Bye { text }) => {
                self.state = SessionState::LoggedOut;
                self.idle = None;
                self.emit(MailEvent::Disconnected { reason: text });
                Ok(false)
            }
            Response::Untagged(data) => {
                self.surface_idle_data(&[data]);
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    /// IDLE runs against a readonly INBOX; select it if needed.
    pub(crate) async fn ensure_inbox_selected(&mut self) -> Result<()> {
        match &self.state {
            SessionState::Selected { folder, readonly } if folder == "INBOX" && *readonly => Ok(()),
            _ => self.select("INBOX", true).await,
        }
    }

    // === Authentication ===

    async fn login(&mut self) -> Result<()> {
        let (username, password) = (self.config.username.clone(), self.config.password.clone());

        let cmd = if username.is_ascii() && password.is_ascii() {
            Command::Login { username, password }
        } else {
            // LOGIN arguments are 7-bit; SASL PLAIN carries UTF-8
            use base64::Engine as _;
            let blob = format!("\0{username}\0{password}");
            Command::Authenticate {
                mechanism: "PLAIN".to_string(),
                initial_response: base64::engine::general_purpose::STANDARD.encode(blob),
            }
        };

        match self.run_command(&cmd).await {
            Ok(_) => {
                self.state = SessionState::Authenticated;
                Ok(())
            }
            Err(Error::No(text) | Error::Bad(text)) => Err(Error::Auth(text)),
            Err(e) => Err(e),
        }
    }

    async fn enable_utf8(&mut self) {
        let cmd = Command::Enable {
            capability: "UTF8=ACCEPT".to_string(),
        };
        if let Err(e) = self.run_command(&cmd).await {
            debug!(error = %e, "ENABLE UTF8=ACCEPT rejected, continuing without it");
        }
    }

    // === Folder operations ===

    pub(crate) async fn select(&mut self, folder: &str, readonly: bool) -> Result<()> {
        let resolved = self.resolve_folder(folder).await?;

        if let SessionState::Selected {
            folder: current,
            readonly: current_ro,
        } = &self.state
            && *current == resolved
            && *current_ro == readonly
        {
            return Ok(());
        }

        let cmd = Command::Select {
            folder: resolved.clone(),
            readonly,
        };
        self.dispatch(&cmd).await?;

        // A different folder invalidates the search cache
        if self
            .searched
            .as_ref()
            .is_some_and(|s| s.folder != resolved)
        {
            self.searched = None;
        }
        self.state = SessionState::Selected {
            folder: resolved,
            readonly,
        };
        Ok(())
    }

    /// Maps a standard folder name (`Trash`, `Sent`, …) to the server's
    /// localized path via LIST attributes; other names pass through.
    async fn resolve_folder(&mut self, name: &str) -> Result<String> {
        if name.eq_ignore_ascii_case("INBOX") {
            return Ok("INBOX".to_string());
        }

        let role = match name.to_lowercase().as_str() {
            "all" => Some(SpecialUse::All),
            "archive" => Some(SpecialUse::Archive),
            "drafts" => Some(SpecialUse::Drafts),
            "flagged" => Some(SpecialUse::Flagged),
            "junk" | "spam" => Some(SpecialUse::Junk),
            "sent" => Some(SpecialUse::Sent),
            "trash" => Some(SpecialUse::Trash),
            "important" => Some(SpecialUse::Important),
            _ => None,
        };

        match role {
            None => Ok(name.to_string()),
            Some(role) => self
                .find_special_folder(role)
                .await?
                .ok_or_else(|| Error::NotFound(format!("No folder tagged for {name}"))),
        }
    }

    /// Returns the server path of the folder carrying a special-use
    /// attribute. Inbox is always the literal `INBOX`.
    pub(crate) async fn find_special_folder(
        &mut self,
        role: SpecialUse,
    ) -> Result<Option<String>> {
        if role == SpecialUse::Inbox {
            return Ok(Some("INBOX".to_string()));
        }

        let folders = self.list_folders(false).await?;
        Ok(folders
            .iter()
            .find(|f| f.role() == Some(role))
            .map(|f| f.path.clone()))
    }

    /// LIST, cached until folder mutation.
    async fn list_folders(&mut self, refresh: bool) -> Result<Vec<Folder>> {
        if !refresh && let Some(folders) = &self.folders {
            return Ok(folders.clone());
        }

        let cmd = Command::List {
            reference: String::new(),
            pattern: "*".to_string(),
        };
        let out = self.dispatch(&cmd).await?;

        let folders: Vec<Folder> = out
            .untagged
            .into_iter()
            .filter_map(|data| match data {
                Untagged::List(folder) => Some(folder),
                _ => None,
            })
            .collect();

        self.folders = Some(folders.clone());
        Ok(folders)
    }

    pub(crate) async fn get_folders(&mut self, tagged: bool) -> Result<Vec<String>> {
        let folders = self.list_folders(true).await?;
        Ok(folders
            .iter()
            .filter(|f| f.is_selectable())
            .map(|f| f.tagged_name(tagged))
            .collect())
    }

    pub(crate) async fn create_folder(
        &mut self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<()> {
        validate_folder_name(name)?;

        let full = match parent {
            None => name.to_string(),
            Some(parent) => {
                validate_folder_name(parent)?;
                let folders = self.list_folders(false).await?;
                if !folders.iter().any(|f| f.path == parent) {
                    self.dispatch(&Command::Create {
                        folder: parent.to_string(),
                    })
                    .await?;
                }
                format!("{parent}/{name}")
            }
        };

        self.dispatch(&Command::Create { folder: full }).await?;
        self.folders = None;
        Ok(())
    }

    pub(crate) async fn delete_folder(&mut self, name: &str, recursive: bool) -> Result<()> {
        validate_folder_name(name)?;

        if recursive {
            let prefix = format!("{name}/");
            let mut children: Vec<String> = self
                .list_folders(true)
                .await?
                .iter()
                .filter(|f| f.path.starts_with(&prefix))
                .map(|f| f.path.clone())
                .collect();
            // Deepest first so parents are deleted empty
            children.sort_by_key(|path| std::cmp::Reverse(path.matches('/').count()));
            for child in children {
                self.dispatch(&Command::Delete { folder: child }).await?;
            }
        }

        self.dispatch(&Command::Delete {
            folder: name.to_string(),
        })
        .await?;
        self.folders = None;
        Ok(())
    }

    pub(crate) async fn move_folder(&mut self, name: &str, destination: &str) -> Result<()> {
        validate_folder_name(name)?;
        validate_folder_name(destination)?;

        let folders = self.list_folders(false).await?;
        let destination_exists = folders.iter().any(|f| f.path == destination);

        // Destination present: only the leaf moves under it. Otherwise
        // the full source path is recreated beneath the destination.
        let leaf = name.rsplit('/').next().unwrap_or(name);
        let target = if destination_exists {
            format!("{destination}/{leaf}")
        } else {
            format!("{destination}/{name}")
        };

        self.dispatch(&Command::Rename {
            from: name.to_string(),
            to: target,
        })
        .await?;
        self.folders = None;
        Ok(())
    }

    pub(crate) async fn rename_folder(&mut self, name: &str, new_name: &str) -> Result<()> {
        validate_folder_name(name)?;
        validate_folder_name(new_name)?;

        // Only the leaf is renamed; the parent path stays
        let target = match name.rsplit_once('/') {
            Some((parent, _leaf)) => format!("{parent}/{new_name}"),
            None => new_name.to_string(),
        };

        self.dispatch(&Command::Rename {
            from: name.to_string(),
            to: target,
        })
        .await?;
        self.folders = None;
        Ok(())
    }

    // === Search and fetch ===

    pub(crate) async fn search_emails(
        &mut self,
        folder: Option<&str>,
        query: &SearchQuery,
    ) -> Result<usize> {
        let folder = folder.unwrap_or("INBOX");
        self.select(folder, true).await?;

        let built = query.build()?;
        let out = self
            .dispatch(&Command::UidSearch {
                query: built.clone(),
            })
            .await?;

        let mut uids: Vec<u32> = out
            .untagged
            .into_iter()
            .filter_map(|data| match data {
                Untagged::Search(uids) => Some(uids),
                _ => None,
            })
            .flatten()
            .collect();
        uids.sort_unstable_by(|a, b| b.cmp(a));

        let selected_folder = match &self.state {
            SessionState::Selected { folder, .. } => folder.clone(),
            _ => folder.to_string(),
        };

        let total = uids.len();
        self.searched = Some(SearchedEmails {
            folder: selected_folder,
            query: built,
            uids,
        });
        Ok(total)
    }

    pub(crate) fn searched(&self) -> Option<&SearchedEmails> {
        self.searched.as_ref()
    }

    /// Pages the cached search result and fetches summaries.
    pub(crate) async fn get_emails(&mut self, offset: usize, end: usize) -> Result<MailboxPage> {
        let searched = self
            .searched
            .clone()
            .ok_or_else(|| Error::InvalidState("No search result; run a search first".to_string()))?;

        let total = searched.uids.len();
        let page: Vec<u32> = searched
            .uids
            .get(offset..end.min(total))
            .unwrap_or_default()
            .to_vec();

        if page.is_empty() {
            return Ok(MailboxPage {
                folder: searched.folder,
                emails: Vec::new(),
                total,
            });
        }

        let cmd = Command::UidFetch {
            set: SequenceSet::from_uids(&page),
            items: vec![
                FetchItem::Uid,
                FetchItem::HeaderFields(HEADER_FIELDS.iter().map(ToString::to_string).collect()),
                FetchItem::Flags,
                FetchItem::BodyStructure,
            ],
        };
        let out = self.dispatch(&cmd).await?;
        let groups = collect_groups(out);

        let mut emails = Vec::with_capacity(page.len());
        for uid in &page {
            let Some(group) = groups.iter().find(|g| g.uid == *uid) else {
                continue;
            };
            let headers = message::get_headers(&group.items);
            let body_short = match message::get_bodystructure(&group.items) {
                Some(bs) => self.fetch_preview(*uid, bs).await.unwrap_or_default(),
                None => String::new(),
            };
            let attachments = message::get_bodystructure(&group.items)
                .map(message::attachment_list)
                .unwrap_or_default();

            emails.push(EmailSummary {
                uid: *uid,
                sender: headers.sender,
                receiver: headers.receiver,
                date: headers.date,
                subject: headers.subject,
                body_short,
                flags: message::get_flags(&group.items),
                attachments,
            });
        }

        Ok(MailboxPage {
            folder: searched.folder,
            emails,
            total,
        })
    }

    /// Fetches and decodes a short preview for one message.
    async fn fetch_preview(&mut self, uid: u32, bs: &BodyStructure) -> Result<String> {
        let part = preview_body_part(bs);
        let (mime_type, encoding) = message::content_type_and_encoding(bs, &part)
            .unwrap_or_else(|| ("text/plain".to_string(), "7bit".to_string()));

        let cmd = Command::UidFetch {
            set: SequenceSet::single(uid),
            items: vec![FetchItem::BodySection {
                section: Some(part.clone()),
                peek: true,
                partial: Some((0, PREVIEW_FETCH_BYTES)),
            }],
        };
        let out = self.dispatch(&cmd).await?;
        let groups = collect_groups(out);

        let Some(data) = groups
            .iter()
            .find(|g| g.uid == uid)
            .and_then(|g| message::get_body_section(&g.items, &part))
        else {
            return Ok(String::new());
        };

        let sanitize = mime_type == "text/html";
        let decoded = message::decode_body(data, &encoding, sanitize);
        Ok(message::preview_text(decoded.trim(), PREVIEW_LIMIT))
    }

    pub(crate) async fn get_email_content(
        &mut self,
        folder: &str,
        uid: u32,
    ) -> Result<EmailWithContent> {
        self.select(folder, true).await?;

        let cmd = Command::UidFetch {
            set: SequenceSet::single(uid),
            items: vec![
                FetchItem::Uid,
                FetchItem::HeaderFields(HEADER_FIELDS.iter().map(ToString::to_string).collect()),
                FetchItem::Flags,
                FetchItem::BodyStructure,
            ],
        };
        let out = self.dispatch(&cmd).await?;
        let groups = collect_groups(out);
        let group = groups
            .into_iter()
            .find(|g| g.uid == uid)
            .ok_or_else(|| Error::NotFound(format!("No message with UID {uid}")))?;

        let headers = message::get_headers(&group.items);
        let flags = message::get_flags(&group.items);
        let bs = message::get_bodystructure(&group.items)
            .ok_or_else(|| Error::Protocol("FETCH returned no BODYSTRUCTURE".to_string()))?
            .clone();

        // Body: html, else plain, else part 1
        let part = content_body_part(&bs);
        let (mime_type, encoding) = message::content_type_and_encoding(&bs, &part)
            .unwrap_or_else(|| ("text/plain".to_string(), "7bit".to_string()));
        let raw_body = self.fetch_section(uid, &part).await?.unwrap_or_default();
        let mut body = message::decode_body(&raw_body, &encoding, false);

        // Inline parts become data: URIs in the body
        let inline = message::inline_attachment_list(&bs);
        if !inline.is_empty() && mime_type == "text/html" {
            let mut resolved = Vec::with_capacity(inline.len());
            for (part_number, info) in &inline {
                let Some(cid) = info.cid.clone() else {
                    continue;
                };
                let Some(payload) = self.fetch_section(uid, part_number).await? else {
                    continue;
                };
                let encoding = message::content_type_and_encoding(&bs, part_number)
                    .map(|(_, e)| e)
                    .unwrap_or_default();
                resolved.push((cid, info.mime_type.clone(), as_base64(&payload, &encoding)));
            }
            body = message::resolve_cid_references(&body, &resolved);
        }

        // Mark seen; losing the race to another client is fine
        if !flags.iter().any(|f| f == "\\Seen") {
            let seen = Command::UidStore {
                set: SequenceSet::single(uid),
                add: true,
                flags: vec![Flag::Seen],
            };
            if let Err(e) = self.reselect_readwrite().await {
                warn!(error = %e, uid, "Could not reselect for \\Seen");
            } else if let Err(e) = self.dispatch(&seen).await {
                warn!(error = %e, uid, "Could not mark \\Seen");
            }
        }

        Ok(EmailWithContent {
            uid,
            sender: headers.sender,
            receiver: headers.receiver,
            date: headers.date,
            subject: headers.subject,
            body,
            flags,
            attachments: message::attachment_list(&bs),
            message_id: headers.message_id,
            in_reply_to: headers.in_reply_to,
            references: headers.references,
        })
    }

    /// Re-selects the current folder read-write (for the `\Seen` store
    /// after a readonly content fetch).
    async fn reselect_readwrite(&mut self) -> Result<()> {
        let SessionState::Selected { folder, readonly } = self.state.clone() else {
            return Err(Error::InvalidState("No folder selected".to_string()));
        };
        if readonly {
            self.select(&folder, false).await?;
        }
        Ok(())
    }

    /// Fetches one body section with PEEK.
    async fn fetch_section(&mut self, uid: u32, part: &str) -> Result<Option<Vec<u8>>> {
        let cmd = Command::UidFetch {
            set: SequenceSet::single(uid),
            items: vec![FetchItem::BodySection {
                section: Some(part.to_string()),
                peek: true,
                partial: None,
            }],
        };
        let out = self.dispatch(&cmd).await?;
        let groups = collect_groups(out);
        Ok(groups
            .iter()
            .find(|g| g.uid == uid)
            .and_then(|g| message::get_body_section(&g.items, part))
            .map(<[u8]>::to_vec))
    }

    pub(crate) async fn get_email_flags(&mut self, set_str: &str) -> Result<Vec<EmailFlags>> {
        let set = SequenceSet::parse(set_str)?;
        let expansion = set.expand(self.searched.as_ref().and_then(SearchedEmails::max_uid))?;

        let cmd = Command::UidFetch {
            set,
            items: vec![FetchItem::Uid, FetchItem::Flags],
        };
        let out = self.dispatch(&cmd).await?;
        let groups = collect_groups(out);

        Ok(expansion
            .iter()
            .filter_map(|uid| {
                groups.iter().find(|g| g.uid == *uid).map(|g| EmailFlags {
                    uid: *uid,
                    flags: message::get_flags(&g.items),
                })
            })
            .collect())
    }

    pub(crate) async fn get_email_size(&mut self, folder: &str, uid: u32) -> Result<u32> {
        self.select(folder, true).await?;

        let cmd = Command::UidFetch {
            set: SequenceSet::single(uid),
            items: vec![FetchItem::Uid, FetchItem::Rfc822Size],
        };
        let out = self.dispatch(&cmd).await?;
        let groups = collect_groups(out);
        groups
            .iter()
            .find(|g| g.uid == uid)
            .and_then(|g| message::get_size(&g.items))
            .ok_or_else(|| Error::NotFound(format!("No message with UID {uid}")))
    }

    pub(crate) async fn is_email_exists(&mut self, folder: &str, set_str: &str) -> Result<bool> {
        let set = SequenceSet::parse(set_str)?;
        if set.contains_wildcard() {
            return Err(Error::Validation(
                "Wildcard sets are not allowed for existence checks".to_string(),
            ));
        }
        let expansion = set.expand(None)?;

        self.select(folder, true).await?;
        let out = self
            .dispatch(&Command::UidSearch {
                query: format!("UID {set}"),
            })
            .await?;

        let found: Vec<u32> = out
            .untagged
            .into_iter()
            .filter_map(|data| match data {
                Untagged::Search(uids) => Some(uids),
                _ => None,
            })
            .flatten()
            .collect();

        Ok(expansion.iter().all(|uid| found.contains(uid)))
    }

    pub(crate) async fn download_attachment(
        &mut self,
        folder: &str,
        uid: u32,
        name: &str,
        cid: Option<&str>,
    ) -> Result<AttachmentInfo> {
        self.select(folder, true).await?;

        let cmd = Command::UidFetch {
            set: SequenceSet::single(uid),
            items: vec![FetchItem::Uid, FetchItem::BodyStructure],
        };
        let out = self.dispatch(&cmd).await?;
        let groups = collect_groups(out);
        let group = groups
            .into_iter()
            .find(|g| g.uid == uid)
            .ok_or_else(|| Error::NotFound(format!("No message with UID {uid}")))?;
        let bs = message::get_bodystructure(&group.items)
            .ok_or_else(|| Error::Protocol("FETCH returned no BODYSTRUCTURE".to_string()))?
            .clone();

        let part = cid
            .and_then(|cid| message::find_part(&bs, &PartSelector::Cid(cid.to_string())))
            .or_else(|| message::find_part(&bs, &PartSelector::Filename(name.to_string())))
            .ok_or_else(|| Error::NotFound(format!("No attachment named {name:?}")))?;

        let mut info = message::attachment_list(&bs)
            .into_iter()
            .chain(message::inline_attachment_list(&bs).into_iter().map(|(_, i)| i))
            .find(|info| info.name.eq_ignore_ascii_case(name))
            .unwrap_or_else(|| AttachmentInfo {
                name: name.to_string(),
                ..AttachmentInfo::default()
            });

        let payload = self
            .fetch_section(uid, &part)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Attachment body missing for {name:?}")))?;
        let encoding = message::content_type_and_encoding(&bs, &part)
            .map(|(_, e)| e)
            .unwrap_or_default();
        info.data = Some(as_base64(&payload, &encoding));
        Ok(info)
    }

    // === Flag and message mutation ===

    /// Expands and checks a set against the cached search result when
    /// one exists for the target folder.
    fn validate_mutation_set(&self, folder: &str, set: &SequenceSet) -> Result<()> {
        let Some(searched) = &self.searched else {
            return Ok(());
        };
        if searched.folder != folder {
            return Ok(());
        }

        let expansion = set.expand(searched.max_uid())?;
        for uid in &expansion {
            if !searched.uids.contains(uid) {
                return Err(Error::Validation(format!(
                    "UID {uid} is not in the last search result"
                )));
            }
        }
        Ok(())
    }

    pub(crate) async fn mark_email(
        &mut self,
        mark: &str,
        set_str: &str,
        folder: &str,
        force_remove: bool,
    ) -> Result<()> {
        let mut mark = Mark::parse(mark)?;
        if force_remove {
            mark.remove = true;
        }
        let set = SequenceSet::parse(set_str)?;

        let resolved = self.resolve_folder(folder).await?;
        self.validate_mutation_set(&resolved, &set)?;
        self.select(&resolved, false).await?;

        self.dispatch(&Command::UidStore {
            set,
            add: !mark.remove,
            flags: vec![mark.flag],
        })
        .await?;
        self.dispatch(&Command::Expunge).await?;
        Ok(())
    }

    pub(crate) async fn move_email(
        &mut self,
        source: &str,
        destination: &str,
        set_str: &str,
    ) -> Result<()> {
        let set = SequenceSet::parse(set_str)?;
        let source = self.resolve_folder(source).await?;
        let destination = self.resolve_folder(destination).await?;
        self.validate_mutation_set(&source, &set)?;
        self.select(&source, false).await?;

        let mv = Command::UidMove {
            set: set.clone(),
            folder: destination.clone(),
        };
        match self.dispatch(&mv).await {
            Ok(_) => {}
            Err(Error::No(_) | Error::Bad(_)) => {
                // Server without MOVE: COPY, flag deleted, expunge
                debug!(%destination, "UID MOVE unavailable, falling back to COPY");
                self.dispatch(&Command::UidCopy {
                    set: set.clone(),
                    folder: destination,
                })
                .await?;
                self.dispatch(&Command::UidStore {
                    set,
                    add: true,
                    flags: vec![Flag::Deleted],
                })
                .await?;
            }
            Err(e) => return Err(e),
        }

        self.dispatch(&Command::Expunge).await?;
        Ok(())
    }

    pub(crate) async fn copy_email(
        &mut self,
        source: &str,
        destination: &str,
        set_str: &str,
    ) -> Result<()> {
        let set = SequenceSet::parse(set_str)?;
        let source = self.resolve_folder(source).await?;
        let destination = self.resolve_folder(destination).await?;
        self.validate_mutation_set(&source, &set)?;
        self.select(&source, false).await?;

        self.dispatch(&Command::UidCopy {
            set,
            folder: destination,
        })
        .await?;
        Ok(())
    }

    pub(crate) async fn delete_email(&mut self, folder: &str, set_str: &str) -> Result<()> {
        let trash = self
            .find_special_folder(SpecialUse::Trash)
            .await?
            .ok_or_else(|| Error::NotFound("No folder tagged \\Trash".to_string()))?;

        let folder = self.resolve_folder(folder).await?;
        if folder != trash {
            self.move_email(&folder, &trash, set_str).await?;
        }

        let set = SequenceSet::parse(set_str)?;
        self.select(&trash, false).await?;
        self.dispatch(&Command::UidStore {
            set,
            add: true,
            flags: vec![Flag::Deleted],
        })
        .await?;
        self.dispatch(&Command::Expunge).await?;
        Ok(())
    }

    // === Shutdown ===

    pub(crate) async fn logout(&mut self) -> Result<()> {
        if matches!(
            self.state,
            SessionState::LoggedOut | SessionState::Disconnected
        ) {
            return Ok(());
        }

        if let Err(e) = self.suspend_idle().await {
            debug!(error = %e, "Ignoring DONE failure during logout");
        }

        if matches!(self.state, SessionState::Selected { .. })
            && let Err(e) = self.run_command(&Command::Close).await
        {
            debug!(error = %e, "Ignoring CLOSE failure during logout");
        }

        match self.run_command(&Command::Logout).await {
            // The expected path: LOGOUT answers BYE then OK
            Ok(_) | Err(Error::LoggedOut(_)) => {}
            Err(e) => debug!(error = %e, "Ignoring LOGOUT failure"),
        }

        self.state = SessionState::LoggedOut;
        self.searched = None;
        Ok(())
    }
}

/// Turns fetch responses in command output into per-UID groups.
fn collect_groups(out: CommandOutput) -> Vec<MessageGroup> {
    let fetches: Vec<Vec<crate::parser::FetchData>> = out
        .untagged
        .into_iter()
        .filter_map(|data| match data {
            Untagged::Fetch { items, .. } => Some(items),
            _ => None,
        })
        .collect();
    message::group_messages(fetches)
}

/// Re-encodes a fetched section as base64 for data URIs and downloads.
fn as_base64(payload: &[u8], encoding: &str) -> String {
    use base64::Engine as _;
    if encoding.eq_ignore_ascii_case("base64") {
        // Already base64 on the wire; strip the line wrapping
        String::from_utf8_lossy(payload)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    } else {
        let decoded = message::decode_body(payload, encoding, false);
        base64::engine::general_purpose::STANDARD.encode(decoded.as_bytes())
    }
}

/// A per-account IMAP session over one connection.
///
/// Cheap to clone internally via `Arc`; the connection mutex serialises
/// all use. See the module docs for the locking discipline.
pub struct Session<S = ImapStream> {
    pub(crate) conn: Arc<Mutex<Conn<S>>>,
    /// Kicks the IDLE monitor off the socket before a foreground
    /// command takes the lock.
    pub(crate) interrupt: Arc<Notify>,
    events_rx: Option<mpsc::UnboundedReceiver<MailEvent>>,
    monitor: Option<super::idle::IdleMonitor>,
}

impl Session<ImapStream> {
    /// Connects over TLS, authenticates, and enables UTF-8.
    ///
    /// # Errors
    ///
    /// Returns `Auth` for rejected credentials, transport errors
    /// otherwise.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let stream = tokio::time::timeout(
            config.connect_timeout,
            connect_tls(&config.host, config.port),
        )
        .await
        .map_err(|_| Error::Timeout(config.connect_timeout))??;

        Self::from_stream(stream, config).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Builds a session over an established stream (used directly by
    /// tests; `connect` is the production path).
    ///
    /// # Errors
    ///
    /// Returns an error when the greeting or login fails.
    pub async fn from_stream(stream: S, config: SessionConfig) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut conn = Conn::new(FramedStream::new(stream), config, events_tx);

        conn.greeting().await?;
        conn.login().await?;
        conn.enable_utf8().await;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt: Arc::new(Notify::new()),
            events_rx: Some(events_rx),
            monitor: None,
        })
    }

    /// Takes the observer event stream. Yields at most once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<MailEvent>> {
        self.events_rx.take()
    }

    async fn lock(&self) -> tokio::sync::MutexGuard<'_, Conn<S>> {
        self.interrupt.notify_one();
        self.conn.lock().await
    }

    /// Current session state.
    pub async fn state(&self) -> SessionState {
        self.lock().await.state.clone()
    }

    /// True while an IDLE is in flight on the wire.
    pub async fn is_idle(&self) -> bool {
        self.lock().await.idle.is_some()
    }

    /// Lists folders; `tagged` renders special-use folders as
    /// `"<StandardName>:<ServerPath>"`.
    ///
    /// # Errors
    ///
    /// Propagates protocol and transport failures.
    pub async fn get_folders(&self, tagged: bool) -> Result<Vec<String>> {
        self.lock().await.get_folders(tagged).await
    }

    /// Selects a folder.
    ///
    /// # Errors
    ///
    /// Propagates protocol and transport failures.
    pub async fn select(&self, folder: &str, readonly: bool) -> Result<()> {
        self.lock().await.select(folder, readonly).await
    }

    /// Runs a UID search and caches the result. Returns the match count.
    ///
    /// # Errors
    ///
    /// Propagates query validation and protocol failures.
    pub async fn search_emails(
        &self,
        folder: Option<&str>,
        query: impl Into<SearchQuery> + Send,
    ) -> Result<usize> {
        let query = query.into();
        self.lock().await.search_emails(folder, &query).await
    }

    /// Pages the cached search result: `[offset, end)`.
    ///
    /// # Errors
    ///
    /// Fails when no search result is cached.
    pub async fn get_emails(&self, offset: usize, end: usize) -> Result<MailboxPage> {
        self.lock().await.get_emails(offset, end).await
    }

    /// Fetches a message's full content; marks it `\Seen` best-effort.
    ///
    /// # Errors
    ///
    /// `NotFound` when the UID does not exist in the folder.
    pub async fn get_email_content(&self, folder: &str, uid: u32) -> Result<EmailWithContent> {
        self.lock().await.get_email_content(folder, uid).await
    }

    /// Returns flags for each UID in the set, in set order.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed sets.
    pub async fn get_email_flags(&self, set: &str) -> Result<Vec<EmailFlags>> {
        self.lock().await.get_email_flags(set).await
    }

    /// Returns RFC822.SIZE for a message.
    ///
    /// # Errors
    ///
    /// `NotFound` when the UID does not exist.
    pub async fn get_email_size(&self, folder: &str, uid: u32) -> Result<u32> {
        self.lock().await.get_email_size(folder, uid).await
    }

    /// Checks that every UID in the set exists in the folder. Wildcards
    /// are rejected.
    ///
    /// # Errors
    ///
    /// `Validation` for wildcard or malformed sets.
    pub async fn is_email_exists(&self, folder: &str, set: &str) -> Result<bool> {
        self.lock().await.is_email_exists(folder, set).await
    }

    /// Downloads one attachment by filename (and optionally CID).
    ///
    /// # Errors
    ///
    /// `NotFound` when no part matches.
    pub async fn download_attachment(
        &self,
        folder: &str,
        uid: u32,
        name: &str,
        cid: Option<&str>,
    ) -> Result<AttachmentInfo> {
        self.lock()
            .await
            .download_attachment(folder, uid, name, cid)
            .await
    }

    /// Adds a flag (`STORE +FLAGS` then EXPUNGE). `mark` accepts
    /// `"seen"`, `"\Seen"`, or `"unseen"` forms.
    ///
    /// # Errors
    ///
    /// `Validation` for unsupported marks or out-of-search sets.
    pub async fn mark_email(&self, mark: &str, set: &str, folder: &str) -> Result<()> {
        self.lock().await.mark_email(mark, set, folder, false).await
    }

    /// Removes a flag (`STORE -FLAGS` then EXPUNGE).
    ///
    /// # Errors
    ///
    /// `Validation` for unsupported marks or out-of-search sets.
    pub async fn unmark_email(&self, mark: &str, set: &str, folder: &str) -> Result<()> {
        self.lock().await.mark_email(mark, set, folder, true).await
    }

    /// Moves messages; falls back to COPY + `\Deleted` + EXPUNGE when
    /// the server lacks MOVE.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed or out-of-search sets.
    pub async fn move_email(&self, source: &str, destination: &str, set: &str) -> Result<()> {
        self.lock().await.move_email(source, destination, set).await
    }

    /// Copies messages to another folder.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed or out-of-search sets.
    pub async fn copy_email(&self, source: &str, destination: &str, set: &str) -> Result<()> {
        self.lock().await.copy_email(source, destination, set).await
    }

    /// Deletes messages: moved to the discovered Trash first unless
    /// already there, then flagged `\Deleted` and expunged.
    ///
    /// # Errors
    ///
    /// `NotFound` when the server has no `\Trash` folder.
    pub async fn delete_email(&self, folder: &str, set: &str) -> Result<()> {
        self.lock().await.delete_email(folder, set).await
    }

    /// Creates a folder, creating the parent first when missing.
    ///
    /// # Errors
    ///
    /// `Validation` for bad names.
    pub async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<()> {
        self.lock().await.create_folder(name, parent).await
    }

    /// Deletes a folder, optionally with all children.
    ///
    /// # Errors
    ///
    /// `Validation` for bad names.
    pub async fn delete_folder(&self, name: &str, recursive: bool) -> Result<()> {
        self.lock().await.delete_folder(name, recursive).await
    }

    /// Moves a folder under a destination.
    ///
    /// # Errors
    ///
    /// `Validation` for bad names.
    pub async fn move_folder(&self, name: &str, destination: &str) -> Result<()> {
        self.lock().await.move_folder(name, destination).await
    }

    /// Renames a folder's leaf, preserving its parent path.
    ///
    /// # Errors
    ///
    /// `Validation` for bad names.
    pub async fn rename_folder(&self, name: &str, new_name: &str) -> Result<()> {
        self.lock().await.rename_folder(name, new_name).await
    }

    /// Re-searches the inbox and returns the newest page.
    ///
    /// # Errors
    ///
    /// Propagates search and fetch failures.
    pub async fn get_recent_emails(&self) -> Result<MailboxPage> {
        let mut conn = self.lock().await;
        conn.search_emails(Some("INBOX"), &SearchQuery::All).await?;
        conn.get_emails(0, 10).await
    }

    /// Starts the background IDLE monitor on the inbox.
    ///
    /// # Errors
    ///
    /// Fails when the session is not usable.
    pub async fn idle(&mut self) -> Result<()> {
        if self.monitor.is_some() {
            return Ok(());
        }
        {
            let conn = self.conn.lock().await;
            if matches!(
                conn.state,
                SessionState::LoggedOut | SessionState::Disconnected
            ) {
                return Err(Error::LoggedOut("Session is not usable".to_string()));
            }
        }
        self.monitor = Some(super::idle::IdleMonitor::spawn(
            Arc::clone(&self.conn),
            Arc::clone(&self.interrupt),
        ));
        Ok(())
    }

    /// Stops the IDLE monitor and leaves IDLE on the wire.
    ///
    /// # Errors
    ///
    /// Propagates a DONE handshake failure.
    pub async fn done(&mut self) -> Result<()> {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop().await;
        }
        let mut conn = self.conn.lock().await;
        conn.suspend_idle().await.map(|_| ())
    }

    /// Terminates the session: monitor first, then CLOSE/LOGOUT.
    /// Tolerates an already-dead connection.
    ///
    /// # Errors
    ///
    /// Only transport errors unrelated to an already-closed connection.
    pub async fn logout(&mut self) -> Result<()> {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop().await;
        }
        self.lock().await.logout().await
    }
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("monitor", &self.monitor.is_some())
            .finish_non_exhaustive()
    }
}

//! The per-account facade.
//!
//! One `OpenMail` owns one IMAP session and one SMTP session and
//! exposes the verbs a UI actually calls. Cross-session behaviour
//! (replying marks the original `\Answered`) lives here.

use openmail_imap::{
    AttachmentInfo, EmailFlags, EmailWithContent, MailEvent, MailboxPage, SearchQuery, Session,
    SessionConfig,
};
use openmail_smtp::{EmailToSend, SmtpConfig, SmtpSession};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::account::Account;
use crate::error::{Error, Result};

/// Per-account mail client facade.
pub struct OpenMail {
    account: Account,
    imap: Option<Session>,
    smtp: Option<SmtpSession>,
    events: Option<UnboundedReceiver<MailEvent>>,
}

impl OpenMail {
    /// Creates a facade for an account; call [`OpenMail::connect`]
    /// before anything else.
    #[must_use]
    pub const fn new(account: Account) -> Self {
        Self {
            account,
            imap: None,
            smtp: None,
            events: None,
        }
    }

    /// Opens both sessions.
    ///
    /// # Errors
    ///
    /// Returns the first connect or authentication failure.
    pub async fn connect(&mut self) -> Result<()> {
        let imap_config = SessionConfig::new(&self.account.imap_host, self.account.imap_port)
            .credentials(&self.account.address, &self.account.password);
        let mut imap = Session::connect(imap_config).await?;
        self.events = imap.take_events();

        let smtp_config = SmtpConfig::new(&self.account.smtp_host)
            .credentials(&self.account.address, &self.account.password);
        let smtp = SmtpSession::connect(smtp_config).await?;

        self.imap = Some(imap);
        self.smtp = Some(smtp);
        info!(address = %self.account.address, "Connected");
        Ok(())
    }

    /// Closes both sessions; a failure on one side does not keep the
    /// other open.
    pub async fn disconnect(&mut self) {
        self.events = None;

        if let Some(mut imap) = self.imap.take()
            && let Err(e) = imap.logout().await
        {
            warn!(error = %e, "IMAP logout failed");
        }
        if let Some(smtp) = self.smtp.take()
            && let Err(e) = smtp.logout().await
        {
            warn!(error = %e, "SMTP logout failed");
        }
    }

    /// True when `connect` has succeeded and `disconnect` has not run.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.imap.is_some() && self.smtp.is_some()
    }

    fn imap(&self) -> Result<&Session> {
        self.imap
            .as_ref()
            .ok_or_else(|| Error::Account("Not connected".to_string()))
    }

    fn imap_mut(&mut self) -> Result<&mut Session> {
        self.imap
            .as_mut()
            .ok_or_else(|| Error::Account("Not connected".to_string()))
    }

    fn smtp_mut(&mut self) -> Result<&mut SmtpSession> {
        self.smtp
            .as_mut()
            .ok_or_else(|| Error::Account("Not connected".to_string()))
    }

    // === Sending ===

    /// Sends an email.
    ///
    /// # Errors
    ///
    /// Propagates validation and server failures.
    pub async fn send_email(&mut self, email: &EmailToSend) -> Result<()> {
        self.smtp_mut()?.send_email(email).await?;
        Ok(())
    }

    /// Replies to an email and marks the original `\Answered`.
    ///
    /// # Errors
    ///
    /// Fails when the reply cannot be sent; the flag store afterwards
    /// is best-effort.
    pub async fn reply_email(&mut self, email: &EmailToSend) -> Result<()> {
        self.smtp_mut()?.reply_email(email).await?;

        if let Some(uid) = email.uid {
            let imap = self.imap()?;
            if let Err(e) = imap
                .mark_email("answered", &uid.to_string(), "INBOX")
                .await
            {
                warn!(error = %e, uid, "Reply sent but \\Answered not stored");
            }
        }
        Ok(())
    }

    /// Forwards an email.
    ///
    /// # Errors
    ///
    /// Propagates validation and server failures.
    pub async fn forward_email(&mut self, email: &EmailToSend) -> Result<()> {
        self.smtp_mut()?.forward_email(email).await?;
        Ok(())
    }

    // === Reading ===

    /// Lists folders; `tagged` renders special-use roles.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn get_folders(&self, tagged: bool) -> Result<Vec<String>> {
        Ok(self.imap()?.get_folders(tagged).await?)
    }

    /// Searches a folder; returns the match count.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn search_emails(
        &self,
        folder: Option<&str>,
        query: impl Into<SearchQuery> + Send,
    ) -> Result<usize> {
        Ok(self.imap()?.search_emails(folder, query).await?)
    }

    /// Pages the last search result.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn get_emails(&self, offset: usize, end: usize) -> Result<MailboxPage> {
        Ok(self.imap()?.get_emails(offset, end).await?)
    }

    /// Fetches full content for one message.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn get_email_content(&self, folder: &str, uid: u32) -> Result<EmailWithContent> {
        Ok(self.imap()?.get_email_content(folder, uid).await?)
    }

    /// Returns flags per UID in the set.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn get_email_flags(&self, set: &str) -> Result<Vec<EmailFlags>> {
        Ok(self.imap()?.get_email_flags(set).await?)
    }

    /// Returns a message's size in octets.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn get_email_size(&self, folder: &str, uid: u32) -> Result<u32> {
        Ok(self.imap()?.get_email_size(folder, uid).await?)
    }

    /// Checks whether every UID in the set exists in the folder.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn is_email_exists(&self, folder: &str, set: &str) -> Result<bool> {
        Ok(self.imap()?.is_email_exists(folder, set).await?)
    }

    /// Downloads one attachment.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn download_attachment(
        &self,
        folder: &str,
        uid: u32,
        name: &str,
        cid: Option<&str>,
    ) -> Result<AttachmentInfo> {
        Ok(self
            .imap()?
            .download_attachment(folder, uid, name, cid)
            .await?)
    }

    /// Re-searches the inbox and returns the newest page; the thing to
    /// call after a new-mail event.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn get_recent_emails(&self) -> Result<MailboxPage> {
        Ok(self.imap()?.get_recent_emails().await?)
    }

    // === Mutation ===

    /// Adds a flag to messages.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn mark_email(&self, mark: &str, set: &str, folder: &str) -> Result<()> {
        Ok(self.imap()?.mark_email(mark, set, folder).await?)
    }

    /// Removes a flag from messages.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn unmark_email(&self, mark: &str, set: &str, folder: &str) -> Result<()> {
        Ok(self.imap()?.unmark_email(mark, set, folder).await?)
    }

    /// Moves messages between folders.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn move_email(&self, source: &str, destination: &str, set: &str) -> Result<()> {
        Ok(self.imap()?.move_email(source, destination, set).await?)
    }

    /// Copies messages between folders.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn copy_email(&self, source: &str, destination: &str, set: &str) -> Result<()> {
        Ok(self.imap()?.copy_email(source, destination, set).await?)
    }

    /// Deletes messages via the trash folder.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn delete_email(&self, folder: &str, set: &str) -> Result<()> {
        Ok(self.imap()?.delete_email(folder, set).await?)
    }

    /// Creates a folder.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<()> {
        Ok(self.imap()?.create_folder(name, parent).await?)
    }

    /// Deletes a folder.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn delete_folder(&self, name: &str, recursive: bool) -> Result<()> {
        Ok(self.imap()?.delete_folder(name, recursive).await?)
    }

    /// Moves a folder under a destination.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn move_folder(&self, name: &str, destination: &str) -> Result<()> {
        Ok(self.imap()?.move_folder(name, destination).await?)
    }

    /// Renames a folder.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn rename_folder(&self, name: &str, new_name: &str) -> Result<()> {
        Ok(self.imap()?.rename_folder(name, new_name).await?)
    }

    // === IDLE ===

    /// Starts background IDLE monitoring; events arrive on
    /// [`OpenMail::take_events`].
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn idle(&mut self) -> Result<()> {
        Ok(self.imap_mut()?.idle().await?)
    }

    /// Stops background IDLE monitoring.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn done(&mut self) -> Result<()> {
        Ok(self.imap_mut()?.done().await?)
    }

    /// Takes the observer event stream. Yields at most once per
    /// connect.
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<MailEvent>> {
        self.events.take()
    }
}

impl std::fmt::Debug for OpenMail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenMail")
            .field("address", &self.account.address)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

// 📬 Mail Source - Where notification emails come from
//
// The scanner only needs two things from a mailbox: the unseen messages
// from one sender, and a way to mark a message as read. `EmlDirectory`
// does this over a directory of .eml files; read messages move to `seen/`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mailparse::{parse_mail, DispositionType, MailHeaderMap, ParsedMail};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Sub-directory that holds messages already marked read
pub const SEEN_DIR: &str = "seen";

// ============================================================================
// MESSAGE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    /// Mailbox-local identifier, only meaningful to the source that produced it
    pub uid: u32,

    /// Message-ID header, empty when the message has none
    pub message_id: String,

    pub from: String,

    /// Date header converted to UTC
    pub envelope_date: Option<DateTime<Utc>>,

    /// Text body; None when the message has no text part at all
    pub body: Option<String>,
}

// ============================================================================
// MAIL SOURCE TRAIT
// ============================================================================

pub trait MailSource {
    /// Unseen messages whose From header contains `from_email`
    fn fetch_unseen(&mut self, from_email: &str) -> Result<Vec<MailMessage>>;

    fn mark_read(&mut self, message: &MailMessage) -> Result<()>;
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse a raw RFC 822 message. `uid` is assigned by the caller.
pub fn parse_message(uid: u32, raw: &[u8]) -> Result<MailMessage> {
    let mail = parse_mail(raw).context("Failed to parse email")?;

    let header = |name: &str| mail.headers.get_first_value(name).unwrap_or_default();

    let envelope_date = mail
        .headers
        .get_first_value("Date")
        .and_then(|value| mailparse::dateparse(&value).ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    Ok(MailMessage {
        uid,
        message_id: header("Message-ID").trim().to_string(),
        from: header("From"),
        envelope_date,
        body: extract_text_body(&mail),
    })
}

/// Plain text is preferred; HTML is the fallback. Attachments are skipped.
pub fn extract_text_body(mail: &ParsedMail) -> Option<String> {
    fn walk(mail: &ParsedMail, mimetype: &str) -> Option<String> {
        if mail.get_content_disposition().disposition == DispositionType::Attachment {
            return None;
        }
        if mail.ctype.mimetype.eq_ignore_ascii_case(mimetype) {
            if let Ok(body) = mail.get_body() {
                return Some(body);
            }
        }
        mail.subparts.iter().find_map(|part| walk(part, mimetype))
    }

    walk(mail, "text/plain").or_else(|| walk(mail, "text/html"))
}

// ============================================================================
// .EML DIRECTORY
// ============================================================================

/// A directory of `.eml` files. Files in the top level are unseen.
///
/// A file keeps the UID it was first listed under for the life of the
/// source, however many times it is fetched again.
#[derive(Debug)]
pub struct EmlDirectory {
    root: PathBuf,
    next_uid: u32,
    paths: HashMap<u32, PathBuf>,
    uids: HashMap<PathBuf, u32>,
    read: HashSet<u32>,
}

impl EmlDirectory {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            anyhow::bail!("Mail directory not found: {}", root.display());
        }

        Ok(EmlDirectory {
            root,
            next_uid: 1,
            paths: HashMap::new(),
            uids: HashMap::new(),
            read: HashSet::new(),
        })
    }

    fn unseen_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list mail directory: {}", self.root.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .and_then(|s| s.to_str())
                    .map(|s| s.eq_ignore_ascii_case("eml"))
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();
        files.sort();
        Ok(files)
    }
}

impl MailSource for EmlDirectory {
    fn fetch_unseen(&mut self, from_email: &str) -> Result<Vec<MailMessage>> {
        let wanted = from_email.to_lowercase();
        let mut messages = Vec::new();

        for path in self.unseen_files()? {
            let raw = fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;

            let uid = self.uids.get(&path).copied().unwrap_or(self.next_uid);
            let message = match parse_message(uid, &raw) {
                Ok(message) => message,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable email");
                    continue;
                }
            };

            if !message.from.to_lowercase().contains(&wanted) {
                continue;
            }

            if uid == self.next_uid {
                self.next_uid += 1;
                self.uids.insert(path.clone(), uid);
                self.paths.insert(uid, path);
            }
            messages.push(message);
        }

        debug!(from = from_email, count = messages.len(), "fetched unseen emails");
        Ok(messages)
    }

    fn mark_read(&mut self, message: &MailMessage) -> Result<()> {
        if self.read.contains(&message.uid) {
            return Ok(());
        }

        let path = self
            .paths
            .get(&message.uid)
            .cloned()
            .with_context(|| format!("Unknown message UID {}", message.uid))?;

        let seen = self.root.join(SEEN_DIR);
        fs::create_dir_all(&seen)
            .with_context(|| format!("Failed to create {}", seen.display()))?;

        let file_name = path
            .file_name()
            .with_context(|| format!("Invalid mail path {}", path.display()))?;
        fs::rename(&path, seen.join(file_name))
            .with_context(|| format!("Failed to move {} to {}", path.display(), seen.display()))?;

        self.paths.remove(&message.uid);
        self.uids.remove(&path);
        self.read.insert(message.uid);
        Ok(())
    }
}

//! Message decoding.
//!
//! Turns the raw bytes of an archive blob into a [`Message`] carrying the
//! header and body fields the threading and indexing layers need. MIME
//! parsing is delegated to the `mailparse` crate; this module adds the
//! normalization rules on top of it.
//!
//! # Field Rules
//!
//! - **Message-ID**: first header, trimmed, enclosing angle brackets stripped.
//!   An empty id is an error ([`DecodeError::MissingMessageId`]).
//! - **Subject**: RFC 2047 decoded. Encoded words in a charset `mailparse`
//!   does not know are decoded as lossy UTF-8 instead of being left raw.
//! - **From**: first mailbox of the header. Unparsable senders become empty
//!   strings rather than errors.
//! - **References**: every `<...>` token of `References` then `In-Reply-To`,
//!   duplicates removed, first occurrence kept.
//! - **Date**: `dateparser` first, RFC 2822 as fallback. Missing and
//!   unparsable dates are distinct errors; both make the message unindexable.
//! - **Body**: first `text/plain` part, else the root body.
//!
//! # Error Handling
//!
//! The indexer treats every [`DecodeError`] as a per-commit failure: the
//! commit is logged and skipped, the walk continues.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use mailparse::{MailHeaderMap, ParsedMail, parse_mail};
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::Message;

/// Errors that can be returned while decoding a message blob.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to parse MIME structure: {0}")]
    MimeParse(#[from] mailparse::MailParseError),
    #[error("missing Message-ID header")]
    MissingMessageId,
    #[error("missing Date header for message {message_id}")]
    MissingDate { message_id: String },
    #[error("invalid Date header `{raw}` for message {message_id}")]
    InvalidDate { message_id: String, raw: String },
}

static ENCODED_WORD_REGEX: OnceLock<Regex> = OnceLock::new();
static ANGLE_ID_REGEX: OnceLock<Regex> = OnceLock::new();

fn encoded_word_regex() -> &'static Regex {
    ENCODED_WORD_REGEX.get_or_init(|| {
        Regex::new(r"=\?([^?\s]+)\?([BbQq])\?([^?\s]*)\?=").expect("Invalid encoded word regex")
    })
}

fn angle_id_regex() -> &'static Regex {
    ANGLE_ID_REGEX.get_or_init(|| Regex::new(r"<([^>]+)>").expect("Invalid message id regex"))
}

/// Remove NUL bytes and surrounding whitespace
fn sanitize_text(text: &str) -> String {
    text.replace('\0', "").trim().to_string()
}

/// Clean a message id by removing angle brackets and whitespace
fn normalize_message_id(msg_id: Option<String>) -> Option<String> {
    msg_id.and_then(|id| {
        let cleaned = id.trim().trim_start_matches('<').trim_end_matches('>').trim();
        if cleaned.is_empty() {
            None
        } else {
            Some(sanitize_text(cleaned))
        }
    })
}

/// Decode a `Q`-encoded word payload (RFC 2047 section 4.2).
fn decode_q(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 2;
                    }
                    None => out.push(b'='),
                }
            }
            other => out.push(other),
        }
        i += 1;
    }
    out
}

/// Decode encoded words `mailparse` left untouched (unknown charsets) as lossy UTF-8.
fn decode_unknown_charsets(value: &str) -> String {
    encoded_word_regex()
        .replace_all(value, |caps: &Captures| {
            let payload = &caps[3];
            let bytes = if caps[2].eq_ignore_ascii_case("b") {
                match STANDARD.decode(payload) {
                    Ok(bytes) => bytes,
                    Err(_) => return caps[0].to_string(),
                }
            } else {
                decode_q(payload)
            };
            String::from_utf8_lossy(&bytes).into_owned()
        })
        .into_owned()
}

/// All `<...>` ids of `References` then `In-Reply-To`, deduplicated in order.
fn extract_references(references: Option<String>, in_reply_to: Option<String>) -> Vec<String> {
    let combined = format!(
        "{} {}",
        references.unwrap_or_default(),
        in_reply_to.unwrap_or_default()
    );

    let mut seen = HashSet::new();
    angle_id_regex()
        .captures_iter(&combined)
        .map(|caps| sanitize_text(&caps[1]))
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

/// First mailbox of a `From` header as (display name, address).
fn parse_sender(from: &str) -> (String, String) {
    let Ok(addrs) = mailparse::addrparse(from) else {
        return (String::new(), String::new());
    };

    let single = addrs.iter().find_map(|addr| match addr {
        mailparse::MailAddr::Single(info) => Some(info.clone()),
        mailparse::MailAddr::Group(group) => group.addrs.first().cloned(),
    });

    match single {
        Some(info) => (
            sanitize_text(&info.display_name.unwrap_or_default()),
            sanitize_text(&info.addr),
        ),
        None => (String::new(), String::new()),
    }
}

/// First `text/plain` part, searching nested multiparts depth first.
fn find_plain_text<'a>(part: &'a ParsedMail<'a>) -> Option<&'a ParsedMail<'a>> {
    if part.subparts.is_empty() {
        return (part.ctype.mimetype == "text/plain").then_some(part);
    }
    part.subparts.iter().find_map(find_plain_text)
}

fn extract_body(parsed: &ParsedMail) -> String {
    let part = if parsed.subparts.is_empty() {
        parsed
    } else {
        find_plain_text(parsed).unwrap_or(parsed)
    };
    sanitize_text(&part.get_body().unwrap_or_default())
}

fn parse_date(raw_date: Option<String>, message_id: &str) -> Result<DateTime<Utc>, DecodeError> {
    let raw = raw_date.unwrap_or_default();
    if raw.trim().is_empty() {
        return Err(DecodeError::MissingDate {
            message_id: message_id.to_string(),
        });
    }

    if let Ok(date) = dateparser::parse(&raw) {
        return Ok(date.with_timezone(&Utc));
    }

    mailparse::dateparse(&raw)
        .ok()
        .and_then(|timestamp| DateTime::<Utc>::from_timestamp(timestamp, 0))
        .ok_or_else(|| DecodeError::InvalidDate {
            message_id: message_id.to_string(),
            raw,
        })
}

/// Decode a raw archive blob into a [`Message`].
pub fn decode_message(blob_data: &[u8]) -> Result<Message, DecodeError> {
    let parsed = parse_mail(blob_data)?;

    let message_id = normalize_message_id(parsed.headers.get_first_value("Message-ID"))
        .ok_or(DecodeError::MissingMessageId)?;

    let subject = parsed
        .headers
        .get_first_value("Subject")
        .map(|s| sanitize_text(&decode_unknown_charsets(&s)))
        .unwrap_or_default();

    let date = parse_date(parsed.headers.get_first_value("Date"), &message_id)?;

    let (from_name, from_addr) =
        parse_sender(&parsed.headers.get_first_value("From").unwrap_or_default());

    let references = extract_references(
        parsed.headers.get_first_value("References"),
        parsed.headers.get_first_value("In-Reply-To"),
    );

    let body = extract_body(&parsed);

    log::trace!("decoded: {} - {}", message_id, subject);

    Ok(Message {
        message_id,
        subject,
        references,
        from_name,
        from_addr,
        date,
        body,
    })
}

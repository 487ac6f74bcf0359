//! # Dialogue Records
//!
//! Plain-text transcripts, one line per utterance:
//!
//! ```text
//! [2026-10-19 09:30:00] Interviewer: Who will use the system day to day?
//! [2026-10-19 09:30:04] EndUser: Mostly warehouse staff on handheld scanners.
//! ```
//!
//! Appends are read-modify-write against the artifact store. A record that
//! does not exist yet reads as empty.

use chrono::Utc;
use std::fmt;

use crate::error::StoreError;
use crate::store::{self, ArtifactStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Interviewer,
    EndUser,
    Deployer,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Interviewer => "Interviewer",
            Speaker::EndUser => "EndUser",
            Speaker::Deployer => "Deployer",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which transcript a record key refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    EndUser,
    Deployer,
}

pub fn record_key(channel: Channel, conversation_id: &str) -> String {
    match channel {
        Channel::EndUser => format!("interview_record_{}.txt", conversation_id),
        Channel::Deployer => format!("deployer_interview_record_{}.txt", conversation_id),
    }
}

/// One transcript line. Embedded newlines are folded so a line stays one utterance.
pub fn format_line(speaker: Speaker, content: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("[{}] {}: {}\n", timestamp, speaker, flat)
}

pub async fn read(store: &dyn ArtifactStore, bucket: &str, key: &str) -> Result<String, StoreError> {
    store::read_text_or_empty(store, bucket, key).await
}

/// Append an utterance and return the updated transcript
pub async fn append(
    store: &dyn ArtifactStore,
    bucket: &str,
    key: &str,
    speaker: Speaker,
    content: &str,
) -> Result<String, StoreError> {
    let mut text = read(store, bucket, key).await?;
    text.push_str(&format_line(speaker, content));
    store::write_text(store, bucket, key, &text).await?;
    Ok(text)
}

fn utterances(text: &str, speaker: Speaker) -> impl Iterator<Item = &str> {
    let marker = format!("] {}: ", speaker);
    text.lines().filter_map(move |line| {
        line.find(&marker)
            .filter(|_| line.starts_with('['))
            .map(|pos| &line[pos + marker.len()..])
    })
}

/// Number of utterances by `speaker`
pub fn count_turns(text: &str, speaker: Speaker) -> usize {
    utterances(text, speaker).count()
}

/// Most recent utterance by `speaker`
#[cfg(test)]
pub fn latest(text: &str, speaker: Speaker) -> Option<String> {
    utterances(text, speaker).last().map(str::to_string)
}

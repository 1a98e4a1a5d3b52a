//! Poll creation requests.
//!
//! A [`PollRequest`] can only be obtained through [`PollRequest::new`], so
//! every instance in the system already satisfies the shape rules the chat
//! network enforces on poll creation messages.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Maximum number of options a poll may carry.
pub const MAX_POLL_OPTIONS: usize = 12;

/// A validated poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    question: String,
    options: Vec<String>,
    selectable_count: u32,
}

impl PollRequest {
    /// Validate and build a poll.
    ///
    /// Rules: non-blank question; 1..=[`MAX_POLL_OPTIONS`] options, each
    /// non-blank and unique; `1 <= selectable_count <= options.len()`.
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        selectable_count: u32,
    ) -> Result<Self, CoreError> {
        let question = question.into();
        if question.trim().is_empty() {
            return Err(CoreError::InvalidPoll("question is empty".into()));
        }
        if options.is_empty() {
            return Err(CoreError::InvalidPoll("at least one option required".into()));
        }
        if options.len() > MAX_POLL_OPTIONS {
            return Err(CoreError::InvalidPoll(format!(
                "{} options exceeds maximum of {MAX_POLL_OPTIONS}",
                options.len()
            )));
        }
        let mut seen = HashSet::with_capacity(options.len());
        for option in &options {
            if option.trim().is_empty() {
                return Err(CoreError::InvalidPoll("option is empty".into()));
            }
            if !seen.insert(option.as_str()) {
                return Err(CoreError::InvalidPoll(format!("duplicate option '{option}'")));
            }
        }
        if selectable_count == 0 || selectable_count as usize > options.len() {
            return Err(CoreError::InvalidPoll(format!(
                "selectable count {selectable_count} outside 1..={}",
                options.len()
            )));
        }
        Ok(Self {
            question,
            options,
            selectable_count,
        })
    }

    /// The poll question.
    pub fn question(&self) -> &str {
        &self.question
    }

    /// Options in display order.
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// How many options a voter may pick.
    pub fn selectable_count(&self) -> u32 {
        self.selectable_count
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPoll {
    question: String,
    options: Vec<String>,
    selectable_count: u32,
}

impl<'de> Deserialize<'de> for PollRequest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawPoll::deserialize(deserializer)?;
        Self::new(raw.question, raw.options, raw.selectable_count)
            .map_err(serde::de::Error::custom)
    }
}

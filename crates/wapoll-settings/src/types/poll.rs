use serde::{Deserialize, Serialize};

/// Poll defaults used when the caller does not supply a question or options.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollSettings {
    /// Chat that receives polls (`user@server`, or a bare group ID).
    /// Polls cannot be sent until this is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Default question.
    pub question: String,
    /// Default options, in display order.
    pub options: Vec<String>,
    /// Default number of options a voter may pick.
    pub selectable_count: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            destination: None,
            question: "Cand vii la birou?".to_string(),
            options: ["9:00", "10:00", "11:00", "12:00", "13:00", "WFH", "OOO"]
                .into_iter()
                .map(String::from)
                .collect(),
            selectable_count: 2,
        }
    }
}

impl PollSettings {
    pub(crate) fn validate(&mut self) {
        let max = u32::try_from(self.options.len()).unwrap_or(u32::MAX).max(1);
        if self.selectable_count == 0 || self.selectable_count > max {
            let corrected = self.selectable_count.clamp(1, max);
            tracing::warn!(
                "poll selectable_count ({}) outside 1..={max}, clamped to {corrected}",
                self.selectable_count
            );
            self.selectable_count = corrected;
        }
    }
}

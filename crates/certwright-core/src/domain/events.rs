//! Events - 購読者へ送る終端イベント
//!
//! ワイヤ形式: `{"type":"certificate_status","status":"complete"}`

use serde::{Deserialize, Serialize};

/// Terminal status of one generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Complete,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "certificate_status")]
pub struct StatusEvent {
    pub status: TerminalStatus,
}

impl StatusEvent {
    pub fn complete() -> Self {
        Self {
            status: TerminalStatus::Complete,
        }
    }

    pub fn error() -> Self {
        Self {
            status: TerminalStatus::Error,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == TerminalStatus::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_matches_pending_page_contract() {
        let json = serde_json::to_value(StatusEvent::complete()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "certificate_status", "status": "complete" })
        );

        let json = serde_json::to_value(StatusEvent::error()).unwrap();
        assert_eq!(json["status"], "error");
    }

    #[test]
    fn parses_from_wire() {
        let event: StatusEvent =
            serde_json::from_str(r#"{"type":"certificate_status","status":"error"}"#).unwrap();
        assert!(!event.is_complete());
    }
}

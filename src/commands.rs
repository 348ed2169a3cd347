//! Command channel exposed to the UI collaborator.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum UiCommand {
    UpdateHistoryCapacity {
        #[serde(alias = "maxHistory")]
        value: i64,
    },
    UpdateDisplayPageSize {
        value: i64,
    },
    ClearHistory,
}

impl UiCommand {
    /// Parse a command message; `updateMaxHistory` is accepted as an alias
    /// of `updateHistoryCapacity`.
    pub fn parse(message: &serde_json::Value) -> serde_json::Result<Self> {
        let mut message = message.clone();
        if let Some(action) = message.get_mut("action") {
            if *action == "updateMaxHistory" {
                *action = serde_json::Value::from("updateHistoryCapacity");
            }
        }
        serde_json::from_value(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_capacity_command() {
        let command =
            UiCommand::parse(&json!({"action": "updateHistoryCapacity", "value": 50})).unwrap();
        assert_eq!(command, UiCommand::UpdateHistoryCapacity { value: 50 });
    }

    #[test]
    fn test_parse_legacy_command() {
        let command =
            UiCommand::parse(&json!({"action": "updateMaxHistory", "maxHistory": 75})).unwrap();
        assert_eq!(command, UiCommand::UpdateHistoryCapacity { value: 75 });
    }

    #[test]
    fn test_parse_rejects_unknown_action() {
        assert!(UiCommand::parse(&json!({"action": "reboot"})).is_err());
        let clear = UiCommand::parse(&json!({"action": "clearHistory"})).unwrap();
        assert_eq!(clear, UiCommand::ClearHistory);
    }
}

use serde::{Deserialize, Serialize};

/// Commands clients send over the socket. Everything except `authenticate`
/// requires the connection to be authenticated first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    #[serde(rename = "authenticate")]
    Authenticate { user_id: String, tenant_id: String },
    #[serde(rename = "joinChat")]
    JoinChat { chat_id: String },
    #[serde(rename = "leaveChat")]
    LeaveChat { chat_id: String },
    #[serde(rename = "typing")]
    Typing { chat_id: String, is_typing: bool },
    #[serde(rename = "ping")]
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticate_parses() {
        let json = r#"{"type":"authenticate","user_id":"u1","tenant_id":"t1"}"#;
        let cmd: ClientCommand = serde_json::from_str(json).unwrap();
        match cmd {
            ClientCommand::Authenticate { user_id, tenant_id } => {
                assert_eq!(user_id, "u1");
                assert_eq!(tenant_id, "t1");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_typing_round_trips() {
        let cmd = ClientCommand::Typing {
            chat_id: "chat1".to_string(),
            is_typing: true,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"type\":\"typing\""));
        let parsed: ClientCommand = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, ClientCommand::Typing { is_typing: true, .. }));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"type":"selfDestruct"}"#;
        assert!(serde_json::from_str::<ClientCommand>(json).is_err());
    }

    #[test]
    fn test_ping_needs_no_fields() {
        let cmd: ClientCommand = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(cmd, ClientCommand::Ping));
    }
}

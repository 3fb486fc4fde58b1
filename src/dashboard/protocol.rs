use crate::dashboard::metrics::BuildMetrics;
use crate::dashboard::notifications::{Notification, NotificationDraft};
use crate::history::BuildRecord;
use crate::status::{BuildStatus, OutputLine, TaskRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Commands a dashboard client can send
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    StartBuild {
        #[serde(default, alias = "gradleCommand")]
        command: Option<String>,
    },
    StopBuild,
    RequestStatus,
    RequestOutput,
    RequestTasks,
    RequestNotifications,
    CustomNotification {
        notification: NotificationDraft,
    },
    DismissNotification {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        all: bool,
    },
    RequestHistory,
    RequestMetrics,
    CreateRelease,
}

/// Messages pushed to dashboard clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    Status(BuildStatus),
    BuildOutput(Vec<OutputLine>),
    Tasks(BTreeMap<String, TaskRecord>),
    Notifications(Vec<Notification>),
    Error(String),
    History(Vec<BuildRecord>),
    Metrics(BuildMetrics),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::BuildOutput(_) => "buildOutput",
            Self::Tasks(_) => "tasks",
            Self::Notifications(_) => "notifications",
            Self::Error(_) => "error",
            Self::History(_) => "history",
            Self::Metrics(_) => "metrics",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::notifications::NotificationKind;

    #[test]
    fn test_parse_start_build() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"startBuild","command":"clean build"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::StartBuild {
                command: Some("clean build".to_string())
            }
        );
    }

    #[test]
    fn test_parse_legacy_gradle_command_field() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"startBuild","gradleCommand":"assemble"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::StartBuild {
                command: Some("assemble".to_string())
            }
        );
    }

    #[test]
    fn test_parse_unit_commands() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"stopBuild"}"#).unwrap();
        assert_eq!(msg, ClientMessage::StopBuild);
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"requestOutput"}"#).unwrap();
        assert_eq!(msg, ClientMessage::RequestOutput);
    }

    #[test]
    fn test_dismiss_all() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"dismissNotification","all":true}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::DismissNotification { id: None, all: true }
        );
    }

    #[test]
    fn test_parse_custom_notification() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"customNotification","notification":{"type":"warning","message":"Low disk"}}"#,
        )
        .unwrap();
        let ClientMessage::CustomNotification { notification } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(notification.kind, NotificationKind::Warning);
        assert_eq!(notification.message, "Low disk");
        assert!(notification.title.is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"formatDisk"}"#).is_err());
    }

    #[test]
    fn test_server_message_shape() {
        let msg = ServerMessage::BuildOutput(vec![OutputLine::info("hi")]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "buildOutput");
        assert_eq!(json["data"][0]["type"], "info");
        assert_eq!(json["data"][0]["message"], "hi");

        let json = serde_json::to_value(ServerMessage::Error("nope".to_string())).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["data"], "nope");
        assert_eq!(ServerMessage::Error(String::new()).kind(), "error");
    }
}

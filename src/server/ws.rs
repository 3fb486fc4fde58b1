use super::AppState;
use crate::constants::OBSERVER_QUEUE_CAPACITY;
use crate::dashboard::hub::{ChannelObserver, ObserverId};
use crate::dashboard::protocol::{ClientMessage, ServerMessage};
use crate::supervisor::StopOutcome;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (observer, mut outbound) = ChannelObserver::channel(OBSERVER_QUEUE_CAPACITY);
    let id = state.supervisor.subscribe(Arc::new(observer));
    tracing::info!(observer = id, "Dashboard client connected");

    // Ends when the hub drops the observer or the socket closes
    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match serde_json::to_string(&*message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(kind = message.kind(), error = %e, "Failed to encode message");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let reader_state = state.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => handle_text(&reader_state, id, &text),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    state.supervisor.unsubscribe(id);
    tracing::info!(observer = id, "Dashboard client disconnected");
}

fn handle_text(state: &AppState, id: ObserverId, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => dispatch(state, id, message),
        Err(e) => {
            tracing::debug!(observer = id, error = %e, "Unparseable client message");
            reply(state, id, ServerMessage::Error(format!("Invalid message: {}", e)));
        }
    }
}

fn reply(state: &AppState, id: ObserverId, message: ServerMessage) {
    state.supervisor.hub().send_to(id, message);
}

/// Execute one client command; replies go only to the sender
pub fn dispatch(state: &AppState, id: ObserverId, message: ClientMessage) {
    let supervisor = &state.supervisor;
    match message {
        ClientMessage::StartBuild { command } => {
            if let Err(e) = supervisor.start(command.as_deref()) {
                reply(state, id, ServerMessage::Error(e.to_string()));
            }
        }
        ClientMessage::StopBuild => match supervisor.stop() {
            StopOutcome::Signalled => {}
            StopOutcome::SignalFailed(reason) => reply(
                state,
                id,
                ServerMessage::Error(format!("Failed to signal build process: {}", reason)),
            ),
            StopOutcome::NotRunning => {
                reply(state, id, ServerMessage::Error("No build is running".to_string()))
            }
        },
        ClientMessage::RequestStatus => reply(state, id, ServerMessage::Status(supervisor.snapshot())),
        ClientMessage::RequestOutput => {
            reply(state, id, ServerMessage::BuildOutput(supervisor.output()))
        }
        ClientMessage::RequestTasks => reply(state, id, ServerMessage::Tasks(supervisor.tasks())),
        ClientMessage::CustomNotification { notification } => {
            supervisor.notifications().push(notification);
        }
        ClientMessage::RequestNotifications => reply(
            state,
            id,
            ServerMessage::Notifications(supervisor.notifications().list()),
        ),
        ClientMessage::DismissNotification { id: target, all } => {
            let notifications = supervisor.notifications();
            if all {
                notifications.clear();
            } else if let Some(target) = target {
                notifications.dismiss(&target);
            } else {
                reply(
                    state,
                    id,
                    ServerMessage::Error("dismissNotification needs an id or all".to_string()),
                );
            }
        }
        ClientMessage::RequestHistory => match supervisor.history() {
            Ok(records) => reply(state, id, ServerMessage::History(records)),
            Err(e) => reply(state, id, ServerMessage::Error(e.to_string())),
        },
        ClientMessage::RequestMetrics => match supervisor.metrics() {
            Ok(metrics) => reply(state, id, ServerMessage::Metrics(metrics)),
            Err(e) => reply(state, id, ServerMessage::Error(e.to_string())),
        },
        ClientMessage::CreateRelease => {
            if let Err(e) = state.release.create_release() {
                reply(state, id, ServerMessage::Error(e.to_string()));
            }
        }
    }
}

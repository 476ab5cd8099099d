//! WebSocket endpoint for the emotions and interventions channels

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use sentientiq_common::now_millis;
use sentientiq_intervention::Feedback;
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::dispatcher::{Channel, ChannelMessage, InboundMessage};
use crate::pipeline::Pipeline;
use crate::state::AppState;

/// Connect-time handshake parameters
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default, alias = "session_id")]
    pub session: Option<String>,
    #[serde(default, alias = "tenant_id")]
    pub tenant: Option<String>,
}

pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn handle_socket(socket: WebSocket, state: AppState, params: ConnectParams) {
    let dispatcher = state.pipeline.dispatcher.clone();
    let conn_id = dispatcher.connect();
    let channel = params.channel.unwrap_or_default();
    let session_id = params.session.filter(|s| !s.trim().is_empty());
    let tenant_id = params.tenant.filter(|t| !t.trim().is_empty());

    let (out_tx, mut out_rx) = mpsc::channel(dispatcher.config().outbound_buffer.max(1));
    let routed_session = match channel {
        Channel::Interventions => session_id.clone(),
        Channel::Emotions => None,
    };
    if let Some(session) = &routed_session {
        dispatcher.register(session, conn_id, out_tx.clone());
    }
    let mut emotions = (channel == Channel::Emotions).then(|| dispatcher.subscribe_emotions());
    info!(conn_id, ?channel, session_id = ?session_id, "Channel connected");

    let connected = ChannelMessage::Connected {
        channel,
        session_id: session_id.clone(),
        tenant_id: tenant_id.clone(),
        timestamp: now_millis(),
    };
    let heartbeat = dispatcher.config().heartbeat;
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        if send_json(&mut sender, &connected).await.is_err() {
            return;
        }
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.tick().await;

        loop {
            let message = tokio::select! {
                Some(message) = out_rx.recv() => message,
                message = next_emotion(&mut emotions) => message,
                _ = ticker.tick() => ChannelMessage::ping(),
            };
            if send_json(&mut sender, &message).await.is_err() {
                break;
            }
        }
    });

    let pipeline = state.pipeline.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => handle_inbound(
                    &text,
                    &pipeline,
                    session_id.as_deref(),
                    tenant_id.as_deref(),
                    &out_tx,
                ),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.disconnect(conn_id, routed_session.as_deref());
    info!(conn_id, "Channel disconnected");
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ChannelMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).map_err(axum::Error::new)?;
    sender.send(Message::Text(text)).await
}

/// Next broadcast emotion; pending forever for non-observers
async fn next_emotion(rx: &mut Option<broadcast::Receiver<ChannelMessage>>) -> ChannelMessage {
    let Some(rx) = rx.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(message) => return message,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Emotion observer lagging");
            }
            Err(broadcast::error::RecvError::Closed) => return std::future::pending().await,
        }
    }
}

fn handle_inbound(
    text: &str,
    pipeline: &Pipeline,
    session_id: Option<&str>,
    tenant_id: Option<&str>,
    out_tx: &mpsc::Sender<ChannelMessage>,
) {
    let inbound = match serde_json::from_str::<InboundMessage>(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            debug!(error = %e, "Ignoring unrecognized client message");
            return;
        }
    };

    let (feedback, reported_type) = match inbound {
        InboundMessage::Ping => {
            if out_tx.try_send(ChannelMessage::pong()).is_err() {
                debug!("Pong dropped");
            }
            return;
        }
        InboundMessage::InterventionShown { intervention_type } => (Feedback::Shown, intervention_type),
        InboundMessage::InterventionClicked { intervention_type } => (Feedback::Clicked, intervention_type),
        InboundMessage::InterventionDismissed { intervention_type } => (Feedback::Dismissed, intervention_type),
    };

    match session_id {
        Some(session_id) => pipeline.record_feedback(session_id, tenant_id, feedback, reported_type),
        None => debug!(?feedback, "Feedback without a session ignored"),
    }
}

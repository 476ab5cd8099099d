//! Real-time dispatcher
//!
//! Two logical channels share one WebSocket: `emotions` is a broadcast to every
//! observer, `interventions` is unicast to the connection owning a session.
//! Delivery is at-most-once; a missing, saturated or closed route reports `false`,
//! and `deliver_intervention` says which.

use dashmap::DashMap;
use sentientiq_common::{now_millis, DispatchError, EmotionDiagnosis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Server ping interval per connection
    pub heartbeat: Duration,
    /// Outbound messages buffered per connection
    pub outbound_buffer: usize,
    /// Emotion broadcast backlog before slow observers lag
    pub broadcast_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(30),
            outbound_buffer: 64,
            broadcast_capacity: 1024,
        }
    }
}

/// Channel selected at connect time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Emotions,
    #[default]
    Interventions,
}

/// Server-to-client envelope: `{type, ...payload, timestamp}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    Connected {
        channel: Channel,
        session_id: Option<String>,
        tenant_id: Option<String>,
        timestamp: i64,
    },
    Emotion {
        session_id: String,
        tenant_id: String,
        emotion: String,
        confidence: u8,
        behavior: String,
        timestamp: i64,
    },
    Intervention {
        session_id: String,
        intervention_type: String,
        context: Value,
        timestamp: i64,
    },
    Ping {
        timestamp: i64,
    },
    Pong {
        timestamp: i64,
    },
}

impl ChannelMessage {
    pub fn emotion(session_id: &str, tenant_id: &str, diagnosis: &EmotionDiagnosis) -> Self {
        ChannelMessage::Emotion {
            session_id: session_id.to_string(),
            tenant_id: tenant_id.to_string(),
            emotion: diagnosis.emotion.clone(),
            confidence: diagnosis.confidence,
            behavior: diagnosis.behavior.clone(),
            timestamp: diagnosis.timestamp,
        }
    }

    pub fn ping() -> Self {
        ChannelMessage::Ping {
            timestamp: now_millis(),
        }
    }

    pub fn pong() -> Self {
        ChannelMessage::Pong {
            timestamp: now_millis(),
        }
    }
}

/// Client-to-server messages
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Ping,
    InterventionShown {
        #[serde(default)]
        intervention_type: Option<String>,
    },
    InterventionClicked {
        #[serde(default)]
        intervention_type: Option<String>,
    },
    InterventionDismissed {
        #[serde(default)]
        intervention_type: Option<String>,
    },
}

#[derive(Debug)]
struct Route {
    conn_id: u64,
    tx: mpsc::Sender<ChannelMessage>,
}

pub struct Dispatcher {
    config: DispatcherConfig,
    /// session -> owning connection
    routes: DashMap<String, Route>,
    emotions: broadcast::Sender<ChannelMessage>,
    next_conn: AtomicU64,
    connections: AtomicUsize,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        let (emotions, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            config,
            routes: DashMap::new(),
            emotions,
            next_conn: AtomicU64::new(1),
            connections: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Account a new connection and hand out its id
    pub fn connect(&self) -> u64 {
        self.connections.fetch_add(1, Ordering::Relaxed);
        self.next_conn.fetch_add(1, Ordering::Relaxed)
    }

    /// Remove a connection and, if it still owns it, its session route
    pub fn disconnect(&self, conn_id: u64, session_id: Option<&str>) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
        if let Some(session_id) = session_id {
            if self
                .routes
                .remove_if(session_id, |_, route| route.conn_id == conn_id)
                .is_some()
            {
                debug!(session_id, conn_id, "Dispatch route removed");
            }
        }
    }

    /// Route a session's interventions to a connection; the newest connection wins
    pub fn register(&self, session_id: &str, conn_id: u64, tx: mpsc::Sender<ChannelMessage>) {
        self.routes
            .insert(session_id.to_string(), Route { conn_id, tx });
        debug!(session_id, conn_id, "Dispatch route registered");
    }

    pub fn has_route(&self, session_id: &str) -> bool {
        self.routes.contains_key(session_id)
    }

    /// Best-effort unicast; `true` only if the message was written to a live route
    pub fn send_intervention(&self, session_id: &str, intervention_type: &str, context: Value) -> bool {
        self.deliver_intervention(session_id, intervention_type, context).is_ok()
    }

    /// Unicast reporting why a message was not written
    pub fn deliver_intervention(
        &self,
        session_id: &str,
        intervention_type: &str,
        context: Value,
    ) -> Result<(), DispatchError> {
        let Some(route) = self.routes.get(session_id) else {
            warn!(session_id, intervention_type, "No live connection for intervention");
            return Err(DispatchError::NoRoute(session_id.to_string()));
        };

        let message = ChannelMessage::Intervention {
            session_id: session_id.to_string(),
            intervention_type: intervention_type.to_string(),
            context,
            timestamp: now_millis(),
        };
        match route.tx.try_send(message) {
            Ok(()) => {
                debug!(session_id, intervention_type, "Intervention dispatched");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session_id, intervention_type, "Outbound buffer full, intervention dropped");
                Err(DispatchError::BufferFull(session_id.to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(session_id, intervention_type, "Connection closed, intervention dropped");
                Err(DispatchError::Closed(session_id.to_string()))
            }
        }
    }

    /// Fan an emotion out to observers; returns how many received it
    pub fn broadcast_emotion(&self, session_id: &str, tenant_id: &str, diagnosis: &EmotionDiagnosis) -> usize {
        self.emotions
            .send(ChannelMessage::emotion(session_id, tenant_id, diagnosis))
            .unwrap_or(0)
    }

    pub fn subscribe_emotions(&self) -> broadcast::Receiver<ChannelMessage> {
        self.emotions.subscribe()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_session_is_a_miss() {
        let dispatcher = Dispatcher::default();
        assert!(!dispatcher.send_intervention("unknown-session", "discount_offer", json!({})));
    }

    #[tokio::test]
    async fn test_unicast_to_owner() {
        let dispatcher = Dispatcher::default();
        let (tx, mut rx) = mpsc::channel(4);
        let conn = dispatcher.connect();
        dispatcher.register("s1", conn, tx);

        assert!(dispatcher.send_intervention("s1", "help_chat", json!({"rule_id": "rage_support"})));
        match rx.recv().await {
            Some(ChannelMessage::Intervention {
                session_id,
                intervention_type,
                context,
                ..
            }) => {
                assert_eq!(session_id, "s1");
                assert_eq!(intervention_type, "help_chat");
                assert_eq!(context["rule_id"], "rage_support");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_disconnect_removes_only_own_route() {
        let dispatcher = Dispatcher::default();
        let (old_tx, _old_rx) = mpsc::channel(1);
        let (new_tx, _new_rx) = mpsc::channel(1);
        let old = dispatcher.connect();
        let new = dispatcher.connect();
        dispatcher.register("s1", old, old_tx);
        dispatcher.register("s1", new, new_tx);

        dispatcher.disconnect(old, Some("s1"));
        assert!(dispatcher.has_route("s1"));
        dispatcher.disconnect(new, Some("s1"));
        assert!(!dispatcher.has_route("s1"));
        assert_eq!(dispatcher.connection_count(), 0);
    }

    #[test]
    fn test_full_or_closed_route_is_a_miss() {
        let dispatcher = Dispatcher::default();
        let (tx, rx) = mpsc::channel(1);
        dispatcher.register("s1", 1, tx);

        assert!(dispatcher.send_intervention("s1", "help_chat", json!({})));
        assert!(!dispatcher.send_intervention("s1", "help_chat", json!({})));
        assert!(matches!(
            dispatcher.deliver_intervention("s1", "help_chat", json!({})),
            Err(DispatchError::BufferFull(_))
        ));
        drop(rx);
        assert!(!dispatcher.send_intervention("s1", "help_chat", json!({})));
        assert!(matches!(
            dispatcher.deliver_intervention("s1", "help_chat", json!({})),
            Err(DispatchError::Closed(_))
        ));
        assert!(matches!(
            dispatcher.deliver_intervention("s2", "help_chat", json!({})),
            Err(DispatchError::NoRoute(_))
        ));
    }

    #[tokio::test]
    async fn test_emotion_broadcast() {
        let dispatcher = Dispatcher::default();
        let diagnosis = EmotionDiagnosis::new("rage", 95, "rage_click", 1_000);
        assert_eq!(dispatcher.broadcast_emotion("s1", "t1", &diagnosis), 0);

        let mut a = dispatcher.subscribe_emotions();
        let mut b = dispatcher.subscribe_emotions();
        assert_eq!(dispatcher.broadcast_emotion("s1", "t1", &diagnosis), 2);
        assert_eq!(a.recv().await.unwrap(), b.recv().await.unwrap());
    }

    #[test]
    fn test_envelope_shape() {
        let value = serde_json::to_value(ChannelMessage::Intervention {
            session_id: "s1".into(),
            intervention_type: "discount_modal".into(),
            context: json!({}),
            timestamp: 5,
        })
        .unwrap();
        assert_eq!(value["type"], "intervention");
        assert_eq!(value["timestamp"], 5);

        let inbound: InboundMessage = serde_json::from_str(r#"{"type":"intervention_clicked"}"#).unwrap();
        assert_eq!(inbound, InboundMessage::InterventionClicked { intervention_type: None });
        let ping: InboundMessage = serde_json::from_str(r#"{"type":"ping","timestamp":1}"#).unwrap();
        assert_eq!(ping, InboundMessage::Ping);
    }
}

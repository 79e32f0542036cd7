//! Room-grouped notification dispatcher for live subscribers and sinks

use crate::models::approval::User;
use crate::notify::event::{Room, WorkflowEvent};
use crate::notify::sink::NotificationSink;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A live subscriber connection
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: Uuid,
    pub rooms: HashSet<Room>,
    pub sender: tokio::sync::mpsc::UnboundedSender<String>,
}

/// Best-effort, at-least-once event fan-out. Dispatch runs strictly after the
/// state commit; failures are logged and never surface to workflow callers.
#[derive(Clone)]
pub struct NotificationDispatcher {
    /// Active subscribers: connection_id -> Subscriber
    subscribers: Arc<RwLock<HashMap<Uuid, Subscriber>>>,
    /// Room membership: room -> set of connection_ids
    room_index: Arc<RwLock<HashMap<Room, HashSet<Uuid>>>>,
    /// External delivery sinks (e.g. email)
    sinks: Arc<RwLock<Vec<Arc<dyn NotificationSink>>>>,
}

impl NotificationDispatcher {
    /// Create a new dispatcher
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            room_index: Arc::new(RwLock::new(HashMap::new())),
            sinks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add a notification sink. Failures do not block other delivery.
    pub async fn add_sink(&self, sink: Arc<dyn NotificationSink>) {
        self.sinks.write().await.push(sink);
    }

    /// Register a connection for a user, auto-joining their identity rooms
    pub async fn connect_user(
        &self,
        user: &User,
        sender: tokio::sync::mpsc::UnboundedSender<String>,
    ) -> Uuid {
        let connection_id = Uuid::new_v4();
        let rooms: HashSet<Room> = [
            Room::User(user.id),
            Room::Company(user.company_id),
            Room::Role(user.role),
        ]
        .into_iter()
        .collect();

        {
            let mut room_index = self.room_index.write().await;
            for room in &rooms {
                room_index.entry(*room).or_default().insert(connection_id);
            }
        }

        self.subscribers.write().await.insert(
            connection_id,
            Subscriber {
                id: connection_id,
                rooms,
                sender,
            },
        );
        connection_id
    }

    /// Join one more room (e.g. to watch a specific order)
    pub async fn join_room(&self, connection_id: &Uuid, room: Room) -> Result<(), String> {
        let mut subscribers = self.subscribers.write().await;
        let subscriber = subscribers
            .get_mut(connection_id)
            .ok_or_else(|| format!("Subscriber {} not found", connection_id))?;

        subscriber.rooms.insert(room);

        let mut room_index = self.room_index.write().await;
        room_index.entry(room).or_default().insert(*connection_id);

        Ok(())
    }

    /// Leave a room
    pub async fn leave_room(&self, connection_id: &Uuid, room: Room) -> Result<(), String> {
        let mut subscribers = self.subscribers.write().await;
        let subscriber = subscribers
            .get_mut(connection_id)
            .ok_or_else(|| format!("Subscriber {} not found", connection_id))?;

        subscriber.rooms.remove(&room);

        let mut room_index = self.room_index.write().await;
        if let Some(members) = room_index.get_mut(&room) {
            members.remove(connection_id);
            if members.is_empty() {
                room_index.remove(&room);
            }
        }

        Ok(())
    }

    /// Remove a connection and clean up its room memberships
    pub async fn disconnect(&self, connection_id: &Uuid) {
        if let Some(subscriber) = self.subscribers.write().await.remove(connection_id) {
            let mut room_index = self.room_index.write().await;
            for room in &subscriber.rooms {
                if let Some(members) = room_index.get_mut(room) {
                    members.remove(connection_id);
                    if members.is_empty() {
                        room_index.remove(room);
                    }
                }
            }
        }
    }

    /// Fan one event out to every subscriber in its rooms and to all sinks
    pub async fn dispatch(&self, event: &WorkflowEvent) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize workflow event");
                return;
            }
        };

        // Union of recipients across the event's rooms, deduplicated
        let recipients: HashSet<Uuid> = {
            let room_index = self.room_index.read().await;
            event
                .rooms()
                .iter()
                .filter_map(|room| room_index.get(room))
                .flatten()
                .copied()
                .collect()
        };

        let subscribers = self.subscribers.read().await;
        for connection_id in recipients {
            if let Some(subscriber) = subscribers.get(&connection_id) {
                if let Err(e) = subscriber.sender.send(json.clone()) {
                    tracing::warn!(
                        subscriber = %connection_id,
                        error = %e,
                        "Failed to deliver event to subscriber"
                    );
                }
            }
        }
        drop(subscribers);

        // External sinks: log on failure, never propagate
        let sinks: Vec<Arc<dyn NotificationSink>> = self.sinks.read().await.clone();
        for sink in sinks {
            if let Err(e) = sink.send(event).await {
                tracing::error!(
                    sink = sink.name(),
                    order_id = event.order_id(),
                    error = %e,
                    "sink delivery failed"
                );
            }
        }
    }

    /// Drain an event outbox in order
    pub async fn dispatch_all(&self, events: Vec<WorkflowEvent>) {
        for event in &events {
            self.dispatch(event).await;
        }
    }

    /// Statistics about subscriber connections
    pub async fn stats(&self) -> DispatcherStats {
        let subscribers = self.subscribers.read().await;
        let room_index = self.room_index.read().await;
        DispatcherStats {
            total_subscribers: subscribers.len(),
            active_rooms: room_index.len(),
        }
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about dispatcher state
#[derive(Debug, Clone)]
pub struct DispatcherStats {
    pub total_subscribers: usize,
    pub active_rooms: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::approval::UserRole;
    use chrono::Utc;

    fn test_user(role: UserRole, company_id: i64) -> User {
        User {
            id: Uuid::new_v4(),
            name: "tester".to_string(),
            role,
            company_id,
            is_active: true,
        }
    }

    fn sent_event(order_id: i64, company_id: i64, creator: Uuid) -> WorkflowEvent {
        WorkflowEvent::OrderSent {
            order_id,
            order_number: format!("PO-{}", order_id),
            company_id,
            creator,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_company_room_fan_out() {
        let dispatcher = NotificationDispatcher::new();

        let colleague = test_user(UserRole::FieldWorker, 1);
        let outsider = test_user(UserRole::FieldWorker, 2);

        let (tx1, mut rx1) = tokio::sync::mpsc::unbounded_channel();
        let (tx2, mut rx2) = tokio::sync::mpsc::unbounded_channel();
        dispatcher.connect_user(&colleague, tx1).await;
        dispatcher.connect_user(&outsider, tx2).await;

        dispatcher
            .dispatch(&sent_event(10, 1, Uuid::new_v4()))
            .await;

        let received = rx1.try_recv().unwrap();
        assert!(received.contains("\"order_sent\""));
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_single_delivery_across_overlapping_rooms() {
        let dispatcher = NotificationDispatcher::new();

        let creator = test_user(UserRole::ProjectManager, 1);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let conn = dispatcher.connect_user(&creator, tx).await;
        dispatcher.join_room(&conn, Room::Order(10)).await.unwrap();

        // Creator matches the user room, the company room, and the order room
        dispatcher.dispatch(&sent_event(10, 1, creator.id)).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "event must be delivered once");
    }

    #[tokio::test]
    async fn test_disconnect_cleans_rooms() {
        let dispatcher = NotificationDispatcher::new();

        let user = test_user(UserRole::Executive, 1);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let conn = dispatcher.connect_user(&user, tx).await;

        assert_eq!(dispatcher.stats().await.total_subscribers, 1);

        dispatcher.disconnect(&conn).await;
        let stats = dispatcher.stats().await;
        assert_eq!(stats.total_subscribers, 0);
        assert_eq!(stats.active_rooms, 0);

        dispatcher.dispatch(&sent_event(1, 1, user.id)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_subscribers() {
        struct FailingSink;

        #[async_trait::async_trait]
        impl NotificationSink for FailingSink {
            fn name(&self) -> &str {
                "failing"
            }
            async fn send(&self, _event: &WorkflowEvent) -> anyhow::Result<()> {
                anyhow::bail!("delivery refused")
            }
        }

        let dispatcher = NotificationDispatcher::new();
        dispatcher.add_sink(Arc::new(FailingSink)).await;

        let user = test_user(UserRole::Admin, 1);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        dispatcher.connect_user(&user, tx).await;

        dispatcher.dispatch(&sent_event(1, 1, user.id)).await;
        assert!(rx.try_recv().is_ok());
    }
}

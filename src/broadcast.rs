//! Room-scoped fan-out of freshly stored messages.
//!
//! One broadcast channel per conversation, created lazily on the first join
//! and pruned once nobody listens anymore. The broadcaster keeps no history:
//! a receiver obtained after a publish never sees that publish. Durability
//! lives in the store, this is a notification channel only.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::store::Message;

const ROOM_CAPACITY: usize = 64;

pub struct Broadcaster {
    rooms: Mutex<HashMap<i64, broadcast::Sender<Message>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes to a conversation's room. Leaving is dropping the receiver;
    /// a connection that drops all its receivers is gone from every room.
    pub fn join(&self, conversation_id: i64) -> broadcast::Receiver<Message> {
        let mut rooms = self.rooms.lock().unwrap();
        rooms
            .entry(conversation_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Delivers `message` to everyone currently in the room, at most once
    /// each, no retry. Returns the number of subscribers reached; 0 when the
    /// room is empty or was never joined.
    pub fn publish(&self, conversation_id: i64, message: &Message) -> usize {
        let mut rooms = self.rooms.lock().unwrap();
        let Some(tx) = rooms.get(&conversation_id) else {
            return 0;
        };
        match tx.send(message.clone()) {
            Ok(delivered) => delivered,
            Err(_) => {
                // last receiver is gone, drop the room
                rooms.remove(&conversation_id);
                0
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn room_count(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

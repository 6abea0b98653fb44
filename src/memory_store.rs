//! In-process [`MessageStore`] for local runs without a database file.

use chrono::Utc;
use parking_lot::Mutex;

use crate::message_database::{
    Message, MessagePatch, MessageStore, Messages, NewMessage, StoreError, StoreResult,
};

#[derive(Debug, Default)]
struct MemoryState {
    last_id: i32,
    messages: Messages,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for MemoryStore {
    fn create(&self, new: NewMessage) -> StoreResult<Message> {
        let mut state = self.state.lock();
        let id = state.last_id.checked_add(1).ok_or(StoreError::IdsExhausted)?;
        state.last_id = id;

        let message = Message {
            id,
            body: new.body,
            username: new.username,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.messages.push(message.clone());

        Ok(message)
    }

    fn list(&self) -> StoreResult<Messages> {
        // pushed in id order, which is also creation order
        Ok(self.state.lock().messages.clone())
    }

    fn get(&self, id: i32) -> StoreResult<Message> {
        self.state
            .lock()
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn update(&self, id: i32, patch: MessagePatch) -> StoreResult<Message> {
        let mut state = self.state.lock();
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StoreError::NotFound(id))?;

        if let Some(body) = patch.body {
            message.body = body;
            message.updated_at = Some(Utc::now());
        }

        Ok(message.clone())
    }

    fn delete(&self, id: i32) -> StoreResult<()> {
        let mut state = self.state.lock();
        let idx = state
            .messages
            .iter()
            .position(|m| m.id == id)
            .ok_or(StoreError::NotFound(id))?;
        state.messages.remove(idx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(store: &MemoryStore, body: &str) -> Message {
        store
            .create(NewMessage {
                body: body.to_owned(),
                username: String::from("Liza"),
            })
            .unwrap()
    }

    #[test]
    fn crud_cycle() {
        let store = MemoryStore::new();
        let hello = post(&store, "Hello 👋");
        assert_eq!(store.get(hello.id).unwrap(), hello);

        let patched = store
            .update(
                hello.id,
                MessagePatch {
                    body: Some(String::from("Goodbye 👋")),
                },
            )
            .unwrap();
        assert_eq!(patched.body, "Goodbye 👋");
        assert_eq!(patched.username, "Liza");
        assert_eq!(patched.created_at, hello.created_at);
        assert!(patched.updated_at.is_some());

        store.delete(hello.id).unwrap();
        assert!(matches!(store.get(hello.id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(hello.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn ids_keep_growing_after_delete() {
        let store = MemoryStore::new();
        let first = post(&store, "one");
        let second = post(&store, "two");
        store.delete(second.id).unwrap();

        let third = post(&store, "three");
        assert!(third.id > second.id);

        let ids: Vec<i32> = store.list().unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first.id, third.id]);
    }

    #[test]
    fn running_out_of_ids_is_an_error() {
        let store = MemoryStore::new();
        store.state.lock().last_id = i32::MAX - 1;

        let last = post(&store, "last one");
        assert_eq!(last.id, i32::MAX);

        let overflow = store.create(NewMessage {
            body: String::from("one too many"),
            username: String::from("Liza"),
        });
        assert!(matches!(overflow, Err(StoreError::IdsExhausted)));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn empty_patch_changes_nothing() {
        let store = MemoryStore::new();
        let hello = post(&store, "Hello 👋");

        let same = store.update(hello.id, MessagePatch::default()).unwrap();
        assert_eq!(same, hello);
    }
}

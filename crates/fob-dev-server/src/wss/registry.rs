//! Per-server set of live connections.

use axum::extract::ws::Message;
use fob_multi_compiler::ClientId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Messages buffered per client before sends start failing.
pub const CLIENT_BUFFER: usize = 256;

struct Client<M> {
    tx: mpsc::Sender<Message>,
    meta: M,
}

/// Connected clients of one sub-server, keyed by `client#N` ids.
///
/// Each client carries metadata `M` (the HMR target, peer query parameters,
/// ...). Sends never block: a client whose connection is gone is removed,
/// a client whose buffer is full misses the message.
pub struct ClientRegistry<M> {
    next_id: AtomicUsize,
    clients: RwLock<HashMap<ClientId, Client<M>>>,
}

impl<M> Default for ClientRegistry<M> {
    fn default() -> Self {
        Self {
            next_id: AtomicUsize::new(0),
            clients: RwLock::new(HashMap::new()),
        }
    }
}

impl<M: Clone> ClientRegistry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client and return its id plus the queue its writer drains.
    pub fn register(&self, meta: M) -> (ClientId, mpsc::Receiver<Message>) {
        let id = ClientId::new(format!(
            "client#{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.clients.write().insert(id.clone(), Client { tx, meta });
        (id, rx)
    }

    /// Remove a client. Its writer stops once the queue drains.
    pub fn remove(&self, id: &ClientId) -> bool {
        self.clients.write().remove(id).is_some()
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.clients.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Every connected client with its metadata, sorted by id.
    pub fn entries(&self) -> Vec<(ClientId, M)> {
        let mut entries: Vec<_> = self
            .clients
            .read()
            .iter()
            .map(|(id, client)| (id.clone(), client.meta.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Queue `text` for one client. Returns whether it was queued.
    pub fn send(&self, id: &ClientId, text: &str) -> bool {
        self.broadcast_where(text, |client_id, _| client_id == id) == 1
    }

    /// Queue `text` for every client. Returns how many were reached.
    pub fn broadcast(&self, text: &str) -> usize {
        self.broadcast_where(text, |_, _| true)
    }

    /// Queue `text` for every client matching `filter`.
    ///
    /// Clients whose connection is gone are removed; full buffers are logged
    /// and skipped. Returns how many clients were reached.
    pub fn broadcast_where<F>(&self, text: &str, filter: F) -> usize
    where
        F: Fn(&ClientId, &M) -> bool,
    {
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let clients = self.clients.read();
            for (id, client) in clients.iter() {
                if !filter(id, &client.meta) {
                    continue;
                }

                match client.tx.try_send(Message::Text(text.into())) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(client = %id, "client is not keeping up, dropping message");
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(client = %id, "write to closed connection skipped");
                        closed.push(id.clone());
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut clients = self.clients.write();
            for id in closed {
                clients.remove(&id);
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(message: Message) -> String {
        match message {
            Message::Text(text) => text.as_str().to_string(),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_ids_are_sequential() {
        let registry = ClientRegistry::new();
        let (a, _rx_a) = registry.register(());
        let (b, _rx_b) = registry.register(());
        assert_eq!(a.as_str(), "client#0");
        assert_eq!(b.as_str(), "client#1");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_broadcast_where_filters() {
        let registry = ClientRegistry::new();
        let (_, mut android) = registry.register("android".to_string());
        let (_, mut ios) = registry.register("ios".to_string());

        let delivered = registry.broadcast_where("hello", |_, target| target == "ios");
        assert_eq!(delivered, 1);
        assert_eq!(text(ios.try_recv().unwrap()), "hello");
        assert!(android.try_recv().is_err());
    }

    #[test]
    fn test_closed_clients_are_removed() {
        let registry = ClientRegistry::new();
        let (gone, rx) = registry.register(());
        let (alive, _rx) = registry.register(());
        drop(rx);

        assert_eq!(registry.broadcast("ping"), 1);
        assert!(!registry.contains(&gone));
        assert!(registry.contains(&alive));
        assert!(!registry.send(&gone, "ping"));
    }

    #[test]
    fn test_full_buffer_skips_client() {
        let registry = ClientRegistry::new();
        let (id, _rx) = registry.register(());
        for _ in 0..CLIENT_BUFFER {
            assert!(registry.send(&id, "x"));
        }
        assert!(!registry.send(&id, "x"));
        assert!(registry.contains(&id));
    }
}

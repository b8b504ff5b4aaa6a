//! Replication graph: decide who receives which bytes, not how they are encoded.
//!
//! This crate drives one [`Encoder`] for many clients. Each tick produces a
//! shared patch, a per-view suffix for filtered clients, and the full state
//! for clients that joined since the previous tick.

use std::collections::BTreeMap;
use std::fmt;

use codec::{CodecError, Encoder, NodeId, State, View};
use schema::ViewTag;

/// Result type for replication graph operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Client identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Replication graph configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationConfig {
    /// Maximum clients tracked at once (hard safety cap).
    pub max_clients: usize,
}

impl ReplicationConfig {
    #[must_use]
    pub const fn default_limits() -> Self {
        Self { max_clients: 4096 }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self::default_limits()
    }
}

/// Errors raised by the replication graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationError {
    /// Client was never registered or has been removed.
    UnknownClient { client: ClientId },
    /// Registering another client would exceed the configured cap.
    TooManyClients { max: usize },
    /// Visibility change rejected by the codec.
    Codec(CodecError),
}

impl fmt::Display for ReplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownClient { client } => write!(f, "unknown client {client}"),
            Self::TooManyClients { max } => write!(f, "client limit of {max} reached"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
        }
    }
}

impl std::error::Error for ReplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodecError> for ReplicationError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err)
    }
}

/// Whether a packet replaces the client's state or patches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Full,
    Patch,
}

/// Bytes to deliver to one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientPacket {
    pub client: ClientId,
    pub kind: PacketKind,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
struct ClientState {
    view: Option<View>,
    needs_full: bool,
}

/// Multi-client driver around one encoder.
///
/// Mutate the shared state through [`state_mut`](Self::state_mut), then call
/// [`tick`](Self::tick) once per network frame.
#[derive(Debug)]
pub struct ReplicationGraph {
    config: ReplicationConfig,
    encoder: Encoder,
    clients: BTreeMap<ClientId, ClientState>,
}

impl ReplicationGraph {
    #[must_use]
    pub fn new(encoder: Encoder, config: ReplicationConfig) -> Self {
        Self {
            config,
            encoder,
            clients: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn state_mut(&mut self) -> &mut State {
        self.encoder.state_mut()
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn contains_client(&self, client: ClientId) -> bool {
        self.clients.contains_key(&client)
    }

    /// Registers a client or changes whether it is filtered.
    ///
    /// A new client receives the full state on the next tick. Filtered
    /// clients only see filtered nodes and tagged fields granted through
    /// [`show`](Self::show).
    pub fn upsert_client(&mut self, client: ClientId, filtered: bool) -> ReplicationResult<()> {
        if let Some(state) = self.clients.get_mut(&client) {
            match (filtered, state.view.is_some()) {
                (true, false) => state.view = Some(View::new()),
                (false, true) => state.view = None,
                _ => {}
            }
            return Ok(());
        }
        if self.clients.len() >= self.config.max_clients {
            return Err(ReplicationError::TooManyClients {
                max: self.config.max_clients,
            });
        }
        self.clients.insert(
            client,
            ClientState {
                view: filtered.then(View::new),
                needs_full: true,
            },
        );
        tracing::debug!(%client, filtered, "client registered");
        Ok(())
    }

    /// Forgets a client. Returns `false` if it was not registered.
    pub fn remove_client(&mut self, client: ClientId) -> bool {
        let removed = self.clients.remove(&client).is_some();
        if removed {
            tracing::debug!(%client, "client removed");
        }
        removed
    }

    /// Makes `node` visible to a client, filtering it from now on if it was not.
    pub fn show(&mut self, client: ClientId, node: NodeId) -> ReplicationResult<()> {
        self.show_with_tag(client, node, ViewTag::DEFAULT)
    }

    /// Grants `tag` on `node` to a client.
    pub fn show_with_tag(
        &mut self,
        client: ClientId,
        node: NodeId,
        tag: ViewTag,
    ) -> ReplicationResult<()> {
        let entry = self
            .clients
            .get_mut(&client)
            .ok_or(ReplicationError::UnknownClient { client })?;
        let view = entry.view.get_or_insert_with(View::new);
        view.add_with_tag(self.encoder.state(), node, tag)?;
        Ok(())
    }

    /// Hides `node` from a client; the client receives deletes on the next tick.
    pub fn hide(&mut self, client: ClientId, node: NodeId) -> ReplicationResult<()> {
        self.hide_with_tag(client, node, ViewTag::DEFAULT)
    }

    pub fn hide_with_tag(
        &mut self,
        client: ClientId,
        node: NodeId,
        tag: ViewTag,
    ) -> ReplicationResult<()> {
        let entry = self
            .clients
            .get_mut(&client)
            .ok_or(ReplicationError::UnknownClient { client })?;
        if let Some(view) = &mut entry.view {
            view.remove_with_tag(self.encoder.state(), node, tag)?;
        }
        Ok(())
    }

    /// Encodes one frame for every client.
    ///
    /// Established clients get the shared patch, extended with their view's
    /// filtered operations when they are filtered. Empty patches are not
    /// emitted. Clients registered since the last tick get the full state
    /// instead, which already contains this tick's changes.
    pub fn tick(&mut self) -> Vec<ClientPacket> {
        let mut packets = Vec::with_capacity(self.clients.len());

        let shared = self.encoder.encode().to_vec();
        for (&client, state) in &mut self.clients {
            if state.needs_full {
                continue;
            }
            let bytes = match &mut state.view {
                Some(view) => self.encoder.encode_view(view, shared.len()).to_vec(),
                None => shared.clone(),
            };
            if !bytes.is_empty() {
                packets.push(ClientPacket {
                    client,
                    kind: PacketKind::Patch,
                    bytes,
                });
            }
        }
        self.encoder.discard_changes();

        let joiners = self.clients.values().filter(|state| state.needs_full).count();
        if joiners > 0 {
            let full = self.encoder.encode_all().to_vec();
            for (&client, state) in &mut self.clients {
                if !state.needs_full {
                    continue;
                }
                state.needs_full = false;
                let bytes = match &mut state.view {
                    Some(view) => self.encoder.encode_all_view(view, full.len()).to_vec(),
                    None => full.clone(),
                };
                packets.push(ClientPacket {
                    client,
                    kind: PacketKind::Full,
                    bytes,
                });
            }
        }

        tracing::trace!(
            shared = shared.len(),
            packets = packets.len(),
            joiners,
            "replication tick"
        );
        packets
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use schema::{FieldDef, FieldType, TypeDef, TypeRegistry};

    use super::*;

    fn graph(max_clients: usize) -> ReplicationGraph {
        let registry = TypeRegistry::builder()
            .register(TypeDef::new("Room").field(FieldDef::new("round", FieldType::number())))
            .build()
            .unwrap();
        let state = State::new(Arc::new(registry), "Room").unwrap();
        ReplicationGraph::new(Encoder::new(state), ReplicationConfig { max_clients })
    }

    #[test]
    fn client_cap_is_enforced() {
        let mut graph = graph(1);
        graph.upsert_client(ClientId(1), false).unwrap();
        graph.upsert_client(ClientId(1), true).unwrap();
        assert_eq!(
            graph.upsert_client(ClientId(2), false),
            Err(ReplicationError::TooManyClients { max: 1 })
        );
        assert_eq!(graph.client_count(), 1);
    }

    #[test]
    fn unknown_client_is_reported() {
        let mut graph = graph(4);
        let root = graph.encoder().state().root();
        assert_eq!(
            graph.show(ClientId(9), root),
            Err(ReplicationError::UnknownClient { client: ClientId(9) })
        );
        assert!(!graph.remove_client(ClientId(9)));
    }

    #[test]
    fn joiner_gets_full_then_patches() {
        let mut graph = graph(4);
        let root = graph.encoder().state().root();
        graph.state_mut().set(root, "round", 1).unwrap();
        graph.upsert_client(ClientId(1), false).unwrap();

        let packets = graph.tick();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].kind, PacketKind::Full);
        assert_eq!(packets[0].bytes, vec![0x80, 1]);

        assert!(graph.tick().is_empty());

        graph.state_mut().set(root, "round", 2).unwrap();
        let packets = graph.tick();
        assert_eq!(packets[0].kind, PacketKind::Patch);
        assert_eq!(packets[0].bytes, vec![0x80, 2]);
    }

    #[test]
    fn error_display() {
        let err = ReplicationError::UnknownClient { client: ClientId(3) };
        assert_eq!(err.to_string(), "unknown client client#3");
    }
}

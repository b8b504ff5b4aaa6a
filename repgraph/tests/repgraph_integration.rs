use std::collections::BTreeMap;
use std::sync::Arc;

use codec::{Decoder, Encoder, NodeId, State, Value};
use repgraph::{ClientId, ClientPacket, PacketKind, ReplicationConfig, ReplicationGraph};
use schema::{ChildType, FieldDef, FieldType, TypeDef, TypeRegistry};

fn registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::builder()
        .register(
            TypeDef::new("Player")
                .field(FieldDef::new("name", FieldType::string()))
                .field(FieldDef::new("hand", FieldType::string()).view()),
        )
        .register(
            TypeDef::new("Room")
                .field(FieldDef::new("round", FieldType::number()))
                .field(FieldDef::new("players", FieldType::map(ChildType::schema("Player")))),
        )
        .build()
        .unwrap();
    Arc::new(registry)
}

struct Harness {
    graph: ReplicationGraph,
    decoders: BTreeMap<ClientId, Decoder>,
    player: NodeId,
}

impl Harness {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let mut state = State::new(registry(), "Room").unwrap();
        let root = state.root();
        let players = state.create_field(root, "players").unwrap();
        let player = state.create("Player").unwrap();
        state.set(player, "name", "ada").unwrap();
        state.set(player, "hand", "king").unwrap();
        state.map(players).unwrap().insert("ada", player).unwrap();
        Self {
            graph: ReplicationGraph::new(Encoder::new(state), ReplicationConfig::default_limits()),
            decoders: BTreeMap::new(),
            player,
        }
    }

    fn join(&mut self, client: ClientId, filtered: bool) {
        self.graph.upsert_client(client, filtered).unwrap();
        self.decoders
            .insert(client, Decoder::new(registry(), "Room").unwrap());
    }

    fn tick(&mut self) -> Vec<ClientPacket> {
        let packets = self.graph.tick();
        for packet in &packets {
            let decoder = self.decoders.get_mut(&packet.client).unwrap();
            decoder.decode(&packet.bytes);
            assert_eq!(decoder.mismatch_count(), 0, "{packet:?}");
        }
        packets
    }

    fn hand(&self, client: ClientId) -> Option<&Value> {
        let decoder = &self.decoders[&client];
        let graph = decoder.graph();
        let players = graph.child(decoder.root(), "players")?;
        let player = graph.map_get(players, "ada").and_then(Value::as_node)?;
        graph.get(player, "hand")
    }
}

#[test]
fn clients_receive_full_state_then_patches() {
    let mut harness = Harness::new();
    harness.join(ClientId(1), false);
    harness.join(ClientId(2), true);
    harness.graph.show(ClientId(2), harness.player).unwrap();

    let packets = harness.tick();
    assert_eq!(packets.len(), 2);
    assert!(packets.iter().all(|packet| packet.kind == PacketKind::Full));
    assert_eq!(harness.hand(ClientId(1)), None);
    assert_eq!(harness.hand(ClientId(2)), Some(&Value::from("king")));

    let root = harness.graph.encoder().state().root();
    harness.graph.state_mut().set(root, "round", 2).unwrap();
    let player = harness.player;
    harness.graph.state_mut().set(player, "hand", "ace").unwrap();
    let packets = harness.tick();
    assert_eq!(packets.len(), 2);
    assert!(packets.iter().all(|packet| packet.kind == PacketKind::Patch));
    assert!(packets[1].bytes.len() > packets[0].bytes.len());
    assert_eq!(harness.hand(ClientId(1)), None);
    assert_eq!(harness.hand(ClientId(2)), Some(&Value::from("ace")));

    for decoder in harness.decoders.values() {
        assert_eq!(decoder.get(decoder.root(), "round"), Some(&Value::Int(2)));
    }
}

#[test]
fn mid_session_joiner_matches_established_clients() {
    let mut harness = Harness::new();
    harness.join(ClientId(1), false);
    harness.tick();

    let root = harness.graph.encoder().state().root();
    harness.graph.state_mut().set(root, "round", 5).unwrap();
    harness.join(ClientId(3), false);
    let packets = harness.tick();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].kind, PacketKind::Patch);
    assert_eq!(packets[1].kind, PacketKind::Full);

    let established = harness.decoders[&ClientId(1)].snapshot();
    assert_eq!(harness.decoders[&ClientId(3)].snapshot(), established);
    let decoder = &harness.decoders[&ClientId(3)];
    assert_eq!(decoder.get(decoder.root(), "round"), Some(&Value::Int(5)));
}

#[test]
fn hidden_node_is_deleted_for_that_client() {
    let mut harness = Harness::new();
    harness.join(ClientId(2), true);
    harness.graph.show(ClientId(2), harness.player).unwrap();
    harness.tick();
    assert!(harness.hand(ClientId(2)).is_some());

    harness.graph.hide(ClientId(2), harness.player).unwrap();
    let packets = harness.tick();
    assert_eq!(packets.len(), 1);
    assert_eq!(harness.hand(ClientId(2)), None);

    let player = harness.player;
    harness.graph.state_mut().set(player, "hand", "queen").unwrap();
    assert!(harness.tick().is_empty());
    assert_eq!(harness.hand(ClientId(2)), None);
}

#[test]
fn removed_client_gets_nothing() {
    let mut harness = Harness::new();
    harness.join(ClientId(1), false);
    harness.join(ClientId(2), false);
    harness.tick();

    assert!(harness.graph.remove_client(ClientId(2)));
    let root = harness.graph.encoder().state().root();
    harness.graph.state_mut().set(root, "round", 9).unwrap();
    let packets = harness.tick();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].client, ClientId(1));
}

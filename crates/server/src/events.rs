use std::collections::BTreeSet;

use spacegame::net::LaserRecord;
use spacegame::PeerId;

use crate::registry::EntityId;

/// State changes batched until the next broadcast window.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    SpawnPlayer(EntityId),
    DespawnPlayer(EntityId),
    /// Despawn, move back to the spawn point, spawn again.
    Respawn(EntityId),
    SpawnLaser(LaserRecord),
    DespawnLaser(EntityId),
    Collision { shooter: EntityId, victim: EntityId },
}

#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<GameEvent>,
    respawns: BTreeSet<EntityId>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repeated respawns of one entity within a window collapse into the first.
    pub fn push(&mut self, event: GameEvent) {
        if let GameEvent::Respawn(id) = event {
            if !self.respawns.insert(id) {
                return;
            }
        }
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<GameEvent> {
        self.respawns.clear();
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Things worth showing an operator.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    PlayerJoined { peer: PeerId, entity_id: EntityId },
    PlayerLeft { entity_id: EntityId },
    PlayerHit { shooter: EntityId, victim: EntityId },
    PlayerCrashed { entity_id: EntityId },
    Chat { entity_id: Option<EntityId>, text: String },
}

impl ServerEvent {
    pub fn describe(&self) -> String {
        match self {
            ServerEvent::PlayerJoined { peer, entity_id } => {
                format!("Peer {} joined as ship {}", peer.0, entity_id)
            }
            ServerEvent::PlayerLeft { entity_id } => format!("Ship {} left", entity_id),
            ServerEvent::PlayerHit { shooter, victim } => {
                format!("Ship {} shot ship {}", shooter, victim)
            }
            ServerEvent::PlayerCrashed { entity_id } => format!("Ship {} crashed", entity_id),
            ServerEvent::Chat { entity_id, text } => match entity_id {
                Some(id) => format!("[{}] {}", id, text),
                None => format!("[?] {}", text),
            },
        }
    }
}

//! Identity types for game actors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of entity an actor represents.
///
/// Discriminants above [`ActorKind::SEPARATOR`] are global kinds: exactly one
/// actor of that kind exists per server, addressed with [`EntityKey::global`].
/// Everything below is a per-entity kind with one actor per entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActorKind {
    /// A player role (character).
    Role = 1,
    /// A connected player.
    Player = 2,
    /// A login account.
    Account = 3,
    /// A guild.
    Guild = 4,
    /// Server-wide singleton; owns the online roster.
    Server = 129,
    /// Login bookkeeping singleton.
    Login = 130,
}

impl ActorKind {
    /// Boundary between per-entity and global kinds.
    pub const SEPARATOR: u8 = 128;

    /// Every kind, in discriminant order.
    pub const ALL: [ActorKind; 6] = [
        ActorKind::Role,
        ActorKind::Player,
        ActorKind::Account,
        ActorKind::Guild,
        ActorKind::Server,
        ActorKind::Login,
    ];

    /// Numeric code of this kind.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a numeric code.
    pub fn from_code(code: u8) -> Option<ActorKind> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Returns `true` for server-wide singleton kinds.
    pub fn is_global(self) -> bool {
        self.code() > Self::SEPARATOR
    }

    /// Lowercase name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            ActorKind::Role => "role",
            ActorKind::Player => "player",
            ActorKind::Account => "account",
            ActorKind::Guild => "guild",
            ActorKind::Server => "server",
            ActorKind::Login => "login",
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unique address of one actor: `(kind, id)`.
///
/// At most one actor exists per key at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    /// Kind of the entity.
    pub kind: ActorKind,
    /// Entity id, unique within the kind.
    pub id: i64,
}

impl EntityKey {
    /// Multiplier separating the server id from the kind in global ids.
    pub const GLOBAL_ID_FACTOR: i64 = 1000;

    /// Key for a per-entity actor.
    pub fn new(kind: ActorKind, id: i64) -> Self {
        Self { kind, id }
    }

    /// Key of the singleton actor of a global kind on `server_id`.
    ///
    /// The id is `server_id * 1000 + kind`, so singletons of different
    /// servers never collide in a shared store.
    pub fn global(kind: ActorKind, server_id: i32) -> Self {
        Self {
            kind,
            id: i64::from(server_id) * Self::GLOBAL_ID_FACTOR + i64::from(kind.code()),
        }
    }

    /// Returns `true` if this key addresses a global singleton.
    pub fn is_global(&self) -> bool {
        self.kind.is_global()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

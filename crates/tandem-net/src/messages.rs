//! Wire messages and their codec.
//!
//! Every message on the wire is `[opcode: u8][postcard payload]`. Decoding
//! ignores bytes after the payload so newer peers can append fields.
//! Use [`encode_message`] and [`decode_message`].

use serde::{Deserialize, Serialize};

use crate::item::{ItemSource, ItemTree};
use crate::quantize::{PackedDir, QuantVec3};
use crate::transport::Delivery;

/// Protocol version exchanged in [`ClientHello`].
pub const PROTOCOL_VERSION: u16 = 1;

/// Bytes reserved for the opcode and entry count of a snapshot batch.
pub const BATCH_HEADER_LEN: usize = 6;

/// Network id of a replicated object. Zero is never a valid id.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NetId(pub u32);

impl NetId {
    /// The reserved invalid id.
    pub const INVALID: NetId = NetId(0);

    /// Whether this id may refer to an object.
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for NetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Opcode table
// ---------------------------------------------------------------------------

macro_rules! protocol {
    ($( $(#[$doc:meta])* $code:literal => $name:ident ),* $(,)?) => {
        /// One-byte message tag.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $code, )*
        }

        impl Opcode {
            /// Parse a tag byte.
            pub fn from_u8(v: u8) -> Option<Self> {
                match v {
                    $( $code => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Every opcode, in tag order.
            pub const ALL: &'static [Opcode] = &[$( Opcode::$name, )*];
        }

        /// A decoded protocol message. Variant names match their payload types.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message {
            $( $(#[$doc])* $name($name), )*
        }

        impl Message {
            /// Tag of this message.
            pub fn opcode(&self) -> Opcode {
                match self {
                    $( Message::$name(_) => Opcode::$name, )*
                }
            }

            fn encode_payload(&self) -> Result<Vec<u8>, postcard::Error> {
                match self {
                    $( Message::$name(p) => postcard::to_allocvec(p), )*
                }
            }

            fn decode_payload(op: Opcode, bytes: &[u8]) -> Result<Self, postcard::Error> {
                match op {
                    $( Opcode::$name => postcard::take_from_bytes::<$name>(bytes)
                        .map(|(p, _rest)| Message::$name(p)), )*
                }
            }
        }

        $(
            impl From<$name> for Message {
                fn from(p: $name) -> Self {
                    Message::$name(p)
                }
            }
        )*
    };
}

protocol! {
    // --- Session ---
    /// Client introduces itself after connecting.
    1 => ClientHello,
    /// Host accepts a client.
    2 => Welcome,
    /// Host broadcasts every participant's status.
    3 => PlayerList,
    /// Client reports its own status.
    4 => ClientStatus,
    /// Player position update.
    5 => PlayerPosition,
    /// Player animation update.
    6 => PlayerAnim,
    /// A participant left.
    7 => PlayerLeft,
    /// Host asks a client to move to the host's scene.
    8 => SceneNudge,
    /// Latency probe.
    9 => Ping,
    /// Latency probe answer.
    10 => Pong,

    // --- Health ---
    /// Client reports its own health to the host.
    20 => HealthReport,
    /// Host tells a player its authoritative health.
    21 => SelfHealth,
    /// Host tells peers another player's health.
    22 => RemoteHealth,
    /// Host broadcasts an AI actor's health.
    23 => AiHealth,
    /// Client reports damage it dealt to a host AI actor.
    24 => AiDamage,

    // --- AI ---
    /// Host announces an AI actor.
    30 => AiLoadout,
    /// Batched AI transforms.
    31 => AiTransforms,
    /// Batched AI animation state.
    32 => AiAnimations,
    /// AI attack swing replay.
    33 => AiAttack,
    /// Reliable transform correction burst.
    34 => AiTransformBurst,
    /// AI actor removed.
    35 => AiDespawn,
    /// Client asks for every AI loadout in its scene.
    36 => AiSnapshotRequest,

    // --- Buffs ---
    /// Apply a timed buff to a player or AI actor.
    40 => BuffApply,

    // --- Loot ---
    /// Client opens a container.
    50 => LootOpenRequest,
    /// Full container contents.
    51 => LootState,
    /// Client puts an item into a container.
    52 => LootPutRequest,
    /// Put acknowledged.
    53 => LootPutOk,
    /// Client takes an item out of a container.
    54 => LootTakeRequest,
    /// Take acknowledged with the taken item.
    55 => LootTakeOk,
    /// Client splits a stack inside a container.
    56 => LootSplitRequest,
    /// Split acknowledged.
    57 => LootSplitOk,
    /// Client attaches an item to a weapon slot.
    58 => SlotPlugRequest,
    /// Plug acknowledged.
    59 => SlotPlugOk,
    /// Client detaches an item from a weapon slot.
    60 => SlotUnplugRequest,
    /// Unplug acknowledged with the detached item.
    61 => SlotUnplugOk,
    /// A loot request was rejected.
    62 => LootDeny,
    /// Client asks for a fresh container state.
    63 => LootResyncRequest,
    /// Host spawned a loot container.
    64 => LootContainerSpawned,
}

impl Opcode {
    /// Delivery class used when sending this message.
    pub fn delivery(self) -> Delivery {
        match self {
            Opcode::PlayerPosition
            | Opcode::PlayerAnim
            | Opcode::AiTransforms
            | Opcode::AiAnimations => Delivery::Unreliable,
            _ => Delivery::Reliable,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared payload pieces
// ---------------------------------------------------------------------------

/// Replicated state of one participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatus {
    /// Stable unique endpoint id.
    pub endpoint_id: String,
    /// Name shown to other players.
    pub display_name: String,
    /// Last known position.
    pub position: QuantVec3,
    /// Facing direction.
    pub facing: PackedDir,
    /// Whether the player is in a playable scene.
    pub in_game: bool,
    /// Raw scene id.
    pub scene_id: String,
    /// Opaque cosmetic payload.
    pub cosmetic: Vec<u8>,
    /// Equipped item type ids.
    pub equipment: Vec<i32>,
    /// Weapon item type ids.
    pub weapons: Vec<i32>,
    /// Round trip time to the host.
    pub latency_ms: u32,
}

/// Compact animation parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimState {
    /// Locomotion speed.
    pub speed: f32,
    /// Strafe direction X.
    pub dir_x: f32,
    /// Strafe direction Y.
    pub dir_y: f32,
    /// Hand pose index.
    pub hand_state: u8,
    /// Bit flags (aiming, reloading, dashing...).
    pub flags: u8,
}

/// One AI transform entry in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AiTransformEntry {
    /// AI id.
    pub id: NetId,
    /// Position.
    pub position: QuantVec3,
    /// Facing.
    pub facing: PackedDir,
}

/// One AI animation entry in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AiAnimEntry {
    /// AI id.
    pub id: NetId,
    /// Animation parameters.
    pub anim: AnimState,
}

/// An item at a container slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotItem {
    /// Slot index.
    pub slot: u16,
    /// The item.
    pub item: ItemTree,
}

/// Recipient of a buff.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuffTarget {
    /// A player, by endpoint id.
    Player(String),
    /// An AI actor.
    Ai(NetId),
}

// ---------------------------------------------------------------------------
// Session payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientHello {
    pub endpoint_id: String,
    pub display_name: String,
    pub scene_id: String,
    pub protocol_version: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    pub host_endpoint: String,
    pub statuses: Vec<PlayerStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerList {
    pub statuses: Vec<PlayerStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub status: PlayerStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPosition {
    pub endpoint_id: String,
    pub position: QuantVec3,
    pub facing: PackedDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAnim {
    pub endpoint_id: String,
    pub anim: AnimState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLeft {
    pub endpoint_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNudge {
    /// Scene the client should load.
    pub scene_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub seq: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// Sequence number echoed from the ping.
    pub seq: u32,
}

// ---------------------------------------------------------------------------
// Health payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub max: f32,
    pub current: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelfHealth {
    pub max: f32,
    pub current: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteHealth {
    pub endpoint_id: String,
    pub max: f32,
    pub current: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AiHealth {
    pub id: NetId,
    pub max: f32,
    pub current: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AiDamage {
    pub id: NetId,
    pub amount: f32,
}

// ---------------------------------------------------------------------------
// AI payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiLoadout {
    pub id: NetId,
    pub scene_id: String,
    pub position: QuantVec3,
    pub facing: PackedDir,
    /// Asset key of the character model.
    pub model_key: String,
    pub weapons: Vec<i32>,
    pub face: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiTransforms {
    pub entries: Vec<AiTransformEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnimations {
    pub entries: Vec<AiAnimEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AiAttack {
    pub id: NetId,
    pub weapon_slot: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiTransformBurst {
    pub entries: Vec<AiTransformEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AiDespawn {
    pub id: NetId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSnapshotRequest {
    pub scene_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffApply {
    pub target: BuffTarget,
    pub buff_id: i32,
    /// Seconds.
    pub duration: f32,
}

// ---------------------------------------------------------------------------
// Loot payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LootOpenRequest {
    pub container: NetId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootState {
    pub container: NetId,
    pub capacity: u16,
    pub items: Vec<SlotItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootPutRequest {
    pub container: NetId,
    pub token: u32,
    /// Target slot, or the first free slot when `None`.
    pub slot: Option<u16>,
    pub source: ItemSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LootPutOk {
    pub token: u32,
    pub container: NetId,
    pub slot: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LootTakeRequest {
    pub container: NetId,
    pub token: u32,
    pub slot: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootTakeOk {
    pub token: u32,
    pub container: NetId,
    pub item: ItemTree,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LootSplitRequest {
    pub container: NetId,
    pub token: u32,
    pub slot: u16,
    pub count: u16,
    pub dest_slot: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LootSplitOk {
    pub token: u32,
    pub container: NetId,
    pub dest_slot: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotPlugRequest {
    pub container: NetId,
    pub token: u32,
    /// Container slot holding the weapon.
    pub weapon_slot: u16,
    pub slot_key: String,
    pub source: ItemSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotPlugOk {
    pub token: u32,
    pub container: NetId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotUnplugRequest {
    pub container: NetId,
    pub token: u32,
    pub weapon_slot: u16,
    pub slot_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotUnplugOk {
    pub token: u32,
    pub container: NetId,
    pub item: ItemTree,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootDeny {
    pub token: u32,
    pub container: NetId,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LootResyncRequest {
    pub container: NetId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootContainerSpawned {
    pub container: NetId,
    /// AI actor the container dropped from, or invalid for scene-placed containers.
    pub actor_id: NetId,
    pub scene_id: String,
    pub position: QuantVec3,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Errors that can occur when decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The buffer was empty.
    #[error("empty message")]
    EmptyPayload,

    /// The opcode byte is not in the table.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// The payload does not match the opcode's schema.
    #[error("malformed {opcode:?} payload: {source}")]
    Malformed {
        /// Opcode being decoded.
        opcode: Opcode,
        /// Postcard failure.
        source: postcard::Error,
    },

    /// Encoding failed.
    #[error("encode error: {0}")]
    Encode(#[from] postcard::Error),
}

/// Encode a message as `[opcode][payload]`.
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, MessageError> {
    let payload = msg.encode_payload()?;
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(msg.opcode() as u8);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Read only the opcode byte.
pub fn peek_opcode(data: &[u8]) -> Result<Opcode, MessageError> {
    let &tag = data.first().ok_or(MessageError::EmptyPayload)?;
    Opcode::from_u8(tag).ok_or(MessageError::UnknownOpcode(tag))
}

/// Decode a message. Trailing bytes after the payload are ignored.
pub fn decode_message(data: &[u8]) -> Result<Message, MessageError> {
    let opcode = peek_opcode(data)?;
    Message::decode_payload(opcode, &data[1..])
        .map_err(|source| MessageError::Malformed { opcode, source })
}

/// Encoded size of a serializable value, without the opcode.
pub fn encoded_len<T: Serialize>(value: &T) -> usize {
    postcard::to_allocvec(value).map_or(usize::MAX, |v| v.len())
}

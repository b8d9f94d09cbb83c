//! Message routing
//!
//! Room-control commands go to the [`RoomManager`]; everything else is
//! forwarded untouched to the sender's room peers with `sender` stamped on.

use tracing::debug;

use pairline_core::{ClientMessage, RelayKind, ServerMessage, SignalError};

use crate::registry::ConnectionRegistry;
use crate::room::{LeaveOutcome, RoomManager};

/// Handle one raw frame from `sender`.
///
/// Errors are meant for the sender only; nothing else has been sent when
/// one is returned.
pub fn route(
    registry: &mut ConnectionRegistry,
    rooms: &mut RoomManager,
    sender: &str,
    text: &str,
) -> Result<(), SignalError> {
    match ClientMessage::parse(text)? {
        ClientMessage::CreateRoom { room_id } => {
            let room_id = rooms.create(registry, sender, room_id.as_deref())?;
            registry.send(
                sender,
                &ServerMessage::RoomCreated {
                    room_id,
                    client_id: sender.to_string(),
                },
            );
        }

        ClientMessage::JoinRoom { room_id } => {
            let outcome = rooms.join(registry, sender, &room_id)?;

            registry.send(
                sender,
                &ServerMessage::RoomJoined {
                    room_id: outcome.room_id.clone(),
                    client_id: sender.to_string(),
                    other_clients: outcome.other_members,
                },
            );

            let joined = ServerMessage::PeerJoined {
                room_id: outcome.room_id,
                client_id: sender.to_string(),
                total_clients: outcome.members.len(),
            };
            for member in &outcome.members {
                registry.send(member, &joined);
            }
        }

        ClientMessage::ListRooms => {
            let list = ServerMessage::RoomList {
                rooms: rooms.list(),
                total_rooms: rooms.len(),
                total_clients: registry.len(),
            };
            registry.send(sender, &list);
        }

        ClientMessage::Relay(relay) => {
            let conn = registry
                .get(sender)
                .ok_or_else(|| SignalError::ConnectionNotFound(sender.to_string()))?;
            let room = conn
                .room_id()
                .and_then(|room_id| rooms.get(room_id))
                .ok_or(SignalError::NotInRoom)?;

            let peers = room.others(sender);
            let payload = relay.stamped(sender)?;
            for peer in &peers {
                registry.send_text(peer, payload.clone());
            }

            if relay.kind != RelayKind::Ping {
                debug!(
                    "Relayed {} from {} to {} peer(s) in room {}",
                    relay.kind,
                    sender,
                    peers.len(),
                    room.id()
                );
            }

            if relay.kind == RelayKind::Hangup {
                leave_room(registry, rooms, sender);
            }
        }
    }

    Ok(())
}

/// Take `conn_id` out of its room and tell the remaining members
pub fn leave_room(
    registry: &mut ConnectionRegistry,
    rooms: &mut RoomManager,
    conn_id: &str,
) -> Option<LeaveOutcome> {
    let outcome = rooms.leave(registry, conn_id)?;

    let departed = ServerMessage::PeerDisconnected {
        client_id: conn_id.to_string(),
        room_id: outcome.room_id.clone(),
    };
    for member in &outcome.remaining {
        registry.send(member, &departed);
    }

    Some(outcome)
}

//! Session broker behind `/websocket`.
//!
//! ```text
//!   connect ──► SiteIdMessage { siteId }
//!   SessionInit ──► open room (archive kept for later joiners)
//!   SessionJoin ──► ZippedDataMessage { users, data } to the joiner
//!                   success envelope to everyone else
//!   other actions ──► success envelope to everyone else in the room
//!   SessionLeave / disconnect ──► leave envelope, room dropped when empty
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use covscode_core::{Action, ActionEnvelope, ActionKind, Message, Participant, SiteIdMessage, ZippedDataMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use super::room::{RepoRoom, RoomFrame};
use super::{BoxError, RelayActivity, RelayState};

pub const REPO_ALREADY_EXISTS: &str = "REPO_ALREADY_EXISTS";
pub const REPO_NOT_FOUND: &str = "REPO_NOT_FOUND";

struct Membership {
    room: Arc<RepoRoom>,
    rx: broadcast::Receiver<Arc<RoomFrame>>,
    user: Participant,
}

/// Short id handed to a connection as its site id.
pub fn site_id_for(conn: &Uuid) -> String {
    conn.simple().to_string().chars().take(8).collect()
}

fn encode(message: Message) -> Option<String> {
    match message.encode() {
        Ok(text) => Some(text),
        Err(e) => {
            log::error!("Failed to encode {}: {e}", message.kind_name());
            None
        }
    }
}

fn envelope(envelope: ActionEnvelope) -> Option<String> {
    encode(Message::Envelope(envelope))
}

pub(crate) async fn serve(
    ws_stream: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    state: Arc<RelayState>,
) -> Result<(), BoxError> {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let conn = Uuid::new_v4();
    let site_id = site_id_for(&conn);

    let hello = Message::SiteIdentity(SiteIdMessage { site_id: site_id.clone() });
    if let Some(text) = encode(hello) {
        ws_sender.send(WsMessage::Text(text.into())).await?;
    }
    log::info!("Broker connection {addr} assigned site {site_id}");

    let mut membership: Option<Membership> = None;

    let outcome: Result<(), BoxError> = async {
        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            state.count_message(text.len()).await;
                            let replies = handle_text(&state, conn, &site_id, &mut membership, text.as_str()).await;
                            for reply in replies {
                                ws_sender.send(WsMessage::Text(reply.into())).await?;
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            ws_sender.send(WsMessage::Pong(data)).await?;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            log::info!("Broker connection {addr} closed");
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            log::warn!("Broker connection {addr} failed: {e}");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                frame = async {
                    match membership.as_mut() {
                        Some(m) => m.rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match frame {
                        Ok(frame) => {
                            if frame.from != conn {
                                ws_sender.send(WsMessage::Text(frame.text.clone().into())).await?;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("Site {site_id} lagged by {n} frames");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            membership = None;
                        }
                    }
                }
            }
        }
    }
    .await;

    // Gone without saying goodbye: tell the room
    if let Some(member) = membership.take() {
        let leave = Action::session_leave(member.user.clone());
        depart(&state, conn, member, leave).await;
    }
    outcome
}

async fn handle_text(
    state: &RelayState,
    conn: Uuid,
    site_id: &str,
    membership: &mut Option<Membership>,
    text: &str,
) -> Vec<String> {
    let envelope_in = match Message::decode(text) {
        Ok(Message::Envelope(envelope_in)) => envelope_in,
        Ok(other) => {
            log::warn!("Broker ignores client {}", other.kind_name());
            return Vec::new();
        }
        Err(e) => {
            log::warn!("Undecodable broker frame from {site_id}: {e}");
            return Vec::new();
        }
    };

    let mut action = envelope_in.data;
    let Some(user) = action.client_user.as_mut() else {
        log::warn!("{} from {site_id} without a client user", action.wire_name());
        return Vec::new();
    };
    if user.site_id.is_none() {
        user.site_id = Some(site_id.to_string());
    }
    let user = user.clone();

    state.record(RelayActivity::Action {
        repo_id: user.repo_id.clone(),
        action_type: action.wire_name().to_string(),
        path: action.kind.path().map(str::to_owned),
    });

    match &action.kind {
        ActionKind::SessionInit { content } => {
            if membership.is_some() {
                log::warn!("Site {site_id} is already in a repository");
                return Vec::new();
            }
            match state.rooms.create(&user.repo_id, content.clone()).await {
                Some(room) => {
                    let rx = room.add_member(conn, user.clone()).await;
                    log::info!("{} opened repository {}", user.label(), user.repo_id);
                    *membership = Some(Membership { room, rx, user });
                    state.refresh_room_count().await;
                    Vec::new()
                }
                None => {
                    let message = format!("repository {} already exists", user.repo_id);
                    envelope(ActionEnvelope::failure(action, REPO_ALREADY_EXISTS, message))
                        .into_iter()
                        .collect()
                }
            }
        }
        ActionKind::SessionJoin => {
            if membership.is_some() {
                log::warn!("Site {site_id} is already in a repository");
                return Vec::new();
            }
            let Some(room) = state.rooms.get(&user.repo_id).await else {
                let message = format!("repository {} not found", user.repo_id);
                return envelope(ActionEnvelope::failure(action, REPO_NOT_FOUND, message))
                    .into_iter()
                    .collect();
            };

            let rx = room.add_member(conn, user.clone()).await;
            let snapshot = Message::ZippedSnapshot(ZippedDataMessage {
                repo_id: user.repo_id.clone(),
                users: room.members().await,
                data: room.archive().to_vec(),
            });
            if let Some(text) = envelope(ActionEnvelope::success(action.clone())) {
                room.broadcast(conn, text);
            }
            log::info!("{} joined repository {}", user.label(), user.repo_id);
            *membership = Some(Membership { room, rx, user });
            encode(snapshot).into_iter().collect()
        }
        ActionKind::SessionLeave => {
            if let Some(member) = membership.take() {
                depart(state, conn, member, action).await;
            }
            Vec::new()
        }
        _ => {
            match membership.as_ref() {
                Some(member) => {
                    if let Some(text) = envelope(ActionEnvelope::success(action)) {
                        member.room.broadcast(conn, text);
                    }
                }
                None => log::warn!("{} from {site_id} outside any repository", action.wire_name()),
            }
            Vec::new()
        }
    }
}

async fn depart(state: &RelayState, conn: Uuid, member: Membership, leave: Action) {
    member.room.remove_member(&conn).await;
    if let Some(text) = envelope(ActionEnvelope::success(leave)) {
        member.room.broadcast(conn, text);
    }
    log::info!("{} left repository {}", member.user.label(), member.room.repo_id());
    if state.rooms.remove_if_empty(member.room.repo_id()).await {
        log::info!("Repository {} closed", member.room.repo_id());
    }
    state.refresh_room_count().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_id_is_short_hex() {
        let conn = Uuid::new_v4();
        let site = site_id_for(&conn);
        assert_eq!(site.len(), 8);
        assert!(site.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(site, site_id_for(&conn));
    }
}

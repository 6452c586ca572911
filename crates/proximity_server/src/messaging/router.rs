//! Request dispatch onto the proximity service.
//!
//! The router turns parsed [`ClientRequest`]s into service calls and wraps
//! the results as [`ServerMessage`]s. Watch events are forwarded onto the
//! session's outbound channel by a per-watch task, so they interleave with
//! ordinary responses on the same connection.

use super::types::{ClientRequest, ErrorCode, NearbyUserEntry, ServerMessage};
use proximity_core::{GeoPosition, ProximityError, ProximityService, UserId, WatchId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Per-connection session state owned by the connection handler.
pub struct Session {
    /// Outbound message channel to the client socket
    pub out_tx: mpsc::UnboundedSender<ServerMessage>,
    /// Watches created over this connection, released on disconnect
    pub watch_ids: Vec<WatchId>,
    /// User bound to this connection after registration or first use
    pub user_id: Option<UserId>,
}

impl Session {
    /// Creates an empty session around the connection's outbound channel.
    pub fn new(out_tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            out_tx,
            watch_ids: Vec::new(),
            user_id: None,
        }
    }
}

/// Stateless dispatcher from wire requests to service operations.
pub struct MessageRouter {
    service: Arc<ProximityService>,
}

impl MessageRouter {
    /// Creates a router over the given service.
    pub fn new(service: Arc<ProximityService>) -> Self {
        Self { service }
    }

    /// Handles one request, mutating the session as needed (user binding,
    /// watch bookkeeping), and returns the direct response.
    pub fn handle(&self, request: ClientRequest, session: &mut Session) -> ServerMessage {
        match request {
            ClientRequest::Register {
                display_name,
                age,
                gender,
            } => match self.service.register(&display_name, age, gender) {
                Ok(profile) => {
                    session.user_id = Some(profile.user_id);
                    ServerMessage::Registered {
                        user_id: profile.user_id,
                    }
                }
                Err(e) => error_message(e),
            },

            ClientRequest::ReportLocation {
                user_id,
                latitude,
                longitude,
                timestamp_ms,
                accuracy_m,
            } => {
                session.user_id.get_or_insert(user_id);
                match self.service.report_location(
                    user_id,
                    GeoPosition::new(latitude, longitude),
                    timestamp_ms,
                    accuracy_m,
                ) {
                    Ok(outcome) => ServerMessage::ReportAck {
                        accepted: outcome.accepted,
                        reason: outcome.reason,
                    },
                    Err(e) => error_message(e),
                }
            }

            ClientRequest::FindNearby {
                user_id,
                radius_m,
                limit,
            } => match self.service.find_nearby(user_id, radius_m, limit) {
                Ok(users) => ServerMessage::Nearby {
                    users: users.into_iter().map(NearbyUserEntry::from).collect(),
                },
                Err(e) => error_message(e),
            },

            ClientRequest::Watch {
                user_id,
                latitude,
                longitude,
                radius_m,
            } => {
                let center = GeoPosition::new(latitude, longitude);
                match self.service.create_watch(user_id, center, radius_m) {
                    Ok((watch_id, mut events)) => {
                        session.user_id.get_or_insert(user_id);
                        session.watch_ids.push(watch_id);

                        // Forward watch events until the watch is released
                        // or the connection goes away.
                        let out_tx = session.out_tx.clone();
                        tokio::spawn(async move {
                            while let Some(event) = events.recv().await {
                                let forwarded = out_tx.send(ServerMessage::WatchEvent {
                                    watch_id: event.watch_id,
                                    event: event.kind,
                                    user_id: event.user_id,
                                    distance_m: event.distance_m,
                                });
                                if forwarded.is_err() {
                                    debug!(watch_id = %watch_id, "connection gone, stopping watch forwarder");
                                    break;
                                }
                            }
                        });

                        ServerMessage::WatchCreated { watch_id }
                    }
                    Err(e) => error_message(e),
                }
            }

            ClientRequest::Unwatch { watch_id } => {
                let released = self.service.release_watch(watch_id);
                session.watch_ids.retain(|id| *id != watch_id);
                ServerMessage::Unwatched { watch_id, released }
            }
        }
    }

    /// Releases everything a session pinned server-side. Invoked by the
    /// connection handler on disconnect; idempotent.
    pub fn cleanup_session(&self, session: &Session) {
        for watch_id in &session.watch_ids {
            if self.service.release_watch(*watch_id) {
                debug!(watch_id = %watch_id, "released watch on disconnect");
            }
        }
    }
}

/// Maps a core error onto the wire taxonomy.
fn error_message(error: ProximityError) -> ServerMessage {
    let code = match &error {
        ProximityError::Validation(_) => ErrorCode::Validation,
        ProximityError::NotRegistered(_) => ErrorCode::NotRegistered,
        ProximityError::NotFound(_) => ErrorCode::NotFound,
        ProximityError::Internal(_) => {
            warn!(%error, "internal error surfaced to client");
            ErrorCode::Internal
        }
    };
    ServerMessage::Error {
        code,
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proximity_core::{GenderCategory, ProximityConfig, RejectReason, current_timestamp_ms};

    fn router() -> MessageRouter {
        MessageRouter::new(ProximityService::new(ProximityConfig::default()))
    }

    fn session() -> (Session, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(tx), rx)
    }

    fn register(router: &MessageRouter, session: &mut Session, name: &str) -> UserId {
        let response = router.handle(
            ClientRequest::Register {
                display_name: name.to_string(),
                age: 30,
                gender: GenderCategory::Unspecified,
            },
            session,
        );
        match response {
            ServerMessage::Registered { user_id } => user_id,
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_binds_session() {
        let router = router();
        let (mut session, _rx) = session();
        let user_id = register(&router, &mut session, "Alex");
        assert_eq!(session.user_id, Some(user_id));
    }

    #[tokio::test]
    async fn test_invalid_registration_maps_to_validation_error() {
        let router = router();
        let (mut session, _rx) = session();
        let response = router.handle(
            ClientRequest::Register {
                display_name: "Alex".to_string(),
                age: 12,
                gender: GenderCategory::Male,
            },
            &mut session,
        );
        assert!(matches!(
            response,
            ServerMessage::Error {
                code: ErrorCode::Validation,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_report_and_query_round_trip() {
        let router = router();
        let (mut session, _rx) = session();
        let alex = register(&router, &mut session, "Alex");
        let jamie = register(&router, &mut session, "Jamie");

        let now = current_timestamp_ms();
        for (user, lat) in [(alex, 52.5200), (jamie, 52.5204)] {
            let response = router.handle(
                ClientRequest::ReportLocation {
                    user_id: user,
                    latitude: lat,
                    longitude: 13.4050,
                    timestamp_ms: now,
                    accuracy_m: Some(10.0),
                },
                &mut session,
            );
            assert!(matches!(
                response,
                ServerMessage::ReportAck { accepted: true, .. }
            ));
        }

        let response = router.handle(
            ClientRequest::FindNearby {
                user_id: alex,
                radius_m: Some(100.0),
                limit: None,
            },
            &mut session,
        );
        match response {
            ServerMessage::Nearby { users } => {
                assert_eq!(users.len(), 1);
                assert_eq!(users[0].user_id, jamie);
                assert_eq!(users[0].display_name, "Jamie");
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limited_report_acks_with_reason() {
        let router = router();
        let (mut session, _rx) = session();
        let alex = register(&router, &mut session, "Alex");

        let now = current_timestamp_ms();
        let report = |timestamp_ms| ClientRequest::ReportLocation {
            user_id: alex,
            latitude: 52.52,
            longitude: 13.405,
            timestamp_ms,
            accuracy_m: None,
        };
        router.handle(report(now), &mut session);
        let response = router.handle(report(now + 1), &mut session);
        assert!(matches!(
            response,
            ServerMessage::ReportAck {
                accepted: false,
                reason: Some(RejectReason::RateLimited),
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_user_query_maps_to_not_registered() {
        let router = router();
        let (mut session, _rx) = session();
        let response = router.handle(
            ClientRequest::FindNearby {
                user_id: UserId::new(),
                radius_m: None,
                limit: None,
            },
            &mut session,
        );
        assert!(matches!(
            response,
            ServerMessage::Error {
                code: ErrorCode::NotRegistered,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_watch_lifecycle_and_cleanup() {
        let router = router();
        let (mut session, _rx) = session();
        let alex = register(&router, &mut session, "Alex");
        router.handle(
            ClientRequest::ReportLocation {
                user_id: alex,
                latitude: 52.52,
                longitude: 13.405,
                timestamp_ms: current_timestamp_ms(),
                accuracy_m: None,
            },
            &mut session,
        );

        let response = router.handle(
            ClientRequest::Watch {
                user_id: alex,
                latitude: 52.52,
                longitude: 13.405,
                radius_m: Some(500.0),
            },
            &mut session,
        );
        let watch_id = match response {
            ServerMessage::WatchCreated { watch_id } => watch_id,
            other => panic!("unexpected response: {:?}", other),
        };
        assert_eq!(session.watch_ids, vec![watch_id]);

        let response = router.handle(ClientRequest::Unwatch { watch_id }, &mut session);
        assert!(matches!(
            response,
            ServerMessage::Unwatched { released: true, .. }
        ));
        assert!(session.watch_ids.is_empty());

        // Releasing again is a no-op.
        let response = router.handle(ClientRequest::Unwatch { watch_id }, &mut session);
        assert!(matches!(
            response,
            ServerMessage::Unwatched {
                released: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cleanup_session_releases_watches() {
        let router = router();
        let (mut session, _rx) = session();
        let alex = register(&router, &mut session, "Alex");
        router.handle(
            ClientRequest::ReportLocation {
                user_id: alex,
                latitude: 52.52,
                longitude: 13.405,
                timestamp_ms: current_timestamp_ms(),
                accuracy_m: None,
            },
            &mut session,
        );
        router.handle(
            ClientRequest::Watch {
                user_id: alex,
                latitude: 52.52,
                longitude: 13.405,
                radius_m: None,
            },
            &mut session,
        );

        router.cleanup_session(&session);
        // The watch is gone server-side: releasing by ID reports false.
        let watch_id = session.watch_ids[0];
        assert!(!router.service.release_watch(watch_id));
    }
}

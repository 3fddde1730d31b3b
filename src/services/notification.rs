// NotificationService - Append-only interaction events
// Self-notifications are suppressed at creation; the store-assigned id is
// written into the event body so the event can reference itself later.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::context::ViewerContext;
use crate::core::types::{fresh_id, NotificationId, UserId};
use crate::error::AppResult;
use crate::infrastructure::document_store::{collections, DocumentStore, Filter, OrderBy};
use crate::models::{NotificationEvent, NotificationKind, Post};
use crate::services::user_directory::UserDirectory;

pub struct NotificationService {
    store: Arc<dyn DocumentStore>,
    users: Arc<UserDirectory>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn DocumentStore>, users: Arc<UserDirectory>) -> Self {
        Self { store, users }
    }

    /// Append one event for `recipient`, acted by the calling user. Returns
    /// `None` without writing anything when recipient and actor coincide.
    /// `post` accompanies like/comment events and is absent for follows.
    pub async fn notify(
        &self,
        ctx: &ViewerContext,
        recipient: &UserId,
        kind: NotificationKind,
        post: Option<&Post>,
    ) -> AppResult<Option<NotificationId>> {
        let actor_id = ctx.require_user()?;
        if recipient == actor_id {
            debug!("suppressing self-notification for {}", actor_id);
            return Ok(None);
        }

        // Actor snapshot is best-effort; the event is still worth recording
        // when the profile lookup hiccups.
        let actor = match self.users.fetch(actor_id).await {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("could not snapshot actor {}: {}", actor_id, e);
                None
            }
        };

        let id = NotificationId::new(fresh_id());
        let event = NotificationEvent {
            id: id.clone(),
            recipient: recipient.clone(),
            actor_id: actor_id.clone(),
            kind,
            timestamp: Utc::now(),
            actor_username: actor.as_ref().map(|u| u.username.clone()),
            actor_image_url: actor.and_then(|u| u.profile_image_url),
            post_id: post.map(|p| p.id.clone()),
            post_image_url: post.map(|p| p.image_url.clone()),
        };
        self.store
            .put(collections::NOTIFICATIONS, id.as_str(), event.fields()?)
            .await?;
        Ok(Some(id))
    }

    /// Snapshot of a user's notifications, newest first. Malformed rows are
    /// skipped rather than failing the listing.
    pub async fn list_for(
        &self,
        ctx: &ViewerContext,
        recipient: &UserId,
    ) -> AppResult<Vec<NotificationEvent>> {
        ctx.run_with_deadline("list notifications", async {
            let docs = self
                .store
                .query(
                    collections::NOTIFICATIONS,
                    Some(Filter::eq("recipient", recipient.as_str())),
                    Some(OrderBy::desc("timestamp")),
                )
                .await?;
            let mut events = Vec::with_capacity(docs.len());
            for doc in docs {
                match NotificationEvent::from_document(doc) {
                    Ok(event) => events.push(event),
                    Err(e) => warn!("skipping malformed notification: {}", e),
                }
            }
            Ok(events)
        })
        .await
    }
}

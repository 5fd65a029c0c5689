//! Authentication sessions, owned by the instance.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use keyward_auth::permissions::names;
use keyward_core::{Context, DomainError, ObjectDetails};
use keyward_domain::session::{self, MetadataSet, PasswordChecked, SessionAdded, SessionTerminated, UserChecked};
use keyward_domain::{SessionEvent, SessionState, UserState};
use keyward_events::CodecError;
use keyward_infra::event_store::{AggregateFilter, SearchQuery, StoredEvent};

use crate::collaborators::HashError;
use crate::commands::Commands;
use crate::engine::event;
use crate::error::{CommandError, CommandResult};
use crate::user::HumanWriteModel;
use crate::write_model::{WriteModel, WriteModelBase};

#[derive(Clone, Default)]
pub struct CreateSession {
    pub user_id: Option<String>,
    /// Checked against the user's password; requires `user_id`.
    pub password: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl core::fmt::Debug for CreateSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CreateSession")
            .field("user_id", &self.user_id)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CreateSessionResult {
    pub details: ObjectDetails,
    pub session_id: String,
}

#[derive(Debug, Clone)]
pub struct SessionWriteModel {
    base: WriteModelBase,
    pub user_id: Option<String>,
    pub user_resource_owner: Option<String>,
    pub user_checked_at: Option<DateTime<Utc>>,
    pub password_checked_at: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub state: SessionState,
}

impl SessionWriteModel {
    pub fn new(session_id: &str, instance_id: &str) -> Self {
        Self {
            base: WriteModelBase::new(session_id, instance_id, instance_id),
            user_id: None,
            user_resource_owner: None,
            user_checked_at: None,
            password_checked_at: None,
            user_agent: None,
            metadata: BTreeMap::new(),
            state: SessionState::Unspecified,
        }
    }
}

impl WriteModel for SessionWriteModel {
    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }

    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id).filter(
            AggregateFilter::new(session::AGGREGATE_TYPE)
                .aggregate_id(&self.base.aggregate_id)
                .event_types(&[
                    session::SESSION_ADDED,
                    session::USER_CHECKED,
                    session::PASSWORD_CHECKED,
                    session::METADATA_SET,
                    session::SESSION_TERMINATED,
                ]),
        )
    }

    fn apply(&mut self, event: &StoredEvent) -> Result<(), CodecError> {
        match event.decode::<SessionEvent>()? {
            Some(SessionEvent::Added(e)) => {
                self.user_agent = e.user_agent;
                self.state = SessionState::Active;
            }
            Some(SessionEvent::UserChecked(e)) => {
                self.user_id = Some(e.user_id);
                self.user_resource_owner = Some(e.user_resource_owner);
                self.user_checked_at = Some(e.checked_at);
            }
            Some(SessionEvent::PasswordChecked(e)) => self.password_checked_at = Some(e.checked_at),
            Some(SessionEvent::MetadataSet(e)) => {
                for (key, value) in e.metadata {
                    if value.is_empty() {
                        self.metadata.remove(&key);
                    } else {
                        self.metadata.insert(key, value);
                    }
                }
            }
            Some(SessionEvent::Terminated(_)) => self.state = SessionState::Terminated,
            None => {}
        }
        Ok(())
    }
}

impl Commands {
    pub async fn create_session(&self, ctx: &Context, input: CreateSession) -> CommandResult<CreateSessionResult> {
        if input.password.is_some() && input.user_id.is_none() {
            return Err(DomainError::invalid_argument("SESSION-0001", "errors.session.password_without_user").into());
        }
        if input.metadata.keys().any(|k| k.trim().is_empty()) {
            return Err(DomainError::invalid_argument("SESSION-0006", "errors.session.metadata_key_missing").into());
        }
        let session_id = self.id_or_next(None)?;
        self.check_permission(ctx, names::SESSION_WRITE, ctx.instance_id(), &session_id)
            .await?;

        let mut wm = SessionWriteModel::new(&session_id, ctx.instance_id());
        let aggregate = wm.base().aggregate(session::AGGREGATE_TYPE);
        let now = Utc::now();
        let mut events = vec![event(
            ctx,
            &aggregate,
            &SessionEvent::Added(SessionAdded {
                user_agent: input.user_agent,
            }),
        )?];
        let mut guards = Vec::new();

        if let Some(user_id) = input.user_id.as_deref() {
            let mut user = HumanWriteModel::new(user_id, "", ctx.instance_id());
            self.load(ctx, &mut user).await?;
            if user.state != UserState::Active {
                return Err(DomainError::precondition_failed("SESSION-0002", "errors.session.user_not_active").into());
            }
            events.push(event(
                ctx,
                &aggregate,
                &SessionEvent::UserChecked(UserChecked {
                    user_id: user_id.to_string(),
                    user_resource_owner: user.base().resource_owner.clone(),
                    checked_at: now,
                }),
            )?);

            if let Some(password) = input.password.as_deref() {
                self.verify_user_password(&user, password)?;
                events.push(event(
                    ctx,
                    &aggregate,
                    &SessionEvent::PasswordChecked(PasswordChecked { checked_at: now }),
                )?);
            }
            guards.push(user.guard());
        }

        if !input.metadata.is_empty() {
            events.push(event(
                ctx,
                &aggregate,
                &SessionEvent::MetadataSet(MetadataSet {
                    metadata: input.metadata,
                }),
            )?);
        }

        self.commit_with(ctx, &mut wm, events, guards).await?;
        tracing::debug!(session_id = %session_id, "session created");
        Ok(CreateSessionResult {
            details: wm.details(),
            session_id,
        })
    }

    fn verify_user_password(&self, user: &HumanWriteModel, password: &str) -> CommandResult<()> {
        let Some(encoded) = user.password_hash.as_deref() else {
            return Err(DomainError::precondition_failed("SESSION-0003", "errors.session.password_not_set").into());
        };
        match self.hasher.verify(encoded, password) {
            Ok(()) => Ok(()),
            Err(HashError::UnsupportedEncoding) => {
                Err(DomainError::precondition_failed("SESSION-0004", "errors.session.password_encoding").into())
            }
            Err(HashError::Mismatch) => {
                Err(DomainError::invalid_argument("SESSION-0005", "errors.session.password_invalid").into())
            }
            Err(err @ HashError::Failed(_)) => Err(CommandError::collaborator(err.into())),
        }
    }

    /// Terminate a session. Terminating twice is a no-op.
    pub async fn terminate_session(&self, ctx: &Context, session_id: &str) -> CommandResult<ObjectDetails> {
        self.check_permission(ctx, names::SESSION_DELETE, ctx.instance_id(), session_id)
            .await?;

        let mut wm = SessionWriteModel::new(session_id, ctx.instance_id());
        self.execute(ctx, &mut wm, |wm| match wm.state {
            SessionState::Unspecified => {
                Err(DomainError::not_found("SESSION-0007", "errors.session.not_found").into())
            }
            SessionState::Terminated => Ok(Vec::new()),
            SessionState::Active => Ok(vec![event(
                ctx,
                &wm.base().aggregate(session::AGGREGATE_TYPE),
                &SessionEvent::Terminated(SessionTerminated {}),
            )?]),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::ErrorKind;

    use super::*;
    use crate::test_support::{fixture, seed_org, seed_user, PASSWORD};

    fn with_password(user_id: &str, password: &str) -> CreateSession {
        CreateSession {
            user_id: Some(user_id.to_string()),
            password: Some(password.to_string()),
            ..CreateSession::default()
        }
    }

    #[tokio::test]
    async fn session_with_checked_password() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        seed_user(&fx, "o1", "u1").await;

        let result = fx
            .commands
            .create_session(&ctx, with_password("u1", PASSWORD))
            .await
            .unwrap();
        assert_eq!(result.details.resource_owner, ctx.instance_id());
        assert_eq!(result.details.sequence, 3);

        let mut wm = SessionWriteModel::new(&result.session_id, ctx.instance_id());
        fx.commands.load(&ctx, &mut wm).await.unwrap();
        assert_eq!(wm.user_id.as_deref(), Some("u1"));
        assert_eq!(wm.user_resource_owner.as_deref(), Some("o1"));
        assert!(wm.password_checked_at.is_some());
    }

    #[tokio::test]
    async fn wrong_password_pushes_nothing() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        seed_user(&fx, "o1", "u1").await;

        let before = fx.store.len();
        let err = fx
            .commands
            .create_session(&ctx, with_password("u1", "Wr0ng!Password"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(fx.store.len(), before);
    }

    #[tokio::test]
    async fn inactive_user_cannot_start_a_session() {
        let fx = fixture();
        let ctx = fx.ctx();
        seed_org(&fx, "o1").await;
        seed_user(&fx, "o1", "u1").await;
        fx.commands.lock_user(&ctx, "o1", "u1").await.unwrap();

        let err = fx
            .commands
            .create_session(&ctx, with_password("u1", PASSWORD))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        let err = fx
            .commands
            .create_session(
                &ctx,
                CreateSession {
                    password: Some(PASSWORD.into()),
                    ..CreateSession::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let fx = fixture();
        let ctx = fx.ctx();

        let err = fx.commands.terminate_session(&ctx, "nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let created = fx
            .commands
            .create_session(&ctx, CreateSession::default())
            .await
            .unwrap();
        let first = fx
            .commands
            .terminate_session(&ctx, &created.session_id)
            .await
            .unwrap();
        let before = fx.store.len();
        let second = fx
            .commands
            .terminate_session(&ctx, &created.session_id)
            .await
            .unwrap();
        assert_eq!(fx.store.len(), before);
        assert_eq!(first.sequence, second.sequence);
    }
}

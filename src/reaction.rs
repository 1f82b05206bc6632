//! Reaction Role Grant
//!
//! When a reviewer holding the authorizer role reacts to a message with the
//! configured marker, the message author receives the grant role. Granting is
//! idempotent. Every rejection path is reported, none is an error.
//!
//! The chat-platform client implements [`GuildDirectory`] and calls
//! [`RoleGrantPolicy::handle`] from its reaction-added event; the console
//! binary has no guild to watch.

use crate::config::RoleGrantConfig;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Platform object identifier
pub type Snowflake = u64;

/// A reaction added somewhere the bot can see
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    /// `None` for direct messages
    pub guild_id: Option<Snowflake>,
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    pub reactor_id: Snowflake,
    pub emoji: String,
}

/// A guild member as seen by the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: Snowflake,
    pub display_name: String,
    pub roles: Vec<Snowflake>,
    pub is_bot: bool,
}

impl Member {
    pub fn has_role(&self, role: Snowflake) -> bool {
        self.roles.contains(&role)
    }
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Author {
    pub id: Snowflake,
    pub is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: Snowflake,
    pub name: String,
}

/// Guild lookups and role assignment, implemented by the chat-platform client
#[async_trait]
pub trait GuildDirectory: Send + Sync {
    /// The bot's own user id
    fn self_id(&self) -> Snowflake;

    async fn member(&self, guild: Snowflake, user: Snowflake) -> Result<Option<Member>>;

    async fn role(&self, guild: Snowflake, role: Snowflake) -> Result<Option<Role>>;

    /// `Ok(None)` when the message no longer exists
    async fn message_author(
        &self,
        channel: Snowflake,
        message: Snowflake,
    ) -> Result<Option<Author>>;

    /// Fails with [`RelayError::Forbidden`] when the bot may not assign the role
    async fn add_role(
        &self,
        guild: Snowflake,
        user: Snowflake,
        role: Snowflake,
        reason: &str,
    ) -> Result<()>;
}

/// Why a reaction did not lead to a grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OwnReaction,
    OtherMarker,
    NotInGuild,
    UnknownReactor,
    NotAuthorized,
    MessageUnavailable,
    BotAuthor,
    AuthorNotMember,
    GrantRoleMissing,
}

/// Result of handling one reaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Ignored(IgnoreReason),
    AlreadyGranted { member: Snowflake, role: String },
    Granted { member: Snowflake, role: String },
    Failed { member: Snowflake, reason: String },
}

/// Marker and roles that drive the grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrantPolicy {
    pub marker: String,
    pub authorizer_role: Snowflake,
    pub grant_role: Snowflake,
}

impl From<RoleGrantConfig> for RoleGrantPolicy {
    fn from(config: RoleGrantConfig) -> Self {
        Self {
            marker: config.marker,
            authorizer_role: config.authorizer_role,
            grant_role: config.grant_role,
        }
    }
}

impl RoleGrantPolicy {
    pub async fn handle(&self, event: &ReactionEvent, dir: &dyn GuildDirectory) -> GrantOutcome {
        if event.reactor_id == dir.self_id() {
            return GrantOutcome::Ignored(IgnoreReason::OwnReaction);
        }
        if event.emoji != self.marker {
            return GrantOutcome::Ignored(IgnoreReason::OtherMarker);
        }
        let Some(guild) = event.guild_id else {
            return GrantOutcome::Ignored(IgnoreReason::NotInGuild);
        };

        let reactor = match dir.member(guild, event.reactor_id).await {
            Ok(Some(member)) => member,
            Ok(None) => return GrantOutcome::Ignored(IgnoreReason::UnknownReactor),
            Err(e) => {
                warn!(reactor = event.reactor_id, error = %e, "reactor lookup failed");
                return GrantOutcome::Ignored(IgnoreReason::UnknownReactor);
            }
        };

        if !reactor.has_role(self.authorizer_role) {
            debug!(reactor = reactor.id, "reactor lacks authorizer role");
            return GrantOutcome::Ignored(IgnoreReason::NotAuthorized);
        }

        let author = match dir.message_author(event.channel_id, event.message_id).await {
            Ok(Some(author)) => author,
            Ok(None) => {
                info!(message = event.message_id, "reacted message not found");
                return GrantOutcome::Ignored(IgnoreReason::MessageUnavailable);
            }
            Err(e) => {
                warn!(message = event.message_id, error = %e, "failed to fetch reacted message");
                return GrantOutcome::Ignored(IgnoreReason::MessageUnavailable);
            }
        };

        if author.is_bot {
            return GrantOutcome::Ignored(IgnoreReason::BotAuthor);
        }

        let role = match dir.role(guild, self.grant_role).await {
            Ok(Some(role)) => role,
            Ok(None) | Err(_) => {
                warn!(role = self.grant_role, "grant role not found");
                return GrantOutcome::Ignored(IgnoreReason::GrantRoleMissing);
            }
        };

        let target = match dir.member(guild, author.id).await {
            Ok(Some(member)) => member,
            _ => return GrantOutcome::Ignored(IgnoreReason::AuthorNotMember),
        };

        if target.has_role(role.id) {
            info!(role = %role.name, member = %target.display_name, "role already granted");
            return GrantOutcome::AlreadyGranted {
                member: target.id,
                role: role.name,
            };
        }

        let reason = format!("{} reaction by {}", self.marker, reactor.display_name);

        match dir.add_role(guild, target.id, role.id, &reason).await {
            Ok(()) => {
                info!(role = %role.name, member = %target.display_name, "role granted");
                GrantOutcome::Granted {
                    member: target.id,
                    role: role.name,
                }
            }
            Err(RelayError::Forbidden(detail)) => {
                warn!(
                    role = %role.name,
                    detail = %detail,
                    "missing permission to grant role; the bot's role must rank above it"
                );
                GrantOutcome::Failed {
                    member: target.id,
                    reason: format!("missing permission: {}", detail),
                }
            }
            Err(e) => {
                warn!(role = %role.name, error = %e, "role grant failed");
                GrantOutcome::Failed {
                    member: target.id,
                    reason: e.to_string(),
                }
            }
        }
    }
}

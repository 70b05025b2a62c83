//! Plugin identity and addressing mode.

use std::borrow::Cow;
use std::fmt;

use crate::error::IdentityError;
use crate::subject::{self, GATEWAY_SEGMENT, WILDCARD};

/// Prefix of gateway-hosted plugin ids.
const GATEWAY_PREFIX: &str = "bin.*.";

/// How the agent addresses a plugin.
///
/// Decided once from the configured plugin id and never re-derived from
/// string parsing afterwards.
///
/// | Configured id | Variant | Subject id |
/// |---------------|---------|------------|
/// | `widgets-svc` | [`Standalone`](Self::Standalone) | `widgets-svc` |
/// | `bin.*.abc123` | [`GatewayHosted`](Self::GatewayHosted) | `bin.*.abc123` |
///
/// For gateway-hosted plugins the `*` segment is the caller's entity id and
/// is only known per inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PluginIdentity {
    /// Addressed directly by its plugin id.
    Standalone {
        /// The plugin id.
        id: String,
    },
    /// Relayed by the gateway on behalf of an entity.
    GatewayHosted {
        /// The plugin uuid (last segment of `bin.*.<uuid>`).
        uuid: String,
    },
}

impl PluginIdentity {
    /// Parses a configured plugin id.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(IdentityError::Empty);
        }

        if let Some(rest) = raw.strip_prefix(GATEWAY_PREFIX) {
            let uuid = rest.rsplit('.').next().unwrap_or_default();
            if uuid.is_empty() || uuid == WILDCARD {
                return Err(IdentityError::MissingUuid(raw.to_string()));
            }
            return Ok(Self::GatewayHosted {
                uuid: uuid.to_string(),
            });
        }

        Ok(Self::Standalone {
            id: raw.to_string(),
        })
    }

    /// Creates a standalone identity.
    pub fn standalone(id: impl Into<String>) -> Self {
        Self::Standalone { id: id.into() }
    }

    /// Creates a gateway-hosted identity.
    pub fn gateway(uuid: impl Into<String>) -> Self {
        Self::GatewayHosted { uuid: uuid.into() }
    }

    /// Returns `true` for gateway-hosted identities.
    pub fn is_gateway(&self) -> bool {
        matches!(self, Self::GatewayHosted { .. })
    }

    /// The configured plugin id, as it would appear in configuration.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Self::Standalone { id } => Cow::Borrowed(id),
            Self::GatewayHosted { uuid } => Cow::Owned(format!("{GATEWAY_PREFIX}{uuid}")),
        }
    }

    /// The id segment used in metadata subjects.
    ///
    /// For gateway identities this still contains the wildcard, which makes
    /// the resulting subjects subscriptions that match every entity.
    pub fn subject_id(&self) -> Cow<'_, str> {
        self.as_str()
    }

    /// The subject id with the entity substituted for the wildcard.
    ///
    /// Standalone identities ignore `entity_id`.
    pub fn resolved_subject_id(&self, entity_id: &str) -> Cow<'_, str> {
        match self {
            Self::Standalone { id } => Cow::Borrowed(id),
            Self::GatewayHosted { uuid } => {
                Cow::Owned(format!("{GATEWAY_SEGMENT}.{entity_id}.{uuid}"))
            }
        }
    }

    /// The subject an action's execute handler subscribes to.
    pub fn execute_subscription(&self, method: &str) -> String {
        match self {
            Self::Standalone { id } => subject::execute_subject(id, method),
            Self::GatewayHosted { uuid } => {
                subject::gateway_execute_subject(WILDCARD, uuid, method)
            }
        }
    }

    /// Extracts the entity id from an inbound gateway subject.
    ///
    /// The entity is the segment immediately following the `bin` literal.
    /// Returns `None` if the subject has no such segment or it is the
    /// wildcard itself.
    pub fn entity_from_subject(subject: &str) -> Option<&str> {
        subject
            .split('.')
            .skip_while(|segment| *segment != GATEWAY_SEGMENT)
            .nth(1)
            .filter(|entity| !entity.is_empty() && *entity != WILDCARD)
    }
}

impl fmt::Display for PluginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl std::str::FromStr for PluginIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

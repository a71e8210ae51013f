//! Scope grammar
//!
//! A token carries a space-separated scope list. Each scope is `*`
//! (superuser), `resource:action`, or `resource:action:object_id`. A
//! request for action A on object O passes iff the set presents `*`,
//! `resource:A`, or `resource:A:O`.

use std::fmt;

/// Protected resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Topics,
    Subscriptions,
    Clients,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Topics => "topics",
            Resource::Subscriptions => "subscriptions",
            Resource::Clients => "clients",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "topics" => Some(Resource::Topics),
            "subscriptions" => Some(Resource::Subscriptions),
            "clients" => Some(Resource::Clients),
            _ => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Actions a scope can grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Delete,
    Update,
    Publish,
    Consume,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Delete => "delete",
            Action::Update => "update",
            Action::Publish => "publish",
            Action::Consume => "consume",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Action::Create),
            "read" => Some(Action::Read),
            "delete" => Some(Action::Delete),
            "update" => Some(Action::Update),
            "publish" => Some(Action::Publish),
            "consume" => Some(Action::Consume),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One parsed grant
#[derive(Debug, Clone, PartialEq, Eq)]
struct Grant {
    resource: Resource,
    action: Action,
    /// `None` grants the action on every object of the resource
    object_id: Option<String>,
}

/// A parsed scope list
#[derive(Debug, Clone, Default)]
pub struct ScopeSet {
    superuser: bool,
    grants: Vec<Grant>,
}

/// Malformed scope token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeParseError(pub String);

impl fmt::Display for ScopeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid scope: {}", self.0)
    }
}

impl std::error::Error for ScopeParseError {}

impl ScopeSet {
    /// A set that allows everything (auth disabled, or `*` scope)
    pub fn superuser() -> Self {
        Self {
            superuser: true,
            grants: Vec::new(),
        }
    }

    /// Parse a space-separated scope list. Empty input yields an empty set
    /// (a valid token that can do nothing).
    pub fn parse(scopes: &str) -> Result<Self, ScopeParseError> {
        let mut set = Self::default();

        for token in scopes.split_whitespace() {
            if token == "*" {
                set.superuser = true;
                continue;
            }

            let mut parts = token.splitn(3, ':');
            let resource = parts
                .next()
                .and_then(Resource::parse)
                .ok_or_else(|| ScopeParseError(token.to_string()))?;
            let action = parts
                .next()
                .and_then(Action::parse)
                .ok_or_else(|| ScopeParseError(token.to_string()))?;
            let object_id = match parts.next() {
                Some(id) if !id.is_empty() => Some(id.to_string()),
                Some(_) => return Err(ScopeParseError(token.to_string())),
                None => None,
            };

            set.grants.push(Grant {
                resource,
                action,
                object_id,
            });
        }

        Ok(set)
    }

    /// Whether the set allows `action` on `resource`, optionally narrowed
    /// to one object.
    pub fn allows(&self, resource: Resource, action: Action, object_id: Option<&str>) -> bool {
        if self.superuser {
            return true;
        }
        self.grants.iter().any(|grant| {
            grant.resource == resource
                && grant.action == action
                && match (&grant.object_id, object_id) {
                    (None, _) => true,
                    (Some(granted), Some(requested)) => granted == requested,
                    // Object-scoped grant cannot satisfy a resource-wide request
                    (Some(_), None) => false,
                }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superuser_allows_everything() {
        let set = ScopeSet::parse("*").unwrap();
        assert!(set.allows(Resource::Topics, Action::Create, None));
        assert!(set.allows(Resource::Subscriptions, Action::Consume, Some("s1")));
        assert!(set.allows(Resource::Clients, Action::Delete, Some("c1")));
    }

    #[test]
    fn test_resource_wide_grant() {
        let set = ScopeSet::parse("topics:publish").unwrap();
        assert!(set.allows(Resource::Topics, Action::Publish, None));
        assert!(set.allows(Resource::Topics, Action::Publish, Some("orders")));
        assert!(!set.allows(Resource::Topics, Action::Create, None));
        assert!(!set.allows(Resource::Subscriptions, Action::Publish, None));
    }

    #[test]
    fn test_object_scoped_grant() {
        let set = ScopeSet::parse("topics:publish:orders").unwrap();
        assert!(set.allows(Resource::Topics, Action::Publish, Some("orders")));
        assert!(!set.allows(Resource::Topics, Action::Publish, Some("billing")));
        assert!(!set.allows(Resource::Topics, Action::Publish, None));
    }

    #[test]
    fn test_multiple_grants() {
        let set =
            ScopeSet::parse("topics:read subscriptions:consume:s1 subscriptions:consume:s2")
                .unwrap();
        assert!(set.allows(Resource::Topics, Action::Read, Some("any")));
        assert!(set.allows(Resource::Subscriptions, Action::Consume, Some("s1")));
        assert!(set.allows(Resource::Subscriptions, Action::Consume, Some("s2")));
        assert!(!set.allows(Resource::Subscriptions, Action::Consume, Some("s3")));
    }

    #[test]
    fn test_empty_set_allows_nothing() {
        let set = ScopeSet::parse("").unwrap();
        assert!(!set.allows(Resource::Topics, Action::Read, None));
    }

    #[test]
    fn test_invalid_tokens_rejected() {
        assert!(ScopeSet::parse("bogus:read").is_err());
        assert!(ScopeSet::parse("topics:fly").is_err());
        assert!(ScopeSet::parse("topics").is_err());
        assert!(ScopeSet::parse("topics:read:").is_err());
    }

    #[test]
    fn test_whitespace_handling() {
        let set = ScopeSet::parse("  topics:read   subscriptions:read  ").unwrap();
        assert!(set.allows(Resource::Topics, Action::Read, None));
        assert!(set.allows(Resource::Subscriptions, Action::Read, None));
    }
}

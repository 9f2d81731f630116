//! # Static Authorization
//!
//! Grant table based [`Authorizer`]: a set of administrators plus explicit
//! (principal, rule) grants.

use std::collections::HashSet;

use catsync_core::{Authorizer, Principal, RuleId, SyncRule};

/// Authorizer backed by a fixed grant table.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorization {
    admins: HashSet<String>,
    grants: HashSet<(String, RuleId)>,
    allow_all: bool,
}

impl StaticAuthorization {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorizer granting every rule to everybody.
    pub fn allow_all() -> Self {
        StaticAuthorization {
            allow_all: true,
            ..Self::default()
        }
    }

    pub fn with_admin(mut self, principal: impl Into<String>) -> Self {
        self.admins.insert(principal.into());
        self
    }

    pub fn grant(mut self, principal: impl Into<String>, rule: impl Into<RuleId>) -> Self {
        self.grants.insert((principal.into(), rule.into()));
        self
    }
}

impl Authorizer for StaticAuthorization {
    fn is_admin(&self, principal: &Principal) -> bool {
        self.admins.contains(&principal.id)
    }

    fn can_sync(&self, principal: &Principal, rule: &SyncRule) -> bool {
        self.allow_all || self.grants.contains(&(principal.id.clone(), rule.id.clone()))
    }
}

//! # Access Context
//!
//! The acting principal and the "restrictions disabled" flag, passed
//! explicitly to every lookup that cares about visibility.
//!
//! ## Elevated Reads
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Scoped Elevation                                   │
//! │                                                                         │
//! │   ctx (restricted, never mutated)                                      │
//! │     │                                                                   │
//! │     ├── let scope = ctx.elevate(true);   scope: own copy, flag = true  │
//! │     │       repo.counterpart(item, target, &scope)                     │
//! │     │       ...early return / `?` / panic...                           │
//! │     └── drop(scope)                      copy gone                     │
//! │                                                                         │
//! │   The flag lives only in the scope's copy, so overlapping or           │
//! │   concurrent scopes on one context cannot leave it set.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::marker::PhantomData;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// The user on whose behalf the engine acts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Principal { id: id.into() }
    }
}

/// Per-call access context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    principal: Principal,
    restrictions_disabled: bool,
}

impl AccessContext {
    /// Creates a restricted context for `principal`.
    pub fn new(principal: Principal) -> Self {
        AccessContext {
            principal,
            restrictions_disabled: false,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// True for the context of an elevated scope with restrictions disabled.
    pub fn restrictions_disabled(&self) -> bool {
        self.restrictions_disabled
    }

    /// Enters an elevated read scope. The scope reads through its own copy
    /// of the context; `self` is left untouched.
    pub fn elevate(&self, disable_restrictions: bool) -> ElevatedRead<'_> {
        ElevatedRead {
            ctx: AccessContext {
                principal: self.principal.clone(),
                restrictions_disabled: disable_restrictions,
            },
            _parent: PhantomData,
        }
    }
}

/// Guard for an elevated read scope.
#[must_use = "the elevated scope ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ElevatedRead<'a> {
    ctx: AccessContext,
    _parent: PhantomData<&'a AccessContext>,
}

impl Deref for ElevatedRead<'_> {
    type Target = AccessContext;

    fn deref(&self) -> &AccessContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AccessContext {
        AccessContext::new(Principal::new("editor"))
    }

    #[test]
    fn test_guard_releases_flag() {
        let ctx = ctx();
        {
            let scope = ctx.elevate(true);
            assert!(scope.restrictions_disabled());
        }
        assert!(!ctx.restrictions_disabled());
    }

    #[test]
    fn test_nested_guards_restore_previous_value() {
        let ctx = ctx();
        let outer = ctx.elevate(true);
        {
            let inner = outer.elevate(false);
            assert!(!inner.restrictions_disabled());
        }
        assert!(outer.restrictions_disabled());
        drop(outer);
        assert!(!ctx.restrictions_disabled());
    }

    #[test]
    fn test_overlapping_scopes_leave_context_restricted() {
        let ctx = ctx();
        let first = ctx.elevate(true);
        let second = ctx.elevate(true);
        drop(first);
        assert!(second.restrictions_disabled());
        drop(second);
        assert!(!ctx.restrictions_disabled());
    }

    #[test]
    fn test_concurrent_scopes_never_touch_shared_context() {
        let ctx = ctx();
        std::thread::scope(|threads| {
            for _ in 0..4 {
                threads.spawn(|| {
                    for _ in 0..500 {
                        let scope = ctx.elevate(true);
                        assert!(scope.restrictions_disabled());
                        assert!(!ctx.restrictions_disabled());
                    }
                });
            }
        });
        assert!(!ctx.restrictions_disabled());
    }

    #[test]
    fn test_guard_releases_on_early_return() {
        fn lookup(ctx: &AccessContext) -> Result<(), String> {
            let _scope = ctx.elevate(true);
            Err("miss".to_string())?;
            Ok(())
        }

        let ctx = ctx();
        assert!(lookup(&ctx).is_err());
        assert!(!ctx.restrictions_disabled());
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let ctx = ctx();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = ctx.elevate(true);
            panic!("lookup failed");
        }));
        assert!(result.is_err());
        assert!(!ctx.restrictions_disabled());
    }
}

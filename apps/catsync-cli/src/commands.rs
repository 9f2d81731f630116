//! Command implementations. Every command renders a JSON value.

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};

use catsync_core::{AccessContext, CatalogRepository, ItemKey, RuleId, VersionId, VersionedItem};
use catsync_engine::{DispatchRequest, SyncEngine};

use crate::cli::Commands;

/// Runs one command against the engine.
pub fn run(
    command: Commands,
    engine: &SyncEngine,
    catalog: &dyn CatalogRepository,
    ctx: &AccessContext,
) -> Result<Value> {
    match command {
        Commands::Status { items } => {
            let items = resolve(catalog, &items)?;
            Ok(serde_json::to_value(engine.sync_contexts(&items, ctx))?)
        }

        Commands::Pull { items } => {
            let contexts: Vec<_> = resolve(catalog, &items)?
                .iter()
                .map(|item| engine.pull_context(item, ctx))
                .collect();
            Ok(serde_json::to_value(contexts)?)
        }

        Commands::Rules { items } => {
            let items = resolve(catalog, &items)?;
            let summary = engine.rule_summary(&items, ctx);
            Ok(json!({
                "accessible": summary.accessible,
                "forbidden": summary.forbidden,
                "multiple_rules": engine.has_multiple_rules(&items),
            }))
        }

        Commands::Closure { item, depth } => {
            let item = resolve_one(catalog, item)?;
            let closure = match depth {
                Some(depth) => engine.closure_with_depth(&item, depth),
                None => engine.closure(&item),
            };
            Ok(json!({ "item": item.key, "closure": closure }))
        }

        Commands::Ledger { item } => {
            let item = resolve_one(catalog, item)?;
            Ok(json!({
                "item": item.key,
                "sources": engine.sync_sources(&item),
                "targets": engine.sync_targets(&item),
                "last_target_sync_time": engine.last_target_sync_time(&item),
            }))
        }

        Commands::Dispatch {
            items,
            rules,
            target,
            qualifier,
        } => {
            let mut request = DispatchRequest::new(items.into_iter().map(ItemKey::new));
            if !rules.is_empty() {
                request = request.with_rules(rules.iter().map(String::as_str));
            }
            if let Some(target) = target {
                request = request.toward(target);
            }
            if let Some(qualifier) = qualifier {
                request = request.with_qualifier(qualifier);
            }
            Ok(serde_json::to_value(engine.dispatch(request, ctx)?)?)
        }

        Commands::DispatchPull { items } => {
            let items = resolve(catalog, &items)?;
            Ok(serde_json::to_value(engine.dispatch_pull(&items, ctx)?)?)
        }

        Commands::DispatchVersions {
            versions,
            rules,
            target,
            qualifier,
        } => {
            let versions: Vec<VersionId> = versions.into_iter().map(VersionId::new).collect();
            let rules: Vec<RuleId> = rules.into_iter().map(RuleId::new).collect();
            let target = target.map(VersionId::new);
            let report = engine.dispatch_versions(
                &versions,
                (!rules.is_empty()).then_some(rules.as_slice()),
                target.as_ref(),
                qualifier.as_deref(),
                ctx,
            )?;
            Ok(serde_json::to_value(report)?)
        }
    }
}

fn resolve(catalog: &dyn CatalogRepository, keys: &[u64]) -> Result<Vec<VersionedItem>> {
    keys.iter().map(|key| resolve_one(catalog, *key)).collect()
}

fn resolve_one(catalog: &dyn CatalogRepository, key: u64) -> Result<VersionedItem> {
    catalog
        .item(ItemKey::new(key))
        .ok_or_else(|| anyhow!("unknown item {key}"))
        .context("resolving command input")
}

#[cfg(test)]
mod tests {
    use super::*;
    use catsync_core::Principal;
    use catsync_store::{MemoryCatalog, QueuedJobRuntime};
    use catsync_engine::{Collaborators, EngineConfig};
    use std::sync::Arc;

    const FIXTURE: &str = r#"
        admins = ["admin"]

        [[types]]
        code = "Item"

        [[types]]
        code = "Product"
        extends = "Item"

        [[versions]]
        id = "staged"

        [[versions]]
        id = "online"

        [[rules]]
        id = "r1"
        code = "r1"
        source_version = "staged"
        target_version = "online"
        root_types = ["Product"]

        [[items]]
        key = 1
        type_code = "Product"
        version = "staged"
        modified_at = "2024-01-01T00:00:00Z"
        counterparts = [101]

        [[items]]
        key = 101
        type_code = "Product"
        version = "online"
        modified_at = "2024-01-01T00:00:00Z"

        [[timestamps]]
        source_item = 1
        target_item = 101
        rule = "r1"
        last_sync_time = "2024-02-01T00:00:00Z"
    "#;

    fn setup() -> (SyncEngine, Arc<MemoryCatalog>) {
        let parts = catsync_store::CatalogFixture::from_toml_str(FIXTURE)
            .unwrap()
            .build()
            .unwrap();
        let catalog = Arc::new(parts.catalog);
        let (jobs, _worker, _handle) = QueuedJobRuntime::new(catsync_core::ExecutionKind::VersionSync);
        let ports = Collaborators {
            schema: Arc::new(parts.schema),
            catalog: catalog.clone(),
            ledger: Arc::new(parts.ledger),
            values: catalog.clone(),
            authorizer: Arc::new(parts.authorization),
            jobs: Arc::new(jobs),
        };
        (SyncEngine::new(ports, EngineConfig::default()).unwrap(), catalog)
    }

    #[test]
    fn test_status_command_renders_contexts() {
        let (engine, catalog) = setup();
        let ctx = AccessContext::new(Principal::new("admin"));
        let value = run(Commands::Status { items: vec![1] }, &engine, catalog.as_ref(), &ctx).unwrap();
        assert_eq!(value[0]["item"], 1);
        assert_eq!(value[0]["push_status"], "ok");
        assert_eq!(value[0]["affected_items"][0]["key"], 101);
    }

    #[test]
    fn test_unknown_item_is_an_error() {
        let (engine, catalog) = setup();
        let ctx = AccessContext::new(Principal::new("admin"));
        let err = run(Commands::Ledger { item: 9 }, &engine, catalog.as_ref(), &ctx).unwrap_err();
        assert!(format!("{err:#}").contains("unknown item 9"));
    }

    #[test]
    fn test_ledger_command() {
        let (engine, catalog) = setup();
        let ctx = AccessContext::new(Principal::new("admin"));
        let value = run(Commands::Ledger { item: 101 }, &engine, catalog.as_ref(), &ctx).unwrap();
        assert_eq!(value["sources"][0]["key"], 1);
        assert_eq!(value["last_target_sync_time"], "2024-02-01T00:00:00Z");
    }
}

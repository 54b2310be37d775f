//! Turns table patterns into concrete, dependency-ordered table operations.

use common::matching::{expand_table_globs, parse_table, qualify};
use common::paths::{format_table, join_paths};
use common::{BackupTableConfig, TableConfig};
use log::{debug, warn};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use storage::StorageBackend;

use crate::{Result, RunReport};

/// A foreign key edge: `table` references `referenced`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    pub table: String,
    pub referenced: String,
}

impl ForeignKey {
    pub fn new(table: impl Into<String>, referenced: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            referenced: referenced.into(),
        }
    }
}

/// One concrete table under one matching table config.
#[derive(Debug, Clone, PartialEq)]
pub struct TableOp<T> {
    pub schema: String,
    pub table_name: String,
    pub full_name: String,
    pub config: T,
}

/// Schema-level work derived from a [`TableOp`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaOp<T> {
    pub name: String,
    pub config: T,
}

impl<T: TableConfig> TableOp<T> {
    pub fn new(full_name: &str, config: T) -> Self {
        let (schema, table_name) = parse_table(full_name);
        let schema = schema.unwrap_or("public");
        Self {
            schema: schema.to_string(),
            table_name: table_name.to_string(),
            full_name: format!("{schema}.{table_name}"),
            config,
        }
    }

    /// The location template with `{table}` filled in.
    pub fn location(&self) -> String {
        format_table(self.config.location(), &self.full_name)
    }

    pub fn schema_op(&self) -> SchemaOp<T> {
        SchemaOp {
            name: self.schema.clone(),
            config: self.config.clone(),
        }
    }
}

impl TableOp<BackupTableConfig> {
    pub fn query(&self) -> String {
        format_table(&self.config.query, &self.full_name)
    }
}

/// Orders tables so every table comes after the tables it references.
///
/// A table's level is one more than the highest level among the tables it
/// references; tables referencing nothing sit at level 1. Self references and
/// cycles are ignored. Ties keep the input order.
pub fn order_by_dependencies(tables: Vec<String>, foreign_keys: &[ForeignKey]) -> Vec<String> {
    let mut parents: HashMap<&str, Vec<&str>> = HashMap::new();
    for fk in foreign_keys {
        if fk.table != fk.referenced {
            parents
                .entry(fk.table.as_str())
                .or_default()
                .push(fk.referenced.as_str());
        }
    }

    fn level<'a>(
        table: &'a str,
        parents: &HashMap<&'a str, Vec<&'a str>>,
        levels: &mut HashMap<&'a str, usize>,
        visiting: &mut HashSet<&'a str>,
    ) -> usize {
        if let Some(level) = levels.get(table) {
            return *level;
        }
        if !visiting.insert(table) {
            return 0;
        }
        let deepest = parents
            .get(table)
            .map(|refs| {
                refs.iter()
                    .map(|parent| level(*parent, parents, levels, visiting))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        visiting.remove(table);
        levels.insert(table, deepest + 1);
        deepest + 1
    }

    let mut levels: HashMap<&str, usize> = HashMap::new();
    let mut visiting = HashSet::new();
    let mut ranked: Vec<(usize, usize)> = tables
        .iter()
        .enumerate()
        .map(|(index, table)| (level(table, &parents, &mut levels, &mut visiting), index))
        .collect();
    ranked.sort();

    ranked
        .into_iter()
        .map(|(_, index)| tables[index].clone())
        .collect()
}

/// Every table transitively referenced by `table`, nearest first.
pub fn reachable(foreign_keys: &[ForeignKey], table: &str) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::from([table]);
    let mut queue: VecDeque<&str> = VecDeque::from([table]);
    let mut found = Vec::new();

    while let Some(current) = queue.pop_front() {
        for fk in foreign_keys.iter().filter(|fk| fk.table == current) {
            if seen.insert(fk.referenced.as_str()) {
                found.push(fk.referenced.clone());
                queue.push_back(fk.referenced.as_str());
            }
        }
    }

    found
}

/// Expands table patterns against `existing_tables`, which must already be in
/// dependency order; the result keeps that order.
///
/// A table matched by several configs yields one op per config. Tables the
/// active manifest transaction already covers are skipped.
pub async fn expand_table_ops<T: TableConfig>(
    configs: &[T],
    existing_tables: &[String],
    default_schema: &str,
    storage: &StorageBackend,
    warn_for_unused_tables: bool,
    report: &mut RunReport,
) -> Result<Vec<TableOp<T>>> {
    let mut matching: HashMap<String, Vec<&T>> = HashMap::new();
    let mut skipped: BTreeSet<String> = BTreeSet::new();

    for config in configs {
        let pattern = qualify(config.name(), default_schema);
        let expanded = expand_table_globs(existing_tables, &pattern);
        if expanded.is_empty() {
            if warn_for_unused_tables {
                warn!("Skipping table definition `{pattern}` which did not match any tables.");
            }
            continue;
        }

        for table in expanded {
            if storage.check_manifest(&table).await? {
                if skipped.insert(table.clone()) {
                    debug!("Skipping {table}...");
                }
                continue;
            }

            let excluded = config.exclude().iter().any(|exclusion| {
                expand_table_globs(existing_tables, &qualify(exclusion, default_schema))
                    .contains(&table)
            });
            if excluded {
                debug!("Excluding {table}");
                continue;
            }

            matching.entry(table).or_default().push(config);
        }
    }

    for table in skipped {
        report.skip(table);
    }

    Ok(existing_tables
        .iter()
        .filter_map(|table| matching.get(table).map(|configs| (table, configs)))
        .flat_map(|(table, configs)| {
            configs
                .iter()
                .map(move |config| TableOp::new(table, (*config).clone()))
        })
        .collect())
}

/// Adds ops for every table reachable over foreign keys from an op that follows
/// them, then restores dependency order across the whole list.
///
/// A synthesized op copies its owner's config, located under the owner's
/// rendered location (`<owner location>/<table>`).
pub fn materialize_dependencies<T: TableConfig>(
    ops: Vec<TableOp<T>>,
    foreign_keys: &[ForeignKey],
    existing_tables: &[String],
) -> Result<Vec<TableOp<T>>> {
    let mut known: HashSet<String> = ops.iter().map(|op| op.full_name.clone()).collect();
    let mut dependencies = Vec::new();

    for op in ops.iter().filter(|op| op.config.follow_foreign_keys()) {
        let owner_location = op.location();
        for table in reachable(foreign_keys, &op.full_name) {
            if !known.insert(table.clone()) {
                continue;
            }
            let location = join_paths([owner_location.as_str(), "{table}"])?;
            debug!("Following foreign keys from {} to {table}", op.full_name);
            dependencies.push(TableOp::new(&table, op.config.for_table(&table, location)));
        }
    }

    if dependencies.is_empty() {
        return Ok(ops);
    }

    let position: HashMap<&str, usize> = existing_tables
        .iter()
        .enumerate()
        .map(|(index, table)| (table.as_str(), index))
        .collect();

    let mut all: Vec<TableOp<T>> = ops.into_iter().chain(dependencies).collect();
    all.sort_by_key(|op| {
        position
            .get(op.full_name.as_str())
            .copied()
            .unwrap_or(usize::MAX)
    });
    Ok(all)
}

/// Distinct schemas of `ops`, in first-seen order.
pub fn schema_ops<T: TableConfig>(ops: &[TableOp<T>]) -> Vec<SchemaOp<T>> {
    let mut seen = HashSet::new();
    ops.iter()
        .filter(|op| op.config.ddl() && seen.insert(op.schema.clone()))
        .map(TableOp::schema_op)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::RootConfig;
    use serde_json::json;
    use std::sync::Arc;
    use storage::{Manifest, ManifestAction, ManifestLedger, MemoryLedger, MemoryProvider};

    fn names(tables: &[&str]) -> Vec<String> {
        tables.iter().map(|t| t.to_string()).collect()
    }

    fn chain() -> Vec<ForeignKey> {
        vec![
            ForeignKey::new("public.sale", "public.product"),
            ForeignKey::new("public.product", "public.store"),
        ]
    }

    fn backup_tables(raw: serde_json::Value) -> Vec<BackupTableConfig> {
        let root = RootConfig::from_raw(raw.as_object().unwrap()).unwrap();
        root.backup.unwrap().tables
    }

    fn storage() -> StorageBackend {
        StorageBackend::new(Arc::new(MemoryProvider::new()))
    }

    #[test]
    fn dependency_order_puts_parents_first() {
        let ordered = order_by_dependencies(
            names(&["public.sale", "public.product", "public.store", "public.other"]),
            &chain(),
        );
        assert_eq!(
            ordered,
            names(&["public.store", "public.other", "public.product", "public.sale"])
        );
    }

    #[test]
    fn cycles_do_not_hang() {
        let edges = vec![
            ForeignKey::new("public.a", "public.b"),
            ForeignKey::new("public.b", "public.a"),
            ForeignKey::new("public.a", "public.a"),
        ];
        let ordered = order_by_dependencies(names(&["public.a", "public.b"]), &edges);
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn reachable_follows_the_whole_chain() {
        assert_eq!(
            reachable(&chain(), "public.sale"),
            names(&["public.product", "public.store"])
        );
        assert!(reachable(&chain(), "public.store").is_empty());
    }

    #[tokio::test]
    async fn globs_and_excludes() {
        let existing = names(&["public.orders", "public.secret_keys", "other.orders"]);
        let configs = backup_tables(json!({
            "tables": [{"name": "public.*", "exclude": ["public.secret*"]}]
        }));

        let mut report = RunReport::default();
        let ops = expand_table_ops(&configs, &existing, "public", &storage(), true, &mut report)
            .await
            .unwrap();
        let tables: Vec<_> = ops.iter().map(|op| op.full_name.as_str()).collect();
        assert_eq!(tables, ["public.orders"]);
    }

    #[tokio::test]
    async fn unqualified_names_use_the_default_schema() {
        let existing = names(&["public.orders", "other.orders"]);
        let configs = backup_tables(json!({"tables": ["orders"]}));

        let mut report = RunReport::default();
        let ops = expand_table_ops(&configs, &existing, "other", &storage(), false, &mut report)
            .await
            .unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].full_name, "other.orders");
        assert_eq!(ops[0].schema, "other");
        assert_eq!(ops[0].table_name, "orders");
    }

    #[tokio::test]
    async fn ops_follow_existing_order_and_repeat_per_config() {
        let existing = names(&["public.store", "public.product", "public.sale"]);
        let configs = backup_tables(json!({
            "tables": [
                {"name": "public.sale"},
                {"name": "public.*", "location": "all/{table}"},
            ]
        }));

        let mut report = RunReport::default();
        let ops = expand_table_ops(&configs, &existing, "public", &storage(), true, &mut report)
            .await
            .unwrap();
        let rendered: Vec<_> = ops
            .iter()
            .map(|op| format!("{}@{}", op.full_name, op.location()))
            .collect();
        assert_eq!(
            rendered,
            [
                "public.store@all/public.store",
                "public.product@all/public.product",
                "public.sale@backups/public.sale",
                "public.sale@all/public.sale",
            ]
        );
    }

    #[tokio::test]
    async fn manifest_entries_are_skipped() {
        let ledger = MemoryLedger::new();
        let manifest = Manifest::open(Box::new(ledger.clone()), ManifestAction::Backup)
            .await
            .unwrap();
        manifest.record("public.store", "backups/x.csv").await.unwrap();
        assert!(ledger.contains(1, "public.store").await.unwrap());

        let storage = storage().with_manifest(Some(manifest));
        let existing = names(&["public.store", "public.product"]);
        let configs = backup_tables(json!({"tables": ["public.*"]}));

        let mut report = RunReport::default();
        let ops = expand_table_ops(&configs, &existing, "public", &storage, true, &mut report)
            .await
            .unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].full_name, "public.product");
        assert_eq!(report.skipped, ["public.store"]);
    }

    #[tokio::test]
    async fn dependencies_are_added_once_in_dependency_order() {
        let existing = names(&["public.store", "public.product", "public.sale"]);
        let configs = backup_tables(json!({
            "tables": [{"name": "public.sale", "follow_foreign_keys": true}]
        }));

        let mut report = RunReport::default();
        let ops = expand_table_ops(&configs, &existing, "public", &storage(), true, &mut report)
            .await
            .unwrap();
        let ops = materialize_dependencies(ops, &chain(), &existing).unwrap();

        let tables: Vec<_> = ops.iter().map(|op| op.full_name.as_str()).collect();
        assert_eq!(tables, ["public.store", "public.product", "public.sale"]);
        assert_eq!(ops[0].location(), "backups/public.sale/public.store");
        assert_eq!(ops[1].location(), "backups/public.sale/public.product");
        assert!(ops[0].config.follow_foreign_keys);
    }

    #[tokio::test]
    async fn dependencies_already_planned_are_not_duplicated() {
        let existing = names(&["public.store", "public.product", "public.sale"]);
        let configs = backup_tables(json!({
            "tables": [
                {"name": "public.sale", "follow_foreign_keys": true},
                {"name": "public.store"},
            ]
        }));

        let mut report = RunReport::default();
        let ops = expand_table_ops(&configs, &existing, "public", &storage(), true, &mut report)
            .await
            .unwrap();
        let ops = materialize_dependencies(ops, &chain(), &existing).unwrap();
        let tables: Vec<_> = ops.iter().map(|op| op.full_name.as_str()).collect();
        assert_eq!(tables, ["public.store", "public.product", "public.sale"]);
        assert_eq!(ops[0].location(), "backups/public.store");
    }

    #[test]
    fn schema_ops_are_distinct() {
        let configs = backup_tables(json!({"tables": ["a.x"]}));
        let ops = vec![
            TableOp::new("a.x", configs[0].clone()),
            TableOp::new("a.y", configs[0].clone()),
            TableOp::new("b.z", configs[0].clone()),
        ];
        let schemas: Vec<_> = schema_ops(&ops).into_iter().map(|s| s.name).collect();
        assert_eq!(schemas, ["a", "b"]);
    }

    #[test]
    fn queries_render_the_table() {
        let configs = backup_tables(json!({"tables": [{"name": "public.a", "query": "select id from {table}"}]}));
        let op = TableOp::new("public.a", configs[0].clone());
        assert_eq!(op.query(), "select id from public.a");
    }
}

//! Full migration tasks against in-memory databases.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{orders_table, simple_table, source_with, test_config, FakeConnector, FakeTable};
use mysql_gauss_migrate::core::{ImportedKey, IndexEntry, ReferentialAction};
use mysql_gauss_migrate::{Orchestrator, SchemaIntrospector, TaskRegistry, TaskStatus};

const ORDERS_DEFINITION: &str = "CREATE TABLE `orders` (
  `id` int NOT NULL,
  `name` varchar(50) DEFAULT NULL,
  `created` datetime DEFAULT CURRENT_TIMESTAMP,
  PRIMARY KEY (`id`),
  CONSTRAINT `orders_chk_1` CHECK ((`id` >= 0))
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

const RECENT_VIEW: &str = "CREATE ALGORITHM=UNDEFINED DEFINER=`root`@`%` SQL SECURITY DEFINER \
                           VIEW `recent` AS select `orders`.`id` AS `id` from `orders`";

fn shop(order_rows: usize) -> FakeConnector {
    let mut orders = orders_table(order_rows);
    orders.definition = Some(ORDERS_DEFINITION.to_string());
    orders.index_entries = vec![IndexEntry {
        index_name: "idx_orders_name".to_string(),
        column_name: "name".to_string(),
        is_unique: false,
        seq_in_index: 1,
    }];

    let mut lines = simple_table(3);
    lines.imported_keys = vec![ImportedKey {
        constraint_name: "fk_lines_order".to_string(),
        column_name: "id".to_string(),
        ref_table: "orders".to_string(),
        ref_column: "id".to_string(),
        key_seq: 1,
        update_rule: ReferentialAction::Cascade,
        delete_rule: ReferentialAction::Restrict,
    }];

    let mut source = source_with(vec![("orders", orders), ("order_lines", lines)]);
    source.views.insert("recent".to_string(), RECENT_VIEW.to_string());
    FakeConnector::new(source)
}

fn orchestrator(connector: &FakeConnector, dir: &std::path::Path, batch_size: usize) -> Orchestrator {
    Orchestrator::with_connector(test_config(dir, batch_size), Arc::new(connector.clone()))
}

#[tokio::test]
async fn test_full_migration_of_orders() {
    let dir = tempfile::tempdir().unwrap();
    let connector = shop(2500);
    let orch = orchestrator(&connector, dir.path(), 1000);

    let result = orch.run("task-1").await.unwrap();

    assert_eq!(result.status, TaskStatus::Success);
    assert!(result.failed_tables.is_empty());
    let transfer = result.transfer.as_ref().unwrap();
    assert_eq!(transfer.processed_records, 2503);
    assert_eq!(transfer.processed_tables, 2);

    let progress = orch.progress("task-1");
    assert_eq!(progress.status, TaskStatus::Success);
    assert_eq!(progress.percentage, 100.0);

    let structure = std::fs::read_to_string(dir.path().join("shop_table_structure.sql")).unwrap();
    assert!(structure.contains("    name VARCHAR(150)"));
    assert!(structure.contains("    created TIMESTAMP DEFAULT CURRENT_TIMESTAMP"));
    assert!(structure.contains("    id INTEGER NOT NULL"));

    let target = connector.target();
    assert_eq!(target.flush_sizes("orders"), vec![1000, 1000, 500]);
    assert_eq!(target.rows("orders"), 2500);
    assert_eq!(target.rows("order_lines"), 3);
    assert_eq!(target.search_path.as_deref(), Some("public"));
}

#[tokio::test]
async fn test_scripts_are_written_and_applied_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let connector = shop(10);
    let orch = orchestrator(&connector, dir.path(), 1000);

    let result = orch.run("task-order").await.unwrap();

    let names: Vec<String> = result
        .scripts
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "shop_table_structure.sql",
            "shop_indexes.sql",
            "shop_foreign_keys.sql",
            "shop_check_constraints.sql",
            "shop_views.sql",
        ]
    );
    assert!(result.scripts.iter().all(|p| p.exists()));
    assert_eq!(result.executions.len(), 5);
    assert!(result.executions.iter().all(|o| o.success()));

    let target = connector.target();
    let position = |needle: &str| {
        target
            .applied
            .iter()
            .position(|s| s.contains(needle))
            .unwrap_or_else(|| panic!("{} was not applied", needle))
    };
    let create = position("CREATE TABLE orders");
    let index = position("CREATE INDEX idx_orders_name ON orders (name)");
    let fk = position("FOREIGN KEY (id) REFERENCES orders (id)");
    let check = position("ALTER TABLE orders ADD CONSTRAINT orders_chk_1 CHECK ((id >= 0))");
    let view = position("CREATE VIEW recent AS select orders.id AS id from orders");
    assert!(create < index && index < fk && fk < check && check < view);
}

#[tokio::test]
async fn test_target_reintrospects_to_source_names() {
    let dir = tempfile::tempdir().unwrap();
    let connector = shop(5);
    let orch = orchestrator(&connector, dir.path(), 1000);
    orch.run("task-roundtrip").await.unwrap();

    let source = mysql_gauss_migrate::core::Connector::connect_source(&connector)
        .await
        .unwrap();
    let target = mysql_gauss_migrate::core::Connector::connect_target(&connector)
        .await
        .unwrap();
    let before = SchemaIntrospector::new(source.as_ref())
        .introspect("shop")
        .await
        .unwrap();
    let after = SchemaIntrospector::new(target.as_ref())
        .introspect("public")
        .await
        .unwrap();

    let mut source_tables: Vec<_> = before.tables.iter().map(|t| t.name.clone()).collect();
    let mut target_tables: Vec<_> = after.tables.iter().map(|t| t.name.clone()).collect();
    source_tables.sort();
    target_tables.sort();
    assert_eq!(source_tables, target_tables);

    for table in &before.tables {
        let migrated = after.tables.iter().find(|t| t.name == table.name).unwrap();
        assert_eq!(migrated.column_names(), table.column_names());
        assert_eq!(migrated.primary_key, table.primary_key);
    }
}

#[tokio::test]
async fn test_mixed_case_and_reserved_names_migrate() {
    let dir = tempfile::tempdir().unwrap();
    let mut items = simple_table(4);
    items.columns[0].name = "ItemId".to_string();
    let mut order = simple_table(3);
    order.columns[1].name = "user".to_string();
    let connector = FakeConnector::new(source_with(vec![("OrderItems", items), ("order", order)]));
    let orch = orchestrator(&connector, dir.path(), 1000);

    let result = orch.run("task-names").await.unwrap();

    assert_eq!(result.status, TaskStatus::Success);
    assert!(result.failed_tables.is_empty());
    let structure = std::fs::read_to_string(dir.path().join("shop_table_structure.sql")).unwrap();
    assert!(structure.contains("CREATE TABLE OrderItems ("));
    assert!(structure.contains("CREATE TABLE \"order\" ("));
    assert!(structure.contains("    \"user\" VARCHAR(60)"));

    let target = connector.target();
    assert_eq!(
        target.tables.keys().collect::<Vec<_>>(),
        vec!["order", "orderitems"]
    );
    assert_eq!(target.tables["orderitems"].columns[0].name, "itemid");
    assert_eq!(target.rows("orderitems"), 4);
    assert_eq!(target.rows("order"), 3);
}

#[tokio::test]
async fn test_structure_failure_fails_task_without_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let connector = shop(50);
    connector
        .target()
        .fail_statements
        .push("CREATE TABLE orders".to_string());
    let orch = orchestrator(&connector, dir.path(), 1000);

    let result = orch.run("task-fail").await.unwrap();

    assert_eq!(result.status, TaskStatus::Fail);
    assert!(result.transfer.is_none());
    assert_eq!(result.executions.len(), 1);
    assert_eq!(result.executions[0].failures.len(), 1);

    let progress = orch.progress("task-fail");
    assert_eq!(progress.status, TaskStatus::Fail);
    assert!(progress.percentage <= 30.0);
    assert!(connector.target().flushes.is_empty());
    assert!(connector.source().queries.is_empty());
}

#[tokio::test]
async fn test_post_script_failure_still_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let connector = shop(20);
    connector
        .target()
        .fail_statements
        .push("idx_orders_name".to_string());
    let orch = orchestrator(&connector, dir.path(), 1000);

    let result = orch.run("task-post").await.unwrap();

    assert_eq!(result.status, TaskStatus::Success);
    let indexes = &result.executions[1];
    assert_eq!(indexes.script, "shop_indexes.sql");
    assert!(!indexes.success());
    assert!(result.executions[4].success());
    assert_eq!(orch.progress("task-post").percentage, 100.0);
    assert_eq!(connector.target().rows("orders"), 20);
}

#[tokio::test]
async fn test_partial_structure_commits_but_fails_task() {
    let dir = tempfile::tempdir().unwrap();
    let connector = shop(20);
    connector
        .target()
        .fail_statements
        .push("CREATE TABLE order_lines".to_string());
    let mut config = test_config(dir.path(), 1000);
    config.migration.script_failure_policy =
        mysql_gauss_migrate::ScriptFailurePolicy::CommitOnAnyFailure;
    let orch = Orchestrator::with_connector(config, Arc::new(connector.clone()));

    // The structure script is not fully applied, so the task fails before
    // any data moves.
    let result = orch.run("task-missing").await.unwrap();
    assert_eq!(result.status, TaskStatus::Fail);
    assert!(connector.target().tables.contains_key("orders"));
    assert_eq!(connector.target().rows("orders"), 0);
}

#[tokio::test]
async fn test_source_unreachable_fails_task() {
    let dir = tempfile::tempdir().unwrap();
    let connector = shop(1);
    connector.source_down.store(true, Ordering::SeqCst);
    let orch = orchestrator(&connector, dir.path(), 1000);

    let err = orch.run("task-down").await.unwrap_err();

    assert!(err.to_string().contains("connection refused"));
    assert_eq!(orch.progress("task-down").status, TaskStatus::Fail);
    assert!(!dir.path().join("shop_table_structure.sql").exists());
}

#[tokio::test]
async fn test_rerun_replaces_finished_record() {
    let dir = tempfile::tempdir().unwrap();
    let connector = shop(2);
    let registry = Arc::new(TaskRegistry::new());
    let orch = orchestrator(&connector, dir.path(), 1000).with_registry(Arc::clone(&registry));

    orch.run("nightly").await.unwrap();
    assert_eq!(registry.get("nightly").status, TaskStatus::Success);

    // Tables exist now, so the second structure script fails.
    let second = orch.run("nightly").await.unwrap();
    assert_eq!(second.status, TaskStatus::Fail);
    assert_eq!(registry.get("nightly").status, TaskStatus::Fail);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_unknown_task_reads_as_initial() {
    let dir = tempfile::tempdir().unwrap();
    let connector = shop(0);
    let orch = orchestrator(&connector, dir.path(), 1000);

    let progress = orch.progress("never-started");
    assert_eq!(progress.status, TaskStatus::Init);
    assert_eq!(progress.percentage, 0.0);
}

#[tokio::test]
async fn test_generate_scripts_does_not_touch_target() {
    let dir = tempfile::tempdir().unwrap();
    let connector = shop(5);
    let orch = orchestrator(&connector, dir.path(), 1000);

    let generated = orch.generate_scripts().await.unwrap();

    assert_eq!(generated.schema, "shop");
    assert_eq!(generated.tables, 2);
    assert_eq!(generated.views, 1);
    assert_eq!(generated.files.len(), 5);
    assert_eq!(connector.target().connections, 0);

    let views = std::fs::read_to_string(dir.path().join("shop_views.sql")).unwrap();
    assert_eq!(views, "CREATE VIEW recent AS select orders.id AS id from orders;\n\n");
}

#[tokio::test]
async fn test_views_without_as_select_are_kept() {
    let dir = tempfile::tempdir().unwrap();
    let connector = shop(1);
    {
        let mut source = connector.source();
        source.views.insert(
            "totals".to_string(),
            "CREATE VIEW `totals` AS with t as (select 1 AS n) select n from t".to_string(),
        );
        source
            .views
            .insert("odd".to_string(), "CREATE VIEW `odd`".to_string());
    }
    let orch = orchestrator(&connector, dir.path(), 1000);

    let generated = orch.generate_scripts().await.unwrap();

    assert_eq!(generated.views, 3);
    let views = std::fs::read_to_string(dir.path().join("shop_views.sql")).unwrap();
    assert_eq!(
        views,
        "CREATE VIEW odd AS CREATE VIEW odd;\n\n\
         CREATE VIEW recent AS select orders.id AS id from orders;\n\n\
         CREATE VIEW totals AS with t as (select 1 AS n) select n from t;\n\n"
    );
}

#[tokio::test]
async fn test_empty_schema_produces_empty_scripts() {
    let dir = tempfile::tempdir().unwrap();
    let connector = FakeConnector::new(source_with(Vec::<(&str, FakeTable)>::new()));
    let orch = orchestrator(&connector, dir.path(), 1000);

    let result = orch.run("task-empty").await.unwrap();

    assert_eq!(result.status, TaskStatus::Success);
    for script in &result.scripts {
        assert!(std::fs::read_to_string(script).unwrap().trim().is_empty());
    }
    assert_eq!(result.transfer.unwrap().total_tables, 0);
}

#[tokio::test]
async fn test_health_check() {
    let dir = tempfile::tempdir().unwrap();
    let connector = shop(0);
    let orch = orchestrator(&connector, dir.path(), 1000);

    let healthy = orch.health_check().await.unwrap();
    assert!(healthy.healthy);
    assert!(healthy.source_connected && healthy.target_connected);

    connector.target_down.store(true, Ordering::SeqCst);
    let degraded = orch.health_check().await.unwrap();
    assert!(!degraded.healthy);
    assert!(degraded.source_connected);
    assert!(degraded.target_error.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_result_serializes_status() {
    let dir = tempfile::tempdir().unwrap();
    let connector = shop(1);
    let orch = orchestrator(&connector, dir.path(), 1000);

    let json = orch.run("task-json").await.unwrap().to_json().unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["status"], "SUCCESS");
    assert_eq!(value["task_id"], "task-json");
    assert_eq!(value["schema"], "shop");
}

use std::fs;
use std::sync::{Arc, Mutex};

use pagesmith::{
    AbsolutePath, ChangeKind, EventKind, FsEvent, LocalDriver, MemoryDriver, Pipeline,
    ProjectConfig, ReactiveFs, RelativePath, RootedDriver, WorkspacePaths, playbook_parser,
};
use serde_json::{Value, json};
use tempfile::tempdir;

const DEMO: &str = r#"---
siteName: Demo
---

# Demo site

```sql {kind: "head", name: "pragma"}
PRAGMA foreign_keys = ON;
```

## Admin

```sql {kind: "page", path: "admin/index"}
SELECT 'shell' AS component;
```

## Users

```sql {path: "users/list"}
SELECT * FROM users;
```

```sql {kind: "tail"}
-- done
```
"#;

fn memory_pipeline(files: &[(&str, &str)]) -> Pipeline<MemoryDriver> {
    let mut driver = MemoryDriver::new();
    for (path, contents) in files {
        driver = driver.with_file(path, contents).unwrap();
    }
    let rooted = RootedDriver::new(driver, AbsolutePath::parse("/project").unwrap());
    Pipeline::new(ReactiveFs::new(rooted), ProjectConfig::default())
}

#[test]
fn demo_notebook_yields_four_typed_fences() {
    let notebook = playbook_parser().parse("demo.md", DEMO).unwrap();

    assert_eq!(notebook.frontmatter["siteName"], json!("Demo"));
    assert_eq!(notebook.blocks.len(), 4);
    let kinds: Vec<&str> = notebook
        .blocks
        .iter()
        .map(|block| {
            block
                .attrs_safe
                .as_ref()
                .and_then(|safe| safe.get("kind"))
                .and_then(Value::as_str)
                .unwrap()
        })
        .collect();
    assert_eq!(kinds, vec!["head", "page", "page", "tail"]);
    assert!(notebook.issues.is_empty(), "{:?}", notebook.issues);
}

#[test]
fn demo_notebook_materializes_expected_paths() {
    let pipeline = memory_pipeline(&[("/project/demo.md", DEMO)]);
    let report = pipeline.run().unwrap();

    for expected in [
        "dist/sql.d/head/pragma.sql",
        "dist/admin/index.sql",
        "dist/users/list.sql",
        "dist/sql.d/tail/000.sql",
    ] {
        assert!(
            report.written.iter().any(|path| path == expected),
            "missing {expected} in {:?}",
            report.written
        );
    }
    assert!(report.written.iter().any(|path| path.ends_with("catalog.auto.json")));
    assert_eq!(report.summary.total, 0);

    let list = pipeline
        .fs()
        .read_to_string(&RelativePath::parse("dist/users/list.sql").unwrap())
        .unwrap();
    assert_eq!(list, "SELECT * FROM users;");
}

#[test]
fn rebuild_leaves_identical_files_untouched() {
    let pipeline = memory_pipeline(&[("/project/demo.md", DEMO)]);
    let first = pipeline.run().unwrap();

    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    pipeline.fs().subscribe(EventKind::WatchChange, move |event| {
        if let FsEvent::Watch(change) = event {
            sink.lock().unwrap().push(change.change);
        }
    });

    let second = pipeline.run().unwrap();
    assert!(second.written.is_empty());
    assert_eq!(second.unchanged.len(), first.written.len());
    assert!(changes.lock().unwrap().is_empty());
}

#[test]
fn first_build_reports_created_files() {
    let pipeline = memory_pipeline(&[("/project/demo.md", DEMO)]);
    let created = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&created);
    pipeline.fs().subscribe(EventKind::WatchChange, move |event| {
        if let FsEvent::Watch(change) = event {
            if change.change == ChangeKind::Create {
                sink.lock().unwrap().push(change.path.to_string());
            }
        }
    });

    pipeline.run().unwrap();
    let created = created.lock().unwrap();
    assert!(created.iter().any(|path| path == "dist/admin/index.sql"));
}

#[test]
fn sql_batch_orders_head_first_and_tail_last() {
    let batch = memory_pipeline(&[("/project/demo.md", DEMO)]).sql().unwrap();
    assert_eq!(batch.first().map(String::as_str), Some("PRAGMA foreign_keys = ON;"));
    assert_eq!(batch.last().map(String::as_str), Some("-- done"));
    assert!(
        batch
            .iter()
            .any(|statement| statement.contains("'users/list.sql'")
                && statement.contains("WHERE sqlpage_files.contents <> excluded.contents"))
    );
}

#[test]
fn local_workspace_build_writes_to_disk() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("site");
    fs::create_dir_all(root.join(".pagesmith")).unwrap();
    fs::write(root.join("demo.md"), DEMO).unwrap();
    fs::create_dir_all(root.join("reports")).unwrap();
    fs::write(root.join("reports").join("q1.sql"), "SELECT 1;").unwrap();

    let paths = WorkspacePaths::new(root.clone(), root.join(".pagesmith"));
    let pipeline: Pipeline<LocalDriver> = Pipeline::open(&paths, ProjectConfig::default()).unwrap();
    let report = pipeline.run().unwrap();

    assert_eq!(report.documents, vec!["demo.md", "reports/q1.sql"]);
    assert_eq!(
        fs::read_to_string(root.join("dist").join("admin").join("index.sql")).unwrap(),
        "SELECT 'shell' AS component;"
    );
    assert_eq!(
        fs::read_to_string(root.join("dist").join("reports").join("q1.sql")).unwrap(),
        "SELECT 1;"
    );
    assert!(root.join("dist/sql.d/auto/route/tree.auto.txt").is_file());
}

//! # Flowscope Engine
//!
//! The Flowscope Engine answers the questions an expression asks while a
//! workflow node is being evaluated: what is the current item, what did node
//! N output, which item of N does the current item descend from, and what is
//! in the surrounding context.
//!
//! ## Key Features
//!
//! - **Data Proxy**: Cursor-relative, read-only access to recorded run data
//! - **Item Lineage**: Deterministic walk over `pairedItem` backlinks
//! - **Reference Paths**: `$json`, `$('Node').item.json.field`, `$items(...)`
//! - **Autocompletion**: Ranked suggestions for partially typed references
//! - **Snapshots**: Workflow, run data, and cursor loaded from one JSON/YAML file
//!
//! ## Usage
//!
//! ```rust
//! use flowscope_engine::{ProxySettings, parse_snapshot_file, resolve_value};
//!
//! let temp_dir = tempfile::tempdir()?;
//! let snapshot_path = temp_dir.path().join("snapshot.yaml");
//! std::fs::write(&snapshot_path, r#"
//! workflow:
//!   name: demo
//!   nodes:
//!     - { name: Start, type: manual }
//!     - { name: End, type: manual }
//!   connections:
//!     Start: { main: [[{ node: End, type: main, index: 0 }]] }
//!   nodeTypes:
//!     manual: { name: manual }
//! runExecutionData:
//!   resultData:
//!     runData:
//!       Start: [{ data: { main: [[{ json: { greeting: hello } }]] } }]
//! cursor: { node: End }
//! "#)?;
//!
//! let prepared = parse_snapshot_file(&snapshot_path)?.prepare()?;
//! let proxy = prepared.session(ProxySettings::default())?;
//! assert_eq!(resolve_value(&proxy, "$json.greeting")?.to_string(), "hello");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`proxy`**: The [`WorkflowDataProxy`] session and its accessors
//! - **`accessor`**: The `$`-named composite accessor ([`DataProxy`])
//! - **`reference`**: Reference path parsing and resolution
//! - **`completions`**: Suggestions for partial references
//! - **`snapshot`**: Snapshot documents and derived invocation data
//! - **`settings`**: Process configuration ([`ProxySettings`])

use std::{fs, path::Path};

use anyhow::{Context, Result};

pub mod accessor;
pub mod completions;
pub mod context;
pub mod cursor;
pub mod error;
mod lineage;
pub mod proxy;
pub mod reference;
pub mod settings;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types for convenience
pub use accessor::{AccessorKind, DataProxy, InputAccessor, MemberKind, NodeAccessor, ProxyMember, Resolution};
pub use completions::complete;
pub use context::ContextValue;
pub use cursor::ExecutionCursor;
pub use error::ProxyError;
pub use proxy::{MAIN_PORT, OutputQuery, ProxyParams, WorkflowDataProxy};
pub use reference::{resolve_reference, resolve_value};
pub use settings::{BLOCK_ENV_ACCESS_ENV, ProxySettings};
pub use snapshot::{PreparedSnapshot, ProxySnapshot};

/// Loads a snapshot document from the filesystem.
///
/// Files with a `.json` extension are parsed as JSON; anything else is parsed
/// as YAML. The workflow inside is validated while parsing, so duplicate node
/// names or connections to unknown nodes are reported here.
///
/// # Errors
///
/// Fails when the file cannot be read or its content is not a valid snapshot.
pub fn parse_snapshot_file(file_path: impl AsRef<Path>) -> Result<ProxySnapshot> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read snapshot file: {}", file_path.display()))?;

    let is_json = file_path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
    let snapshot = if is_json {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON snapshot: {}", file_path.display()))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML snapshot: {}", file_path.display()))?
    };
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../tests/data/autocomplete_snapshot.json");

    #[test]
    fn test_parse_snapshot_file_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let snapshot_path = temp_dir.path().join("snapshot.json");
        fs::write(&snapshot_path, FIXTURE).unwrap();

        let snapshot = parse_snapshot_file(&snapshot_path).expect("parse json snapshot");
        assert_eq!(snapshot.workflow.name(), "test workflow");
        assert_eq!(snapshot.cursor, ExecutionCursor::new("End"));
        assert!(snapshot.execute_data.is_some());
    }

    #[test]
    fn test_parse_snapshot_file_yaml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let snapshot_path = temp_dir.path().join("snapshot.yaml");

        let snapshot_content = r#"
workflow:
  id: "42"
  name: yaml workflow
  nodes:
    - name: Start
      type: manual
    - name: End
      type: manual
  connections:
    Start:
      main:
        - - node: End
            type: main
            index: 0
  nodeTypes:
    manual:
      name: manual
runExecutionData:
  resultData:
    runData:
      Start:
        - data:
            main:
              - - json: { n: 1 }
                - json: { n: 2 }
cursor:
  node: End
  itemIndex: 1
"#;
        fs::write(&snapshot_path, snapshot_content).unwrap();

        let prepared = parse_snapshot_file(&snapshot_path).unwrap().prepare().unwrap();
        let proxy = prepared.session(ProxySettings::default()).unwrap();
        assert_eq!(resolve_value(&proxy, "$json.n").unwrap(), ContextValue::Defined(2.into()));
    }

    #[test]
    fn test_parse_snapshot_file_rejects_invalid_workflow() {
        let temp_dir = tempfile::tempdir().unwrap();
        let snapshot_path = temp_dir.path().join("broken.yaml");
        fs::write(
            &snapshot_path,
            r#"
workflow:
  nodes:
    - { name: Start, type: manual }
  connections:
    Start: { main: [[{ node: Ghost, type: main, index: 0 }]] }
  nodeTypes:
    manual: { name: manual }
cursor: { node: Start }
"#,
        )
        .unwrap();

        let error = parse_snapshot_file(&snapshot_path).unwrap_err();
        assert!(format!("{error:#}").contains("Ghost"));
    }

    #[test]
    fn test_parse_snapshot_file_missing() {
        let error = parse_snapshot_file("does/not/exist.json").unwrap_err();
        assert!(error.to_string().contains("Failed to read snapshot file"));
    }
}

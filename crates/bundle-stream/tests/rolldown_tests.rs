//! Integration tests against the Rolldown backend.

#![cfg(feature = "rolldown")]

mod helpers;

use bundle_stream::{FileMetadata, StreamEvent, StreamOptions, bundle_stream};
use std::sync::Arc;

use futures::StreamExt;
use helpers::{MISSING_INPUT, assert_contents_contain, project, relative_paths, write_file};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

fn create_project() -> TempDir {
    let dir = project();
    write_file(
        dir.path(),
        "src/main.js",
        r#"
import { greet } from "./greet.js";
export const message = greet("stream");
"#,
    );
    write_file(
        dir.path(),
        "src/greet.js",
        r#"
export function greet(name) {
    return "hello " + name;
}
"#,
    );
    dir
}

fn base_options(dir: &TempDir) -> StreamOptions {
    StreamOptions::new()
        .set("cwd", dir.path().to_string_lossy().to_string())
        .input(dir.path().join("src/main.js").to_string_lossy().to_string())
        .file_metadata(FileMetadata::new().cwd(dir.path()))
}

#[tokio::test]
async fn bundles_entry_with_its_imports() {
    let dir = create_project();

    let files = bundle_stream(base_options(&dir).output(json!({ "format": "es" })))
        .into_files()
        .await
        .expect("build should succeed");

    assert_eq!(relative_paths(&files, dir.path()), vec!["main.js"]);
    assert_contents_contain(&files[0], "hello ");
    assert_contents_contain(&files[0], "stream");
}

#[tokio::test]
async fn one_file_per_format() {
    let dir = create_project();

    let files = bundle_stream(base_options(&dir).outputs([
        json!({ "format": "es", "file": "dist/main.mjs" }),
        json!({ "format": "cjs", "file": "dist/main.cjs" }),
    ]))
    .into_files()
    .await
    .unwrap();

    assert_eq!(
        relative_paths(&files, dir.path()),
        vec!["dist/main.mjs", "dist/main.cjs"]
    );
    assert_contents_contain(&files[1], "exports");
}

#[tokio::test]
async fn sourcemap_is_attached_not_emitted() {
    let dir = create_project();

    let files = bundle_stream(
        base_options(&dir).output(json!({ "format": "es", "dir": "dist", "sourcemap": true })),
    )
    .into_files()
    .await
    .unwrap();

    assert_eq!(relative_paths(&files, dir.path()), vec!["dist/main.js"]);
    let map = files[0].source_map().expect("source map");
    assert!(map.sources().iter().any(|source| source.ends_with("greet.js")));
}

async fn warning_codes(dir: &TempDir, outputs: Vec<serde_json::Value>) -> Vec<String> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let files = bundle_stream(
        base_options(dir)
            .on_warn(move |warning| sink.lock().push(warning.code.clone()))
            .outputs(outputs),
    )
    .into_files()
    .await
    .unwrap();
    assert!(!files.is_empty());

    let mut codes = seen.lock().clone();
    codes.sort();
    codes
}

#[tokio::test]
async fn warnings_are_not_repeated_per_descriptor() {
    let dir = create_project();
    write_file(
        dir.path(),
        "src/main.js",
        r#"
import { greet } from "./greet.js";
export const message = greet(eval("'stream'"));
"#,
    );

    let single = warning_codes(&dir, vec![json!({ "format": "es", "file": "one/main.js" })]).await;
    let multiple = warning_codes(
        &dir,
        vec![
            json!({ "format": "es", "file": "two/main.mjs" }),
            json!({ "format": "cjs", "file": "two/main.cjs" }),
        ],
    )
    .await;

    let mut distinct = multiple.clone();
    distinct.dedup();
    assert_eq!(multiple, distinct, "each warning is reported once");
    assert_eq!(multiple, single);
}

#[tokio::test]
async fn missing_input_is_rejected() {
    let dir = project();

    let items: Vec<_> = bundle_stream(
        StreamOptions::new().file_metadata(FileMetadata::new().cwd(dir.path())),
    )
    .collect()
    .await;

    assert_eq!(items.len(), 1);
    let err = items.into_iter().next().unwrap().unwrap_err();
    assert_eq!(err.to_string(), MISSING_INPUT);
}

#[tokio::test]
async fn unresolvable_entry_fails_the_stream() {
    let dir = project();

    let err = bundle_stream(
        StreamOptions::new()
            .set("cwd", dir.path().to_string_lossy().to_string())
            .input(dir.path().join("missing.js").to_string_lossy().to_string()),
    )
    .into_files()
    .await
    .unwrap_err();

    assert!(matches!(err, bundle_stream::Error::Bundler { .. }));
}

#[cfg(feature = "eval")]
#[tokio::test]
#[serial_test::serial(module_loader)]
async fn string_shorthand_loads_es_module_config() {
    let dir = create_project();
    let entry = dir.path().join("src/main.js");
    let config = write_file(
        dir.path(),
        "rollup.config.mjs",
        &format!(
            r#"
const entry = {entry};
export default {{
    input: entry,
    output: {{ format: "cjs", file: "out/bundle.js" }},
}};
"#,
            entry = json!(entry.to_string_lossy())
        ),
    );

    let mut stream = bundle_stream(config.to_string_lossy().into_owned());
    let events = stream.take_events().unwrap();
    let files = stream.into_files().await.unwrap();

    assert_eq!(files.len(), 1);
    assert!(files[0].path().ends_with("out/bundle.js"));
    assert_contents_contain(&files[0], "hello ");

    let events: Vec<_> = events.collect().await;
    match &events[0] {
        StreamEvent::Config(loaded) => {
            assert_eq!(loaded["output"]["file"], json!("out/bundle.js"));
        }
        other => panic!("expected config event, got {}", other.name()),
    }
    assert_eq!(events[1].name(), "bundle");
}

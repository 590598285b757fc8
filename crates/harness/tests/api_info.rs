use revfield_engine::EngineConfig;
use revfield_harness::TestApp;
use revfield_storage::{NewInlineComment, Storage};
use serde_json::json;

fn app() -> Result<TestApp, Box<dyn std::error::Error>> {
    Ok(TestApp::with_config(EngineConfig {
        production_uri: "https://review.example.com/".into(),
        ..EngineConfig::default()
    })?)
}

fn inline(app: &TestApp, changeset_id: Option<i64>, is_new_file: bool) -> NewInlineComment {
    NewInlineComment {
        author: app.viewer.actor_id,
        changeset_id,
        is_new_file,
        line_number: 12,
        line_length: 3,
        content: "Consider a guard here.".into(),
    }
}

// ============================================================================
// Diff dictionary (1 test)
// ============================================================================

#[test]
fn diff_info_links_to_the_diff() -> Result<(), Box<dyn std::error::Error>> {
    let mut app = app()?;
    let diff = app.new_diff()?;

    let info = app.engine.build_diff_info(&diff);
    assert_eq!(info.id, diff.id);
    assert_eq!(info.phid, diff.phid.to_string());
    assert_eq!(
        info.uri,
        format!("https://review.example.com/differential/diff/{}/", diff.id)
    );
    assert_eq!(
        serde_json::to_value(&info)?,
        json!({"id": diff.id, "phid": diff.phid.to_string(), "uri": info.uri})
    );
    Ok(())
}

// ============================================================================
// Inline comment dictionary (3 tests)
// ============================================================================

#[test]
fn new_side_inline_uses_the_new_filename() -> Result<(), Box<dyn std::error::Error>> {
    let mut app = app()?;
    let diff = app.new_diff()?;
    let changeset = app
        .engine
        .storage_mut()
        .create_changeset(diff.id, "src/lib.rs", Some("src/main.rs"))?;
    let comment = inline(&app, Some(changeset.id), true);
    let comment = app.engine.storage_mut().create_inline_comment(&comment)?;

    let info = app.engine.build_inline_info(&comment)?;
    assert_eq!(info.file_path.as_deref(), Some("src/lib.rs"));
    assert_eq!(info.diff_id, Some(diff.id));
    assert_eq!(info.author_phid, app.viewer.actor_id.to_string());
    assert_eq!(info.line_number, 12);
    assert_eq!(info.line_length, 3);
    Ok(())
}

#[test]
fn old_side_inline_uses_the_old_filename() -> Result<(), Box<dyn std::error::Error>> {
    let mut app = app()?;
    let diff = app.new_diff()?;
    let changeset = app
        .engine
        .storage_mut()
        .create_changeset(diff.id, "src/lib.rs", Some("src/main.rs"))?;
    let comment = inline(&app, Some(changeset.id), false);
    let comment = app.engine.storage_mut().create_inline_comment(&comment)?;

    let value = serde_json::to_value(app.engine.build_inline_info(&comment)?)?;
    assert_eq!(value["filePath"], json!("src/main.rs"));
    assert_eq!(value["isNewFile"], json!(false));
    assert_eq!(value["diffID"], json!(diff.id));
    Ok(())
}

#[test]
fn inline_without_changeset_has_no_location() -> Result<(), Box<dyn std::error::Error>> {
    let mut app = app()?;
    let comment = inline(&app, None, true);
    let comment = app.engine.storage_mut().create_inline_comment(&comment)?;

    let value = serde_json::to_value(app.engine.build_inline_info(&comment)?)?;
    assert_eq!(value["filePath"], json!(null));
    assert_eq!(value["diffID"], json!(null));
    assert_eq!(value["content"], json!("Consider a guard here."));
    assert_eq!(value["authorPHID"], json!(app.viewer.actor_id.to_string()));
    Ok(())
}

use std::collections::BTreeSet;

use revfield_core::{Phid, RevisionRecord};
use revfield_engine::{CustomFieldKind, CustomFieldSpec, EngineConfig, EngineError};
use revfield_harness::TestApp;
use serde_json::{Value, json};

fn app() -> Result<TestApp, EngineError> {
    TestApp::with_config(
        EngineConfig::default()
            .with_custom_field(CustomFieldSpec::new("risk", "Risk", CustomFieldKind::Text))
            .with_custom_field(CustomFieldSpec::new("ticket", "Ticket", CustomFieldKind::Int)),
    )
}

fn phids(value: &Value) -> BTreeSet<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// Batching (3 tests)
// ============================================================================

#[test]
fn one_revision_costs_one_query_of_each_kind() -> Result<(), Box<dyn std::error::Error>> {
    let mut app = app()?;
    let revision = app.create_revision("Only", json!({"risk": "low"}))?;
    app.storage().reset();

    app.engine
        .load_custom_fields_for_revisions(&app.viewer, &[revision])?;
    assert_eq!(app.storage().field_loads(), 1);
    assert_eq!(app.storage().edge_queries(), 1);
    Ok(())
}

#[test]
fn many_revisions_cost_the_same() -> Result<(), Box<dyn std::error::Error>> {
    let mut app = app()?;
    let mut revisions = Vec::new();
    for i in 0..40 {
        let revision = app.create_revision(&format!("Revision {i}"), json!({"ticket": i}))?;
        app.tag_project(&revision, Phid::new())?;
        revisions.push(revision);
    }
    app.storage().reset();

    let resolved = app
        .engine
        .load_custom_fields_for_revisions(&app.viewer, &revisions)?;
    assert_eq!(resolved.len(), 40);
    assert_eq!(app.storage().field_loads(), 1);
    assert_eq!(app.storage().edge_queries(), 1);

    for (i, revision) in revisions.iter().enumerate() {
        let values = &resolved[&revision.phid];
        assert_eq!(values["title"], json!(format!("Revision {i}")));
        assert_eq!(values["ticket"], json!(i));
        assert_eq!(phids(&values["phabricator:projects"]).len(), 1);
    }
    Ok(())
}

#[test]
fn empty_input_still_answers_in_one_pass() -> Result<(), Box<dyn std::error::Error>> {
    let app = app()?;
    let resolved = app.engine.load_custom_fields_for_revisions(&app.viewer, &[])?;
    assert!(resolved.is_empty());
    assert_eq!(app.storage().field_loads(), 1);
    assert_eq!(app.storage().edge_queries(), 1);
    Ok(())
}

// ============================================================================
// Legacy edge keys (3 tests)
// ============================================================================

#[test]
fn shared_projects_stay_with_their_revisions() -> Result<(), Box<dyn std::error::Error>> {
    let mut app = app()?;
    let a = app.create_revision("A", json!({}))?;
    let b = app.create_revision("B", json!({}))?;
    let c = app.create_revision("C", json!({}))?;
    let shared = Phid::new();
    let only_a = Phid::new();
    app.tag_project(&a, shared)?;
    app.tag_project(&a, only_a)?;
    app.tag_project(&b, shared)?;

    let resolved = app
        .engine
        .load_custom_fields_for_revisions(&app.viewer, &[a.clone(), b.clone(), c.clone()])?;

    let projects = |revision: &RevisionRecord| phids(&resolved[&revision.phid]["phabricator:projects"]);
    assert_eq!(
        projects(&a),
        BTreeSet::from([shared.to_string(), only_a.to_string()])
    );
    assert_eq!(projects(&b), BTreeSet::from([shared.to_string()]));
    assert!(projects(&c).is_empty());
    Ok(())
}

#[test]
fn dependencies_are_listed_per_revision() -> Result<(), Box<dyn std::error::Error>> {
    let mut app = app()?;
    let base = app.create_revision("Base", json!({}))?;
    let top = app.create_revision("Top", json!({}))?;
    app.add_dependency(&top, &base)?;

    let top_fields = app.api_fields(&top)?;
    assert_eq!(top_fields["phabricator:depends-on"], json!([base.phid.to_string()]));
    assert_eq!(app.api_fields(&base)?["phabricator:depends-on"], json!([]));
    Ok(())
}

#[test]
fn reserved_keys_override_a_same_named_field() -> Result<(), Box<dyn std::error::Error>> {
    let mut app = TestApp::with_config(EngineConfig::default().with_custom_field(
        CustomFieldSpec::new("phabricator:projects", "Projects", CustomFieldKind::Text),
    ))?;
    let revision = app.create_revision("A", json!({"phabricator:projects": "not edges"}))?;
    let project = Phid::new();
    app.tag_project(&revision, project)?;

    let values = app.api_fields(&revision)?;
    assert_eq!(values["phabricator:projects"], json!([project.to_string()]));
    Ok(())
}

// ============================================================================
// Round trip (2 tests)
// ============================================================================

#[test]
fn edited_values_come_back_in_api_form() -> Result<(), Box<dyn std::error::Error>> {
    let mut app = app()?;
    let revision = app.create_revision("Title", json!({}))?;
    app.edit(
        &revision,
        json!({"summary": "Body", "testPlan": "Tested", "risk": "moderate", "ticket": 7}),
        None,
    )?;

    let values = app.api_fields(&revision)?;
    assert_eq!(values["summary"], json!("Body"));
    assert_eq!(values["testPlan"], json!("Tested"));
    assert_eq!(values["risk"], json!("moderate"));
    assert_eq!(values["ticket"], json!(7));
    Ok(())
}

#[test]
fn values_survive_reopening_the_store() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("revfield.db");
    let path = path.to_str().ok_or("non-utf8 path")?;
    let config = EngineConfig::default()
        .with_custom_field(CustomFieldSpec::new("risk", "Risk", CustomFieldKind::Text));
    let viewer = revfield_core::Viewer::new("alice");

    let revision = {
        let mut engine =
            revfield_engine::Engine::new(revfield_storage::SqliteStorage::open(path)?, config.clone())?;
        let mut diff = engine.create_diff("")?;
        engine
            .create_revision(
                &viewer,
                &mut diff,
                &revfield_harness::fields(json!({"title": "Durable", "risk": "kept"})),
            )?
            .revision
    };

    let engine = revfield_engine::Engine::new(revfield_storage::SqliteStorage::open(path)?, config)?;
    let resolved = engine.load_custom_fields_for_revisions(&viewer, &[revision.clone()])?;
    assert_eq!(resolved[&revision.phid]["title"], json!("Durable"));
    assert_eq!(resolved[&revision.phid]["risk"], json!("kept"));
    Ok(())
}

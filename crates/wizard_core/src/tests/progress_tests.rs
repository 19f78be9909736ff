use super::*;
use serde_json::json;
use storage::MemoryStateStore;

fn record(value: Value) -> FormRecord {
    value.as_object().cloned().expect("object literal")
}

fn app_id() -> ApplicationId {
    ApplicationId::from("app-1")
}

async fn selected_store() -> Arc<ProgressStore> {
    let store = ProgressStore::initialize(Arc::new(MemoryStateStore::new()))
        .await
        .expect("initialize");
    store
        .select_application(&app_id(), "sba")
        .await
        .expect("select");
    store
}

#[tokio::test]
async fn unknown_application_type_is_rejected() {
    let store = ProgressStore::initialize(Arc::new(MemoryStateStore::new()))
        .await
        .expect("initialize");
    let err = store
        .select_application(&app_id(), "usda")
        .await
        .expect_err("unknown type");
    assert!(matches!(err, WizardError::UnknownApplicationType(ref t) if t == "usda"));
}

#[tokio::test]
async fn operations_require_a_selected_application() {
    let store = ProgressStore::initialize(Arc::new(MemoryStateStore::new()))
        .await
        .expect("initialize");
    let err = store.set_current_section(1).await.expect_err("no app");
    assert!(matches!(err, WizardError::NoApplicationSelected));
}

#[tokio::test]
async fn select_application_is_idempotent() {
    let store = selected_store().await;
    store.set_current_section(3).await.expect("set section");

    store
        .select_application(&app_id(), "sba")
        .await
        .expect("re-select");

    let application = store.current_application().await.expect("application");
    assert_eq!(application.current_section_index, 3);
    assert_eq!(application.sections.len(), 8);
}

#[tokio::test]
async fn out_of_range_section_index_clamps_instead_of_failing() {
    let store = selected_store().await;

    let effective = store.set_current_section(99).await.expect("clamped");
    assert_eq!(effective, 7);
    let application = store.current_application().await.expect("application");
    assert_eq!(application.current_section_index, 7);

    assert_eq!(store.set_current_section(0).await.expect("in range"), 0);
}

#[tokio::test]
async fn set_current_section_does_not_touch_progress() {
    let store = selected_store().await;
    store.visit_page("loan-information").await.expect("visit");

    store.set_current_section(5).await.expect("set section");
    store.set_current_section(1).await.expect("set section");

    let application = store.current_application().await.expect("application");
    assert_eq!(application.sections[1].progress, 0.5);
    assert!(!application.sections[1].completed);
}

#[tokio::test]
async fn form_data_shallow_merges_per_step() {
    let store = selected_store().await;
    store
        .set_form_data("welcome", record(json!({ "a": 1 })))
        .await
        .expect("first write");
    store
        .set_form_data("welcome", record(json!({ "b": 2 })))
        .await
        .expect("second write");

    let application = store.current_application().await.expect("application");
    let welcome = application.form_data.get("welcome").expect("welcome step");
    assert_eq!(welcome.get("a"), Some(&json!(1)));
    assert_eq!(welcome.get("b"), Some(&json!(2)));
}

#[tokio::test]
async fn resubmission_overwrites_only_the_resubmitted_keys() {
    let store = selected_store().await;
    store
        .set_form_data("welcome", record(json!({ "a": 1, "b": 1 })))
        .await
        .expect("first write");
    store
        .set_form_data("welcome", record(json!({ "b": 2 })))
        .await
        .expect("resubmit");

    let application = store.current_application().await.expect("application");
    let welcome = application.form_data.get("welcome").expect("welcome step");
    assert_eq!(welcome.get("a"), Some(&json!(1)));
    assert_eq!(welcome.get("b"), Some(&json!(2)));
}

#[tokio::test]
async fn progress_is_monotonic_across_back_navigation() {
    let store = selected_store().await;

    store.visit_page("loan-information").await.expect("visit");
    assert_eq!(
        store.compute_section_progress(1).await.expect("progress"),
        0.5
    );

    // Back to the first page, then forward again: the stepper reflects
    // furthest reached, not currently viewed.
    store.visit_page("welcome").await.expect("visit back");
    let application = store.current_application().await.expect("application");
    assert_eq!(application.current_section_index, 0);
    assert_eq!(application.sections[1].progress, 0.5);

    store.visit_page("loan-information").await.expect("revisit");
    assert_eq!(
        store.compute_section_progress(1).await.expect("progress"),
        0.5
    );
}

#[tokio::test]
async fn single_step_sections_reach_full_progress_on_visit() {
    let store = selected_store().await;
    store.visit_page("welcome").await.expect("visit");
    assert_eq!(
        store.compute_section_progress(0).await.expect("progress"),
        1.0
    );
}

#[tokio::test]
async fn visiting_an_unknown_page_falls_back_to_the_first_section() {
    let store = selected_store().await;
    let section = store.visit_page("not-a-page").await.expect("visit");
    assert_eq!(section, 0);
}

#[tokio::test]
async fn section_completion_is_monotonic() {
    let store = selected_store().await;

    store.mark_section_completed(1).await.expect("complete");
    store.mark_section_completed(1).await.expect("repeat no-op");
    store.visit_page("welcome").await.expect("navigate back");

    let application = store.current_application().await.expect("application");
    assert!(application.sections[1].completed);
    assert_eq!(application.sections[1].progress, 1.0);
}

#[tokio::test]
async fn final_section_completion_targets_the_last_section() {
    let store = selected_store().await;
    store
        .mark_final_section_completed()
        .await
        .expect("complete");
    let application = store.current_application().await.expect("application");
    assert!(application.sections[7].completed);
}

#[tokio::test]
async fn section_change_is_broadcast() {
    let store = selected_store().await;
    let mut events = store.subscribe_events();

    store.set_current_section(2).await.expect("set section");

    match events.recv().await.expect("event") {
        ProgressEvent::SectionChanged { section_index, .. } => assert_eq!(section_index, 2),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn delete_application_removes_all_state() {
    let store = selected_store().await;
    store
        .set_form_data("welcome", record(json!({ "a": 1 })))
        .await
        .expect("write");

    store.delete_application(&app_id()).await;
    assert!(store.current_application().await.is_none());

    store
        .select_application(&app_id(), "sba")
        .await
        .expect("re-create");
    let application = store.current_application().await.expect("application");
    assert!(application.form_data.is_empty());
}

#[tokio::test]
async fn form_data_survives_a_reload_but_progress_does_not() {
    let backing = Arc::new(MemoryStateStore::new());

    let store = ProgressStore::initialize(backing.clone())
        .await
        .expect("initialize");
    store
        .select_application(&app_id(), "sba")
        .await
        .expect("select");
    store.visit_page("loan-information").await.expect("visit");
    store
        .set_form_data("loan-information", record(json!({ "amount": 50000 })))
        .await
        .expect("write");

    let reloaded = ProgressStore::initialize(backing)
        .await
        .expect("re-initialize");
    reloaded
        .select_application(&app_id(), "sba")
        .await
        .expect("select");

    let application = reloaded.current_application().await.expect("application");
    assert_eq!(
        application
            .form_data
            .get("loan-information")
            .and_then(|step| step.get("amount")),
        Some(&json!(50000))
    );
    // Section progress is deliberately session-scoped.
    assert_eq!(application.sections[1].progress, 0.0);
}

#[tokio::test]
async fn unreadable_persisted_state_is_discarded() {
    let backing = Arc::new(MemoryStateStore::new());
    backing
        .save_raw(PROGRESS_STORE_NAMESPACE, "not json")
        .await
        .expect("seed");

    let store = ProgressStore::initialize(backing).await.expect("initialize");
    store
        .select_application(&app_id(), "sba")
        .await
        .expect("select");
    let application = store.current_application().await.expect("application");
    assert!(application.form_data.is_empty());
}

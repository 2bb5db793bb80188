mod common;

use std::sync::{Arc, Mutex};

use automation_client_core::{
    BackupStore, DynamicFormController, ErrorDetail, JobCreatePayload, NotificationCenter,
    NotificationLevel,
};
use common::{FakeApi, restic, rsync};
use serde_json::json;

type Outbox = Arc<Mutex<Vec<JobCreatePayload>>>;

fn form_for(job_type: automation_client_core::JobType) -> (DynamicFormController, Outbox) {
    let outbox: Outbox = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outbox);
    let form = DynamicFormController::new(job_type, move |payload: JobCreatePayload| {
        sink.lock().expect("outbox lock").push(payload);
    })
    .expect("form");
    (form, outbox)
}

fn take(outbox: &Outbox) -> Vec<JobCreatePayload> {
    std::mem::take(&mut *outbox.lock().expect("outbox lock"))
}

#[tokio::test]
async fn submitted_form_creates_job_in_store() {
    let notifications = NotificationCenter::new();
    let api = Arc::new(FakeApi::new());
    let store = BackupStore::new(api.clone(), notifications.clone());
    assert!(store.fetch_job_types().await.success);
    store.set_create_dialog_open(true);

    let (mut form, outbox) = form_for(restic());
    form.set_value("name", "Nightly photos");
    form.set_value("schedule", "0 3 * * *");
    form.set_value("repository", "s3:backups/photos");
    form.set_value("keepLast", " 7 ");
    assert!(form.submit().await);

    let payloads = take(&outbox);
    assert_eq!(payloads.len(), 1);
    let payload = payloads[0].clone();
    assert_eq!(payload.job_type_identifier, "restic");
    assert_eq!(payload.configuration.get("keepLast"), Some(&json!(7)));
    assert!(!payload.configuration.contains_key("name"));

    let outcome = store.create_job(payload).await;
    assert!(outcome.success);
    let state = store.snapshot();
    assert!(!state.create_dialog_open);
    assert_eq!(state.jobs.len(), 1);
    assert_eq!(state.jobs[0].name, "Nightly photos");

    let queue = notifications.snapshot();
    assert_eq!(queue.last().map(|note| note.level), Some(NotificationLevel::Success));
    assert_eq!(api.created.lock().expect("created lock").len(), 1);
}

#[tokio::test]
async fn invalid_form_emits_nothing() {
    let (mut form, outbox) = form_for(restic());
    form.set_value("name", "Nightly");
    form.set_value("schedule", "every night");
    form.set_value("repository", "s3:backups");
    form.set_value("keepLast", "seven");

    assert!(!form.submit().await);
    assert!(take(&outbox).is_empty());
    assert_eq!(form.errors().get("schedule"), Some("Invalid schedule expression"));
    assert_eq!(form.errors().get("keepLast"), Some("Must be a number"));

    form.set_value("keepLast", "3");
    assert_eq!(form.errors().get("keepLast"), None);
}

#[tokio::test]
async fn switching_job_type_rebinds_the_same_form() {
    let (mut form, outbox) = form_for(restic());
    form.set_value("name", "Offsite");
    form.set_value("schedule", "*/15 * * * *");
    form.set_value("repository", "s3:old");

    form.set_job_type(rsync()).expect("switch");
    assert_eq!(form.value("repository"), None);
    assert_eq!(form.value("target"), Some(""));
    assert_eq!(form.value("jobTypeIdentifier"), Some("rsync"));

    form.set_value("target", "nas.home.example");
    assert!(form.submit().await);
    let payloads = take(&outbox);
    assert_eq!(payloads[0].name, "Offsite");
    assert_eq!(payloads[0].job_type_identifier, "rsync");
    assert_eq!(
        payloads[0].configuration.get("target"),
        Some(&json!("nas.home.example"))
    );
}

#[tokio::test]
async fn backend_field_errors_come_back_to_the_caller() {
    let api = Arc::new(FakeApi::new());
    *api.reject_create_with.lock().expect("reject lock") =
        Some(vec![ErrorDetail::new("repository", "Repository is not reachable")]);
    let notifications = NotificationCenter::new();
    let store = BackupStore::new(api, notifications.clone());
    store.fetch_job_types().await;
    store.set_create_dialog_open(true);

    let (mut form, outbox) = form_for(restic());
    form.set_value("name", "Nightly");
    form.set_value("schedule", "0 3 * * *");
    form.set_value("repository", "s3:gone");
    form.set_value("keepLast", "2");
    assert!(form.submit().await);

    let payload = take(&outbox).remove(0);
    let outcome = store.create_job(payload).await;
    assert!(!outcome.success);
    assert_eq!(outcome.errors[0].field, "repository");
    assert!(store.snapshot().create_dialog_open);
    assert_eq!(
        notifications.snapshot()[0].title,
        "Could not create backup job"
    );
}

#[tokio::test]
async fn payload_for_unloaded_job_type_never_reaches_backend() {
    let api = Arc::new(FakeApi::new());
    let store = BackupStore::new(api.clone(), NotificationCenter::new());

    let (mut form, outbox) = form_for(rsync());
    form.set_value("name", "Mirror");
    form.set_value("schedule", "0 4 * * *");
    form.set_value("target", "nas");
    assert!(form.submit().await);

    let outcome = store.create_job(take(&outbox).remove(0)).await;
    assert!(!outcome.success);
    assert!(api.created.lock().expect("created lock").is_empty());
}

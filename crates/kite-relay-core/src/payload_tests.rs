//! Tests for Buildkite payload decoding.

use super::*;

const BUILD_FINISHED: &str = r#"{
    "event": "build.finished",
    "build": {
        "id": "f62a1b4d-10f9-4790-bc1c-e2c3a0c80983",
        "url": "https://api.buildkite.com/v2/organizations/acme/pipelines/app/builds/42",
        "web_url": "https://buildkite.com/acme/app/builds/42",
        "number": 42,
        "state": "passed",
        "blocked": false,
        "message": "Bump dependencies",
        "commit": "a1b2c3d",
        "branch": "main",
        "tag": null,
        "source": "webhook",
        "creator": {
            "id": "3d3c3bf0-7d58-4afe-8fe7-b3017d5504de",
            "name": "Keith Pitt",
            "email": "keith@example.com"
        },
        "created_at": "2024-05-01 10:00:00 UTC",
        "scheduled_at": "2024-05-01 10:00:00 UTC",
        "started_at": "2024-05-01 10:00:05 UTC",
        "finished_at": "2024-05-01 10:03:10 UTC",
        "rebuilt_from": null
    },
    "pipeline": {
        "id": "849411f9-9e6d-4739-a0d8-e247088e9b52",
        "slug": "app",
        "name": "App",
        "description": null,
        "repository": "git@github.com:acme/app.git",
        "running_builds_count": 1,
        "visibility": "private"
    }
}"#;

#[test]
fn test_decode_build_event() {
    let envelope = Envelope::from_slice(BUILD_FINISHED.as_bytes()).unwrap();

    assert_eq!(envelope.event_type.as_deref(), Some("build.finished"));
    assert!(envelope.job.is_none());

    let build = envelope.build.as_ref().unwrap();
    assert_eq!(build.number, 42);
    assert_eq!(build.state, "passed");
    assert_eq!(build.creator_name(), "Keith Pitt");
    assert_eq!(build.tag, None);
    assert_eq!(build.started_at.as_deref(), Some("2024-05-01 10:00:05 UTC"));
    assert_eq!(build.rebuilt_from_id(), "");

    let pipeline = envelope.pipeline.as_ref().unwrap();
    assert_eq!(pipeline.slug, "app");
    assert_eq!(pipeline.running_builds_count, 1);
    assert_eq!(pipeline.scheduled_jobs_count, 0);
}

#[test]
fn test_empty_object_decodes_to_empty_envelope() {
    let envelope = Envelope::from_slice(b"{}").unwrap();

    assert_eq!(envelope, Envelope::default());
}

#[test]
fn test_null_fields_decode_as_absent() {
    let body = br#"{
        "build": {"id": null, "number": null, "blocked": null, "creator": null},
        "job": {"id": "j-1", "name": null, "agent": {"priority": null, "meta_data": null}}
    }"#;

    let envelope = Envelope::from_slice(body).unwrap();

    let build = envelope.build.unwrap();
    assert_eq!(build.id, "");
    assert_eq!(build.number, 0);
    assert!(!build.blocked);
    assert_eq!(build.creator_name(), "");

    let job = envelope.job.unwrap();
    assert_eq!(job.name, None);
    let agent = job.agent.unwrap();
    assert_eq!(agent.priority, 0);
    assert!(agent.metadata.is_empty());
}

#[test]
fn test_unknown_fields_are_ignored() {
    let body = br#"{"sender": {"name": "someone"}, "build": {"id": "b", "pull_request": {"id": "1"}}}"#;

    let envelope = Envelope::from_slice(body).unwrap();

    assert_eq!(envelope.build.unwrap().id, "b");
}

#[test]
fn test_job_fields_decode() {
    let body = br#"{
        "job": {
            "id": "j-1",
            "type": "script",
            "name": ":rust: test",
            "state": "finished",
            "command": "cargo test",
            "web_url": "https://buildkite.com/acme/app/builds/42#j-1",
            "exit_status": -1,
            "retried": true,
            "retries_count": 2,
            "agent": {
                "id": "a-1",
                "name": "builder-01",
                "version": "3.70.0",
                "priority": 5,
                "meta_data": ["queue=default", "os=linux"]
            }
        }
    }"#;

    let job = Envelope::from_slice(body).unwrap().job.unwrap();

    assert_eq!(job.job_type, "script");
    assert_eq!(job.exit_status, Some(-1));
    assert_eq!(job.retried, Some(true));
    assert_eq!(job.retries_count, Some(2));
    let agent = job.agent.unwrap();
    assert_eq!(agent.priority, 5);
    assert_eq!(agent.metadata, vec!["queue=default", "os=linux"]);
}

#[test]
fn test_rebuilt_from_accepts_id_and_object() {
    let as_string = Envelope::from_slice(br#"{"build": {"rebuilt_from": "b-0"}}"#).unwrap();
    assert_eq!(as_string.build.unwrap().rebuilt_from_id(), "b-0");

    let as_object = Envelope::from_slice(
        br#"{"build": {"rebuilt_from": {"id": "b-1", "number": 41, "url": "https://api"}}}"#,
    )
    .unwrap();
    assert_eq!(as_object.build.unwrap().rebuilt_from_id(), "b-1");
}

#[test]
fn test_invalid_json_is_malformed() {
    let result = Envelope::from_slice(b"never gonna give you up");

    assert!(matches!(result, Err(RelayError::MalformedPayload { .. })));
}

#[test]
fn test_non_object_json_is_malformed() {
    let result = Envelope::from_slice(br#""not json""#);

    assert!(matches!(result, Err(RelayError::MalformedPayload { .. })));
}

#[test]
fn test_wrong_field_type_is_malformed() {
    let result = Envelope::from_slice(br#"{"build": {"number": "forty-two"}}"#);

    assert!(matches!(result, Err(RelayError::MalformedPayload { .. })));
}

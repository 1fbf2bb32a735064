mod common;

use std::io::Cursor;

use common::{progress_records, FakeRuntime};
use dblab_engine::{CancelToken, ImageProvisioner, ProvisionError, PullStream};

const IMAGE: &str = "postgresai/extended-postgres:16";

#[test]
fn test_pull_consumes_every_record_and_closes_stream() {
    let rt = FakeRuntime::with_pull_body(&progress_records(7));
    let images = ImageProvisioner::new(&rt);
    images.pull_image(IMAGE, &CancelToken::new()).expect("pull");
    assert_eq!(rt.pulls(), 1);
    assert!(rt.stream_closed());
}

#[test]
fn test_pull_stream_counts_records_to_end_of_input() {
    let body = progress_records(5);
    let mut stream = PullStream::new(Box::new(Cursor::new(body.into_bytes())), CancelToken::new());
    let statuses: Vec<String> = stream
        .by_ref()
        .map(|r| r.expect("record").status)
        .collect();
    assert_eq!(statuses.len(), 5);
    assert!(statuses.iter().all(|s| s == "Downloading"));
    assert_eq!(stream.consumed(), 5);
    assert!(stream.is_closed());
    assert!(stream.next().is_none());
}

#[test]
fn test_empty_pull_stream_is_success() {
    let rt = FakeRuntime::with_pull_body("");
    ImageProvisioner::new(&rt)
        .pull_image(IMAGE, &CancelToken::new())
        .expect("pull");
    assert!(rt.stream_closed());
}

#[test]
fn test_malformed_record_fails_and_closes_stream() {
    let body = format!("{}{{\"status\": \"Downloading\", ", progress_records(2));
    let rt = FakeRuntime::with_pull_body(&body);
    let err = ImageProvisioner::new(&rt)
        .pull_image(IMAGE, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, ProvisionError::StreamDecode(_)), "{err}");
    assert!(rt.stream_closed());
}

#[test]
fn test_error_record_is_not_fatal() {
    let body = concat!(
        "{\"status\":\"Pulling from library/postgres\",\"id\":\"16\"}\n",
        "{\"error\":\"toomanyrequests\",\"errorDetail\":{\"message\":\"rate\"}}\n",
        "{\"status\":\"Status: Downloaded newer image\"}\n",
    );
    let rt = FakeRuntime::with_pull_body(body);
    ImageProvisioner::new(&rt)
        .pull_image(IMAGE, &CancelToken::new())
        .expect("pull");
}

#[test]
fn test_cancelled_pull_stops_and_closes() {
    let rt = FakeRuntime::with_pull_body(&progress_records(3));
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = ImageProvisioner::new(&rt)
        .pull_image(IMAGE, &cancel)
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Cancelled), "{err}");
    assert!(rt.stream_closed());
}

#[test]
fn test_image_exists_matches_exact_reference() {
    let rt = FakeRuntime::with_images(&[IMAGE]);
    let images = ImageProvisioner::new(&rt);
    assert!(images.image_exists(IMAGE).expect("list"));
    assert!(!images.image_exists("postgres:15").expect("list"));
}

#[test]
fn test_prepare_skips_pull_when_present() {
    let rt = FakeRuntime::with_images(&[IMAGE]);
    ImageProvisioner::new(&rt)
        .prepare_image(IMAGE, &CancelToken::new())
        .expect("prepare");
    assert_eq!(rt.pulls(), 0);
}

#[test]
fn test_prepare_pulls_when_missing() {
    let rt = FakeRuntime::with_pull_body(&progress_records(2));
    ImageProvisioner::new(&rt)
        .prepare_image(IMAGE, &CancelToken::new())
        .expect("prepare");
    assert_eq!(rt.pulls(), 1);
    assert!(rt.stream_closed());
}

#[test]
fn test_container_running_state() {
    let mut rt = FakeRuntime::default();
    assert!(!ImageProvisioner::new(&rt).is_container_running("c1").expect("inspect"));
    rt.running = true;
    assert!(ImageProvisioner::new(&rt).is_container_running("c1").expect("inspect"));
}

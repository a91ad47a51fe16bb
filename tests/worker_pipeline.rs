mod common;

use std::time::{Duration, Instant};

use colossus::infrastructure::queue::JobPublisher;
use colossus::modules::image::events::Job;
use colossus::modules::transcode::bridge::CHUNK_SIZE;
use colossus::testing::PutBehavior;
use colossus::workers::WorkerSummary;
use common::{POLL_TIMEOUT, TestFixture, fixtures::encode_image};
use image::{GenericImageView, ImageFormat};
use tokio_util::sync::CancellationToken;

/// Stores `bytes` as a raw object and publishes its job.
async fn submit(fixture: &TestFixture, name: &str, content_type: &str, bytes: Vec<u8>, k: i64) -> Job {
    let ext = name.rsplit('.').next().unwrap();
    let stem = name.trim_end_matches(&format!(".{ext}"));
    let job = Job::new(
        format!("{stem}-raw.{ext}"),
        format!("{stem}-processed.{ext}"),
        k,
    );
    fixture
        .store
        .insert(fixture.raw_bucket(), &job.filename_raw, content_type, bytes);
    fixture
        .queue
        .publish(&fixture.config.kafka.topic, &job.to_payload().unwrap())
        .await
        .unwrap();
    job
}

/// Runs a worker until `handled` messages were committed, then shuts it down.
async fn run_until_handled(fixture: &TestFixture, handled: usize) -> WorkerSummary {
    let cancel = CancellationToken::new();
    let worker = tokio::spawn(fixture.worker().run(cancel.clone()));

    tokio::time::timeout(Duration::from_secs(10), async {
        while fixture.queue.committed().len() < handled {
            tokio::time::sleep(POLL_TIMEOUT).await;
        }
    })
    .await
    .expect("worker did not handle the queued messages in time");

    cancel.cancel();
    worker.await.unwrap()
}

fn processed_dimensions(fixture: &TestFixture, key: &str) -> (u32, u32) {
    let (_, bytes) = fixture
        .store
        .object(fixture.processed_bucket(), key)
        .expect("processed object missing");
    image::load_from_memory(&bytes).unwrap().dimensions()
}

#[tokio::test]
async fn job_round_trip_produces_scaled_image() {
    let fixture = TestFixture::new();
    let job = submit(&fixture, "a.jpg", "image/jpeg", encode_image(64, 40, ImageFormat::Jpeg), 4).await;

    let summary = run_until_handled(&fixture, 1).await;

    assert_eq!(summary, WorkerSummary { processed: 1, failed: 0 });
    assert_eq!(processed_dimensions(&fixture, &job.filename_processed), (16, 10));
    let (content_type, bytes) = fixture
        .store
        .object(fixture.processed_bucket(), &job.filename_processed)
        .unwrap();
    assert_eq!(content_type, "image/jpeg");
    assert_eq!(fixture.metrics.processed_success(0), 1);
    assert_eq!(
        fixture.metrics.processed_success_bytes("image/jpeg"),
        bytes.len() as u64
    );
}

#[tokio::test]
async fn every_supported_format_round_trips() {
    let fixture = TestFixture::new();
    let cases = [
        ("a.png", "image/png", ImageFormat::Png),
        ("b.gif", "image/gif", ImageFormat::Gif),
        ("c.bmp", "image/x-ms-bmp", ImageFormat::Bmp),
        ("d.tif", "image/tiff", ImageFormat::Tiff),
        ("e.jpg", "image/jpg", ImageFormat::Jpeg),
    ];

    let mut jobs = Vec::new();
    for (name, content_type, format) in cases {
        jobs.push((submit(&fixture, name, content_type, encode_image(10, 6, format), 2).await, format));
    }

    let summary = run_until_handled(&fixture, cases.len()).await;

    assert_eq!(summary.processed, cases.len() as u64);
    for (job, format) in jobs {
        let (_, bytes) = fixture
            .store
            .object(fixture.processed_bucket(), &job.filename_processed)
            .unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), format);
        assert_eq!(processed_dimensions(&fixture, &job.filename_processed), (5, 3));
    }
}

#[tokio::test]
async fn small_or_missing_k_uses_default() {
    let fixture = TestFixture::new();
    let image = encode_image(20, 12, ImageFormat::Png);
    let zero = submit(&fixture, "zero.png", "image/png", image.clone(), 0).await;
    let one = submit(&fixture, "one.png", "image/png", image.clone(), 1).await;

    // A producer that leaves `k` out entirely.
    let missing = Job::new("missing-raw.png".into(), "missing-processed.png".into(), 0);
    fixture
        .store
        .insert(fixture.raw_bucket(), &missing.filename_raw, "image/png", image);
    let payload = serde_json::json!({
        "filename_raw": missing.filename_raw,
        "filename_processed": missing.filename_processed,
        "queued_at": "2024-05-01T08:00:00Z",
    });
    fixture.queue.push_raw(&serde_json::to_vec(&payload).unwrap());

    run_until_handled(&fixture, 3).await;

    for job in [&zero, &one, &missing] {
        assert_eq!(processed_dimensions(&fixture, &job.filename_processed), (10, 6));
    }
}

#[tokio::test]
async fn unsupported_format_is_counted_and_skipped() {
    let fixture = TestFixture::new();
    let bad = submit(&fixture, "bad.webp", "image/webp", vec![0u8; 32], 2).await;
    let good = submit(&fixture, "good.png", "image/png", encode_image(8, 8, ImageFormat::Png), 2).await;

    let summary = run_until_handled(&fixture, 2).await;

    assert_eq!(summary, WorkerSummary { processed: 1, failed: 1 });
    assert!(fixture.store.object(fixture.processed_bucket(), &bad.filename_processed).is_none());
    assert!(fixture.store.object(fixture.processed_bucket(), &good.filename_processed).is_some());
    assert_eq!(fixture.metrics.processed_failure(0, "unsupported_format"), 1);
}

#[tokio::test]
async fn corrupt_image_is_a_decode_failure() {
    let fixture = TestFixture::new();
    let job = submit(&fixture, "broken.png", "image/png", b"\x89PNG but not really".to_vec(), 2).await;

    let summary = run_until_handled(&fixture, 1).await;

    assert_eq!(summary.failed, 1);
    assert!(fixture.store.object(fixture.processed_bucket(), &job.filename_processed).is_none());
    assert_eq!(fixture.metrics.processed_failure(0, "decode"), 1);
}

#[tokio::test]
async fn malformed_payload_does_not_stop_the_worker() {
    let fixture = TestFixture::new();
    fixture.queue.push_raw(b"{not json");
    fixture.queue.push_broker_error("broker transport failure");
    fixture.queue.push_other("rebalance");
    let job = submit(&fixture, "after.png", "image/png", encode_image(8, 8, ImageFormat::Png), 2).await;

    let summary = run_until_handled(&fixture, 2).await;

    assert_eq!(summary, WorkerSummary { processed: 1, failed: 1 });
    assert_eq!(fixture.metrics.processed_failure(0, "schema"), 1);
    assert!(fixture.store.object(fixture.processed_bucket(), &job.filename_processed).is_some());
}

#[tokio::test]
async fn missing_raw_object_is_not_found_failure() {
    let fixture = TestFixture::new();
    let job = Job::new("ghost-raw.png".into(), "ghost-processed.png".into(), 2);
    fixture
        .queue
        .publish(&fixture.config.kafka.topic, &job.to_payload().unwrap())
        .await
        .unwrap();

    let summary = run_until_handled(&fixture, 1).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(fixture.metrics.processed_failure(0, "not_found"), 1);
}

#[tokio::test]
async fn failure_after_upload_success_removes_processed_object() {
    let fixture = TestFixture::new();
    fixture.store.set_put_behavior(PutBehavior::AcceptFirstChunk);
    let job = submit(&fixture, "big.bmp", "image/bmp", encode_image(640, 640, ImageFormat::Bmp), 2).await;

    let summary = run_until_handled(&fixture, 1).await;

    assert_eq!(summary.failed, 1);
    assert!(fixture.store.object(fixture.processed_bucket(), &job.filename_processed).is_none());
    assert_eq!(fixture.store.delete_count(), 1);
    assert_eq!(fixture.metrics.processed_success(0), 0);
    assert_eq!(fixture.metrics.processed_failure(0, "transport"), 1);
}

#[tokio::test]
async fn storage_outage_is_counted_as_transport() {
    let fixture = TestFixture::new();
    fixture
        .store
        .set_put_behavior(PutBehavior::Fail("s3 unreachable".into()));
    submit(&fixture, "big.bmp", "image/bmp", encode_image(640, 640, ImageFormat::Bmp), 2).await;

    let summary = run_until_handled(&fixture, 1).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(fixture.metrics.processed_failure(0, "transport"), 1);
    assert_eq!(fixture.metrics.processed_failure(0, "encode"), 0);
}

#[tokio::test]
async fn slow_upload_receives_bounded_chunks() {
    let fixture = TestFixture::new();
    fixture.store.set_read_delay(Duration::from_millis(2));
    let job = submit(&fixture, "wide.bmp", "image/bmp", encode_image(800, 600, ImageFormat::Bmp), 2).await;

    let summary = run_until_handled(&fixture, 1).await;

    assert_eq!(summary.processed, 1);
    assert!(fixture.store.largest_chunk() <= CHUNK_SIZE);
    assert_eq!(processed_dimensions(&fixture, &job.filename_processed), (400, 300));
}

#[tokio::test]
async fn offsets_are_committed_per_message() {
    let fixture = TestFixture::new();
    for i in 0..4 {
        let name = format!("img{i}.png");
        submit(&fixture, &name, "image/png", encode_image(4, 4, ImageFormat::Png), 2).await;
    }

    run_until_handled(&fixture, 4).await;

    let mut committed = fixture.queue.committed();
    committed.sort();
    let mut published: Vec<_> = fixture
        .queue
        .published()
        .into_iter()
        .map(|d| (d.partition, d.offset))
        .collect();
    published.sort();
    assert_eq!(committed, published);
}

#[tokio::test]
async fn idle_worker_stops_within_one_poll_interval() {
    let fixture = TestFixture::new();
    let cancel = CancellationToken::new();
    let worker = tokio::spawn(fixture.worker().run(cancel.clone()));

    tokio::time::sleep(POLL_TIMEOUT * 3).await;
    let cancelled_at = Instant::now();
    cancel.cancel();
    let summary = worker.await.unwrap();

    // One poll timeout, plus scheduling slack.
    assert!(cancelled_at.elapsed() < POLL_TIMEOUT + Duration::from_millis(500));
    assert_eq!(summary, WorkerSummary::default());
    assert!(fixture.queue.is_closed());
}

#[tokio::test]
async fn in_flight_job_finishes_before_stop_without_further_polls() {
    let fixture = TestFixture::new();
    let gate = fixture.store.pause_gets();
    let job = submit(&fixture, "slow.png", "image/png", encode_image(12, 12, ImageFormat::Png), 2).await;

    let cancel = CancellationToken::new();
    let worker = tokio::spawn(fixture.worker().run(cancel.clone()));

    tokio::time::timeout(Duration::from_secs(5), gate.entered())
        .await
        .expect("job never reached the store");
    let polls_at_cancel = fixture.queue.poll_count();
    cancel.cancel();

    // Still a message waiting; it must not be picked up.
    submit(&fixture, "late.png", "image/png", encode_image(4, 4, ImageFormat::Png), 2).await;
    tokio::time::sleep(POLL_TIMEOUT * 2).await;
    assert!(!worker.is_finished());
    gate.release();

    let summary = worker.await.unwrap();

    assert_eq!(summary, WorkerSummary { processed: 1, failed: 0 });
    assert!(fixture.store.object(fixture.processed_bucket(), &job.filename_processed).is_some());
    assert_eq!(fixture.queue.poll_count(), polls_at_cancel);
    assert_eq!(fixture.queue.pending(), 1);
    assert!(fixture.queue.is_closed());
}

#[tokio::test]
async fn cancelled_before_start_never_polls() {
    let fixture = TestFixture::new();
    submit(&fixture, "a.png", "image/png", encode_image(4, 4, ImageFormat::Png), 2).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = fixture.worker().run(cancel).await;

    assert_eq!(summary, WorkerSummary::default());
    assert_eq!(fixture.queue.poll_count(), 0);
    assert_eq!(fixture.queue.pending(), 1);
}

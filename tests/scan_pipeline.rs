mod common;

use common::{counted_frame, wait_for, DecodeOutcome, HeldDecoder, ScriptedDecoder};
use qrscan::config::CameraConfig;
use qrscan::{
    DecodeError, FrameSource, Rotation, ScanPipeline, ScanStore, Symbol, SymbolFormat,
    SyntheticCamera,
};
use rstest::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn hit(text: &str) -> DecodeOutcome {
    Ok(vec![Symbol::qr(text)])
}

fn empty() -> DecodeOutcome {
    Ok(Vec::new())
}

fn failure() -> DecodeOutcome {
    Err(DecodeError::failed(0, "no finder patterns"))
}

#[rstest]
#[case::success(hit("42"), Some("42"))]
#[case::nothing_found(empty(), None)]
#[case::opaque_only(Ok(vec![Symbol::opaque(SymbolFormat::Ean13)]), None)]
#[case::empty_text(hit(""), None)]
#[case::decoder_error(failure(), None)]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn test_each_outcome_releases_once(
    #[case] outcome: DecodeOutcome,
    #[case] expected: Option<&str>,
) {
    let (store, state) = ScanStore::new();
    let decoder = ScriptedDecoder::new();
    let pipeline = ScanPipeline::new(Arc::clone(&decoder), state.clone());
    let released = Arc::new(AtomicUsize::new(0));

    let gate = decoder.gate(1);
    pipeline.on_frame(counted_frame(1, &released));
    assert_eq!(released.load(Ordering::SeqCst), 0);

    gate.send(outcome).unwrap();
    assert!(pipeline.drain(Duration::from_secs(2)).await);
    state.flush().await;

    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(store.current_decoded_value().as_deref(), expected);
}

#[tokio::test]
async fn test_releases_once_per_frame_in_any_completion_order() {
    let (_store, state) = ScanStore::new();
    let decoder = ScriptedDecoder::new();
    let pipeline = ScanPipeline::new(Arc::clone(&decoder), state);
    let released = Arc::new(AtomicUsize::new(0));

    let mut gates: Vec<_> = (1..=6).map(|id| decoder.gate(id)).collect();
    for id in 1..=6 {
        pipeline.on_frame(counted_frame(id, &released));
    }

    // Finish back to front, mixing every kind of outcome
    let outcomes = [hit("a"), failure(), empty(), hit("b"), failure(), empty()];
    for (gate, outcome) in gates.drain(..).rev().zip(outcomes) {
        gate.send(outcome).unwrap();
    }

    assert!(pipeline.drain(Duration::from_secs(2)).await);
    assert_eq!(released.load(Ordering::SeqCst), 6);

    let stats = pipeline.stats();
    assert_eq!(stats.completed, 6);
    assert_eq!(stats.decodes_failed, 2);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn test_empty_result_keeps_previous_value() {
    let (store, state) = ScanStore::new();
    let decoder = ScriptedDecoder::new();
    let pipeline = ScanPipeline::new(Arc::clone(&decoder), state.clone());
    let released = Arc::new(AtomicUsize::new(0));

    decoder.gate(1).send(hit("first")).unwrap();
    pipeline.on_frame(counted_frame(1, &released));
    assert!(wait_for(|| pipeline.stats().completed == 1, Duration::from_secs(2)).await);

    decoder.gate(2).send(empty()).unwrap();
    pipeline.on_frame(counted_frame(2, &released));
    decoder.gate(3).send(failure()).unwrap();
    pipeline.on_frame(counted_frame(3, &released));

    assert!(pipeline.drain(Duration::from_secs(2)).await);
    state.flush().await;

    assert_eq!(store.current_decoded_value(), Some("first".to_string()));
    assert_eq!(store.snapshot().decoded.unwrap().frame_id, 1);
}

#[tokio::test]
async fn test_first_text_in_decoder_order_wins() {
    let (store, state) = ScanStore::new();
    let decoder = ScriptedDecoder::new();
    let pipeline = ScanPipeline::new(Arc::clone(&decoder), state.clone());
    let released = Arc::new(AtomicUsize::new(0));

    decoder
        .gate(1)
        .send(Ok(vec![
            Symbol::opaque(SymbolFormat::DataMatrix),
            Symbol::qr("front"),
            Symbol::qr("back"),
        ]))
        .unwrap();
    pipeline.on_frame(counted_frame(1, &released));

    assert!(pipeline.drain(Duration::from_secs(2)).await);
    state.flush().await;
    assert_eq!(store.current_decoded_value(), Some("front".to_string()));
}

#[tokio::test]
async fn test_last_completion_wins_over_frame_order() {
    let (store, state) = ScanStore::new();
    let decoder = ScriptedDecoder::new();
    let pipeline = ScanPipeline::new(Arc::clone(&decoder), state.clone());
    let released = Arc::new(AtomicUsize::new(0));

    let older = decoder.gate(1);
    let newer = decoder.gate(2);
    pipeline.on_frame(counted_frame(1, &released));
    pipeline.on_frame(counted_frame(2, &released));

    newer.send(hit("B")).unwrap();
    assert!(wait_for(|| pipeline.stats().completed == 1, Duration::from_secs(2)).await);
    older.send(hit("A")).unwrap();

    assert!(pipeline.drain(Duration::from_secs(2)).await);
    state.flush().await;

    let decoded = store.snapshot().decoded.unwrap();
    assert_eq!(decoded.text, "A");
    assert_eq!(decoded.frame_id, 1);
}

#[tokio::test]
async fn test_repeated_value_is_republished() {
    let (store, state) = ScanStore::new();
    let decoder = ScriptedDecoder::new();
    let pipeline = ScanPipeline::new(Arc::clone(&decoder), state.clone());
    let released = Arc::new(AtomicUsize::new(0));
    let mut changes = store.subscribe();

    decoder.gate(1).send(hit("same")).unwrap();
    pipeline.on_frame(counted_frame(1, &released));
    assert!(wait_for(|| pipeline.stats().completed == 1, Duration::from_secs(2)).await);
    state.flush().await;
    let first = changes.borrow_and_update().revision;

    decoder.gate(2).send(hit("same")).unwrap();
    pipeline.on_frame(counted_frame(2, &released));
    assert!(pipeline.drain(Duration::from_secs(2)).await);
    state.flush().await;

    assert!(changes.has_changed().unwrap());
    assert!(changes.borrow_and_update().revision > first);
    assert_eq!(pipeline.stats().values_published, 2);
}

#[tokio::test]
async fn test_late_completion_after_unsubscribe() {
    let camera = SyntheticCamera::new(CameraConfig {
        permission_granted: true,
        resolution: (32, 24),
        fps: 200,
        rotation: Rotation::Rotate0,
        max_outstanding_frames: 1,
    });
    let (store, state) = ScanStore::new();
    let (decoder, open) = HeldDecoder::new("late");
    let pipeline = ScanPipeline::new(decoder, state.clone());

    camera.subscribe(pipeline.frame_handler()).await.unwrap();
    assert!(wait_for(|| pipeline.in_flight() == 1, Duration::from_secs(2)).await);

    camera.unsubscribe().await.unwrap();
    assert!(!camera.is_active());
    assert_eq!(camera.stats().outstanding(), 1);

    open.send(true).unwrap();
    assert!(pipeline.drain(Duration::from_secs(2)).await);
    state.flush().await;

    assert_eq!(store.current_decoded_value(), Some("late".to_string()));
    assert_eq!(camera.stats().outstanding(), 0);
    assert_eq!(pipeline.stats().frames_submitted, 1);
}

#[tokio::test]
async fn test_cancel_on_stop_releases_without_publishing() {
    let (store, state) = ScanStore::new();
    let (decoder, _open) = HeldDecoder::new("never");
    let pipeline = ScanPipeline::with_options(decoder, state.clone(), None, true);
    let released = Arc::new(AtomicUsize::new(0));

    pipeline.on_frame(counted_frame(1, &released));
    pipeline.on_frame(counted_frame(2, &released));
    assert!(wait_for(|| pipeline.in_flight() == 2, Duration::from_secs(2)).await);

    pipeline.stop();
    assert!(pipeline.drain(Duration::from_secs(2)).await);
    state.flush().await;

    assert_eq!(released.load(Ordering::SeqCst), 2);
    assert_eq!(store.current_decoded_value(), None);
    let stats = pipeline.stats();
    assert_eq!(stats.decodes_cancelled, 2);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.values_published, 0);
    assert_eq!(pipeline.in_flight(), 0);
}

#[tokio::test]
async fn test_frame_after_cancelling_stop_is_cancelled_even_if_ready() {
    let (store, state) = ScanStore::new();
    let decoder = ScriptedDecoder::new();
    let pipeline = ScanPipeline::with_options(Arc::clone(&decoder), state.clone(), None, true);
    let released = Arc::new(AtomicUsize::new(0));

    decoder.gate(7).send(hit("too late")).unwrap();
    pipeline.stop();
    pipeline.on_frame(counted_frame(7, &released));
    assert!(pipeline.drain(Duration::from_secs(2)).await);
    state.flush().await;

    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(store.current_decoded_value(), None);
    assert_eq!(pipeline.stats().decodes_cancelled, 1);
    assert_eq!(pipeline.stats().decodes_succeeded, 0);
}

//! Integration tests for failed commands and degraded pipelines.

mod common;

use common::*;

#[tokio::test]
async fn test_missing_base_source() {
    let test = TestStation::new();
    std::fs::remove_file(&test.station.config().stream.base_source).unwrap();

    let result = test.station.handle_command("start").await;

    assert!(matches!(result, Err(CommandError::SourceOpen { .. })));
    assert_eq!(test.station.state(), PipelineState::Idle);
}

#[tokio::test]
async fn test_empty_command() {
    let test = TestStation::new();

    let result = test.station.handle_command("  ").await;

    assert!(matches!(result, Err(CommandError::UnknownCommand(_))));
}

#[tokio::test]
async fn test_unknown_effect_leaves_pipeline_untouched() {
    let test = TestStation::new();
    let recorder = Recorder::subscribe(&test.station);

    test.station.handle_command("start").await.unwrap();
    wait(100).await;

    let result = test.station.handle_command("applause").await;
    match result {
        Err(CommandError::EffectNotFound(name)) => assert_eq!(name, "applause"),
        other => panic!("Expected EffectNotFound, got {other:?}"),
    }
    assert_eq!(test.station.state(), PipelineState::Playing);
    assert_eq!(test.mixer.calls(), 0);

    wait(150).await;
    test.station.handle_command("stop").await.unwrap();
    wait(50).await;

    // Still the same source, from the same position
    assert_base_prefix(&recorder.bytes());
    assert!(recorder.len() > 100 * 100);
}

#[tokio::test]
async fn test_effect_while_idle() {
    let test = TestStation::new();

    let result = test.station.handle_command("laugh").await;

    assert!(matches!(result, Err(CommandError::NotPlaying)));
    assert_eq!(test.station.state(), PipelineState::Idle);
    assert_eq!(test.mixer.calls(), 0);
}

#[tokio::test]
async fn test_splice_with_missing_effect_path() {
    let test = TestStation::new();
    test.station.handle_command("start").await.unwrap();

    let result = test
        .station
        .controller()
        .splice_effect(&test.fx_path("gone.mp3"))
        .await;

    assert!(matches!(result, Err(CommandError::EffectNotFound(_))));
    assert_eq!(test.station.state(), PipelineState::Playing);
    test.station.handle_command("stop").await.unwrap();
}

#[tokio::test]
async fn test_mixer_failure_leaves_listeners_in_silence() {
    let test = TestStation::with_mixer(StubMixer::failing());
    let recorder = Recorder::subscribe(&test.station);

    test.station.handle_command("start").await.unwrap();
    wait(100).await;

    test.station.handle_command("laugh").await.unwrap();
    assert_eq!(test.station.state(), PipelineState::PlayingMerged);
    assert_eq!(test.mixer.calls(), 1);

    wait(50).await;
    let silent_from = recorder.len();
    wait(200).await;

    assert_eq!(recorder.len(), silent_from);
    assert_eq!(test.station.listener_count(), 1);

    // A fresh start recovers the stream
    test.station.handle_command("stop").await.unwrap();
    test.station.handle_command("start").await.unwrap();
    wait(150).await;
    test.station.handle_command("stop").await.unwrap();
    wait(50).await;

    assert!(recorder.len() > silent_from);
    assert_base_prefix(&recorder.bytes()[silent_from..]);
}

#[tokio::test]
async fn test_failing_sox_leaves_listeners_in_silence() {
    let test = TestStation::with_sox("echo 'sox FAIL boom' >&2\nexit 2");
    let recorder = Recorder::subscribe(&test.station);

    test.station.handle_command("start").await.unwrap();
    wait(150).await;
    assert!(recorder.len() > 0);

    test.station.handle_command("laugh").await.unwrap();
    assert_eq!(test.station.state(), PipelineState::PlayingMerged);

    wait(300).await;
    let silent_from = recorder.len();
    wait(400).await;

    assert_eq!(recorder.len(), silent_from);
    assert_eq!(test.station.listener_count(), 1);
    test.station.handle_command("stop").await.unwrap();
}

#[tokio::test]
async fn test_start_recovers_from_mixer_failure() {
    let test = TestStation::with_mixer(StubMixer::failing());
    let recorder = Recorder::subscribe(&test.station);

    test.station.handle_command("start").await.unwrap();
    wait(100).await;
    test.station.handle_command("laugh").await.unwrap();
    wait(50).await;
    let silent_from = recorder.len();

    test.station.handle_command("start").await.unwrap();
    assert_eq!(test.station.state(), PipelineState::Playing);
    wait(150).await;
    test.station.handle_command("stop").await.unwrap();
    wait(50).await;

    assert!(recorder.len() > silent_from);
    assert_base_prefix(&recorder.bytes()[silent_from..]);
}

//! Turn orchestration tests against scripted providers

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use billy_gateway::{Assistant, InteractionStyle, Modes, ResponseChunk, TurnOutcome};

mod common;

use common::{OutputEvent, RecordingAudio, RecordingOutput, RecordingVoice, ScriptedProvider};

struct Harness {
    assistant: Assistant,
    spoken: Arc<Mutex<Vec<String>>>,
    output: Arc<RecordingOutput>,
    audio: Arc<RecordingAudio>,
}

impl Harness {
    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    fn clip_texts(&self) -> Vec<String> {
        self.audio
            .clips
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

fn harness(provider: ScriptedProvider, voice: RecordingVoice, modes: Modes) -> Harness {
    let spoken = Arc::clone(&voice.spoken);
    let output = Arc::new(RecordingOutput::default());
    let audio = Arc::new(RecordingAudio::default());
    let assistant = Assistant::new(Box::new(provider), Some(Box::new(voice)), modes)
        .with_output(output.clone())
        .with_audio_sink(audio.clone());
    Harness {
        assistant,
        spoken,
        output,
        audio,
    }
}

#[tokio::test]
async fn test_request_response_speaks_trimmed_reply() {
    let provider = ScriptedProvider::new(InteractionStyle::RequestResponse).turn(vec![
        ResponseChunk::completed("  Why did the fish blush? It saw the ocean's bottom.  "),
    ]);
    let mut h = harness(provider, RecordingVoice::default(), Modes::default());

    let outcome = h.assistant.process_user_input("Tell me a joke").await.unwrap();

    let expected = "Why did the fish blush? It saw the ocean's bottom.";
    assert_eq!(outcome, TurnOutcome::Spoken(expected.to_string()));
    assert_eq!(h.spoken(), vec![expected]);
    assert_eq!(h.clip_texts(), vec![expected]);
}

#[tokio::test]
async fn test_incremental_fragments_concatenate_into_speech() {
    let provider = ScriptedProvider::new(InteractionStyle::IncrementalStreaming).turn(vec![
        ResponseChunk::delta(" Hel"),
        ResponseChunk::delta("lo "),
        ResponseChunk::delta("there"),
        ResponseChunk::final_delta(""),
    ]);
    let mut h = harness(provider, RecordingVoice::default(), Modes::default());

    let outcome = h.assistant.process_user_input("hi").await.unwrap();

    assert_eq!(outcome, TurnOutcome::Spoken("Hello there".to_string()));
    assert_eq!(h.output.fragments(), vec![" Hel", "lo ", "there"]);
    // Synthesis input is exactly the trimmed concatenation
    assert_eq!(h.spoken(), vec![h.output.fragments().concat().trim().to_string()]);
}

#[tokio::test]
async fn test_incremental_error_discards_partial_reply() {
    let provider = ScriptedProvider::new(InteractionStyle::IncrementalStreaming)
        .turn(vec![
            ResponseChunk::delta("half a "),
            ResponseChunk::error("Ollama stream interrupted"),
        ])
        .turn(vec![ResponseChunk::delta("fresh"), ResponseChunk::final_delta("")]);
    let mut h = harness(provider, RecordingVoice::default(), Modes::default());

    let first = h.assistant.process_user_input("one").await.unwrap();
    assert_eq!(
        first,
        TurnOutcome::Failed("Ollama stream interrupted".to_string())
    );
    assert!(h.spoken().is_empty());
    assert_eq!(h.output.errors(), vec!["Ollama stream interrupted"]);

    // Nothing from the failed turn leaks into the next one
    let second = h.assistant.process_user_input("two").await.unwrap();
    assert_eq!(second, TurnOutcome::Spoken("fresh".to_string()));
    assert_eq!(h.spoken(), vec!["fresh"]);
    assert!(h.assistant.is_session_active());
}

#[tokio::test]
async fn test_full_duplex_never_synthesizes() {
    let provider = ScriptedProvider::new(InteractionStyle::FullDuplexStreaming)
        .turn(vec![
            ResponseChunk::delta("Blub "),
            ResponseChunk::delta("blub."),
            ResponseChunk::completed("Blub blub."),
        ])
        .with_native_audio(b"RIFF-native".to_vec());
    let mut h = harness(provider, RecordingVoice::default(), Modes::default());

    let outcome = h.assistant.process_user_input("sing").await.unwrap();

    assert_eq!(outcome, TurnOutcome::Delegated("Blub blub.".to_string()));
    assert!(h.spoken().is_empty());
    let clips = h.audio.clips.lock().unwrap().clone();
    assert_eq!(clips, vec![(b"RIFF-native".to_vec(), "Blub blub.".to_string())]);
}

#[tokio::test]
async fn test_text_only_mode_skips_synthesis() {
    let provider = ScriptedProvider::new(InteractionStyle::RequestResponse)
        .turn(vec![ResponseChunk::completed("Just text")]);
    let modes = Modes {
        text_only: true,
        ..Modes::default()
    };
    let mut h = harness(provider, RecordingVoice::default(), modes);

    let outcome = h.assistant.process_user_input("hi").await.unwrap();

    assert_eq!(outcome, TurnOutcome::Unspoken("Just text".to_string()));
    assert!(h.spoken().is_empty());
    assert!(h.clip_texts().is_empty());
}

#[tokio::test]
async fn test_empty_reply_is_not_spoken() {
    let provider = ScriptedProvider::new(InteractionStyle::RequestResponse)
        .turn(vec![ResponseChunk::completed("   ")]);
    let mut h = harness(provider, RecordingVoice::default(), Modes::default());

    let outcome = h.assistant.process_user_input("hi").await.unwrap();
    assert_eq!(outcome, TurnOutcome::Unspoken(String::new()));
    assert!(h.spoken().is_empty());
}

#[tokio::test]
async fn test_synthesis_failure_is_turn_scoped() {
    let provider = ScriptedProvider::new(InteractionStyle::RequestResponse)
        .turn(vec![ResponseChunk::completed("first")])
        .turn(vec![ResponseChunk::completed("second")]);
    let voice = RecordingVoice::default().fail_next(503, "overloaded");
    let mut h = harness(provider, voice, Modes::default());

    let first = h.assistant.process_user_input("a").await.unwrap();
    assert!(matches!(first, TurnOutcome::Failed(ref m) if m.contains("503")));
    assert_eq!(h.output.errors().len(), 1);

    let second = h.assistant.process_user_input("b").await.unwrap();
    assert_eq!(second, TurnOutcome::Spoken("second".to_string()));
}

#[tokio::test]
async fn test_stream_without_terminal_fails_turn() {
    let provider = ScriptedProvider::new(InteractionStyle::IncrementalStreaming)
        .turn(vec![ResponseChunk::delta("dangling")]);
    let mut h = harness(provider, RecordingVoice::default(), Modes::default());

    let outcome = h.assistant.process_user_input("hi").await.unwrap();
    assert_eq!(
        outcome,
        TurnOutcome::Failed("response stream ended before completion".to_string())
    );
    assert!(h.spoken().is_empty());
}

#[tokio::test]
async fn test_interrupt_abandons_turn_without_audio() {
    let provider = ScriptedProvider::new(InteractionStyle::IncrementalStreaming)
        .turn(vec![ResponseChunk::delta("never finishes")])
        .hanging();
    let mut h = harness(provider, RecordingVoice::default(), Modes::default());
    let handle = h.assistant.interrupt_handle();

    let interrupter = async {
        while !handle.is_busy() {
            tokio::task::yield_now().await;
        }
        assert!(handle.interrupt());
    };
    let (outcome, ()) = tokio::join!(h.assistant.process_user_input("hi"), interrupter);

    assert_eq!(outcome.unwrap(), TurnOutcome::Cancelled);
    assert!(!handle.is_busy());
    assert_eq!(
        h.output.events.lock().unwrap().clone(),
        vec![
            OutputEvent::Fragment("never finishes".to_string()),
            OutputEvent::Interrupted,
        ]
    );
    assert!(h.spoken().is_empty());
    assert!(h.clip_texts().is_empty());
    assert!(!handle.interrupt());
}

#[tokio::test]
async fn test_session_lifecycle() {
    let provider = ScriptedProvider::new(InteractionStyle::RequestResponse)
        .turn(vec![ResponseChunk::completed("ok")]);
    let started = Arc::clone(&provider.sessions_started);
    let ended = Arc::clone(&provider.sessions_ended);
    let sent = Arc::clone(&provider.sent);
    let mut h = harness(provider, RecordingVoice::default(), Modes::default());

    assert!(!h.assistant.is_session_active());
    h.assistant.process_user_input("  hello  ").await.unwrap();
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(sent.lock().unwrap().clone(), vec!["hello"]);

    // Blank input never reaches the provider
    h.assistant.process_user_input("   ").await.unwrap();
    assert_eq!(sent.lock().unwrap().len(), 1);

    h.assistant.shutdown().await;
    h.assistant.shutdown().await;
    assert_eq!(ended.load(Ordering::SeqCst), 1);
    assert!(!h.assistant.is_session_active());
}

#[tokio::test]
async fn test_output_order_for_request_response() {
    let provider = ScriptedProvider::new(InteractionStyle::RequestResponse)
        .turn(vec![ResponseChunk::completed("hello")]);
    let mut h = harness(provider, RecordingVoice::default(), Modes::default());

    h.assistant.process_user_input("hi").await.unwrap();
    assert_eq!(
        h.output.events.lock().unwrap().clone(),
        vec![OutputEvent::Reply("hello".to_string())]
    );
}

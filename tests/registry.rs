//! Factory behavior with custom registrations

use billy_gateway::config::ProviderConfig;
use billy_gateway::{
    Assistant, Capability, Config, Error, InteractionStyle, Modes, ProviderFactory,
    RequiredField, ResponseChunk, TurnOutcome,
};

mod common;

use common::{RecordingAudio, RecordingVoice, ScriptedProvider};

fn scripted_factory() -> ProviderFactory {
    ProviderFactory::builder()
        .llm("scripted", &[], || {
            Box::new(
                ScriptedProvider::new(InteractionStyle::RequestResponse)
                    .turn(vec![ResponseChunk::completed("Bubbles!")]),
            )
        })
        .voice("recording", &[RequiredField::ApiUrl], || {
            Box::new(RecordingVoice::default())
        })
        .build()
}

#[tokio::test]
async fn test_unknown_provider_lists_registered_names() {
    let factory = scripted_factory();
    let Err(err) = factory
        .create_llm_provider(&ProviderConfig::named("gpt-9"))
        .await
    else {
        panic!("expected unknown provider");
    };

    match err {
        Error::UnknownProvider {
            capability,
            name,
            available,
        } => {
            assert_eq!(capability, Capability::Llm);
            assert_eq!(name, "gpt-9");
            assert_eq!(available, vec!["scripted"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_builtin_unknown_voice_lists_all_voices() {
    let Err(err) = ProviderFactory::builtin()
        .create_voice_provider(&ProviderConfig::named("espeak"))
        .await
    else {
        panic!("expected unknown provider");
    };

    let message = err.to_string();
    for name in ["openai", "chatterai", "xtt"] {
        assert!(message.contains(name), "{message}");
    }
}

#[test]
fn test_custom_required_fields() {
    let factory = scripted_factory();
    assert_eq!(
        factory.required_fields(Capability::Voice, "Recording"),
        Some(vec![RequiredField::ApiUrl])
    );
    assert!(
        factory
            .validate_config(Capability::Voice, &ProviderConfig::named("recording"))
            .is_err()
    );
    factory
        .validate_config(
            Capability::Voice,
            &ProviderConfig::named("recording").with_api_url("http://fish"),
        )
        .unwrap();
}

#[test]
fn test_provider_names_are_normalized_by_the_registry() {
    let config = ProviderConfig::named("  XTT ").with_api_url("http://tts:8080");
    ProviderFactory::builtin()
        .validate_config(Capability::Voice, &config)
        .unwrap();
    assert_eq!(
        ProviderFactory::builtin().required_fields(Capability::Llm, " Ollama"),
        Some(vec![RequiredField::ApiUrl])
    );
}

#[tokio::test]
async fn test_assistant_from_custom_factory() {
    let factory = scripted_factory();
    let config = Config {
        llm: ProviderConfig::named("scripted"),
        voice: ProviderConfig::named("recording").with_api_url("http://fish"),
        modes: Modes::default(),
    };

    let audio = std::sync::Arc::new(RecordingAudio::default());
    let mut assistant = Assistant::from_config(&config, &factory)
        .await
        .unwrap()
        .with_audio_sink(audio.clone());

    let outcome = assistant.process_user_input("say something").await.unwrap();
    assert_eq!(outcome, TurnOutcome::Spoken("Bubbles!".to_string()));
    assert_eq!(audio.clips.lock().unwrap().len(), 1);
    assistant.shutdown().await;
}

#[tokio::test]
async fn test_text_only_skips_voice_creation() {
    let factory = scripted_factory();
    let config = Config {
        llm: ProviderConfig::named("scripted"),
        // Would fail lookup if the factory tried to build it
        voice: ProviderConfig::named("does-not-exist"),
        modes: Modes {
            text_only: true,
            ..Modes::default()
        },
    };

    let mut assistant = Assistant::from_config(&config, &factory).await.unwrap();
    let outcome = assistant.process_user_input("hi").await.unwrap();
    assert_eq!(outcome, TurnOutcome::Unspoken("Bubbles!".to_string()));
}

use pipertray::audio::sink::{CollectorSink, shared};
use pipertray::config::{Config, LanguageVoice};
use pipertray::pipeline::{PipelineController, PipelineSettings, SpeakOutcome};
use pipertray::synth::{MockBackend, VoiceProfile};
use pipertray::text::{Language, segment};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn settings() -> PipelineSettings {
    PipelineSettings {
        voice: VoiceProfile {
            model: PathBuf::from("/voices/default.onnx"),
            ..VoiceProfile::default()
        },
        poll_interval: Duration::from_millis(5),
        ..PipelineSettings::default()
    }
}

fn controller(
    backend: &MockBackend,
    collector: &CollectorSink,
    settings: PipelineSettings,
) -> PipelineController {
    PipelineController::new(Arc::new(backend.clone()), shared(collector.clone()), settings)
}

/// About 2,000 characters of prose with no blank lines.
fn long_text() -> String {
    let mut text = String::new();
    let mut i = 0;
    while text.len() < 2000 {
        text.push_str(&format!(
            "Sentence number {} keeps the paragraph going for a while. ",
            i
        ));
        i += 1;
    }
    text.trim_end().to_string()
}

#[tokio::test]
async fn short_text_is_a_single_chunk_and_call() {
    let text = "Hello there. This is PiperTray.";
    let backend = MockBackend::new();
    let collector = CollectorSink::new();
    let controller = controller(&backend, &collector, settings());

    assert_eq!(segment(text, 800).len(), 1);

    let audio = controller.export(text).await.unwrap();
    assert_eq!(backend.call_count(), 1);

    let reader = hound::WavReader::new(Cursor::new(audio.as_bytes())).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 22050);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);

    let expected = MockBackend::samples_for(text);
    assert_eq!(reader.len() as usize * 2, expected.len());
    assert_eq!(audio.samples(), expected.as_slice());
}

#[tokio::test]
async fn long_text_is_chunked_and_exported_in_order() {
    let text = long_text();
    let chunks = segment(&text, 800);
    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.len() <= 800));

    // The first chunk finishes last.
    let backend = MockBackend::new().with_delay(|r| {
        if r.text.starts_with("Sentence number 0 ") {
            Duration::from_millis(80)
        } else {
            Duration::from_millis(5)
        }
    });
    let collector = CollectorSink::new();
    let controller = controller(&backend, &collector, settings());

    let audio = controller.export(&text).await.unwrap();

    assert_eq!(backend.calls()[0].text, chunks[0].text);
    let expected: Vec<u8> = chunks
        .iter()
        .flat_map(|c| MockBackend::samples_for(&c.text))
        .collect();
    assert_eq!(audio.samples(), expected.as_slice());

    let declared = u32::from_le_bytes([
        audio.as_bytes()[40],
        audio.as_bytes()[41],
        audio.as_bytes()[42],
        audio.as_bytes()[43],
    ]);
    assert_eq!(declared as usize, expected.len());
}

#[tokio::test]
async fn streaming_speak_plays_chunks_in_input_order() {
    let text = long_text();
    let chunks = segment(&text, 300);

    let backend = MockBackend::new().with_delay(|r| {
        let seed = r.text.bytes().map(u64::from).sum::<u64>();
        Duration::from_millis((seed * 17 + 42) % 40)
    });
    let collector = CollectorSink::new();
    let controller = controller(
        &backend,
        &collector,
        PipelineSettings {
            max_chunk_len: 300,
            ..settings()
        },
    );

    let outcome = controller.speak(&text).await.unwrap();
    assert_eq!(outcome, SpeakOutcome::Completed);

    let played: Vec<Vec<u8>> = collector
        .played()
        .iter()
        .map(|c| c.samples().to_vec())
        .collect();
    let expected: Vec<Vec<u8>> = chunks
        .iter()
        .map(|c| MockBackend::samples_for(&c.text))
        .collect();
    assert_eq!(played, expected);
    assert!(backend.max_in_flight() <= 4);
}

#[tokio::test]
async fn mixed_language_text_uses_one_voice_per_language() {
    let mut config = Config::default();
    config.voice.model = PathBuf::from("/voices/default.onnx");
    config.languages.enabled = true;
    config.languages.voices = vec![
        LanguageVoice {
            language: Language::English,
            model: PathBuf::from("/voices/en.onnx"),
            speaker_id: 0,
            speed: 5,
        },
        LanguageVoice {
            language: Language::French,
            model: PathBuf::from("/voices/fr.onnx"),
            speaker_id: 0,
            speed: 4,
        },
    ];

    let backend = MockBackend::new();
    let collector = CollectorSink::new();
    let controller = controller(&backend, &collector, config.pipeline_settings());

    controller
        .export("Hello world. Bonjour le monde.")
        .await
        .unwrap();

    let mut calls = backend.calls();
    calls.sort_by(|a, b| a.text.cmp(&b.text));
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].text, "Bonjour le monde.");
    assert_eq!(calls[0].voice_model, PathBuf::from("/voices/fr.onnx"));
    assert_eq!(calls[0].speed, 4);
    assert_eq!(calls[1].text, "Hello world.");
    assert_eq!(calls[1].voice_model, PathBuf::from("/voices/en.onnx"));
    assert_ne!(calls[0].voice_model, calls[1].voice_model);
}

#[tokio::test]
async fn cancelling_mid_generation_stops_playback_and_backend() {
    let text = long_text();
    // The first chunk is quick; everything after it is slow.
    let first = segment(&text, 300)[0].text.clone();
    let backend = MockBackend::new().with_delay(move |r| {
        if r.text == first {
            Duration::ZERO
        } else {
            Duration::from_secs(10)
        }
    });
    let collector = CollectorSink::new().with_play_time(Duration::from_millis(50));
    let controller = Arc::new(controller(
        &backend,
        &collector,
        PipelineSettings {
            max_chunk_len: 300,
            ..settings()
        },
    ));

    let speaking = {
        let controller = controller.clone();
        let text = text.clone();
        tokio::spawn(async move { controller.speak(&text).await })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(controller.is_speaking());
    controller.stop().await.unwrap();

    let began = Instant::now();
    let outcome = speaking.await.unwrap().unwrap();
    assert_eq!(outcome, SpeakOutcome::Cancelled);
    assert!(began.elapsed() < Duration::from_secs(1));

    let played_at_stop = collector.play_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(collector.play_count(), played_at_stop);
    assert_eq!(played_at_stop, 1);
    assert_eq!(backend.in_flight(), 0);
    assert!(!controller.is_speaking());
}

#[tokio::test]
async fn concurrent_requests_leave_only_the_last_one_running() {
    let backend = MockBackend::new().with_fixed_delay(Duration::from_millis(200));
    let collector = CollectorSink::new();
    let controller = Arc::new(controller(&backend, &collector, settings()));

    let mut handles = Vec::new();
    for i in 0..3 {
        let controller = controller.clone();
        handles.push(tokio::spawn(async move {
            controller.speak(&format!("Request {}.", i)).await
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(
        outcomes,
        vec![
            SpeakOutcome::Cancelled,
            SpeakOutcome::Cancelled,
            SpeakOutcome::Completed
        ]
    );
    assert_eq!(collector.play_count(), 1);
    assert_eq!(
        collector.played()[0].samples(),
        MockBackend::samples_for("Request 2.").as_slice()
    );
    assert_eq!(backend.in_flight(), 0);
}

#[tokio::test]
async fn failed_chunk_fails_the_whole_export() {
    let backend = MockBackend::new().with_failure_on("number 7 ");
    let collector = CollectorSink::new();
    let controller = controller(
        &backend,
        &collector,
        PipelineSettings {
            max_chunk_len: 200,
            ..settings()
        },
    );

    let result = controller.export(&long_text()).await;
    assert!(result.is_err());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.in_flight(), 0);
}

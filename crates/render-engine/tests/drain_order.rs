use clipfx_common::config::{ExportDefaults, GpuBackend};
use clipfx_processing_core::FrameBuffer;
use clipfx_project_model::{FilterKind, FilterList};
use clipfx_render_engine::encoder::{EncoderEvent, TrackKind};
use clipfx_render_engine::{
    AudioTrackInfo, DownmixMessage, EncodeSession, FilterPipeline, MultiChannelBlock,
    RecordingEncoderFactory, SessionSettings, SessionState,
};

fn settings(audio: Option<AudioTrackInfo>) -> SessionSettings {
    let mut settings = SessionSettings::new(30, ExportDefaults::default());
    settings.audio_source = audio;
    settings
}

fn stereo() -> AudioTrackInfo {
    AudioTrackInfo {
        channels: 2,
        sample_rate: 44_100,
    }
}

/// Filter and encode `count` frames the way the export loop does.
fn render_frames(session: &mut EncodeSession, count: u64) {
    let mut filters = FilterList::new();
    filters.add(FilterKind::Greyscale);
    let mut pipeline = FilterPipeline::new(GpuBackend::Software);

    for index in 0..count {
        let mut frame = FrameBuffer::filled(4, 4, [180, 20, 90, 255]);
        pipeline
            .apply_filters(&mut frame, &filters, index as f64 / 30.0, None)
            .unwrap();
        session.encode_frame(frame, index).unwrap();
    }
}

fn position(events: &[EncoderEvent], wanted: &EncoderEvent) -> usize {
    events
        .iter()
        .position(|e| e == wanted)
        .unwrap_or_else(|| panic!("{wanted:?} missing from {events:?}"))
}

#[test]
fn test_drain_order_with_audio_from_producer_thread() {
    let factory = RecordingEncoderFactory::new();
    let mut session = EncodeSession::new(Box::new(factory.clone()));
    session.init_encoder(4, 4, &settings(Some(stereo()))).unwrap();
    assert_eq!(session.audio_sample_rate(), Some(44_100));

    let input = session.audio_input().unwrap();
    let producer = std::thread::spawn(move || {
        for _ in 0..5 {
            let block = MultiChannelBlock::new(vec![vec![0.25; 128]; 2], 44_100);
            if input.send(DownmixMessage::AudioBlock(block)).is_err() {
                break;
            }
        }
    });

    render_frames(&mut session, 3);
    producer.join().unwrap();
    let bytes = session.finalize_export().unwrap();

    assert_eq!(session.state(), SessionState::Finalized);
    assert_eq!(session.frames_encoded(), 3);
    assert_eq!(session.audio_samples_encoded(), 5 * 128);

    let events = factory.events();
    let audio_stop = position(&events, &EncoderEvent::AudioStop);
    let audio_flush = position(&events, &EncoderEvent::AudioFlush);
    let video_flush = position(&events, &EncoderEvent::VideoFlush);
    let audio_track = position(&events, &EncoderEvent::TrackAdded(TrackKind::Audio));
    let video_track = position(&events, &EncoderEvent::TrackAdded(TrackKind::Video));
    let finalize = position(&events, &EncoderEvent::MuxFinalize);

    assert!(audio_stop < audio_flush);
    assert!(audio_flush < video_flush);
    assert!(audio_track < video_track);
    assert!(video_flush < finalize);
    assert_eq!(finalize, events.len() - 1);

    // No audio reaches the encoder after its flush.
    assert!(events[audio_flush..]
        .iter()
        .all(|e| !matches!(e, EncoderEvent::AudioData { .. })));

    let summary: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(summary["tracks"], serde_json::json!(["Audio", "Video"]));
}

#[test]
fn test_drain_order_without_audio() {
    let factory = RecordingEncoderFactory::new();
    let mut session = EncodeSession::new(Box::new(factory.clone()));
    session.init_encoder(4, 4, &settings(None)).unwrap();
    assert!(!session.has_audio());

    render_frames(&mut session, 2);
    session.finalize_export().unwrap();

    let events = factory.events();
    assert!(!events.iter().any(|e| matches!(
        e,
        EncoderEvent::AudioConfigured(_) | EncoderEvent::AudioFlush
    )));
    assert_eq!(
        events[events.len() - 4..],
        [
            EncoderEvent::AudioStop,
            EncoderEvent::VideoFlush,
            EncoderEvent::TrackAdded(TrackKind::Video),
            EncoderEvent::MuxFinalize,
        ]
    );

    let err = session
        .encode_frame(FrameBuffer::filled(4, 4, [0; 4]), 2)
        .unwrap_err();
    assert!(err.to_string().contains("after finalize"));
}

#[test]
fn test_cancel_runs_same_drain_and_drops_pending_audio() {
    let factory = RecordingEncoderFactory::new();
    let mut session = EncodeSession::new(Box::new(factory.clone()));
    session.init_encoder(4, 4, &settings(Some(stereo()))).unwrap();

    render_frames(&mut session, 1);
    session.cancel().unwrap();
    assert_eq!(session.state(), SessionState::Finalized);

    let events = factory.events();
    let audio_stop = position(&events, &EncoderEvent::AudioStop);
    let audio_flush = position(&events, &EncoderEvent::AudioFlush);
    let video_flush = position(&events, &EncoderEvent::VideoFlush);
    assert!(audio_stop < audio_flush);
    assert!(audio_flush < video_flush);
    assert_eq!(events.last(), Some(&EncoderEvent::MuxFinalize));
}

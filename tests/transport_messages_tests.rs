use voice_interview::audio::{AudioChunk, StopReason};
use voice_interview::transport::{
    AiResponse, AudioPayload, ClientEvent, InterviewSnapshot, Phase, ServerEvent, Transcription,
};

fn chunk(is_final: bool) -> AudioChunk {
    let samples = vec![1200i16; 1600];
    AudioChunk {
        sequence: 0,
        rms: voice_interview::audio::rms(&samples),
        samples,
        sample_rate: 16000,
        channels: 1,
        start_ms: 0,
        end_ms: 100,
        is_final,
    }
}

#[test]
fn test_join_event_wire_format() {
    let event = ClientEvent::Join {
        session_id: "abc123".to_string(),
        user_id: "user-1".to_string(),
    };

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event"], "voiceInterview:join");
    assert_eq!(json["data"]["session_id"], "abc123");
    assert_eq!(json["data"]["user_id"], "user-1");
}

#[test]
fn test_audio_event_carries_wav_payload() {
    let payload = AudioPayload::from_chunk("abc123", &chunk(false), None).unwrap();
    let event = ClientEvent::Audio(payload);

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event"], "voiceInterview:audio");
    assert_eq!(json["data"]["audio_format"], "wav");
    assert_eq!(json["data"]["sample_rate"], 16000);
    assert_eq!(json["data"]["is_final"], false);
    assert!(json["data"].get("stop_reason").is_none());

    use base64::Engine;
    let wav = base64::engine::general_purpose::STANDARD
        .decode(json["data"]["audio_data"].as_str().unwrap())
        .unwrap();
    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");
}

#[test]
fn test_stop_reason_only_on_final_chunk() {
    let preview = AudioPayload::from_chunk("abc123", &chunk(false), Some(StopReason::Silence)).unwrap();
    assert_eq!(preview.stop_reason, None);

    let last = AudioPayload::from_chunk("abc123", &chunk(true), Some(StopReason::Silence)).unwrap();
    let json = serde_json::to_value(&last).unwrap();
    assert_eq!(json["is_final"], true);
    assert_eq!(json["stop_reason"], "silence");
}

#[test]
fn test_response_event_deserialization() {
    let json = r#"{
        "event": "voiceInterview:response",
        "data": {
            "session_id": "abc123",
            "text": "Tell me about a time you disagreed with a teammate.",
            "audio_data": null,
            "current_phase": "questions",
            "current_question_index": 2,
            "total_questions": 5,
            "progress_percentage": 40.0,
            "is_complete": false
        }
    }"#;

    let event: ServerEvent = serde_json::from_str(json).unwrap();
    let ServerEvent::Response(response) = event else {
        panic!("expected a response event");
    };
    assert_eq!(response.current_phase, Phase::Questions);
    assert_eq!(response.current_question_index, 2);
    assert!(response.audio_data.is_none());
    assert!(!response.should_ask_followup);

    let snapshot = response.snapshot();
    assert!(snapshot.is_started);
    assert_eq!(snapshot.total_questions, 5);
}

#[test]
fn test_transcription_retry_fields_default() {
    let json = r#"{"event":"voiceInterview:transcription","data":{"text":"hello","is_final":false}}"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    assert_eq!(
        event,
        ServerEvent::Transcription(Transcription {
            text: "hello".to_string(),
            is_final: false,
            should_retry: false,
            retry_message: None,
        })
    );
}

#[test]
fn test_joined_and_complete_events() {
    let joined = r#"{
        "event": "voiceInterview:joined",
        "data": {
            "state": {
                "current_phase": "greeting",
                "current_question_index": 0,
                "total_questions": 5,
                "progress_percentage": 0.0,
                "is_complete": false
            }
        }
    }"#;
    let event: ServerEvent = serde_json::from_str(joined).unwrap();
    assert!(matches!(
        event,
        ServerEvent::Joined {
            state: InterviewSnapshot {
                current_phase: Phase::Greeting,
                is_started: false,
                ..
            }
        }
    ));

    let complete = r#"{"event":"voiceInterview:complete","data":{"session_id":"abc123"}}"#;
    let event: ServerEvent = serde_json::from_str(complete).unwrap();
    assert_eq!(
        event,
        ServerEvent::Complete {
            session_id: "abc123".to_string()
        }
    );
}

#[test]
fn test_started_event_round_trips_audio() {
    let response = AiResponse {
        session_id: "abc123".to_string(),
        text: "Welcome! Let's begin.".to_string(),
        audio_data: Some("UklGRg==".to_string()),
        audio_format: Some("mp3".to_string()),
        current_phase: Phase::Greeting,
        current_question_index: 0,
        total_questions: 5,
        progress_percentage: 0.0,
        is_complete: false,
        should_ask_followup: false,
    };

    let json = serde_json::to_string(&ServerEvent::Started(response.clone())).unwrap();
    assert!(json.contains("\"event\":\"voiceInterview:started\""));

    let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, ServerEvent::Started(response));
}

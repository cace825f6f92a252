use opencode_api::SseFrameParser;
use session_state::ServerEvent;

#[test]
fn sse_framing_parses_multiple_event_kinds() {
    let payload = concat!(
        "data: {\"type\":\"server.connected\",\"properties\":{}}\n\n",
        "data: {\"type\":\"session.idle\",\"properties\":{\"sessionID\":\"s1\"}}\n\n",
        "data: {\"type\":\"todo.updated\",\"properties\":{\"sessionID\":\"s1\",\"todos\":[]}}\n\n",
    );

    let events = SseFrameParser::parse_frames(payload);
    assert_eq!(events.len(), 3);
    assert_eq!(events[0], ServerEvent::ServerConnected);
    assert!(matches!(events[1], ServerEvent::SessionIdle { .. }));
    assert!(matches!(events[2], ServerEvent::TodoUpdated { .. }));
}

#[test]
fn sse_parser_handles_split_frames_incrementally() {
    let mut parser = SseFrameParser::default();
    assert!(parser
        .feed(b"data: {\"type\":\"session.idle\",\"properties\":{\"sessionID\"")
        .is_empty());
    assert!(!parser.is_empty_buffer());

    let events = parser.feed(b":\"s1\"}}\n\n");
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ServerEvent::SessionIdle { .. }));
    assert!(parser.is_empty_buffer());
}

#[test]
fn sse_parser_ignores_unknown_and_malformed_frames() {
    let payload = concat!(
        "data: {\"type\":\"installation.updated\",\"properties\":{\"version\":\"1\"}}\n\n",
        "data: {broken-json\n\n",
        "data: {\"type\":\"file.edited\",\"properties\":{\"file\":\"src/main.rs\"}}\n\n",
    );

    let events = SseFrameParser::parse_frames(payload);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ServerEvent::FileEdited { .. }));
}

#[test]
fn sse_parser_joins_multi_line_data_frames() {
    // A frame may split its payload over several data: lines; they join
    // with newlines, which JSON tolerates between tokens.
    let payload = concat!(
        "data: {\"type\":\"session.idle\",\n",
        "data: \"properties\":{\"sessionID\":\"s1\"}}\n",
        "\n",
    );

    let events = SseFrameParser::parse_frames(payload);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ServerEvent::SessionIdle { .. }));
}

#[test]
fn sse_parser_skips_comment_and_empty_frames() {
    let payload = concat!(
        ": keepalive\n\n",
        "data: \n\n",
        "data: {\"type\":\"server.connected\",\"properties\":{}}\n\n",
    );

    let events = SseFrameParser::parse_frames(payload);
    assert_eq!(events, vec![ServerEvent::ServerConnected]);
}

#[test]
fn streaming_delta_frames_decode_in_order() {
    let payload = concat!(
        "data: {\"type\":\"message.part.updated\",\"properties\":{\"part\":{\"id\":\"p1\",\"sessionID\":\"s1\",\"messageID\":\"m1\",\"type\":\"text\",\"text\":\"A\"},\"delta\":\"A\"}}\n\n",
        "data: {\"type\":\"message.part.updated\",\"properties\":{\"part\":{\"id\":\"p1\",\"sessionID\":\"s1\",\"messageID\":\"m1\",\"type\":\"text\",\"text\":\"AB\"},\"delta\":\"B\"}}\n\n",
    );

    let events = SseFrameParser::parse_frames(payload);
    assert_eq!(events.len(), 2);

    let deltas: Vec<_> = events
        .iter()
        .map(|event| match event {
            ServerEvent::MessagePartUpdated { delta, .. } => delta.as_deref().unwrap_or(""),
            other => panic!("unexpected event: {other:?}"),
        })
        .collect();
    assert_eq!(deltas, vec!["A", "B"]);
}

#[test]
fn non_ascii_delta_split_mid_character_is_not_corrupted() {
    let frame = "data: {\"type\":\"message.part.updated\",\"properties\":{\"part\":{\"id\":\"p1\",\"sessionID\":\"s1\",\"messageID\":\"m1\",\"type\":\"text\",\"text\":\"héllo\"},\"delta\":\"héllo\"}}\n\n";
    let bytes = frame.as_bytes();
    // Cut between the two bytes of the first 'é'.
    let mid_char = frame.find('é').unwrap() + 1;

    let mut parser = SseFrameParser::default();
    assert!(parser.feed(&bytes[..mid_char]).is_empty());
    let events = parser.feed(&bytes[mid_char..]);

    assert_eq!(events.len(), 1);
    match &events[0] {
        ServerEvent::MessagePartUpdated { delta, .. } => {
            assert_eq!(delta.as_deref(), Some("héllo"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn byte_at_a_time_delivery_reassembles_multibyte_payloads() {
    let frame = "data: {\"type\":\"file.edited\",\"properties\":{\"file\":\"日本語.rs\"}}\n\n";

    let mut parser = SseFrameParser::default();
    let mut events = Vec::new();
    for byte in frame.as_bytes() {
        events.extend(parser.feed(std::slice::from_ref(byte)));
    }

    assert_eq!(
        events,
        vec![ServerEvent::FileEdited {
            file: "日本語.rs".to_owned()
        }]
    );
    assert!(parser.is_empty_buffer());
}

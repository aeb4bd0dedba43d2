use askstream::api::stream::ChatStreamParser;
use askstream::types::{Increment, TokenUsage};
use askstream::StreamError;

#[test]
fn test_fragmented_events() {
    let mut parser = ChatStreamParser::new();

    let chunk1 = b"data: {\"choices\":[{\"index\":0,\"delta\":{\"con";
    let events1 = parser.process(chunk1).expect("first chunk parse");
    assert_eq!(events1.len(), 0);

    let chunk2 = b"tent\":\"Hi\"},\"finish_reason\":null}]}\n\n";
    let events2 = parser.process(chunk2).expect("second chunk parse");
    assert_eq!(events2, vec![Increment::text("Hi")]);
}

#[test]
fn test_parse_error_handling() {
    let mut parser = ChatStreamParser::new();

    let chunk = b"data: {invalid json}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n";
    let events = parser
        .process(chunk)
        .expect("error handling should not fail parser");
    assert_eq!(events, vec![Increment::text("ok")]);
}

#[test]
fn test_done_sentinel_marks_parser_finished() {
    let mut parser = ChatStreamParser::new();

    let events = parser.process(b"data: [DONE]\n\n").expect("done sentinel");
    assert!(events.is_empty());
    assert!(parser.is_finished());
}

#[test]
fn test_usage_frame_carries_token_counts() {
    let mut parser = ChatStreamParser::new();

    let chunk = br#"data: {"id":"chatcmpl-1","object":"chat.completion.chunk","choices":[],"usage":{"prompt_tokens":9,"completion_tokens":21,"total_tokens":30}}

"#;
    let events = parser.process(chunk).expect("usage frame should parse");
    assert_eq!(
        events,
        vec![Increment {
            delta: None,
            usage: Some(TokenUsage {
                prompt_tokens: 9,
                completion_tokens: 21,
                total_tokens: 30,
            }),
        }]
    );
}

#[test]
fn test_in_band_error_payload_fails_stream() {
    let mut parser = ChatStreamParser::new();

    let chunk = br#"data: {"error":{"message":"Insufficient Balance","type":"unknown_error"}}

"#;
    match parser.process(chunk) {
        Err(StreamError::UpstreamRead(message)) => assert_eq!(message, "Insufficient Balance"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_multiple_frames_in_one_chunk_keep_order() {
    let mut parser = ChatStreamParser::new();

    let chunk = br#"data: {"choices":[{"delta":{"content":"Hel"}}]}

data: {"choices":[{"delta":{"content":"lo "}}]}

data: {"choices":[{"delta":{"content":"world"}}]}

"#;
    let texts: Vec<String> = parser
        .process(chunk)
        .expect("three frames")
        .into_iter()
        .filter_map(|increment| increment.delta)
        .collect();
    assert_eq!(texts, vec!["Hel", "lo ", "world"]);
}

#[test]
fn test_finish_parses_unterminated_trailing_frame() {
    let mut parser = ChatStreamParser::new();

    let events = parser
        .process(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
        .expect("partial frame buffers");
    assert!(events.is_empty());
    assert_eq!(
        parser.finish().expect("trailing frame"),
        vec![Increment::text("tail")]
    );
    assert!(parser.finish().expect("nothing left").is_empty());
}

#[test]
fn test_multibyte_char_split_across_chunks() {
    let mut parser = ChatStreamParser::new();

    let frame = "data: {\"choices\":[{\"delta\":{\"content\":\"日本\"}}]}\n\n".as_bytes();
    let split = frame
        .iter()
        .position(|byte| *byte >= 0x80)
        .expect("frame has a multi-byte char")
        + 1;

    let first = parser.process(&frame[..split]).expect("first half");
    assert!(first.is_empty());
    let second = parser.process(&frame[split..]).expect("second half");
    assert_eq!(second, vec![Increment::text("日本")]);
}

#[test]
fn test_four_byte_char_fed_one_byte_at_a_time() {
    let mut parser = ChatStreamParser::new();

    let frame = "data: {\"choices\":[{\"delta\":{\"content\":\"🤖ok\"}}]}\n\n".as_bytes();
    let mut events = Vec::new();
    for byte in frame {
        events.extend(parser.process(std::slice::from_ref(byte)).expect("byte"));
    }
    assert_eq!(events, vec![Increment::text("🤖ok")]);
}

#[test]
fn test_frames_after_done_are_dropped() {
    let mut parser = ChatStreamParser::new();

    let chunk = br#"data: {"choices":[{"delta":{"content":"kept"}}]}

data: [DONE]

data: {"choices":[{"delta":{"content":"late"}}]}

"#;
    let events = parser.process(chunk).expect("done chunk");
    assert_eq!(events, vec![Increment::text("kept")]);
    assert!(parser.is_finished());

    let later = parser
        .process(b"data: {\"choices\":[{\"delta\":{\"content\":\"later\"}}]}\n\n")
        .expect("after done");
    assert!(later.is_empty());
}

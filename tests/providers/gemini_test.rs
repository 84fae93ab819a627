//! Wire-shape tests for the Gemini provider, plus an end-to-end call
//! against a scripted local server.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use colloquy::providers::gemini::{
    GeminiCandidate, GeminiCompletion, GeminiContent, GeminiInlineData, GeminiPart,
    GenerateContentRequest, GenerateContentResponse,
};
use colloquy::providers::{Attachment, ChatMessage, CompletionError, CompletionService};

// ---------------------------------------------------------------------------
// Request serialization
// ---------------------------------------------------------------------------

#[test]
fn request_serializes_roles_and_system_instruction() {
    let request = GenerateContentRequest {
        contents: vec![
            GeminiContent {
                role: Some("user".to_owned()),
                parts: vec![GeminiPart::Text {
                    text: "hi".to_owned(),
                }],
            },
            GeminiContent {
                role: Some("model".to_owned()),
                parts: vec![GeminiPart::Text {
                    text: "hello".to_owned(),
                }],
            },
        ],
        system_instruction: Some(GeminiContent {
            role: None,
            parts: vec![GeminiPart::Text {
                text: "be brief".to_owned(),
            }],
        }),
    };

    let json = serde_json::to_value(&request).expect("request serializes");
    assert_eq!(json["contents"][0]["role"], "user");
    assert_eq!(json["contents"][1]["role"], "model");
    assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
    // System instructions carry no role key at all.
    assert!(json["systemInstruction"].get("role").is_none());
}

#[test]
fn request_serializes_inline_data_in_camel_case() {
    let request = GenerateContentRequest {
        contents: vec![GeminiContent {
            role: Some("user".to_owned()),
            parts: vec![
                GeminiPart::Text {
                    text: "react to this".to_owned(),
                },
                GeminiPart::InlineData {
                    inline_data: GeminiInlineData {
                        mime_type: "image/png".to_owned(),
                        data: "aGVsbG8=".to_owned(),
                    },
                },
            ],
        }],
        system_instruction: None,
    };

    let json = serde_json::to_value(&request).expect("request serializes");
    let part = &json["contents"][0]["parts"][1];
    assert_eq!(part["inlineData"]["mimeType"], "image/png");
    assert_eq!(part["inlineData"]["data"], "aGVsbG8=");
    assert!(json.get("systemInstruction").is_none());
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

#[test]
fn response_text_joins_candidate_parts() {
    let body = r#"{
        "candidates": [
            {"content": {"role": "model", "parts": [{"text": "first "}, {"text": "second"}]}}
        ]
    }"#;
    let response: GenerateContentResponse =
        serde_json::from_str(body).expect("response parses");
    assert_eq!(response.into_text().expect("has text"), "first second");
}

#[test]
fn response_without_candidates_is_a_parse_error() {
    let response: GenerateContentResponse =
        serde_json::from_str("{}").expect("empty response parses");
    assert!(matches!(
        response.into_text(),
        Err(CompletionError::Parse(_))
    ));
}

#[test]
fn response_candidate_fields_are_reachable() {
    let body = r#"{"candidates": [{"content": null}]}"#;
    let response: GenerateContentResponse =
        serde_json::from_str(body).expect("response parses");
    let candidate: &GeminiCandidate = &response.candidates[0];
    assert!(candidate.content.is_none());
}

// ---------------------------------------------------------------------------
// End-to-end against a scripted server
// ---------------------------------------------------------------------------

async fn serve_json_once(body: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr");

    let body_owned = body.to_owned();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut read_buf = [0_u8; 8192];
            let _ = socket.read(&mut read_buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body_owned}",
                body_owned.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn chat_round_trips_against_a_scripted_server() {
    let base = serve_json_once(
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"in character"}]}}]}"#,
    )
    .await;

    let provider = GeminiCompletion::new(reqwest::Client::new(), "test-key", "gemini-2.5-flash")
        .with_base_url(base);
    let history = vec![ChatMessage::user("earlier"), ChatMessage::model("reply")];

    let text = provider
        .chat("briefing", &history, "new message")
        .await
        .expect("chat should succeed");
    assert_eq!(text, "in character");
}

#[tokio::test]
async fn generate_round_trips_with_stimulus() {
    let base = serve_json_once(
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"reaction"}]}}]}"#,
    )
    .await;

    let provider = GeminiCompletion::new(reqwest::Client::new(), "test-key", "gemini-2.5-flash")
        .with_base_url(base);
    let stimulus = Attachment {
        data: "aGVsbG8=".to_owned(),
        mime_type: "image/png".to_owned(),
    };

    let text = provider
        .generate("one-shot prompt", Some(&stimulus))
        .await
        .expect("generate should succeed");
    assert_eq!(text, "reaction");
}

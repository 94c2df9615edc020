use serde_json::{Value, json};

use crate::error::GatewayError;
use crate::provider::AdapterRequest;
use crate::types::Role;

/// 组装 Messages API 请求体
///
/// system 消息不进入 messages 数组 而是提升为顶层 system 字段
pub fn build_anthropic_body(request: &AdapterRequest, stream: bool) -> Result<Value, GatewayError> {
    let mut system: Option<String> = None;
    let mut messages: Vec<Value> = Vec::new();

    for message in &request.messages {
        match message.role {
            Role::System => {
                // 多条 system 拼接 以换行分隔
                match system.as_mut() {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(&message.content);
                    }
                    None => system = Some(message.content.clone()),
                }
            }
            Role::User | Role::Assistant => {
                messages.push(json!({
                    "role": message.role.as_str(),
                    "content": message.content,
                }));
            }
        }
    }

    if messages.is_empty() {
        return Err(GatewayError::Validation {
            message: "messages must contain at least one user turn".to_string(),
        });
    }

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "max_tokens": request.max_output_tokens,
        "temperature": request.sampling.temperature,
        "top_p": request.sampling.top_p,
    });

    if let Some(system) = system {
        body["system"] = json!(system);
    }
    if stream {
        body["stream"] = json!(true);
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, SamplingParams};

    fn request() -> AdapterRequest {
        AdapterRequest {
            model: "claude-sonnet-4-20250514".to_string(),
            messages: vec![
                ChatMessage::system("be terse"),
                ChatMessage::user("hello"),
            ],
            sampling: SamplingParams::default(),
            max_output_tokens: 512,
            api_key: "key".to_string(),
            timeout: None,
        }
    }

    #[test]
    fn system_message_lifted_to_top_level() {
        let body = build_anthropic_body(&request(), false).expect("body");
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 512);
    }

    #[test]
    fn stream_flag_set_only_when_streaming() {
        let plain = build_anthropic_body(&request(), false).expect("body");
        assert!(plain.get("stream").is_none());
        let streaming = build_anthropic_body(&request(), true).expect("body");
        assert_eq!(streaming["stream"], true);
    }

    #[test]
    fn system_only_conversation_rejected() {
        let mut req = request();
        req.messages = vec![ChatMessage::system("only system")];
        assert!(matches!(
            build_anthropic_body(&req, false),
            Err(GatewayError::Validation { .. })
        ));
    }
}

use serde_json::{Value, json};

use crate::error::GatewayError;
use crate::provider::AdapterRequest;
use crate::types::Role;

/// 组装 generateContent 请求体
///
/// 该 API 只认 user / model 两种角色 system 消息折叠进首个 user 轮
/// assistant 映射为 model
pub fn build_gemini_body(request: &AdapterRequest) -> Result<Value, GatewayError> {
    let mut system_prefix = String::new();
    let mut contents: Vec<Value> = Vec::new();

    for message in &request.messages {
        match message.role {
            Role::System => {
                if !system_prefix.is_empty() {
                    system_prefix.push('\n');
                }
                system_prefix.push_str(&message.content);
            }
            Role::User => {
                let text = if system_prefix.is_empty() {
                    message.content.clone()
                } else {
                    // 折叠一次后清空 后续 user 轮不再携带
                    let folded = format!("{system_prefix}\n\n{}", message.content);
                    system_prefix.clear();
                    folded
                };
                contents.push(json!({
                    "role": "user",
                    "parts": [{"text": text}],
                }));
            }
            Role::Assistant => {
                contents.push(json!({
                    "role": "model",
                    "parts": [{"text": message.content}],
                }));
            }
        }
    }

    if contents.is_empty() {
        return Err(GatewayError::Validation {
            message: "messages must contain at least one user turn".to_string(),
        });
    }

    Ok(json!({
        "contents": contents,
        "generationConfig": {
            "temperature": request.sampling.temperature,
            "topP": request.sampling.top_p,
            "maxOutputTokens": request.max_output_tokens,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, SamplingParams};

    fn request(messages: Vec<ChatMessage>) -> AdapterRequest {
        AdapterRequest {
            model: "gemini-2.0-flash".to_string(),
            messages,
            sampling: SamplingParams::default(),
            max_output_tokens: 1024,
            api_key: "key".to_string(),
            timeout: None,
        }
    }

    #[test]
    fn system_folds_into_first_user_turn_only() {
        let body = build_gemini_body(&request(vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
        ]))
        .expect("body");

        let contents = body["contents"].as_array().expect("contents");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["parts"][0]["text"], "be terse\n\nfirst");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "second");
    }

    #[test]
    fn generation_config_mirrors_sampling() {
        let body = build_gemini_body(&request(vec![ChatMessage::user("hi")])).expect("body");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(body["generationConfig"]["topP"], 1.0);
    }

    #[test]
    fn system_only_conversation_rejected() {
        let result = build_gemini_body(&request(vec![ChatMessage::system("only")]));
        assert!(matches!(result, Err(GatewayError::Validation { .. })));
    }
}

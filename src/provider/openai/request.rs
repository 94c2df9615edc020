use serde_json::{Value, json};

use crate::error::GatewayError;
use crate::provider::AdapterRequest;

/// 组装 Chat Completions 请求体
///
/// 流式请求额外打开 stream_options.include_usage 以便末 chunk 携带用量
pub fn build_openai_body(request: &AdapterRequest, stream: bool) -> Result<Value, GatewayError> {
    if request.messages.is_empty() {
        return Err(GatewayError::Validation {
            message: "messages must not be empty".to_string(),
        });
    }

    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|message| {
            json!({
                "role": message.role.as_str(),
                "content": message.content,
            })
        })
        .collect();

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "temperature": request.sampling.temperature,
        "top_p": request.sampling.top_p,
        "max_completion_tokens": request.max_output_tokens,
    });

    if stream {
        body["stream"] = json!(true);
        body["stream_options"] = json!({ "include_usage": true });
    }

    Ok(body)
}

use serde_json::{Map, Value};

use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.model", "model")?;
        validate_optional_string_field(llm, "llm.api_key", "api_key")?;
        validate_f64_field(llm, "llm.plan_temperature", "plan_temperature", 0.0, 2.0)?;
        validate_f64_field(llm, "llm.answer_temperature", "answer_temperature", 0.0, 2.0)?;
        validate_f64_field(llm, "llm.chat_temperature", "chat_temperature", 0.0, 2.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 128_000)?;
        validate_u64_field(llm, "llm.answer_max_tokens", "answer_max_tokens", 1, 128_000)?;
        validate_u64_field(llm, "llm.topic_max_tokens", "topic_max_tokens", 1, 4_096)?;
        validate_u64_field(llm, "llm.timeout_secs", "timeout_secs", 1, 3_600)?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_u64_field(embedding, "embedding.dimension", "dimension", 1, 16_384)?;
        validate_u64_field(embedding, "embedding.max_chars", "max_chars", 100, 1_000_000)?;
        validate_u64_field(embedding, "embedding.batch_size", "batch_size", 1, 2_048)?;
        validate_u64_field(embedding, "embedding.timeout_secs", "timeout_secs", 1, 3_600)?;
    }

    if let Some(chunking) = expect_optional_object(root, "chunking")? {
        validate_u64_field(chunking, "chunking.target_size", "target_size", 50, 100_000)?;
        validate_u64_field(chunking, "chunking.overlap", "overlap", 0, 50_000)?;
        validate_u64_field(
            chunking,
            "chunking.course_file_size",
            "course_file_size",
            50,
            100_000,
        )?;
        validate_u64_field(
            chunking,
            "chunking.sentence_group_cap",
            "sentence_group_cap",
            20,
            100_000,
        )?;
        validate_u64_field(chunking, "chunking.min_chunk_chars", "min_chunk_chars", 0, 10_000)?;
        validate_u64_field(
            chunking,
            "chunking.min_paragraph_chars",
            "min_paragraph_chars",
            0,
            10_000,
        )?;
        validate_u64_field(
            chunking,
            "chunking.min_sentence_chars",
            "min_sentence_chars",
            0,
            10_000,
        )?;
        validate_overlap_below_target(chunking)?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 1_000)?;
        validate_f64_field(
            retrieval,
            "retrieval.similarity_threshold",
            "similarity_threshold",
            -1.0,
            1.0,
        )?;
        validate_u64_field(retrieval, "retrieval.timeout_secs", "timeout_secs", 1, 3_600)?;
        validate_u64_field(retrieval, "retrieval.recent_plans", "recent_plans", 0, 100)?;
    }

    if let Some(chat) = expect_optional_object(root, "chat")? {
        validate_u64_field(chat, "chat.max_requests", "max_requests", 1, 1_000_000)?;
        validate_u64_field(chat, "chat.window_minutes", "window_minutes", 1, 10_080)?;
        validate_bool_field(chat, "chat.use_rag", "use_rag")?;
    }

    Ok(())
}

fn validate_overlap_below_target(chunking: &Map<String, Value>) -> Result<(), ApiError> {
    let target = chunking.get("target_size").and_then(Value::as_u64);
    let overlap = chunking.get("overlap").and_then(Value::as_u64);
    if let (Some(target), Some(overlap)) = (target, overlap) {
        if overlap >= target {
            return Err(ApiError::BadRequest(
                "Invalid config at 'chunking.overlap': must be smaller than chunking.target_size"
                    .to_string(),
            ));
        }
    }
    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    match section.get(key) {
        None | Some(Value::Bool(_)) => Ok(()),
        Some(_) => Err(config_type_error(path, "boolean")),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "non-negative integer"));
    };
    if !(min..=max).contains(&number) {
        return Err(out_of_range(path, min, max));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if !(min..=max).contains(&number) {
        return Err(out_of_range(path, min, max));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    match section.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(_) => Err(config_type_error(path, "string")),
    }
}

fn out_of_range<T: std::fmt::Display>(path: &str, min: T, max: T) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': must be between {} and {}",
        path, min, max
    ))
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_is_valid() {
        assert!(validate_config(&json!({})).is_ok());
    }

    #[test]
    fn rejects_non_object_root() {
        let err = validate_config(&json!(["llm"])).unwrap_err();
        assert!(err.to_string().contains("'root'"));
    }

    #[test]
    fn rejects_out_of_range_top_k() {
        let err = validate_config(&json!({ "retrieval": { "top_k": 0 } })).unwrap_err();
        assert!(err.to_string().contains("retrieval.top_k"));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_target() {
        let err = validate_config(&json!({
            "chunking": { "target_size": 200, "overlap": 200 }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("chunking.overlap"));
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(validate_config(&json!({ "chat": { "use_rag": "yes" } })).is_err());
        assert!(validate_config(&json!({ "llm": { "model": 4 } })).is_err());
        assert!(validate_config(&json!({ "embedding": "openai" })).is_err());
    }

    #[test]
    fn accepts_a_full_config() {
        let config = json!({
            "llm": {
                "base_url": "https://api.openai.com/v1",
                "model": "gpt-4o-mini",
                "plan_temperature": 0.7,
                "max_tokens": 2000
            },
            "embedding": { "model": "text-embedding-3-small", "dimension": 1536 },
            "chunking": { "target_size": 1000, "overlap": 200 },
            "retrieval": { "top_k": 15, "similarity_threshold": 0.2 },
            "chat": { "max_requests": 60, "window_minutes": 60, "use_rag": true }
        });
        assert!(validate_config(&config).is_ok());
    }
}

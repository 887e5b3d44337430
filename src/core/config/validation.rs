use serde_json::{Map, Value};

use crate::core::errors::PipelineError;

const KNOWN_PROVIDERS: [&str; 3] = ["naver", "duckduckgo", "brave"];

pub fn validate_config(config: &Value) -> Result<(), PipelineError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(cache) = expect_optional_object(root, "cache")? {
        validate_bool_field(cache, "cache.enabled", "enabled")?;
        validate_u64_field(cache, "cache.max_size", "max_size", 1, 1_000_000)?;
        validate_u64_field(cache, "cache.ttl_secs", "ttl_secs", 1, 30 * 86_400)?;
    }

    if let Some(analysis) = expect_optional_object(root, "analysis")? {
        validate_string_array_field(analysis, "analysis.recency_keywords", "recency_keywords")?;
        validate_u64_field(analysis, "analysis.max_sub_queries", "max_sub_queries", 1, 20)?;
    }

    if let Some(internal) = expect_optional_object(root, "internal_search")? {
        validate_u64_field(internal, "internal_search.top_k", "top_k", 1, 1_000)?;
        if let Some(es) = expect_optional_object(internal, "elasticsearch")? {
            validate_optional_string_field(es, "internal_search.elasticsearch.url", "url")?;
            validate_optional_string_field(es, "internal_search.elasticsearch.index", "index")?;
            validate_f64_field(es, "internal_search.elasticsearch.rrf_k", "rrf_k", 1.0, 10_000.0)?;
        }
    }

    if let Some(relevance) = expect_optional_object(root, "relevance")? {
        validate_u64_field(relevance, "relevance.top_hits", "top_hits", 1, 50)?;
        validate_u64_field(relevance, "relevance.snippet_chars", "snippet_chars", 1, 10_000)?;
    }

    if let Some(external) = expect_optional_object(root, "external_search")? {
        validate_string_array_field(external, "external_search.providers", "providers")?;
        if let Some(providers) = external.get("providers").and_then(|v| v.as_array()) {
            for (index, provider) in providers.iter().enumerate() {
                let name = provider.as_str().unwrap_or_default();
                if !KNOWN_PROVIDERS.contains(&name) {
                    return Err(PipelineError::Config(format!(
                        "Invalid config at 'external_search.providers[{}]': unknown provider '{}'",
                        index, name
                    )));
                }
            }
        }
        validate_u64_field(external, "external_search.top_k", "top_k", 1, 100)?;
        validate_u64_field(external, "external_search.max_workers", "max_workers", 1, 64)?;
    }

    if let Some(context) = expect_optional_object(root, "context")? {
        validate_u64_field(context, "context.max_sources", "max_sources", 1, 100)?;
        validate_f64_field(
            context,
            "context.external_source_score",
            "external_source_score",
            0.0,
            1.0,
        )?;
    }

    if let Some(generation) = expect_optional_object(root, "generation")? {
        validate_string_array_field(generation, "generation.citation_markers", "citation_markers")?;
        validate_bool_field(generation, "generation.verify_answer", "verify_answer")?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.model", "model")?;
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
    }

    if let Some(timeouts) = expect_optional_object(root, "timeouts")? {
        validate_u64_field(timeouts, "timeouts.llm_secs", "llm_secs", 1, 3_600)?;
        validate_u64_field(timeouts, "timeouts.search_secs", "search_secs", 1, 3_600)?;
        validate_u64_field(
            timeouts,
            "timeouts.internal_search_secs",
            "internal_search_secs",
            1,
            3_600,
        )?;
    }

    if let Some(logging) = expect_optional_object(root, "logging")? {
        validate_optional_string_field(logging, "logging.level", "level")?;
        validate_bool_field(logging, "logging.file", "file")?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, PipelineError> {
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
) -> Result<(), PipelineError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), PipelineError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(PipelineError::Config(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), PipelineError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(PipelineError::Config(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), PipelineError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() || value.as_str().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "string"))
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), PipelineError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(PipelineError::Config(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> PipelineError {
    PipelineError::Config(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_empty_and_partial_configs() {
        assert!(validate_config(&json!({})).is_ok());
        assert!(validate_config(&json!({
            "cache": { "enabled": true, "ttl_secs": 60 },
            "external_search": { "providers": ["brave", "naver"], "top_k": 5 },
            "context": { "external_source_score": 0.85 },
            "internal_search": { "elasticsearch": null }
        }))
        .is_ok());
    }

    #[test]
    fn rejects_wrong_types_and_ranges() {
        let err = validate_config(&json!({ "cache": { "enabled": "yes" } })).unwrap_err();
        assert!(err.to_string().contains("cache.enabled"));

        let err = validate_config(&json!({ "cache": { "max_size": 0 } })).unwrap_err();
        assert!(err.to_string().contains("between"));

        let err =
            validate_config(&json!({ "context": { "external_source_score": 1.5 } })).unwrap_err();
        assert!(err.to_string().contains("context.external_source_score"));

        assert!(validate_config(&json!([1, 2])).is_err());
    }

    #[test]
    fn rejects_unknown_provider_names() {
        let err = validate_config(&json!({
            "external_search": { "providers": ["naver", "altavista"] }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("altavista"));
    }
}

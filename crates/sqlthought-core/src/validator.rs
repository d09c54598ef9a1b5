//! Query engine boundary

use async_trait::async_trait;
use sqlthought_model::ValidationResult;

/// Zero-execution check of a SQL string against the target engine.
///
/// Implementations never fail: engine rejections and transport failures are both
/// reported through [`ValidationResult`] with `valid = false`. No result caching;
/// every call goes to the engine.
#[async_trait]
pub trait SqlValidator: Send + Sync {
    async fn dry_run(&self, sql: &str) -> ValidationResult;
}

/// Enforce "errors empty iff valid" on whatever a validator returned
pub(crate) fn normalize(mut result: ValidationResult) -> ValidationResult {
    if result.valid {
        result.errors.clear();
        result.failure = None;
    } else if result.errors.is_empty() {
        let message = if result.message.trim().is_empty() {
            "Query validation failed".to_string()
        } else {
            result.message.clone()
        };
        result.errors.push(message);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_invalid_without_errors() {
        let result = normalize(ValidationResult {
            valid: false,
            message: "Syntax error at [1:8]".to_string(),
            errors: vec![],
            failure: None,
        });
        assert_eq!(result.errors, vec!["Syntax error at [1:8]".to_string()]);
    }

    #[test]
    fn test_normalize_valid_clears_errors() {
        let mut result = ValidationResult::valid();
        result.errors.push("stale".to_string());
        assert!(normalize(result).errors.is_empty());
    }
}

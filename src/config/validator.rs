use crate::config::Config;
use crate::embedding::FastEmbedProvider;
use crate::error::{CheerError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem found
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_recommendation(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CheerError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        let model = &config.embedding.model;
        if FastEmbedProvider::model_dimension(model).is_none() {
            errors.push(ValidationError::new(
                "embedding.model",
                format!(
                    "Model must be one of {:?}, got '{}'",
                    FastEmbedProvider::supported_models(),
                    model
                ),
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        let file = &config.indexing.index_file;
        if file.is_empty() || file.contains('/') || file.contains('\\') {
            errors.push(ValidationError::new(
                "indexing.index_file",
                format!("Index file must be a plain file name, got '{}'", file),
            ));
        }
    }

    fn validate_recommendation(config: &Config, errors: &mut Vec<ValidationError>) {
        let rec = &config.recommendation;

        if rec.default_k == 0 {
            errors.push(ValidationError::new(
                "recommendation.default_k",
                "Default result size must be greater than 0",
            ));
        }

        if rec.history_window == 0 {
            errors.push(ValidationError::new(
                "recommendation.history_window",
                "History window must be greater than 0",
            ));
        }

        if rec.overfetch_factor == 0 {
            errors.push(ValidationError::new(
                "recommendation.overfetch_factor",
                "Overfetch factor must be at least 1",
            ));
        }

        if rec.gatekeeper_categories.iter().any(|c| c.trim().is_empty()) {
            errors.push(ValidationError::new(
                "recommendation.gatekeeper_categories",
                "Gatekeeper category names cannot be blank",
            ));
        }
    }
}

//! Validation of implementation-specific TOML tables.
//!
//! Pluggable implementations (storage backends, for example) receive their
//! own `toml::Value` table from the configuration file. Each exposes a
//! [`ConfigSchema`] so the table can be checked before the implementation is
//! built.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// Custom check run after the type check succeeds.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named string field in a [`Schema`].
pub struct Field {
	pub name: String,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			validator: None,
		}
	}

	/// Attaches a custom validator that returns an error message on failure.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		if !value.is_str() {
			return Err(ValidationError::TypeMismatch {
				field: self.name.clone(),
				expected: "string".to_string(),
				actual: value.type_str().to_string(),
			});
		}
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of a configuration table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates `config`, which must be a table.
	///
	/// Required fields must be present; optional fields are only checked when
	/// present. Unknown keys are ignored.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

/// Validator for an implementation's configuration table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(s: &str) -> toml::Value {
		toml::from_str(s).unwrap()
	}

	#[test]
	fn test_required_and_optional_fields() {
		let schema = Schema::new(
			vec![Field::new("storage_path")],
			vec![Field::new("label")],
		);

		assert!(schema.validate(&parse(r#"storage_path = "./data""#)).is_ok());
		assert!(matches!(
			schema.validate(&parse(r#"label = "x""#)),
			Err(ValidationError::MissingField(f)) if f == "storage_path"
		));
		assert!(matches!(
			schema.validate(&parse("storage_path = 1")),
			Err(ValidationError::TypeMismatch { .. })
		));
		assert!(matches!(
			schema.validate(&parse("storage_path = \"x\"\nlabel = 5")),
			Err(ValidationError::TypeMismatch { field, .. }) if field == "label"
		));
	}

	#[test]
	fn test_custom_validator() {
		let schema = Schema::new(
			vec![
				Field::new("path").with_validator(|v| {
					match v.as_str() {
						Some("") => Err("must not be empty".to_string()),
						_ => Ok(()),
					}
				}),
			],
			vec![],
		);

		let err = schema.validate(&parse(r#"path = """#)).unwrap_err();
		assert!(err.to_string().contains("must not be empty"));
	}
}

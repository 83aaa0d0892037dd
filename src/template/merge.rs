use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MergeError {
    #[error("JSON payload must be an object.")]
    InvalidPayloadShape,
    #[error("Template is missing fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("failed to set field '{name}': {reason}")]
    Field { name: String, reason: String },
}

/// Text form of a payload value as it appears in a merged document.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn placeholder(key: &str) -> String {
    format!("{{{{{}}}}}", key)
}

/// Replaces every `{{key}}` with the payload value. Unknown placeholders stay,
/// unknown keys are ignored, and a non-object payload leaves the text as is.
pub fn merge_text(template: &str, payload: &Value) -> String {
    let Some(fields) = payload.as_object() else {
        return template.to_string();
    };

    fields.iter().fold(template.to_string(), |output, (key, value)| {
        output.replace(&placeholder(key), &stringify(value))
    })
}

/// Like [`merge_text`], but payload keys without a placeholder are an error.
pub fn merge_text_strict(template: &str, payload: &Value) -> Result<String, MergeError> {
    let Some(fields) = payload.as_object() else {
        return Err(MergeError::InvalidPayloadShape);
    };

    let missing: Vec<String> = fields
        .keys()
        .filter(|key| !template.contains(&placeholder(key)))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(MergeError::MissingFields(missing));
    }

    Ok(merge_text(template, payload))
}

/// A set of named, writable form fields.
pub trait FieldSet {
    /// Sets the field's value. `Ok(false)` when no field has that name.
    fn set_field(&mut self, name: &str, value: &str) -> Result<bool, MergeError>;

    /// Asks viewers to regenerate field appearances.
    fn mark_needs_appearances(&mut self) -> Result<(), MergeError>;
}

/// Writes each payload entry into the same-named field. Every unknown key is
/// collected and reported together.
pub fn merge_fields<F: FieldSet + ?Sized>(form: &mut F, payload: &Value) -> Result<(), MergeError> {
    let fields = payload.as_object().ok_or(MergeError::InvalidPayloadShape)?;

    form.mark_needs_appearances()?;

    let mut missing = Vec::new();
    for (key, value) in fields {
        if !form.set_field(key, &stringify(value))? {
            missing.push(key.clone());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(MergeError::MissingFields(missing))
    }
}

//! User-initiated submission requests and their pre-network validation.

use shared::{error::GateError, protocol::SubmissionPayload};

/// Pure predicate over a payload, run before any network activity. A failing
/// validator short-circuits the whole submission.
pub trait PayloadValidator: Send + Sync {
    fn validate(&self, payload: &SubmissionPayload) -> Result<(), GateError>;
}

/// Rejects payloads that carry nothing to submit.
pub struct NonEmptyPayload;

impl PayloadValidator for NonEmptyPayload {
    fn validate(&self, payload: &SubmissionPayload) -> Result<(), GateError> {
        let empty = match payload {
            SubmissionPayload::Multipart {
                fields,
                attachments,
            } => fields.is_empty() && attachments.is_empty(),
            SubmissionPayload::Json(value) => value.is_null(),
        };
        if empty {
            return Err(GateError::Validation("nothing to submit".into()));
        }
        Ok(())
    }
}

/// Requires a non-empty text field (multipart) or a non-empty top-level
/// string key (JSON body).
pub struct RequiredField {
    pub name: String,
}

impl RequiredField {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl PayloadValidator for RequiredField {
    fn validate(&self, payload: &SubmissionPayload) -> Result<(), GateError> {
        let present = match payload {
            SubmissionPayload::Multipart { fields, .. } => fields
                .iter()
                .any(|field| field.name == self.name && !field.value.trim().is_empty()),
            SubmissionPayload::Json(value) => value
                .get(&self.name)
                .is_some_and(|v| !v.is_null() && v.as_str().map_or(true, |s| !s.trim().is_empty())),
        };
        if present {
            Ok(())
        } else {
            Err(GateError::Validation(format!(
                "required field '{}' is missing or empty",
                self.name
            )))
        }
    }
}

/// Requires a non-empty binary attachment under the given multipart field.
pub struct RequiredAttachment {
    pub field_name: String,
}

impl RequiredAttachment {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
        }
    }
}

impl PayloadValidator for RequiredAttachment {
    fn validate(&self, payload: &SubmissionPayload) -> Result<(), GateError> {
        let present = match payload {
            SubmissionPayload::Multipart { attachments, .. } => attachments
                .iter()
                .any(|a| a.field_name == self.field_name && !a.bytes.is_empty()),
            SubmissionPayload::Json(_) => false,
        };
        if present {
            Ok(())
        } else {
            Err(GateError::Validation(format!(
                "attachment '{}' is missing or empty",
                self.field_name
            )))
        }
    }
}

/// One user-initiated operation: an opaque payload plus the validators that
/// must pass before the credit check is even attempted. Created fresh on each
/// click of the primary action.
pub struct SubmissionRequest {
    pub payload: SubmissionPayload,
    validators: Vec<Box<dyn PayloadValidator>>,
}

impl SubmissionRequest {
    pub fn new(payload: SubmissionPayload) -> Self {
        Self {
            payload,
            validators: Vec::new(),
        }
    }

    pub fn with_validator(mut self, validator: impl PayloadValidator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Runs every validator in order; the first failure wins.
    pub fn validate(&self) -> Result<(), GateError> {
        for validator in &self.validators {
            validator.validate(&self.payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{Attachment, FormField};

    fn multipart(fields: Vec<FormField>, attachments: Vec<Attachment>) -> SubmissionPayload {
        SubmissionPayload::Multipart {
            fields,
            attachments,
        }
    }

    #[test]
    fn empty_multipart_fails_non_empty_validator() {
        let request = SubmissionRequest::new(SubmissionPayload::empty_multipart())
            .with_validator(NonEmptyPayload);
        assert!(matches!(
            request.validate(),
            Err(GateError::Validation(_))
        ));
    }

    #[test]
    fn required_field_accepts_present_value_and_rejects_blank() {
        let payload = multipart(vec![FormField::new("prompt", "make it blue")], Vec::new());
        assert!(RequiredField::new("prompt").validate(&payload).is_ok());

        let blank = multipart(vec![FormField::new("prompt", "   ")], Vec::new());
        assert!(RequiredField::new("prompt").validate(&blank).is_err());
    }

    #[test]
    fn required_field_checks_json_top_level_keys() {
        let payload = SubmissionPayload::Json(serde_json::json!({ "prompt": "hello" }));
        assert!(RequiredField::new("prompt").validate(&payload).is_ok());
        assert!(RequiredField::new("voice").validate(&payload).is_err());
    }

    #[test]
    fn required_attachment_rejects_empty_file() {
        let payload = multipart(
            Vec::new(),
            vec![Attachment {
                field_name: "file".into(),
                filename: "clip.mp3".into(),
                mime_type: Some("audio/mpeg".into()),
                bytes: Vec::new(),
            }],
        );
        assert!(RequiredAttachment::new("file").validate(&payload).is_err());
    }

    #[test]
    fn first_failing_validator_wins() {
        let request = SubmissionRequest::new(SubmissionPayload::empty_multipart())
            .with_validator(RequiredAttachment::new("file"))
            .with_validator(RequiredField::new("prompt"));
        let err = request.validate().expect_err("must fail");
        assert!(err.to_string().contains("attachment 'file'"));
    }
}

//! Editable state for the "create backup job" form.
//!
//! The controller owns the raw text of every field and the last validation
//! errors, but nothing about the dialog around it. Callers drive it through
//! [`DynamicFormController::set_value`] and a single
//! [`DynamicFormController::submit`].

use std::collections::BTreeMap;
use std::future::{Ready, ready};

use tracing::debug;

use crate::schema::{
    FIELD_JOB_TYPE_IDENTIFIER, FIELD_NAME, FIELD_SCHEDULE, FieldErrors, FormSchema, RuleKind,
    SchemaError, ValidRecord,
};
use crate::types::{JobCreatePayload, JobType};

/// Receives the payload of every successful submit.
pub trait SubmitHandler: Send {
    fn on_submit(&mut self, payload: JobCreatePayload);
}

impl<F> SubmitHandler for F
where
    F: FnMut(JobCreatePayload) + Send,
{
    fn on_submit(&mut self, payload: JobCreatePayload) {
        self(payload);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Number,
}

/// What a renderer needs to draw one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView<'a> {
    pub name: &'a str,
    pub label: &'a str,
    pub input: InputKind,
    pub value: &'a str,
    pub error: Option<&'a str>,
    /// The error when there is one, otherwise the field description.
    pub helper_text: &'a str,
}

pub struct DynamicFormController {
    job_type: JobType,
    schema: FormSchema,
    values: BTreeMap<String, String>,
    errors: FieldErrors,
    handler: Box<dyn SubmitHandler>,
}

impl std::fmt::Debug for DynamicFormController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicFormController")
            .field("job_type", &self.job_type.identifier)
            .field("values", &self.values)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl DynamicFormController {
    pub fn new(
        job_type: JobType,
        handler: impl SubmitHandler + 'static,
    ) -> Result<Self, SchemaError> {
        let schema = FormSchema::synthesize(&job_type)?;
        let values = schema.default_values();
        Ok(Self {
            job_type,
            schema,
            values,
            errors: FieldErrors::default(),
            handler: Box::new(handler),
        })
    }

    #[must_use]
    pub fn job_type(&self) -> &JobType {
        &self.job_type
    }

    #[must_use]
    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    /// Switches the form to another job type in place. `name` and `schedule`
    /// keep their text, configuration values the new type does not declare
    /// are dropped, and the identifier is re-pinned.
    pub fn set_job_type(&mut self, job_type: JobType) -> Result<(), SchemaError> {
        if job_type == self.job_type {
            return Ok(());
        }
        let schema = FormSchema::synthesize(&job_type)?;
        let mut values = schema.default_values();
        for (field, value) in &mut values {
            if field == FIELD_JOB_TYPE_IDENTIFIER {
                continue;
            }
            if let Some(previous) = self.values.get(field) {
                value.clone_from(previous);
            }
        }

        debug!(
            from = %self.job_type.identifier,
            to = %job_type.identifier,
            "form job type changed"
        );
        self.job_type = job_type;
        self.schema = schema;
        self.values = values;
        self.errors = FieldErrors::default();
        Ok(())
    }

    /// Stores raw input for a field and clears its stale error. Returns
    /// `false` for fields the form does not have and for the pinned
    /// identifier.
    pub fn set_value(&mut self, field: &str, value: impl Into<String>) -> bool {
        if field == FIELD_JOB_TYPE_IDENTIFIER {
            return false;
        }
        let Some(slot) = self.values.get_mut(field) else {
            return false;
        };
        *slot = value.into();
        self.errors.remove(field);
        true
    }

    #[must_use]
    pub fn value(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    #[must_use]
    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    #[must_use]
    pub fn fields(&self) -> Vec<FieldView<'_>> {
        let descriptions: BTreeMap<&str, &str> = self
            .job_type
            .configuration_fields
            .iter()
            .map(|field| (field.name.as_str(), field.description.as_str()))
            .collect();

        self.schema
            .rules()
            .iter()
            .filter(|rule| rule.field != FIELD_JOB_TYPE_IDENTIFIER)
            .map(|rule| {
                let name = rule.field.as_str();
                let label = match name {
                    FIELD_SCHEDULE => "CRON Schedule",
                    FIELD_NAME => "Backup Job Name",
                    _ => name,
                };
                let error = self.errors.get(name);
                let description = descriptions.get(name).copied().unwrap_or(" ");
                FieldView {
                    name,
                    label,
                    input: if rule.kind == RuleKind::Number {
                        InputKind::Number
                    } else {
                        InputKind::Text
                    },
                    value: self.value(name).unwrap_or_default(),
                    error,
                    helper_text: error.unwrap_or(description),
                }
            })
            .collect()
    }

    /// Validates the current input before returning. On success the payload
    /// has already been handed to the submit handler and the future resolves
    /// to `true`; on failure [`Self::errors`] is populated and it resolves to
    /// `false`.
    pub fn submit(&mut self) -> Ready<bool> {
        ready(self.submit_now())
    }

    fn submit_now(&mut self) -> bool {
        match self.schema.validate(&self.values) {
            Ok(record) => {
                self.errors = FieldErrors::default();
                self.handler.on_submit(build_payload(&record));
                true
            }
            Err(errors) => {
                debug!(invalid_fields = errors.len(), "form submit rejected");
                self.errors = errors;
                false
            }
        }
    }
}

/// Splits the fixed fields out to the top level; everything else becomes
/// `configuration`.
#[must_use]
pub fn build_payload(record: &ValidRecord) -> JobCreatePayload {
    let mut payload = JobCreatePayload {
        name: String::new(),
        job_type_identifier: String::new(),
        schedule: String::new(),
        configuration: serde_json::Map::new(),
    };
    for (field, value) in record.iter() {
        let text = value.as_text().unwrap_or_default().to_string();
        match field {
            FIELD_NAME => payload.name = text,
            FIELD_JOB_TYPE_IDENTIFIER => payload.job_type_identifier = text,
            FIELD_SCHEDULE => payload.schedule = text,
            _ => {
                payload
                    .configuration
                    .insert(field.to_string(), value.to_json());
            }
        }
    }
    payload
}

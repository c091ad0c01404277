//! Submit handling for the credentials popup.
//!
//! The caller owns the event loop and hands each submit event to
//! [`LoginFormController::submit`]. Nothing else reacts to the event, and the
//! controller keeps nothing between submissions.

use std::{fmt, sync::Arc};

use secrecy::{ExposeSecret, Secret};
use shared::protocol::{SubmitCredentialsRequest, MISSING_FIELDS_MESSAGE, SUBMIT_SUCCESS_MESSAGE};
use tracing::{debug, info};

use crate::error::FormError;

/// Log target for accepted submissions.
pub const FORM_LOG_TARGET: &str = "jobtracker::form";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    Email,
    Password,
    SheetId,
}

impl FormField {
    pub const ALL: [FormField; 3] = [FormField::Email, FormField::Password, FormField::SheetId];

    /// The field's name attribute in the form markup.
    pub fn name(self) -> &'static str {
        match self {
            FormField::Email => "email",
            FormField::Password => "password",
            FormField::SheetId => "sheet-id",
        }
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Anything that can report the current contents of the three form fields.
pub trait FormView {
    fn field_value(&self, field: FormField) -> String;
}

/// Shows a message to the user. Returns only once the user has acknowledged it.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Receives one record per accepted submission.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, record: &DiagnosticRecord);
}

/// Writes accepted submissions to the `jobtracker::form` tracing target with the password redacted.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn record(&self, record: &DiagnosticRecord) {
        info!(
            target: FORM_LOG_TARGET,
            email = %record.email,
            password = "[redacted]",
            sheet_id = %record.sheet_id,
            "credentials submitted"
        );
    }
}

/// One submission's values. Only lives for the duration of a submit.
pub struct Credentials {
    pub email: String,
    pub password: Secret<String>,
    pub sheet_id: String,
}

/// What an accepted submission leaves on the diagnostic channel.
pub type DiagnosticRecord = Credentials;

impl Credentials {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        sheet_id: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: Secret::new(password.into()),
            sheet_id: sheet_id.into(),
        }
    }

    pub fn read_from(view: &dyn FormView) -> Self {
        Self::new(
            view.field_value(FormField::Email),
            view.field_value(FormField::Password),
            view.field_value(FormField::SheetId),
        )
    }

    /// Presence only. No shape checks on the email or sheet id.
    pub fn validate(&self) -> Result<(), FormError> {
        let fields: Vec<FormField> = FormField::ALL
            .into_iter()
            .filter(|field| self.value(*field).is_empty())
            .collect();
        if fields.is_empty() {
            Ok(())
        } else {
            Err(FormError::MissingField { fields })
        }
    }

    pub fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Email => &self.email,
            FormField::Password => self.password.expose_secret(),
            FormField::SheetId => &self.sheet_id,
        }
    }

    pub fn to_request(&self) -> SubmitCredentialsRequest {
        SubmitCredentialsRequest {
            email: self.email.clone(),
            password: self.password.expose_secret().clone(),
            sheet_id: self.sheet_id.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .field("sheet_id", &self.sheet_id)
            .finish()
    }
}

#[derive(Debug)]
pub enum SubmitOutcome {
    Rejected(FormError),
    Accepted(DiagnosticRecord),
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted(_))
    }
}

pub struct LoginFormController {
    notifier: Arc<dyn Notifier>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl LoginFormController {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self::with_diagnostics(notifier, Arc::new(TracingDiagnostics))
    }

    pub fn with_diagnostics(
        notifier: Arc<dyn Notifier>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            notifier,
            diagnostics,
        }
    }

    /// Handles one submit event end to end, including the blocking notification.
    pub fn submit(&self, view: &dyn FormView) -> SubmitOutcome {
        let credentials = Credentials::read_from(view);

        if let Err(err) = credentials.validate() {
            let FormError::MissingField { fields } = &err;
            debug!(?fields, "form submission rejected");
            self.notifier.notify(MISSING_FIELDS_MESSAGE);
            return SubmitOutcome::Rejected(err);
        }

        self.diagnostics.record(&credentials);
        self.notifier.notify(SUBMIT_SUCCESS_MESSAGE);
        SubmitOutcome::Accepted(credentials)
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;

pub mod error;
pub mod form;
mod tracker_client;

pub use error::{ClientError, FormError};
pub use form::{
    Credentials, DiagnosticRecord, DiagnosticSink, FormField, FormView, LoginFormController,
    Notifier, SubmitOutcome, TracingDiagnostics, FORM_LOG_TARGET,
};
pub use tracker_client::TrackerClient;

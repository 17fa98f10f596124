// Report entity model
// Suites, cases, steps and their side data, plus the XML projection rules

pub mod case;
pub mod constants;
pub mod suite;

pub use case::{
    Attachment, AttachmentPayload, AttachmentSource, CaseId, Failure, Label, TestCase, TestStep,
};
pub use constants::{ALLURE_NAMESPACE, AttachmentType, Severity, Status, label_names};
pub use suite::{Environment, TestSuite};

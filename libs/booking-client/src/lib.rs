//! Client side of the booking flow: a typed API client, the step-by-step
//! booking wizard and a guard against out-of-order slot responses.

pub mod api;
pub mod error;
pub mod session;
pub mod tracker;
pub mod wizard;

pub use api::{BookingApiClient, CancellationReceipt, NewAppointment, RescheduleRequest};
pub use error::ClientError;
pub use session::AuthSession;
pub use tracker::{RequestTicket, SlotRequestTracker};
pub use wizard::{BookingWizard, PatientDetails, WizardError, WizardStep};

pub mod appointment;
pub mod conversation;
pub mod intent;
pub mod response;
pub mod slot;

pub use appointment::{Appointment, AppointmentDetails, AppointmentStatus};
pub use conversation::{ConversationState, Stage};
pub use intent::{Intent, IntentKind, IntentParams, SlotRef};
pub use response::{Action, Response};
pub use slot::{Slot, SlotStatus, TimeRange};

pub mod delivery;
pub mod email;
pub mod invitation;
pub mod registration;
pub mod twilio;

pub use delivery::DeliveryGateway;
pub use invitation::InvitationService;
pub use registration::RegistrationService;

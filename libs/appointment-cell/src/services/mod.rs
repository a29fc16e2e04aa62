pub mod booking;
pub mod lifecycle;
pub mod schedule;
pub mod slots;

pub use booking::BookingService;
pub use schedule::ScheduleService;
pub use slots::AvailabilityService;

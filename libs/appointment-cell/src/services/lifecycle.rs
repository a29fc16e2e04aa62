use shared_models::error::AppError;

use crate::models::AppointmentStatus;

/// Valid status transitions. Completed and cancelled are terminal.
pub fn allowed(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    use AppointmentStatus::*;
    matches!(
        (from, to),
        (Reserved, Scheduled)
            | (Reserved, Confirmed)
            | (Reserved, Cancelled)
            | (Scheduled, Confirmed)
            | (Scheduled, Cancelled)
            | (Confirmed, Completed)
            | (Confirmed, Cancelled)
    )
}

pub fn ensure_transition(
    from: AppointmentStatus,
    to: AppointmentStatus,
) -> Result<(), AppError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "Cannot move appointment from {} to {}",
            from, to
        )))
    }
}

//! Appointment models

use chrono::{DateTime, Duration, Utc};

text_enum! {
    /// Kind of scheduled activity
    pub enum AppointmentKind: "appointment kind" {
        Attendance => "attendance",
        HomeVisit => "home_visit",
        GroupActivity => "group_activity",
        CaseDiscussion => "case_discussion",
        Other => "other",
    }
}

text_enum! {
    pub enum AppointmentStatus: "appointment status" {
        Scheduled => "scheduled",
        Completed => "completed",
        Missed => "missed",
        Cancelled => "cancelled",
    }
}

/// Default appointment length
pub const DEFAULT_APPOINTMENT_MINUTES: i32 = 60;

/// Accepted appointment length bounds, in minutes
pub const MIN_APPOINTMENT_MINUTES: i32 = 5;
pub const MAX_APPOINTMENT_MINUTES: i32 = 480;

impl AppointmentStatus {
    pub fn can_transition_to(&self, to: AppointmentStatus) -> bool {
        *self == AppointmentStatus::Scheduled && to != AppointmentStatus::Scheduled
    }
}

/// Validate an appointment duration
pub fn validate_duration(minutes: i32) -> Result<(), &'static str> {
    if !(MIN_APPOINTMENT_MINUTES..=MAX_APPOINTMENT_MINUTES).contains(&minutes) {
        return Err("Duration must be between 5 and 480 minutes");
    }
    Ok(())
}

/// Whether two half-open time slots `[start, start + minutes)` overlap
pub fn slots_overlap(
    a_start: DateTime<Utc>,
    a_minutes: i32,
    b_start: DateTime<Utc>,
    b_minutes: i32,
) -> bool {
    let a_end = a_start + Duration::minutes(i64::from(a_minutes));
    let b_end = b_start + Duration::minutes(i64::from(b_minutes));
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 14, h, m, 0).unwrap()
    }

    #[test]
    fn overlapping_slots() {
        assert!(slots_overlap(at(9, 0), 60, at(9, 30), 60));
        assert!(slots_overlap(at(9, 30), 60, at(9, 0), 60));
        assert!(slots_overlap(at(9, 0), 120, at(9, 30), 15));
    }

    #[test]
    fn back_to_back_slots_do_not_overlap() {
        assert!(!slots_overlap(at(9, 0), 60, at(10, 0), 60));
        assert!(!slots_overlap(at(10, 0), 60, at(9, 0), 60));
    }

    #[test]
    fn duration_bounds() {
        assert!(validate_duration(DEFAULT_APPOINTMENT_MINUTES).is_ok());
        assert!(validate_duration(5).is_ok());
        assert!(validate_duration(480).is_ok());
        assert!(validate_duration(4).is_err());
        assert!(validate_duration(481).is_err());
    }

    #[test]
    fn only_scheduled_appointments_change_status() {
        let s = AppointmentStatus::Scheduled;
        assert!(s.can_transition_to(AppointmentStatus::Completed));
        assert!(s.can_transition_to(AppointmentStatus::Missed));
        assert!(s.can_transition_to(AppointmentStatus::Cancelled));
        assert!(!s.can_transition_to(AppointmentStatus::Scheduled));
        assert!(!AppointmentStatus::Completed.can_transition_to(AppointmentStatus::Cancelled));
    }
}

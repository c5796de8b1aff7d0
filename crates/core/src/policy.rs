//! Unpaid-leave eligibility gate.
//!
//! Compliance rule: unpaid leave may only be requested once the paid Annual
//! Leave balance is effectively exhausted. An undeterminable balance denies.

/// 30 minutes at an 8-hour working day, expressed in days. Balances at or
/// below this are treated as exhausted.
pub const UNPAID_LEAVE_THRESHOLD_DAYS: f64 = 0.0625;

/// Fixed denial wording surfaced to the end user.
pub const UNPAID_LEAVE_DENIAL_MESSAGE: &str =
    "According to P&C policy Prezlabers cannot request unpaid time off while having unused Annual Leave time";

/// Decide eligibility from a fetched Annual Leave balance. `None` means the
/// balance could not be determined, which always denies (fail closed).
pub fn unpaid_leave_allowed(remaining_annual_leave: Option<f64>) -> bool {
    match remaining_annual_leave {
        Some(balance) => balance <= UNPAID_LEAVE_THRESHOLD_DAYS,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{unpaid_leave_allowed, UNPAID_LEAVE_THRESHOLD_DAYS};

    #[test]
    fn unknown_balance_denies() {
        assert!(!unpaid_leave_allowed(None));
    }

    #[test]
    fn positive_balance_denies() {
        assert!(!unpaid_leave_allowed(Some(16.0)));
        assert!(!unpaid_leave_allowed(Some(0.07)));
    }

    #[test]
    fn exhausted_balance_allows() {
        assert!(unpaid_leave_allowed(Some(0.0)));
        assert!(unpaid_leave_allowed(Some(UNPAID_LEAVE_THRESHOLD_DAYS)));
        assert!(unpaid_leave_allowed(Some(0.03)));
    }
}

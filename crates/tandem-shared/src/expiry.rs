//! Conversation expiry policy.
//!
//! A conversation that sees no message within the policy window after its
//! match was created expires. The first message satisfies the policy for
//! good. Expiry is evaluated at read time; nothing sweeps in the background.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    window: Option<Duration>,
}

impl ExpiryPolicy {
    fn new(window: Option<Duration>) -> Self {
        Self { window }
    }

    /// Window in whole days; `0` disables expiry, as does a window too large
    /// for [`Duration`].
    pub fn from_days(days: i64) -> Self {
        if days <= 0 {
            return Self::never();
        }
        Self::new(Duration::try_days(days))
    }

    pub fn never() -> Self {
        Self { window: None }
    }

    /// Deadline for a conversation whose match was created at `matched_at`.
    ///
    /// `None` when the policy is disabled or the deadline lies past the end of
    /// representable time.
    pub fn expires_at(&self, matched_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.window.and_then(|w| matched_at.checked_add_signed(w))
    }
}

/// Pure expiry predicate over a conversation's stored fields.
pub fn is_expired(
    expires_at: Option<DateTime<Utc>>,
    last_message_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match (expires_at, last_message_at) {
        (_, Some(_)) => false,
        (Some(deadline), None) => now >= deadline,
        (None, None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_conversation_expires_at_deadline() {
        let policy = ExpiryPolicy::from_days(7);
        let matched_at = Utc::now();
        let deadline = policy.expires_at(matched_at).unwrap();

        assert!(!is_expired(Some(deadline), None, deadline - Duration::seconds(1)));
        assert!(is_expired(Some(deadline), None, deadline));
        assert!(is_expired(Some(deadline), None, deadline + Duration::days(30)));
    }

    #[test]
    fn any_message_satisfies_policy() {
        let deadline = Utc::now();
        let last = deadline - Duration::hours(1);
        assert!(!is_expired(Some(deadline), Some(last), deadline + Duration::days(365)));
    }

    #[test]
    fn zero_days_disables_expiry() {
        let policy = ExpiryPolicy::from_days(0);
        assert_eq!(policy.expires_at(Utc::now()), None);
        assert!(!is_expired(None, None, Utc::now()));
    }

    #[test]
    fn oversized_window_never_overflows() {
        assert_eq!(ExpiryPolicy::from_days(i64::MAX), ExpiryPolicy::never());

        let policy = ExpiryPolicy::from_days(100_000_000);
        assert_eq!(policy.expires_at(Utc::now()), None);
    }
}

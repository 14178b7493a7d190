//! # Retry budget.
//!
//! [`RetryPolicy`] decides whether an identity whose sync failed is requeued
//! with backoff or dropped ("giving up").
//!
//! ```text
//! RetryPolicy::Forever            → always requeue
//! RetryPolicy::Limited { max: 2 } → attempts with retries 0, 1, 2 → drop
//! ```
//!
//! Dropping only ends the current chain of attempts: the next admitted
//! notification for the identity starts again from zero retries.

/// Policy controlling how many consecutive failures an identity may accumulate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Never give up (default).
    #[default]
    Forever,
    /// Give up once the identity has been requeued `max_retries` times.
    Limited { max_retries: u32 },
}

impl RetryPolicy {
    /// Builds a policy from a signed limit where `<= 0` means "retry forever".
    ///
    /// ```
    /// use syncvisor::RetryPolicy;
    ///
    /// assert_eq!(RetryPolicy::from_max_retries(0), RetryPolicy::Forever);
    /// assert_eq!(RetryPolicy::from_max_retries(-1), RetryPolicy::Forever);
    /// assert_eq!(RetryPolicy::from_max_retries(3), RetryPolicy::Limited { max_retries: 3 });
    /// ```
    pub fn from_max_retries(max_retries: i64) -> Self {
        if max_retries <= 0 {
            RetryPolicy::Forever
        } else {
            RetryPolicy::Limited {
                max_retries: max_retries.min(i64::from(u32::MAX)) as u32,
            }
        }
    }

    /// True if an identity already requeued `retries` times may be requeued again.
    #[inline]
    pub fn allows(&self, retries: u32) -> bool {
        match self {
            RetryPolicy::Forever => true,
            RetryPolicy::Limited { max_retries } => retries < *max_retries,
        }
    }
}

//! The token-bucket algorithm itself (§4.5), pure and storage-agnostic: given
//! a previous state (or none) and a limit, produces a decision and the next
//! state. Both the in-memory and distributed backends call this function
//! inside their respective atomic-update primitives.

use crate::model::{BucketState, EffectiveRateLimit, RateLimitDecision};

/// `checkAndConsume` (§4.5). `now_millis` is the caller's clock; passing it in
/// rather than reading it here keeps this function pure and testable.
pub fn check_and_consume(
    state: Option<BucketState>,
    limit: &EffectiveRateLimit,
    now_millis: u64,
) -> (RateLimitDecision, BucketState) {
    let refill_rate = limit.refill_rate();
    let capacity = limit.burst_capacity as f64;

    let (tokens, last_refill) = match state {
        None => (capacity, now_millis),
        Some(prev) => {
            let elapsed_millis = now_millis.saturating_sub(prev.last_refill_millis);
            let elapsed_seconds = elapsed_millis as f64 / 1000.0;
            let refilled = prev.tokens + elapsed_seconds * refill_rate;
            (refilled.min(capacity), now_millis)
        }
    };

    if tokens >= 1.0 {
        let remaining_tokens = tokens - 1.0;
        let remaining = remaining_tokens.floor().max(0.0) as u64;
        let deficit = (capacity - remaining_tokens).max(0.0);
        let reset_after_seconds = if refill_rate > 0.0 { (deficit / refill_rate).ceil() } else { 0.0 };
        let decision = RateLimitDecision {
            allowed: true,
            remaining,
            limit: limit.requests_per_window,
            window_seconds: limit.window_seconds,
            reset_at_millis: now_millis + (reset_after_seconds as u64) * 1000,
            retry_after_seconds: 0,
            request_count: 1,
            new_state: Some(BucketState {
                tokens: remaining_tokens,
                last_refill_millis: last_refill,
            }),
        };
        (decision, BucketState { tokens: remaining_tokens, last_refill_millis: last_refill })
    } else {
        let deficit = (1.0 - tokens).max(0.0);
        let retry_after = if refill_rate > 0.0 {
            (deficit / refill_rate).ceil().max(1.0) as u64
        } else {
            1
        };
        let decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            limit: limit.requests_per_window,
            window_seconds: limit.window_seconds,
            reset_at_millis: now_millis + retry_after * 1000,
            retry_after_seconds: retry_after,
            request_count: 0,
            new_state: Some(BucketState { tokens, last_refill_millis: last_refill }),
        };
        (decision, BucketState { tokens, last_refill_millis: last_refill })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit() -> EffectiveRateLimit {
        EffectiveRateLimit {
            requests_per_window: 2,
            window_seconds: 60,
            burst_capacity: 2,
        }
    }

    #[test]
    fn first_access_initializes_full_bucket_and_allows() {
        let (decision, state) = check_and_consume(None, &limit(), 0);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert_eq!(state.tokens, 1.0);
    }

    #[test]
    fn third_rapid_request_is_rejected() {
        let limit = limit();
        let (_, s1) = check_and_consume(None, &limit, 0);
        let (_, s2) = check_and_consume(Some(s1), &limit, 0);
        let (decision, _) = check_and_consume(Some(s2), &limit, 0);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.retry_after_seconds >= 1);
    }

    #[test]
    fn tokens_refill_over_time() {
        let limit = limit();
        let (_, s1) = check_and_consume(None, &limit, 0);
        let (_, s2) = check_and_consume(Some(s1), &limit, 0);
        assert_eq!(s2.tokens, 0.0);
        let (decision, _) = check_and_consume(Some(s2), &limit, 30_000);
        assert!(decision.allowed);
    }
}

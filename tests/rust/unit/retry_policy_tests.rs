use std::time::Duration;

use graphmapper::driver::DriverError;
use graphmapper::transaction::RetryDecision;
use graphmapper::{ErrorKind, RetryPolicy};

#[test]
fn test_delay_sequence_without_jitter() {
    let policy = RetryPolicy {
        max_attempts: 5,
        initial_delay_ms: 100,
        max_delay_ms: 5000,
        multiplier: 2.0,
        jitter: 0.0,
    };
    let delays: Vec<u64> = policy.delays().iter().map(|d| d.as_millis() as u64).collect();
    assert_eq!(delays, vec![100, 200, 400, 800, 1600]);
    assert_eq!(policy.backoff_delay(10), Duration::from_millis(5000));
}

#[test]
fn test_jitter_stays_within_bounds() {
    let policy = RetryPolicy {
        jitter: 0.5,
        ..RetryPolicy::default()
    };
    let mut rng = rand::rng();
    for _ in 0..200 {
        let delay = policy.delay_for(1, &mut rng).as_millis() as u64;
        assert!((100..=300).contains(&delay), "delay {} out of range", delay);
    }
}

#[test]
fn test_only_transient_and_network_retry() {
    let policy = RetryPolicy::default().without_jitter();

    let transient = DriverError::new(Some("Neo.TransientError.Transaction.DeadlockDetected".into()), "deadlock");
    assert_eq!(transient.kind, ErrorKind::Transient);
    assert_eq!(policy.decide(transient.kind, 1), RetryDecision::Retry(Duration::from_millis(100)));

    let network = DriverError::network("connection reset");
    assert_eq!(policy.decide(network.kind, 2), RetryDecision::Reconnect(Duration::from_millis(200)));

    let auth = DriverError::new(Some("Neo.ClientError.Security.Unauthorized".into()), "bad credentials");
    assert_eq!(auth.kind, ErrorKind::Authentication);
    assert_eq!(policy.decide(auth.kind, 1), RetryDecision::GiveUp);

    let constraint = DriverError::new(
        Some("Neo.ClientError.Schema.ConstraintValidationFailed".into()),
        "Node(1) already exists with label `User` and property `email` = 'a@b.c'",
    );
    assert_eq!(constraint.kind, ErrorKind::ConstraintViolation);
    assert_eq!(policy.decide(constraint.kind, 1), RetryDecision::GiveUp);
}

#[test]
fn test_attempts_are_capped() {
    let policy = RetryPolicy::default().without_jitter();
    assert_eq!(policy.decide(ErrorKind::Transient, policy.max_attempts), RetryDecision::GiveUp);
}

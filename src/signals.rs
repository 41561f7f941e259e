//! Ctrl+C handling
//!
//! The handler only counts presses. A run notices the first press through
//! [`interrupted`] and cancels its remaining work; a second press exits
//! immediately with the SIGINT status.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::status::ExitStatus;

/// Number of Ctrl+C presses seen so far
static PRESSES: AtomicUsize = AtomicUsize::new(0);

/// Install the process-wide Ctrl+C handler
pub fn install() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(|| {
        if set_interrupted() == 1 {
            eprintln!("\nInterrupted; finishing in-flight requests (Ctrl+C again to abort)");
        } else {
            std::process::exit(ExitStatus::Interrupted as i32);
        }
    })
}

#[inline]
pub fn was_interrupted() -> bool {
    PRESSES.load(Ordering::SeqCst) > 0
}

/// Record one press, returning how many have been seen
#[inline]
pub fn set_interrupted() -> usize {
    PRESSES.fetch_add(1, Ordering::SeqCst) + 1
}

#[inline]
pub fn reset_interrupted() {
    PRESSES.store(0, Ordering::SeqCst);
}

/// Resolve once Ctrl+C has been pressed, checking every `poll`
pub async fn interrupted(poll: Duration) {
    while !was_interrupted() {
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_press_counting_and_wait() {
        reset_interrupted();
        assert!(!was_interrupted());

        let waiter = tokio::spawn(interrupted(Duration::from_millis(5)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        assert_eq!(set_interrupted(), 1);
        assert_eq!(set_interrupted(), 2);
        assert!(was_interrupted());
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();

        reset_interrupted();
        assert!(!was_interrupted());
    }
}

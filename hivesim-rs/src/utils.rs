use crate::types::TestResult;
use tokio::task::JoinError;

/// Maps the outcome of a spawned test body to its result. A panic fails the
/// test with the panic message as details.
pub fn extract_test_results(join_handle: Result<(), JoinError>) -> TestResult {
    match join_handle {
        Ok(()) => TestResult::pass(),
        Err(err) if err.is_cancelled() => TestResult::fail("test was cancelled"),
        Err(err) => {
            let err = err.into_panic();
            let details = if let Some(err) = err.downcast_ref::<&'static str>() {
                err.to_string()
            } else if let Some(err) = err.downcast_ref::<String>() {
                err.clone()
            } else {
                "test panicked".to_string()
            };
            TestResult::fail(details)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn panics_become_failures() {
        let ok = extract_test_results(tokio::spawn(async {}).await);
        assert!(ok.pass);

        let failed = extract_test_results(
            tokio::spawn(async {
                panic!("sequencer and verifier A should be synced");
            })
            .await,
        );
        assert!(!failed.pass);
        assert_eq!(failed.details, "sequencer and verifier A should be synced");

        let formatted = extract_test_results(
            tokio::spawn(async {
                let node = 2;
                panic!("node {node} unreachable");
            })
            .await,
        );
        assert_eq!(formatted.details, "node 2 unreachable");
    }
}

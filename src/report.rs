//! Aggregation of per-node step results into a phase verdict.
//!
//! Every phase step funnels its fan-out results through here: either the
//! step requires all nodes to succeed (failure is fatal and names the step
//! and the offenders) or it is best-effort cleanup (failures are logged and
//! swallowed). Partial success is never reported as success.

use console::style;
use log::{info, warn};

use crate::error::{DeployError, Result};
use crate::runner::StepResult;

/// Require every node to have succeeded in `step`.
///
/// The error names the step and each failing node with its exit code and
/// trailing stderr, so the operator does not have to scroll logs.
pub fn require_all(step: &str, results: &[StepResult]) -> Result<()> {
    let failures: Vec<&StepResult> = results.iter().filter(|r| !r.success).collect();
    if failures.is_empty() {
        return Ok(());
    }
    let detail = failures
        .iter()
        .map(|r| {
            let code = r
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string());
            let stderr = r.stderr.trim();
            if stderr.is_empty() {
                format!("{} (exit {})", r.node_name, code)
            } else {
                format!("{} (exit {}): {}", r.node_name, code, last_line(stderr))
            }
        })
        .collect::<Vec<_>>()
        .join("; ");
    Err(DeployError::remote_action(format!(
        "step \"{}\" failed on {} node(s): {}",
        step,
        failures.len(),
        detail
    )))
}

/// Record failures of a best-effort step without failing the run.
pub fn record_failures(step: &str, results: &[StepResult]) {
    for result in results.iter().filter(|r| !r.success) {
        warn!(
            "step \"{}\": {} failed (ignored, best-effort): {}",
            step,
            result.node_name,
            last_line(result.stderr.trim())
        );
    }
}

/// Whether every result in the slice succeeded.
pub fn all_ok(results: &[StepResult]) -> bool {
    results.iter().all(|r| r.success)
}

fn last_line(text: &str) -> &str {
    text.lines().last().unwrap_or("")
}

/// Print the user-facing success marker for a finished phase.
pub fn success(message: &str) {
    info!("{}", message);
    eprintln!("{} {}", style("[SUCCESS]").green().bold(), message);
}

/// Print the user-facing failure marker for a failed phase.
pub fn failure(message: &str) {
    eprintln!("{} {}", style("[ERROR]").red().bold(), message);
}

/// Print an intermediate progress line unless running silent.
pub fn progress(silent: bool, message: &str) {
    info!("{}", message);
    if !silent {
        eprintln!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(node: &str) -> StepResult {
        StepResult {
            node_id: 0,
            node_name: node.to_string(),
            success: true,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    fn failed(node: &str, stderr: &str) -> StepResult {
        StepResult {
            node_id: 1,
            node_name: node.to_string(),
            success: false,
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(1),
        }
    }

    #[test]
    fn test_require_all_passes_on_success() {
        assert!(require_all("boot osds", &[ok("a"), ok("b")]).is_ok());
    }

    #[test]
    fn test_require_all_names_step_and_nodes() {
        let err = require_all(
            "boot osds",
            &[ok("node0 (id=0)"), failed("node1 (id=1)", "no keyring")],
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("boot osds"));
        assert!(msg.contains("node1 (id=1)"));
        assert!(msg.contains("no keyring"));
    }

    #[test]
    fn test_record_failures_never_errors() {
        // Best-effort: this must not panic or return anything.
        record_failures("stop managers", &[failed("node2 (id=2)", "not loaded")]);
    }

    #[test]
    fn test_all_ok() {
        assert!(all_ok(&[ok("a")]));
        assert!(!all_ok(&[ok("a"), failed("b", "")]));
    }
}

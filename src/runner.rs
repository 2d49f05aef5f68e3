//! Remote command execution.
//!
//! `run` drives a single opaque action over one session; `run_many` is the
//! fan-out-then-wait unit every phase step is built from. Failure of one
//! node's command never cancels the commands already dispatched to other
//! nodes in the same step; the caller decides at the step boundary whether
//! the aggregate outcome allows proceeding.

use log::debug;

use crate::fanout;
use crate::reservation::{Node, NodeId};
use crate::session::SessionPool;

/// An opaque remote action: a shell command plus execution flags.
#[derive(Debug, Clone)]
pub struct RemoteAction {
    command: String,
    elevate: bool,
    quiet: bool,
    stdin: Option<Vec<u8>>,
}

impl RemoteAction {
    /// A plain shell command.
    pub fn shell(command: impl Into<String>) -> Self {
        RemoteAction {
            command: command.into(),
            elevate: false,
            quiet: false,
            stdin: None,
        }
    }

    /// A shell command run as the elevated user.
    pub fn sudo(command: impl Into<String>) -> Self {
        RemoteAction {
            command: command.into(),
            elevate: true,
            quiet: false,
            stdin: None,
        }
    }

    /// Suppress debug logging of the captured output (noisy or sensitive).
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Feed the command a stdin payload.
    pub fn with_stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// The final command line sent over the channel.
    pub fn command_line(&self) -> String {
        if self.elevate {
            format!("sudo {}", self.command)
        } else {
            self.command.clone()
        }
    }
}

/// Per-node outcome of one orchestration step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub node_id: NodeId,
    pub node_name: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl StepResult {
    /// A result for a command that never ran (channel-level failure).
    pub fn aborted(node: &Node, reason: String) -> Self {
        StepResult {
            node_id: node.id,
            node_name: node.to_string(),
            success: false,
            stdout: String::new(),
            stderr: reason,
            exit_code: None,
        }
    }
}

/// Execute one action against one node, synchronously.
pub fn run(pool: &SessionPool, node: &Node, action: &RemoteAction) -> StepResult {
    let command = action.command_line();
    let session = match pool.session(node) {
        Ok(session) => session,
        Err(e) => return StepResult::aborted(node, e.to_string()),
    };
    let guard = match session.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    match guard.exec(&command, action.stdin.as_deref()) {
        Ok((stdout, stderr, exit)) => {
            if !action.quiet {
                debug!("{}: `{}` exited {}", node, command, exit);
            }
            StepResult {
                node_id: node.id,
                node_name: node.to_string(),
                success: exit == 0,
                stdout,
                stderr,
                exit_code: Some(exit),
            }
        }
        Err(e) => StepResult::aborted(node, e.to_string()),
    }
}

/// Fan an action out over `nodes` and wait for every result (barrier).
///
/// One task per node; tasks run concurrently up to the fan-out ceiling.
pub fn run_many<F>(pool: &SessionPool, nodes: &[&Node], action_for: F) -> Vec<StepResult>
where
    F: Fn(&Node) -> RemoteAction + Sync,
{
    fanout::run_all(nodes, |node| run(pool, node, &action_for(node)))
        .into_iter()
        .zip(nodes)
        .map(|(result, node)| {
            result.unwrap_or_else(|| StepResult::aborted(node, "task died".to_string()))
        })
        .collect()
}

/// Fan out a per-node list of actions, sequential per node, concurrent
/// across nodes. Used where one node boots several daemon instances.
pub fn run_many_seq<F>(pool: &SessionPool, nodes: &[&Node], actions_for: F) -> Vec<StepResult>
where
    F: Fn(&Node) -> Vec<RemoteAction> + Sync,
{
    fanout::run_all(nodes, |node| {
        let mut last = None;
        for action in actions_for(node) {
            let result = run(pool, node, &action);
            let failed = !result.success;
            last = Some(result);
            if failed {
                break;
            }
        }
        last.unwrap_or_else(|| StepResult::aborted(node, "no actions".to_string()))
    })
    .into_iter()
    .zip(nodes)
    .map(|(result, node)| {
        result.unwrap_or_else(|| StepResult::aborted(node, "task died".to_string()))
    })
    .collect()
}

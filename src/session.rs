//! SSH session pool.
//!
//! One persistent remote-execution channel per node. Sessions are opened
//! concurrently, reused for every step of a phase, and torn down exactly
//! once. A pool a phase opened itself is closed by that phase on every exit
//! path; a pool handed in by the caller stays open (ownership stays
//! external).

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};

use crate::error::{DeployError, Result};
use crate::fanout;
use crate::reservation::{Node, NodeId};

/// Connection parameters shared by every session of a run.
#[derive(Debug, Clone, Default)]
pub struct SshCredentials {
    /// Identity file used to authenticate; falls back to the SSH agent.
    pub key_path: Option<PathBuf>,
}

/// An authenticated SSH session bound to exactly one node.
pub struct RemoteSession {
    node_id: NodeId,
    label: String,
    session: ssh2::Session,
}

impl RemoteSession {
    /// Dial and authenticate a session for `node`.
    pub fn connect(node: &Node, credentials: &SshCredentials) -> Result<RemoteSession> {
        let address = format!("{}:22", node.ip_public);
        let stream = TcpStream::connect(&address).map_err(|e| {
            DeployError::connectivity(format!("{}: TCP connect failed: {}", node.label(), e))
        })?;

        let mut session = ssh2::Session::new().map_err(|e| {
            DeployError::connectivity(format!("{}: session init failed: {}", node.label(), e))
        })?;
        session.set_tcp_stream(stream);
        session.handshake().map_err(|e| {
            DeployError::connectivity(format!("{}: SSH handshake failed: {}", node.label(), e))
        })?;

        match &credentials.key_path {
            Some(key) => session
                .userauth_pubkey_file(&node.user, None, key, None)
                .map_err(|e| {
                    DeployError::connectivity(format!(
                        "{}: key authentication failed ({}): {}",
                        node.label(),
                        key.display(),
                        e
                    ))
                })?,
            None => session.userauth_agent(&node.user).map_err(|e| {
                DeployError::connectivity(format!(
                    "{}: agent authentication failed: {}",
                    node.label(),
                    e
                ))
            })?,
        }

        debug!("opened session to {}", node.label());
        Ok(RemoteSession {
            node_id: node.id,
            label: node.label(),
            session,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Run a shell command, returning (stdout, stderr, exit status).
    ///
    /// Blocks until the remote command completed. An optional payload is
    /// written to the command's stdin before EOF.
    pub fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<(String, String, i32)> {
        let mut channel = self.session.channel_session().map_err(|e| {
            DeployError::remote_action(format!("{}: channel open failed: {}", self.label, e))
        })?;
        channel.exec(command).map_err(|e| {
            DeployError::remote_action(format!("{}: exec failed: {}", self.label, e))
        })?;

        if let Some(data) = stdin {
            channel.write_all(data).map_err(|e| {
                DeployError::remote_action(format!("{}: stdin write failed: {}", self.label, e))
            })?;
            channel.send_eof().map_err(|e| {
                DeployError::remote_action(format!("{}: stdin close failed: {}", self.label, e))
            })?;
        }

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout).map_err(|e| {
            DeployError::remote_action(format!("{}: stdout read failed: {}", self.label, e))
        })?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr).map_err(|e| {
            DeployError::remote_action(format!("{}: stderr read failed: {}", self.label, e))
        })?;

        channel.wait_close().map_err(|e| {
            DeployError::remote_action(format!("{}: channel close failed: {}", self.label, e))
        })?;
        let exit = channel.exit_status().map_err(|e| {
            DeployError::remote_action(format!("{}: no exit status: {}", self.label, e))
        })?;
        Ok((stdout, stderr, exit))
    }

    /// Upload a small text payload (key, config) to `dest` with `mode`.
    pub fn upload(&self, dest: &Path, data: &[u8], mode: i32) -> Result<()> {
        let mut channel = self
            .session
            .scp_send(dest, mode, data.len() as u64, None)
            .map_err(|e| {
                DeployError::remote_action(format!(
                    "{}: scp to {} failed: {}",
                    self.label,
                    dest.display(),
                    e
                ))
            })?;
        channel.write_all(data).map_err(|e| {
            DeployError::remote_action(format!(
                "{}: scp write to {} failed: {}",
                self.label,
                dest.display(),
                e
            ))
        })?;
        channel.send_eof().ok();
        channel.wait_eof().ok();
        channel.close().ok();
        channel.wait_close().ok();
        Ok(())
    }

    /// Best-effort disconnect.
    fn close(&self) {
        if let Err(e) = self.session.disconnect(None, "done", None) {
            warn!("{}: disconnect failed (ignored): {}", self.label, e);
        }
    }
}

/// All open sessions of one phase invocation, keyed by node id.
///
/// Each session sits behind a mutex; the fan-out model hands at most one
/// task per node per step, so the lock is uncontended and exists to let
/// session references cross worker threads.
pub struct SessionPool {
    sessions: BTreeMap<NodeId, Mutex<RemoteSession>>,
}

impl SessionPool {
    /// Open one session per node, concurrently.
    ///
    /// A single failed connection does not abort the others, but any missing
    /// session is fatal for the run: the error names every unreachable node.
    pub fn open(nodes: &[Node], credentials: &SshCredentials) -> Result<SessionPool> {
        let results = fanout::run_all(nodes, |node| RemoteSession::connect(node, credentials));

        let mut sessions = BTreeMap::new();
        let mut failures = Vec::new();
        for (node, outcome) in nodes.iter().zip(results) {
            match outcome {
                Some(Ok(session)) => {
                    sessions.insert(node.id, Mutex::new(session));
                }
                Some(Err(e)) => failures.push(format!("{}: {}", node, e)),
                None => failures.push(format!("{}: connection task died", node)),
            }
        }

        if !failures.is_empty() {
            // Close the sessions that did come up before reporting failure.
            let partial = SessionPool { sessions };
            partial.close_all();
            return Err(DeployError::connectivity(format!(
                "could not connect to {} node(s): {}",
                failures.len(),
                failures.join("; ")
            )));
        }
        Ok(SessionPool { sessions })
    }

    /// The session for `node`. Nodes outside the pool are a bug upstream.
    pub fn session(&self, node: &Node) -> Result<&Mutex<RemoteSession>> {
        self.sessions.get(&node.id).ok_or_else(|| {
            DeployError::connectivity(format!("no open session for {}", node))
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Best-effort close of every session; individual failures are logged
    /// and swallowed.
    pub fn close_all(&self) {
        for session in self.sessions.values() {
            match session.lock() {
                Ok(guard) => guard.close(),
                Err(poisoned) => poisoned.into_inner().close(),
            }
        }
    }
}

/// A session pool with ownership attached.
///
/// Phases accept an optional caller-provided pool; when none is given they
/// open their own and must close it on every path. `Drop` covers the error
/// paths.
pub enum PoolHandle<'a> {
    Borrowed(&'a SessionPool),
    Owned(SessionPool),
}

impl<'a> PoolHandle<'a> {
    /// Use `existing` if given, otherwise open a pool over `nodes`.
    pub fn acquire(
        existing: Option<&'a SessionPool>,
        nodes: &[Node],
        credentials: &SshCredentials,
    ) -> Result<PoolHandle<'a>> {
        match existing {
            Some(pool) => Ok(PoolHandle::Borrowed(pool)),
            None => Ok(PoolHandle::Owned(SessionPool::open(nodes, credentials)?)),
        }
    }

    pub fn pool(&self) -> &SessionPool {
        match self {
            PoolHandle::Borrowed(pool) => pool,
            PoolHandle::Owned(pool) => pool,
        }
    }
}

impl Drop for PoolHandle<'_> {
    fn drop(&mut self) {
        if let PoolHandle::Owned(pool) = self {
            pool.close_all();
        }
    }
}

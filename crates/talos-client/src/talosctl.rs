//! `talosctl` backed node client.
//!
//! Every call runs one `talosctl` subprocess with `--talosconfig` and, when a
//! session was opened with explicit endpoints, `--endpoints`. Processes are
//! killed when the calling future is dropped.

use crate::client::{HealthStream, NodeClient, NodeClientFactory};
use crate::error::TalosError;
use crate::models::{
    ClusterInfo, HealthMessage, ResourceDefinition, ResourceMetadata, ResourceSnapshot, select_definition,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Opens [`TalosctlClient`] sessions.
#[derive(Debug, Clone)]
pub struct TalosctlFactory {
    binary: PathBuf,
    talosconfig: PathBuf,
    command_timeout: Duration,
}

impl TalosctlFactory {
    /// Creates a factory running `binary` against the client config at
    /// `talosconfig`. One-shot commands are bounded by `command_timeout`.
    pub fn new(binary: impl Into<PathBuf>, talosconfig: impl Into<PathBuf>, command_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            talosconfig: talosconfig.into(),
            command_timeout,
        }
    }
}

#[async_trait]
impl NodeClientFactory for TalosctlFactory {
    async fn connect(&self, endpoints: &[String]) -> Result<Box<dyn NodeClient>, TalosError> {
        if let Err(e) = tokio::fs::metadata(&self.talosconfig).await {
            return Err(TalosError::Config(format!("{}: {}", self.talosconfig.display(), e)));
        }
        debug!("Opening talosctl session for endpoints {:?}", endpoints);
        Ok(Box::new(TalosctlClient {
            binary: self.binary.clone(),
            talosconfig: self.talosconfig.clone(),
            endpoints: endpoints.to_vec(),
            command_timeout: self.command_timeout,
        }))
    }
}

/// Session bound to a fixed endpoint set.
#[derive(Debug, Clone)]
pub struct TalosctlClient {
    binary: PathBuf,
    talosconfig: PathBuf,
    endpoints: Vec<String>,
    command_timeout: Duration,
}

#[derive(Deserialize)]
struct DefinitionDocument {
    spec: ResourceDefinition,
}

#[derive(Deserialize)]
struct ResourceDocument {
    #[serde(default)]
    spec: serde_yaml::Value,
}

impl TalosctlClient {
    /// Full argument list of one invocation, global flags first.
    fn argv(&self, args: &[&str]) -> Vec<OsString> {
        let mut argv = vec![OsString::from("--talosconfig"), self.talosconfig.clone().into_os_string()];
        if !self.endpoints.is_empty() {
            argv.push("--endpoints".into());
            argv.push(self.endpoints.join(",").into());
        }
        argv.extend(args.iter().map(OsString::from));
        argv
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.argv(args)).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// Arguments of `talosctl health`.
    ///
    /// The check runs server side on the first endpoint's node, reached
    /// through the session endpoints. talosctl accepts a single target node
    /// for server-side checks.
    fn health_args(&self, timeout: Duration, info: &ClusterInfo) -> Vec<String> {
        let mut args = vec![
            "health".to_string(),
            "--wait-timeout".to_string(),
            format!("{}s", timeout.as_secs().max(1)),
        ];
        if let Some(endpoint) = self.endpoints.first() {
            args.extend(["--nodes".to_string(), endpoint_host(endpoint).to_string()]);
        }
        if !info.control_plane_nodes.is_empty() {
            args.extend(["--control-plane-nodes".to_string(), info.control_plane_nodes.join(",")]);
        }
        if !info.worker_nodes.is_empty() {
            args.extend(["--worker-nodes".to_string(), info.worker_nodes.join(",")]);
        }
        args
    }

    fn render(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary.display(), args.join(" "))
    }

    async fn run(&self, args: &[&str]) -> Result<String, TalosError> {
        let rendered = self.render(args);
        debug!("Running {}", rendered);

        let output = tokio::time::timeout(self.command_timeout, self.command(args).output())
            .await
            .map_err(|_elapsed| TalosError::Timeout(self.command_timeout))??;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("NotFound") || stderr.contains("not found") {
            return Err(TalosError::NotFound(stderr));
        }
        Err(TalosError::Command {
            command: rendered,
            status: output.status.to_string(),
            stderr,
        })
    }
}

#[async_trait]
impl NodeClient for TalosctlClient {
    async fn resolve_resource_kind(&self, namespace: Option<&str>, name: &str) -> Result<ResourceDefinition, TalosError> {
        let stdout = match self.run(&["get", "resourcedefinitions", "--output", "json"]).await {
            Ok(stdout) => stdout,
            Err(TalosError::NotFound(_)) => return Err(TalosError::UnknownResourceKind(name.to_string())),
            Err(e) => return Err(e),
        };
        select_definition(parse_definitions(&stdout)?, namespace, name).ok_or_else(|| TalosError::UnknownResourceKind(name.to_string()))
    }

    async fn get(&self, metadata: &ResourceMetadata) -> Result<ResourceSnapshot, TalosError> {
        let stdout = self
            .run(&[
                "get",
                &metadata.type_,
                &metadata.id,
                "--namespace",
                &metadata.namespace,
                "--output",
                "yaml",
            ])
            .await?;
        let spec = parse_first_spec(&stdout)?
            .ok_or_else(|| TalosError::NotFound(format!("{}/{}/{}", metadata.namespace, metadata.type_, metadata.id)))?;
        Ok(ResourceSnapshot {
            metadata: metadata.clone(),
            spec,
        })
    }

    async fn health_check(&self, timeout: Duration, info: &ClusterInfo) -> Result<HealthStream, TalosError> {
        let args = self.health_args(timeout, info);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        debug!("Running {}", self.render(&args));
        let mut child = self.command(&args).stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TalosError::HealthCheck("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TalosError::HealthCheck("stderr not captured".to_string()))?;

        let progress = stream::select(lines(stdout), lines(stderr))
            .filter(|line| futures::future::ready(!matches!(line, Ok(l) if l.trim().is_empty())))
            .map(|line| line.map(|l| HealthMessage::from_line(&l)).map_err(TalosError::from));

        let exit = stream::once(async move { child.wait().await }).filter_map(|status| async move {
            match status {
                Ok(status) if status.success() => None,
                Ok(status) => Some(Err(TalosError::HealthCheck(format!("talosctl health exited with {status}")))),
                Err(e) => Some(Err(TalosError::Io(e))),
            }
        });

        Ok(progress.chain(exit).boxed())
    }
}

fn lines<R>(reader: R) -> BoxStream<'static, std::io::Result<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(Some(BufReader::new(reader).lines()), |state| async move {
        let mut lines = state?;
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(line), Some(lines))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}

/// Host part of a `host:port` endpoint.
fn endpoint_host(endpoint: &str) -> &str {
    if let Some(rest) = endpoint.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(host, _)| host);
    }
    match endpoint.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => endpoint,
    }
}

/// Parses the concatenated JSON documents printed by
/// `talosctl get resourcedefinitions -o json`.
fn parse_definitions(stdout: &str) -> Result<Vec<ResourceDefinition>, TalosError> {
    let mut definitions = Vec::new();
    for document in serde_json::Deserializer::from_str(stdout).into_iter::<DefinitionDocument>() {
        definitions.push(document?.spec);
    }
    Ok(definitions)
}

/// Spec of the first document printed by `talosctl get ... -o yaml`. Output
/// contains one document per node.
fn parse_first_spec(stdout: &str) -> Result<Option<serde_yaml::Value>, TalosError> {
    for document in serde_yaml::Deserializer::from_str(stdout) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        let parsed: ResourceDocument = serde_yaml::from_value(value)?;
        return Ok(Some(parsed.spec));
    }
    Ok(None)
}

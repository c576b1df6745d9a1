use std::path::{Path, PathBuf};

use async_trait::async_trait;
use duct::Expression;
use smoke_poll::{FetchError, ResourceFetcher, ResourceObservation, ResourceQuery};
use tracing::{debug, info};

use crate::error::OcError;
use crate::resources::{ClusterResources, PRESENT};

const PHASE_PATH: &str = "{.status.phase}";
const LIST_PATH: &str =
    "{range .items[*]}{.metadata.name}{\"\\t\"}{.status.phase}{\"\\n\"}{end}";

/// Wrapper around the `oc` binary. Every call returns raw stdout; failures
/// are classified from stderr.
#[derive(Debug, Clone)]
pub struct OcCli {
    binary: PathBuf,
}

impl OcCli {
    /// Looks the binary up in `PATH` (or accepts an explicit path).
    pub fn locate(binary: &str) -> Result<Self, OcError> {
        let path = which::which(binary).map_err(|_| OcError::BinaryNotFound {
            binary: binary.to_string(),
        })?;
        Ok(Self { binary: path })
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub async fn create_from_file(
        &self,
        manifest: &Path,
        namespace: &str,
    ) -> Result<String, OcError> {
        info!(manifest = %manifest.display(), %namespace, "creating from manifest");
        self.run(args(["create", "-f"]).path(manifest).ns(namespace)).await
    }

    /// `oc process -f <template> | oc create -f -`
    pub async fn process_template(
        &self,
        template: &Path,
        namespace: &str,
    ) -> Result<String, OcError> {
        info!(template = %template.display(), %namespace, "processing template");
        let process = args(["process", "-f"]).path(template).ns(namespace);
        let create = args(["create", "-f", "-"]).ns(namespace);
        let command = format!(
            "{} | {}",
            describe(&self.binary, &process.0),
            describe(&self.binary, &create.0)
        );
        let expr = duct::cmd(self.binary.as_path(), &process.0)
            .pipe(duct::cmd(self.binary.as_path(), &create.0));
        run_expression(command, expr).await
    }

    pub async fn new_app_with_params(
        &self,
        template: &str,
        param_file: &Path,
        namespace: &str,
    ) -> Result<String, OcError> {
        info!(%template, params = %param_file.display(), "instantiating template");
        self.run(
            args(["new-app", "--template"])
                .arg(template)
                .arg("--param-file")
                .path(param_file)
                .ns(namespace),
        )
        .await
    }

    /// `oc new-app -f <file-or-url>`
    pub async fn new_app_from_file(
        &self,
        source: &str,
        namespace: &str,
    ) -> Result<String, OcError> {
        info!(%source, %namespace, "creating app from file");
        self.run(args(["new-app", "-f"]).arg(source).ns(namespace))
            .await
    }

    pub async fn start_build(
        &self,
        build_config: &str,
        namespace: &str,
    ) -> Result<String, OcError> {
        info!(%build_config, %namespace, "triggering build");
        self.run(args(["start-build"]).arg(build_config).ns(namespace))
            .await
    }

    pub async fn exec(
        &self,
        pod: &str,
        container: &str,
        namespace: &str,
        command: &[&str],
    ) -> Result<String, OcError> {
        let mut a = args(["exec"])
            .arg(pod)
            .arg("-c")
            .arg(container)
            .ns(namespace)
            .arg("--");
        for part in command {
            a = a.arg(part);
        }
        self.run(a).await
    }

    pub async fn route_host(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<String, OcError> {
        let host = self
            .get_jsonpath("route", name, namespace, "{.spec.host}")
            .await?;
        Ok(host.trim().to_string())
    }

    pub async fn get_jsonpath(
        &self,
        kind: &str,
        name: &str,
        namespace: &str,
        json_path: &str,
    ) -> Result<String, OcError> {
        self.run(
            args(["get"])
                .arg(kind)
                .arg(name)
                .ns(namespace)
                .arg("-o")
                .arg(&format!("jsonpath={json_path}")),
        )
        .await
    }

    /// Human-readable `oc get <kind> <name>` table.
    pub async fn get(
        &self,
        kind: &str,
        name: &str,
        namespace: &str,
    ) -> Result<String, OcError> {
        self.run(args(["get"]).arg(kind).arg(name).ns(namespace))
            .await
    }

    pub async fn project_exists(&self, name: &str) -> Result<bool, OcError> {
        match self.run(args(["get", "project"]).arg(name)).await {
            Ok(_) => Ok(true),
            Err(OcError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn new_project(&self, name: &str) -> Result<String, OcError> {
        info!(project = %name, "creating project");
        self.run(args(["new-project"]).arg(name)).await
    }

    async fn run(&self, a: Args) -> Result<String, OcError> {
        let command = describe(&self.binary, &a.0);
        run_expression(command, duct::cmd(self.binary.as_path(), a.0)).await
    }
}

#[derive(Debug, Default)]
struct Args(Vec<String>);

fn args<const N: usize>(fixed: [&str; N]) -> Args {
    Args(fixed.iter().map(|s| s.to_string()).collect())
}

impl Args {
    fn arg(mut self, a: &str) -> Self {
        self.0.push(a.to_string());
        self
    }

    fn path(mut self, p: &Path) -> Self {
        self.0.push(p.to_string_lossy().into_owned());
        self
    }

    fn ns(self, namespace: &str) -> Self {
        self.arg("-n").arg(namespace)
    }
}

fn describe(binary: &Path, args: &[String]) -> String {
    let name = binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| binary.display().to_string());
    format!("{name} {}", args.join(" "))
}

async fn run_expression(
    command: String,
    expr: Expression,
) -> Result<String, OcError> {
    tokio::task::spawn_blocking(move || {
        debug!(%command, "running");
        let output = expr
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|source| OcError::Spawn {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(OcError::from_exit(command, output.status.code(), stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    })
    .await
    .map_err(|e| OcError::Join(e.to_string()))?
}

/// Parses `name<TAB>phase` lines produced by [`LIST_PATH`].
fn parse_listing(output: &str) -> Vec<ResourceObservation> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let (name, phase) = line.split_once('\t').unwrap_or((line, ""));
            let phase = phase.trim();
            let state = if phase.is_empty() { PRESENT } else { phase };
            ResourceObservation::new(name.trim(), state)
        })
        .collect()
}

#[async_trait]
impl ResourceFetcher for OcCli {
    async fn fetch(
        &self,
        query: &ResourceQuery,
    ) -> Result<ResourceObservation, FetchError> {
        let state = match &query.json_path {
            Some(path) => {
                self.get_jsonpath(&query.kind, &query.name, &query.namespace, path)
                    .await?
            }
            None => {
                let phase = self
                    .get_jsonpath(
                        &query.kind,
                        &query.name,
                        &query.namespace,
                        PHASE_PATH,
                    )
                    .await?;
                if phase.trim().is_empty() {
                    PRESENT.to_string()
                } else {
                    phase
                }
            }
        };
        Ok(ResourceObservation::new(&query.name, state.trim()))
    }
}

#[async_trait]
impl ClusterResources for OcCli {
    async fn list(
        &self,
        kind: &str,
        namespace: &str,
    ) -> Result<Vec<ResourceObservation>, FetchError> {
        let output = self
            .run(
                args(["get"])
                    .arg(kind)
                    .ns(namespace)
                    .arg("-o")
                    .arg(&format!("jsonpath={LIST_PATH}")),
            )
            .await?;
        Ok(parse_listing(&output))
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, FetchError> {
        Ok(self.project_exists(name).await?)
    }

    async fn create_namespace(&self, name: &str) -> Result<(), FetchError> {
        self.new_project(name).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), FetchError> {
        self.run(args(["get", "project", "default"])).await?;
        Ok(())
    }
}

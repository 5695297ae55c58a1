//! Docker-backed container host.
//!
//! Processes are docker execs: the exec id doubles as the process id, so a
//! restarted orchestrator can recover an exit status by re-inspecting the
//! exec. Container properties are files under a fixed directory inside the
//! container — the container itself stays the durable store for in-flight
//! work, which is what the reattach and memoization protocols rely on.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, KillContainerOptions,
    LogOutput, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use conveyor_core::container::ContainerSpec;
use conveyor_core::io::SharedBuffer;
use conveyor_core::runtime::{
    Container, ContainerHost, Process, ProcessIo, ProcessSpec, Volume, VolumeHost,
};
use conveyor_core::worker::{ResourceType, WorkerInfo};
use conveyor_core::{Handle, RuntimeError, RuntimeResult};
use conveyor_fleet::WorkerDialer;

const PROPERTY_DIR: &str = "/tmp/.conveyor/properties";

/// Keeps the container alive so execs have somewhere to run.
const IDLE_COMMAND: [&str; 3] = ["sh", "-c", "while true; do sleep 86400; done"];

fn host_err(err: bollard::errors::Error) -> RuntimeError {
    RuntimeError::Host(err.to_string())
}

fn stream_err(err: bollard::errors::Error) -> RuntimeError {
    RuntimeError::Stream(err.to_string())
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// One worker's Docker daemon, serving both as container host and volume
/// host.
pub struct DockerHost {
    docker: Docker,
    resource_types: Vec<ResourceType>,
}

impl DockerHost {
    pub fn new(docker: Docker, resource_types: Vec<ResourceType>) -> Self {
        Self {
            docker,
            resource_types,
        }
    }

    /// Connect to the local Docker daemon.
    pub fn local(resource_types: Vec<ResourceType>) -> RuntimeResult<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(host_err)?;
        Ok(Self::new(docker, resource_types))
    }

    fn container_name(handle: &Handle) -> String {
        format!("conveyor-{handle}")
    }

    fn image_for(&self, spec: &ContainerSpec) -> RuntimeResult<String> {
        match spec {
            ContainerSpec::Task(task) => Ok(task.image.clone()),
            ContainerSpec::Resource(resource) => self
                .resource_types
                .iter()
                .find(|rt| rt.name == resource.resource_type)
                .map(|rt| rt.image.clone())
                .ok_or_else(|| {
                    RuntimeError::Host(format!(
                        "worker has no image for resource type {:?}",
                        resource.resource_type
                    ))
                }),
        }
    }

    async fn pull_image(&self, image: &str) {
        info!(image = %image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut pull = self.docker.create_image(Some(options), None, None);
        while let Some(result) = pull.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!(status = %status, "Pull progress");
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Pull warning");
                }
            }
        }
    }

    fn container(&self, handle: &Handle) -> DockerContainer {
        DockerContainer {
            docker: self.docker.clone(),
            name: Self::container_name(handle),
            handle: handle.clone(),
        }
    }
}

#[async_trait]
impl ContainerHost for DockerHost {
    async fn create(
        &self,
        handle: &Handle,
        spec: &ContainerSpec,
    ) -> RuntimeResult<Arc<dyn Container>> {
        let image = self.image_for(spec)?;
        self.pull_image(&image).await;

        let name = Self::container_name(handle);
        let labels = HashMap::from([("conveyor.handle".to_string(), handle.to_string())]);

        let config = Config {
            image: Some(image),
            cmd: Some(IDLE_COMMAND.iter().map(|s| s.to_string()).collect()),
            labels: Some(labels),
            tty: Some(false),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };

        info!(container = %name, "Creating container");
        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(host_err)?;

        self.docker
            .start_container(&name, None::<StartContainerOptions<String>>)
            .await
            .map_err(host_err)?;

        Ok(Arc::new(self.container(handle)))
    }

    async fn lookup(&self, handle: &Handle) -> RuntimeResult<Option<Arc<dyn Container>>> {
        let name = Self::container_name(handle);
        match self.docker.inspect_container(&name, None).await {
            Ok(_) => Ok(Some(Arc::new(self.container(handle)))),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(host_err(err)),
        }
    }

    async fn destroy(&self, handle: &Handle) -> RuntimeResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(&Self::container_name(handle), Some(options))
            .await
            .map_err(host_err)?;
        Ok(())
    }
}

#[async_trait]
impl VolumeHost for DockerHost {
    async fn create_volume(&self, container: &Handle) -> RuntimeResult<Arc<dyn Volume>> {
        // Volumes live inside the container's filesystem; streams go over
        // the daemon's tar endpoints.
        Ok(Arc::new(DockerVolume {
            container: self.container(container),
            handle: Handle::new(),
        }))
    }
}

/// One container on the daemon.
pub struct DockerContainer {
    docker: Docker,
    name: String,
    handle: Handle,
}

impl DockerContainer {
    async fn start_exec_process(
        &self,
        exec_id: String,
        io: ProcessIo,
    ) -> RuntimeResult<Box<dyn Process>> {
        let started = self
            .docker
            .start_exec(&exec_id, None)
            .await
            .map_err(host_err)?;

        let pump = match started {
            StartExecResults::Attached {
                mut output,
                mut input,
            } => {
                let stdin = io.stdin;
                let mut stdout = io.stdout;
                let mut stderr = io.stderr;
                Some(tokio::spawn(async move {
                    if let Some(bytes) = stdin {
                        if let Err(err) = input.write_all(&bytes).await {
                            debug!(error = %err, "stdin write ended early");
                        }
                        let _ = input.shutdown().await;
                    }
                    while let Some(chunk) = output.next().await {
                        match chunk {
                            Ok(LogOutput::StdOut { message })
                            | Ok(LogOutput::Console { message }) => {
                                if let Some(sink) = stdout.as_mut() {
                                    let _ = sink.write_all(&message).await;
                                }
                            }
                            Ok(LogOutput::StdErr { message }) => {
                                if let Some(sink) = stderr.as_mut() {
                                    let _ = sink.write_all(&message).await;
                                }
                            }
                            Ok(_) => {}
                            Err(err) => {
                                warn!(error = %err, "exec output stream error");
                                break;
                            }
                        }
                    }
                }))
            }
            StartExecResults::Detached => None,
        };

        Ok(Box::new(DockerProcess {
            docker: self.docker.clone(),
            exec_id,
            pump: Mutex::new(pump),
        }))
    }

    /// Run a command, returning its exit status and captured stdout.
    pub(crate) async fn exec_capture(
        &self,
        cmd: Vec<String>,
        stdin: Option<Bytes>,
    ) -> RuntimeResult<(i32, Vec<u8>)> {
        let has_stdin = stdin.is_some();
        let stdout = SharedBuffer::new();
        let io = ProcessIo {
            stdin,
            stdout: Some(stdout.sink()),
            stderr: None,
        };

        let exec = self
            .docker
            .create_exec(
                &self.name,
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdin: Some(has_stdin),
                    attach_stdout: Some(true),
                    attach_stderr: Some(false),
                    ..Default::default()
                },
            )
            .await
            .map_err(host_err)?;

        let process = self.start_exec_process(exec.id, io).await?;
        let status = process.wait().await?;
        Ok((status, stdout.contents()))
    }
}

#[async_trait]
impl Container for DockerContainer {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    async fn run(&self, spec: ProcessSpec, io: ProcessIo) -> RuntimeResult<Box<dyn Process>> {
        let mut cmd = Vec::with_capacity(spec.args.len() + 1);
        cmd.push(spec.path.clone());
        cmd.extend(spec.args.iter().cloned());

        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let exec = self
            .docker
            .create_exec(
                &self.name,
                CreateExecOptions {
                    cmd: Some(cmd),
                    env: if env.is_empty() { None } else { Some(env) },
                    working_dir: spec.dir.clone(),
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(host_err)?;

        self.start_exec_process(exec.id, io).await
    }

    async fn attach(&self, process_id: &str, io: ProcessIo) -> RuntimeResult<Box<dyn Process>> {
        self.docker.inspect_exec(process_id).await.map_err(|err| {
            RuntimeError::Process(format!("unknown process {process_id}: {err}"))
        })?;

        // Docker cannot replay a running exec's stdio, so a reattached wait
        // recovers the exit status only; completed output comes back via
        // the result property.
        drop(io);

        Ok(Box::new(DockerProcess {
            docker: self.docker.clone(),
            exec_id: process_id.to_string(),
            pump: Mutex::new(None),
        }))
    }

    async fn stop(&self, kill: bool) -> RuntimeResult<()> {
        if kill {
            self.docker
                .kill_container(&self.name, None::<KillContainerOptions<String>>)
                .await
                .map_err(host_err)?;
        } else {
            self.docker
                .stop_container(&self.name, Some(StopContainerOptions { t: 10 }))
                .await
                .map_err(host_err)?;
        }
        Ok(())
    }

    async fn property(&self, name: &str) -> RuntimeResult<Option<String>> {
        let (status, stdout) = self
            .exec_capture(
                vec!["cat".to_string(), format!("{PROPERTY_DIR}/{name}")],
                None,
            )
            .await?;
        if status == 0 {
            Ok(Some(String::from_utf8_lossy(&stdout).into_owned()))
        } else {
            Ok(None)
        }
    }

    async fn set_property(&self, name: &str, value: &str) -> RuntimeResult<()> {
        let script = format!("mkdir -p '{PROPERTY_DIR}' && cat > '{PROPERTY_DIR}/{name}'");
        let (status, _) = self
            .exec_capture(
                vec!["sh".to_string(), "-c".to_string(), script],
                Some(Bytes::copy_from_slice(value.as_bytes())),
            )
            .await?;
        if status != 0 {
            return Err(RuntimeError::Host(format!(
                "failed to persist property {name:?}"
            )));
        }
        Ok(())
    }
}

struct DockerProcess {
    docker: Docker,
    exec_id: String,
    pump: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Process for DockerProcess {
    fn id(&self) -> String {
        self.exec_id.clone()
    }

    async fn wait(&self) -> RuntimeResult<i32> {
        // Drain the io pump first so captured output is complete before the
        // exit status is reported.
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            let _ = pump.await;
        }

        loop {
            let inspect = self
                .docker
                .inspect_exec(&self.exec_id)
                .await
                .map_err(|err| RuntimeError::Process(err.to_string()))?;

            if inspect.running != Some(true) {
                return Ok(inspect.exit_code.unwrap_or(0) as i32);
            }

            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

/// A tree inside the container, streamed over the daemon's tar endpoints.
pub struct DockerVolume {
    container: DockerContainer,
    handle: Handle,
}

#[async_trait]
impl Volume for DockerVolume {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    async fn stream_in(&self, path: &str, content: Bytes) -> RuntimeResult<()> {
        let (status, _) = self
            .container
            .exec_capture(
                vec!["mkdir".to_string(), "-p".to_string(), path.to_string()],
                None,
            )
            .await?;
        if status != 0 {
            return Err(RuntimeError::Stream(format!(
                "failed to create stream destination {path:?}"
            )));
        }

        self.container
            .docker
            .upload_to_container(
                &self.container.name,
                Some(UploadToContainerOptions {
                    path: path.to_string(),
                    ..Default::default()
                }),
                content,
            )
            .await
            .map_err(stream_err)?;
        Ok(())
    }

    async fn stream_out(&self, path: &str) -> RuntimeResult<Bytes> {
        let chunks: Vec<Bytes> = self
            .container
            .docker
            .download_from_container(
                &self.container.name,
                Some(DownloadFromContainerOptions {
                    path: path.to_string(),
                }),
            )
            .try_collect()
            .await
            .map_err(stream_err)?;

        let mut archive = BytesMut::new();
        for chunk in chunks {
            archive.extend_from_slice(&chunk);
        }
        Ok(archive.freeze())
    }
}

/// Dials a worker's Docker daemon over HTTP using the address it
/// registered with.
pub struct DockerDialer;

#[async_trait]
impl WorkerDialer for DockerDialer {
    async fn dial(
        &self,
        info: &WorkerInfo,
    ) -> Result<(Arc<dyn ContainerHost>, Arc<dyn VolumeHost>), RuntimeError> {
        let docker = Docker::connect_with_http(
            &info.container_host_addr,
            120,
            API_DEFAULT_VERSION,
        )
        .map_err(host_err)?;

        let host = Arc::new(DockerHost::new(docker, info.resource_types.clone()));
        Ok((host.clone(), host))
    }
}

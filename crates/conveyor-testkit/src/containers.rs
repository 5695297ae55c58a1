//! Fakes for the container-host traits.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use conveyor_core::runtime::{Container, Process, ProcessIo, ProcessSpec, Volume};
use conveyor_core::{Handle, RuntimeError, RuntimeResult};

/// How a [`FakeProcess`] behaves when waited on.
#[derive(Debug, Clone)]
pub enum WaitBehavior {
    Exit(i32),
    Error(String),
    /// Never resolves; used to exercise abort paths.
    Block,
}

/// A scripted process.
pub struct FakeProcess {
    id: String,
    behavior: Mutex<WaitBehavior>,
    wait_calls: Mutex<usize>,
}

impl FakeProcess {
    pub fn exiting(id: &str, status: i32) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            behavior: Mutex::new(WaitBehavior::Exit(status)),
            wait_calls: Mutex::new(0),
        })
    }

    pub fn blocking(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            behavior: Mutex::new(WaitBehavior::Block),
            wait_calls: Mutex::new(0),
        })
    }

    pub fn failing(id: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            behavior: Mutex::new(WaitBehavior::Error(message.to_string())),
            wait_calls: Mutex::new(0),
        })
    }

    pub fn set_behavior(&self, behavior: WaitBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn wait_count(&self) -> usize {
        *self.wait_calls.lock()
    }
}

#[async_trait]
impl Process for FakeProcess {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn wait(&self) -> RuntimeResult<i32> {
        *self.wait_calls.lock() += 1;
        let behavior = self.behavior.lock().clone();
        match behavior {
            WaitBehavior::Exit(status) => Ok(status),
            WaitBehavior::Error(message) => Err(RuntimeError::Process(message)),
            WaitBehavior::Block => std::future::pending().await,
        }
    }
}

/// Wraps a shared [`FakeProcess`] so it can be boxed as `dyn Process` while
/// the original `Arc` stays available for the test to keep asserting on
/// (e.g. `wait_count()`).
struct ArcProcess(Arc<FakeProcess>);

#[async_trait]
impl Process for ArcProcess {
    fn id(&self) -> String {
        self.0.id()
    }

    async fn wait(&self) -> RuntimeResult<i32> {
        self.0.wait().await
    }
}

/// A scripted container. `run` and `attach` write the configured stdout and
/// stderr bytes into the supplied io and hand back the configured process.
pub struct FakeContainer {
    handle: Handle,
    properties: Mutex<HashMap<String, String>>,
    property_writes: Mutex<Vec<(String, String)>>,
    set_property_error: Mutex<Option<String>>,
    script_stdout: Mutex<Vec<u8>>,
    script_stderr: Mutex<Vec<u8>>,
    process: Mutex<Option<Arc<FakeProcess>>>,
    run_error: Mutex<Option<String>>,
    runs: Mutex<Vec<ProcessSpec>>,
    attaches: Mutex<Vec<String>>,
    stdin_writes: Mutex<Vec<Bytes>>,
    stops: Mutex<Vec<bool>>,
    stop_error: Mutex<Option<String>>,
}

impl FakeContainer {
    pub fn new() -> Self {
        Self::with_handle(Handle::new().as_str())
    }

    pub fn with_handle(handle: &str) -> Self {
        Self {
            handle: Handle::from(handle),
            properties: Mutex::new(HashMap::new()),
            property_writes: Mutex::new(Vec::new()),
            set_property_error: Mutex::new(None),
            script_stdout: Mutex::new(b"{}".to_vec()),
            script_stderr: Mutex::new(Vec::new()),
            process: Mutex::new(None),
            run_error: Mutex::new(None),
            runs: Mutex::new(Vec::new()),
            attaches: Mutex::new(Vec::new()),
            stdin_writes: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
            stop_error: Mutex::new(None),
        }
    }

    /// Seed a property, as if a prior run had persisted it.
    pub fn set_property_value(&self, name: &str, value: &str) {
        self.properties
            .lock()
            .insert(name.to_string(), value.to_string());
    }

    pub fn set_script_stdout(&self, stdout: &str) {
        *self.script_stdout.lock() = stdout.as_bytes().to_vec();
    }

    pub fn set_script_stderr(&self, stderr: &str) {
        *self.script_stderr.lock() = stderr.as_bytes().to_vec();
    }

    pub fn set_process(&self, process: Arc<FakeProcess>) {
        *self.process.lock() = Some(process);
    }

    /// Make both `run` and `attach` fail.
    pub fn set_run_error(&self, message: &str) {
        *self.run_error.lock() = Some(message.to_string());
    }

    pub fn set_stop_error(&self, message: &str) {
        *self.stop_error.lock() = Some(message.to_string());
    }

    pub fn set_set_property_error(&self, message: &str) {
        *self.set_property_error.lock() = Some(message.to_string());
    }

    pub fn runs(&self) -> Vec<ProcessSpec> {
        self.runs.lock().clone()
    }

    pub fn attaches(&self) -> Vec<String> {
        self.attaches.lock().clone()
    }

    /// Every `set_property` call, in order.
    pub fn property_writes(&self) -> Vec<(String, String)> {
        self.property_writes.lock().clone()
    }

    pub fn stdin_writes(&self) -> Vec<Bytes> {
        self.stdin_writes.lock().clone()
    }

    pub fn stops(&self) -> Vec<bool> {
        self.stops.lock().clone()
    }

    async fn feed_io(&self, io: ProcessIo) -> RuntimeResult<()> {
        if let Some(stdin) = io.stdin {
            self.stdin_writes.lock().push(stdin);
        }
        if let Some(mut stdout) = io.stdout {
            let bytes = self.script_stdout.lock().clone();
            stdout.write_all(&bytes).await?;
        }
        if let Some(mut stderr) = io.stderr {
            let bytes = self.script_stderr.lock().clone();
            stderr.write_all(&bytes).await?;
        }
        Ok(())
    }

    fn process(&self) -> Arc<FakeProcess> {
        self.process
            .lock()
            .get_or_insert_with(|| FakeProcess::exiting("fake-process", 0))
            .clone()
    }
}

impl Default for FakeContainer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Container for FakeContainer {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    async fn run(&self, spec: ProcessSpec, io: ProcessIo) -> RuntimeResult<Box<dyn Process>> {
        self.runs.lock().push(spec);
        if let Some(message) = self.run_error.lock().clone() {
            return Err(RuntimeError::Process(message));
        }
        self.feed_io(io).await?;
        Ok(Box::new(ArcProcess(self.process())))
    }

    async fn attach(&self, process_id: &str, io: ProcessIo) -> RuntimeResult<Box<dyn Process>> {
        self.attaches.lock().push(process_id.to_string());
        if let Some(message) = self.run_error.lock().clone() {
            return Err(RuntimeError::Process(message));
        }
        self.feed_io(io).await?;
        Ok(Box::new(ArcProcess(self.process())))
    }

    async fn stop(&self, kill: bool) -> RuntimeResult<()> {
        self.stops.lock().push(kill);
        match self.stop_error.lock().clone() {
            Some(message) => Err(RuntimeError::Host(message)),
            None => Ok(()),
        }
    }

    async fn property(&self, name: &str) -> RuntimeResult<Option<String>> {
        Ok(self.properties.lock().get(name).cloned())
    }

    async fn set_property(&self, name: &str, value: &str) -> RuntimeResult<()> {
        if let Some(message) = self.set_property_error.lock().clone() {
            return Err(RuntimeError::Host(message));
        }
        self.property_writes
            .lock()
            .push((name.to_string(), value.to_string()));
        self.properties
            .lock()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}

/// A scripted volume recording its stream calls.
pub struct FakeVolume {
    handle: Handle,
    stream_ins: Mutex<Vec<(String, Bytes)>>,
    stream_outs: Mutex<Vec<String>>,
    stream_out_results: Mutex<HashMap<String, Bytes>>,
    stream_in_error: Mutex<Option<String>>,
    stream_out_error: Mutex<Option<String>>,
}

impl FakeVolume {
    pub fn new() -> Self {
        Self {
            handle: Handle::new(),
            stream_ins: Mutex::new(Vec::new()),
            stream_outs: Mutex::new(Vec::new()),
            stream_out_results: Mutex::new(HashMap::new()),
            stream_in_error: Mutex::new(None),
            stream_out_error: Mutex::new(None),
        }
    }

    pub fn set_stream_out(&self, path: &str, content: Bytes) {
        self.stream_out_results
            .lock()
            .insert(path.to_string(), content);
    }

    pub fn set_stream_in_error(&self, message: &str) {
        *self.stream_in_error.lock() = Some(message.to_string());
    }

    pub fn set_stream_out_error(&self, message: &str) {
        *self.stream_out_error.lock() = Some(message.to_string());
    }

    pub fn stream_ins(&self) -> Vec<(String, Bytes)> {
        self.stream_ins.lock().clone()
    }

    pub fn stream_outs(&self) -> Vec<String> {
        self.stream_outs.lock().clone()
    }
}

impl Default for FakeVolume {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Volume for FakeVolume {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    async fn stream_in(&self, path: &str, content: Bytes) -> RuntimeResult<()> {
        if let Some(message) = self.stream_in_error.lock().clone() {
            return Err(RuntimeError::Stream(message));
        }
        self.stream_ins.lock().push((path.to_string(), content));
        Ok(())
    }

    async fn stream_out(&self, path: &str) -> RuntimeResult<Bytes> {
        if let Some(message) = self.stream_out_error.lock().clone() {
            return Err(RuntimeError::Stream(message));
        }
        self.stream_outs.lock().push(path.to_string());
        Ok(self
            .stream_out_results
            .lock()
            .get(path)
            .cloned()
            .unwrap_or_default())
    }
}

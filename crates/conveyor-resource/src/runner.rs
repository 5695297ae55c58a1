//! The shared script state machine: memoize, reattach, or spawn; then race
//! the wait against the abort signal.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use conveyor_core::io::{SharedBuffer, TeeSink};
use conveyor_core::runtime::{Container, OutputSink, ProcessIo, ProcessSpec, Signal};

use crate::error::{ResourceError, ScriptFailure};

// The property keys are a compatibility surface shared with containers
// created by earlier deployments; renaming them would strand in-flight work.

/// Property holding the opaque id of the running script, persisted before
/// the run is awaited so a restart can reattach.
pub const PROCESS_PROPERTY: &str = "concourse:resource-process";

/// Property holding the exact stdout bytes of a completed run. The stored
/// text is what downstream invocations see; it is never re-serialized.
pub const RESULT_PROPERTY: &str = "concourse:resource-result";

/// Run a resource script to completion and return its raw stdout.
///
/// When `recoverable` is set, a prior result short-circuits everything, a
/// persisted process id is reattached instead of spawning, and both the
/// process id and the final stdout are persisted as container properties.
/// `ready` fires once the decision is made and the process (if any) is live.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_script(
    container: &dyn Container,
    path: &str,
    args: Vec<String>,
    request: &impl serde::Serialize,
    stderr_sink: Option<OutputSink>,
    mut signals: mpsc::Receiver<Signal>,
    ready: oneshot::Sender<()>,
    recoverable: bool,
) -> Result<String, ResourceError> {
    if recoverable {
        if let Some(result) = container.property(RESULT_PROPERTY).await? {
            debug!(handle = %container.handle(), "returning memoized resource result");
            let _ = ready.send(());
            return Ok(result);
        }
    }

    let stdout = SharedBuffer::new();
    let stderr = SharedBuffer::new();

    let request_bytes =
        serde_json::to_vec(request).map_err(ResourceError::MalformedRequest)?;

    let io = ProcessIo {
        stdin: Some(Bytes::from(request_bytes)),
        stdout: Some(stdout.sink()),
        stderr: Some(Box::new(TeeSink::new(stderr.clone(), stderr_sink))),
    };

    let existing = if recoverable {
        container.property(PROCESS_PROPERTY).await?
    } else {
        None
    };

    let process = match existing {
        Some(process_id) => {
            debug!(handle = %container.handle(), process = %process_id, "reattaching to resource script");
            container.attach(&process_id, io).await?
        }
        None => {
            let spec = ProcessSpec {
                path: path.to_string(),
                args: args.clone(),
                ..ProcessSpec::default()
            };
            let process = container.run(spec, io).await?;
            if recoverable {
                container
                    .set_property(PROCESS_PROPERTY, &process.id())
                    .await?;
            }
            process
        }
    };

    let _ = ready.send(());

    tokio::select! {
        status = process.wait() => {
            let status = status?;
            if status != 0 {
                return Err(ResourceError::ScriptFailed(ScriptFailure {
                    path: path.to_string(),
                    args,
                    exit_status: status,
                    stderr: stderr.to_string_lossy(),
                }));
            }

            let output = stdout.to_string_lossy();
            if recoverable {
                container.set_property(RESULT_PROPERTY, &output).await?;
            }
            Ok(output)
        }
        _ = signals.recv() => {
            // Only the container is stopped; termination propagates to the
            // script from there. The stop result is kept out of the return
            // value so abort stays one sentinel.
            if let Err(err) = container.stop(false).await {
                warn!(handle = %container.handle(), error = %err, "container stop failed during abort");
            }
            Err(ResourceError::Aborted)
        }
    }
}

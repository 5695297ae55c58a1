//! Recording fakes for the Conveyor boundary traits.
//!
//! Every fake records its calls behind `Arc<Mutex<...>>` so tests can hand
//! a clone across a trait boundary and still assert on what happened, and
//! returns canned values configured up front. Nothing here touches a real
//! database, container host, or network.

pub mod containers;
pub mod scheduler;
pub mod stores;
pub mod workers;

pub use containers::{FakeContainer, FakeProcess, FakeVolume, WaitBehavior};
pub use scheduler::{FakeLauncher, FakeThrottle};
pub use stores::{FakeBuildStore, FakeContainerStore, FakeRegistry, FakeTeamStore};
pub use workers::{FakeWorker, FakeWorkerProvider, LookupBehavior};

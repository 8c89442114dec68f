//! Operation admission and execution.
//!
//! The pipeline is split across two roles that only meet in the shared store:
//!
//! 1. **Gateway** (`gateway`): validates, admits atomically, enqueues, and
//!    for sync operations waits on the result channel
//! 2. **Dispatcher** (`dispatcher`): drains the queues and supervises one
//!    execution task per operation
//! 3. **Store views** (`status`, `counter`, `queues`, `result_channel`):
//!    typed access to the persisted key layout
//! 4. **Background workers** (`worker`): tick-driven loop the dispatcher runs on

pub mod config;
pub mod counter;
pub mod dispatcher;
pub mod executor;
pub mod gateway;
pub mod operation;
pub mod queues;
pub mod result_channel;
pub mod status;
pub mod worker;

// Re-export key types for convenient access.
pub use config::ServiceConfig;
pub use counter::ActiveRequestCounter;
pub use dispatcher::{DispatchTask, Dispatcher};
pub use executor::{OperationExecutor, SimulatedExecutor};
pub use gateway::{AsyncAccepted, GatewaySnapshot, SubmissionGateway, SyncOutcome};
pub use operation::OperationError;
pub use queues::{Dequeued, OperationQueues, QueueDepths};
pub use result_channel::ResultChannel;
pub use status::StatusStore;
pub use worker::{BackgroundRunnable, BackgroundWorker};

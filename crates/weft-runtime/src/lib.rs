//! Reactive render runtime over the weft state tree.
//!
//! Application state lives in a [`Store`]. Components are mounted into a
//! [`Runtime`]; their render callbacks read state through a [`Traced`]
//! accessor, and every path they read becomes a subscription. Writes to the
//! store are reported by the tree, matched against subscriptions by the
//! [`Dispatcher`], and re-run the affected renders once per scheduled flush.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use serde_json::{json, Value};
//! use weft_runtime::{init_fn, render_fn, NullElement, Runtime, RuntimeConfig};
//! use weft_state::path;
//!
//! let (runtime, frames) =
//!     Runtime::with_frame_scheduler(RuntimeConfig::default(), json!({"count": 0}));
//!
//! let id = runtime.mount_with(
//!     "counter",
//!     Rc::new(NullElement),
//!     Value::Null,
//!     init_fn(|_| Ok(render_fn(|scope| {
//!         let _count = scope.state.value("count");
//!         Ok(())
//!     }))),
//! );
//!
//! runtime.store().set(&path!("count"), json!(1)).unwrap();
//! frames.run_until_idle();
//!
//! let report = runtime.last_flush().unwrap();
//! assert_eq!(report.invoked, vec![id]);
//! ```

mod boundary;
mod component;
mod config;
mod debug;
mod dispatch;
mod error;
mod lifecycle;
mod registry;
mod scheduler;
mod store;
mod traced;

pub use boundary::{ErrorContext, FailedStage};
pub use component::{
    init_fn, render_fn, Binder, BoxError, ComponentRegistry, Element, Factory, InitFn, InitScope,
    InstanceId, NullElement, Phase, RenderFn, RenderScope,
};
pub use config::RuntimeConfig;
pub use debug::{DebugRegistry, DebugSnapshot, ErrorSnapshot};
pub use dispatch::{DispatchStats, Dispatcher, FlushReport, PendingBatch};
pub use error::{RuntimeError, RuntimeResult};
pub use lifecycle::{InstanceInfo, Runtime, WeakRuntime};
pub use registry::{SubscriberId, SubscriptionRegistry};
#[cfg(feature = "tokio")]
pub use scheduler::LocalTaskScheduler;
pub use scheduler::{FrameScheduler, Scheduler, Task, TaskHandle, MAX_IDLE_FRAMES};
pub use store::Store;
pub use traced::{AccessMode, Read, ReadLog, Traced};

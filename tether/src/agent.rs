//! The library root: pools, queue, workers, and the transport handle.

use crate::action::ActionItem;
use crate::alarm::AlarmItem;
use crate::config;
use crate::dispatch;
use crate::identity;
use crate::pool::{Named, Pool};
use crate::queue::{QueueCounts, RequestQueue};
use crate::telemetry::TelemetryItem;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tether_types::limits::{
    ACTION_MAX, ACTION_STACK_MAX, ALARM_MAX, ALARM_STACK_MAX, QUEUE_MAX, TELEMETRY_MAX,
    TELEMETRY_STACK_MAX,
};
use tether_types::{
    ActionRequest, Convert, DurationMs, FromValue, ItemInfo, LogCallback, LogLevel, OptionStore,
    Plugin, Status, Value, validate_name,
};
use tokio_util::sync::CancellationToken;

/// Shared internals behind every [`Agent`] clone and every worker task.
///
/// Each concern sits behind its own lock; no lock is held across an await
/// or while handler code runs.
pub(crate) struct Shared {
    pub(crate) device_id: String,
    pub(crate) plugin: Arc<dyn Plugin>,
    pub(crate) options: Mutex<OptionStore>,
    pub(crate) telemetry: Mutex<Pool<TelemetryItem>>,
    pub(crate) alarms: Mutex<Pool<AlarmItem>>,
    pub(crate) actions: Mutex<Pool<ActionItem>>,
    pub(crate) queue: RequestQueue,
    pub(crate) logger: Mutex<LoggerState>,
    pub(crate) quit: CancellationToken,
    pub(crate) workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

pub(crate) struct LoggerState {
    pub(crate) callback: Option<Arc<LogCallback>>,
    pub(crate) level: LogLevel,
}

/// Configures and initializes an [`Agent`].
pub struct AgentBuilder {
    plugin: Arc<dyn Plugin>,
    data_dir: PathBuf,
    config_path: Option<PathBuf>,
    workers: usize,
    queue_depth: usize,
    pool_stack_max: Option<usize>,
    pool_max: Option<usize>,
    log_callback: Option<Arc<LogCallback>>,
    log_level: LogLevel,
}

impl AgentBuilder {
    fn new(plugin: Arc<dyn Plugin>) -> Self {
        Self {
            plugin,
            data_dir: PathBuf::from("."),
            config_path: None,
            workers: 2,
            queue_depth: QUEUE_MAX,
            pool_stack_max: None,
            pool_max: None,
            log_callback: None,
            log_level: LogLevel::Info,
        }
    }

    /// Directory holding the device-identity file and the default
    /// configuration file. Defaults to the working directory.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Explicit configuration file path. The file must exist; the default
    /// path under the data directory is optional instead.
    #[must_use]
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Number of dispatch workers. Zero selects single-thread mode, where
    /// the application drives dispatch through [`Agent::iterate`].
    /// Defaults to 2.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Number of request-queue slots. Defaults to
    /// [`QUEUE_MAX`](tether_types::limits::QUEUE_MAX).
    #[must_use]
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Override every pool's inline partition size and hard ceiling.
    /// Defaults come from [`limits`](tether_types::limits).
    #[must_use]
    pub fn pool_capacity(mut self, stack_max: usize, max: usize) -> Self {
        self.pool_stack_max = Some(stack_max);
        self.pool_max = Some(max);
        self
    }

    /// Application log sink.
    #[must_use]
    pub fn log_callback(mut self, callback: Arc<LogCallback>) -> Self {
        self.log_callback = Some(callback);
        self
    }

    /// Threshold for the application log sink. Defaults to
    /// [`LogLevel::Info`].
    #[must_use]
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Load the device identity and configuration, create the pools and
    /// queue, and spawn the dispatch workers.
    ///
    /// # Errors
    ///
    /// Identity-file and configuration errors propagate
    /// ([`Status::FileOpenFailed`], [`Status::IoError`],
    /// [`Status::ParseError`]).
    pub async fn initialize(self) -> Result<Agent, Status> {
        let device_id = identity::load_or_create(&self.data_dir).await?;

        let mut options = OptionStore::new();
        match &self.config_path {
            Some(path) => config::load_into(&mut options, path, true).await?,
            None => {
                let default_path = self.data_dir.join(config::CONFIG_FILE);
                config::load_into(&mut options, &default_path, false).await?;
            }
        }

        let stack_override = self.pool_stack_max;
        let max_override = self.pool_max;
        let stack_max = move |per_pool: usize| stack_override.unwrap_or(per_pool);
        let max = move |per_pool: usize| max_override.unwrap_or(per_pool);
        let shared = Arc::new(Shared {
            device_id,
            plugin: self.plugin,
            options: Mutex::new(options),
            telemetry: Mutex::new(Pool::new(stack_max(TELEMETRY_STACK_MAX), max(TELEMETRY_MAX))),
            alarms: Mutex::new(Pool::new(stack_max(ALARM_STACK_MAX), max(ALARM_MAX))),
            actions: Mutex::new(Pool::new(stack_max(ACTION_STACK_MAX), max(ACTION_MAX))),
            queue: RequestQueue::new(self.queue_depth),
            logger: Mutex::new(LoggerState {
                callback: self.log_callback,
                level: self.log_level,
            }),
            quit: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        });

        if self.workers > 0 {
            let mut handles = Vec::with_capacity(self.workers);
            for worker in 0..self.workers {
                let shared = Arc::clone(&shared);
                handles.push(tokio::spawn(dispatch::worker_loop(shared, worker)));
            }
            *crate::lock(&shared.workers) = handles;
        }

        tracing::info!(
            device_id = %shared.device_id,
            plugin = shared.plugin.name(),
            workers = self.workers,
            "agent initialized"
        );
        Ok(Agent { inner: shared })
    }
}

/// The device agent.
///
/// A cheaply cloneable handle over the shared engine; clones address the
/// same pools, queue, and transport. One agent exists per `initialize`;
/// [`terminate`](Agent::terminate) tears it down.
#[derive(Clone)]
pub struct Agent {
    pub(crate) inner: Arc<Shared>,
}

impl Agent {
    /// Start configuring an agent over the given transport.
    pub fn builder(plugin: Arc<dyn Plugin>) -> AgentBuilder {
        AgentBuilder::new(plugin)
    }

    /// The persistent device identifier.
    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    /// Establish the cloud session through the plugin. A zero `timeout`
    /// waits as long as the plugin takes.
    ///
    /// # Errors
    ///
    /// [`Status::TimedOut`] when the bound elapses; otherwise the plugin's
    /// error.
    pub async fn connect(&self, timeout: DurationMs) -> Result<(), Status> {
        bounded(timeout, self.inner.plugin.connect(timeout)).await
    }

    /// Tear the cloud session down through the plugin.
    ///
    /// # Errors
    ///
    /// As [`connect`](Agent::connect).
    pub async fn disconnect(&self, timeout: DurationMs) -> Result<(), Status> {
        bounded(timeout, self.inner.plugin.disconnect(timeout)).await
    }

    /// Accept a remote invocation into the request queue.
    ///
    /// Never blocks beyond the queue lock: a full queue reports
    /// [`Status::Full`] instead of waiting for space. Acceptance order is
    /// dispatch order.
    ///
    /// # Errors
    ///
    /// [`Status::BadRequest`] for an invalid action name, [`Status::Full`]
    /// when every slot is taken, [`Status::NotInitialized`] once shutdown
    /// has begun.
    pub fn request_execute(&self, request: ActionRequest) -> Result<(), Status> {
        if self.inner.quit.is_cancelled() {
            return Err(Status::NotInitialized);
        }
        validate_name(&request.action)?;
        self.inner.queue.enqueue(request)
    }

    /// Single-thread mode tick: dispatch at most one waiting request, then
    /// run one plugin iteration.
    ///
    /// # Errors
    ///
    /// The plugin iteration's error.
    pub async fn iterate(&self, timeout: DurationMs) -> Result<(), Status> {
        dispatch::dispatch_one(&self.inner).await;
        self.inner.plugin.iterate(timeout).await
    }

    /// Current request-queue occupancy.
    pub fn queue_counts(&self) -> QueueCounts {
        self.inner.queue.counts()
    }

    /// Set a process-wide option, addressable by dotted path.
    ///
    /// # Errors
    ///
    /// As [`OptionStore::set`].
    pub fn option_set(&self, name: &str, value: impl Into<Value>) -> Result<(), Status> {
        crate::lock(&self.inner.options).set(name, value)
    }

    /// Typed read of a process-wide option.
    ///
    /// # Errors
    ///
    /// As [`OptionStore::get`].
    pub fn option_get<T: FromValue>(&self, name: &str, convert: Convert) -> Result<T, Status> {
        crate::lock(&self.inner.options).get(name, convert)
    }

    /// Read a process-wide option's raw payload.
    ///
    /// # Errors
    ///
    /// As [`OptionStore::get_raw`].
    pub fn option_get_raw(&self, name: &str, convert: Convert) -> Result<Vec<u8>, Status> {
        crate::lock(&self.inner.options)
            .get_raw(name, convert)
            .map(<[u8]>::to_vec)
    }

    /// Replace the application log sink.
    pub fn log_callback_set(&self, callback: Option<Arc<LogCallback>>) {
        crate::lock(&self.inner.logger).callback = callback;
    }

    /// Set the application log sink's threshold.
    pub fn log_level_set(&self, level: LogLevel) {
        crate::lock(&self.inner.logger).level = level;
    }

    /// Emit a log message: always to `tracing`, and to the registered
    /// callback when `level` passes the threshold.
    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => tracing::error!(target: "tether::app", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "tether::app", "{message}"),
            LogLevel::Info => tracing::info!(target: "tether::app", "{message}"),
            LogLevel::Debug => tracing::debug!(target: "tether::app", "{message}"),
            LogLevel::Trace => tracing::trace!(target: "tether::app", "{message}"),
        }
        let sink = {
            let logger = crate::lock(&self.inner.logger);
            (level <= logger.level)
                .then(|| logger.callback.clone())
                .flatten()
        };
        if let Some(callback) = sink {
            callback(level, message);
        }
    }

    /// Retry every item stuck in a pending registration state.
    ///
    /// A plugin refusal leaves an item register-pending or
    /// deregister-pending: local intent recorded, remote not confirmed.
    /// Call this after a reconnect to replay that intent. Items that fail
    /// again simply stay pending; the sweep is safe to repeat.
    pub async fn retry_pending(&self) {
        use crate::pool::RegistrationState as S;

        let pending = |states: &[(String, S)]| -> (Vec<String>, Vec<String>) {
            let mut registers = Vec::new();
            let mut deregisters = Vec::new();
            for (name, state) in states {
                match state {
                    S::RegisterPending => registers.push(name.clone()),
                    S::DeregisterPending => deregisters.push(name.clone()),
                    _ => {}
                }
            }
            (registers, deregisters)
        };

        let states: Vec<(String, S)> = {
            let pool = crate::lock(&self.inner.telemetry);
            (0..pool.count())
                .map(|i| {
                    let item = pool.item(i);
                    (item.name().to_owned(), item.registration.state())
                })
                .collect()
        };
        let (registers, deregisters) = pending(&states);
        for name in registers {
            let _ = self
                .telemetry_register(&crate::TelemetryHandle::new(&name))
                .await;
        }
        for name in deregisters {
            let _ = self
                .telemetry_deregister(&crate::TelemetryHandle::new(&name))
                .await;
        }

        let states: Vec<(String, S)> = {
            let pool = crate::lock(&self.inner.actions);
            (0..pool.count())
                .map(|i| {
                    let item = pool.item(i);
                    (item.name().to_owned(), item.registration.state())
                })
                .collect()
        };
        let (registers, deregisters) = pending(&states);
        for name in registers {
            let _ = self.action_register(&crate::ActionHandle::new(&name)).await;
        }
        for name in deregisters {
            let _ = self
                .action_deregister(&crate::ActionHandle::new(&name))
                .await;
        }

        let states: Vec<(String, S)> = {
            let pool = crate::lock(&self.inner.alarms);
            (0..pool.count())
                .map(|i| {
                    let item = pool.item(i);
                    (item.name().to_owned(), item.registration.state())
                })
                .collect()
        };
        let (registers, deregisters) = pending(&states);
        for name in registers {
            let _ = self.alarm_register(&crate::AlarmHandle::new(&name)).await;
        }
        for name in deregisters {
            let _ = self.alarm_deregister(&crate::AlarmHandle::new(&name)).await;
        }
    }

    /// Shut the agent down: stop accepting requests, fail everything still
    /// waiting, join the workers, deregister every registered item, and
    /// disconnect the plugin.
    ///
    /// In-flight handlers run to completion; with a nonzero `timeout` the
    /// join is bounded and workers still draining at the bound keep
    /// running detached until they finish on their own.
    ///
    /// # Errors
    ///
    /// [`Status::TimedOut`] when workers were still draining at the bound.
    /// Teardown of items and the plugin happens regardless.
    pub async fn terminate(&self, timeout: DurationMs) -> Result<(), Status> {
        tracing::info!(device_id = %self.inner.device_id, "agent terminating");
        self.inner.quit.cancel();
        dispatch::fail_pending(&self.inner).await;

        let handles: Vec<_> = crate::lock(&self.inner.workers).drain(..).collect();
        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        let timed_out = if timeout.is_zero() {
            join_all.await;
            false
        } else {
            tokio::time::timeout(timeout.to_std(), join_all).await.is_err()
        };

        sweep_pool(&self.inner.plugin, &self.inner.telemetry, TelemetryItem::info).await;
        sweep_pool(&self.inner.plugin, &self.inner.actions, ActionItem::info).await;
        sweep_pool(&self.inner.plugin, &self.inner.alarms, AlarmItem::info).await;

        if let Err(e) = self.inner.plugin.disconnect(DurationMs::ZERO).await {
            tracing::warn!(error = %e, "plugin disconnect failed during terminate");
        }

        if timed_out {
            tracing::warn!("workers still draining at terminate timeout");
            Err(Status::TimedOut)
        } else {
            Ok(())
        }
    }
}

/// Await `operation`, bounding it when `timeout` is nonzero.
async fn bounded<F>(timeout: DurationMs, operation: F) -> Result<(), Status>
where
    F: Future<Output = Result<(), Status>>,
{
    if timeout.is_zero() {
        operation.await
    } else {
        tokio::time::timeout(timeout.to_std(), operation)
            .await
            .map_err(|_| Status::TimedOut)?
    }
}

/// Deregister every still-registered item in a pool (best-effort), then
/// release every slot.
async fn sweep_pool<T, F>(plugin: &Arc<dyn Plugin>, pool: &Mutex<Pool<T>>, info: F)
where
    T: Named + HasRegistration,
    F: Fn(&T) -> ItemInfo,
{
    let infos: Vec<ItemInfo> = {
        let pool = crate::lock(pool);
        (0..pool.count())
            .filter(|&i| pool.item(i).registration().is_registered())
            .map(|i| info(pool.item(i)))
            .collect()
    };
    for item in infos {
        if let Err(e) = plugin.deregister(&item).await {
            tracing::warn!(item = %item.name, error = %e, "deregister during terminate failed");
        }
    }
    let mut pool = crate::lock(pool);
    while pool.count() > 0 {
        pool.free(0);
    }
}

/// Access to the registration half every pooled item carries.
pub(crate) trait HasRegistration {
    fn registration(&self) -> &crate::pool::Registration;
}

impl HasRegistration for TelemetryItem {
    fn registration(&self) -> &crate::pool::Registration {
        &self.registration
    }
}

impl HasRegistration for ActionItem {
    fn registration(&self) -> &crate::pool::Registration {
        &self.registration
    }
}

impl HasRegistration for AlarmItem {
    fn registration(&self) -> &crate::pool::Registration {
        &self.registration
    }
}

//! Actions: declared parameters, handlers, and request validation.

use crate::agent::Agent;
use crate::pool::{Named, Registration};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tether_types::limits::PARAMETER_MAX;
use tether_types::{
    ActionRequest, Convert, Direction, DurationMs, FromValue, ItemInfo, OptionStore,
    ParameterDecl, Status, Value, ValueKind, validate_name,
};

/// An in-process action handler.
///
/// Object-safe so actions can store any handler as `Arc<dyn
/// ActionHandler>`. The handler reads its inputs from the request and
/// writes results back with [`ActionRequest::set_param`]; bindings it adds
/// beyond the declaration are returned as extra `Out` parameters. The
/// returned status becomes the request's completion status.
///
/// Handlers may call agent APIs, but must not call `terminate`.
pub trait ActionHandler: Send + Sync {
    /// Handle one request.
    fn call<'a>(
        &'a self,
        request: &'a mut ActionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), Status>> + Send + 'a>>;
}

/// Adapter turning a plain synchronous closure into an [`ActionHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(&mut ActionRequest) -> Result<(), Status> + Send + Sync,
{
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ActionHandler for FnHandler<F>
where
    F: Fn(&mut ActionRequest) -> Result<(), Status> + Send + Sync,
{
    fn call<'a>(
        &'a self,
        request: &'a mut ActionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), Status>> + Send + 'a>> {
        let result = (self.0)(request);
        Box::pin(std::future::ready(result))
    }
}

/// What runs when a request reaches an action.
#[derive(Clone)]
pub(crate) enum Handler {
    /// Nothing bound yet; dispatch fails the request.
    None,
    /// An in-process handler.
    Callback(Arc<dyn ActionHandler>),
    /// An external command at this path, invoked per the marshalling
    /// grammar.
    Command(PathBuf),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::None => f.write_str("None"),
            Handler::Callback(_) => f.write_str("Callback(..)"),
            Handler::Command(path) => f.debug_tuple("Command").field(path).finish(),
        }
    }
}

/// Per-action behavior flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionFlags {
    /// Serialize concurrent invocations of this action behind a per-action
    /// lock.
    pub exclusive: bool,
    /// Fire-and-forget: spawn the external command without waiting for it.
    pub no_return: bool,
}

/// A pooled action.
pub(crate) struct ActionItem {
    name: String,
    pub(crate) decls: Vec<ParameterDecl>,
    pub(crate) handler: Handler,
    pub(crate) flags: ActionFlags,
    pub(crate) time_limit: Option<DurationMs>,
    /// Present iff the action is exclusive. Cloned by dispatch so the lock
    /// survives the item being freed mid-request.
    pub(crate) exclusive_gate: Option<Arc<tokio::sync::Mutex<()>>>,
    pub(crate) registration: Registration,
    pub(crate) options: OptionStore,
}

impl ActionItem {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            decls: Vec::new(),
            handler: Handler::None,
            flags: ActionFlags::default(),
            time_limit: None,
            exclusive_gate: None,
            registration: Registration::new(),
            options: OptionStore::new(),
        }
    }

    pub(crate) fn info(&self) -> ItemInfo {
        ItemInfo::action(self.name.clone(), self.decls.clone())
    }
}

impl Named for ActionItem {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Opaque reference to a pooled action, addressed by name.
#[derive(Debug, Clone)]
pub struct ActionHandle {
    name: Arc<str>,
}

impl ActionHandle {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
        }
    }

    /// The action's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Check a request against an action's declaration, coercing bound values
/// to their declared kinds in place.
///
/// On failure the request must not run; the error carries the diagnostic
/// for the completion payload.
pub(crate) fn validate_request(
    decls: &[ParameterDecl],
    request: &mut ActionRequest,
) -> Result<(), (Status, String)> {
    for decl in decls {
        let bound = request
            .params
            .iter_mut()
            .find(|p| p.name == decl.name)
            .and_then(|p| p.value.as_mut());
        match bound {
            None => {
                if decl.direction.requires_input() {
                    return Err((
                        Status::BadRequest,
                        format!("required parameter missing: {}", decl.name),
                    ));
                }
            }
            Some(value) => {
                if decl.direction.accepts_input() && value.kind() != decl.kind {
                    match value.convert(decl.kind) {
                        Ok(coerced) => *value = coerced,
                        Err(_) => {
                            return Err((
                                Status::BadRequest,
                                format!(
                                    "parameter {} expects {}, got {}",
                                    decl.name,
                                    decl.kind,
                                    value.kind()
                                ),
                            ));
                        }
                    }
                }
            }
        }
    }
    for param in &request.params {
        if param.value.is_some() && !decls.iter().any(|d| d.name == param.name) {
            return Err((
                Status::BadRequest,
                format!("unexpected parameter: {}", param.name),
            ));
        }
    }
    Ok(())
}

/// Registering a command handler checks the path up front: a missing file
/// or one without execute permission would otherwise fail only when the
/// first request arrives.
async fn check_executable(path: &Path) -> Result<(), Status> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Status::NotFound),
        Err(_) => return Err(Status::FileOpenFailed),
    };
    if !metadata.is_file() {
        return Err(Status::NotExecutable);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(Status::NotExecutable);
        }
    }
    Ok(())
}

impl Agent {
    /// Allocate an action, or return a handle to the existing one on a
    /// name collision.
    ///
    /// # Errors
    ///
    /// [`Status::BadRequest`] for an invalid name, [`Status::Full`] at the
    /// pool ceiling.
    pub fn action_create(&self, name: &str) -> Result<ActionHandle, Status> {
        validate_name(name)?;
        let mut pool = crate::lock(&self.inner.actions);
        pool.allocate(name, || ActionItem::new(name))?;
        Ok(ActionHandle::new(name))
    }

    /// Append a parameter to the action's declaration.
    ///
    /// Allowed after registration: the change marks the declaration dirty,
    /// and the next [`action_register`](Agent::action_register) call sends
    /// the plugin an update.
    ///
    /// # Errors
    ///
    /// [`Status::BadRequest`] for an invalid or duplicate parameter name,
    /// [`Status::Full`] at [`PARAMETER_MAX`], [`Status::NotFound`] for a
    /// stale handle.
    pub fn action_parameter_add(
        &self,
        handle: &ActionHandle,
        name: &str,
        direction: Direction,
        kind: ValueKind,
    ) -> Result<(), Status> {
        validate_name(name)?;
        let mut pool = crate::lock(&self.inner.actions);
        let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
        let item = pool.item_mut(index);
        if item.decls.len() >= PARAMETER_MAX {
            return Err(Status::Full);
        }
        if item.decls.iter().any(|d| d.name == name) {
            return Err(Status::BadRequest);
        }
        item.decls.push(ParameterDecl::new(name, direction, kind));
        item.registration.mark_dirty();
        Ok(())
    }

    /// The action's registration state. A reconnect handler can sweep
    /// actions left pending by a plugin failure and retry them.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle.
    pub fn action_state(&self, handle: &ActionHandle) -> Result<crate::RegistrationState, Status> {
        let pool = crate::lock(&self.inner.actions);
        let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
        Ok(pool.item(index).registration.state())
    }

    /// Set the action's behavior flags.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle.
    pub fn action_flags_set(&self, handle: &ActionHandle, flags: ActionFlags) -> Result<(), Status> {
        let mut pool = crate::lock(&self.inner.actions);
        let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
        let item = pool.item_mut(index);
        item.flags = flags;
        if flags.exclusive && item.exclusive_gate.is_none() {
            item.exclusive_gate = Some(Arc::new(tokio::sync::Mutex::new(())));
        }
        Ok(())
    }

    /// Override the maximum time an external command may run. `None`
    /// restores the unbounded default.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle.
    pub fn action_time_limit_set(
        &self,
        handle: &ActionHandle,
        limit: Option<DurationMs>,
    ) -> Result<(), Status> {
        let mut pool = crate::lock(&self.inner.actions);
        let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
        pool.item_mut(index).time_limit = limit;
        Ok(())
    }

    /// Set a metadata option on the action.
    ///
    /// # Errors
    ///
    /// As [`OptionStore::set`], plus [`Status::NotFound`] for a stale
    /// handle.
    pub fn action_option_set(
        &self,
        handle: &ActionHandle,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), Status> {
        let mut pool = crate::lock(&self.inner.actions);
        let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
        pool.item_mut(index).options.set(name, value)
    }

    /// Typed read of an action metadata option.
    ///
    /// # Errors
    ///
    /// As [`OptionStore::get`], plus [`Status::NotFound`] for a stale
    /// handle.
    pub fn action_option_get<T: FromValue>(
        &self,
        handle: &ActionHandle,
        name: &str,
        convert: Convert,
    ) -> Result<T, Status> {
        let pool = crate::lock(&self.inner.actions);
        let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
        pool.item(index).options.get(name, convert)
    }

    /// Bind an in-process handler and register the action with the cloud.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle; the plugin's error when it
    /// declines (the action is left register-pending).
    pub async fn action_register_callback(
        &self,
        handle: &ActionHandle,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<(), Status> {
        {
            let mut pool = crate::lock(&self.inner.actions);
            let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
            pool.item_mut(index).handler = Handler::Callback(handler);
        }
        self.action_register(handle).await
    }

    /// Bind an external command and register the action with the cloud.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] / [`Status::NotExecutable`] /
    /// [`Status::FileOpenFailed`] for a bad command path; otherwise as
    /// [`action_register_callback`](Agent::action_register_callback).
    pub async fn action_register_command(
        &self,
        handle: &ActionHandle,
        path: impl Into<PathBuf>,
    ) -> Result<(), Status> {
        let path = path.into();
        check_executable(&path).await?;
        {
            let mut pool = crate::lock(&self.inner.actions);
            let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
            pool.item_mut(index).handler = Handler::Command(path);
        }
        self.action_register(handle).await
    }

    /// Register the action, or send the plugin an update if its
    /// declaration changed since it registered. A no-op on a cleanly
    /// registered action.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle; the plugin's error when it
    /// declines.
    pub async fn action_register(&self, handle: &ActionHandle) -> Result<(), Status> {
        let info = {
            let pool = crate::lock(&self.inner.actions);
            let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
            let item = pool.item(index);
            if !item.registration.register_needs_plugin() {
                return Ok(());
            }
            item.info()
        };
        let outcome = self.inner.plugin.register(&info).await;
        {
            let mut pool = crate::lock(&self.inner.actions);
            if let Some(index) = pool.find(handle.name()) {
                pool.item_mut(index)
                    .registration
                    .complete_register(outcome.is_ok());
            }
        }
        outcome
    }

    /// Deregister the action from the cloud.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle, [`Status::NotInitialized`]
    /// when not registered; the plugin's error when it declines (the
    /// action is left deregister-pending).
    pub async fn action_deregister(&self, handle: &ActionHandle) -> Result<(), Status> {
        let info = {
            let pool = crate::lock(&self.inner.actions);
            let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
            let item = pool.item(index);
            item.registration.begin_deregister()?;
            item.info()
        };
        let outcome = self.inner.plugin.deregister(&info).await;
        {
            let mut pool = crate::lock(&self.inner.actions);
            if let Some(index) = pool.find(handle.name()) {
                pool.item_mut(index)
                    .registration
                    .complete_deregister(outcome.is_ok());
            }
        }
        outcome
    }

    /// Release the action's pool slot, deregistering first (best-effort)
    /// when it is registered.
    ///
    /// # Errors
    ///
    /// [`Status::NotFound`] for a stale handle.
    pub async fn action_free(&self, handle: &ActionHandle) -> Result<(), Status> {
        let info = {
            let pool = crate::lock(&self.inner.actions);
            let index = pool.find(handle.name()).ok_or(Status::NotFound)?;
            let item = pool.item(index);
            item.registration.is_registered().then(|| item.info())
        };
        if let Some(info) = info {
            if let Err(e) = self.inner.plugin.deregister(&info).await {
                tracing::warn!(action = handle.name(), error = %e, "deregister on free failed");
            }
        }
        let mut pool = crate::lock(&self.inner.actions);
        if let Some(index) = pool.find(handle.name()) {
            pool.free(index);
        }
        Ok(())
    }
}

//! Call abstractions returned by generated services, and the service bases
//! they are created from.
//!
//! This module is self-contained apart from its sibling `transport` and
//! `object_parser` modules, so it can be shipped as source next to
//! generated code.

use std::any::{type_name, Any};
use std::fmt;
use std::io;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use futures::channel::oneshot;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, trace, warn};

pub use super::object_parser::{KeyBinding, KeyMap, KeyMaps, ObjectParser};
pub use super::transport::{
    HttpCall, HttpMethod, HttpRequest, HttpRequestInterceptor, HttpResponse,
    HttpResponseInterceptor, HttpTransport, ParameterEncoding, RequestParameters,
    TransportCallback, TransportError, TransportResult,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceCallError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("failed to encode request parameter: {0}")]
    Encoding(Arc<serde_json::Error>),
    #[error("service call has already been started")]
    AlreadyStarted,
    #[error("service call was canceled")]
    Canceled,
    /// The work panicked, or was dropped by its scheduling context before it
    /// could run.
    #[error("service call aborted: {0}")]
    Aborted(String),
}
impl ServiceCallError {
    fn panicked(payload: &(dyn Any + Send)) -> Self {
        ServiceCallError::Aborted(panic_message(payload))
    }
}
impl From<serde_json::Error> for ServiceCallError {
    fn from(e: serde_json::Error) -> Self {
        ServiceCallError::Encoding(Arc::new(e))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}

pub type ServiceCallResult<Payload> = Result<Payload, ServiceCallError>;

/// Lifecycle of a single call object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CallStatus {
    Idle,
    Running,
    Completed,
    Canceled,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking call body must not wedge the call object for everyone else.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere jobs can be sent to run.
pub trait SchedulingContext: Send + Sync {
    fn submit(&self, job: Job);
}

/// Runs every job immediately on the submitting thread.
#[derive(Debug, Default, Copy, Clone)]
pub struct Inline;
impl SchedulingContext for Inline {
    fn submit(&self, job: Job) {
        job()
    }
}

/// A dedicated thread running jobs one at a time, in submission order.
///
/// A panicking job is logged and does not stop the thread. The thread exits
/// once the last handle to it is dropped.
pub struct WorkerThread {
    name: String,
    sender: Mutex<mpsc::Sender<Job>>,
}
impl WorkerThread {
    pub fn spawn(name: impl Into<String>) -> io::Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = name.clone();
        thread::Builder::new().name(name.clone()).spawn(move || {
            for job in receiver {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    error!(worker = %worker, panic = %panic_message(&*payload), "job panicked");
                }
            }
        })?;
        Ok(WorkerThread {
            name,
            sender: Mutex::new(sender),
        })
    }
}
impl SchedulingContext for WorkerThread {
    fn submit(&self, job: Job) {
        if lock(&self.sender).send(job).is_err() {
            warn!(worker = %self.name, "worker thread has exited, dropping job");
        }
    }
}
impl fmt::Debug for WorkerThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerThread").field("name", &self.name).finish()
    }
}

/// Takes the first parsed entity of a response.
///
/// # Panics
///
/// Panics if `parsed` is empty. Generated code calls this for payloads
/// declared neither optional nor plural: the server is required to return
/// exactly one entity and anything else is treated as a broken contract.
///
/// The panic reaches whoever runs the call. A call run in the background is
/// still finished, with [ServiceCallError::Aborted], so its completion fires
/// and the scheduling context stays usable.
pub fn first_required<Payload>(parsed: Vec<Payload>) -> Payload {
    match parsed.into_iter().next() {
        Some(payload) => payload,
        None => panic!(
            "response contained no `{}` although the payload is not optional",
            type_name::<Payload>()
        ),
    }
}

/// Serializes an argument for a request parameter bucket or header.
pub fn parameter<T: Serialize + ?Sized>(value: &T) -> Result<Value, ServiceCallError> {
    Ok(serde_json::to_value(value)?)
}

type Work<Payload> = Box<dyn FnOnce() -> ServiceCallResult<Payload> + Send>;

struct CallState<Payload> {
    operation_context: Arc<dyn SchedulingContext>,
    completion_context: Arc<dyn SchedulingContext>,
    work: Mutex<Option<Work<Payload>>>,
    result: Mutex<Option<ServiceCallResult<Payload>>>,
}

/// Wrapper over a service method. Might be run synchronously or
/// asynchronously, but only once; the result is kept on the call.
pub struct ServiceCall<Payload> {
    inner: Arc<CallState<Payload>>,
}
impl<Payload> Clone for ServiceCall<Payload> {
    fn clone(&self) -> Self {
        ServiceCall {
            inner: Arc::clone(&self.inner),
        }
    }
}
impl<Payload: Clone + Send + 'static> ServiceCall<Payload> {
    pub fn new(
        operation_context: Arc<dyn SchedulingContext>,
        completion_context: Arc<dyn SchedulingContext>,
        work: impl FnOnce() -> ServiceCallResult<Payload> + Send + 'static,
    ) -> Self {
        ServiceCall {
            inner: Arc::new(CallState {
                operation_context,
                completion_context,
                work: Mutex::new(Some(Box::new(work))),
                result: Mutex::new(None),
            }),
        }
    }

    /// Runs the call on the current thread.
    ///
    /// Running a call that already finished returns the recorded result
    /// without doing the work again.
    pub fn run(&self) -> ServiceCallResult<Payload> {
        let work = match lock(&self.inner.work).take() {
            Some(work) => work,
            None => return self.result().unwrap_or(Err(ServiceCallError::AlreadyStarted)),
        };
        trace!("running service call synchronously");
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(result) => {
                *lock(&self.inner.result) = Some(result.clone());
                result
            }
            Err(payload) => {
                *lock(&self.inner.result) = Some(Err(ServiceCallError::panicked(&*payload)));
                panic::resume_unwind(payload)
            }
        }
    }

    /// Runs the call on the operation context and hands the result to
    /// `completion` on the completion context.
    pub fn run_with(
        &self,
        completion: impl FnOnce(ServiceCallResult<Payload>) + Send + 'static,
    ) -> Result<(), ServiceCallError> {
        let work = lock(&self.inner.work)
            .take()
            .ok_or(ServiceCallError::AlreadyStarted)?;
        let background = BackgroundRun {
            state: Arc::clone(&self.inner),
            work: Some(work),
            completion: Some(Box::new(completion)),
        };
        self.inner
            .operation_context
            .submit(Box::new(move || background.run()));
        Ok(())
    }

    /// [ServiceCall::run_with] as a future.
    pub async fn run_async(&self) -> ServiceCallResult<Payload> {
        let (sender, receiver) = oneshot::channel();
        self.run_with(move |result| {
            // The receiver is gone only if the future was dropped.
            let _ = sender.send(result);
        })?;
        receiver.await.unwrap_or(Err(ServiceCallError::Canceled))
    }

    pub fn result(&self) -> Option<ServiceCallResult<Payload>> {
        lock(&self.inner.result).clone()
    }

    pub fn status(&self) -> CallStatus {
        if lock(&self.inner.result).is_some() {
            CallStatus::Completed
        } else if lock(&self.inner.work).is_some() {
            CallStatus::Idle
        } else {
            CallStatus::Running
        }
    }
}

/// A [ServiceCall] handed to its operation context. Finishes the call as
/// aborted if the work panics or the job is dropped without running.
struct BackgroundRun<Payload: Clone + Send + 'static> {
    state: Arc<CallState<Payload>>,
    work: Option<Work<Payload>>,
    completion: Option<Callback<Payload>>,
}
impl<Payload: Clone + Send + 'static> BackgroundRun<Payload> {
    fn run(mut self) {
        let work = match self.work.take() {
            Some(work) => work,
            None => return,
        };
        trace!("running service call in background");
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(result) => self.finish(result),
            Err(payload) => {
                self.finish(Err(ServiceCallError::panicked(&*payload)));
                panic::resume_unwind(payload)
            }
        }
    }

    fn finish(&mut self, result: ServiceCallResult<Payload>) {
        *lock(&self.state.result) = Some(result.clone());
        if let Some(completion) = self.completion.take() {
            self.state
                .completion_context
                .submit(Box::new(move || completion(result)));
        }
    }
}
impl<Payload: Clone + Send + 'static> Drop for BackgroundRun<Payload> {
    fn drop(&mut self) {
        if self.completion.is_some() {
            warn!("service call dropped by its operation context before running");
            self.finish(Err(ServiceCallError::Aborted(
                "dropped by the operation context".to_string(),
            )));
        }
    }
}

type CancelableWork<Payload> = Box<
    dyn FnOnce(&CancelableServiceCall<Payload>, Completion<Payload>) -> Result<(), ServiceCallError>
        + Send,
>;

type Callback<Payload> = Box<dyn FnOnce(ServiceCallResult<Payload>) + Send>;

pub type CancelHook = Box<dyn FnOnce() + Send>;

struct Progress<Payload> {
    status: CallStatus,
    result: Option<ServiceCallResult<Payload>>,
    callback: Option<Callback<Payload>>,
}

#[derive(Default)]
struct Cancellation {
    hook: Option<CancelHook>,
    registered: bool,
    requested: bool,
}

struct CancelableState<Payload> {
    operation_context: Arc<dyn SchedulingContext>,
    completion_context: Arc<dyn SchedulingContext>,
    work: Mutex<Option<CancelableWork<Payload>>>,
    progress: Mutex<Progress<Payload>>,
    cancellation: Mutex<Cancellation>,
}

/// Wrapper over a service method that can only run asynchronously and can
/// be canceled while in flight.
///
/// The wrapped work starts some further asynchronous operation, registers a
/// hook aborting it with [CancelableServiceCall::on_cancel], and reports the
/// outcome through its [Completion]. At most one result is recorded and the
/// completion callback fires at most once; results arriving after a
/// cancellation are dropped.
pub struct CancelableServiceCall<Payload> {
    inner: Arc<CancelableState<Payload>>,
}
impl<Payload> Clone for CancelableServiceCall<Payload> {
    fn clone(&self) -> Self {
        CancelableServiceCall {
            inner: Arc::clone(&self.inner),
        }
    }
}
impl<Payload: Clone + Send + 'static> CancelableServiceCall<Payload> {
    pub fn new(
        operation_context: Arc<dyn SchedulingContext>,
        completion_context: Arc<dyn SchedulingContext>,
        work: impl FnOnce(&CancelableServiceCall<Payload>, Completion<Payload>) -> Result<(), ServiceCallError>
            + Send
            + 'static,
    ) -> Self {
        CancelableServiceCall {
            inner: Arc::new(CancelableState {
                operation_context,
                completion_context,
                work: Mutex::new(Some(Box::new(work))),
                progress: Mutex::new(Progress {
                    status: CallStatus::Idle,
                    result: None,
                    callback: None,
                }),
                cancellation: Mutex::new(Cancellation::default()),
            }),
        }
    }

    /// Runs the call on the operation context. `completion` is invoked on
    /// the completion context unless the call is canceled first.
    pub fn run_with(
        &self,
        completion: impl FnOnce(ServiceCallResult<Payload>) + Send + 'static,
    ) -> Result<(), ServiceCallError> {
        let work = {
            let mut progress = lock(&self.inner.progress);
            match progress.status {
                CallStatus::Idle => (),
                CallStatus::Canceled => return Err(ServiceCallError::Canceled),
                CallStatus::Running | CallStatus::Completed => {
                    return Err(ServiceCallError::AlreadyStarted)
                }
            }
            let work = lock(&self.inner.work)
                .take()
                .ok_or(ServiceCallError::AlreadyStarted)?;
            progress.status = CallStatus::Running;
            progress.callback = Some(Box::new(completion));
            work
        };

        let start = CancelableStart {
            call: self.clone(),
            work: Some(work),
        };
        self.inner
            .operation_context
            .submit(Box::new(move || start.run()));
        Ok(())
    }

    /// [CancelableServiceCall::run_with] as a future. Resolves to
    /// [ServiceCallError::Canceled] if the call is canceled before it
    /// completes.
    pub async fn run_async(&self) -> ServiceCallResult<Payload> {
        let (sender, receiver) = oneshot::channel();
        self.run_with(move |result| {
            let _ = sender.send(result);
        })?;
        receiver.await.unwrap_or(Err(ServiceCallError::Canceled))
    }

    /// Registers the hook that aborts the in-flight operation. A hook
    /// registered after [CancelableServiceCall::cancel] fires right away.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        let mut cancellation = lock(&self.inner.cancellation);
        cancellation.registered = true;
        if cancellation.requested {
            drop(cancellation);
            hook();
        } else {
            cancellation.hook = Some(Box::new(hook));
        }
    }

    /// Cancels the call. Returns whether a cancellation hook was registered.
    ///
    /// Calling this more than once has the same effect as calling it once:
    /// the hook runs at most one time. Cancellation does not wait for the
    /// in-flight operation to stop.
    pub fn cancel(&self) -> bool {
        {
            let mut progress = lock(&self.inner.progress);
            if matches!(progress.status, CallStatus::Idle | CallStatus::Running) {
                debug!("canceling service call");
                progress.status = CallStatus::Canceled;
                progress.callback = None;
            }
        }
        let (hook, registered) = {
            let mut cancellation = lock(&self.inner.cancellation);
            cancellation.requested = true;
            (cancellation.hook.take(), cancellation.registered)
        };
        if let Some(hook) = hook {
            hook();
        }
        registered
    }

    pub fn result(&self) -> Option<ServiceCallResult<Payload>> {
        lock(&self.inner.progress).result.clone()
    }

    pub fn status(&self) -> CallStatus {
        lock(&self.inner.progress).status
    }

    fn deliver(&self, result: ServiceCallResult<Payload>) {
        let callback = {
            let mut progress = lock(&self.inner.progress);
            if progress.status != CallStatus::Running {
                trace!(status = ?progress.status, "dropping result of a call that is not running");
                return;
            }
            progress.status = CallStatus::Completed;
            progress.result = Some(result.clone());
            progress.callback.take()
        };
        if let Some(callback) = callback {
            self.inner
                .completion_context
                .submit(Box::new(move || callback(result)));
        }
    }
}

/// A [CancelableServiceCall] handed to its operation context.
struct CancelableStart<Payload: Clone + Send + 'static> {
    call: CancelableServiceCall<Payload>,
    work: Option<CancelableWork<Payload>>,
}
impl<Payload: Clone + Send + 'static> CancelableStart<Payload> {
    fn run(mut self) {
        let work = match self.work.take() {
            Some(work) => work,
            None => return,
        };
        trace!("running cancelable service call");
        let completion = Completion::new(self.call.clone());
        match panic::catch_unwind(AssertUnwindSafe(|| work(&self.call, completion))) {
            Ok(Ok(())) => (),
            Ok(Err(e)) => self.call.deliver(Err(e)),
            Err(payload) => {
                self.call.deliver(Err(ServiceCallError::panicked(&*payload)));
                panic::resume_unwind(payload)
            }
        }
    }
}
impl<Payload: Clone + Send + 'static> Drop for CancelableStart<Payload> {
    fn drop(&mut self) {
        if self.work.take().is_some() {
            warn!("cancelable service call dropped by its operation context before running");
            self.call.deliver(Err(ServiceCallError::Aborted(
                "dropped by the operation context".to_string(),
            )));
        }
    }
}

/// Reports the outcome of a [CancelableServiceCall]'s work.
///
/// Dropped while its thread unwinds, for instance when the transport
/// callback holding it panics, it finishes the call with
/// [ServiceCallError::Aborted].
pub struct Completion<Payload> {
    deliver: Option<Callback<Payload>>,
}
impl<Payload: Clone + Send + 'static> Completion<Payload> {
    fn new(call: CancelableServiceCall<Payload>) -> Self {
        Completion {
            deliver: Some(Box::new(move |result| call.deliver(result))),
        }
    }

    pub fn complete(mut self, result: ServiceCallResult<Payload>) {
        if let Some(deliver) = self.deliver.take() {
            deliver(result);
        }
    }
}
impl<Payload> Drop for Completion<Payload> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        if let Some(deliver) = self.deliver.take() {
            deliver(Err(ServiceCallError::Aborted(
                "panicked before completing".to_string(),
            )));
        }
    }
}

/// Basic service: owns the pair of contexts every call it creates runs on.
#[derive(Clone)]
pub struct Service {
    operation_context: Arc<dyn SchedulingContext>,
    completion_context: Arc<dyn SchedulingContext>,
}
impl Service {
    pub fn new(
        operation_context: Arc<dyn SchedulingContext>,
        completion_context: Arc<dyn SchedulingContext>,
    ) -> Self {
        Service {
            operation_context,
            completion_context,
        }
    }

    /// A dedicated worker thread for call bodies; results are delivered on
    /// that same thread.
    pub fn with_worker_thread() -> io::Result<Self> {
        Ok(Self::new(
            Arc::new(WorkerThread::spawn("service-autograph-worker")?),
            Arc::new(Inline),
        ))
    }

    pub fn create_call<Payload, F>(&self, work: F) -> ServiceCall<Payload>
    where
        Payload: Clone + Send + 'static,
        F: FnOnce() -> ServiceCallResult<Payload> + Send + 'static,
    {
        ServiceCall::new(
            Arc::clone(&self.operation_context),
            Arc::clone(&self.completion_context),
            work,
        )
    }

    pub fn create_cancelable_call<Payload, F>(&self, work: F) -> CancelableServiceCall<Payload>
    where
        Payload: Clone + Send + 'static,
        F: FnOnce(&CancelableServiceCall<Payload>, Completion<Payload>) -> Result<(), ServiceCallError>
            + Send
            + 'static,
    {
        CancelableServiceCall::new(
            Arc::clone(&self.operation_context),
            Arc::clone(&self.completion_context),
            work,
        )
    }
}

/// Basic web service: what generated service methods build requests from.
#[derive(Clone)]
pub struct WebService {
    service: Service,
    base_url: String,
    headers: Vec<(String, String)>,
    request_interceptors: Vec<Arc<dyn HttpRequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn HttpResponseInterceptor>>,
    transport: Arc<dyn HttpTransport>,
    key_maps: Arc<KeyMaps>,
}
impl WebService {
    pub fn new(
        service: Service,
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        WebService {
            service,
            base_url: base_url.into(),
            headers: Vec::new(),
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
            transport,
            key_maps: Arc::new(KeyMaps::new()),
        }
    }

    /// Default request headers.
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Interceptor applied to every request.
    pub fn with_request_interceptor(mut self, interceptor: Arc<dyn HttpRequestInterceptor>) -> Self {
        self.request_interceptors.push(interceptor);
        self
    }

    /// Interceptor applied to every response.
    pub fn with_response_interceptor(
        mut self,
        interceptor: Arc<dyn HttpResponseInterceptor>,
    ) -> Self {
        self.response_interceptors.push(interceptor);
        self
    }

    pub fn with_key_maps(mut self, key_maps: KeyMaps) -> Self {
        self.key_maps = Arc::new(key_maps);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &dyn HttpTransport {
        &*self.transport
    }

    pub fn base_request(&self) -> HttpRequest {
        let mut request = HttpRequest::new(HttpMethod::Get, self.base_url.clone());
        request.headers = self.headers.clone();
        request.request_interceptors = self.request_interceptors.clone();
        request.response_interceptors = self.response_interceptors.clone();
        request
    }

    pub fn json_parameters(&self) -> RequestParameters {
        RequestParameters::new(ParameterEncoding::Json)
    }

    pub fn url_parameters(&self) -> RequestParameters {
        RequestParameters::new(ParameterEncoding::Url)
    }

    pub fn plist_parameters(&self) -> RequestParameters {
        RequestParameters::new(ParameterEncoding::PropertyList)
    }

    /// Adds `values` to `parameters`, leaving out the null ones.
    pub fn fill_request_parameters(
        &self,
        mut parameters: RequestParameters,
        values: Vec<(&str, Value)>,
    ) -> RequestParameters {
        for (name, value) in values {
            if !value.is_null() {
                parameters.insert(name, value);
            }
        }
        parameters
    }

    /// Renders `values` as header pairs, leaving out the null ones.
    pub fn fill_headers(&self, values: Vec<(&str, Value)>) -> Vec<(String, String)> {
        values
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (name.to_string(), value)
            })
            .collect()
    }

    /// Chooses the parser for a response from `endpoint`.
    pub fn object_parser<M: DeserializeOwned + 'static>(&self, endpoint: &str) -> ObjectParser<M> {
        trace!(endpoint, model = type_name::<M>(), "choosing object parser");
        ObjectParser::new().with_keys(self.key_maps.get::<M>())
    }
}
impl Deref for WebService {
    type Target = Service;

    fn deref(&self) -> &Service {
        &self.service
    }
}

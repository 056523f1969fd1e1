//! Runtime for services generated by `service_autograph_codegen`.
//!
//! Generated service methods return a [ServiceCall] or a
//! [CancelableServiceCall] built from a [WebService]. Requests are handed to
//! an [HttpTransport] supplied by the application, and responses are decoded
//! with an [ObjectParser].

pub mod internal_for_macro;
pub mod object_parser;
pub mod service;
pub mod transport;

mod tokio_context;

pub use object_parser::{KeyBinding, KeyMap, KeyMaps, ObjectParser};
pub use service::{
    first_required, parameter, CallStatus, CancelHook, CancelableServiceCall, Completion, Inline,
    Job, SchedulingContext, Service, ServiceCall, ServiceCallError, ServiceCallResult, WebService,
    WorkerThread,
};
pub use tokio_context::TokioContext;
pub use transport::{
    HttpCall, HttpMethod, HttpRequest, HttpRequestInterceptor, HttpResponse,
    HttpResponseInterceptor, HttpTransport, ParameterEncoding, RequestParameters,
    TransportCallback, TransportError, TransportResult,
};

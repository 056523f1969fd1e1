use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use service_autograph_lib::{
    first_required, CallStatus, CancelableServiceCall, Completion, Inline, SchedulingContext,
    Service, ServiceCallError, ServiceCallResult, TokioContext, TransportError, WorkerThread,
};

fn inline_service() -> Service {
    Service::new(Arc::new(Inline), Arc::new(Inline))
}

#[test]
fn test_run_synchronously_memoizes_result() {
    let runs = Arc::new(AtomicUsize::new(0));
    let call = {
        let runs = Arc::clone(&runs);
        inline_service().create_call(move || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        })
    };
    assert_eq!(call.status(), CallStatus::Idle);
    assert_eq!(call.run().unwrap(), 42);
    assert_eq!(call.status(), CallStatus::Completed);

    // A second run hands back the recorded result without redoing the work.
    assert_eq!(call.run().unwrap(), 42);
    assert_eq!(call.result().unwrap().unwrap(), 42);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_run_with_delivers_once_on_completion_context() {
    let worker = Arc::new(WorkerThread::spawn("test-worker").unwrap());
    let service = Service::new(worker, Arc::new(Inline));
    let call = service.create_call(|| Ok(String::from("done")));

    let (sender, receiver) = mpsc::channel();
    call.run_with(move |result| sender.send(result).unwrap())
        .unwrap();
    let result = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(result.unwrap(), "done");
    assert!(receiver.recv_timeout(Duration::from_millis(50)).is_err());

    assert_eq!(call.result().unwrap().unwrap(), "done");
    assert!(matches!(
        call.run_with(|_| panic!("must not be delivered")),
        Err(ServiceCallError::AlreadyStarted)
    ));
}

#[test]
fn test_failed_call_records_failure() {
    let call = inline_service()
        .create_call::<u32, _>(|| Err(TransportError::msg("connection reset").into()));
    match call.run() {
        Err(ServiceCallError::Transport(e)) => assert_eq!(e.to_string(), "connection reset"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(call.result().unwrap().is_err());
}

#[test]
fn test_worker_thread_runs_jobs_in_order() {
    let worker = WorkerThread::spawn("fifo-worker").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (sender, receiver) = mpsc::channel();
    for i in 0..10 {
        let seen = Arc::clone(&seen);
        let sender = sender.clone();
        worker.submit(Box::new(move || {
            seen.lock().unwrap().push(i);
            sender.send(()).unwrap();
        }));
    }
    for _ in 0..10 {
        receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    }
    assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
}

/// Records the completion and the cancel hooks of a cancelable call whose
/// work never finishes by itself.
struct PendingWork {
    completion: Arc<Mutex<Option<Completion<u32>>>>,
    hook_runs: Arc<AtomicUsize>,
}

fn pending_call(service: &Service) -> (CancelableServiceCall<u32>, PendingWork) {
    let completion = Arc::new(Mutex::new(None));
    let hook_runs = Arc::new(AtomicUsize::new(0));
    let call = {
        let completion = Arc::clone(&completion);
        let hook_runs = Arc::clone(&hook_runs);
        service.create_cancelable_call(move |this, done| {
            *completion.lock().unwrap() = Some(done);
            this.on_cancel(move || {
                hook_runs.fetch_add(1, Ordering::SeqCst);
            });
            Ok(())
        })
    };
    (
        call,
        PendingWork {
            completion,
            hook_runs,
        },
    )
}

#[test]
fn test_cancel_is_idempotent() {
    let (call, work) = pending_call(&inline_service());
    call.run_with(|_| panic!("canceled call must not complete"))
        .unwrap();
    assert_eq!(call.status(), CallStatus::Running);

    assert!(call.cancel());
    assert!(call.cancel());
    assert_eq!(work.hook_runs.load(Ordering::SeqCst), 1);
    assert_eq!(call.status(), CallStatus::Canceled);
}

#[test]
fn test_completion_after_cancel_is_dropped() {
    let (call, work) = pending_call(&inline_service());
    let delivered = Arc::new(AtomicUsize::new(0));
    {
        let delivered = Arc::clone(&delivered);
        call.run_with(move |_| {
            delivered.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    call.cancel();

    let completion = work.completion.lock().unwrap().take().unwrap();
    completion.complete(Ok(7));
    assert_eq!(delivered.load(Ordering::SeqCst), 0);
    assert!(call.result().is_none());
    assert_eq!(call.status(), CallStatus::Canceled);
}

#[test]
fn test_cancelable_call_completes_once() {
    let (call, work) = pending_call(&inline_service());
    let results: Arc<Mutex<Vec<ServiceCallResult<u32>>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let results = Arc::clone(&results);
        call.run_with(move |result| results.lock().unwrap().push(result))
            .unwrap();
    }
    let completion = work.completion.lock().unwrap().take().unwrap();
    completion.complete(Ok(7));

    assert_eq!(results.lock().unwrap().len(), 1);
    assert_eq!(call.status(), CallStatus::Completed);
    assert_eq!(call.result().unwrap().unwrap(), 7);

    // Canceling a finished call keeps its result.
    assert!(call.cancel());
    assert_eq!(call.status(), CallStatus::Completed);
    assert_eq!(work.hook_runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cancel_without_hook() {
    let call = inline_service().create_cancelable_call::<u32, _>(|_, _| Ok(()));
    assert!(!call.cancel());
    assert!(matches!(
        call.run_with(|_| panic!("canceled call must not run")),
        Err(ServiceCallError::Canceled)
    ));
}

#[test]
fn test_hook_registered_after_cancel_fires_immediately() {
    let call = inline_service().create_cancelable_call::<u32, _>(|_, _| Ok(()));
    call.cancel();
    let hook_runs = Arc::new(AtomicUsize::new(0));
    {
        let hook_runs = Arc::clone(&hook_runs);
        call.on_cancel(move || {
            hook_runs.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
    assert!(call.cancel());
    assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_work_error_is_delivered() {
    let call = inline_service().create_cancelable_call::<u32, _>(|_, _| {
        Err(ServiceCallError::Transport(TransportError::msg("refused")))
    });
    let (sender, receiver) = mpsc::channel();
    call.run_with(move |result| sender.send(result).unwrap())
        .unwrap();
    assert!(receiver.recv().unwrap().is_err());
    assert_eq!(call.status(), CallStatus::Completed);
}

#[test]
fn test_first_required_takes_first() {
    assert_eq!(first_required(vec![1, 2, 3]), 1);
}

#[test]
#[should_panic(expected = "although the payload is not optional")]
fn test_first_required_panics_on_empty() {
    first_required::<u32>(Vec::new());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_async_on_tokio_context() {
    let context = Arc::new(TokioContext::try_current().unwrap());
    let service = Service::new(context.clone(), context);
    let call = service.create_call(|| Ok(vec![1, 2]));
    assert_eq!(call.run_async().await.unwrap(), vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_canceled_call_resolves_to_canceled() {
    let service = inline_service();
    let (call, _work) = pending_call(&service);
    let future = {
        let call = call.clone();
        async move { call.run_async().await }
    };
    let handle = tokio::spawn(future);
    while call.status() != CallStatus::Running {
        tokio::task::yield_now().await;
    }
    call.cancel();
    assert!(matches!(
        handle.await.unwrap(),
        Err(ServiceCallError::Canceled)
    ));
}

fn aborted_message<T: std::fmt::Debug>(result: Option<ServiceCallResult<T>>) -> String {
    match result {
        Some(Err(ServiceCallError::Aborted(message))) => message,
        other => panic!("expected an aborted call, got {other:?}"),
    }
}

#[test]
fn test_missing_required_payload_does_not_wedge_worker() {
    let worker = Arc::new(WorkerThread::spawn("abort-worker").unwrap());
    let service = Service::new(worker, Arc::new(Inline));
    let fatal = service.create_call(|| Ok(first_required(Vec::<u32>::new())));
    let next = service.create_call(|| Ok(7));

    let (sender, receiver) = mpsc::channel();
    let fatal_sender = sender.clone();
    fatal
        .run_with(move |result| fatal_sender.send(("fatal", result)).unwrap())
        .unwrap();
    next.run_with(move |result| sender.send(("next", result)).unwrap())
        .unwrap();

    let (name, result) = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(name, "fatal");
    assert!(aborted_message(Some(result)).contains("although the payload is not optional"));
    assert_eq!(fatal.status(), CallStatus::Completed);

    let (name, result) = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(name, "next");
    assert_eq!(result.unwrap(), 7);
    assert_eq!(next.status(), CallStatus::Completed);
}

#[test]
fn test_panicking_synchronous_run_is_recorded() {
    let call = inline_service().create_call(|| Ok(first_required(Vec::<u32>::new())));
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| call.run()));
    assert!(outcome.is_err());
    assert_eq!(call.status(), CallStatus::Completed);
    assert!(aborted_message(call.result()).contains("although the payload is not optional"));
}

/// Drops every job, like a context whose thread is gone.
struct Discarding;
impl SchedulingContext for Discarding {
    fn submit(&self, _job: service_autograph_lib::Job) {}
}

#[test]
fn test_dropped_jobs_finish_their_calls() {
    let service = Service::new(Arc::new(Discarding), Arc::new(Inline));

    let delivered = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&delivered);
    let call = service.create_call(|| Ok(1u32));
    call.run_with(move |result| *sink.lock().unwrap() = Some(result))
        .unwrap();
    assert_eq!(call.status(), CallStatus::Completed);
    aborted_message(delivered.lock().unwrap().take());

    let cancelable = service.create_cancelable_call::<u32, _>(|_, done| {
        done.complete(Ok(1));
        Ok(())
    });
    cancelable.run_with(|_| ()).unwrap();
    assert_eq!(cancelable.status(), CallStatus::Completed);
    aborted_message(cancelable.result());
}

#[test]
fn test_panicking_transport_callback_aborts_cancelable_call() {
    let (sender, receiver) = mpsc::channel::<Vec<u32>>();
    let call = inline_service().create_cancelable_call::<u32, _>(move |_, done| {
        // Stands in for a transport answering on its own thread.
        std::thread::spawn(move || {
            if let Ok(parsed) = receiver.recv() {
                done.complete(Ok(first_required(parsed)));
            }
        });
        Ok(())
    });
    let (result_sender, result_receiver) = mpsc::channel();
    call.run_with(move |result| result_sender.send(result).unwrap())
        .unwrap();
    assert_eq!(call.status(), CallStatus::Running);

    sender.send(Vec::new()).unwrap();
    let result = result_receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(aborted_message(Some(result)).contains("panicked before completing"));
    assert_eq!(call.status(), CallStatus::Completed);
}

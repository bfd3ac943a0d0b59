use crate::domain::{ExecMessage, ExecMode, ExecRequest, InvocationId, STREAM_DEADLINE};
use crate::infra::{ExecError, Executor, StreamingExecutor};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

enum StreamItem {
    Line(String),
    End(Result<(), ExecError>),
}

/// Runs dispatched invocations off the UI thread.
///
/// Every message sent back on `tx` carries the invocation id it was
/// dispatched with. Buffered invocations produce exactly one `Finished`.
/// Streaming invocations produce `Started`, zero or more `Chunk`s, and
/// exactly one `StreamEnd`, in that order.
pub struct ExecutionEngine {
    executor: Arc<dyn Executor>,
    streaming: Arc<dyn StreamingExecutor>,
    tx: Sender<ExecMessage>,
    deadline: Duration,
}

impl ExecutionEngine {
    pub fn new(
        executor: Arc<dyn Executor>,
        streaming: Arc<dyn StreamingExecutor>,
        tx: Sender<ExecMessage>,
    ) -> Self {
        Self {
            executor,
            streaming,
            tx,
            deadline: STREAM_DEADLINE,
        }
    }

    #[cfg(test)]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn dispatch(&self, invocation: InvocationId, request: ExecRequest) -> ExecMode {
        let mode = request.mode();
        tracing::info!(
            %invocation,
            command = %request.command_line(),
            mode = mode.label(),
            "dispatch"
        );

        match mode {
            ExecMode::Buffered => self.spawn_buffered(invocation, request),
            ExecMode::Streaming => self.spawn_streaming(invocation, request),
        }
        mode
    }

    fn spawn_buffered(&self, invocation: InvocationId, request: ExecRequest) {
        let executor = Arc::clone(&self.executor);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let run = panic::catch_unwind(AssertUnwindSafe(|| {
                executor.run(&request.command, &request.argv())
            }));
            let result = match run {
                Ok(result) => result.map_err(|error| error.to_string()),
                Err(_) => {
                    tracing::warn!(%invocation, "buffered worker panicked");
                    Err(ExecError::Disconnected.to_string())
                }
            };
            let _ = tx.send(ExecMessage::Finished { invocation, result });
        });
    }

    fn spawn_streaming(&self, invocation: InvocationId, request: ExecRequest) {
        let _ = self.tx.send(ExecMessage::Started {
            invocation,
            command_line: request.command_line(),
        });

        let cancel = Arc::new(AtomicBool::new(false));
        let (item_tx, item_rx) = mpsc::channel::<StreamItem>();

        let streaming = Arc::clone(&self.streaming);
        let worker_cancel = Arc::clone(&cancel);
        let deadline = self.deadline;
        thread::spawn(move || {
            let mut emit = |line: String| {
                let _ = item_tx.send(StreamItem::Line(line));
            };
            let result = streaming.stream(
                &request.command,
                &request.argv(),
                deadline,
                &worker_cancel,
                &mut emit,
            );
            let _ = item_tx.send(StreamItem::End(result));
        });

        let tx = self.tx.clone();
        thread::spawn(move || supervise_stream(invocation, item_rx, tx, cancel, deadline));
    }
}

/// Forwards worker output in order and guarantees a single `StreamEnd`,
/// cancelling the worker when the deadline passes first.
fn supervise_stream(
    invocation: InvocationId,
    items: mpsc::Receiver<StreamItem>,
    tx: Sender<ExecMessage>,
    cancel: Arc<AtomicBool>,
    deadline: Duration,
) {
    let started = Instant::now();
    let end = loop {
        let remaining = deadline.saturating_sub(started.elapsed());
        match items.recv_timeout(remaining) {
            Ok(StreamItem::Line(line)) => {
                if tx.send(ExecMessage::Chunk { invocation, line }).is_err() {
                    cancel.store(true, Ordering::Relaxed);
                    return;
                }
            }
            Ok(StreamItem::End(result)) => break result.err(),
            Err(RecvTimeoutError::Timeout) => {
                cancel.store(true, Ordering::Relaxed);
                tracing::warn!(%invocation, seconds = deadline.as_secs(), "stream deadline expired");
                break Some(ExecError::Timeout {
                    seconds: deadline.as_secs(),
                });
            }
            Err(RecvTimeoutError::Disconnected) => break Some(ExecError::Disconnected),
        }
    };

    let _ = tx.send(ExecMessage::StreamEnd {
        invocation,
        error: end.map(|error| error.to_string()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExecOutcome;
    use std::sync::Mutex;
    use std::sync::mpsc::Receiver;

    const WAIT: Duration = Duration::from_secs(5);

    struct PanickingExecutor;

    impl Executor for PanickingExecutor {
        fn run(&self, _name: &str, _args: &[String]) -> Result<ExecOutcome, ExecError> {
            panic!("executor blew up");
        }
    }

    struct FixedExecutor {
        outcome: Result<ExecOutcome, ()>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FixedExecutor {
        fn new(outcome: Result<ExecOutcome, ()>) -> Self {
            Self {
                outcome,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Executor for FixedExecutor {
        fn run(&self, name: &str, args: &[String]) -> Result<ExecOutcome, ExecError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((name.to_string(), args.to_vec()));
            }
            self.outcome.clone().map_err(|()| ExecError::Failed {
                code: Some(1),
                stderr: "boom".to_string(),
            })
        }
    }

    enum Script {
        Lines(Vec<&'static str>),
        Fail(Vec<&'static str>),
        Hang,
        Vanish,
    }

    struct ScriptedStream(Script);

    impl StreamingExecutor for ScriptedStream {
        fn stream(
            &self,
            _name: &str,
            _args: &[String],
            _deadline: Duration,
            cancel: &AtomicBool,
            emit: &mut dyn FnMut(String),
        ) -> Result<(), ExecError> {
            match &self.0 {
                Script::Lines(lines) => {
                    for line in lines {
                        emit(line.to_string());
                    }
                    Ok(())
                }
                Script::Fail(lines) => {
                    for line in lines {
                        emit(line.to_string());
                    }
                    Err(ExecError::Failed {
                        code: Some(1),
                        stderr: String::new(),
                    })
                }
                Script::Hang => {
                    while !cancel.load(Ordering::Relaxed) {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(ExecError::Cancelled)
                }
                Script::Vanish => panic!("worker died"),
            }
        }
    }

    fn engine(
        outcome: Result<ExecOutcome, ()>,
        script: Script,
    ) -> (ExecutionEngine, Receiver<ExecMessage>, Arc<FixedExecutor>) {
        let (tx, rx) = mpsc::channel();
        let executor = Arc::new(FixedExecutor::new(outcome));
        let engine = ExecutionEngine::new(executor.clone(), Arc::new(ScriptedStream(script)), tx);
        (engine, rx, executor)
    }

    fn collect_until_terminal(rx: &Receiver<ExecMessage>) -> Vec<ExecMessage> {
        let mut messages = Vec::new();
        loop {
            let message = rx.recv_timeout(WAIT).expect("message");
            let terminal = message.is_terminal();
            messages.push(message);
            if terminal {
                return messages;
            }
        }
    }

    #[test]
    fn buffered_dispatch_sends_one_finished_message() {
        let (engine, rx, executor) = engine(
            Ok(ExecOutcome::Output("done".to_string())),
            Script::Lines(Vec::new()),
        );
        let id = InvocationId::new(4);
        let request = ExecRequest::new("doctor", Some("system"), vec!["--verbose".to_string()]);

        assert_eq!(engine.dispatch(id, request), ExecMode::Buffered);
        let messages = collect_until_terminal(&rx);

        assert_eq!(
            messages,
            vec![ExecMessage::Finished {
                invocation: id,
                result: Ok(ExecOutcome::Output("done".to_string())),
            }]
        );
        let calls = executor.calls.lock().expect("calls");
        assert_eq!(
            calls.as_slice(),
            &[(
                "doctor".to_string(),
                vec!["system".to_string(), "--verbose".to_string()]
            )]
        );
    }

    #[test]
    fn buffered_errors_are_delivered_as_text() {
        let (engine, rx, _) = engine(Err(()), Script::Lines(Vec::new()));
        engine.dispatch(InvocationId::new(1), ExecRequest::new("gc", None, Vec::new()));

        let messages = collect_until_terminal(&rx);
        let [ExecMessage::Finished { result, .. }] = messages.as_slice() else {
            panic!("expected a single Finished, got {messages:?}");
        };
        assert_eq!(result.as_ref().expect_err("error"), "command exited with status 1: boom");
    }

    #[test]
    fn panicking_buffered_worker_still_finishes() {
        let (tx, rx) = mpsc::channel();
        let engine = ExecutionEngine::new(
            Arc::new(PanickingExecutor),
            Arc::new(ScriptedStream(Script::Lines(Vec::new()))),
            tx,
        );
        let id = InvocationId::new(6);
        engine.dispatch(id, ExecRequest::new("gc", None, Vec::new()));

        let messages = collect_until_terminal(&rx);
        assert_eq!(
            messages,
            vec![ExecMessage::Finished {
                invocation: id,
                result: Err("execution worker exited without a result".to_string()),
            }]
        );
    }

    #[test]
    fn streaming_dispatch_orders_start_chunks_and_end() {
        let (engine, rx, executor) = engine(
            Ok(ExecOutcome::NotHandled),
            Script::Lines(vec!["checking", "evaluating", "ok"]),
        );
        let id = InvocationId::new(9);
        let request = ExecRequest::new("flake", Some("validate"), Vec::new());

        assert_eq!(engine.dispatch(id, request), ExecMode::Streaming);
        let messages = collect_until_terminal(&rx);

        let mut expected = vec![ExecMessage::Started {
            invocation: id,
            command_line: "flake validate".to_string(),
        }];
        expected.extend(["checking", "evaluating", "ok"].map(|line| ExecMessage::Chunk {
            invocation: id,
            line: line.to_string(),
        }));
        expected.push(ExecMessage::StreamEnd {
            invocation: id,
            error: None,
        });
        assert_eq!(messages, expected);
        assert!(executor.calls.lock().expect("calls").is_empty());
    }

    #[test]
    fn streaming_failure_ends_with_an_error() {
        let (engine, rx, _) = engine(Ok(ExecOutcome::NotHandled), Script::Fail(vec!["partial"]));
        let id = InvocationId::new(2);
        engine.dispatch(id, ExecRequest::new("build", Some("watch"), Vec::new()));

        let messages = collect_until_terminal(&rx);
        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages.last(),
            Some(&ExecMessage::StreamEnd {
                invocation: id,
                error: Some("command exited with status 1".to_string()),
            })
        );
    }

    #[test]
    fn deadline_synthesizes_timeout_end_and_cancels_worker() {
        let (engine, rx, _) = engine(Ok(ExecOutcome::NotHandled), Script::Hang);
        let engine = engine.with_deadline(Duration::from_millis(50));
        let id = InvocationId::new(3);
        engine.dispatch(id, ExecRequest::new("flake", Some("check"), Vec::new()));

        let messages = collect_until_terminal(&rx);
        assert_eq!(
            messages.last(),
            Some(&ExecMessage::StreamEnd {
                invocation: id,
                error: Some("timed out after 0s".to_string()),
            })
        );
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn vanished_worker_still_ends_the_stream() {
        let (engine, rx, _) = engine(Ok(ExecOutcome::NotHandled), Script::Vanish);
        let id = InvocationId::new(5);
        engine.dispatch(id, ExecRequest::new("flake", Some("validate"), Vec::new()));

        let messages = collect_until_terminal(&rx);
        assert_eq!(
            messages.last(),
            Some(&ExecMessage::StreamEnd {
                invocation: id,
                error: Some("execution worker exited without a result".to_string()),
            })
        );
    }
}

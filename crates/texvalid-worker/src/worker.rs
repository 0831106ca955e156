use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::config::WorkerConfig;
use crate::protocol::{Event, Request};
use crate::session::LintSession;
use texvalid_syntax::Diagnostic;

/// Editor-side handle to a background lint thread.
///
/// Text sent with [`WorkerHandle::set_value`] is linted once no newer text has
/// arrived for the configured debounce period. A result computed for text that
/// was superseded while the parse ran is dropped rather than posted.
pub struct WorkerHandle {
    requests: Sender<Request>,
    events: Receiver<Event>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn(config: WorkerConfig) -> std::io::Result<Self> {
        let (request_tx, request_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        let thread = thread::Builder::new()
            .name("texvalid-worker".to_string())
            .spawn(move || run(config, request_rx, event_tx))?;

        Ok(Self {
            requests: request_tx,
            events: event_rx,
            thread: Some(thread),
        })
    }

    pub fn set_value(&self, text: impl Into<String>) {
        self.send(Request::SetValue { text: text.into() });
    }

    pub fn send(&self, request: Request) {
        if self.requests.send(request).is_err() {
            log::debug!("worker thread has already stopped");
        }
    }

    /// Events posted by the worker, including the final [`Event::Terminate`].
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    /// Stops the worker and waits for its thread to exit.
    pub fn terminate(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.send(Request::Terminate);
            if thread.join().is_err() {
                log::error!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(config: WorkerConfig, requests: Receiver<Request>, events: Sender<Event>) {
    log::info!("lint worker started (debounce {:?})", config.debounce);
    let mut session = LintSession::new(config.parse_options());
    let mut pending: Option<String> = None;

    loop {
        let request = if pending.is_some() {
            match requests.recv_timeout(config.debounce) {
                Ok(request) => request,
                Err(RecvTimeoutError::Timeout) => {
                    let Some(text) = pending.take() else {
                        continue;
                    };
                    let data = session.lint(&text);
                    if post_lint(data, &requests, &events) == Delivery::Closed {
                        break;
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match requests.recv() {
                Ok(request) => request,
                Err(_) => break,
            }
        };

        match request {
            Request::SetValue { text } => pending = Some(text),
            Request::Terminate => {
                let _ = events.send(Event::Terminate);
                break;
            }
        }
    }
    log::info!("lint worker stopped");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Posted,
    /// Newer text arrived while linting.
    Discarded,
    /// The editor side is gone.
    Closed,
}

fn post_lint(
    data: Vec<Diagnostic>,
    requests: &Receiver<Request>,
    events: &Sender<Event>,
) -> Delivery {
    if !requests.is_empty() {
        log::debug!("discarding lint result for superseded text");
        return Delivery::Discarded;
    }
    match events.send(Event::Lint { data }) {
        Ok(()) => Delivery::Posted,
        Err(_) => Delivery::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn spawn(debounce_ms: u64) -> WorkerHandle {
        let config = WorkerConfig::default().with_debounce(Duration::from_millis(debounce_ms));
        WorkerHandle::spawn(config).unwrap()
    }

    #[test]
    fn test_lints_after_debounce() {
        let worker = spawn(10);
        worker.set_value("this is a^b test");
        match worker.events().recv_timeout(WAIT).unwrap() {
            Event::Lint { data } => {
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].message, "^ must be inside math mode");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_rapid_updates_coalesce() {
        let worker = spawn(300);
        worker.set_value("a^b");
        worker.set_value("a^b c_d");
        worker.set_value("$a^b$");
        match worker.events().recv_timeout(WAIT).unwrap() {
            Event::Lint { data } => assert!(data.is_empty()),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(worker
            .events()
            .recv_timeout(Duration::from_millis(400))
            .is_err());
    }

    #[test]
    fn test_superseded_result_is_discarded() {
        let (request_tx, request_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        assert_eq!(post_lint(Vec::new(), &request_rx, &event_tx), Delivery::Posted);
        assert_eq!(event_rx.try_recv().unwrap(), Event::Lint { data: Vec::new() });

        request_tx
            .send(Request::SetValue {
                text: "newer".to_string(),
            })
            .unwrap();
        assert_eq!(post_lint(Vec::new(), &request_rx, &event_tx), Delivery::Discarded);
        assert!(event_rx.try_recv().is_err());
        assert_eq!(request_rx.len(), 1);
    }

    #[test]
    fn test_post_after_editor_hung_up() {
        let (_request_tx, request_rx) = unbounded::<Request>();
        let (event_tx, event_rx) = unbounded();
        drop(event_rx);
        assert_eq!(post_lint(Vec::new(), &request_rx, &event_tx), Delivery::Closed);
    }

    #[test]
    fn test_terminate_posts_event() {
        let worker = spawn(10);
        let events = worker.events().clone();
        worker.terminate();
        assert_eq!(events.recv_timeout(WAIT).unwrap(), Event::Terminate);
    }

    #[test]
    fn test_terminate_drops_pending_text() {
        let worker = spawn(10_000);
        worker.set_value("a^b");
        let events = worker.events().clone();
        worker.terminate();
        assert_eq!(events.recv_timeout(WAIT).unwrap(), Event::Terminate);
    }
}

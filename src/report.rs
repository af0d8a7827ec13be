//! Serialized console reporting.
//!
//! Workers and the connection handler all log through cloned [`Reporter`]
//! handles; a single printer thread owns the writer, so one line body is never
//! interleaved with another. No ordering is guaranteed relative to socket I/O.

use crate::request::{QueuedRequest, Request};
use crate::timing::Timestamp;
use crossbeam_channel::{unbounded, Sender};
use std::io::Write;
use std::thread;

/// Cloneable logging handle feeding the printer thread.
#[derive(Clone)]
pub struct Reporter {
    sender: Sender<String>,
}

/// Owner of the printer thread. Joining waits for every outstanding line to
/// be written, which only happens once all [`Reporter`] clones are dropped.
pub struct ReportSink {
    printer: thread::JoinHandle<()>,
}

impl Reporter {
    /// Reporter draining to standard output.
    pub fn stdout() -> (Reporter, ReportSink) {
        Reporter::to_writer(Box::new(std::io::stdout()))
    }

    /// Reporter draining to an arbitrary writer; tests hand in a shared
    /// buffer to assert on emitted lines.
    pub fn to_writer(mut writer: Box<dyn Write + Send>) -> (Reporter, ReportSink) {
        let (sender, receiver) = unbounded::<String>();
        let printer = thread::Builder::new()
            .name("Report-Printer".to_string())
            .spawn(move || {
                for line in receiver {
                    if writeln!(writer, "{line}").is_err() {
                        break;
                    }
                }
                let _ = writer.flush();
            })
            .expect("failed to spawn report printer thread");
        (Reporter { sender }, ReportSink { printer })
    }

    /// `R<id>:<arrival>,<length>,<receipt>,<start>,<completion>`
    pub fn completed(&self, req: &QueuedRequest) {
        self.emit(format!(
            "R{}:{:.6},{:.6},{:.6},{:.6},{:.6}",
            req.request.id,
            req.request.timestamp.as_secs_f64(),
            req.request.length.as_secs_f64(),
            req.receipt.as_secs_f64(),
            req.start.as_secs_f64(),
            req.completion.as_secs_f64(),
        ));
    }

    /// `X<id>:<arrival>,<length>,<rejection_time>`
    pub fn rejected(&self, request: &Request, rejected_at: Timestamp) {
        self.emit(format!(
            "X{}:{:.6},{:.6},{:.6}",
            request.id,
            request.timestamp.as_secs_f64(),
            request.length.as_secs_f64(),
            rejected_at.as_secs_f64(),
        ));
    }

    /// `Q:[R<id>,R<id>,...]`, empty queue as `Q:[]`.
    pub fn snapshot(&self, ids: &[u64]) {
        let body = ids
            .iter()
            .map(|id| format!("R{id}"))
            .collect::<Vec<_>>()
            .join(",");
        self.emit(format!("Q:[{body}]"));
    }

    /// Free-form informational line.
    pub fn info(&self, line: impl Into<String>) {
        self.emit(line.into());
    }

    fn emit(&self, line: String) {
        // A disconnected printer means we are past teardown; drop the line.
        let _ = self.sender.send(line);
    }
}

impl ReportSink {
    pub fn join(self) {
        let _ = self.printer.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::Timestamp;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture() -> (Reporter, ReportSink, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (reporter, sink) = Reporter::to_writer(Box::new(SharedBuf(buf.clone())));
        (reporter, sink, buf)
    }

    fn drain(reporter: Reporter, sink: ReportSink, buf: &Arc<Mutex<Vec<u8>>>) -> String {
        drop(reporter);
        sink.join();
        String::from_utf8(buf.lock().clone()).unwrap()
    }

    #[test]
    fn completed_line_format() {
        let (reporter, sink, buf) = capture();
        let mut queued = QueuedRequest::new(
            Request {
                id: 3,
                timestamp: Timestamp { secs: 1, nanos: 0 },
                length: Duration::from_millis(500),
            },
            Timestamp { secs: 2, nanos: 0 },
        );
        queued.start = Timestamp {
            secs: 2,
            nanos: 250_000_000,
        };
        queued.completion = Timestamp {
            secs: 2,
            nanos: 750_000_000,
        };
        reporter.completed(&queued);
        let output = drain(reporter, sink, &buf);
        assert_eq!(
            output,
            "R3:1.000000,0.500000,2.000000,2.250000,2.750000\n"
        );
    }

    #[test]
    fn rejected_line_format() {
        let (reporter, sink, buf) = capture();
        reporter.rejected(
            &Request {
                id: 8,
                timestamp: Timestamp { secs: 4, nanos: 0 },
                length: Duration::from_secs(1),
            },
            Timestamp {
                secs: 4,
                nanos: 100_000_000,
            },
        );
        let output = drain(reporter, sink, &buf);
        assert_eq!(output, "X8:4.000000,1.000000,4.100000\n");
    }

    #[test]
    fn snapshot_line_format() {
        let (reporter, sink, buf) = capture();
        reporter.snapshot(&[1, 2, 5]);
        reporter.snapshot(&[]);
        let output = drain(reporter, sink, &buf);
        assert_eq!(output, "Q:[R1,R2,R5]\nQ:[]\n");
    }

    #[test]
    fn lines_from_many_threads_never_interleave() {
        let (reporter, sink, buf) = capture();
        let writers: Vec<_> = (0..4)
            .map(|worker| {
                let reporter = reporter.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        reporter.info(format!("INFO: worker {worker} line {i}"));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        let output = drain(reporter, sink, &buf);
        assert_eq!(output.lines().count(), 200);
        assert!(output.lines().all(|line| line.starts_with("INFO: worker ")));
    }
}

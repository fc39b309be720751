//! Diagnostics surface.
//!
//! Compile and link failures are forwarded to an external reporting sink and
//! shown to the user as a transient on-screen message. Both are fire-and-forget:
//! implementations must never panic or block the render thread.

use std::cell::RefCell;
use std::rc::Rc;

/// Receiver of failure reports and on-screen notices.
pub trait DiagnosticsSink {
    /// Structured failure report (info log, sources).
    fn report(&mut self, message: &str);

    /// Transient user-visible notification.
    fn notify(&mut self, message: &str, seconds: f32);
}

/// Default sink: everything goes to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl DiagnosticsSink for LogDiagnostics {
    fn report(&mut self, message: &str) {
        log::error!("{message}");
    }

    fn notify(&mut self, message: &str, seconds: f32) {
        log::warn!("[osd {seconds:.1}s] {message}");
    }
}

/// Sink that keeps every message, for tests and capture tools.
#[derive(Debug, Default, Clone)]
pub struct CollectingDiagnostics {
    pub reports: Vec<String>,
    pub notices: Vec<String>,
}

impl DiagnosticsSink for CollectingDiagnostics {
    fn report(&mut self, message: &str) {
        self.reports.push(message.to_owned());
    }

    fn notify(&mut self, message: &str, _seconds: f32) {
        self.notices.push(message.to_owned());
    }
}

/// Shares one sink between a manager and its owner.
impl<T: DiagnosticsSink> DiagnosticsSink for Rc<RefCell<T>> {
    fn report(&mut self, message: &str) {
        self.borrow_mut().report(message);
    }

    fn notify(&mut self, message: &str, seconds: f32) {
        self.borrow_mut().notify(message, seconds);
    }
}

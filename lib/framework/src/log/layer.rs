use std::fmt::Debug;
use std::fmt::Write as _;
use std::mem;
use std::sync::Arc;
use std::sync::Mutex;

use tracing::Event;
use tracing::Level;
use tracing::Subscriber;
use tracing::field::Field;
use tracing::field::Visit;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

#[derive(Clone, Default)]
pub struct WarningBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl WarningBuffer {
    pub fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().map(|lines| lines.is_empty()).unwrap_or(true)
    }

    pub fn drain(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|mut lines| mem::take(&mut *lines))
            .unwrap_or_default()
    }
}

pub(super) struct WarningLayer {
    pub(super) buffer: WarningBuffer,
}

impl<S> Layer<S> for WarningLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event, _context: Context<S>) {
        let level = event.metadata().level();
        if level != &Level::WARN && level != &Level::ERROR {
            return;
        }
        let mut line = format!("{level:>8}: ");
        let mut visitor = LogVisitor {
            message: String::new(),
            fields: String::new(),
        };
        event.record(&mut visitor);
        line.push_str(&visitor.message);
        if !visitor.fields.is_empty() {
            line.push(' ');
            line.push_str(visitor.fields.trim_end());
        }
        self.buffer.push(line);
    }
}

struct LogVisitor {
    message: String,
    fields: String,
}

impl Visit for LogVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        // backtrace carries the full exception chain, which is already in the log file
        if field.name() == "backtrace" {
            return;
        }
        if field.name() == "error_code" {
            let _ = write!(self.message, "[{value}] ");
        } else {
            let _ = write!(self.fields, "{}={} ", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, "{}={:?} ", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing::info;
    use tracing::warn;
    use tracing_subscriber::layer::SubscriberExt;

    use super::WarningBuffer;
    use super::WarningLayer;

    #[test]
    fn buffers_only_warnings() {
        let buffer = WarningBuffer::default();
        let subscriber = tracing_subscriber::registry().with(WarningLayer { buffer: buffer.clone() });
        tracing::subscriber::with_default(subscriber, || {
            info!("not buffered");
            warn!(koaid = "KB.20210116.57436.94", "archive_dir not set");
        });

        assert!(!buffer.is_empty());
        let lines = buffer.drain();
        assert_eq!(lines, vec!["    WARN: archive_dir not set koaid=KB.20210116.57436.94".to_owned()]);
        assert!(buffer.is_empty());
    }
}

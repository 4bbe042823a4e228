//! Compact formatting helpers for log output.

use std::fmt;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::engine::sim_clock;
use crate::types::Ticks;

/// Format a u64 with underscore grouping (groups of 3 from the right).
pub(crate) fn fmt_grouped(v: u64) -> String {
    let digits = v.to_string();
    let len = digits.len();
    if len <= 3 {
        return digits;
    }
    let mut result = String::with_capacity(len + (len - 1) / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push('_');
        }
        result.push(ch);
    }
    result
}

/// Tick timestamp with underscore-grouped digits, right-aligned.
///
/// - `[       57_000:T]`
pub struct FmtTick(pub Ticks);

impl fmt::Display for FmtTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>13}:T", fmt_grouped(self.0))
    }
}

/// Event formatter that stamps each line with the simulated tick.
///
/// A `pid` field is pulled in front of the message so log lines read like
/// trace lines:
///
/// - `[        1_000:T]  INFO (3) RUNNING >>> READY`
pub struct SimFormat;

impl<S, N> FormatEvent<S, N> for SimFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let stamp = FmtTick(sim_clock());
        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            write!(writer, "[{stamp}] {}{level:>5}\x1b[0m ", level_color(level))?;
        } else {
            write!(writer, "[{stamp}] {level:>5} ")?;
        }

        let mut line = EventLine::default();
        event.record(&mut line);
        if let Some(pid) = &line.pid {
            write!(writer, "({pid}) ")?;
        }
        writeln!(writer, "{}{}", line.message, line.fields)
    }
}

fn level_color(level: Level) -> &'static str {
    match level {
        Level::ERROR => "\x1b[31m",
        Level::WARN => "\x1b[33m",
        Level::INFO => "\x1b[32m",
        Level::DEBUG => "\x1b[34m",
        Level::TRACE => "\x1b[35m",
    }
}

/// One rendered event: the message, an optional pid, and the remaining
/// fields already formatted as ` key=value` pairs in record order.
#[derive(Default)]
struct EventLine {
    message: String,
    pid: Option<String>,
    fields: String,
}

impl EventLine {
    fn push(&mut self, field: &Field, value: impl fmt::Display) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "pid" => self.pid = Some(value.to_string()),
            name => {
                use std::fmt::Write as _;
                let _ = write!(self.fields, " {name}={value}");
            }
        }
    }
}

impl Visit for EventLine {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format_args!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, format_args!("{value:.4}"));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value);
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn test_grouped() {
        assert_eq!(fmt_grouped(0), "0");
        assert_eq!(fmt_grouped(999), "999");
        assert_eq!(fmt_grouped(1000), "1_000");
        assert_eq!(fmt_grouped(57_000), "57_000");
        assert_eq!(fmt_grouped(1_234_567), "1_234_567");
    }

    #[test]
    fn test_tick_width() {
        assert_eq!(FmtTick(1500).to_string(), "        1_500:T");
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_event_line_layout() {
        let out = Capture::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .event_format(SimFormat)
            .with_writer(move || writer.clone())
            .finish();

        crate::engine::set_sim_clock(1500);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(pid = 3, restored = true, "READY >>> RUNNING");
            tracing::warn!(chance = 0.25, "no pid here");
        });

        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            text,
            "[        1_500:T]  INFO (3) READY >>> RUNNING restored=true\n\
             [        1_500:T]  WARN no pid here chance=0.2500\n"
        );
    }
}

use std::time::{Duration, Instant};

use bytes::Bytes;

/// Timing and output of one engine operation.
///
/// The six timestamps are monotonic and always ordered
/// `request_start ≤ tx_start ≤ tx_end ≤ rx_start ≤ rx_end ≤ request_end`.
/// Write-only operations report `rx_start == rx_end == tx_end`; read-only
/// operations report `tx_start == tx_end == request_start`. `output` is present
/// only when the operation included a read.
#[derive(Debug, Clone)]
pub struct RequestResult {
    request_start: Instant,
    tx_start: Instant,
    tx_end: Instant,
    rx_start: Instant,
    rx_end: Instant,
    request_end: Instant,
    output: Option<Bytes>,
}

impl RequestResult {
    /// When request processing started.
    pub fn request_start(&self) -> Instant {
        self.request_start
    }

    /// When transmission of the request started.
    pub fn tx_start(&self) -> Instant {
        self.tx_start
    }

    /// When transmission of the request concluded.
    pub fn tx_end(&self) -> Instant {
        self.tx_end
    }

    /// When receiving of the response started.
    pub fn rx_start(&self) -> Instant {
        self.rx_start
    }

    /// When receiving of the response concluded.
    pub fn rx_end(&self) -> Instant {
        self.rx_end
    }

    /// When request processing concluded.
    pub fn request_end(&self) -> Instant {
        self.request_end
    }

    /// Logical response bytes, if the operation read anything.
    pub fn output(&self) -> Option<&[u8]> {
        self.output.as_deref()
    }

    pub fn into_output(self) -> Option<Bytes> {
        self.output
    }

    pub fn tx_duration(&self) -> Duration {
        self.tx_end - self.tx_start
    }

    pub fn rx_duration(&self) -> Duration {
        self.rx_end - self.rx_start
    }

    pub fn total_duration(&self) -> Duration {
        self.request_end - self.request_start
    }

    /// The six timestamps in their defined order.
    pub fn timeline(&self) -> [Instant; 6] {
        [
            self.request_start,
            self.tx_start,
            self.tx_end,
            self.rx_start,
            self.rx_end,
            self.request_end,
        ]
    }

    /// Replace the output and stamp a new end time (decorators unwrap after
    /// the inner engine returned).
    pub(crate) fn rewrap_output(mut self, output: Option<Bytes>) -> Self {
        self.output = output;
        self.request_end = self.request_end.max(Instant::now());
        self
    }
}

/// Collects timestamps for a [`RequestResult`], clamping every mark so the
/// ordering invariant holds even if a caller supplies an earlier instant.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Stopwatch {
    request_start: Instant,
    tx_start: Option<Instant>,
    tx_end: Option<Instant>,
    rx_start: Option<Instant>,
    rx_end: Option<Instant>,
}

impl Stopwatch {
    pub(crate) fn start() -> Self {
        Self {
            request_start: Instant::now(),
            tx_start: None,
            tx_end: None,
            rx_start: None,
            rx_end: None,
        }
    }

    fn floor(&self) -> Instant {
        self.rx_end
            .or(self.rx_start)
            .or(self.tx_end)
            .or(self.tx_start)
            .unwrap_or(self.request_start)
    }

    pub(crate) fn tx_start(&mut self) {
        self.tx_start_at(Instant::now());
    }

    pub(crate) fn tx_end(&mut self) {
        self.tx_end_at(Instant::now());
    }

    pub(crate) fn rx_start(&mut self) {
        self.rx_start_at(Instant::now());
    }

    pub(crate) fn rx_end(&mut self) {
        self.rx_end_at(Instant::now());
    }

    pub(crate) fn tx_start_at(&mut self, at: Instant) {
        self.tx_start = Some(at.max(self.floor()));
    }

    pub(crate) fn tx_end_at(&mut self, at: Instant) {
        self.tx_end = Some(at.max(self.floor()));
    }

    pub(crate) fn rx_start_at(&mut self, at: Instant) {
        self.rx_start = Some(at.max(self.floor()));
    }

    pub(crate) fn rx_end_at(&mut self, at: Instant) {
        self.rx_end = Some(at.max(self.floor()));
    }

    /// Fill unset phases as zero-length spans and stamp the end time.
    pub(crate) fn finish(self, output: Option<Bytes>) -> RequestResult {
        let tx_start = self.tx_start.unwrap_or(self.request_start);
        let tx_end = self.tx_end.unwrap_or(tx_start);
        let rx_start = self.rx_start.unwrap_or(tx_end);
        let rx_end = self.rx_end.unwrap_or(rx_start);
        let request_end = Instant::now().max(rx_end);

        RequestResult {
            request_start: self.request_start,
            tx_start,
            tx_end,
            rx_start,
            rx_end,
            request_end,
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_ordered(result: &RequestResult) {
        let timeline = result.timeline();
        for pair in timeline.windows(2) {
            assert!(pair[0] <= pair[1], "timeline out of order: {timeline:?}");
        }
    }

    #[test]
    fn write_only_collapses_receive_phase() {
        let mut sw = Stopwatch::start();
        sw.tx_start();
        sw.tx_end();
        let result = sw.finish(None);

        assert_ordered(&result);
        assert_eq!(result.rx_start(), result.tx_end());
        assert_eq!(result.rx_end(), result.tx_end());
        assert!(result.output().is_none());
    }

    #[test]
    fn read_only_collapses_transmit_phase() {
        let mut sw = Stopwatch::start();
        sw.rx_start();
        sw.rx_end();
        let result = sw.finish(Some(Bytes::from_static(b"ok")));

        assert_ordered(&result);
        assert_eq!(result.tx_start(), result.request_start());
        assert_eq!(result.tx_end(), result.request_start());
        assert_eq!(result.output(), Some(&b"ok"[..]));
    }

    #[test]
    fn earlier_marks_are_clamped() {
        let mut sw = Stopwatch::start();
        sw.tx_start();
        std::thread::sleep(Duration::from_millis(2));
        sw.tx_end();
        let before = sw.request_start;
        sw.rx_start_at(before);
        sw.rx_end_at(before);
        let result = sw.finish(Some(Bytes::new()));

        assert_ordered(&result);
        assert_eq!(result.rx_start(), result.tx_end());
    }

    #[test]
    fn future_rx_end_pushes_request_end() {
        let mut sw = Stopwatch::start();
        sw.rx_start();
        let later = Instant::now() + Duration::from_millis(50);
        sw.rx_end_at(later);
        let result = sw.finish(None);

        assert_ordered(&result);
        assert_eq!(result.request_end(), later);
        assert!(result.rx_duration() >= Duration::from_millis(50));
    }

    #[test]
    fn rewrap_keeps_order() {
        let result = Stopwatch::start().finish(Some(Bytes::from_static(b"wire")));
        let result = result.rewrap_output(Some(Bytes::from_static(b"w")));
        assert_ordered(&result);
        assert_eq!(result.output(), Some(&b"w"[..]));
        assert_eq!(result.into_output().unwrap().len(), 1);
    }
}

/// Bounds applied to every buffer that fills while a channel or proxy is blocked.
///
/// Blocked traffic is deferred, never dropped: once a buffer holds
/// `max_buffered` entries the next producer gets a `BufferFull` error and the
/// entries already held stay untouched.
#[derive(Clone, Debug)]
pub struct BufferConfig {
    /// Upper bound on entries held by a single channel FIFO, proxy outbound
    /// FIFO or input event downstream log
    pub max_buffered: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { max_buffered: 1024 }
    }
}

impl BufferConfig {
    pub fn bounded(max_buffered: usize) -> Self {
        Self { max_buffered }
    }
}

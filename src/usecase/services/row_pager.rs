use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::domain::entities::layer::RowPage;
use crate::usecase::ports::layer::{LayerError, RowSource};

type PageResult = Result<RowPage, LayerError>;

struct InFlight {
    rx: Receiver<PageResult>,
    cancel: Arc<AtomicBool>,
}

/// Loads attribute rows page by page on a worker thread.
///
/// At most one page is in flight. The finished page is handed to a
/// continuation on the caller's thread, either from [`RowPager::pump`] in an
/// event loop or from the blocking [`RowPager::wait`]. Dropping the pager
/// cancels the outstanding request without waiting for the worker.
pub struct RowPager {
    source: Arc<dyn RowSource>,
    page_size: usize,
    loaded: usize,
    exhausted: bool,
    in_flight: Option<InFlight>,
}

impl RowPager {
    pub fn new(source: Arc<dyn RowSource>, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            loaded: 0,
            exhausted: false,
            in_flight: None,
        }
    }

    pub fn loaded(&self) -> usize {
        self.loaded
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Starts loading the next page. Returns `false` when a page is already
    /// loading or every row has been loaded.
    pub fn request_more(&mut self) -> bool {
        if self.in_flight.is_some() || self.exhausted {
            return false;
        }

        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = cancel.clone();
        let source = self.source.clone();
        let offset = self.loaded;
        let limit = self.page_size;

        debug!(offset, limit, "requesting attribute rows");
        thread::spawn(move || {
            if worker_cancel.load(Ordering::SeqCst) {
                return;
            }
            let page = source.total_rows().and_then(|total_rows| {
                source.fetch_rows(offset, limit).map(|features| RowPage {
                    offset,
                    features,
                    total_rows,
                })
            });
            if worker_cancel.load(Ordering::SeqCst) {
                return;
            }
            // The receiver is gone when the pager was dropped meanwhile.
            let _ = tx.send(page);
        });

        self.in_flight = Some(InFlight { rx, cancel });
        true
    }

    /// Non-blocking: if the in-flight page has arrived, runs `on_page` with
    /// it and returns `true`.
    pub fn pump<F>(&mut self, on_page: F) -> bool
    where
        F: FnOnce(PageResult),
    {
        let Some(in_flight) = self.in_flight.as_ref() else {
            return false;
        };
        let received = match in_flight.rx.try_recv() {
            Ok(page) => page,
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Disconnected) => Err(worker_lost()),
        };
        self.in_flight = None;
        on_page(self.track(received));
        true
    }

    /// Blocks until the in-flight page arrives, then runs `on_page`.
    /// Returns `false` when nothing was loading.
    pub fn wait<F>(&mut self, on_page: F) -> bool
    where
        F: FnOnce(PageResult),
    {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };
        let received = in_flight.rx.recv().unwrap_or_else(|_| Err(worker_lost()));
        on_page(self.track(received));
        true
    }

    pub fn cancel(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            debug!(offset = self.loaded, "cancelling attribute row request");
            in_flight.cancel.store(true, Ordering::SeqCst);
        }
    }

    fn track(&mut self, received: PageResult) -> PageResult {
        match &received {
            Ok(page) => {
                self.loaded = page.offset + page.features.len();
                self.exhausted = page.is_last();
            }
            Err(err) => warn!(error = %err, "failed to load attribute rows"),
        }
        received
    }
}

impl Drop for RowPager {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn worker_lost() -> LayerError {
    LayerError::Message("row loading worker stopped without a result".to_string())
}

use crate::buffer::LatestValueBuffer;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::ingest::{IngestReport, SerialIngestor};
use crate::render::{RenderReport, RenderScheduler, Renderer};
use crate::transport::{SerialTransport, Transport};
use crate::types::Grid;
use crate::{Result, TofError};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Outcome of both threads after [`Pipeline::stop`].
#[derive(Debug)]
pub struct PipelineReport {
    /// `None` if the ingest result was already collected with
    /// [`Pipeline::wait_ingest`].
    pub ingest: Option<Result<IngestReport>>,
    pub render: Result<RenderReport>,
}

/// A running ingest thread and render thread joined by one
/// [`LatestValueBuffer`].
///
/// The two threads share nothing else. If ingestion ends on its own
/// (link lost), rendering keeps ticking under its policy until the
/// pipeline is stopped. Dropping the pipeline stops both threads.
pub struct Pipeline {
    buffer: Arc<LatestValueBuffer<Grid>>,
    cancel: CancelToken,
    ingest: Option<JoinHandle<Result<IngestReport>>>,
    render: Option<JoinHandle<RenderReport>>,
}

impl Pipeline {
    /// Open the configured serial port and start both threads.
    ///
    /// The port is opened on the calling thread, so an unopenable port is
    /// reported here and no renderer call ever happens.
    pub fn start<R>(config: &Config, renderer: R) -> Result<Pipeline>
    where
        R: Renderer + Send + 'static,
    {
        let port = SerialTransport::from_config(config)?;
        let reopen_config = config.clone();
        Self::start_with(
            port,
            move || SerialTransport::from_config(&reopen_config),
            config,
            renderer,
        )
    }

    /// Start both threads on an already-open transport. `reopen` is used
    /// only for reconnects.
    pub fn start_with<T, F, R>(
        port: T,
        mut reopen: F,
        config: &Config,
        mut renderer: R,
    ) -> Result<Pipeline>
    where
        T: Transport + 'static,
        F: FnMut() -> Result<T> + Send + 'static,
        R: Renderer + Send + 'static,
    {
        let buffer = Arc::new(LatestValueBuffer::new());
        let cancel = CancelToken::new();

        let ingestor = SerialIngestor::from_config(config);
        let ingest = {
            let (buffer, cancel) = (buffer.clone(), cancel.clone());
            let mut first = Some(port);
            std::thread::Builder::new()
                .name("tofgrid-ingest".into())
                .spawn(move || {
                    let open = || match first.take() {
                        Some(port) => Ok(port),
                        None => reopen(),
                    };
                    ingestor.run(open, &buffer, &cancel)
                })
                .map_err(|e| {
                    TofError::ThreadSpawn(format!("Failed to spawn ingest thread: {}", e))
                })?
        };

        let scheduler = RenderScheduler::from_config(config);
        let render = {
            let (buffer, cancel) = (buffer.clone(), cancel.clone());
            std::thread::Builder::new()
                .name("tofgrid-render".into())
                .spawn(move || scheduler.run(&buffer, &mut renderer, &cancel))
        };

        let render = match render {
            Ok(handle) => handle,
            Err(e) => {
                cancel.cancel();
                let _ = ingest.join();
                return Err(TofError::ThreadSpawn(format!(
                    "Failed to spawn render thread: {}",
                    e
                )));
            }
        };

        Ok(Pipeline {
            buffer,
            cancel,
            ingest: Some(ingest),
            render: Some(render),
        })
    }

    /// The handoff slot. Mostly useful for inspection; the ingest thread
    /// is its only writer.
    pub fn buffer(&self) -> &LatestValueBuffer<Grid> {
        &self.buffer
    }

    /// Whether the ingest thread is still reading.
    pub fn is_ingesting(&self) -> bool {
        self.ingest.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Block until ingestion ends (cancelled elsewhere or link lost) and
    /// return its result. Rendering continues. Returns `None` if already
    /// collected.
    pub fn wait_ingest(&mut self) -> Option<Result<IngestReport>> {
        let handle = self.ingest.take()?;
        Some(
            handle
                .join()
                .unwrap_or_else(|_| Err(TofError::ThreadPanicked("ingest"))),
        )
    }

    /// Stop both threads and collect their results.
    pub fn stop(mut self) -> PipelineReport {
        self.shutdown()
    }

    fn shutdown(&mut self) -> PipelineReport {
        self.cancel.cancel();
        let ingest = self.wait_ingest();
        let render = match self.render.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TofError::ThreadPanicked("render")),
            None => Ok(RenderReport::default()),
        };
        PipelineReport { ingest, render }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.ingest.is_some() || self.render.is_some() {
            let report = self.shutdown();
            if let Some(Err(e)) = report.ingest {
                log::warn!("Ingest ended with error: {}", e);
            }
        }
    }
}

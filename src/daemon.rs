//! The nudge daemon.
//!
//! Hosts the reminder service, receives wake-ups from the tokio scheduler
//! and serves the control socket. Each connection is a line-oriented JSON
//! session (see `protocol`); `subscribe` and `attach_page` turn it into a
//! push stream until the client hangs up.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::ChatCompletionsClient;
use crate::lock::FileLock;
use crate::notify;
use crate::pages::{PageAgent, PageHub, PageRequest};
use crate::presenter::{Presenter, PresenterSettings, TerminalHost};
use crate::protocol::{
    decode_frame, encode_frame, frame_error, frame_reader, ActiveTasks, ControlRequest,
    ControlResponse, PageAttached,
};
use crate::service::{ReminderService, ServiceDeps, ServiceEvent, ServiceOptions};
use crate::storage::Storage;
use crate::wakeup::TokioScheduler;

/// Options for `run`
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub socket: PathBuf,
    /// Present notifications on the daemon's own terminal
    pub local_page: bool,
}

impl DaemonOptions {
    pub fn from_config(config: &Config, storage: &Storage) -> Self {
        Self {
            socket: socket_path(config, storage),
            local_page: true,
        }
    }
}

/// Control socket location: `[daemon] socket` or the data directory default
pub fn socket_path(config: &Config, storage: &Storage) -> PathBuf {
    config
        .daemon
        .socket
        .clone()
        .unwrap_or_else(|| storage.socket_file())
}

/// Bind the control socket, replacing a stale socket file
pub fn bind(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(listener)
}

/// Run the daemon until ctrl-c
pub async fn run(config: &Config, storage: &Storage, options: DaemonOptions) -> Result<()> {
    storage.init()?;

    let lock_path = storage.daemon_lock_file();
    let Some(_instance) = FileLock::try_acquire(&lock_path)? else {
        return Err(Error::LockFailed(lock_path));
    };

    let (fired_tx, fired_rx) = mpsc::unbounded_channel();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let pages = Arc::new(PageHub::new());

    if options.local_page {
        let host = Arc::new(TerminalHost::new(&config.presenter, "nudge"));
        let presenter = Presenter::with_host(host, PresenterSettings::from(&config.presenter));
        pages.attach(Arc::new(presenter)).await;
    }

    let deps = ServiceDeps {
        model: Arc::new(ChatCompletionsClient::new(&config.model)?),
        slot: Arc::new(storage.task_slot()),
        scheduler: Arc::new(TokioScheduler::new(Arc::clone(&clock), fired_tx)?),
        notifier: Arc::from(notify::from_config(&config.notify)?),
        pages,
        clock,
    };
    let service = Arc::new(ReminderService::restore(deps, ServiceOptions::from(config)).await?);

    let listener = bind(&options.socket)?;
    tracing::info!(socket = %options.socket.display(), "daemon listening");

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let result = serve(service, listener, fired_rx, shutdown).await;

    if let Err(err) = std::fs::remove_file(&options.socket) {
        tracing::debug!(%err, "failed to remove control socket");
    }
    tracing::info!("daemon stopped");
    result
}

/// Accept control connections and route wake-ups until `shutdown` resolves
pub async fn serve(
    service: Arc<ReminderService>,
    listener: UnixListener,
    mut wake_ups: mpsc::UnboundedReceiver<String>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let service = Arc::clone(&service);
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(service, stream).await {
                            tracing::debug!(%err, "control connection ended with error");
                        }
                    });
                }
                Err(err) => tracing::warn!(%err, "accept failed"),
            },

            Some(name) = wake_ups.recv() => {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    let outcome = service.handle_wake_up(&name).await;
                    tracing::debug!(%name, ?outcome, "wake-up handled");
                });
            }

            () = &mut shutdown => {
                tracing::info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}

/// Page attached over the control socket
struct RemotePage {
    label: String,
    outbox: mpsc::UnboundedSender<PageRequest>,
}

#[async_trait]
impl PageAgent for RemotePage {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn deliver(&self, request: &PageRequest) -> Result<()> {
        self.outbox
            .send(request.clone())
            .map_err(|_| Error::PageClosed(self.label.clone()))
    }
}

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &ControlResponse) -> Result<()> {
    writer.write_all(&encode_frame(frame)?).await?;
    writer.flush().await?;
    Ok(())
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<ServiceEvent>>,
) -> std::result::Result<ServiceEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_page_request(
    outbox: &mut Option<mpsc::UnboundedReceiver<PageRequest>>,
) -> Option<PageRequest> {
    match outbox {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_connection(service: Arc<ReminderService>, stream: UnixStream) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut frames = frame_reader(reader);

    let mut events: Option<broadcast::Receiver<ServiceEvent>> = None;
    let mut outbox: Option<mpsc::UnboundedReceiver<PageRequest>> = None;
    let mut attached = None;

    let result = loop {
        tokio::select! {
            frame = frames.next() => {
                let line = match frame {
                    None => break Ok(()),
                    Some(Ok(line)) => line,
                    Some(Err(err)) => {
                        // The stream is unusable after a decode error; report it and hang up.
                        let err = frame_error(err);
                        let _ = write_frame(&mut writer, &ControlResponse::error(&err)).await;
                        break Err(err);
                    }
                };
                let reply = match decode_frame::<ControlRequest>(&line) {
                    Ok(ControlRequest::Subscribe) => {
                        events = Some(service.subscribe());
                        ControlResponse::ok(&())
                    }
                    Ok(ControlRequest::AttachPage { label }) => {
                        let (tx, rx) = mpsc::unbounded_channel();
                        let page = RemotePage { label, outbox: tx };
                        let page_id = service.pages().attach(Arc::new(page)).await;
                        if let Some(previous) = attached.replace(page_id) {
                            service.pages().detach(previous).await;
                        }
                        outbox = Some(rx);
                        let pages = service.pages().count().await;
                        tracing::debug!(pages, "remote page attached");
                        ControlResponse::ok(&PageAttached { page_id })
                    }
                    Ok(request) => dispatch(&service, request).await,
                    Err(err) => ControlResponse::error(&err),
                };
                if let Err(err) = write_frame(&mut writer, &reply).await {
                    break Err(err);
                }
            }

            event = next_event(&mut events) => match event {
                Ok(event) => {
                    if let Err(err) = write_frame(&mut writer, &ControlResponse::Event { event }).await {
                        break Err(err);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => events = None,
            },

            request = next_page_request(&mut outbox) => match request {
                Some(request) => {
                    if let Err(err) = write_frame(&mut writer, &ControlResponse::Page { request }).await {
                        break Err(err);
                    }
                }
                None => outbox = None,
            },
        }
    };

    if let Some(page_id) = attached {
        service.pages().detach(page_id).await;
    }
    result
}

async fn dispatch(service: &ReminderService, request: ControlRequest) -> ControlResponse {
    match request {
        ControlRequest::SubmitTask { text, context } => {
            ControlResponse::from_result(service.submit_task(&text, context.as_deref()).await)
        }
        ControlRequest::ListActiveTasks => {
            let tasks = service.list_active_tasks().await;
            let wake_ups = service.scheduled_wake_ups().await;
            ControlResponse::ok(&ActiveTasks {
                now: service.now(),
                tasks,
                wake_ups,
            })
        }
        ControlRequest::RunSelfTest => ControlResponse::ok(&service.run_self_test().await),
        ControlRequest::ClearAll => ControlResponse::from_result(service.clear_all().await),
        ControlRequest::Subscribe | ControlRequest::AttachPage { .. } => ControlResponse::error(
            &Error::Protocol("streaming request handled by the connection".to_string()),
        ),
    }
}

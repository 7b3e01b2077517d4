//! Control socket client used by the CLI front ends.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use crate::error::{Error, Result};
use crate::pages::PageRequest;
use crate::protocol::{
    decode_frame, encode_frame, frame_error, frame_reader, ActiveTasks, ControlRequest,
    ControlResponse, FrameReader, PageAttached,
};
use crate::service::{ClearReport, SelfTestReport, ServiceEvent, Submission};

pub struct ControlClient {
    socket: PathBuf,
    frames: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ControlClient {
    /// Connect to a running daemon
    pub async fn connect(socket: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket).await.map_err(|err| {
            tracing::debug!(socket = %socket.display(), %err, "connect failed");
            Error::DaemonUnavailable(socket.to_path_buf())
        })?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            socket: socket.to_path_buf(),
            frames: frame_reader(reader),
            writer,
        })
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    async fn send(&mut self, request: &ControlRequest) -> Result<()> {
        self.writer.write_all(&encode_frame(request)?).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Next frame from the daemon; `None` once the daemon hangs up
    ///
    /// Cancel safe: dropping the future never loses part of a frame.
    async fn next_frame(&mut self) -> Result<Option<ControlResponse>> {
        match self.frames.next().await {
            None => Ok(None),
            Some(Ok(line)) => decode_frame(&line).map(Some),
            Some(Err(err)) => Err(frame_error(err)),
        }
    }

    /// Send a request and wait for its reply, skipping pushed frames
    async fn call<T: DeserializeOwned>(&mut self, request: ControlRequest) -> Result<T> {
        self.send(&request).await?;
        loop {
            match self.next_frame().await? {
                Some(frame) if frame.is_reply() => return frame.into_payload(),
                Some(_) => continue,
                None => {
                    return Err(Error::Protocol(
                        "daemon closed the connection before replying".to_string(),
                    ))
                }
            }
        }
    }

    pub async fn submit_task(&mut self, text: &str, context: Option<&str>) -> Result<Submission> {
        self.call(ControlRequest::SubmitTask {
            text: text.to_string(),
            context: context.map(str::to_string),
        })
        .await
    }

    pub async fn list_active_tasks(&mut self) -> Result<ActiveTasks> {
        self.call(ControlRequest::ListActiveTasks).await
    }

    pub async fn run_self_test(&mut self) -> Result<SelfTestReport> {
        self.call(ControlRequest::RunSelfTest).await
    }

    pub async fn clear_all(&mut self) -> Result<ClearReport> {
        self.call(ControlRequest::ClearAll).await
    }

    /// Start receiving service events on this connection
    pub async fn subscribe(&mut self) -> Result<()> {
        self.call::<serde_json::Value>(ControlRequest::Subscribe)
            .await
            .map(|_| ())
    }

    /// Wait for the next service event; `None` when the daemon goes away
    pub async fn next_event(&mut self) -> Result<Option<ServiceEvent>> {
        loop {
            match self.next_frame().await? {
                Some(ControlResponse::Event { event }) => return Ok(Some(event)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Register this connection as a page
    pub async fn attach_page(&mut self, label: &str) -> Result<PageAttached> {
        self.call(ControlRequest::AttachPage {
            label: label.to_string(),
        })
        .await
    }

    /// Wait for the next request addressed to the attached page
    pub async fn next_page_request(&mut self) -> Result<Option<PageRequest>> {
        loop {
            match self.next_frame().await? {
                Some(ControlResponse::Page { request }) => return Ok(Some(request)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Full-duplex message channel to the hub.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::{
	error::{ChannelError, SessionError},
	protocol::{ClientMessage, HubMessage},
};

/// One open connection to the hub, exchanging whole protocol messages.
#[async_trait]
pub trait Channel: Send {
	/// Writes one message, returning once the write has completed.
	async fn send(&mut self, message: &ClientMessage) -> Result<(), ChannelError>;

	/// Waits for the next protocol message.
	async fn recv(&mut self) -> Result<HubMessage, ChannelError>;

	/// Closes the connection. Errors are ignored.
	async fn close(&mut self);
}

/// Opens channels to the hub.
#[async_trait]
pub trait Connector: Send + Sync {
	type Channel: Channel;

	async fn connect(&self) -> Result<Self::Channel, SessionError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Channel over a WebSocket connection carrying JSON text frames.
pub struct WsChannel {
	stream: WsStream,
}

impl WsChannel {
	pub fn new(stream: WsStream) -> Self {
		Self {
			stream,
		}
	}
}

#[async_trait]
impl Channel for WsChannel {
	async fn send(&mut self, message: &ClientMessage) -> Result<(), ChannelError> {
		let json = serde_json::to_string(message)?;
		self.stream.send(Message::Text(json.into())).await?;
		Ok(())
	}

	async fn recv(&mut self) -> Result<HubMessage, ChannelError> {
		loop {
			match self.stream.next().await {
				Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(text.as_str())?),
				Some(Ok(Message::Binary(data))) => return Ok(serde_json::from_slice(&data)?),
				Some(Ok(Message::Ping(data))) => {
					self.stream.send(Message::Pong(data)).await?;
				}
				Some(Ok(Message::Close(_))) | None => return Err(ChannelError::Closed),
				Some(Ok(_)) => {}
				Some(Err(e)) => return Err(e.into()),
			}
		}
	}

	async fn close(&mut self) {
		let _ = self.stream.close(None).await;
	}
}

/// Dials the hub over `ws://` or `wss://`.
#[derive(Debug, Clone)]
pub struct WsConnector {
	url: String,
}

impl WsConnector {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
		}
	}

	pub fn url(&self) -> &str {
		&self.url
	}
}

#[async_trait]
impl Connector for WsConnector {
	type Channel = WsChannel;

	async fn connect(&self) -> Result<WsChannel, SessionError> {
		let (stream, _) = connect_async(self.url.as_str()).await.map_err(|e| SessionError::Dial(e.to_string()))?;
		Ok(WsChannel::new(stream))
	}
}

//! Per-connection request loop.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::message::Message;
use crate::protocol::{self, Command, ParseResult, ProtocolError};
use crate::service::{HelloWorld, HELLO_OPERATION};

use super::dispatcher::ChannelDispatcher;

/// Read buffer size
const BUFFER_SIZE: usize = 4 * 1024;

/// Serve one client until EOF, `QUIT`, or an over-long line.
///
/// Every complete command is answered in order; pipelined commands in one
/// read are all handled before reading again.
pub async fn handle_connection<S>(
    mut stream: S,
    dispatcher: &ChannelDispatcher,
    service: &dyn HelloWorld,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        match protocol::parse(&buffer) {
            ParseResult::Complete(Command::Quit, consumed) => {
                buffer.advance(consumed);
                stream.write_all(protocol::response_ok()).await?;
                trace!("Client quit");
                return Ok(());
            }

            ParseResult::Complete(Command::Hello(name), consumed) => {
                buffer.advance(consumed);
                let request = Message::request(HELLO_OPERATION, name);
                let response = match dispatcher.dispatch(&request, service) {
                    Some(reply) => protocol::encode_reply(&reply),
                    None => protocol::response_error("no endpoint for operation"),
                };
                stream.write_all(&response).await?;
            }

            ParseResult::Error(ProtocolError::LineTooLong, _) => {
                debug!(len = buffer.len(), "Line too long, closing connection");
                stream
                    .write_all(&protocol::response_error(
                        &ProtocolError::LineTooLong.to_string(),
                    ))
                    .await?;
                return Ok(());
            }

            ParseResult::Error(e, consumed) => {
                debug!(error = %e, "Protocol error");
                buffer.advance(consumed);
                stream.write_all(&protocol::response_error(&e.to_string())).await?;
            }

            ParseResult::Incomplete => {
                let n = stream.read_buf(&mut buffer).await?;
                if n == 0 {
                    trace!("Connection closed by client");
                    return Ok(());
                }
            }
        }
    }
}

//! TCP transport for the realtime gateway.
//!
//! One JSON frame per line in both directions. A connection may open with
//! `{"event":"auth","data":{"token":"..."}}`; connections without a known
//! token are readers. Frames are read as raw bytes: invalid UTF-8 and
//! oversized frames become `error` events and the connection stays open.

use log::{info, warn};
use serde::Deserialize;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use storyline_core::{
    open_db, Gateway, IdentityProvider, StaticIdentityProvider, StoryConfig, SystemClock, UserId,
};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpListener;

/// Settings for `storyline serve`.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub db_path: PathBuf,
    pub bind: String,
    pub identity: StaticIdentityProvider,
    pub story: StoryConfig,
}

impl ServeConfig {
    pub fn new(db_path: PathBuf, bind: String, writer_tokens: &str) -> Self {
        Self {
            db_path,
            bind,
            identity: StaticIdentityProvider::parse(writer_tokens),
            story: StoryConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct AuthFrame {
    event: String,
    data: AuthData,
}

#[derive(Deserialize)]
struct AuthData {
    token: String,
}

/// Runs the gateway until Ctrl-C.
pub async fn run(config: ServeConfig) -> Result<(), Box<dyn Error>> {
    let conn = open_db(&config.db_path)?;
    let gateway = Gateway::new(conn, config.story, Arc::new(SystemClock));
    let identity: Arc<dyn IdentityProvider> = Arc::new(config.identity);
    let _opening_timer = gateway.spawn_opening_timer();

    let listener = TcpListener::bind(&config.bind).await?;
    info!(
        "event=serve_start module=cli status=ok bind={} db={}",
        config.bind,
        config.db_path.display()
    );
    println!("storyline listening on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let gateway = gateway.clone();
                let identity = Arc::clone(&identity);
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(gateway, identity, stream, peer).await {
                        warn!(
                            "event=connection module=cli status=error peer={} error={}",
                            peer, err
                        );
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("event=serve_stop module=cli status=ok");
                return Ok(());
            }
        }
    }
}

/// Longest frame accepted, newline excluded.
const MAX_FRAME_BYTES: usize = 16 * 1024;

/// One line read from a connection.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line(Vec<u8>),
    Oversized,
    Closed,
}

async fn serve_connection<S>(
    gateway: Gateway,
    identity: Arc<dyn IdentityProvider>,
    stream: S,
    peer: SocketAddr,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let first = read_frame(&mut reader).await?;
    let (user_id, pending) = match first {
        Frame::Closed => return Ok(()),
        Frame::Line(bytes) => match auth_token(&bytes) {
            Some(token) => (identity.resolve(Some(token.as_str())), None),
            None => (None::<UserId>, Some(Frame::Line(bytes))),
        },
        Frame::Oversized => (None, Some(Frame::Oversized)),
    };

    let (mut session, mut outbox) = gateway.connect(user_id);
    info!(
        "event=connection module=cli status=ok peer={} session_id={} writer={}",
        peer,
        session.id(),
        user_id.is_some()
    );

    let writer = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let Ok(mut frame) = event.encode() else {
                continue;
            };
            frame.push('\n');
            if write_half.write_all(frame.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut next = pending;
    loop {
        let frame = match next.take() {
            Some(frame) => frame,
            None => read_frame(&mut reader).await?,
        };
        match frame {
            Frame::Closed => break,
            Frame::Oversized => gateway.reject_frame(&session, "frame too large"),
            Frame::Line(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => {}
            Frame::Line(bytes) => gateway.handle_bytes(&mut session, &bytes).await,
        }
    }

    // The writer drains what is queued, then stops once every sender is gone.
    drop(session);
    let _ = writer.await;
    Ok(())
}

/// Reads one newline-terminated frame without trusting its encoding.
///
/// Frames longer than [`MAX_FRAME_BYTES`] are skipped up to their newline.
async fn read_frame<R>(reader: &mut R) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_FRAME_BYTES as u64 + 1)
        .read_until(b'\n', &mut line)
        .await?;
    if read == 0 {
        return Ok(Frame::Closed);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        return Ok(Frame::Line(line));
    }
    if line.len() > MAX_FRAME_BYTES {
        discard_line(reader).await?;
        return Ok(Frame::Oversized);
    }
    // Last frame of a stream that ended without a newline.
    Ok(Frame::Line(line))
}

async fn discard_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|byte| *byte == b'\n') {
            Some(at) => {
                reader.consume(at + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}

fn auth_token(frame: &[u8]) -> Option<String> {
    serde_json::from_slice::<AuthFrame>(frame)
        .ok()
        .filter(|auth| auth.event == "auth")
        .map(|auth| auth.data.token)
}

#[cfg(test)]
mod tests {
    use super::{auth_token, read_frame, serve_connection, Frame, MAX_FRAME_BYTES};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use storyline_core::gateway::protocol::ServerEvent;
    use storyline_core::{
        open_db_in_memory, Gateway, IdentityProvider, StaticIdentityProvider, StoryConfig,
        SystemClock,
    };
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf};

    fn peer() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    async fn next_event(lines: &mut Lines<BufReader<ReadHalf<DuplexStream>>>) -> ServerEvent {
        let line = lines.next_line().await.unwrap().expect("server closed early");
        ServerEvent::decode(&line).unwrap()
    }

    fn error_code(event: &ServerEvent) -> &str {
        match event {
            ServerEvent::Error(error) => &error.code,
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn recognizes_only_auth_frames() {
        assert_eq!(
            auth_token(br#"{"event":"auth","data":{"token":"s3cret"}}"#).as_deref(),
            Some("s3cret")
        );
        assert_eq!(auth_token(br#"{"event":"join"}"#), None);
        assert_eq!(auth_token(b"garbage"), None);
        assert_eq!(auth_token(b"\xff\xfe"), None);
    }

    #[tokio::test]
    async fn oversized_frames_are_skipped_to_the_next_line() {
        let mut input = vec![b'x'; MAX_FRAME_BYTES + 10];
        input.extend_from_slice(b"\nnext\ntail");
        let mut reader = BufReader::new(&input[..]);

        assert_eq!(read_frame(&mut reader).await.unwrap(), Frame::Oversized);
        assert_eq!(
            read_frame(&mut reader).await.unwrap(),
            Frame::Line(b"next".to_vec())
        );
        assert_eq!(
            read_frame(&mut reader).await.unwrap(),
            Frame::Line(b"tail".to_vec())
        );
        assert_eq!(read_frame(&mut reader).await.unwrap(), Frame::Closed);
    }

    #[tokio::test]
    async fn undecodable_frames_keep_the_connection_open() {
        let gateway = Gateway::new(
            open_db_in_memory().unwrap(),
            StoryConfig::default(),
            Arc::new(SystemClock),
        );
        let identity: Arc<dyn IdentityProvider> = Arc::new(StaticIdentityProvider::new());
        let (client, server) = tokio::io::duplex(64 * 1024);
        let connection = tokio::spawn(serve_connection(gateway, identity, server, peer()));

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();
        let mut input = b"{\"event\":\"join\"}\n\xff\xfe\n".to_vec();
        input.extend(vec![b'x'; MAX_FRAME_BYTES + 1]);
        input.extend_from_slice(b"\n{\"event\":\"resync\"}\n");
        write_half.write_all(&input).await.unwrap();

        assert!(matches!(next_event(&mut lines).await, ServerEvent::State(_)));
        assert_eq!(error_code(&next_event(&mut lines).await), "BAD_REQUEST");
        assert_eq!(error_code(&next_event(&mut lines).await), "BAD_REQUEST");
        assert!(matches!(next_event(&mut lines).await, ServerEvent::Resync(_)));

        write_half.shutdown().await.unwrap();
        assert!(connection.await.unwrap().is_ok());
    }
}

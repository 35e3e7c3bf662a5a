//! Transport primitives for the shipping worker.
//!
//! Every transport exposes the same connect/send/is-connected/close contract
//! so the worker can drive any of them through a [`TransportSession`]
//! (see [`super::session`]). The concrete transport is chosen at runtime from
//! [`TransportKind`].
//!
//! Address resolution differs per transport:
//! - UDP resolves symbolic host names.
//! - TCP accepts literal IP addresses only and rejects names with
//!   `ErrorKind::InvalidInput`.
//! - WebSocket accepts a `ws://` URI (the port argument is then ignored) or a
//!   bare host name combined with the port, and resolves names.
//!
//! [`TransportSession`]: super::session::TransportSession

use std::{
    io::{self, Write},
    net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket},
    time::Duration,
};

use serde::Deserialize;
use tungstenite::{Message, WebSocket, http::Uri};

/// Byte-level network transport driven by the shipping worker.
///
/// Implementations must release every OS handle in [`close`](Self::close)
/// and tolerate repeated calls to it.
pub trait Transport: Send {
    /// Open the underlying connection to `host:port`.
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()>;
    /// Write one payload, returning the number of bytes sent.
    fn send(&mut self, payload: &[u8]) -> io::Result<usize>;
    /// Liveness poll for an open connection.
    fn is_connected(&self) -> bool;
    fn close(&mut self);
}

/// Transport selected by configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Connectionless datagrams.
    #[default]
    Udp,
    /// Plain TCP stream, literal addresses only.
    Tcp,
    /// WebSocket text frames over TCP.
    #[serde(alias = "ws")]
    WebSocket,
}

impl TransportKind {
    /// Whether the transport accepts symbolic host names.
    pub fn resolves_hostnames(self) -> bool {
        !matches!(self, TransportKind::Tcp)
    }

    /// Create an unconnected transport of this kind.
    pub fn build(self, connect_timeout: Duration, write_timeout: Duration) -> Box<dyn Transport> {
        match self {
            TransportKind::Udp => Box::new(UdpTransport::new(write_timeout)),
            TransportKind::Tcp => Box::new(TcpTransport::new(connect_timeout, write_timeout)),
            TransportKind::WebSocket => {
                Box::new(WebSocketTransport::new(connect_timeout, write_timeout))
            }
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is not connected")
}

/// Whether a pending socket error still means the connection is usable.
///
/// Some socket layers report `ENOTCONN` for a stream that is in fact alive,
/// so both "no error" and `NotConnected` count as alive.
pub(crate) fn socket_error_is_benign(pending: io::Result<Option<io::Error>>) -> bool {
    match pending {
        Ok(None) => true,
        Ok(Some(err)) | Err(err) => err.kind() == io::ErrorKind::NotConnected,
    }
}

/// Datagram transport.
///
/// "Connected" only means a local socket exists and the collector address
/// has been resolved; delivery is never confirmed.
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    dest: Option<SocketAddr>,
    write_timeout: Duration,
}

impl UdpTransport {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            socket: None,
            dest: None,
            write_timeout,
        }
    }
}

impl Transport for UdpTransport {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        self.close();
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        // prefer IPv4
        let dest = addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no address found for {host}"),
                )
            })?;
        let local = match dest {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = UdpSocket::bind(local)?;
        socket.set_write_timeout(Some(self.write_timeout))?;
        self.socket = Some(socket);
        self.dest = Some(dest);
        Ok(())
    }

    fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        match (&self.socket, self.dest) {
            (Some(socket), Some(dest)) => socket.send_to(payload, dest),
            _ => Err(not_connected()),
        }
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn close(&mut self) {
        self.socket = None;
        self.dest = None;
    }
}

/// Stream transport over plain TCP.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            stream: None,
            connect_timeout,
            write_timeout,
        }
    }
}

fn literal_addr(host: &str, port: u16) -> io::Result<SocketAddr> {
    let ip: IpAddr = host.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("tcp transport needs a literal IP address, got {host:?}"),
        )
    })?;
    Ok(SocketAddr::new(ip, port))
}

impl Transport for TcpTransport {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        self.close();
        let addr = literal_addr(host, port)?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        stream.set_write_timeout(Some(self.write_timeout))?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.write_all(payload)?;
        Ok(payload.len())
    }

    fn is_connected(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|stream| socket_error_is_benign(stream.take_error()))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Message-framed transport sending each line as a WebSocket text frame.
///
/// Frames from the collector are drained before every send: pings are
/// answered by `tungstenite` on the following write and a close frame fails
/// the send so the worker reconnects.
pub struct WebSocketTransport {
    socket: Option<WebSocket<TcpStream>>,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            socket: None,
            connect_timeout,
            write_timeout,
        }
    }
}

/// Build the endpoint URL from a configured host and port.
pub fn websocket_url(host: &str, port: u16) -> String {
    if host.contains("://") {
        host.to_owned()
    } else {
        format!("ws://{host}:{port}/")
    }
}

fn ws_error(err: tungstenite::Error) -> io::Error {
    match err {
        tungstenite::Error::Io(io_err) => io_err,
        other => io::Error::other(other),
    }
}

fn drain_incoming(socket: &mut WebSocket<TcpStream>) -> io::Result<()> {
    socket.get_mut().set_nonblocking(true)?;
    let outcome = loop {
        match socket.read() {
            Ok(Message::Close(_)) => {
                break Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "collector closed the websocket",
                ));
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {
                break Ok(());
            }
            Err(err) => break Err(ws_error(err)),
        }
    };
    socket.get_mut().set_nonblocking(false)?;
    outcome
}

fn connect_stream(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no address found for {host}"),
        )
    }))
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        self.close();
        let url = websocket_url(host, port);
        let uri: Uri = url
            .parse()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        if uri.scheme_str() != Some("ws") {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported websocket scheme in {url:?}"),
            ));
        }
        let target = uri.host().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("no host in {url:?}"))
        })?;
        let target = target.trim_start_matches('[').trim_end_matches(']');
        let stream = connect_stream(target, uri.port_u16().unwrap_or(80), self.connect_timeout)?;
        // a silent peer must not stall the handshake forever
        stream.set_read_timeout(Some(self.connect_timeout))?;
        stream.set_write_timeout(Some(self.write_timeout))?;
        let (socket, _response) = tungstenite::client::client(url.as_str(), stream)
            .map_err(|err| io::Error::other(err.to_string()))?;
        self.socket = Some(socket);
        Ok(())
    }

    fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        let socket = self.socket.as_mut().ok_or_else(not_connected)?;
        drain_incoming(socket)?;
        let text = String::from_utf8_lossy(payload).into_owned();
        socket.send(Message::text(text)).map_err(ws_error)?;
        Ok(payload.len())
    }

    fn is_connected(&self) -> bool {
        self.socket.as_ref().is_some_and(|socket| socket.can_write())
    }

    fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None);
            let _ = socket.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{Receiver, Sender, bounded};
    use rstest::rstest;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[rstest]
    #[case(Ok(None), true)]
    #[case(Ok(Some(io::Error::from(io::ErrorKind::NotConnected))), true)]
    #[case(Err(io::Error::from(io::ErrorKind::NotConnected)), true)]
    #[case(Ok(Some(io::Error::from(io::ErrorKind::ConnectionReset))), false)]
    #[case(Err(io::Error::from(io::ErrorKind::BrokenPipe)), false)]
    fn classifies_pending_socket_errors(
        #[case] pending: io::Result<Option<io::Error>>,
        #[case] alive: bool,
    ) {
        assert_eq!(socket_error_is_benign(pending), alive);
    }

    #[rstest]
    #[case("10.0.0.5", 8080, "ws://10.0.0.5:8080/")]
    #[case("ws://collector.local:1234/logs", 9, "ws://collector.local:1234/logs")]
    fn builds_websocket_urls(#[case] host: &str, #[case] port: u16, #[case] expected: &str) {
        assert_eq!(websocket_url(host, port), expected);
    }

    #[rstest]
    fn only_tcp_rejects_hostnames() {
        assert!(TransportKind::Udp.resolves_hostnames());
        assert!(TransportKind::WebSocket.resolves_hostnames());
        assert!(!TransportKind::Tcp.resolves_hostnames());
    }

    #[rstest]
    fn udp_resolves_hostnames_and_delivers() {
        let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        receiver.set_read_timeout(Some(TIMEOUT)).unwrap();
        let port = receiver.local_addr().unwrap().port();

        let mut transport = UdpTransport::new(TIMEOUT);
        transport.connect("localhost", port).expect("connect");
        assert!(transport.is_connected());
        assert_eq!(transport.send(b"hello").expect("send"), 5);

        let mut buf = [0u8; 16];
        let (len, _) = receiver.recv_from(&mut buf).expect("datagram");
        assert_eq!(&buf[..len], b"hello");

        transport.close();
        transport.close();
        assert!(!transport.is_connected());
        assert_eq!(
            transport.send(b"late").unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
    }

    #[rstest]
    fn tcp_rejects_symbolic_hosts() {
        let mut transport = TcpTransport::new(TIMEOUT, TIMEOUT);
        let err = transport.connect("localhost", 9).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(!transport.is_connected());
    }

    #[rstest]
    fn tcp_streams_payloads() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).expect("read");
            buf
        });

        let mut transport = TcpTransport::new(TIMEOUT, TIMEOUT);
        transport.connect("127.0.0.1", port).expect("connect");
        assert!(transport.is_connected());
        transport.send(b"one\n").expect("send");
        transport.send(b"two\n").expect("send");
        transport.close();

        assert_eq!(server.join().expect("server"), b"one\ntwo\n");
    }

    #[rstest]
    fn tcp_connect_failure_leaves_no_handle() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut transport = TcpTransport::new(TIMEOUT, TIMEOUT);
        assert!(transport.connect("127.0.0.1", port).is_err());
        assert!(!transport.is_connected());
    }

    #[rstest]
    fn websocket_sends_text_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut socket = tungstenite::accept(stream).expect("handshake");
            let msg = socket.read().expect("frame");
            msg.into_text().expect("text frame").as_str().to_owned()
        });

        let mut transport = WebSocketTransport::new(TIMEOUT, TIMEOUT);
        transport.connect("127.0.0.1", port).expect("connect");
        assert!(transport.is_connected());
        transport.send(b"framed line").expect("send");

        assert_eq!(server.join().expect("server"), "framed line");
        transport.close();
        assert!(!transport.is_connected());
    }

    fn ws_server<T: Send + 'static>(
        serve: impl FnOnce(WebSocket<TcpStream>, Sender<()>) -> T + Send + 'static,
    ) -> (u16, Receiver<()>, thread::JoinHandle<T>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().unwrap().port();
        let (ready_tx, ready_rx) = bounded(1);
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            stream.set_read_timeout(Some(TIMEOUT)).unwrap();
            let socket = tungstenite::accept(stream).expect("handshake");
            serve(socket, ready_tx)
        });
        (port, ready_rx, server)
    }

    #[rstest]
    fn websocket_answers_collector_pings() {
        let (port, ready, server) = ws_server(|mut socket, ready| {
            socket.send(Message::Ping(b"beat".to_vec().into())).expect("ping");
            ready.send(()).unwrap();
            let mut frames = Vec::new();
            loop {
                match socket.read().expect("frame") {
                    Message::Pong(payload) => frames.push(format!("pong:{payload:?}")),
                    Message::Text(text) => {
                        frames.push(text.as_str().to_owned());
                        break;
                    }
                    _ => {}
                }
            }
            frames
        });

        let mut transport = WebSocketTransport::new(TIMEOUT, TIMEOUT);
        transport.connect("127.0.0.1", port).expect("connect");
        ready.recv_timeout(TIMEOUT).expect("server pinged");
        thread::sleep(Duration::from_millis(50));
        transport.send(b"after ping").expect("send");

        let frames = server.join().expect("server");
        assert_eq!(frames.len(), 2, "{frames:?}");
        assert!(frames[0].starts_with("pong:"));
        assert_eq!(frames[1], "after ping");
        transport.close();
    }

    #[rstest]
    fn websocket_close_frame_fails_next_send() {
        let (port, ready, server) = ws_server(|mut socket, ready| {
            socket.close(None).expect("close");
            let _ = socket.flush();
            ready.send(()).unwrap();
            while socket.read().is_ok() {}
        });

        let mut transport = WebSocketTransport::new(TIMEOUT, TIMEOUT);
        transport.connect("127.0.0.1", port).expect("connect");
        ready.recv_timeout(TIMEOUT).expect("server closed");
        thread::sleep(Duration::from_millis(50));
        assert!(transport.send(b"too late").is_err());
        transport.close();
        server.join().expect("server");
    }

    #[rstest]
    fn websocket_rejects_secure_scheme() {
        let mut transport = WebSocketTransport::new(TIMEOUT, TIMEOUT);
        let err = transport.connect("wss://127.0.0.1:1/", 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}

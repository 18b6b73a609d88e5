//! End-to-end service tests: a real lobby socket, the connection header, the
//! plaintext handshake, and gate/file request traffic.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use shardfish_server::config::Config;
use shardfish_server::game::HostRegistry;
use shardfish_server::net::channel::msg_channel;
use shardfish_server::net::{ClientRegistry, ShutdownSignal};
use shardfish_server::sdl::DescriptorDb;
use shardfish_server::server::ShardServer;

fn test_keys() -> shardfish_server::net::crypt::CryptKeys {
    let mut n = [0u8; 64];
    let mut k = [0u8; 64];
    for i in 0..64 {
        n[i] = (i as u8).wrapping_mul(13).wrapping_add(5);
        k[i] = (i as u8).wrapping_mul(19).wrapping_add(9);
    }
    n[0] |= 0x80;
    n[63] |= 1;
    shardfish_server::net::crypt::CryptKeys { n, k }
}

/// A server wired up for socket tests: no database behind the auth channel.
async fn spawn_test_server(mut config: Config) -> (std::net::SocketAddr, Arc<ShardServer>) {
    config.auth_keys = Some(test_keys());
    config.game_keys = Some(test_keys());
    config.gate_keys = Some(test_keys());

    let (auth_channel, _auth_pump) = msg_channel();
    let server = Arc::new(ShardServer {
        config: Arc::new(config),
        auth_channel,
        sdl_db: Arc::new(DescriptorDb::new()),
        ages: Arc::new(HashMap::new()),
        hosts: HostRegistry::default(),
        shutdown: ShutdownSignal::new(),
        auth_clients: Arc::new(ClientRegistry::default()),
        file_clients: Arc::new(ClientRegistry::default()),
        gate_clients: Arc::new(ClientRegistry::default()),
        game_clients: Arc::new(ClientRegistry::default()),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(shardfish_server::net::lobby::run(listener, server.clone()));
    (addr, server)
}

/// Send the lobby connection header for one service.
async fn send_conn_header(stream: &mut TcpStream, conn_type: u8) {
    let mut header = Vec::new();
    header.push(conn_type);
    header.extend_from_slice(&31u16.to_le_bytes()); // header size
    header.extend_from_slice(&0u32.to_le_bytes()); // build id
    header.extend_from_slice(&50u32.to_le_bytes()); // build type
    header.extend_from_slice(&1u32.to_le_bytes()); // branch id
    header.extend_from_slice(&[0u8; 16]); // product uuid
    stream.write_all(&header).await.unwrap();
}

/// The encrypted services read `{u32 size, 16-byte token}` then the connect
/// message; a 2-byte connect selects a plaintext session.
async fn plaintext_handshake(stream: &mut TcpStream) {
    let mut header = Vec::new();
    header.extend_from_slice(&20u32.to_le_bytes());
    header.extend_from_slice(&[0u8; 16]);
    header.extend_from_slice(&[0u8, 2]); // CliToServ_Connect, size 2
    stream.write_all(&header).await.unwrap();

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0, 2]);
}

async fn read_utf16_field(stream: &mut TcpStream) -> String {
    let count = stream.read_u16_le().await.unwrap() as usize;
    let mut units = Vec::with_capacity(count);
    for _ in 0..count {
        units.push(stream.read_u16_le().await.unwrap());
    }
    String::from_utf16(&units).unwrap()
}

#[tokio::test]
async fn gate_returns_configured_addresses() {
    let mut config = Config::default();
    config.file_server_addr = "files.shard.example".to_string();
    config.auth_server_addr = "auth.shard.example".to_string();
    let (addr, _server) = spawn_test_server(config).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    send_conn_header(&mut stream, 22).await;
    plaintext_handshake(&mut stream).await;

    // FileServIpAddressRequest { trans = 7, from_patcher }
    let mut request = Vec::new();
    request.extend_from_slice(&1u16.to_le_bytes());
    request.extend_from_slice(&7u32.to_le_bytes());
    request.push(0);
    stream.write_all(&request).await.unwrap();

    assert_eq!(stream.read_u16_le().await.unwrap(), 1); // FileServIpAddressReply
    assert_eq!(stream.read_u32_le().await.unwrap(), 7); // trans id
    assert_eq!(read_utf16_field(&mut stream).await, "files.shard.example");

    // AuthServIpAddressRequest { trans = 8 }
    let mut request = Vec::new();
    request.extend_from_slice(&2u16.to_le_bytes());
    request.extend_from_slice(&8u32.to_le_bytes());
    stream.write_all(&request).await.unwrap();

    assert_eq!(stream.read_u16_le().await.unwrap(), 2);
    assert_eq!(stream.read_u32_le().await.unwrap(), 8);
    assert_eq!(read_utf16_field(&mut stream).await, "auth.shard.example");
}

#[tokio::test]
async fn gate_ping_echoes_payload() {
    let (addr, _server) = spawn_test_server(Config::default()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    send_conn_header(&mut stream, 22).await;
    plaintext_handshake(&mut stream).await;

    let mut request = Vec::new();
    request.extend_from_slice(&0u16.to_le_bytes());
    request.extend_from_slice(&0xAABB_CCDDu32.to_le_bytes()); // ping time
    request.extend_from_slice(&3u32.to_le_bytes()); // trans id
    request.extend_from_slice(&4u32.to_le_bytes()); // payload size
    request.extend_from_slice(b"ahra");
    stream.write_all(&request).await.unwrap();

    assert_eq!(stream.read_u16_le().await.unwrap(), 0);
    assert_eq!(stream.read_u32_le().await.unwrap(), 0xAABB_CCDD);
    assert_eq!(stream.read_u32_le().await.unwrap(), 3);
    assert_eq!(stream.read_u32_le().await.unwrap(), 4);
    let mut payload = [0u8; 4];
    stream.read_exact(&mut payload).await.unwrap();
    assert_eq!(&payload, b"ahra");
}

async fn connect_file_service(addr: std::net::SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    send_conn_header(&mut stream, 16).await;

    // File header: size, build id, server type. No encryption on this
    // service.
    let mut header = Vec::new();
    header.extend_from_slice(&12u32.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    stream.write_all(&header).await.unwrap();
    stream
}

async fn send_manifest_request(stream: &mut TcpStream, trans_id: u32, name: &str) {
    let mut body = Vec::new();
    body.extend_from_slice(&20u32.to_le_bytes()); // ManifestRequest
    body.extend_from_slice(&trans_id.to_le_bytes());
    let mut units: Vec<u16> = name.encode_utf16().collect();
    units.resize(260, 0);
    for unit in units {
        body.extend_from_slice(&unit.to_le_bytes());
    }
    body.extend_from_slice(&0u32.to_le_bytes()); // build id

    let mut framed = Vec::new();
    framed.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
    framed.extend_from_slice(&body);
    stream.write_all(&framed).await.unwrap();
}

#[tokio::test]
async fn manifest_traversal_is_rejected_and_socket_stays_open() {
    let file_root = tempfile::tempdir().unwrap();
    std::fs::write(
        file_root.path().join("patch.mfs"),
        "a.prp,a.prp.gz,00112233445566778899aabbccddeeff,ffeeddccbbaa99887766554433221100,10,8,0\n",
    )
    .unwrap();

    let mut config = Config::default();
    config.file_root = file_root.path().display().to_string();
    let (addr, _server) = spawn_test_server(config).await;

    let mut stream = connect_file_service(addr).await;

    // Path characters in the manifest name: FileNotFound with zero counts.
    send_manifest_request(&mut stream, 7, "foo/bar").await;
    let _size = stream.read_u32_le().await.unwrap();
    assert_eq!(stream.read_u32_le().await.unwrap(), 20); // ManifestReply
    assert_eq!(stream.read_u32_le().await.unwrap(), 7); // trans id
    assert_eq!(stream.read_u32_le().await.unwrap(), 7); // NetFileNotFound
    assert_eq!(stream.read_u32_le().await.unwrap(), 0); // reader id
    assert_eq!(stream.read_u32_le().await.unwrap(), 0); // file count
    assert_eq!(stream.read_u32_le().await.unwrap(), 0); // data size

    // The connection survives and serves a real manifest afterwards.
    send_manifest_request(&mut stream, 8, "patch").await;
    let _size = stream.read_u32_le().await.unwrap();
    assert_eq!(stream.read_u32_le().await.unwrap(), 20);
    assert_eq!(stream.read_u32_le().await.unwrap(), 8);
    assert_eq!(stream.read_u32_le().await.unwrap(), 0); // NetSuccess
    assert_eq!(stream.read_u32_le().await.unwrap(), 1); // reader id
    assert_eq!(stream.read_u32_le().await.unwrap(), 1); // file count
    let data_size = stream.read_u32_le().await.unwrap();
    assert!(data_size > 0);
    let mut payload = vec![0u8; data_size as usize * 2];
    stream.read_exact(&mut payload).await.unwrap();
    // First entry starts with the client path "a.prp" as UTF-16.
    assert_eq!(&payload[0..2], &[b'a', 0]);
}

#[tokio::test]
async fn missing_manifest_reports_file_not_found() {
    let file_root = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.file_root = file_root.path().display().to_string();
    let (addr, _server) = spawn_test_server(config).await;

    let mut stream = connect_file_service(addr).await;
    send_manifest_request(&mut stream, 9, "nosuch").await;
    let _size = stream.read_u32_le().await.unwrap();
    assert_eq!(stream.read_u32_le().await.unwrap(), 20);
    assert_eq!(stream.read_u32_le().await.unwrap(), 9);
    assert_eq!(stream.read_u32_le().await.unwrap(), 7); // NetFileNotFound
}

#[tokio::test]
async fn file_build_id_request_reports_configured_build() {
    let mut config = Config::default();
    config.build_id = 918;
    let (addr, _server) = spawn_test_server(config).await;

    let mut stream = connect_file_service(addr).await;
    let mut body = Vec::new();
    body.extend_from_slice(&10u32.to_le_bytes()); // BuildIdRequest
    body.extend_from_slice(&5u32.to_le_bytes()); // trans id
    let mut framed = Vec::new();
    framed.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
    framed.extend_from_slice(&body);
    stream.write_all(&framed).await.unwrap();

    let _size = stream.read_u32_le().await.unwrap();
    assert_eq!(stream.read_u32_le().await.unwrap(), 10);
    assert_eq!(stream.read_u32_le().await.unwrap(), 5);
    assert_eq!(stream.read_u32_le().await.unwrap(), 0); // NetSuccess
    assert_eq!(stream.read_u32_le().await.unwrap(), 918);
}

#[tokio::test]
async fn unknown_connection_types_are_dropped() {
    let (addr, _server) = spawn_test_server(Config::default()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    send_conn_header(&mut stream, 99).await;

    // The server closes the socket without any reply.
    let mut buffer = [0u8; 1];
    let read = stream.read(&mut buffer).await.unwrap();
    assert_eq!(read, 0);
}

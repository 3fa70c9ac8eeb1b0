//! Integration test: MQTT transport against a scripted broker on loopback.

use std::time::Duration;

use beaconmq_protocol::packet::Packet;
use beaconmq_protocol::{
    BrokerTransport, ConnectOptions, Credentials, MqttTransport, TransportError,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn read_packet(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Option<Packet> {
    let mut chunk = [0u8; 512];
    loop {
        if let Some((packet, used)) = Packet::decode(buf, 64 * 1024).unwrap() {
            buf.drain(..used);
            return Some(packet);
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn write_packet(stream: &mut TcpStream, packet: Packet) {
    stream.write_all(&packet.encode().unwrap()).await.unwrap();
}

fn options(port: u16, credentials: Credentials) -> ConnectOptions {
    ConnectOptions {
        host: "127.0.0.1".to_string(),
        port,
        client_id: "beaconmq-test".to_string(),
        credentials,
        keep_alive: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn connect_subscribe_publish_receive() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        match read_packet(&mut stream, &mut buf).await.unwrap() {
            Packet::Connect(connect) => {
                assert_eq!(connect.client_id, "beaconmq-test");
                assert_eq!(connect.username.as_deref(), Some("user"));
                assert_eq!(connect.password.as_deref(), Some("secret"));
                assert_eq!(connect.keep_alive_secs, 5);
            }
            other => panic!("expected CONNECT, got {other:?}"),
        }
        write_packet(
            &mut stream,
            Packet::ConnAck {
                session_present: false,
                return_code: 0,
            },
        )
        .await;

        let packet_id = match read_packet(&mut stream, &mut buf).await.unwrap() {
            Packet::Subscribe { packet_id, topic } => {
                assert_eq!(topic, "lab/cmd");
                packet_id
            }
            other => panic!("expected SUBSCRIBE, got {other:?}"),
        };
        write_packet(
            &mut stream,
            Packet::SubAck {
                packet_id,
                return_codes: vec![0],
            },
        )
        .await;

        write_packet(
            &mut stream,
            Packet::Publish {
                topic: "lab/cmd".to_string(),
                payload: b"scan".to_vec(),
            },
        )
        .await;

        let published = read_packet(&mut stream, &mut buf).await.unwrap();
        assert_eq!(
            published,
            Packet::Publish {
                topic: "lab/data".to_string(),
                payload: b"[]".to_vec(),
            }
        );
        // Dropping the stream closes the connection.
    });

    let mut transport = MqttTransport::new();
    transport
        .connect(&options(
            port,
            Credentials::from_fields("user", "secret"),
        ))
        .await
        .unwrap();
    assert!(transport.is_connected());

    transport.subscribe("lab/cmd").await.unwrap();

    let inbound = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(msg) = transport.try_recv() {
                return msg;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("command should arrive");
    assert_eq!(inbound.topic, "lab/cmd");
    assert_eq!(inbound.payload, b"scan");

    transport.publish("lab/data", b"[]").await.unwrap();
    broker.await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("closed socket should be detected");

    transport.disconnect().await;
}

#[tokio::test]
async fn refused_connection_reports_return_code() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        match read_packet(&mut stream, &mut buf).await.unwrap() {
            Packet::Connect(connect) => {
                assert!(connect.username.is_none());
                assert!(connect.password.is_none());
            }
            other => panic!("expected CONNECT, got {other:?}"),
        }
        write_packet(
            &mut stream,
            Packet::ConnAck {
                session_present: false,
                return_code: 5,
            },
        )
        .await;
    });

    let mut transport = MqttTransport::new();
    let err = transport
        .connect(&options(port, Credentials::Anonymous))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Refused(5)));
    assert!(!transport.is_connected());
    broker.await.unwrap();
}

#[tokio::test]
async fn publish_before_connect_fails() {
    let mut transport = MqttTransport::new();
    let err = transport.publish("lab/data", b"[]").await.unwrap_err();
    assert!(matches!(err, TransportError::NotConnected));
}

#[tokio::test]
async fn oversized_publish_is_rejected() {
    let mut transport = MqttTransport::with_max_message_size(8);
    let err = transport.publish("lab/data", &[0u8; 9]).await.unwrap_err();
    assert!(matches!(err, TransportError::MessageTooLarge { size: 9, max: 8 }));
}

#[tokio::test]
async fn oversized_inbound_message_is_skipped() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        assert!(matches!(
            read_packet(&mut stream, &mut buf).await.unwrap(),
            Packet::Connect(_)
        ));
        write_packet(
            &mut stream,
            Packet::ConnAck {
                session_present: false,
                return_code: 0,
            },
        )
        .await;

        let Packet::Subscribe { packet_id, .. } = read_packet(&mut stream, &mut buf).await.unwrap()
        else {
            panic!("expected SUBSCRIBE");
        };
        write_packet(
            &mut stream,
            Packet::SubAck {
                packet_id,
                return_codes: vec![0],
            },
        )
        .await;

        write_packet(
            &mut stream,
            Packet::Publish {
                topic: "lab/cmd".to_string(),
                payload: vec![b'x'; 5 * 1024],
            },
        )
        .await;
        write_packet(
            &mut stream,
            Packet::Publish {
                topic: "lab/cmd".to_string(),
                payload: b"scan".to_vec(),
            },
        )
        .await;

        let published = read_packet(&mut stream, &mut buf).await.unwrap();
        assert!(matches!(published, Packet::Publish { ref topic, .. } if topic == "lab/data"));
    });

    let mut transport = MqttTransport::new();
    transport
        .connect(&options(port, Credentials::Anonymous))
        .await
        .unwrap();
    transport.subscribe("lab/cmd").await.unwrap();

    let inbound = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(msg) = transport.try_recv() {
                return msg;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("message after the oversized one should arrive");
    assert_eq!(inbound.payload, b"scan");
    assert!(transport.is_connected());
    assert!(transport.try_recv().is_none());

    transport.publish("lab/data", b"[]").await.unwrap();
    broker.await.unwrap();
    transport.disconnect().await;
}

// Probe and satellite clients against a live session

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use common::*;
use ion::client::{self, SatelliteOptions};
use ion::protocol::{self, read_frame, write_frame, ControlEvent, Frame, FrameKind, DEFAULT_MAX_FRAME_BYTES};
use ion::session::{SessionConfig, SessionCoordinator};
use ion::transport;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

async fn send(writer: &mut (impl tokio::io::AsyncWrite + Unpin), event: &ControlEvent) -> Result<()> {
    write_frame(writer, &Frame::control(protocol::encode(event)?)).await?;
    writer.flush().await?;
    Ok(())
}

async fn recv<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Result<Option<ControlEvent>> {
    loop {
        let Some(frame) = read_frame(reader, DEFAULT_MAX_FRAME_BYTES).await? else {
            return Ok(None);
        };
        if frame.kind == FrameKind::Control {
            return Ok(protocol::decode(&frame.payload)?);
        }
    }
}

#[tokio::test]
async fn test_satellite_handshake() -> Result<()> {
    let (satellite_side, server_side) = tokio::io::duplex(64 * 1024);
    let (sat_reader, sat_writer) = tokio::io::split(satellite_side);
    let (mut reader, mut writer) = tokio::io::split(server_side);

    let options = SatelliteOptions {
        name: "den".to_string(),
        ..SatelliteOptions::default()
    };
    let satellite = tokio::spawn(client::run_satellite(
        sat_reader,
        sat_writer,
        options,
        CancellationToken::new(),
    ));

    assert_eq!(recv(&mut reader).await?, Some(ControlEvent::Describe));
    send(
        &mut writer,
        &ControlEvent::Ready {
            protocol: "ion".to_string(),
            sample_rate: 22050,
            channels: 1,
            format: "s16le".to_string(),
        },
    )
    .await?;

    match recv(&mut reader).await? {
        Some(ControlEvent::SatelliteHello {
            name,
            sample_rate,
            asr,
            tts,
            wake,
            ..
        }) => {
            assert_eq!(name, "den");
            assert_eq!(sample_rate, 22050);
            assert!(asr && tts && !wake);
        }
        other => panic!("expected satellite.hello, got {:?}", other),
    }

    // Server hangs up; the satellite exits cleanly
    writer.shutdown().await?;
    drop(writer);
    tokio::time::timeout(Duration::from_secs(3), satellite).await???;

    Ok(())
}

#[tokio::test]
async fn test_satellite_requires_ready_first() -> Result<()> {
    let (satellite_side, server_side) = tokio::io::duplex(64 * 1024);
    let (sat_reader, sat_writer) = tokio::io::split(satellite_side);
    let (mut reader, mut writer) = tokio::io::split(server_side);

    let satellite = tokio::spawn(client::run_satellite(
        sat_reader,
        sat_writer,
        SatelliteOptions::default(),
        CancellationToken::new(),
    ));

    assert_eq!(recv(&mut reader).await?, Some(ControlEvent::Describe));
    send(&mut writer, &ControlEvent::TtsDone).await?;

    let result = tokio::time::timeout(Duration::from_secs(3), satellite).await??;
    assert!(result.is_err());

    Ok(())
}

#[tokio::test]
async fn test_satellite_survives_dead_player() -> Result<()> {
    let (satellite_side, server_side) = tokio::io::duplex(64 * 1024);
    let (sat_reader, sat_writer) = tokio::io::split(satellite_side);
    let (mut reader, mut writer) = tokio::io::split(server_side);

    let shutdown = CancellationToken::new();
    let options = SatelliteOptions {
        snd_command: Some("exit 0".to_string()),
        ..SatelliteOptions::default()
    };
    let satellite = tokio::spawn(client::run_satellite(sat_reader, sat_writer, options, shutdown.clone()));

    assert_eq!(recv(&mut reader).await?, Some(ControlEvent::Describe));
    send(
        &mut writer,
        &ControlEvent::Ready {
            protocol: "ion".to_string(),
            sample_rate: 16000,
            channels: 1,
            format: "s16le".to_string(),
        },
    )
    .await?;
    assert!(matches!(recv(&mut reader).await?, Some(ControlEvent::SatelliteHello { .. })));

    // The player has exited; keep feeding audio until writes hit the closed pipe
    for _ in 0..10 {
        write_frame(&mut writer, &Frame::audio(vec![0u8; 640])).await?;
        writer.flush().await?;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    send(&mut writer, &ControlEvent::TtsDone).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!satellite.is_finished());

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(3), satellite).await???;

    Ok(())
}

#[tokio::test]
async fn test_satellite_announces_itself_to_session() -> Result<()> {
    let (satellite_side, server_side) = tokio::io::duplex(64 * 1024);
    let (sat_reader, sat_writer) = tokio::io::split(satellite_side);
    let (server_reader, server_writer) = tokio::io::split(server_side);

    let session = Arc::new(SessionCoordinator::new(
        Arc::new(SessionConfig::default()),
        mock_adapters(),
        server_writer,
    ));
    let runner = Arc::clone(&session);
    let run = tokio::spawn(async move { runner.run(server_reader).await });

    let shutdown = CancellationToken::new();
    let options = SatelliteOptions {
        name: "hallway".to_string(),
        ..SatelliteOptions::default()
    };
    let satellite = tokio::spawn(client::run_satellite(sat_reader, sat_writer, options, shutdown.clone()));

    while session.summary().peer.is_none() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(3), satellite).await???;

    let summary = tokio::time::timeout(Duration::from_secs(3), run).await???;
    assert_eq!(summary.peer.as_deref(), Some("hallway"));
    assert_eq!(summary.control_events, 2);

    Ok(())
}

#[tokio::test]
async fn test_probe_over_tcp() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let shutdown = CancellationToken::new();

    let server = tokio::spawn(transport::serve_listener(
        listener,
        Arc::new(SessionConfig::default()),
        mock_adapters(),
        shutdown.clone(),
    ));

    let stream = TcpStream::connect(addr).await?;
    let (mut reader, mut writer) = stream.into_split();
    let reply = client::probe(&mut reader, &mut writer, DEFAULT_MAX_FRAME_BYTES).await?;

    assert!(matches!(
        reply,
        Some(ControlEvent::Ready { ref protocol, .. }) if protocol == "ion"
    ));

    // Open connections are torn down with the server
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(3), server).await???;
    assert!(read_frame(&mut reader, DEFAULT_MAX_FRAME_BYTES).await?.is_none());

    Ok(())
}

//! End-to-end tests: fake gamepad in, real UDP datagrams out

use padlink::config::BridgeConfig;
use padlink::controller::backend::{
    BackendError, BackendFactory, DeviceInfo, GamepadBackend, RawFrame,
};
use padlink::events::{self, EventReceiver, LinkStatus, PipelineEvent};
use padlink::network::codec::{self, NEUTRAL_PACKET, PACKET_SIZE};
use padlink::network::transmitter::{udp_sink_factory, DatagramSink, UdpSink};
use padlink::orchestrator::Orchestrator;
use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Gamepad whose presence and frame the test controls
#[derive(Clone)]
struct ScriptedPad {
    present: Arc<Mutex<bool>>,
    frame: Arc<Mutex<RawFrame>>,
}

impl ScriptedPad {
    fn new(frame: RawFrame) -> Self {
        Self {
            present: Arc::new(Mutex::new(true)),
            frame: Arc::new(Mutex::new(frame)),
        }
    }

    fn factory(&self) -> BackendFactory {
        let pad = self.clone();
        Arc::new(move || -> Result<Box<dyn GamepadBackend>, BackendError> {
            Ok(Box::new(pad.clone()))
        })
    }
}

impl GamepadBackend for ScriptedPad {
    fn pump(&mut self) {}

    fn device_count(&self) -> usize {
        usize::from(*self.present.lock().expect("pad lock"))
    }

    fn open(&mut self) -> Result<DeviceInfo, BackendError> {
        Ok(DeviceInfo {
            name: "Scripted Pad".to_string(),
            buttons: 11,
            axes: 6,
            hats: 1,
        })
    }

    fn close(&mut self) {}

    fn read(&mut self) -> Result<RawFrame, BackendError> {
        if !*self.present.lock().expect("pad lock") {
            return Err(BackendError::DeviceLost);
        }
        Ok(self.frame.lock().expect("pad lock").clone())
    }
}

fn frame_with_a_pressed() -> RawFrame {
    let mut buttons = vec![false; 11];
    buttons[0] = true;
    RawFrame {
        buttons,
        axes: vec![0.0, 0.0, -1.0, 0.0, 0.0, -1.0],
        hats: vec![(0, 0)],
    }
}

fn receiver() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("receiver should bind");
    socket
        .set_read_timeout(Some(Duration::from_millis(500)))
        .expect("read timeout should be accepted");
    socket
}

fn config_for(receiver: &UdpSocket) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.network.host = "127.0.0.1".to_string();
    config.network.port = receiver.local_addr().expect("receiver address").port();
    config.controller.deadzone = 0.0;
    config
}

/// Receives datagrams until one matches or the deadline passes
fn wait_for_packet(socket: &UdpSocket, matches: impl Fn(&[u8]) -> bool) -> Option<Vec<u8>> {
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut buf = [0u8; 64];
    while Instant::now() < deadline {
        if let Ok((len, _)) = socket.recv_from(&mut buf) {
            if matches(&buf[..len]) {
                return Some(buf[..len].to_vec());
            }
        }
    }
    None
}

fn saw_event(rx: &mut EventReceiver, wanted: &PipelineEvent) -> bool {
    let mut seen = false;
    while let Ok(status) = rx.try_recv() {
        seen |= &status.event == wanted;
    }
    seen
}

#[test]
fn test_pressed_button_reaches_the_wire() {
    let socket = receiver();
    let pad = ScriptedPad::new(frame_with_a_pressed());
    let (publisher, mut rx) = events::channel(4096);
    let orchestrator = Orchestrator::with_factories(
        config_for(&socket),
        publisher,
        pad.factory(),
        udp_sink_factory(),
    );

    assert!(orchestrator.start());
    let packet = wait_for_packet(&socket, |bytes| {
        codec::decode(bytes).map_or(false, |p| p.buttons == 0x04)
    })
    .expect("a packet with A pressed should arrive");
    assert!(orchestrator.stop());

    assert_eq!(packet.len(), PACKET_SIZE);
    let decoded = codec::decode(&packet).expect("packet should decode");
    assert_eq!(decoded.pressed(), vec!["A"]);
    assert_eq!(decoded.left_trigger, -1.0);
    assert_eq!(decoded.right_trigger, -1.0);

    let snapshot = orchestrator.input_snapshot().expect("state lock");
    assert!(!snapshot.connected, "stop must leave the state disconnected");
    assert_eq!(orchestrator.status().network, LinkStatus::Disconnected);
    assert!(saw_event(&mut rx, &PipelineEvent::Device(LinkStatus::Connected)));
}

#[test]
fn test_unplugged_controller_streams_neutral_packets() {
    let socket = receiver();
    let pad = ScriptedPad::new(frame_with_a_pressed());
    let (publisher, _rx) = events::channel(4096);
    let orchestrator = Orchestrator::with_factories(
        config_for(&socket),
        publisher,
        pad.factory(),
        udp_sink_factory(),
    );

    orchestrator.start();
    wait_for_packet(&socket, |bytes| bytes[0] == 0x04).expect("A should be streamed first");

    *pad.present.lock().expect("pad lock") = false;
    let packet = wait_for_packet(&socket, |bytes| bytes == NEUTRAL_PACKET.as_slice())
        .expect("neutral packets should follow the unplug");
    assert_eq!(packet, NEUTRAL_PACKET.to_vec());
    orchestrator.stop();
}

#[test]
fn test_udp_sink_sends_exactly_one_datagram_per_packet() {
    let socket = receiver();
    let port = socket.local_addr().expect("receiver address").port();
    let mut sink =
        UdpSink::connect("127.0.0.1", port, Duration::from_secs(1)).expect("sink should open");

    let sent = sink.send(&NEUTRAL_PACKET).expect("send should succeed");
    assert_eq!(sent, PACKET_SIZE);

    let mut buf = [0u8; 64];
    let (len, _) = socket.recv_from(&mut buf).expect("datagram should arrive");
    assert_eq!(&buf[..len], NEUTRAL_PACKET.as_slice());
}

//! Serving loop tests over a scripted module.

use std::net::Ipv4Addr;

use espwire_protocol::mock::{ManualClock, ScriptStep, ScriptedTransport};
use espwire_protocol::{AtError, ConnectionId, EngineConfig, Module};
use espwire_server::{Outcome, Server, ServerError};

fn server(transport: ScriptedTransport, clock: ManualClock) -> Server<ScriptedTransport, ManualClock> {
    Server::new(Module::with_clock(transport, clock, EngineConfig::default()))
}

fn written(server: &Server<ScriptedTransport, ManualClock>) -> String {
    server.module().transport().written_str()
}

#[test]
fn test_start_sequence() {
    let clock = ManualClock::new();
    let mut transport = ScriptedTransport::new(clock.clone());
    transport.reply_lines(&["AT", "", "OK"]);
    transport.reply_lines(&["OK"]);
    transport.reply_lines(&["WIFI CONNECTED", "WIFI GOT IP", "", "OK"]);
    transport.reply_lines(&["+CIFSR:STAIP,\"192.168.4.20\"", "", "OK"]);
    transport.reply_lines(&["OK"]);
    transport.reply_lines(&["OK"]);

    let mut server = server(transport, clock);
    let address = server.start("lab", "hunter2", 8080).unwrap();
    assert_eq!(address, Some(Ipv4Addr::new(192, 168, 4, 20)));
    assert_eq!(
        written(&server),
        "AT\r\nAT+CWMODE=1\r\nAT+CWJAP=\"lab\",\"hunter2\"\r\nAT+CIFSR\r\nAT+CIPMUX=1\r\nAT+CIPSERVER=1,8080\r\n"
    );
}

#[test]
fn test_start_fails_without_probe() {
    let clock = ManualClock::new();
    let transport = ScriptedTransport::new(clock.clone());

    let mut server = server(transport, clock);
    let err = server.start("lab", "pw", 80).unwrap_err();
    assert!(matches!(err, ServerError::Protocol(AtError::NoAcknowledgement { .. })));
    assert_eq!(written(&server), "AT\r\n".repeat(3));
}

#[test]
fn test_serve_get() {
    let clock = ManualClock::new();
    let mut transport = ScriptedTransport::new(clock.clone());
    transport.push_lines(&["0,CONNECT", ""]);
    transport.push_bytes(b"+IPD,0,31:GET /time HTTP/1.1\r\nHost: a\r\n\r\n");
    transport.reply_to_next_write(vec![ScriptStep::Data(b"\r\nOK\r\n> ".to_vec())]);
    transport.reply_lines(&["", "Recv bytes", "", "SEND OK"]);
    transport.reply_lines(&["0,CLOSED", "", "OK"]);

    let mut server = server(transport, clock);
    let outcome = server.serve_one().unwrap();
    assert_eq!(
        outcome,
        Outcome::Served {
            id: ConnectionId(0),
            path: "/time".to_string()
        }
    );

    assert_eq!(outcome.id(), ConnectionId(0));

    let sent = written(&server);
    assert!(sent.starts_with("AT+CIPSEND=0,"));
    assert!(sent.contains("\r\nHTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\n"));
    assert!(sent.ends_with("\nAT+CIPCLOSE=0\r\n"));

    // The declared send length matches the bytes that followed the command.
    let (command, rest) = sent.split_once("\r\n").unwrap();
    let declared: usize = command["AT+CIPSEND=0,".len()..].parse().unwrap();
    let payload_len = rest.len() - "AT+CIPCLOSE=0\r\n".len();
    assert_eq!(declared, payload_len);
}

#[test]
fn test_non_get_is_closed_without_response() {
    let clock = ManualClock::new();
    let mut transport = ScriptedTransport::new(clock.clone());
    transport.push_lines(&["2,CONNECT"]);
    transport.push_bytes(b"+IPD,2,19:POST / HTTP/1.1\r\n\r\n");
    transport.reply_lines(&["2,CLOSED", "OK"]);

    let mut server = server(transport, clock);
    let outcome = server.serve_one().unwrap();
    assert_eq!(outcome, Outcome::Ignored { id: ConnectionId(2) });
    assert_eq!(outcome.id(), ConnectionId(2));

    let transport = server.into_module().into_transport();
    assert_eq!(transport.written_str(), "AT+CIPCLOSE=2\r\n");
}

#[test]
fn test_unconfirmed_send_still_closes() {
    let clock = ManualClock::new();
    let mut transport = ScriptedTransport::new(clock.clone());
    transport.push_lines(&["1,CONNECT"]);
    transport.push_bytes(b"+IPD,1,18:GET / HTTP/1.0\r\n\r\n");
    transport.reply_lines(&["OK"]);
    transport.reply_lines(&["SEND FAIL"]);
    transport.reply_lines(&["OK"]);

    let mut server = server(transport, clock);
    let err = server.serve_one().unwrap_err();
    assert!(matches!(
        err,
        ServerError::Protocol(AtError::SendNotConfirmed { id: ConnectionId(1) })
    ));
    assert!(written(&server).ends_with("AT+CIPCLOSE=1\r\n"));
}

#[test]
fn test_run_stops_on_link_fault() {
    let clock = ManualClock::new();
    let mut transport = ScriptedTransport::new(clock.clone()).fault_when_exhausted();
    transport.push_lines(&["0,CONNECT", "0,CLOSED"]);

    let mut server = server(transport, clock);
    let err = server.run().unwrap_err();
    assert!(matches!(err, ServerError::Protocol(AtError::Transport(_))));
}

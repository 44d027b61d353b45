//! Integration tests driving a `Session` against a mock management interface
//! listening on loopback TCP.

use ovpn_mgmt::{ConnectOptions, Error, KillTarget, Session};
use rstest::rstest;
use std::thread;
use std::time::{Duration, Instant};

mod mock_management_server {
    use std::io::{BufRead, BufReader, Write};
    use std::net::{Shutdown, TcpListener};
    use std::sync::{Arc, Mutex};
    use std::thread;

    /// How the mock answers one command line.
    pub enum Answer {
        /// Write this text (newlines included) and keep going.
        Reply(String),
        /// Write nothing, keep the connection open.
        Silent,
        /// Write this text, then close the connection.
        HangUp(String),
    }

    pub struct MockServerHandle {
        pub port: u16,
        pub received: Arc<Mutex<Vec<String>>>,
        #[allow(dead_code)]
        handle: thread::JoinHandle<()>,
    }

    impl MockServerHandle {
        pub fn received(&self) -> Vec<String> {
            self.received.lock().unwrap().clone()
        }
    }

    /// Serve a single connection, optionally password protected.
    pub fn start<F>(password: Option<&str>, answer: F) -> MockServerHandle
    where
        F: Fn(&str) -> Answer + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind mock server");
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let password = password.map(str::to_string);

        let log = received.clone();
        let handle = thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else { return };
            let mut lines = BufReader::new(stream.try_clone().unwrap()).lines();

            if let Some(expected) = password {
                let _ = stream.write_all(b"ENTER PASSWORD:");
                let given = match lines.next() {
                    Some(Ok(line)) => line,
                    _ => return,
                };
                if given != expected {
                    let _ = stream.write_all(b"ERROR: bad password\n");
                    let _ = stream.shutdown(Shutdown::Both);
                    return;
                }
                let _ = stream.write_all(b"SUCCESS: password is correct\n");
            }
            let _ = stream.write_all(
                b">INFO:OpenVPN Management Interface Version 5 -- type 'help' for more info\n",
            );

            for line in lines {
                let Ok(line) = line else { break };
                log.lock().unwrap().push(line.clone());
                match answer(&line) {
                    Answer::Reply(text) => {
                        let _ = stream.write_all(text.as_bytes());
                    }
                    Answer::Silent => {}
                    Answer::HangUp(text) => {
                        let _ = stream.write_all(text.as_bytes());
                        let _ = stream.shutdown(Shutdown::Both);
                        break;
                    }
                }
            }
        });

        MockServerHandle { port, received, handle }
    }
}

use mock_management_server::{start, Answer};

const STATUS_REPORT: &str = "OpenVPN CLIENT LIST\n\
Updated,Thu Jan  1 00:00:10 1970\n\
Common Name,Real Address,Bytes Received,Bytes Sent,Connected Since\n\
alice,198.51.100.7:50112,4096,8192,Thu Jan  1 00:00:01 1970\n\
alice,198.51.100.8:50113,1,2,Thu Jan  1 00:00:03 1970\n\
bob,203.0.113.9:1194,10,20,Thu Jan  1 00:00:02 1970\n\
ROUTING TABLE\n\
Virtual Address,Common Name,Real Address,Last Ref\n\
10.8.0.6,alice,198.51.100.7:50112,Thu Jan  1 00:00:04 1970\n\
10.8.0.10,bob,203.0.113.9:1194,Thu Jan  1 00:00:05 1970\n\
GLOBAL STATS\n\
Max bcast/mcast queue length,0\n\
END\n";

/// Answers like a small OpenVPN server with two clients.
fn daemon(line: &str) -> Answer {
    let text = match line {
        "status" => STATUS_REPORT.to_string(),
        "load-stats" => "SUCCESS: nclients=3,bytesin=1000,bytesout=2000\n".to_string(),
        "pid" => "SUCCESS: pid=4242\n".to_string(),
        "version" => "OpenVPN Version: OpenVPN 2.6.8 x86_64-pc-linux-gnu\nManagement Version: 5\nEND\n"
            .to_string(),
        "verb" => "SUCCESS: verb=3\n".to_string(),
        "mute" => "SUCCESS: mute=0\n".to_string(),
        "kill bob" => "SUCCESS: common name 'bob' found, 1 client(s) killed\n".to_string(),
        "kill ghost" => "ERROR: common name 'ghost' not found\n".to_string(),
        l if l.starts_with("verb ") || l.starts_with("mute ") => {
            "SUCCESS: verb/mute level changed\n".to_string()
        }
        l if l.starts_with("signal ") => format!("SUCCESS: {} thrown\n", l),
        l if l.starts_with("kill ") => format!("SUCCESS: 1 client(s) at address {} killed\n", &l[5..]),
        _ => "ERROR: unknown command, enter 'help' for more options\n".to_string(),
    };
    Answer::Reply(text)
}

fn options(port: u16) -> ConnectOptions {
    ConnectOptions::new("127.0.0.1", port).timeout(Duration::from_secs(2))
}

#[test]
fn queries_without_password() {
    let server = start(None, daemon);
    let mut session = Session::open(&options(server.port)).expect("Failed to connect");
    assert!(!session.is_authenticated());

    assert_eq!(session.pid().unwrap(), "pid=4242");
    assert_eq!(
        session.version().unwrap(),
        "OpenVPN Version: OpenVPN 2.6.8 x86_64-pc-linux-gnu\nManagement Version: 5"
    );
    session.close().unwrap();
}

#[test]
fn logs_in_with_password() {
    let server = start(Some("s3cret"), daemon);
    let mut session =
        Session::open(&options(server.port).password("s3cret")).expect("Failed to log in");
    assert!(session.is_authenticated());
    assert_eq!(session.pid().unwrap(), "pid=4242");
    assert_eq!(server.received(), vec!["pid"]);
}

#[test]
fn wrong_password_is_auth_error() {
    let server = start(Some("s3cret"), daemon);
    let err = Session::open(&options(server.port).password("guess")).err().unwrap();
    assert!(matches!(err, Error::Auth(ref m) if m == "bad password"), "unexpected error: {err}");
}

#[test]
fn status_and_stats_are_parsed() {
    let server = start(None, daemon);
    let mut session = Session::open(&options(server.port)).unwrap();

    let report = session.status().unwrap();
    assert_eq!(report.clients["alice"].len(), 2);
    assert_eq!(report.clients["bob"][0].bytes_received, "10");
    assert_eq!(report.routes["10.8.0.6"].common_name, "alice");
    assert_eq!(report.connection_count(), 3);

    let stats = session.stats().unwrap();
    assert_eq!(stats.clients, 3);
    assert_eq!(stats.bytes_download, 1000);
    assert_eq!(stats.bytes_upload, 2000);

    assert_eq!(server.received(), vec!["status", "load-stats"]);
}

#[rstest]
#[case::verb_query(None, "verb", "verb=3")]
#[case::verb_set(Some(5), "verb 5", "verb/mute level changed")]
fn verb_commands(#[case] level: Option<u32>, #[case] sent: &str, #[case] reply: &str) {
    let server = start(None, daemon);
    let mut session = Session::open(&options(server.port)).unwrap();
    assert_eq!(session.verb(level).unwrap(), reply);
    assert_eq!(server.received(), vec![sent]);
}

#[test]
fn mute_query() {
    let server = start(None, daemon);
    let mut session = Session::open(&options(server.port)).unwrap();
    assert_eq!(session.mute(None).unwrap(), "mute=0");
}

#[rstest]
#[case::by_name(KillTarget::CommonName("bob".into()), "kill bob")]
#[case::by_address(
    KillTarget::Address { host: "198.51.100.7".into(), port: 50112 },
    "kill 198.51.100.7:50112"
)]
fn kill_targets(#[case] target: KillTarget, #[case] sent: &str) {
    let server = start(None, daemon);
    let mut session = Session::open(&options(server.port)).unwrap();
    session.kill(&target).unwrap();
    assert_eq!(server.received(), vec![sent]);
}

#[test]
fn kill_unknown_client_reports_remote_error() {
    let server = start(None, daemon);
    let mut session = Session::open(&options(server.port)).unwrap();
    let err = session.kill(&KillTarget::CommonName("ghost".into())).unwrap_err();
    assert!(matches!(err, Error::Remote(ref m) if m == "common name 'ghost' not found"));
    // The session stays usable after a remote error.
    assert_eq!(session.pid().unwrap(), "pid=4242");
}

#[test]
fn rejected_arguments_never_reach_the_daemon() {
    let server = start(None, daemon);
    let mut session = Session::open(&options(server.port)).unwrap();

    assert!(matches!(session.signal("SIGKILL"), Err(Error::InvalidArgument(_))));
    assert!(matches!(
        KillTarget::from_parts(None, None, None),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(session.signal("SIGUSR2").unwrap(), "signal SIGUSR2 thrown");

    assert_eq!(server.received(), vec!["signal SIGUSR2"]);
}

#[test]
fn silent_daemon_times_out() {
    let server = start(None, |_| Answer::Silent);
    let opts = ConnectOptions::new("127.0.0.1", server.port).timeout(Duration::from_millis(200));
    let mut session = Session::open(&opts).unwrap();

    let started = Instant::now();
    let err = session.status().unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, Error::Timeout), "unexpected error: {err}");
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_secs(2), "timeout took too long: {elapsed:?}");
}

#[test]
fn hang_up_mid_reply_is_protocol_error() {
    let server = start(None, |_| Answer::HangUp("OpenVPN CLIENT LIST\nUpdated,now\n".into()));
    let mut session = Session::open(&options(server.port)).unwrap();
    let err = session.status().unwrap_err();
    assert!(matches!(err, Error::Protocol(_)), "unexpected error: {err}");
    assert!(err.is_fatal());
}

#[test]
fn unreachable_endpoint_is_connect_error() {
    // Grab a free port, then release it so nothing listens there.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    thread::sleep(Duration::from_millis(10));

    let err = Session::open(&options(port)).err().unwrap();
    assert!(matches!(err, Error::Connect { .. }), "unexpected error: {err}");
}

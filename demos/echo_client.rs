//! Wires a `ClientEndpoint` over a loopback socket pair and drives it with a
//! hand-rolled loop in place of a reactor. Illustrative only — connecting
//! this up to `mio` or any other selector is the embedder's job.

use ringclient::{ClientEndpoint, ClientHandler, Config, Interest, RegistrationKey, SendHandle};
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct PollKey {
    ops: AtomicU8,
}

impl RegistrationKey for PollKey {
    fn interest_ops(&self) -> Interest {
        Interest::from_bits_truncate(self.ops.load(Ordering::Relaxed))
    }
    fn set_interest_ops(&self, ops: Interest) {
        self.ops.store(ops.bits(), Ordering::Relaxed);
    }
    fn wakeup(&self) {}
    fn is_valid(&self) -> bool {
        true
    }
}

struct EchoHandler {
    scratch: Vec<u8>,
}

impl ClientHandler<PollKey> for EchoHandler {
    fn buffer(&mut self) -> &mut [u8] {
        &mut self.scratch
    }

    fn read(&mut self, n: usize, send: &SendHandle<'_, PollKey>) {
        let echoed: Arc<[u8]> = Arc::from(self.scratch[..n].to_vec().into_boxed_slice());
        if let Err(e) = send.send_all(echoed) {
            eprintln!("echo send failed: {e}");
        }
    }
}

fn main() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client_socket = TcpStream::connect(addr).unwrap();
    let (mut server_socket, _) = listener.accept().unwrap();
    client_socket.set_nonblocking(true).unwrap();

    let handler = Box::new(EchoHandler { scratch: vec![0u8; 4096] });
    let mut endpoint = ClientEndpoint::new(client_socket, handler, Config::default());
    endpoint.registered(Arc::new(PollKey { ops: AtomicU8::new(0) }));
    endpoint.connected();

    server_socket.write_all(b"hello from the server").unwrap();
    std::thread::sleep(Duration::from_millis(50));

    // A reactor would dispatch these from its readiness loop; we call them
    // directly here since there is no reactor in scope.
    endpoint.on_readable();
    endpoint.on_writable();

    println!("endpoint state: {:?}", endpoint.state());
}

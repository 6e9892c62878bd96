use bytes::Bytes;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rtp::{Config, Receiver, Sender, HEADER_LEN};
use std::{
    fmt::Debug,
    io::{Error, ErrorKind},
    net::{SocketAddr, UdpSocket},
    sync::mpsc,
    thread,
    time::Duration,
};

pub fn run_timed<
    E: 'static + Debug + Send,
    F: 'static + Send + FnOnce(mpsc::Sender<E>),
>(
    duration: Duration,
    func: F,
) {
    let (err_tx, err_rx) = mpsc::channel();

    func(err_tx);

    match err_rx.recv_timeout(duration) {
        Ok(err) => panic!("{:?}", err),
        Err(mpsc::RecvTimeoutError::Timeout) => panic!("timed out"),
        Err(mpsc::RecvTimeoutError::Disconnected) => {}
    }
}

/// Per-datagram mangling probabilities for the relay.
///
/// Drops are restricted to data packets on the forward path and plain ACKs
/// on the backward path. The open and close exchanges pass untouched, so a
/// relayed session always terminates.
#[derive(Clone, Copy, Debug, Default)]
pub struct Chaos {
    pub drop_data: f64,
    pub drop_ack: f64,
    pub dup: f64,
    pub swap: f64,
}

/// Starts a UDP relay in front of `target` and returns its address.
///
/// The first datagram from anywhere other than `target` pins its source as
/// the client; from then on traffic shuttles both ways with `chaos`
/// applied. A swapped packet is held back until the next one passes it.
pub fn spawn_relay(target: SocketAddr, chaos: Chaos, seed: u64) -> SocketAddr {
    let sock = UdpSocket::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap()).unwrap();
    let addr = sock.local_addr().unwrap();

    thread::spawn(move || {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut client: Option<SocketAddr> = None;
        let mut held: Option<(Vec<u8>, SocketAddr)> = None;
        let mut buf = [0; 2048];

        loop {
            let (n, src) = match sock.recv_from(&mut buf) {
                Ok(pair) => pair,
                Err(_) => return,
            };

            let backward = src == target;
            if !backward && client.is_none() {
                client = Some(src);
            }
            let dest = match (backward, client) {
                (true, Some(client)) => client,
                (true, None) => continue,
                (false, _) => target,
            };

            let carries_payload = n > HEADER_LEN;
            let is_plain_ack = n == HEADER_LEN && buf[10] == 0b010;

            if !backward && carries_payload && rng.gen_bool(chaos.drop_data) {
                continue;
            }
            if backward && is_plain_ack && rng.gen_bool(chaos.drop_ack) {
                continue;
            }

            if held.is_none() && rng.gen_bool(chaos.swap) {
                held = Some((buf[..n].to_vec(), dest));
                continue;
            }

            let copies = if rng.gen_bool(chaos.dup) { 2 } else { 1 };
            for _ in 0..copies {
                let _ = sock.send_to(&buf[..n], dest);
            }
            if let Some((delayed, to)) = held.take() {
                let _ = sock.send_to(&delayed, to);
            }
        }
    });

    addr
}

/// Deterministic pseudo-random payload of the given size.
pub fn payload(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = vec![0; len];
    rng.fill(&mut buf[..]);
    buf
}

/// Runs `sends` through a fresh connection and checks that the receiver
/// assembles their concatenation.
///
/// With `chaos`, traffic passes through a seeded mangling relay.
pub fn transfer(cfg: Config, sends: Vec<Vec<u8>>, chaos: Option<(Chaos, u64)>) {
    run_timed(Duration::from_secs(30), move |err_tx| {
        let mut receiver =
            Receiver::bind("127.0.0.1:0".parse().unwrap(), cfg.clone()).unwrap();
        let addr = receiver.local_addr().unwrap();
        let target = match chaos {
            Some((chaos, seed)) => spawn_relay(addr, chaos, seed),
            None => addr,
        };

        let expected = sends.concat();
        let err_tx_2 = err_tx.clone();
        thread::spawn(move || {
            if report(&err_tx_2, receiver.accept()).is_none() {
                return;
            }
            let received = match report(&err_tx_2, receiver.recv()) {
                Some(data) => data,
                None => return,
            };
            if received != expected {
                let err_msg = format!(
                    "streams don't match: received {} bytes but wanted {}",
                    received.len(),
                    expected.len()
                );
                let _ = err_tx_2.send(Error::new(ErrorKind::InvalidData, err_msg));
                return;
            }
            let _ = report(&err_tx_2, receiver.close());
        });

        thread::spawn(move || {
            let mut sender = match report(&err_tx, Sender::connect(target, cfg)) {
                Some(sender) => sender,
                None => return,
            };
            for data in sends {
                if report(&err_tx, sender.send(Bytes::from(data))).is_none() {
                    return;
                }
            }
            let _ = report(&err_tx, sender.close());
        });
    });
}

fn report<T>(err_tx: &mpsc::Sender<Error>, result: Result<T, rtp::Error>) -> Option<T> {
    match result {
        Ok(val) => Some(val),
        Err(e) => {
            let _ = err_tx.send(Error::new(ErrorKind::Other, e.to_string()));
            None
        }
    }
}

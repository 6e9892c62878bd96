//! Sends a file to a receiving endpoint over the reliable UDP transport.

use bytes::Bytes;
use clap::{
    app_from_crate, crate_authors, crate_description, crate_name, crate_version,
    AppSettings, Arg,
};
use env_logger;
use log::{info, LevelFilter};
use rtp::{Config, Mode, Sender};
use std::{fs, net::SocketAddr};

const PEER_ARG: &str = "PEER";
const FILE_ARG: &str = "FILE";
const WINDOW_ARG: &str = "WINDOW";
const MODE_ARG: &str = "MODE";

fn main() {
    env_logger::Builder::new()
        .filter(Some("rtp"), LevelFilter::Info)
        .filter(Some("rtp_sender"), LevelFilter::Info)
        .init();

    let matches = app_from_crate!()
        .setting(AppSettings::GlobalVersion)
        .setting(AppSettings::VersionlessSubcommands)
        .arg(
            Arg::with_name(PEER_ARG)
                .short("p")
                .long("peer")
                .takes_value(true)
                .required(true)
                .validator(|val| {
                    val.parse::<SocketAddr>().map(|_| ()).map_err(|_| {
                        format!("'{}' cannot be parsed as a socket address.", val)
                    })
                })
                .help("The address of the receiving endpoint."),
        )
        .arg(
            Arg::with_name(FILE_ARG)
                .short("f")
                .long("file")
                .takes_value(true)
                .required(true)
                .help("The file to transfer."),
        )
        .arg(
            Arg::with_name(WINDOW_ARG)
                .short("w")
                .long("window")
                .default_value("16")
                .takes_value(true)
                .validator(|val| {
                    val.parse::<usize>().map(|_| ()).map_err(|_| {
                        format!("'{}' cannot be parsed as number.", val)
                    })
                })
                .help("The number of packets in flight."),
        )
        .arg(
            Arg::with_name(MODE_ARG)
                .short("m")
                .long("mode")
                .default_value("gbn")
                .takes_value(true)
                .validator(|val| {
                    val.parse::<Mode>().map(|_| ()).map_err(|e| e.to_string())
                })
                .help("The retransmission discipline, 'gbn' or 'sr'."),
        )
        .get_matches();

    let peer: SocketAddr = matches.value_of(PEER_ARG).unwrap().parse().unwrap();
    let path = matches.value_of(FILE_ARG).unwrap();
    let cfg = Config {
        mode: matches.value_of(MODE_ARG).unwrap().parse().unwrap(),
        window_size: matches.value_of(WINDOW_ARG).unwrap().parse().unwrap(),
        ..Config::default()
    };

    let data = Bytes::from(fs::read(path).expect("failed to read the input file"));

    info!("⚡️  Connecting to {}.", peer);
    let mut sender = Sender::connect(peer, cfg).expect("failed to open the connection");

    info!("📦  Transferring {} bytes.", data.len());
    sender.send(data).expect("transfer failed");

    sender.close().expect("failed to close the connection");
    info!("🏁  Done.");
}

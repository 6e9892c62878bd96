//! Receives a file from a sending endpoint over the reliable UDP transport.

use clap::{
    app_from_crate, crate_authors, crate_description, crate_name, crate_version,
    AppSettings, Arg,
};
use env_logger;
use log::{info, LevelFilter};
use rtp::{Config, Mode, Receiver};
use std::{
    fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

const PORT_ARG: &str = "PORT";
const FILE_ARG: &str = "FILE";
const WINDOW_ARG: &str = "WINDOW";
const MODE_ARG: &str = "MODE";

fn main() {
    env_logger::Builder::new()
        .filter(Some("rtp"), LevelFilter::Info)
        .filter(Some("rtp_receiver"), LevelFilter::Info)
        .init();

    let matches = app_from_crate!()
        .setting(AppSettings::GlobalVersion)
        .setting(AppSettings::VersionlessSubcommands)
        .arg(
            Arg::with_name(PORT_ARG)
                .short("p")
                .long("port")
                .default_value("12345")
                .takes_value(true)
                .required(true)
                .validator(|val| {
                    val.parse::<u16>().map(|_| ()).map_err(|_| {
                        format!("'{}' cannot be parsed as number.", val)
                    })
                })
                .help("The UDP port to listen on."),
        )
        .arg(
            Arg::with_name(FILE_ARG)
                .short("f")
                .long("file")
                .takes_value(true)
                .required(true)
                .help("The file to write the received bytes to."),
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

    let port: u16 = matches.value_of(PORT_ARG).unwrap().parse().unwrap();
    let path = matches.value_of(FILE_ARG).unwrap();
    let cfg = Config {
        mode: matches.value_of(MODE_ARG).unwrap().parse().unwrap(),
        window_size: matches.value_of(WINDOW_ARG).unwrap().parse().unwrap(),
        ..Config::default()
    };

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);
    let mut receiver = Receiver::bind(addr, cfg).expect("failed to bind UDP socket");
    let local_addr = receiver.local_addr().expect("failed to read the bound address");

    info!("⛓  Listening on {}.", local_addr);
    receiver.accept().expect("failed to accept a connection");

    info!("⚡️  Connection accepted.");
    let data = receiver.recv().expect("transfer failed");

    fs::write(path, &data).expect("failed to write the output file");
    info!("📦  Wrote {} bytes.", data.len());

    receiver.close().expect("failed to close the connection");
    info!("🏁  Done.");
}

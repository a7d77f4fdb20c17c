// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! n3n edge daemon.
//!
//! Mirrors `example_edge_embed.c`'s lifecycle: build a config, open the TAP
//! device, initialize the runtime, run the reactor until asked to stop,
//! then let `Drop` tear everything down.
//!
//! ```bash
//! n3n-edged --community mycommunity --supernode sn.example.com:7654 --tap-name n3n0
//! ```

mod tuntap;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use n3n_edge::config::{Community, EdgeConfig, SupernodeAddr, DEFAULT_MGMT_PORT, DEFAULT_REGISTER_INTERVAL, DEFAULT_REGISTER_TTL};
use n3n_edge::edge::EdgeRuntime;
use n3n_edge::mac::Mac;
use n3n_edge::rand::InsecureRandom;
use n3n_edge::tap::AddressMode;
use n3n_edge::transform::{NullTransform, TransformId};

use tuntap::LinuxTap;

#[derive(Parser, Debug)]
#[command(name = "n3n-edged")]
#[command(author, version, about = "n3n-style overlay edge daemon", long_about = None)]
struct Args {
    /// Overlay community name (max 20 bytes)
    #[arg(long, default_value = "mycommunity")]
    community: String,

    /// Supernode address as host:port; may be repeated
    #[arg(long = "supernode", required = true)]
    supernodes: Vec<String>,

    /// TAP interface name to create/attach
    #[arg(long, default_value = "n3n0")]
    tap_name: String,

    /// TAP interface MAC address, colon-separated hex
    #[arg(long, default_value = "02:00:00:00:00:01")]
    tap_mac: String,

    /// TAP interface IPv4 address
    #[arg(long, default_value = "10.0.0.1")]
    tap_ip: Ipv4Addr,

    /// TAP interface netmask
    #[arg(long, default_value = "255.255.255.0")]
    tap_netmask: Ipv4Addr,

    /// Interface MTU
    #[arg(long, default_value_t = 1400)]
    mtu: u16,

    /// Local UDP bind address
    #[arg(long, default_value = "0.0.0.0")]
    bind_address: IpAddr,

    /// Local UDP bind port (0 = ephemeral)
    #[arg(long, default_value_t = 0)]
    bind_port: u16,

    /// Management HTTP listener port
    #[arg(long, default_value_t = DEFAULT_MGMT_PORT)]
    mgmt_port: u16,

    /// Seconds between REGISTER/REGISTER_SUPER emissions
    #[arg(long, default_value_t = DEFAULT_REGISTER_INTERVAL.as_secs())]
    register_interval: u64,

    /// TTL placed on REGISTER_SUPER, and threshold for expiring it
    #[arg(long, default_value_t = DEFAULT_REGISTER_TTL)]
    register_ttl: u8,

    /// Permit direct peer-to-peer transmission
    #[arg(long, default_value_t = true)]
    allow_p2p: bool,

    /// Permit supernode-relayed frames between edges
    #[arg(long, default_value_t = true)]
    allow_routing: bool,

    /// Silently drop multicast frames to the overlay
    #[arg(long, default_value_t = false)]
    drop_multicast: bool,

    /// Clear the DF bit / disable path MTU discovery probing
    #[arg(long, default_value_t = false)]
    disable_pmtu_discovery: bool,

    /// Secret input to the transform's key schedule; absent means no encryption
    #[arg(long)]
    encrypt_key: Option<String>,

    /// IP TOS value for sent packets
    #[arg(long, default_value_t = 0)]
    tos: u8,
}

static KEEP_RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn handle_signal(_sig: libc::c_int) {
    KEEP_RUNNING.store(false, Ordering::SeqCst);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
    }
}

fn build_config(args: &Args) -> Result<EdgeConfig, Box<dyn std::error::Error>> {
    let supernodes = args
        .supernodes
        .iter()
        .map(|s| SupernodeAddr::parse(s))
        .collect::<Result<Vec<_>, _>>()?;

    let tap_mac = Mac::parse(&args.tap_mac).ok_or("invalid --tap-mac")?;

    let community = Community {
        name: args.community.clone(),
        allow_p2p: args.allow_p2p,
        allow_routing: args.allow_routing,
        encrypt_key: args.encrypt_key.clone(),
        transop_id: TransformId::NULL,
        tuntap_ip_mode: AddressMode::Static,
        mgmt_port: args.mgmt_port,
        register_interval: Duration::from_secs(args.register_interval),
        register_ttl: args.register_ttl,
        tos: args.tos,
        drop_multicast: args.drop_multicast,
        disable_pmtu_discovery: args.disable_pmtu_discovery,
        tap_ip: args.tap_ip,
        tap_netmask: args.tap_netmask,
        tap_mac,
        mtu: args.mtu,
    };

    let config = EdgeConfig {
        community,
        bind_address: args.bind_address,
        bind_port: args.bind_port,
        supernodes,
        mgmt_unix_socket: None,
    };
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    install_signal_handlers();

    let args = Args::parse();
    let config = build_config(&args)?;

    info!("+----------------------------------------------------+");
    info!("|  n3n-edged v{:38} |", env!("CARGO_PKG_VERSION"));
    info!("+----------------------------------------------------+");
    info!("|  community: {:38} |", config.community.name);
    info!("|  supernodes: {:37} |", args.supernodes.join(","));
    info!("+----------------------------------------------------+");

    if args.encrypt_key.is_some() {
        // Real symmetric ciphers are out of this crate's scope; a deployed
        // binary would wire a cipher implementation in here instead.
        error!("--encrypt-key set but no Transform beyond the identity NullTransform is wired in; payloads will NOT be encrypted");
    }

    let tap = LinuxTap::open(&args.tap_name, config.community.tap_mac)?;
    let transform = NullTransform;
    let rand = InsecureRandom::new(0);

    let mut runtime = EdgeRuntime::with_rand(config, tap, transform, rand)?;

    while KEEP_RUNNING.load(Ordering::SeqCst) {
        runtime.run_once()?;
    }

    info!("shutting down");
    Ok(())
}
